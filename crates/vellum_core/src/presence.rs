//! In-memory collaborator presence tracking.
//!
//! An explicit concurrent map keyed by document, with bounded TTL eviction.
//! Presence is ancillary, best-effort state: it is never persisted and an
//! entry simply ages out when its editor stops touching the document.

use std::collections::HashMap;
use std::sync::RwLock;

type DocKey = (String, String);

/// Tracker of which editors are currently active on which documents.
#[derive(Debug)]
pub struct PresenceTracker {
    ttl_ms: i64,
    /// (workspace_id, doc_id) -> editor -> last-seen timestamp (ms)
    inner: RwLock<HashMap<DocKey, HashMap<String, i64>>>,
}

impl PresenceTracker {
    /// Create a tracker whose entries expire after `ttl_ms` of inactivity.
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record activity by an editor on a document.
    pub fn touch(&self, workspace_id: &str, doc_id: &str, editor: &str) {
        self.touch_at(
            workspace_id,
            doc_id,
            editor,
            chrono::Utc::now().timestamp_millis(),
        );
    }

    fn touch_at(&self, workspace_id: &str, doc_id: &str, editor: &str, now: i64) {
        let mut inner = self.inner.write().unwrap();
        inner
            .entry((workspace_id.to_string(), doc_id.to_string()))
            .or_default()
            .insert(editor.to_string(), now);
    }

    /// Remove an editor from a document immediately.
    pub fn leave(&self, workspace_id: &str, doc_id: &str, editor: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(editors) = inner.get_mut(&(workspace_id.to_string(), doc_id.to_string())) {
            editors.remove(editor);
            if editors.is_empty() {
                inner.remove(&(workspace_id.to_string(), doc_id.to_string()));
            }
        }
    }

    /// The editors currently active on a document, sorted.
    ///
    /// Evicts stale entries for the document as a side effect.
    pub fn active_editors(&self, workspace_id: &str, doc_id: &str) -> Vec<String> {
        self.active_editors_at(
            workspace_id,
            doc_id,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    fn active_editors_at(&self, workspace_id: &str, doc_id: &str, now: i64) -> Vec<String> {
        let cutoff = now - self.ttl_ms;
        let mut inner = self.inner.write().unwrap();
        let key = (workspace_id.to_string(), doc_id.to_string());

        let Some(editors) = inner.get_mut(&key) else {
            return Vec::new();
        };
        editors.retain(|_, last_seen| *last_seen >= cutoff);
        if editors.is_empty() {
            inner.remove(&key);
            return Vec::new();
        }

        let mut names: Vec<String> = editors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every entry older than the TTL across all documents.
    pub fn evict_stale(&self) {
        let cutoff = chrono::Utc::now().timestamp_millis() - self.ttl_ms;
        let mut inner = self.inner.write().unwrap();
        inner.retain(|_, editors| {
            editors.retain(|_, last_seen| *last_seen >= cutoff);
            !editors.is_empty()
        });
    }
}
