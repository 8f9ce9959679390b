//! In-memory storage implementation for testing.
//!
//! A simple in-memory implementation of [`DocStorage`] for unit tests and
//! development. Thread-safe via `RwLock`, data is lost when dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::blob::BlobPointer;
use crate::error::Result;
use crate::storage::{DocRemoval, DocStorage, SnapshotUpsert};
use crate::types::{DocUpdate, Snapshot, SnapshotHistoryEntry};

type DocKey = (String, String);

/// In-memory document storage for testing.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Live snapshots, one per document
    snapshots: RwLock<HashMap<DocKey, Snapshot>>,

    /// Update logs, ascending seq per document
    updates: RwLock<HashMap<DocKey, Vec<DocUpdate>>>,

    /// Snapshot history archive, keyed by (workspace, doc, timestamp)
    histories: RwLock<HashMap<DocKey, Vec<SnapshotHistoryEntry>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(workspace_id: &str, doc_id: &str) -> DocKey {
    (workspace_id.to_string(), doc_id.to_string())
}

impl DocStorage for MemoryStorage {
    fn get_snapshot(&self, workspace_id: &str, doc_id: &str) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap();
        Ok(snapshots.get(&key(workspace_id, doc_id)).cloned())
    }

    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut snapshots = self.snapshots.write().unwrap();
        let k = key(&snapshot.workspace_id, &snapshot.doc_id);
        if snapshots.contains_key(&k) {
            return Ok(false);
        }
        snapshots.insert(k, snapshot.clone());
        Ok(true)
    }

    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUpsert> {
        let mut snapshots = self.snapshots.write().unwrap();
        let k = key(&snapshot.workspace_id, &snapshot.doc_id);

        match snapshots.get_mut(&k) {
            None => {
                snapshots.insert(k, snapshot.clone());
                Ok(SnapshotUpsert::Created)
            }
            Some(existing) => {
                if snapshot.updated_at < existing.updated_at {
                    return Ok(SnapshotUpsert::Stale);
                }
                let old_blob = existing.blob.clone();
                existing.blob = snapshot.blob.clone();
                existing.state = snapshot.state.clone();
                existing.seq = snapshot.seq;
                existing.updated_at = snapshot.updated_at;
                existing.updated_by = snapshot.updated_by.clone();
                Ok(SnapshotUpsert::Replaced(old_blob))
            }
        }
    }

    fn append_update(
        &self,
        workspace_id: &str,
        doc_id: &str,
        blob: &BlobPointer,
        created_by: &str,
    ) -> Result<DocUpdate> {
        let mut updates = self.updates.write().unwrap();
        let log = updates.entry(key(workspace_id, doc_id)).or_default();

        let now = chrono::Utc::now().timestamp_millis();
        let (seq, created_at) = match log.last() {
            Some(last) => (last.seq + 1, now.max(last.created_at + 1)),
            None => (1, now),
        };

        let update = DocUpdate {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            seq,
            blob: blob.clone(),
            created_at,
            created_by: created_by.to_string(),
        };
        log.push(update.clone());
        Ok(update)
    }

    fn updates_after_seq(
        &self,
        workspace_id: &str,
        doc_id: &str,
        seq: i64,
    ) -> Result<Vec<DocUpdate>> {
        let updates = self.updates.read().unwrap();
        let log = updates
            .get(&key(workspace_id, doc_id))
            .map(|l| l.as_slice())
            .unwrap_or(&[]);
        Ok(log.iter().filter(|u| u.seq > seq).cloned().collect())
    }

    fn max_update_seq(&self, workspace_id: &str, doc_id: &str) -> Result<i64> {
        let updates = self.updates.read().unwrap();
        Ok(updates
            .get(&key(workspace_id, doc_id))
            .and_then(|l| l.last())
            .map(|u| u.seq)
            .unwrap_or(0))
    }

    fn delete_doc(&self, workspace_id: &str, doc_id: &str) -> Result<DocRemoval> {
        let mut snapshots = self.snapshots.write().unwrap();
        let mut updates = self.updates.write().unwrap();
        let k = key(workspace_id, doc_id);

        let mut removal = DocRemoval::default();
        if let Some(snapshot) = snapshots.remove(&k) {
            removal.existed = true;
            removal.released.push(snapshot.blob);
        }
        if let Some(log) = updates.remove(&k) {
            removal.existed = removal.existed || !log.is_empty();
            removal.released.extend(log.into_iter().map(|u| u.blob));
        }
        Ok(removal)
    }

    fn list_docs(&self, workspace_id: &str) -> Result<Vec<String>> {
        let snapshots = self.snapshots.read().unwrap();
        let mut docs: Vec<String> = snapshots
            .keys()
            .filter(|(w, _)| w == workspace_id)
            .map(|(_, d)| d.clone())
            .collect();
        docs.sort();
        Ok(docs)
    }

    fn insert_history(&self, entry: &SnapshotHistoryEntry) -> Result<i64> {
        let mut histories = self.histories.write().unwrap();
        let rows = histories
            .entry(key(&entry.workspace_id, &entry.doc_id))
            .or_default();

        let mut timestamp = entry.timestamp;
        while rows.iter().any(|r| r.timestamp == timestamp) {
            timestamp += 1;
        }

        let mut stored = entry.clone();
        stored.timestamp = timestamp;
        rows.push(stored);
        rows.sort_by_key(|r| r.timestamp);
        Ok(timestamp)
    }

    fn get_history_at(
        &self,
        workspace_id: &str,
        doc_id: &str,
        timestamp: i64,
    ) -> Result<Option<SnapshotHistoryEntry>> {
        let histories = self.histories.read().unwrap();
        Ok(histories
            .get(&key(workspace_id, doc_id))
            .and_then(|rows| rows.iter().find(|r| r.timestamp == timestamp))
            .cloned())
    }

    fn histories_before(
        &self,
        workspace_id: &str,
        doc_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SnapshotHistoryEntry>> {
        let histories = self.histories.read().unwrap();
        let rows = histories
            .get(&key(workspace_id, doc_id))
            .map(|r| r.as_slice())
            .unwrap_or(&[]);

        Ok(rows
            .iter()
            .rev()
            .filter(|r| before.is_none_or(|b| r.timestamp < b))
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete_expired_histories(&self, now: i64) -> Result<Vec<BlobPointer>> {
        let mut histories = self.histories.write().unwrap();
        let mut released = Vec::new();

        for rows in histories.values_mut() {
            rows.retain(|r| {
                if r.is_expired(now) {
                    released.push(r.blob.clone());
                    false
                } else {
                    true
                }
            });
        }
        Ok(released)
    }
}
