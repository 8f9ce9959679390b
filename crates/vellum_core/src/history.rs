//! Versioned snapshot history: archiving, browsing, restore, retention.
//!
//! History rows are append-only and immutable. A restore never rewrites
//! history: it creates a new live snapshot copied from the archived blob,
//! logged as forward progress. Rows leave the archive only through
//! expiry-driven cleanup, which an external scheduler must invoke; this
//! module performs no autonomous time-based action.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::storage::DocStorage;
use crate::types::{SnapshotHistoryEntry, SnapshotInput};
use crate::writer::DocWriter;

/// Manager for snapshot history operations.
pub struct HistoryManager {
    storage: Arc<dyn DocStorage>,
    blobs: Arc<dyn BlobStore>,
    writer: Arc<DocWriter>,
    retention_ms: i64,
    page_size: usize,
}

impl HistoryManager {
    /// Create a history manager over the given collaborators.
    pub fn new(
        storage: Arc<dyn DocStorage>,
        blobs: Arc<dyn BlobStore>,
        writer: Arc<DocWriter>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            storage,
            blobs,
            writer,
            retention_ms: config.history_retention_ms(),
            page_size: config.history_page_size,
        }
    }

    /// Archive an encoded state as a new history entry.
    ///
    /// Always additive. The entry's `expired_at` is set to now + retention;
    /// a timestamp collision with an existing entry bumps the key forward by
    /// 1 ms. Returns the stored entry.
    pub fn create_snapshot(
        &self,
        workspace_id: &str,
        doc_id: &str,
        blob: &[u8],
        state: Option<Vec<u8>>,
        user: &str,
    ) -> Result<SnapshotHistoryEntry> {
        let pointer = self.blobs.save(workspace_id, doc_id, blob)?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut entry = SnapshotHistoryEntry {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            timestamp: now,
            blob: pointer,
            state,
            expired_at: Some(now + self.retention_ms),
            created_by: user.to_string(),
        };
        entry.timestamp = self.storage.insert_history(&entry)?;
        Ok(entry)
    }

    /// Archive the current live snapshot of a document.
    ///
    /// Convenience hook for compaction paths. Returns the stored history
    /// timestamp, or `None` when the document has no live snapshot. The
    /// archived entry owns a fresh blob pointer; it never shares the live
    /// snapshot's pointer.
    pub fn capture(&self, workspace_id: &str, doc_id: &str, user: &str) -> Result<Option<i64>> {
        let Some(snapshot) = self.storage.get_snapshot(workspace_id, doc_id)? else {
            return Ok(None);
        };
        let bytes = self.blobs.resolve(&snapshot.blob)?;
        let entry =
            self.create_snapshot(workspace_id, doc_id, &bytes, snapshot.state.clone(), user)?;
        Ok(Some(entry.timestamp))
    }

    /// Page through a document's history, newest first.
    ///
    /// Keyset pagination: entries strictly before the `before` cursor (all
    /// newest when `None`), up to `limit` (the configured page size when
    /// `None`). The last entry's timestamp is the cursor for the next page.
    pub fn get_doc_histories(
        &self,
        workspace_id: &str,
        doc_id: &str,
        before: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotHistoryEntry>> {
        self.storage.histories_before(
            workspace_id,
            doc_id,
            before,
            limit.unwrap_or(self.page_size),
        )
    }

    /// Fetch an archived version and its resolved content.
    ///
    /// The lookup is an exact-timestamp match. Returns `Ok(None)` when no
    /// entry exists at that key.
    pub fn get_version(
        &self,
        workspace_id: &str,
        doc_id: &str,
        timestamp: i64,
    ) -> Result<Option<(Vec<u8>, SnapshotHistoryEntry)>> {
        let Some(entry) = self.storage.get_history_at(workspace_id, doc_id, timestamp)? else {
            return Ok(None);
        };
        let bytes = self.blobs.resolve(&entry.blob)?;
        Ok(Some((bytes, entry)))
    }

    /// Restore a document to an archived version.
    ///
    /// Creates a new live snapshot copied from the history entry's blob,
    /// advancing `seq` past every logged update so the restored content
    /// supersedes pending updates. The history row itself is untouched.
    /// Returns `false` when no entry exists at the timestamp or when a
    /// concurrent newer write won the snapshot gate.
    pub fn restore_version(
        &self,
        workspace_id: &str,
        doc_id: &str,
        timestamp: i64,
        user: &str,
    ) -> Result<bool> {
        let Some((bytes, entry)) = self.get_version(workspace_id, doc_id, timestamp)? else {
            return Ok(false);
        };

        let snapshot_seq = self
            .storage
            .get_snapshot(workspace_id, doc_id)?
            .map(|s| s.seq)
            .unwrap_or(0);
        let seq = snapshot_seq.max(self.storage.max_update_seq(workspace_id, doc_id)?);

        let accepted = self.writer.upsert_doc(SnapshotInput {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            blob: bytes,
            seq,
            timestamp: chrono::Utc::now().timestamp_millis(),
            editor: user.to_string(),
        })?;

        if accepted {
            log::debug!(
                "restored {}/{} to version {} (archived by {})",
                workspace_id,
                doc_id,
                entry.timestamp,
                entry.created_by
            );
        }
        Ok(accepted)
    }

    /// Remove every history entry whose `expired_at` has passed.
    ///
    /// Rows with a null or future `expired_at` are untouched. Rows are
    /// removed first, their blobs released after. Returns the number of
    /// removed entries.
    pub fn cleanup_expired_histories(&self, now: i64) -> Result<usize> {
        let released = self.storage.delete_expired_histories(now)?;
        let count = released.len();
        for pointer in &released {
            if let Err(e) = self.blobs.delete(pointer) {
                log::warn!("failed to release expired history blob: {}", e);
            }
        }
        if count > 0 {
            log::debug!("cleaned up {} expired history entries", count);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::memory_storage::MemoryStorage;
    use crate::merge::YrsMergeEngine;
    use crate::storage::DocStorage;

    use yrs::updates::decoder::Decode;
    use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

    fn text_update(content: &str) -> Vec<u8> {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("body");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, content);
        }
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    fn text_of(blob: &[u8]) -> String {
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            txn.apply_update(Update::decode_v1(blob).unwrap()).unwrap();
        }
        let text = doc.get_or_insert_text("body");
        let txn = doc.transact();
        text.get_string(&txn)
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        blobs: Arc<MemoryBlobStore>,
        writer: Arc<DocWriter>,
        history: HistoryManager,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let blobs = Arc::new(MemoryBlobStore::new(0));
        let writer = Arc::new(DocWriter::new(
            storage.clone(),
            blobs.clone(),
            Arc::new(YrsMergeEngine::new()),
        ));
        let history = HistoryManager::new(
            storage.clone(),
            blobs.clone(),
            writer.clone(),
            &EngineConfig::default(),
        );
        Fixture {
            storage,
            blobs,
            writer,
            history,
        }
    }

    #[test]
    fn test_create_snapshot_sets_expiry() {
        let f = fixture();
        let before = chrono::Utc::now().timestamp_millis();
        let entry = f
            .history
            .create_snapshot("w1", "d1", &text_update("v1"), None, "alice")
            .unwrap();

        let expired_at = entry.expired_at.unwrap();
        let retention = EngineConfig::default().history_retention_ms();
        assert!(expired_at >= before + retention);
        assert_eq!(entry.created_by, "alice");
    }

    #[test]
    fn test_capture_archives_live_snapshot_with_own_pointer() {
        let f = fixture();
        f.writer
            .upsert_doc(SnapshotInput {
                workspace_id: "w1".to_string(),
                doc_id: "d1".to_string(),
                blob: text_update("live"),
                seq: 0,
                timestamp: 1000,
                editor: "alice".to_string(),
            })
            .unwrap();

        let ts = f.history.capture("w1", "d1", "alice").unwrap().unwrap();

        // Live snapshot blob + archived copy
        assert_eq!(f.blobs.external_len(), 2);

        let (bytes, _) = f.history.get_version("w1", "d1", ts).unwrap().unwrap();
        assert_eq!(text_of(&bytes), "live");
    }

    #[test]
    fn test_capture_without_snapshot() {
        let f = fixture();
        assert!(f.history.capture("w1", "d1", "alice").unwrap().is_none());
    }

    #[test]
    fn test_get_version_exact_match_only() {
        let f = fixture();
        let entry = f
            .history
            .create_snapshot("w1", "d1", &text_update("v1"), None, "alice")
            .unwrap();

        assert!(f.history.get_version("w1", "d1", entry.timestamp).unwrap().is_some());
        // One millisecond off is a miss, not a tolerance window
        assert!(f.history.get_version("w1", "d1", entry.timestamp - 1).unwrap().is_none());
        assert!(f.history.get_version("w1", "d1", entry.timestamp + 1).unwrap().is_none());
    }

    #[test]
    fn test_restore_creates_new_snapshot_keeps_history() {
        let f = fixture();
        f.writer
            .upsert_doc(SnapshotInput {
                workspace_id: "w1".to_string(),
                doc_id: "d1".to_string(),
                blob: text_update("original"),
                seq: 0,
                timestamp: 1000,
                editor: "alice".to_string(),
            })
            .unwrap();
        let ts = f.history.capture("w1", "d1", "alice").unwrap().unwrap();

        // Later edits land in the log
        f.writer
            .push_updates("w1", "d1", &[text_update("later")], "bob")
            .unwrap();

        assert!(f.history.restore_version("w1", "d1", ts, "carol").unwrap());

        let snapshot = f.storage.get_snapshot("w1", "d1").unwrap().unwrap();
        assert_eq!(snapshot.updated_by, "carol");
        // Restore advanced seq past the logged update
        assert_eq!(snapshot.seq, 1);
        assert!(f.storage.updates_after_seq("w1", "d1", snapshot.seq).unwrap().is_empty());

        // The history row survived the restore
        assert!(f.history.get_version("w1", "d1", ts).unwrap().is_some());
    }

    #[test]
    fn test_restore_unknown_version() {
        let f = fixture();
        assert!(!f.history.restore_version("w1", "d1", 12345, "alice").unwrap());
    }

    #[test]
    fn test_histories_pagination_defaults() {
        let f = fixture();
        let mut timestamps = Vec::new();
        for i in 0..5 {
            let entry = f
                .history
                .create_snapshot("w1", "d1", &text_update(&format!("v{}", i)), None, "alice")
                .unwrap();
            timestamps.push(entry.timestamp);
        }

        let page = f.history.get_doc_histories("w1", "d1", None, Some(3)).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].timestamp, timestamps[4]);

        let next = f
            .history
            .get_doc_histories("w1", "d1", Some(page.last().unwrap().timestamp), Some(3))
            .unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next.last().unwrap().timestamp, timestamps[0]);
    }

    #[test]
    fn test_cleanup_releases_blobs() {
        let f = fixture();
        let entry = f
            .history
            .create_snapshot("w1", "d1", &text_update("old"), None, "alice")
            .unwrap();
        assert_eq!(f.blobs.external_len(), 1);

        // Not yet expired
        assert_eq!(f.history.cleanup_expired_histories(entry.timestamp).unwrap(), 0);

        let after_expiry = entry.expired_at.unwrap() + 1;
        assert_eq!(f.history.cleanup_expired_histories(after_expiry).unwrap(), 1);
        assert_eq!(f.blobs.external_len(), 0);
        assert!(f.history.get_version("w1", "d1", entry.timestamp).unwrap().is_none());
    }
}
