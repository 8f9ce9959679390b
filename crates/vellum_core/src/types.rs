//! Core record types of the persistence engine.
//!
//! These structs mirror the persisted state layout: the append-only update
//! log, the single live snapshot per document, and the append-only snapshot
//! history archive.

use serde::{Deserialize, Serialize};

use crate::blob::BlobPointer;

/// One append-only entry in a document's update log.
///
/// Immutable once written. `seq` is strictly increasing and unique per
/// (workspace_id, doc_id); the log is never mutated or reordered, only
/// appended and (on compaction) superseded by a newer snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocUpdate {
    /// Workspace the document belongs to
    pub workspace_id: String,

    /// Document identifier, unique within the workspace
    pub doc_id: String,

    /// Transactionally-assigned sequence number; the sole order authority
    pub seq: i64,

    /// Pointer to the encoded CRDT update payload
    pub blob: BlobPointer,

    /// Unix timestamp (milliseconds); descriptive metadata, strictly
    /// increasing per document for stable range queries
    pub created_at: i64,

    /// Editor that submitted this update
    pub created_by: String,
}

/// The live compacted state of a document. Exactly one row per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Workspace the document belongs to
    pub workspace_id: String,

    /// Document identifier, unique within the workspace
    pub doc_id: String,

    /// Pointer to the compacted CRDT state payload
    pub blob: BlobPointer,

    /// Opaque CRDT state vector of the compacted content, freshly derived at
    /// every compaction
    pub state: Option<Vec<u8>>,

    /// Highest update seq folded into this snapshot; the reader merges only
    /// updates with a greater seq
    pub seq: i64,

    /// Unix timestamp (milliseconds) when the snapshot row was first created
    pub created_at: i64,

    /// Unix timestamp (milliseconds) of the last accepted write; monotonically
    /// non-decreasing, older writes are rejected
    pub updated_at: i64,

    /// User that created the snapshot row
    pub created_by: String,

    /// User whose write last touched the snapshot
    pub updated_by: String,
}

/// Caller-supplied input for a snapshot upsert (compaction or restore).
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    /// Workspace the document belongs to
    pub workspace_id: String,

    /// Document identifier, unique within the workspace
    pub doc_id: String,

    /// Compacted CRDT state payload (raw bytes, stored via the blob store)
    pub blob: Vec<u8>,

    /// Highest update seq the payload reflects
    pub seq: i64,

    /// Freshness timestamp (milliseconds); writes strictly older than the
    /// stored snapshot's `updated_at` are rejected
    pub timestamp: i64,

    /// Editor performing the write
    pub editor: String,
}

/// One archived point-in-time state of a document.
///
/// Append-only and immutable; removed only by expiry-driven cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHistoryEntry {
    /// Workspace the document belongs to
    pub workspace_id: String,

    /// Document identifier, unique within the workspace
    pub doc_id: String,

    /// Exact point-in-time key (milliseconds); part of the primary key
    pub timestamp: i64,

    /// Pointer to the archived CRDT state payload
    pub blob: BlobPointer,

    /// Opaque CRDT state vector of the archived content
    pub state: Option<Vec<u8>>,

    /// When this entry becomes eligible for retention cleanup; `None` means
    /// the entry is kept indefinitely
    pub expired_at: Option<i64>,

    /// User whose write produced the archived state
    pub created_by: String,
}

impl SnapshotHistoryEntry {
    /// Whether the entry is expired relative to `now` (milliseconds).
    pub fn is_expired(&self, now: i64) -> bool {
        self.expired_at.is_some_and(|at| at < now)
    }
}

/// The assembled current content of a document, as returned by the reader.
#[derive(Debug, Clone)]
pub struct DocContent {
    /// Fully merged CRDT state payload
    pub bytes: Vec<u8>,

    /// Timestamp (milliseconds) of the newest contributing write
    pub timestamp: i64,

    /// Editor of the newest contributing write
    pub editor: String,

    /// Highest update seq reflected in `bytes`
    pub seq: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_entry_is_expired() {
        let mut entry = SnapshotHistoryEntry {
            workspace_id: "w1".to_string(),
            doc_id: "d1".to_string(),
            timestamp: 1000,
            blob: BlobPointer::inline(b"x".to_vec()),
            state: None,
            expired_at: Some(2000),
            created_by: "alice".to_string(),
        };

        assert!(!entry.is_expired(1500));
        assert!(!entry.is_expired(2000));
        assert!(entry.is_expired(2001));

        entry.expired_at = None;
        assert!(!entry.is_expired(i64::MAX));
    }

    #[test]
    fn test_doc_update_serde_round_trip() {
        let update = DocUpdate {
            workspace_id: "w1".to_string(),
            doc_id: "d1".to_string(),
            seq: 3,
            blob: BlobPointer::reference("w1/d1/abc".to_string()),
            created_at: 1234,
            created_by: "bob".to_string(),
        };

        let json = serde_json::to_string(&update).unwrap();
        let back: DocUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 3);
        assert_eq!(back.blob, update.blob);
    }
}
