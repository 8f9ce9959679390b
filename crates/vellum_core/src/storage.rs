//! Storage abstraction for the persistence engine.
//!
//! [`DocStorage`] covers the three persisted tables: the single live snapshot
//! per document, the append-only update log, and the append-only snapshot
//! history archive. Backends: [`crate::SqliteStorage`] for deployment,
//! [`crate::MemoryStorage`] for tests.
//!
//! Two correctness-critical invariants live at this layer rather than in the
//! callers:
//!
//! 1. **Sequence assignment.** `append_update` assigns `max(seq) + 1` inside a
//!    transaction, with a composite uniqueness constraint on
//!    (workspace_id, doc_id, seq) as the backstop. Two logically concurrent
//!    appends can never both claim the same seq.
//! 2. **Snapshot freshness.** `upsert_snapshot` rejects writes whose
//!    `updated_at` is strictly older than the stored value, atomically with
//!    the write itself. Concurrent compactors get exactly one winner.

use crate::blob::BlobPointer;
use crate::error::Result;
use crate::types::{DocUpdate, Snapshot, SnapshotHistoryEntry};

/// Outcome of a gated snapshot upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotUpsert {
    /// No snapshot existed; a new row was created.
    Created,

    /// The existing row was updated in place. Carries the superseded blob
    /// pointer so the caller can release it after the write.
    Replaced(BlobPointer),

    /// The write was strictly older than the stored snapshot; nothing changed.
    Stale,
}

/// Result of removing a document's rows.
#[derive(Debug, Default)]
pub struct DocRemoval {
    /// Whether any row existed for the document.
    pub existed: bool,

    /// Pointers referenced by the removed rows, to be released by the caller
    /// after the rows are gone.
    pub released: Vec<BlobPointer>,
}

/// Trait for persistence backends of the engine.
pub trait DocStorage: Send + Sync {
    /// Load the live snapshot of a document, if any.
    fn get_snapshot(&self, workspace_id: &str, doc_id: &str) -> Result<Option<Snapshot>>;

    /// Insert a snapshot only if the document has none yet.
    ///
    /// Returns `false` (and writes nothing) when a row already exists. This
    /// is the bootstrap primitive: two racing calls leave exactly one row.
    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<bool>;

    /// Create or update the live snapshot, gated on `updated_at` freshness.
    ///
    /// A write with `updated_at` strictly older than the stored value returns
    /// [`SnapshotUpsert::Stale`] without mutation. On replacement the stored
    /// row keeps its original `created_at`/`created_by`.
    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUpsert>;

    /// Append one update to a document's log.
    ///
    /// The backend assigns the next sequence number and a `created_at`
    /// strictly greater than the previous row's (at least 1 ms apart), both
    /// inside a single transaction. Returns the stored row.
    fn append_update(
        &self,
        workspace_id: &str,
        doc_id: &str,
        blob: &BlobPointer,
        created_by: &str,
    ) -> Result<DocUpdate>;

    /// All updates with `seq` greater than `seq`, in ascending seq order.
    fn updates_after_seq(&self, workspace_id: &str, doc_id: &str, seq: i64)
    -> Result<Vec<DocUpdate>>;

    /// Highest assigned update seq for a document, or 0 if the log is empty.
    fn max_update_seq(&self, workspace_id: &str, doc_id: &str) -> Result<i64>;

    /// Remove the snapshot row and every update row of a document.
    ///
    /// Rows are removed first; the pointers they referenced are returned so
    /// the caller can release them afterwards.
    fn delete_doc(&self, workspace_id: &str, doc_id: &str) -> Result<DocRemoval>;

    /// List the ids of documents that have a live snapshot in a workspace.
    fn list_docs(&self, workspace_id: &str) -> Result<Vec<String>>;

    /// Append a history entry.
    ///
    /// `timestamp` is part of the primary key; on collision the backend bumps
    /// it forward by 1 ms until free. Returns the timestamp actually stored.
    fn insert_history(&self, entry: &SnapshotHistoryEntry) -> Result<i64>;

    /// Look up a history entry by its exact timestamp key.
    fn get_history_at(
        &self,
        workspace_id: &str,
        doc_id: &str,
        timestamp: i64,
    ) -> Result<Option<SnapshotHistoryEntry>>;

    /// Reverse-chronological keyset page of history entries.
    ///
    /// Returns up to `limit` entries with `timestamp` strictly before
    /// `before` (or the newest entries when `before` is `None`), newest
    /// first.
    fn histories_before(
        &self,
        workspace_id: &str,
        doc_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SnapshotHistoryEntry>>;

    /// Remove every history entry whose `expired_at` has passed.
    ///
    /// Entries with a null or future `expired_at` are untouched. Returns the
    /// pointers of the removed rows for the caller to release.
    fn delete_expired_histories(&self, now: i64) -> Result<Vec<BlobPointer>>;
}
