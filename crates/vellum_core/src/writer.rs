//! Write path: appending updates, compacting snapshots, deleting documents.
//!
//! Pointer lifecycle on compaction is write-then-release: the new blob is
//! persisted before the snapshot row flips to it, and the superseded pointer
//! is released only afterwards. A crash in between leaks an unreferenced blob
//! rather than leaving a snapshot row that points at nothing.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::error::Result;
use crate::merge::MergeEngine;
use crate::storage::{DocStorage, SnapshotUpsert};
use crate::types::{Snapshot, SnapshotInput};

/// Writer for the append, compaction, and deletion paths.
pub struct DocWriter {
    storage: Arc<dyn DocStorage>,
    blobs: Arc<dyn BlobStore>,
    merge: Arc<dyn MergeEngine>,
}

impl DocWriter {
    /// Create a writer over the given collaborators.
    pub fn new(
        storage: Arc<dyn DocStorage>,
        blobs: Arc<dyn BlobStore>,
        merge: Arc<dyn MergeEngine>,
    ) -> Self {
        Self {
            storage,
            blobs,
            merge,
        }
    }

    /// Append a list of encoded updates to a document's log.
    ///
    /// Each update is persisted independently: blob first, then its log row.
    /// There is no multi-row atomicity; on the first failure the remaining
    /// updates are skipped and the number of fully persisted updates is
    /// returned (possibly zero). The storage layer assigns consecutive
    /// sequence numbers and strictly increasing creation timestamps.
    pub fn push_updates(
        &self,
        workspace_id: &str,
        doc_id: &str,
        updates: &[Vec<u8>],
        editor: &str,
    ) -> Result<usize> {
        let mut accepted = 0;
        for bytes in updates {
            let pointer = match self.blobs.save(workspace_id, doc_id, bytes) {
                Ok(pointer) => pointer,
                Err(e) => {
                    log::warn!(
                        "push_updates {}/{}: blob save failed after {} accepted: {}",
                        workspace_id,
                        doc_id,
                        accepted,
                        e
                    );
                    break;
                }
            };

            if let Err(e) = self
                .storage
                .append_update(workspace_id, doc_id, &pointer, editor)
            {
                log::warn!(
                    "push_updates {}/{}: append failed after {} accepted: {}",
                    workspace_id,
                    doc_id,
                    accepted,
                    e
                );
                // The orphaned blob is unreferenced; best-effort release
                if let Err(e) = self.blobs.delete(&pointer) {
                    log::warn!("failed to release orphaned update blob: {}", e);
                }
                break;
            }
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Create or replace the live snapshot of a document (compaction).
    ///
    /// Returns `Ok(false)` without mutation when the input timestamp is
    /// strictly older than the stored snapshot's `updated_at`. The opaque
    /// CRDT state vector is freshly derived from the input blob on every
    /// call, never carried over from the previous snapshot.
    pub fn upsert_doc(&self, input: SnapshotInput) -> Result<bool> {
        let state = self.merge.state_vector(&input.blob)?;
        let pointer = self
            .blobs
            .save(&input.workspace_id, &input.doc_id, &input.blob)?;

        let snapshot = Snapshot {
            workspace_id: input.workspace_id.clone(),
            doc_id: input.doc_id.clone(),
            blob: pointer.clone(),
            state: Some(state),
            seq: input.seq,
            created_at: input.timestamp,
            updated_at: input.timestamp,
            created_by: input.editor.clone(),
            updated_by: input.editor,
        };

        match self.storage.upsert_snapshot(&snapshot)? {
            SnapshotUpsert::Created => Ok(true),
            SnapshotUpsert::Replaced(old) => {
                if let Err(e) = self.blobs.delete(&old) {
                    log::warn!(
                        "failed to release superseded snapshot blob for {}/{}: {}",
                        input.workspace_id,
                        input.doc_id,
                        e
                    );
                }
                Ok(true)
            }
            SnapshotUpsert::Stale => {
                // The gate rejected the write; release the blob we just saved
                if let Err(e) = self.blobs.delete(&pointer) {
                    log::warn!("failed to release stale snapshot blob: {}", e);
                }
                Ok(false)
            }
        }
    }

    /// Delete a document: its snapshot, its whole update log, and the blobs
    /// they referenced.
    ///
    /// Rows are removed first, pointers released after; the steps are not
    /// atomic across the blob store. Returns whether anything existed.
    pub fn delete_doc(&self, workspace_id: &str, doc_id: &str) -> Result<bool> {
        let removal = self.storage.delete_doc(workspace_id, doc_id)?;
        for pointer in &removal.released {
            if let Err(e) = self.blobs.delete(pointer) {
                log::warn!(
                    "delete_doc {}/{}: failed to release blob: {}",
                    workspace_id,
                    doc_id,
                    e
                );
            }
        }
        Ok(removal.existed)
    }
}
