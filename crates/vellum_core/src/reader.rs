//! Read path: assembling the current readable content of a document.
//!
//! The reader never mutates anything. It loads the live snapshot, folds in
//! every update the snapshot has not yet absorbed (selected by `seq`, the
//! sole order authority), and delegates the fold to the merge engine. Safe
//! for unbounded concurrent callers.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::error::Result;
use crate::merge::MergeEngine;
use crate::storage::DocStorage;
use crate::types::{DocContent, Snapshot};

/// Read-through assembler of current document content.
pub struct DocReader {
    storage: Arc<dyn DocStorage>,
    blobs: Arc<dyn BlobStore>,
    merge: Arc<dyn MergeEngine>,
}

impl DocReader {
    /// Create a reader over the given collaborators.
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

    /// Assemble the current content of a document.
    ///
    /// Returns `Ok(None)` when the document has no live snapshot: a document
    /// with updates but no snapshot is not resolvable. When the merge engine
    /// fails, the reader fails closed and serves the last good snapshot
    /// content instead of partial output.
    pub fn get_doc(&self, workspace_id: &str, doc_id: &str) -> Result<Option<DocContent>> {
        let Some(snapshot) = self.storage.get_snapshot(workspace_id, doc_id)? else {
            return Ok(None);
        };

        let pending = self
            .storage
            .updates_after_seq(workspace_id, doc_id, snapshot.seq)?;
        let base = self.blobs.resolve(&snapshot.blob)?;

        if pending.is_empty() {
            return Ok(Some(Self::snapshot_content(&snapshot, base)));
        }

        let mut inputs = Vec::with_capacity(pending.len() + 1);
        inputs.push(base.clone());
        for update in &pending {
            match self.blobs.resolve(&update.blob) {
                Ok(bytes) => inputs.push(bytes),
                Err(e) => {
                    log::warn!(
                        "failed to resolve pending update {}/{} seq {}: {}; serving snapshot",
                        workspace_id,
                        doc_id,
                        update.seq,
                        e
                    );
                    return Ok(Some(Self::snapshot_content(&snapshot, base)));
                }
            }
        }

        match self.merge.merge(&inputs) {
            Ok(bytes) => {
                // Timestamp and editor come from the newest contributing update
                let newest = pending.last().expect("pending is non-empty");
                Ok(Some(DocContent {
                    bytes,
                    timestamp: newest.created_at,
                    editor: newest.created_by.clone(),
                    seq: newest.seq,
                }))
            }
            Err(e) => {
                log::warn!(
                    "merge failed for {}/{}: {}; serving last good snapshot",
                    workspace_id,
                    doc_id,
                    e
                );
                Ok(Some(Self::snapshot_content(&snapshot, base)))
            }
        }
    }

    /// Compute the minimal delta a caller holding `state_vector` is missing.
    ///
    /// Returns `Ok(None)` when the document does not exist. A state vector
    /// that already covers the full state yields an empty delta.
    pub fn get_doc_diff(
        &self,
        workspace_id: &str,
        doc_id: &str,
        state_vector: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let Some(content) = self.get_doc(workspace_id, doc_id)? else {
            return Ok(None);
        };
        Ok(Some(self.merge.diff(&content.bytes, state_vector)?))
    }

    fn snapshot_content(snapshot: &Snapshot, bytes: Vec<u8>) -> DocContent {
        DocContent {
            bytes,
            timestamp: snapshot.updated_at,
            editor: snapshot.updated_by.clone(),
            seq: snapshot.seq,
        }
    }
}
