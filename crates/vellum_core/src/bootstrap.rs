//! Root document bootstrapping.
//!
//! Every workspace has a distinguished root document whose id equals the
//! workspace id. A workspace without one leaves clients waiting to sync
//! indefinitely, so creation is a correctness guarantee: idempotent
//! create-if-absent of a minimal valid empty CRDT document at seq 0.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::error::Result;
use crate::merge::MergeEngine;
use crate::storage::DocStorage;
use crate::types::Snapshot;

/// Ensures a workspace's root document exists.
pub struct RootBootstrapper {
    storage: Arc<dyn DocStorage>,
    blobs: Arc<dyn BlobStore>,
    merge: Arc<dyn MergeEngine>,
}

impl RootBootstrapper {
    /// Create a bootstrapper over the given collaborators.
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

    /// Whether the workspace's root document exists.
    pub fn has_root_document(&self, workspace_id: &str) -> Result<bool> {
        Ok(self
            .storage
            .get_snapshot(workspace_id, workspace_id)?
            .is_some())
    }

    /// Create the root document if it does not exist.
    ///
    /// Returns `true` when this call created it, `false` when it already
    /// existed. The insert is storage-level create-if-absent, so two racing
    /// calls leave exactly one snapshot row; the loser's blob is released.
    pub fn create_root_document(&self, workspace_id: &str, creator: &str) -> Result<bool> {
        if self.has_root_document(workspace_id)? {
            return Ok(false);
        }

        let empty = self.merge.empty_state()?;
        let state = self.merge.state_vector(&empty)?;
        let pointer = self.blobs.save(workspace_id, workspace_id, &empty)?;
        let now = chrono::Utc::now().timestamp_millis();

        let created = self.storage.insert_snapshot(&Snapshot {
            workspace_id: workspace_id.to_string(),
            doc_id: workspace_id.to_string(),
            blob: pointer.clone(),
            state: Some(state),
            seq: 0,
            created_at: now,
            updated_at: now,
            created_by: creator.to_string(),
            updated_by: creator.to_string(),
        })?;

        if !created {
            // Lost the race; the surviving row keeps its own blob
            if let Err(e) = self.blobs.delete(&pointer) {
                log::warn!("failed to release losing bootstrap blob: {}", e);
            }
            log::debug!("root document for {} already bootstrapped", workspace_id);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::memory_storage::MemoryStorage;
    use crate::merge::YrsMergeEngine;
    use crate::reader::DocReader;

    fn bootstrapper() -> (Arc<MemoryStorage>, Arc<MemoryBlobStore>, RootBootstrapper) {
        let storage = Arc::new(MemoryStorage::new());
        let blobs = Arc::new(MemoryBlobStore::new(0));
        let bootstrapper = RootBootstrapper::new(
            storage.clone(),
            blobs.clone(),
            Arc::new(YrsMergeEngine::new()),
        );
        (storage, blobs, bootstrapper)
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let (storage, _, bootstrapper) = bootstrapper();

        assert!(!bootstrapper.has_root_document("w1").unwrap());
        assert!(bootstrapper.create_root_document("w1", "alice").unwrap());
        assert!(bootstrapper.has_root_document("w1").unwrap());

        // Second call changes nothing
        assert!(!bootstrapper.create_root_document("w1", "bob").unwrap());

        let snapshot = storage.get_snapshot("w1", "w1").unwrap().unwrap();
        assert_eq!(snapshot.seq, 0);
        assert_eq!(snapshot.created_by, "alice");
    }

    #[test]
    fn test_bootstrap_blob_is_released_on_lost_race() {
        let (_, blobs, bootstrapper) = bootstrapper();
        bootstrapper.create_root_document("w1", "alice").unwrap();
        bootstrapper.create_root_document("w1", "bob").unwrap();

        // Exactly one blob survives
        assert_eq!(blobs.external_len(), 1);
    }

    #[test]
    fn test_root_document_is_readable_and_empty() {
        let (storage, blobs, bootstrapper) = bootstrapper();
        bootstrapper.create_root_document("w1", "alice").unwrap();

        let reader = DocReader::new(storage, blobs, Arc::new(YrsMergeEngine::new()));
        let content = reader.get_doc("w1", "w1").unwrap().unwrap();
        assert_eq!(content.seq, 0);
        assert!(!content.bytes.is_empty());
    }
}
