//! Engine facade: wires storage, blob store, and merge engine into the
//! reader, writer, history manager, and root bootstrapper.
//!
//! Hosts construct one [`DocEngine`] per logical store and call into its
//! components; every operation runs synchronously in the caller's context.

use std::path::Path;
use std::sync::Arc;

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::bootstrap::RootBootstrapper;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::history::HistoryManager;
use crate::memory_storage::MemoryStorage;
use crate::merge::{MergeEngine, YrsMergeEngine};
use crate::presence::PresenceTracker;
use crate::reader::DocReader;
use crate::sqlite_storage::SqliteStorage;
use crate::storage::DocStorage;
use crate::types::{DocContent, SnapshotInput};
use crate::writer::DocWriter;

/// The assembled persistence engine.
pub struct DocEngine {
    storage: Arc<dyn DocStorage>,
    reader: DocReader,
    writer: Arc<DocWriter>,
    history: HistoryManager,
    bootstrap: RootBootstrapper,
    presence: PresenceTracker,
}

impl DocEngine {
    /// Assemble an engine from explicit collaborators.
    pub fn new(
        storage: Arc<dyn DocStorage>,
        blobs: Arc<dyn BlobStore>,
        merge: Arc<dyn MergeEngine>,
        config: &EngineConfig,
    ) -> Self {
        let reader = DocReader::new(storage.clone(), blobs.clone(), merge.clone());
        let writer = Arc::new(DocWriter::new(
            storage.clone(),
            blobs.clone(),
            merge.clone(),
        ));
        let history = HistoryManager::new(storage.clone(), blobs.clone(), writer.clone(), config);
        let bootstrap = RootBootstrapper::new(storage.clone(), blobs, merge);
        let presence = PresenceTracker::new(config.presence_ttl_ms());

        Self {
            storage,
            reader,
            writer,
            history,
            bootstrap,
            presence,
        }
    }

    /// Open an engine over a single SQLite database file.
    ///
    /// The same database holds snapshots, the update log, history, and
    /// externally-stored blobs.
    pub fn open<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self> {
        let storage = Arc::new(SqliteStorage::open_with_config(path, config)?);
        Ok(Self::new(
            storage.clone(),
            storage,
            Arc::new(YrsMergeEngine::new()),
            config,
        ))
    }

    /// Fully in-memory engine for tests and development.
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryBlobStore::new(config.inline_blob_threshold)),
            Arc::new(YrsMergeEngine::new()),
            config,
        )
    }

    /// The read path.
    pub fn reader(&self) -> &DocReader {
        &self.reader
    }

    /// The write path.
    pub fn writer(&self) -> &DocWriter {
        &self.writer
    }

    /// Version history operations.
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Root document bootstrapping.
    pub fn bootstrap(&self) -> &RootBootstrapper {
        &self.bootstrap
    }

    /// Collaborator presence tracking.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Append encoded updates to a document's log. See
    /// [`DocWriter::push_updates`].
    pub fn push_updates(
        &self,
        workspace_id: &str,
        doc_id: &str,
        updates: &[Vec<u8>],
        editor: &str,
    ) -> Result<usize> {
        self.writer.push_updates(workspace_id, doc_id, updates, editor)
    }

    /// Assemble the current content of a document. See [`DocReader::get_doc`].
    pub fn get_doc(&self, workspace_id: &str, doc_id: &str) -> Result<Option<DocContent>> {
        self.reader.get_doc(workspace_id, doc_id)
    }

    /// Compute the delta a caller is missing. See [`DocReader::get_doc_diff`].
    pub fn get_doc_diff(
        &self,
        workspace_id: &str,
        doc_id: &str,
        state_vector: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.reader.get_doc_diff(workspace_id, doc_id, state_vector)
    }

    /// List the ids of documents that have a live snapshot in a workspace.
    pub fn list_docs(&self, workspace_id: &str) -> Result<Vec<String>> {
        self.storage.list_docs(workspace_id)
    }

    /// Delete a document entirely. See [`DocWriter::delete_doc`].
    pub fn delete_doc(&self, workspace_id: &str, doc_id: &str) -> Result<bool> {
        self.writer.delete_doc(workspace_id, doc_id)
    }

    /// Fold the pending update log into a fresh snapshot.
    ///
    /// Reads the current merged content, archives the pre-compaction
    /// snapshot into history, then upserts the merged content as the new
    /// live snapshot. Returns `false` when the document does not exist, has
    /// nothing pending, or a concurrent compactor won the freshness gate.
    pub fn compact(&self, workspace_id: &str, doc_id: &str, editor: &str) -> Result<bool> {
        let Some(snapshot) = self.storage.get_snapshot(workspace_id, doc_id)? else {
            return Ok(false);
        };
        let Some(content) = self.reader.get_doc(workspace_id, doc_id)? else {
            return Ok(false);
        };
        if content.seq <= snapshot.seq {
            // Nothing pending to fold
            return Ok(false);
        }

        self.history.capture(workspace_id, doc_id, editor)?;

        self.writer.upsert_doc(SnapshotInput {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            blob: content.bytes,
            seq: content.seq,
            timestamp: chrono::Utc::now().timestamp_millis(),
            editor: editor.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use yrs::{Doc, ReadTxn, StateVector, Text, Transact};

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

    #[test]
    fn test_compact_folds_pending_updates() {
        let engine = DocEngine::in_memory(&EngineConfig::default());
        engine.bootstrap().create_root_document("w1", "alice").unwrap();
        engine
            .push_updates("w1", "w1", &[text_update("a"), text_update("b")], "alice")
            .unwrap();

        assert!(engine.compact("w1", "w1", "alice").unwrap());

        // After compaction the reader has nothing pending to merge
        let content = engine.get_doc("w1", "w1").unwrap().unwrap();
        assert_eq!(content.seq, 2);

        // The pre-compaction state was archived
        let histories = engine
            .history()
            .get_doc_histories("w1", "w1", None, None)
            .unwrap();
        assert_eq!(histories.len(), 1);

        // Compacting again with nothing pending is a no-op
        assert!(!engine.compact("w1", "w1", "alice").unwrap());
    }

    #[test]
    fn test_compact_absent_doc() {
        let engine = DocEngine::in_memory(&EngineConfig::default());
        assert!(!engine.compact("w1", "d1", "alice").unwrap());
    }

    #[test]
    fn test_sqlite_backed_engine_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let engine = DocEngine::open(file.path(), &EngineConfig::default()).unwrap();

        engine.bootstrap().create_root_document("w1", "alice").unwrap();
        engine
            .push_updates("w1", "w1", &[text_update("hello")], "alice")
            .unwrap();

        let content = engine.get_doc("w1", "w1").unwrap().unwrap();
        assert_eq!(content.seq, 1);
        assert_eq!(content.editor, "alice");
    }
}
