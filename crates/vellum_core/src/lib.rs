#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Blob pointer indirection and byte storage
pub mod blob;

/// Root document bootstrapping
pub mod bootstrap;

/// Engine configuration
pub mod config;

/// Engine facade
pub mod engine;

/// Error (common error types)
pub mod error;

/// Versioned snapshot history
pub mod history;

/// In-memory storage backend (tests)
pub mod memory_storage;

/// CRDT merge engine abstraction
pub mod merge;

/// Collaborator presence tracking
pub mod presence;

/// Read path: document assembly and diffs
pub mod reader;

/// SQLite storage backend
pub mod sqlite_storage;

/// Storage abstraction
pub mod storage;

/// Core record types
pub mod types;

/// Write path: appends, compaction, deletion
pub mod writer;

pub use blob::{BlobPointer, BlobStore, MemoryBlobStore};
pub use bootstrap::RootBootstrapper;
pub use config::EngineConfig;
pub use engine::DocEngine;
pub use error::{Result, VellumError};
pub use history::HistoryManager;
pub use memory_storage::MemoryStorage;
pub use merge::{FallbackMergeEngine, MergeEngine, YrsMergeEngine};
pub use presence::PresenceTracker;
pub use reader::DocReader;
pub use sqlite_storage::SqliteStorage;
pub use storage::{DocRemoval, DocStorage, SnapshotUpsert};
pub use types::{DocContent, DocUpdate, Snapshot, SnapshotHistoryEntry, SnapshotInput};
pub use writer::DocWriter;
