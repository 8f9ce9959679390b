use thiserror::Error;

/// Unified error type for vellum engine operations
#[derive(Debug, Error)]
pub enum VellumError {
    /// Filesystem access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The SQLite backend reported a failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The TOML configuration could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A reference pointer names a blob that no longer exists
    #[error("Blob not found for pointer key '{0}'")]
    BlobMissing(String),

    /// A payload failed to decode or apply as a CRDT update
    #[error("CRDT error: {0}")]
    Crdt(String),

    /// The merge engine could not be reached
    #[error("Merge engine unavailable: {0}")]
    MergeUnavailable(String),
}

/// Result type alias for vellum engine operations
pub type Result<T> = std::result::Result<T, VellumError>;
