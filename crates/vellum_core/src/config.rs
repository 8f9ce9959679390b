//! Engine configuration.
//!
//! [`EngineConfig`] collects the tunables of the persistence engine. It can be
//! built from defaults, constructed directly, or parsed from TOML (typically
//! embedded in the host service's configuration file under an `[engine]`
//! section).

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default maximum blob size (bytes) stored inline in a pointer.
const DEFAULT_INLINE_BLOB_THRESHOLD: usize = 4096;

/// Default history retention period in days.
const DEFAULT_HISTORY_RETENTION_DAYS: i64 = 30;

/// Default page size for history listings.
const DEFAULT_HISTORY_PAGE_SIZE: usize = 20;

/// Default presence entry time-to-live in seconds.
const DEFAULT_PRESENCE_TTL_SECS: u64 = 30;

/// Tunable parameters of the persistence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Blobs at or below this size (bytes) are stored inline in the pointer
    /// itself rather than in the external blob location.
    pub inline_blob_threshold: usize,

    /// How long (days) archived snapshot history entries are retained before
    /// `cleanup_expired_histories` removes them.
    pub history_retention_days: i64,

    /// Default number of entries per page for history listings.
    pub history_page_size: usize,

    /// Seconds of inactivity after which a presence entry is evicted.
    pub presence_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inline_blob_threshold: DEFAULT_INLINE_BLOB_THRESHOLD,
            history_retention_days: DEFAULT_HISTORY_RETENTION_DAYS,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            presence_ttl_secs: DEFAULT_PRESENCE_TTL_SECS,
        }
    }
}

impl EngineConfig {
    /// Parse a config from a TOML string.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// History retention period in milliseconds.
    pub fn history_retention_ms(&self) -> i64 {
        self.history_retention_days * 24 * 60 * 60 * 1000
    }

    /// Presence TTL in milliseconds.
    pub fn presence_ttl_ms(&self) -> i64 {
        self.presence_ttl_secs as i64 * 1000
    }
}
