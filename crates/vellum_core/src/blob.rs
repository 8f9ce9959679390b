//! Blob pointer indirection and the blob store abstraction.
//!
//! A persisted blob field is a [`BlobPointer`]: either the payload bytes
//! inline, or a reference key into an external byte store. The split is
//! decided at save time by a size threshold and resolved transparently by
//! [`BlobStore::resolve`] through an exhaustive match, never by inspecting
//! byte patterns.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, VellumError};

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    use serde::de::Error;
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(D::Error::custom)
}

/// Opaque handle to a stored blob.
///
/// Serialized as tagged JSON so the variant survives persistence; inline
/// payloads are base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobPointer {
    /// Payload stored directly in the pointer
    Inline {
        /// The blob bytes themselves
        #[serde(serialize_with = "serialize_base64", deserialize_with = "deserialize_base64")]
        bytes: Vec<u8>,
    },

    /// Payload stored in the external byte store under `key`
    Reference {
        /// Location key within the blob store namespace
        key: String,
    },
}

impl BlobPointer {
    /// Create an inline pointer carrying the bytes themselves.
    pub fn inline(bytes: Vec<u8>) -> Self {
        Self::Inline { bytes }
    }

    /// Create a reference pointer to an external location.
    pub fn reference(key: String) -> Self {
        Self::Reference { key }
    }

    /// Whether this pointer carries its payload inline.
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

/// Trait for byte storage backends with pointer indirection.
///
/// Implementations decide at `save` time whether a payload is embedded in the
/// returned pointer or written to an external location. `delete` on an inline
/// pointer is a no-op: there is nothing external to release.
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under the document's namespace and return a pointer.
    fn save(&self, workspace_id: &str, doc_id: &str, bytes: &[u8]) -> Result<BlobPointer>;

    /// Resolve a pointer back to the payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VellumError::BlobMissing`] if a reference pointer names a
    /// location that no longer exists.
    fn resolve(&self, pointer: &BlobPointer) -> Result<Vec<u8>>;

    /// Release the external storage behind a pointer, if any.
    fn delete(&self, pointer: &BlobPointer) -> Result<()>;
}

/// In-memory blob store.
///
/// Payloads at or below the inline threshold are embedded in the pointer;
/// larger payloads go into a keyed map. Thread-safe via `RwLock`, data is
/// lost when dropped.
#[derive(Debug)]
pub struct MemoryBlobStore {
    inline_threshold: usize,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create a store with the given inline threshold (bytes).
    pub fn new(inline_threshold: usize) -> Self {
        Self {
            inline_threshold,
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of externally stored (non-inline) blobs.
    pub fn external_len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().inline_blob_threshold)
    }
}

/// Build a fresh reference key in the document's namespace.
pub(crate) fn reference_key(workspace_id: &str, doc_id: &str) -> String {
    format!("{}/{}/{}", workspace_id, doc_id, uuid::Uuid::new_v4())
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, workspace_id: &str, doc_id: &str, bytes: &[u8]) -> Result<BlobPointer> {
        if bytes.len() <= self.inline_threshold {
            return Ok(BlobPointer::inline(bytes.to_vec()));
        }

        let key = reference_key(workspace_id, doc_id);
        let mut blobs = self.blobs.write().unwrap();
        blobs.insert(key.clone(), bytes.to_vec());
        Ok(BlobPointer::reference(key))
    }

    fn resolve(&self, pointer: &BlobPointer) -> Result<Vec<u8>> {
        match pointer {
            BlobPointer::Inline { bytes } => Ok(bytes.clone()),
            BlobPointer::Reference { key } => {
                let blobs = self.blobs.read().unwrap();
                blobs
                    .get(key)
                    .cloned()
                    .ok_or_else(|| VellumError::BlobMissing(key.clone()))
            }
        }
    }

    fn delete(&self, pointer: &BlobPointer) -> Result<()> {
        match pointer {
            BlobPointer::Inline { .. } => Ok(()),
            BlobPointer::Reference { key } => {
                let mut blobs = self.blobs.write().unwrap();
                blobs.remove(key);
                Ok(())
            }
        }
    }
}
