//! CRDT merge engine abstraction.
//!
//! The engine that actually merges encoded CRDT payloads is a collaborator:
//! the persistence core only depends on the [`MergeEngine`] trait. The default
//! implementation runs yrs in-process; deployments that route merges through a
//! remote service wrap their client in the same trait and compose it with
//! [`FallbackMergeEngine`] to fall back to the local engine when the remote
//! one is unavailable.

use std::sync::Arc;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::error::{Result, VellumError};

/// Trait for the CRDT merge/diff dependency.
///
/// Implementations must honor the CRDT contract: `merge` is commutative,
/// associative, and idempotent over its inputs.
pub trait MergeEngine: Send + Sync {
    /// Merge an ordered list of encoded payloads into a single encoded state.
    fn merge(&self, blobs: &[Vec<u8>]) -> Result<Vec<u8>>;

    /// Compute the minimal delta of `blob` that a replica holding
    /// `state_vector` is missing. A covering state vector yields an empty
    /// delta.
    fn diff(&self, blob: &[u8], state_vector: &[u8]) -> Result<Vec<u8>>;

    /// Derive the encoded state vector summarizing `blob`.
    fn state_vector(&self, blob: &[u8]) -> Result<Vec<u8>>;

    /// Encode a minimal valid empty document.
    fn empty_state(&self) -> Result<Vec<u8>>;
}

/// In-process merge engine backed by yrs.
#[derive(Debug, Default)]
pub struct YrsMergeEngine;

impl YrsMergeEngine {
    /// Create a new in-process engine.
    pub fn new() -> Self {
        Self
    }

    /// Build a doc from encoded payloads, failing on the first payload that
    /// does not decode or apply as a valid CRDT update.
    fn doc_from_blobs(blobs: &[Vec<u8>]) -> Result<Doc> {
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            for (i, blob) in blobs.iter().enumerate() {
                let update = Update::decode_v1(blob)
                    .map_err(|e| VellumError::Crdt(format!("failed to decode blob {}: {}", i, e)))?;
                txn.apply_update(update)
                    .map_err(|e| VellumError::Crdt(format!("failed to apply blob {}: {}", i, e)))?;
            }
        }
        Ok(doc)
    }
}

impl MergeEngine for YrsMergeEngine {
    fn merge(&self, blobs: &[Vec<u8>]) -> Result<Vec<u8>> {
        let doc = Self::doc_from_blobs(blobs)?;
        let txn = doc.transact();
        Ok(txn.encode_state_as_update_v1(&StateVector::default()))
    }

    fn diff(&self, blob: &[u8], state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| VellumError::Crdt(format!("failed to decode state vector: {}", e)))?;
        let doc = Self::doc_from_blobs(&[blob.to_vec()])?;
        let txn = doc.transact();
        Ok(txn.encode_diff_v1(&sv))
    }

    fn state_vector(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let doc = Self::doc_from_blobs(&[blob.to_vec()])?;
        let txn = doc.transact();
        Ok(txn.state_vector().encode_v1())
    }

    fn empty_state(&self) -> Result<Vec<u8>> {
        let doc = Doc::new();
        let txn = doc.transact();
        Ok(txn.encode_state_as_update_v1(&StateVector::default()))
    }
}

/// Ordered decorator: try the primary engine, fall back on failure.
///
/// Every operation is attempted on `primary` first; if it fails, the failure
/// is logged and the same operation runs against `fallback`. The fallback's
/// error, if any, is the one surfaced to the caller.
pub struct FallbackMergeEngine {
    primary: Arc<dyn MergeEngine>,
    fallback: Arc<dyn MergeEngine>,
}

impl FallbackMergeEngine {
    /// Compose a primary engine with a fallback.
    pub fn new(primary: Arc<dyn MergeEngine>, fallback: Arc<dyn MergeEngine>) -> Self {
        Self { primary, fallback }
    }

    fn run<T>(
        &self,
        op: &str,
        f: impl Fn(&dyn MergeEngine) -> Result<T>,
    ) -> Result<T> {
        match f(self.primary.as_ref()) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("primary merge engine failed during {}: {}", op, e);
                f(self.fallback.as_ref())
            }
        }
    }
}

impl MergeEngine for FallbackMergeEngine {
    fn merge(&self, blobs: &[Vec<u8>]) -> Result<Vec<u8>> {
        self.run("merge", |engine| engine.merge(blobs))
    }

    fn diff(&self, blob: &[u8], state_vector: &[u8]) -> Result<Vec<u8>> {
        self.run("diff", |engine| engine.diff(blob, state_vector))
    }

    fn state_vector(&self, blob: &[u8]) -> Result<Vec<u8>> {
        self.run("state_vector", |engine| engine.state_vector(blob))
    }

    fn empty_state(&self) -> Result<Vec<u8>> {
        self.run("empty_state", |engine| engine.empty_state())
    }
}
