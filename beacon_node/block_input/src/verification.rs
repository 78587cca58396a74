//! The seam to the cryptographic layer.
//!
//! Batch KZG and inclusion-proof verification is delegated to the node's crypto stack; this
//! subsystem only fixes the call shape so that sync-side validators can verify sidecars
//! before caching them.

use std::sync::Arc;
use types::{BlobSidecar, DataColumnSidecar, EthSpec, Hash256, Slot};

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationError {
    InvalidBlob { index: u64, reason: String },
    InvalidColumn { index: u64, reason: String },
    Backend(String),
}

pub trait SidecarVerifier<E: EthSpec>: Send + Sync {
    /// Batch-verify blob sidecars against the block identified by `(slot, block_root)`:
    /// KZG proofs plus commitment inclusion proofs. Returns an error naming the first
    /// offending sidecar.
    fn validate_block_blob_sidecars(
        &self,
        slot: Slot,
        block_root: Hash256,
        expected_count: usize,
        sidecars: &[Arc<BlobSidecar<E>>],
    ) -> Result<(), VerificationError>;

    /// Batch-verify data-column sidecars against the block identified by
    /// `(slot, block_root)` carrying `blob_count` blobs.
    fn validate_block_data_column_sidecars(
        &self,
        slot: Slot,
        block_root: Hash256,
        blob_count: usize,
        sidecars: &[Arc<DataColumnSidecar<E>>],
    ) -> Result<(), VerificationError>;
}

/// A verifier that accepts everything. For tests and harnesses without a crypto stack.
#[derive(Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl<E: EthSpec> SidecarVerifier<E> for AcceptAllVerifier {
    fn validate_block_blob_sidecars(
        &self,
        _slot: Slot,
        _block_root: Hash256,
        _expected_count: usize,
        _sidecars: &[Arc<BlobSidecar<E>>],
    ) -> Result<(), VerificationError> {
        Ok(())
    }

    fn validate_block_data_column_sidecars(
        &self,
        _slot: Slot,
        _block_root: Hash256,
        _blob_count: usize,
        _sidecars: &[Arc<DataColumnSidecar<E>>],
    ) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// A verifier that rejects everything. For failure-path tests.
#[derive(Default, Clone, Copy)]
pub struct RejectAllVerifier;

impl<E: EthSpec> SidecarVerifier<E> for RejectAllVerifier {
    fn validate_block_blob_sidecars(
        &self,
        _slot: Slot,
        _block_root: Hash256,
        _expected_count: usize,
        sidecars: &[Arc<BlobSidecar<E>>],
    ) -> Result<(), VerificationError> {
        Err(VerificationError::InvalidBlob {
            index: sidecars.first().map(|s| s.index).unwrap_or(0),
            reason: "rejecting verifier".into(),
        })
    }

    fn validate_block_data_column_sidecars(
        &self,
        _slot: Slot,
        _block_root: Hash256,
        _blob_count: usize,
        sidecars: &[Arc<DataColumnSidecar<E>>],
    ) -> Result<(), VerificationError> {
        Err(VerificationError::InvalidColumn {
            index: sidecars.first().map(|s| s.index).unwrap_or(0),
            reason: "rejecting verifier".into(),
        })
    }
}
