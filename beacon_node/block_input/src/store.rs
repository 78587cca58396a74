//! The durable-store collaborator boundary.
//!
//! The key-value layout belongs to the store implementation; this subsystem only relies on
//! the call shape: blocks keyed by root (with a pre-serialized fast path), blob sidecars as a
//! per-root vector, and data columns as a per-root custody subset.

use ssz::Encode;
use std::collections::HashMap;
use std::sync::Arc;
use types::{BlobSidecar, DataColumnSidecar, EthSpec, Hash256, SignedBeaconBlock};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Backend(String),
}

pub trait Store<E: EthSpec>: Send + Sync {
    /// Canonical encode-and-put of a block.
    fn put_block(&self, block_root: Hash256, block: &SignedBeaconBlock<E>)
    -> Result<(), StoreError>;

    /// Put a block from already-serialized bytes, skipping the encode.
    fn put_block_bytes(&self, block_root: Hash256, bytes: Vec<u8>) -> Result<(), StoreError>;

    fn put_blob_sidecars(
        &self,
        block_root: Hash256,
        blobs: &[Arc<BlobSidecar<E>>],
    ) -> Result<(), StoreError>;

    fn put_data_columns(
        &self,
        block_root: Hash256,
        columns: &[Arc<DataColumnSidecar<E>>],
    ) -> Result<(), StoreError>;

    fn delete_block(&self, block_root: Hash256) -> Result<(), StoreError>;

    fn delete_blob_sidecars(&self, block_root: Hash256) -> Result<(), StoreError>;

    fn delete_data_columns(&self, block_root: Hash256) -> Result<(), StoreError>;
}

/// An in-memory store, for tests and ephemeral harnesses.
#[derive(Default)]
pub struct MemoryStore<E: EthSpec> {
    blocks: parking_lot::Mutex<HashMap<Hash256, Vec<u8>>>,
    blobs: parking_lot::Mutex<HashMap<Hash256, Vec<Arc<BlobSidecar<E>>>>>,
    columns: parking_lot::Mutex<HashMap<Hash256, Vec<Arc<DataColumnSidecar<E>>>>>,
}

impl<E: EthSpec> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_block_bytes(&self, block_root: &Hash256) -> Option<Vec<u8>> {
        self.blocks.lock().get(block_root).cloned()
    }

    pub fn get_blob_sidecars(&self, block_root: &Hash256) -> Option<Vec<Arc<BlobSidecar<E>>>> {
        self.blobs.lock().get(block_root).cloned()
    }

    pub fn get_data_columns(
        &self,
        block_root: &Hash256,
    ) -> Option<Vec<Arc<DataColumnSidecar<E>>>> {
        self.columns.lock().get(block_root).cloned()
    }
}

impl<E: EthSpec> Store<E> for MemoryStore<E> {
    fn put_block(
        &self,
        block_root: Hash256,
        block: &SignedBeaconBlock<E>,
    ) -> Result<(), StoreError> {
        self.blocks.lock().insert(block_root, block.as_ssz_bytes());
        Ok(())
    }

    fn put_block_bytes(&self, block_root: Hash256, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.blocks.lock().insert(block_root, bytes);
        Ok(())
    }

    fn put_blob_sidecars(
        &self,
        block_root: Hash256,
        blobs: &[Arc<BlobSidecar<E>>],
    ) -> Result<(), StoreError> {
        self.blobs.lock().insert(block_root, blobs.to_vec());
        Ok(())
    }

    fn put_data_columns(
        &self,
        block_root: Hash256,
        columns: &[Arc<DataColumnSidecar<E>>],
    ) -> Result<(), StoreError> {
        self.columns.lock().insert(block_root, columns.to_vec());
        Ok(())
    }

    fn delete_block(&self, block_root: Hash256) -> Result<(), StoreError> {
        self.blocks.lock().remove(&block_root);
        Ok(())
    }

    fn delete_blob_sidecars(&self, block_root: Hash256) -> Result<(), StoreError> {
        self.blobs.lock().remove(&block_root);
        Ok(())
    }

    fn delete_data_columns(&self, block_root: Hash256) -> Result<(), StoreError> {
        self.columns.lock().remove(&block_root);
        Ok(())
    }
}
