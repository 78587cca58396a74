//! Consensus types consumed by the block-input assembly subsystem.
//!
//! These are deliberately trimmed to the surface the subsystem reads: block identity fields,
//! blob KZG commitments and the data-availability sidecars. State, operations and payloads
//! belong to the state-transition collaborators and are not modelled here.

pub mod beacon_block;
pub mod beacon_block_body;
pub mod beacon_block_header;
pub mod blob_sidecar;
pub mod chain_spec;
pub mod consts;
pub mod data_column_sidecar;
pub mod eth_spec;
pub mod fork_name;
pub mod non_zero_usize;
pub mod signature_bytes;
pub mod slot_epoch;
pub mod test_utils;

pub use crate::beacon_block::{
    BeaconBlock, BeaconBlockAltair, BeaconBlockBase, BeaconBlockBellatrix, BeaconBlockCapella,
    BeaconBlockDeneb, BeaconBlockElectra, BeaconBlockFulu, BeaconBlockRef, SignedBeaconBlock,
    SignedBeaconBlockAltair, SignedBeaconBlockBase, SignedBeaconBlockBellatrix,
    SignedBeaconBlockCapella, SignedBeaconBlockDeneb, SignedBeaconBlockElectra,
    SignedBeaconBlockFulu,
};
pub use crate::beacon_block_body::{
    BLOB_KZG_COMMITMENTS_INDEX, BeaconBlockBody, BeaconBlockBodyAltair, BeaconBlockBodyBase,
    BeaconBlockBodyBellatrix, BeaconBlockBodyCapella, BeaconBlockBodyDeneb,
    BeaconBlockBodyElectra, BeaconBlockBodyFulu, BeaconBlockBodyRef, KzgCommitments, KzgProofs,
};
pub use crate::beacon_block_header::{BeaconBlockHeader, SignedBeaconBlockHeader};
pub use crate::blob_sidecar::{
    Blob, BlobIdentifier, BlobSidecar, BlobSidecarError, BlobSidecarList, FixedBlobSidecarList,
};
pub use crate::chain_spec::ChainSpec;
pub use crate::data_column_sidecar::{
    Cell, ColumnIndex, DataColumn, DataColumnSidecar, DataColumnSidecarList,
    DataColumnsByRootIdentifier,
};
pub use crate::eth_spec::{EthSpec, MainnetEthSpec, MinimalEthSpec};
pub use crate::fork_name::{ForkName, InconsistentFork};
pub use crate::signature_bytes::SignatureBytes;
pub use crate::slot_epoch::{Epoch, Slot};

pub use kzg::{KzgCommitment, KzgProof, VERSIONED_HASH_VERSION_KZG};

pub type Hash256 = alloy_primitives::B256;
pub type VersionedHash = Hash256;

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// A partial getter was called on the wrong fork variant.
    IncorrectForkVariant,
    MerkleTreeError(merkle_proof::MerkleTreeError),
    SszTypesError(ssz_types::Error),
}

impl From<merkle_proof::MerkleTreeError> for Error {
    fn from(e: merkle_proof::MerkleTreeError) -> Self {
        Error::MerkleTreeError(e)
    }
}

impl From<ssz_types::Error> for Error {
    fn from(e: ssz_types::Error) -> Self {
        Error::SszTypesError(e)
    }
}
