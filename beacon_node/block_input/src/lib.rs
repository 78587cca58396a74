//! Block-input assembly: aggregates a signed beacon block with its data-availability sidecars
//! (blob sidecars pre-Fulu, data-column sidecars from Fulu onwards) into a single entity that
//! the chain can wait on, import and persist.

pub mod availability;
pub mod block_input;
pub mod custody;
pub mod engine_blobs;
mod metrics;
pub mod persist;
pub mod seen_cache;
pub mod store;
pub mod verification;

use std::fmt;
use types::ForkName;

pub use crate::availability::{
    AvailabilityStatus, BLOB_AVAILABILITY_TIMEOUT, DataAvailabilityError, VerifiedAvailability,
    verify_blocks_data_availability,
};
pub use crate::block_input::{
    AddOptions, AvailableData, BlockInput, BlockInputError, BlockProps, MissingBlobMeta,
    SeenTimestamp, SidecarProps,
};
pub use crate::custody::{CustodyContext, NodeCustodyType};
pub use crate::engine_blobs::{
    BlobAndProof, EngineBlobsCache, EngineError, ExecutionEngine, FetchEngineBlobsError,
    fetch_engine_blobs,
};
pub use crate::persist::{persist_block_inputs, remove_eagerly_persisted_block_inputs};
pub use crate::seen_cache::SeenBlockInputCache;
pub use crate::store::{MemoryStore, Store, StoreError};
pub use crate::verification::{
    AcceptAllVerifier, RejectAllVerifier, SidecarVerifier, VerificationError,
};

/// Provenance of a block or sidecar sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockSource {
    Gossip,
    ByRange,
    ByRoot,
    Api,
    EngineLocal,
}

impl BlockSource {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSource::Gossip => "gossip",
            BlockSource::ByRange => "by_range",
            BlockSource::ByRoot => "by_root",
            BlockSource::Api => "api",
            BlockSource::EngineLocal => "engine_local",
        }
    }
}

impl fmt::Display for BlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of data-availability payload a block carries, fixed by the fork at its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaType {
    /// Pre-Deneb: no sidecars exist.
    PreData,
    /// Deneb/Electra: blob sidecars.
    Blobs,
    /// Fulu onwards: data-column sidecars.
    Columns,
}

impl DaType {
    pub fn from_fork(fork: ForkName) -> Self {
        if fork.fulu_enabled() {
            DaType::Columns
        } else if fork.deneb_enabled() {
            DaType::Blobs
        } else {
            DaType::PreData
        }
    }
}
