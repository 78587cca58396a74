//! Completes partial block inputs from the network.
//!
//! The sync side of block-input assembly: validating by-range responses, fetching missing
//! pieces by root, driving downloads for unknown or incomplete block inputs, and routing
//! requests to the peers whose custody covers the missing columns.

pub mod chain;
pub mod manager;
mod metrics;
pub mod network;
pub mod peer_balancer;
pub mod range;
pub mod range_components;
pub mod root_fetcher;
#[cfg(test)]
pub(crate) mod test_utils;

use block_input::{ExecutionEngine, SidecarVerifier};
use slot_clock::SlotClock;
use types::EthSpec;

pub use crate::chain::{BlockProcessError, BlockProcessor, ChainView};
pub use crate::manager::{
    BlockInputSync, BlockInputSyncHandle, BlockInputSyncParams, SyncMessage,
};
pub use crate::network::{PeerSyncMeta, RpcError, SyncNetwork};
pub use crate::peer_balancer::{ActiveRequestGuard, MAX_CONCURRENT_REQUESTS, PeerBalancer};
pub use crate::range::{
    BlocksByRangeRequest, ColumnCouplingWarnings, CoupledBlock, DataColumnsByRangeRequest,
    RangeResponseError, validate_range_responses,
};
pub use crate::range_components::{RangeBlockComponentsRequest, RangeRequestId};
pub use crate::root_fetcher::{RootFetchError, fetch_block_input_by_root};

/// The collaborator bundle a sync instance is built over, mirroring the chain's types
/// pattern: one generic parameter instead of six.
pub trait SyncTypes: Send + Sync + Sized + 'static {
    type EthSpec: EthSpec;
    type SlotClock: SlotClock + 'static;
    type Network: SyncNetwork<Self::EthSpec>;
    type Engine: ExecutionEngine<Self::EthSpec> + Send + Sync + 'static;
    type Processor: BlockProcessor<Self::EthSpec>;
    type ChainView: ChainView;
    type Verifier: SidecarVerifier<Self::EthSpec> + 'static;
}
