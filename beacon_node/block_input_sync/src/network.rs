//! The networking-layer collaborator boundary.
//!
//! Request/response wiring, rate limiting and peer scoring live in the network stack; this
//! subsystem only issues requests and interprets the outcome. The transport enforces
//! per-peer request timeouts.

use crate::range::{BlocksByRangeRequest, DataColumnsByRangeRequest};
use libp2p_identity::PeerId;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use types::{
    BlobIdentifier, BlobSidecar, ColumnIndex, DataColumnSidecar, DataColumnsByRootIdentifier,
    EthSpec, Hash256, SignedBeaconBlock, Slot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The peer throttled us; try again later without penalising it.
    RateLimited,
    /// The transport's request timeout elapsed.
    Timeout,
    /// The stream terminated before any response item.
    MissingResponse,
    /// Anything else the transport reports.
    Rpc(String),
}

impl RpcError {
    /// Transient errors do not disqualify the peer from retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::RateLimited | RpcError::Timeout)
    }
}

/// Per-peer sync metadata, maintained by the networking layer and read here.
#[derive(Debug, Clone)]
pub struct PeerSyncMeta {
    pub peer_id: PeerId,
    pub client: String,
    pub custody_columns: HashSet<ColumnIndex>,
}

pub trait SyncNetwork<E: EthSpec>: Send + Sync + 'static {
    fn send_beacon_blocks_by_root(
        &self,
        peer_id: PeerId,
        block_roots: Vec<Hash256>,
    ) -> impl Future<Output = Result<Vec<Arc<SignedBeaconBlock<E>>>, RpcError>> + Send;

    fn send_blob_sidecars_by_root(
        &self,
        peer_id: PeerId,
        blob_ids: Vec<BlobIdentifier>,
    ) -> impl Future<Output = Result<Vec<Arc<BlobSidecar<E>>>, RpcError>> + Send;

    fn send_data_column_sidecars_by_root(
        &self,
        peer_id: PeerId,
        request: DataColumnsByRootIdentifier<E>,
    ) -> impl Future<Output = Result<Vec<Arc<DataColumnSidecar<E>>>, RpcError>> + Send;

    fn send_beacon_blocks_by_range(
        &self,
        peer_id: PeerId,
        request: BlocksByRangeRequest,
    ) -> impl Future<Output = Result<Vec<Arc<SignedBeaconBlock<E>>>, RpcError>> + Send;

    fn send_blob_sidecars_by_range(
        &self,
        peer_id: PeerId,
        start_slot: Slot,
        count: u64,
    ) -> impl Future<Output = Result<Vec<Arc<BlobSidecar<E>>>, RpcError>> + Send;

    fn send_data_column_sidecars_by_range(
        &self,
        peer_id: PeerId,
        request: DataColumnsByRangeRequest,
    ) -> impl Future<Output = Result<Vec<Arc<DataColumnSidecar<E>>>, RpcError>> + Send;

    /// The currently connected peers with their sync metadata.
    fn connected_peers(&self) -> Vec<PeerSyncMeta>;
}
