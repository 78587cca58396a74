//! Hand-rolled collaborator doubles shared by the sync tests.

use crate::SyncTypes;
use crate::chain::{BlockProcessError, BlockProcessor, ChainView};
use crate::network::{PeerSyncMeta, RpcError, SyncNetwork};
use crate::range::{BlocksByRangeRequest, DataColumnsByRangeRequest};
use block_input::{AcceptAllVerifier, BlobAndProof, EngineError, ExecutionEngine};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use slot_clock::ManualSlotClock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use types::{
    BlobIdentifier, BlobSidecar, ColumnIndex, DataColumnSidecar, DataColumnsByRootIdentifier,
    Hash256, MainnetEthSpec, SignedBeaconBlock, Slot, VersionedHash,
};

pub type E = MainnetEthSpec;

/// A network double serving canned blocks and sidecars by root.
#[derive(Default)]
pub struct TestNetwork {
    blocks: Mutex<HashMap<Hash256, Arc<SignedBeaconBlock<E>>>>,
    blobs: Mutex<HashMap<BlobIdentifier, Arc<BlobSidecar<E>>>>,
    columns: Mutex<HashMap<(Hash256, ColumnIndex), Arc<DataColumnSidecar<E>>>>,
    fail_with: Mutex<Option<RpcError>>,
    peers: Mutex<Vec<PeerSyncMeta>>,
    pub block_requests: AtomicUsize,
    pub column_requests: Mutex<Vec<Vec<ColumnIndex>>>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `block` for its own root.
    pub fn add_block(&self, block: Arc<SignedBeaconBlock<E>>) {
        self.blocks.lock().insert(block.canonical_root(), block);
    }

    /// Serve `block` for an arbitrary root (a misbehaving peer).
    pub fn add_block_at(&self, block_root: Hash256, block: Arc<SignedBeaconBlock<E>>) {
        self.blocks.lock().insert(block_root, block);
    }

    pub fn add_blobs(&self, blobs: impl IntoIterator<Item = BlobSidecar<E>>) {
        let mut map = self.blobs.lock();
        for blob in blobs {
            map.insert(blob.id(), Arc::new(blob));
        }
    }

    pub fn add_columns(&self, columns: impl IntoIterator<Item = Arc<DataColumnSidecar<E>>>) {
        let mut map = self.columns.lock();
        for column in columns {
            map.insert((column.block_root(), column.index), column);
        }
    }

    pub fn fail_all(&self, error: RpcError) {
        *self.fail_with.lock() = Some(error);
    }

    pub fn heal(&self) {
        *self.fail_with.lock() = None;
    }

    pub fn set_peers(&self, peers: Vec<PeerSyncMeta>) {
        *self.peers.lock() = peers;
    }

    fn check_failure(&self) -> Result<(), RpcError> {
        match self.fail_with.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl SyncNetwork<E> for TestNetwork {
    async fn send_beacon_blocks_by_root(
        &self,
        _peer_id: PeerId,
        block_roots: Vec<Hash256>,
    ) -> Result<Vec<Arc<SignedBeaconBlock<E>>>, RpcError> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let blocks = self.blocks.lock();
        Ok(block_roots
            .iter()
            .filter_map(|root| blocks.get(root).cloned())
            .collect())
    }

    async fn send_blob_sidecars_by_root(
        &self,
        _peer_id: PeerId,
        blob_ids: Vec<BlobIdentifier>,
    ) -> Result<Vec<Arc<BlobSidecar<E>>>, RpcError> {
        self.check_failure()?;
        let blobs = self.blobs.lock();
        Ok(blob_ids
            .iter()
            .filter_map(|id| blobs.get(id).cloned())
            .collect())
    }

    async fn send_data_column_sidecars_by_root(
        &self,
        _peer_id: PeerId,
        request: DataColumnsByRootIdentifier<E>,
    ) -> Result<Vec<Arc<DataColumnSidecar<E>>>, RpcError> {
        self.check_failure()?;
        self.column_requests.lock().push(request.columns.to_vec());
        let columns = self.columns.lock();
        Ok(request
            .columns
            .iter()
            .filter_map(|index| columns.get(&(request.block_root, *index)).cloned())
            .collect())
    }

    async fn send_beacon_blocks_by_range(
        &self,
        _peer_id: PeerId,
        _request: BlocksByRangeRequest,
    ) -> Result<Vec<Arc<SignedBeaconBlock<E>>>, RpcError> {
        Err(RpcError::Rpc("range requests not wired in tests".into()))
    }

    async fn send_blob_sidecars_by_range(
        &self,
        _peer_id: PeerId,
        _start_slot: Slot,
        _count: u64,
    ) -> Result<Vec<Arc<BlobSidecar<E>>>, RpcError> {
        Err(RpcError::Rpc("range requests not wired in tests".into()))
    }

    async fn send_data_column_sidecars_by_range(
        &self,
        _peer_id: PeerId,
        _request: DataColumnsByRangeRequest,
    ) -> Result<Vec<Arc<DataColumnSidecar<E>>>, RpcError> {
        Err(RpcError::Rpc("range requests not wired in tests".into()))
    }

    fn connected_peers(&self) -> Vec<PeerSyncMeta> {
        self.peers.lock().clone()
    }
}

/// An engine double whose blob pool is always empty.
#[derive(Default)]
pub struct NullEngine;

impl ExecutionEngine<E> for NullEngine {
    async fn get_blobs(
        &self,
        _fork: types::ForkName,
        versioned_hashes: Vec<VersionedHash>,
    ) -> Result<Vec<Option<BlobAndProof<E>>>, EngineError> {
        Ok(vec![None; versioned_hashes.len()])
    }
}

/// A fork-choice / proposer-observation double.
#[derive(Default)]
pub struct TestChainView {
    fork_choice: Mutex<HashSet<Hash256>>,
    proposers: Mutex<HashSet<(Slot, u64)>>,
}

impl TestChainView {
    pub fn add_block(&self, block_root: Hash256) {
        self.fork_choice.lock().insert(block_root);
    }

    pub fn see_proposer(&self, slot: Slot, proposer_index: u64) {
        self.proposers.lock().insert((slot, proposer_index));
    }
}

impl ChainView for TestChainView {
    fn fork_choice_contains_block(&self, block_root: &Hash256) -> bool {
        self.fork_choice.lock().contains(block_root)
    }

    fn proposer_seen_at_slot(&self, slot: Slot, proposer_index: u64) -> bool {
        self.proposers.lock().contains(&(slot, proposer_index))
    }
}

/// A processor double: records calls, replays scripted results, and marks successful
/// imports in the chain view like the real import path would.
pub struct TestProcessor {
    chain: Arc<TestChainView>,
    results: Mutex<VecDeque<Result<(), BlockProcessError>>>,
    pub calls: Mutex<Vec<(Hash256, tokio::time::Instant)>>,
}

impl TestProcessor {
    pub fn new(chain: Arc<TestChainView>) -> Self {
        Self {
            chain,
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn script_result(&self, result: Result<(), BlockProcessError>) {
        self.results.lock().push_back(result);
    }

    pub fn num_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl BlockProcessor<E> for TestProcessor {
    async fn process_block(
        &self,
        block_input: Arc<block_input::BlockInput<E>>,
    ) -> Result<(), BlockProcessError> {
        let block_root = block_input.block_root();
        self.calls
            .lock()
            .push((block_root, tokio::time::Instant::now()));
        let result = self.results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.chain.add_block(block_root);
        }
        result
    }
}

pub struct TestSyncTypes;

impl SyncTypes for TestSyncTypes {
    type EthSpec = E;
    type SlotClock = ManualSlotClock;
    type Network = TestNetwork;
    type Engine = NullEngine;
    type Processor = TestProcessor;
    type ChainView = TestChainView;
    type Verifier = AcceptAllVerifier;
}
