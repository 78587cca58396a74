//! The event-driven download driver.
//!
//! Reacts to unknown-root, unknown-parent and incomplete-block-input signals: schedules
//! by-root downloads through the peer balancer, hands completed inputs to the processor once
//! their parent is known to fork choice, and walks descendants after each successful import.

use crate::chain::{BlockProcessError, BlockProcessor, ChainView};
use crate::metrics;
use crate::network::{PeerSyncMeta, SyncNetwork};
use crate::peer_balancer::PeerBalancer;
use crate::root_fetcher::fetch_block_input_by_root;
use crate::SyncTypes;
use block_input::{
    BlockInput, CustodyContext, EngineBlobsCache, SeenBlockInputCache,
};
use libp2p_identity::PeerId;
use lru::LruCache;
use slot_clock::SlotClock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use types::consts::bellatrix::INTERVALS_PER_SLOT;
use types::non_zero_usize::new_non_zero_usize;
use types::{ChainSpec, ColumnIndex, EthSpec, Hash256};

/// Upper bound on tracked pending roots. Overflow evicts the least recently touched entry.
pub const MAX_PENDING_BLOCK_INPUTS: usize = 100;

const MAX_KNOWN_BAD_BLOCKS: usize = 512;

/// Grace period before the secondary pull for a block input first seen on gossip, giving the
/// remaining pieces a chance to arrive on their own.
const INCOMPLETE_INPUT_PULL_DELAY: Duration = Duration::from_millis(500);

const PRE_FULU_MAX_DOWNLOAD_ATTEMPTS: usize = 5;
const MAX_DOWNLOAD_ATTEMPTS_CAP: usize = 20;

/// Signals the driver subscribes to.
#[derive(Debug)]
pub enum SyncMessage<E: EthSpec> {
    /// A root referenced by an attestation or API call is absent from fork choice.
    UnknownBlockRoot {
        block_root: Hash256,
        peer_id: Option<PeerId>,
    },
    /// A gossip-validated block whose parent is absent from fork choice.
    UnknownParent {
        block_input: Arc<BlockInput<E>>,
        peer_id: Option<PeerId>,
    },
    /// A gossip-validated block whose data is not yet complete.
    IncompleteBlockInput {
        block_input: Arc<BlockInput<E>>,
        peer_id: Option<PeerId>,
    },
    /// Another path imported this block.
    BlockImported { block_root: Hash256 },
    PeerConnected(PeerSyncMeta),
    PeerDisconnected(PeerId),
    SubscribeToNetwork,
    UnsubscribeFromNetwork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingStatus {
    Pending,
    Fetching,
    Downloaded,
    Processing,
}

struct PendingEntry<E: EthSpec> {
    block_root: Hash256,
    /// `None` while only the root is known (e.g. referenced by an attestation).
    block_input: Option<Arc<BlockInput<E>>>,
    status: PendingStatus,
    /// Peers that referenced this root; fault-attribution candidates.
    peers: HashSet<PeerId>,
    time_added: Option<Duration>,
    time_synced: Option<Duration>,
    /// Delay the first pull to let gossip finish the job.
    delay_first_pull: bool,
}

enum DownloadOutcome<E: EthSpec> {
    /// Downloaded and the parent is already in fork choice.
    SuccessResolved(Arc<BlockInput<E>>),
    /// Downloaded but the parent is still unknown.
    SuccessMissingParent(Arc<BlockInput<E>>),
    /// Another path imported the block while we were fetching.
    SuccessLate,
    FailureTriedAllPeers,
    FailureMaxAttempts,
}

impl<E: EthSpec> DownloadOutcome<E> {
    fn as_str(&self) -> &'static str {
        match self {
            DownloadOutcome::SuccessResolved(_) => "success_resolved",
            DownloadOutcome::SuccessMissingParent(_) => "success_missing_parent",
            DownloadOutcome::SuccessLate => "success_late",
            DownloadOutcome::FailureTriedAllPeers => "failure_tried_all_peers",
            DownloadOutcome::FailureMaxAttempts => "failure_max_attempts",
        }
    }
}

struct DownloadResult<E: EthSpec> {
    block_root: Hash256,
    outcome: DownloadOutcome<E>,
}

pub struct BlockInputSyncParams<T: SyncTypes> {
    pub network: Arc<T::Network>,
    pub engine: Arc<T::Engine>,
    pub processor: Arc<T::Processor>,
    pub chain: Arc<T::ChainView>,
    pub verifier: Arc<T::Verifier>,
    pub seen_cache: Arc<SeenBlockInputCache<T::EthSpec, T::SlotClock>>,
    pub custody: CustodyContext,
    pub slot_clock: T::SlotClock,
    pub spec: Arc<ChainSpec>,
}

/// Caller-facing handle: feed events in, close on shutdown.
pub struct BlockInputSyncHandle<E: EthSpec> {
    tx: UnboundedSender<SyncMessage<E>>,
    signal: Option<exit_future::Signal>,
}

impl<E: EthSpec> BlockInputSyncHandle<E> {
    pub fn send(&self, message: SyncMessage<E>) {
        let _ = self.tx.send(message);
    }

    pub fn subscribe_to_network(&self) {
        self.send(SyncMessage::SubscribeToNetwork);
    }

    pub fn unsubscribe_from_network(&self) {
        self.send(SyncMessage::UnsubscribeFromNetwork);
    }

    /// Stop the driver. Idempotent.
    pub fn close(&mut self) {
        if let Some(signal) = self.signal.take() {
            let _ = signal.fire();
        }
    }
}

pub struct BlockInputSync<T: SyncTypes> {
    downloader: Downloader<T>,
    processor: Arc<T::Processor>,
    pending: LruCache<Hash256, PendingEntry<T::EthSpec>>,
    known_bad: LruCache<Hash256, ()>,
    event_rx: UnboundedReceiver<SyncMessage<T::EthSpec>>,
    download_tx: UnboundedSender<DownloadResult<T::EthSpec>>,
    download_rx: UnboundedReceiver<DownloadResult<T::EthSpec>>,
    subscribed: bool,
    exit: exit_future::Exit,
}

impl<T: SyncTypes> BlockInputSync<T> {
    /// Build the driver and its handle. The caller spawns `run`.
    pub fn new(
        params: BlockInputSyncParams<T>,
    ) -> (Self, BlockInputSyncHandle<T::EthSpec>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (download_tx, download_rx) = mpsc::unbounded_channel();
        let (signal, exit) = exit_future::signal();

        let downloader = Downloader {
            network: params.network,
            engine: params.engine,
            engine_cache: Arc::new(EngineBlobsCache::new()),
            chain: params.chain,
            verifier: params.verifier,
            seen_cache: params.seen_cache,
            custody: params.custody,
            balancer: Arc::new(PeerBalancer::new()),
            slot_clock: params.slot_clock,
            spec: params.spec,
        };

        let sync = Self {
            downloader,
            processor: params.processor,
            pending: LruCache::new(new_non_zero_usize(MAX_PENDING_BLOCK_INPUTS)),
            known_bad: LruCache::new(new_non_zero_usize(MAX_KNOWN_BAD_BLOCKS)),
            event_rx,
            download_tx,
            download_rx,
            subscribed: false,
            exit,
        };
        let handle = BlockInputSyncHandle {
            tx: event_tx,
            signal: Some(signal),
        };
        (sync, handle)
    }

    /// Build and spawn the driver onto the current runtime.
    pub fn spawn(params: BlockInputSyncParams<T>) -> BlockInputSyncHandle<T::EthSpec> {
        let (sync, handle) = Self::new(params);
        tokio::spawn(sync.run());
        handle
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = &mut self.exit => {
                    debug!("Block input sync shutting down");
                    return;
                }
                Some(result) = self.download_rx.recv() => {
                    self.on_download_complete(result);
                }
                message = self.event_rx.recv() => {
                    match message {
                        Some(message) => self.on_sync_message(message),
                        // All handles dropped.
                        None => return,
                    }
                }
            }
            self.tick().await;
            metrics::set_gauge(&metrics::PENDING_BLOCK_INPUTS, self.pending.len() as i64);
        }
    }

    fn on_sync_message(&mut self, message: SyncMessage<T::EthSpec>) {
        match message {
            SyncMessage::SubscribeToNetwork => {
                self.subscribed = true;
                for peer in self.downloader.network.connected_peers() {
                    self.downloader.balancer.on_peer_connected(peer);
                }
            }
            SyncMessage::UnsubscribeFromNetwork => {
                self.subscribed = false;
            }
            message if !self.subscribed => {
                debug!(?message, "Ignoring sync message while unsubscribed");
            }
            SyncMessage::UnknownBlockRoot {
                block_root,
                peer_id,
            } => {
                self.add_unknown_root(block_root, peer_id);
            }
            SyncMessage::UnknownParent {
                block_input,
                peer_id,
            } => {
                let parent_root = block_input.parent_root();
                self.add_block_input(block_input, peer_id);
                self.add_unknown_root(parent_root, peer_id);
            }
            SyncMessage::IncompleteBlockInput {
                block_input,
                peer_id,
            } => {
                self.add_block_input(block_input, peer_id);
            }
            SyncMessage::BlockImported { block_root } => {
                if self.pending.pop(&block_root).is_some() {
                    debug!(?block_root, "Pending block imported by another path");
                    self.downloader.seen_cache.prune(&block_root);
                }
            }
            SyncMessage::PeerConnected(meta) => {
                self.downloader.balancer.on_peer_connected(meta);
            }
            SyncMessage::PeerDisconnected(peer_id) => {
                self.downloader.balancer.on_peer_disconnected(&peer_id);
            }
        }
    }

    fn add_unknown_root(&mut self, block_root: Hash256, peer_id: Option<PeerId>) {
        if self.known_bad.contains(&block_root) {
            debug!(?block_root, "Ignoring known-bad block root");
            return;
        }
        if self
            .downloader
            .chain
            .fork_choice_contains_block(&block_root)
        {
            return;
        }
        if let Some(entry) = self.pending.get_mut(&block_root) {
            entry.peers.extend(peer_id);
            return;
        }
        self.insert_pending(PendingEntry {
            block_root,
            block_input: None,
            status: PendingStatus::Pending,
            peers: peer_id.into_iter().collect(),
            time_added: self.downloader.slot_clock.now_duration(),
            time_synced: None,
            delay_first_pull: false,
        });
    }

    fn add_block_input(
        &mut self,
        block_input: Arc<BlockInput<T::EthSpec>>,
        peer_id: Option<PeerId>,
    ) {
        let block_root = block_input.block_root();
        if self.known_bad.contains(&block_root) {
            return;
        }
        if let Some(entry) = self.pending.get_mut(&block_root) {
            entry.peers.extend(peer_id);
            if entry.block_input.is_none() {
                entry.block_input = Some(block_input);
            }
            return;
        }
        let status = if block_input.has_block_and_all_data() {
            PendingStatus::Downloaded
        } else {
            PendingStatus::Pending
        };
        self.insert_pending(PendingEntry {
            block_root,
            block_input: Some(block_input),
            status,
            peers: peer_id.into_iter().collect(),
            time_added: self.downloader.slot_clock.now_duration(),
            time_synced: None,
            delay_first_pull: true,
        });
    }

    fn insert_pending(&mut self, entry: PendingEntry<T::EthSpec>) {
        let block_root = entry.block_root;
        if let Some((evicted_root, _)) = self.pending.push(block_root, entry) {
            if evicted_root != block_root {
                metrics::inc_counter(&metrics::PENDING_BLOCK_INPUTS_EVICTED);
                warn!(block_root = ?evicted_root, "Pending block map full, evicting");
            }
        }
    }

    fn on_download_complete(&mut self, result: DownloadResult<T::EthSpec>) {
        let DownloadResult {
            block_root,
            outcome,
        } = result;
        metrics::inc_counter_vec(&metrics::DOWNLOAD_OUTCOMES, &[outcome.as_str()]);

        let Some(entry) = self.pending.get_mut(&block_root) else {
            return;
        };
        match outcome {
            DownloadOutcome::SuccessResolved(block_input)
            | DownloadOutcome::SuccessMissingParent(block_input) => {
                entry.block_input = Some(block_input);
                entry.status = PendingStatus::Downloaded;
                entry.time_synced = self.downloader.slot_clock.now_duration();
            }
            DownloadOutcome::SuccessLate => {
                self.pending.pop(&block_root);
                self.downloader.seen_cache.prune(&block_root);
            }
            DownloadOutcome::FailureTriedAllPeers | DownloadOutcome::FailureMaxAttempts => {
                let time_in_pending = entry
                    .time_added
                    .zip(self.downloader.slot_clock.now_duration())
                    .map(|(added, now)| now.saturating_sub(added));
                warn!(
                    ?block_root,
                    outcome = outcome.as_str(),
                    ?time_in_pending,
                    "Giving up on block root"
                );
                self.pending.pop(&block_root);
                self.known_bad.push(block_root, ());
                self.downloader.seen_cache.prune(&block_root);
            }
        }
    }

    async fn tick(&mut self) {
        self.process_ready_blocks().await;
        self.schedule_downloads();
    }

    /// Hand every downloaded input whose parent is in fork choice to the processor, walking
    /// into descendants as parents land. Each root is attempted at most once per tick so a
    /// parent-unknown retry waits for the next trigger.
    async fn process_ready_blocks(&mut self) {
        let mut attempted = HashSet::new();
        loop {
            let ready_root = self
                .pending
                .iter()
                .find(|(root, entry)| {
                    !attempted.contains(*root)
                        && entry.status == PendingStatus::Downloaded
                        && entry.block_input.as_ref().is_some_and(|block_input| {
                            self.downloader
                                .chain
                                .fork_choice_contains_block(&block_input.parent_root())
                        })
                })
                .map(|(root, _)| *root);
            let Some(block_root) = ready_root else {
                return;
            };
            attempted.insert(block_root);
            self.process_block(block_root).await;
        }
    }

    async fn process_block(&mut self, block_root: Hash256) {
        let Some(entry) = self.pending.get_mut(&block_root) else {
            return;
        };
        let Some(block_input) = entry.block_input.clone() else {
            return;
        };
        entry.status = PendingStatus::Processing;

        self.unbundling_guard(&block_input).await;

        let result = self.processor.process_block(block_input.clone()).await;
        match result {
            Ok(()) | Err(BlockProcessError::AlreadyKnown) => {
                metrics::inc_counter_vec(&metrics::PROCESSED_BLOCKS, &["imported"]);
                debug!(?block_root, "Processed block from sync");
                self.pending.pop(&block_root);
                self.downloader.seen_cache.prune(&block_root);
                // Descendants are picked up by the caller's ready-block loop now that this
                // root is in fork choice.
            }
            Err(BlockProcessError::ParentUnknown { .. })
            | Err(BlockProcessError::PrestateMissing) => {
                // The parent may still arrive; try again on a later cycle.
                metrics::inc_counter_vec(&metrics::PROCESSED_BLOCKS, &["retry"]);
                if let Some(entry) = self.pending.get_mut(&block_root) {
                    entry.status = PendingStatus::Downloaded;
                }
            }
            Err(BlockProcessError::ExecutionEngineError(error)) => {
                // An EL fault, not the peers': drop the subtree without attribution.
                warn!(?block_root, error, "Execution engine error processing block");
                metrics::inc_counter_vec(&metrics::PROCESSED_BLOCKS, &["engine_error"]);
                self.remove_with_descendants(block_root);
            }
            Err(error) => {
                metrics::inc_counter_vec(&metrics::PROCESSED_BLOCKS, &["invalid"]);
                let mut faulty_peers = block_input.contributing_peers();
                if let Some(entry) = self.pending.get_mut(&block_root) {
                    faulty_peers.extend(entry.peers.iter().copied());
                }
                // Downscoring every referencing peer is deliberately withheld; a descendant
                // of a bad block is not proof its reporter was malicious.
                warn!(
                    ?block_root,
                    ?error,
                    peers = faulty_peers.len(),
                    "Invalid block from sync"
                );
                self.known_bad.push(block_root, ());
                self.remove_with_descendants(block_root);
            }
        }
    }

    /// Remove `block_root` and every pending entry that descends from it.
    fn remove_with_descendants(&mut self, block_root: Hash256) {
        let mut removed = HashSet::from([block_root]);
        self.pending.pop(&block_root);
        self.downloader.seen_cache.prune(&block_root);

        loop {
            let next = self
                .pending
                .iter()
                .find(|(_, entry)| {
                    entry
                        .block_input
                        .as_ref()
                        .is_some_and(|block_input| removed.contains(&block_input.parent_root()))
                })
                .map(|(root, _)| *root);
            let Some(descendant) = next else {
                return;
            };
            debug!(block_root = ?descendant, "Removing descendant of rejected block");
            removed.insert(descendant);
            self.pending.pop(&descendant);
            self.downloader.seen_cache.prune(&descendant);
        }
    }

    /// A late re-broadcast by a proposer who already produced a block this slot must not
    /// earn proposer boost: hold processing until the attestation deadline passes.
    async fn unbundling_guard(&self, block_input: &BlockInput<T::EthSpec>) {
        let slot = block_input.slot();
        if !self
            .downloader
            .chain
            .proposer_seen_at_slot(slot, block_input.proposer_index())
        {
            return;
        }
        let attestation_due = self.downloader.slot_clock.slot_duration() / INTERVALS_PER_SLOT as u32;
        if let Some(delay) = self
            .downloader
            .slot_clock
            .duration_to_slot_offset(slot, attestation_due)
        {
            if !delay.is_zero() {
                debug!(%slot, ?delay, "Deferring processing to suppress proposer boost");
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn schedule_downloads(&mut self) {
        let to_fetch = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.status == PendingStatus::Pending)
            .map(|(root, entry)| (*root, entry.delay_first_pull))
            .collect::<Vec<_>>();

        for (block_root, delay_first_pull) in to_fetch {
            if let Some(entry) = self.pending.get_mut(&block_root) {
                entry.status = PendingStatus::Fetching;
            }
            let downloader = self.downloader.clone();
            let download_tx = self.download_tx.clone();
            tokio::spawn(async move {
                if delay_first_pull {
                    tokio::time::sleep(INCOMPLETE_INPUT_PULL_DELAY).await;
                }
                let outcome = downloader.download(block_root).await;
                let _ = download_tx.send(DownloadResult {
                    block_root,
                    outcome,
                });
            });
        }
    }
}

/// The cloneable slice of the driver that download tasks carry.
struct Downloader<T: SyncTypes> {
    network: Arc<T::Network>,
    engine: Arc<T::Engine>,
    engine_cache: Arc<EngineBlobsCache<T::EthSpec>>,
    chain: Arc<T::ChainView>,
    verifier: Arc<T::Verifier>,
    seen_cache: Arc<SeenBlockInputCache<T::EthSpec, T::SlotClock>>,
    custody: CustodyContext,
    balancer: Arc<PeerBalancer>,
    slot_clock: T::SlotClock,
    spec: Arc<ChainSpec>,
}

impl<T: SyncTypes> Clone for Downloader<T> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
            engine: self.engine.clone(),
            engine_cache: self.engine_cache.clone(),
            chain: self.chain.clone(),
            verifier: self.verifier.clone(),
            seen_cache: self.seen_cache.clone(),
            custody: self.custody.clone(),
            balancer: self.balancer.clone(),
            slot_clock: self.slot_clock.clone(),
            spec: self.spec.clone(),
        }
    }
}

impl<T: SyncTypes> Downloader<T> {
    /// Try peers until the input is complete, a failure is terminal, or attempts run out.
    async fn download(&self, block_root: Hash256) -> DownloadOutcome<T::EthSpec> {
        let mut excluded: HashSet<PeerId> = HashSet::new();
        let max_attempts = self.max_download_attempts();

        for _ in 0..max_attempts {
            if self.chain.fork_choice_contains_block(&block_root) {
                return DownloadOutcome::SuccessLate;
            }
            if let Some(block_input) = self.seen_cache.get(&block_root) {
                // Gossip may have completed the input while we were scheduling.
                if block_input.has_block_and_all_data() {
                    return self.classify_success(block_input);
                }
            }

            let pending_columns = self.pending_columns(&block_root);
            let Some(guard) = self
                .balancer
                .best_peer(pending_columns.as_ref(), &excluded)
            else {
                return DownloadOutcome::FailureTriedAllPeers;
            };
            let peer_id = guard.peer_id();
            let peer_custody = self
                .balancer
                .custody_columns_of(&peer_id)
                .unwrap_or_default();
            metrics::inc_counter(&metrics::DOWNLOAD_ATTEMPTS);

            let seen_timestamp = self.slot_clock.now_duration().unwrap_or_default();
            let result = fetch_block_input_by_root(
                block_root,
                peer_id,
                &peer_custody,
                self.network.as_ref(),
                self.engine.as_ref(),
                &self.engine_cache,
                &self.seen_cache,
                self.verifier.as_ref(),
                seen_timestamp,
            )
            .await;
            drop(guard);

            match result {
                Ok(block_input) => {
                    if block_input.has_block_and_all_data() {
                        return self.classify_success(block_input);
                    }
                    // The peer served what it had; ask someone else for the rest.
                    excluded.insert(peer_id);
                }
                Err(e) if e.is_transient() => {
                    debug!(?block_root, %peer_id, error = ?e, "Transient fetch failure");
                }
                Err(e) => {
                    debug!(?block_root, %peer_id, error = ?e, "Fetch failure, excluding peer");
                    excluded.insert(peer_id);
                }
            }
        }

        DownloadOutcome::FailureMaxAttempts
    }

    fn classify_success(
        &self,
        block_input: Arc<BlockInput<T::EthSpec>>,
    ) -> DownloadOutcome<T::EthSpec> {
        if self
            .chain
            .fork_choice_contains_block(&block_input.block_root())
        {
            DownloadOutcome::SuccessLate
        } else if self
            .chain
            .fork_choice_contains_block(&block_input.parent_root())
        {
            DownloadOutcome::SuccessResolved(block_input)
        } else {
            DownloadOutcome::SuccessMissingParent(block_input)
        }
    }

    /// The columns a peer must cover to be useful for this root. `None` pre-Fulu.
    fn pending_columns(&self, block_root: &Hash256) -> Option<HashSet<ColumnIndex>> {
        let current_epoch = self
            .slot_clock
            .now()?
            .epoch(T::EthSpec::slots_per_epoch());
        if !self.spec.is_peer_das_enabled_for_epoch(current_epoch) {
            return None;
        }
        let missing = match self.seen_cache.get(block_root) {
            Some(block_input) => block_input
                .missing_sampled_columns()
                .into_iter()
                .collect::<HashSet<_>>(),
            // Nothing known about the root yet: any sampled column is useful.
            None => self.custody.sampled_columns().as_ref().clone(),
        };
        Some(missing)
    }

    /// DAS requires many more small fetches per block, so the attempt budget scales with the
    /// node's sample-group count.
    fn max_download_attempts(&self) -> usize {
        let peer_das_active = self
            .slot_clock
            .now()
            .map(|slot| {
                self.spec
                    .is_peer_das_enabled_for_epoch(slot.epoch(T::EthSpec::slots_per_epoch()))
            })
            .unwrap_or(false);
        if peer_das_active {
            let sample_groups = self.custody.num_sampled_columns();
            let scaled =
                PRE_FULU_MAX_DOWNLOAD_ATTEMPTS * sample_groups / self.spec.samples_per_slot as usize;
            scaled.clamp(PRE_FULU_MAX_DOWNLOAD_ATTEMPTS, MAX_DOWNLOAD_ATTEMPTS_CAP)
        } else {
            PRE_FULU_MAX_DOWNLOAD_ATTEMPTS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        E, NullEngine, TestChainView, TestNetwork, TestProcessor, TestSyncTypes,
    };
    use block_input::{
        AcceptAllVerifier, BlockInput, BlockProps, BlockSource, SeenBlockInputCache, SidecarProps,
    };
    use crate::network::RpcError;
    use maplit::hashset;
    use rand::SeedableRng;
    use std::sync::atomic::Ordering;
    use types::test_utils::{NumBlobs, XorShiftRng, rand_block_with_blobs};
    use types::{ChainSpec, ForkName, Slot};

    struct TestRig {
        handle: BlockInputSyncHandle<E>,
        network: Arc<TestNetwork>,
        chain: Arc<TestChainView>,
        processor: Arc<TestProcessor>,
        seen_cache: Arc<SeenBlockInputCache<E, slot_clock::ManualSlotClock>>,
        clock: slot_clock::ManualSlotClock,
        custody: CustodyContext,
    }

    fn rig(spec: ChainSpec) -> TestRig {
        let spec = Arc::new(spec);
        let clock = slot_clock::ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            spec.slot_duration(),
        );
        let custody = CustodyContext::from_columns(hashset! {0, 1, 2, 3}, hashset! {0, 1});
        let seen_cache = Arc::new(SeenBlockInputCache::new(
            custody.clone(),
            clock.clone(),
            spec.clone(),
        ));
        let network = Arc::new(TestNetwork::new());
        let chain = Arc::new(TestChainView::default());
        let processor = Arc::new(TestProcessor::new(chain.clone()));
        network.set_peers(vec![crate::network::PeerSyncMeta {
            peer_id: PeerId::random(),
            client: "test".into(),
            custody_columns: (0..128).collect(),
        }]);

        let handle = BlockInputSync::<TestSyncTypes>::spawn(BlockInputSyncParams {
            network: network.clone(),
            engine: Arc::new(NullEngine),
            processor: processor.clone(),
            chain: chain.clone(),
            verifier: Arc::new(AcceptAllVerifier),
            seen_cache: seen_cache.clone(),
            custody: custody.clone(),
            slot_clock: clock.clone(),
            spec: spec.clone(),
        });
        handle.subscribe_to_network();

        TestRig {
            handle,
            network,
            chain,
            processor,
            seen_cache,
            clock,
            custody,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..2_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_root_is_downloaded_and_processed() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        rig.clock.set_slot(4);

        let parent_root = Hash256::repeat_byte(0x01);
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (block, blobs) = rand_block_with_blobs::<E>(
            ForkName::Deneb,
            NumBlobs::Number(2),
            Slot::new(4),
            parent_root,
            &mut rng,
            &spec,
        );
        let block = Arc::new(block);
        let block_root = block.canonical_root();

        rig.chain.add_block(parent_root);
        rig.network.add_block(block.clone());
        rig.network.add_blobs(blobs);

        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root,
            peer_id: None,
        });

        wait_until(|| rig.processor.num_calls() == 1).await;
        assert!(rig.chain.fork_choice_contains_block(&block_root));
        wait_until(|| rig.seen_cache.get(&block_root).is_none()).await;
    }

    /// Scenario: a proposer that already produced a block this slot has its late block held
    /// back until the attestation deadline.
    #[tokio::test(start_paused = true)]
    async fn unbundled_block_waits_for_attestation_deadline() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        // Pin wall-clock time to the start of slot 1.
        rig.clock.set_slot(1);

        let parent_root = Hash256::repeat_byte(0x02);
        let mut rng = XorShiftRng::from_seed([7; 16]);
        let (block, _) = rand_block_with_blobs::<E>(
            ForkName::Deneb,
            NumBlobs::None,
            Slot::new(1),
            parent_root,
            &mut rng,
            &spec,
        );
        rig.chain.add_block(parent_root);
        rig.chain.see_proposer(Slot::new(1), block.proposer_index());

        let block_input = BlockInput::new_from_block(
            BlockProps {
                block: Arc::new(block),
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(12),
                peer_id: None,
                block_bytes: None,
            },
            ForkName::Deneb,
            false,
            &rig.custody,
        );

        let start = tokio::time::Instant::now();
        rig.handle.send(SyncMessage::IncompleteBlockInput {
            block_input,
            peer_id: None,
        });

        wait_until(|| rig.processor.num_calls() == 1).await;
        let (_, processed_at) = rig.processor.calls.lock()[0];
        // Attestation deadline is a third of the 12 s slot.
        assert!(
            processed_at - start >= Duration::from_secs(4),
            "processing must be deferred to the attestation deadline"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn parent_unknown_result_is_retried_on_next_trigger() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        rig.clock.set_slot(4);

        let parent_root = Hash256::repeat_byte(0x03);
        let mut rng = XorShiftRng::from_seed([11; 16]);
        let (block, _) = rand_block_with_blobs::<E>(
            ForkName::Deneb,
            NumBlobs::None,
            Slot::new(4),
            parent_root,
            &mut rng,
            &spec,
        );
        let block = Arc::new(block);
        let block_root = block.canonical_root();
        rig.chain.add_block(parent_root);

        // The processor races us: its fork choice is one step behind.
        rig.processor
            .script_result(Err(BlockProcessError::ParentUnknown { parent_root }));

        let block_input = rig
            .seen_cache
            .get_by_block(BlockProps {
                block,
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(48),
                peer_id: None,
                block_bytes: None,
            })
            .unwrap();
        rig.handle.send(SyncMessage::IncompleteBlockInput {
            block_input,
            peer_id: None,
        });
        wait_until(|| rig.processor.num_calls() == 1).await;
        assert!(!rig.chain.fork_choice_contains_block(&block_root));

        // Any later trigger revisits the downloaded entry.
        rig.handle.send(SyncMessage::BlockImported {
            block_root: parent_root,
        });
        wait_until(|| rig.processor.num_calls() == 2).await;
        assert!(rig.chain.fork_choice_contains_block(&block_root));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_peers_blacklist_the_root() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        rig.clock.set_slot(4);
        rig.network.fail_all(RpcError::Rpc("refused".into()));

        let block_root = Hash256::repeat_byte(0x04);
        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root,
            peer_id: None,
        });

        // The single peer fails non-transiently and is excluded; no peers remain.
        wait_until(|| rig.network.block_requests.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A later reference to the same root is ignored: it is known bad.
        rig.network.heal();
        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root,
            peer_id: None,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.network.block_requests.load(Ordering::SeqCst), 1);
        assert_eq!(rig.processor.num_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn roots_already_in_fork_choice_are_ignored() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        let block_root = Hash256::repeat_byte(0x05);
        rig.chain.add_block(block_root);

        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root,
            peer_id: None,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.network.block_requests.load(Ordering::SeqCst), 0);
    }

    /// The secondary pull for a gossip block input starts only after the grace period.
    #[tokio::test(start_paused = true)]
    async fn incomplete_input_pull_is_delayed() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let rig = rig(spec.clone());
        rig.clock.set_slot(4);

        let parent_root = Hash256::repeat_byte(0x06);
        let mut rng = XorShiftRng::from_seed([13; 16]);
        let (block, blobs) = rand_block_with_blobs::<E>(
            ForkName::Deneb,
            NumBlobs::Number(2),
            Slot::new(4),
            parent_root,
            &mut rng,
            &spec,
        );
        let block = Arc::new(block);
        rig.chain.add_block(parent_root);
        rig.network.add_block(block.clone());
        rig.network.add_blobs(blobs.iter().skip(1).cloned());

        // Gossip delivered the block and the first blob; blob 1 is missing.
        let block_input = rig
            .seen_cache
            .get_by_block(BlockProps {
                block,
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(48),
                peer_id: None,
                block_bytes: None,
            })
            .unwrap();
        rig.seen_cache
            .get_by_blob(SidecarProps {
                sidecar: Arc::new(blobs[0].clone()),
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(48),
                peer_id: None,
            })
            .unwrap();

        let start = tokio::time::Instant::now();
        rig.handle.send(SyncMessage::IncompleteBlockInput {
            block_input: block_input.clone(),
            peer_id: None,
        });

        wait_until(|| rig.processor.num_calls() == 1).await;
        assert!(block_input.has_block_and_all_data());
        let (_, processed_at) = rig.processor.calls.lock()[0];
        assert!(
            processed_at - start >= Duration::from_millis(500),
            "secondary pull must wait out the gossip grace period"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_ignored_until_subscribed() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        // Build a rig but immediately unsubscribe.
        let rig = rig(spec.clone());
        rig.handle.unsubscribe_from_network();
        tokio::time::sleep(Duration::from_millis(20)).await;

        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root: Hash256::repeat_byte(0x07),
            peer_id: None,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.network.block_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_the_driver() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rig = rig(spec.clone());
        rig.handle.close();
        tokio::time::sleep(Duration::from_millis(20)).await;

        rig.handle.send(SyncMessage::UnknownBlockRoot {
            block_root: Hash256::repeat_byte(0x08),
            peer_id: None,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.network.block_requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pending_map_is_bounded() {
        assert_eq!(MAX_PENDING_BLOCK_INPUTS, 100);
    }
}
