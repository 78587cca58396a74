//! The per-(slot, block-root) aggregation entity.
//!
//! A `BlockInput` is created on the first sighting of a block, blob sidecar or data-column
//! sidecar and accumulates the remaining pieces from any ingestion path (gossip, by-range,
//! by-root, api, engine-local). Once every required piece is present it is "complete" and the
//! data promise resolves for every waiter.

use crate::custody::CustodyContext;
use crate::{BlockSource, DaType};
use libp2p_identity::PeerId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use types::{
    BlobSidecar, ColumnIndex, DataColumnSidecar, EthSpec, ForkName, Hash256, SignedBeaconBlock,
    Slot, VersionedHash,
};

/// Wall-clock timestamp of a sighting, as a duration since the unix epoch.
pub type SeenTimestamp = Duration;

/// How to treat a second sighting of a piece that is already cached.
#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    pub throw_on_duplicate_add: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            throw_on_duplicate_add: true,
        }
    }
}

impl AddOptions {
    /// Gossip and in-flight rpc deliveries race; callers on those paths treat duplicates as
    /// benign no-ops.
    pub fn permissive() -> Self {
        Self {
            throw_on_duplicate_add: false,
        }
    }
}

/// A block sighting.
#[derive(Debug, Clone)]
pub struct BlockProps<E: EthSpec> {
    pub block: Arc<SignedBeaconBlock<E>>,
    pub source: BlockSource,
    pub seen_timestamp: SeenTimestamp,
    pub peer_id: Option<PeerId>,
    /// Wire bytes from the gossip decode, kept for the persistence fast path.
    pub block_bytes: Option<Vec<u8>>,
}

/// A sidecar sighting.
#[derive(Debug, Clone)]
pub struct SidecarProps<S> {
    pub sidecar: Arc<S>,
    pub source: BlockSource,
    pub seen_timestamp: SeenTimestamp,
    pub peer_id: Option<PeerId>,
}

/// A missing blob index paired with its request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingBlobMeta {
    pub index: u64,
    pub versioned_hash: VersionedHash,
}

/// The payload the data promise resolves with.
#[derive(Debug, Clone)]
pub enum AvailableData<E: EthSpec> {
    /// Pre-Deneb block, zero commitments, or data outside the retention window.
    NoData,
    /// All committed blobs, ascending by index.
    Blobs(Vec<Arc<BlobSidecar<E>>>),
    /// All sampled columns, ascending by index.
    Columns(Vec<Arc<DataColumnSidecar<E>>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockInputError {
    /// The computed root of the added piece does not match this entity's root.
    MismatchedBlockRoot { expected: Hash256, got: Hash256 },
    /// A block was added twice with strict options.
    DuplicateBlockAdd(Hash256),
    /// A sidecar was added twice with strict options.
    DuplicateSidecarAdd { block_root: Hash256, index: u64 },
    /// The sidecar's KZG commitment(s) do not pair with the block's.
    MismatchedKzgCommitment { block_root: Hash256, index: u64 },
    /// A sidecar of the wrong kind for this entity's fork.
    SidecarTypeMismatch { da_type: DaType },
    /// `block()` was called before the block arrived. Check `has_block()` first.
    MissingBlock(Hash256),
    /// `time_complete()` was called before completion. Check `has_all_data()` first.
    MissingTimeComplete(Hash256),
    /// A bounded wait ran out of time.
    WaitTimeout,
    /// The caller's cancel signal fired.
    Cancelled,
}

#[derive(Debug)]
struct CachedBlock<E: EthSpec> {
    block: Arc<SignedBeaconBlock<E>>,
    source: BlockSource,
    peer_id: Option<PeerId>,
    block_bytes: Option<Vec<u8>>,
    /// Versioned hashes of the block's commitments, computed once (Deneb onwards).
    versioned_hashes: Vec<VersionedHash>,
}

#[derive(Debug)]
struct CachedSidecar<S> {
    sidecar: Arc<S>,
    source: BlockSource,
    seen_timestamp: SeenTimestamp,
    peer_id: Option<PeerId>,
}

/// The mutable interior, a tagged union over the DA type.
#[derive(Debug)]
enum State<E: EthSpec> {
    PreData {
        block: Option<CachedBlock<E>>,
    },
    Blobs {
        block: Option<CachedBlock<E>>,
        blobs: BTreeMap<u64, CachedSidecar<BlobSidecar<E>>>,
    },
    Columns {
        block: Option<CachedBlock<E>>,
        columns: BTreeMap<ColumnIndex, CachedSidecar<DataColumnSidecar<E>>>,
        /// Commitment count carried by the first column, used before the block is known.
        carried_commitment_count: Option<usize>,
    },
}

pub struct BlockInput<E: EthSpec> {
    /*
     * Identity, fixed at construction.
     */
    da_type: DaType,
    fork: ForkName,
    slot: Slot,
    block_root: Hash256,
    parent_root: Hash256,
    proposer_index: u64,
    created: SeenTimestamp,
    da_out_of_range: bool,
    init_source: BlockSource,
    /// The node's sampled column indices (empty unless `da_type` is `Columns`).
    sampled_columns: Arc<HashSet<ColumnIndex>>,
    /// The node's custody column indices (empty unless `da_type` is `Columns`).
    custody_columns: Arc<HashSet<ColumnIndex>>,

    /*
     * Mutable state. `add_*` mutate under the write lock and never await.
     */
    state: RwLock<State<E>>,
    time_complete: RwLock<Option<SeenTimestamp>>,

    /*
     * Resolve-once promises. Only the senders live here; waiters subscribe.
     */
    block_tx: watch::Sender<Option<Arc<SignedBeaconBlock<E>>>>,
    data_tx: watch::Sender<Option<AvailableData<E>>>,
}

impl<E: EthSpec> std::fmt::Debug for BlockInput<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockInput")
            .field("da_type", &self.da_type)
            .field("fork", &self.fork)
            .field("slot", &self.slot)
            .field("block_root", &self.block_root)
            .field("has_block", &self.has_block())
            .field("has_all_data", &self.has_all_data())
            .finish()
    }
}

impl<E: EthSpec> BlockInput<E> {
    /// Create an entity from its first block sighting. The block is authoritative: zero
    /// commitments or an out-of-range slot make the entity complete immediately.
    pub fn new_from_block(
        props: BlockProps<E>,
        fork: ForkName,
        da_out_of_range: bool,
        custody: &CustodyContext,
    ) -> Arc<Self> {
        let block = props.block.clone();
        let entity = Self::new_inner(
            DaType::from_fork(fork),
            fork,
            block.slot(),
            block.canonical_root(),
            block.parent_root(),
            block.proposer_index(),
            props.seen_timestamp,
            da_out_of_range,
            props.source,
            custody,
        );
        // The root trivially matches and the entity is fresh, so this cannot fail.
        entity
            .add_block(props, AddOptions::default())
            .expect("adding the founding block to a fresh entity succeeds");
        entity
    }

    /// Create an entity from a blob sidecar; identity fields derive from the carried header.
    pub fn new_from_blob(
        props: SidecarProps<BlobSidecar<E>>,
        fork: ForkName,
        da_out_of_range: bool,
        custody: &CustodyContext,
    ) -> Arc<Self> {
        let sidecar = props.sidecar.clone();
        let entity = Self::new_inner(
            DaType::Blobs,
            fork,
            sidecar.slot(),
            sidecar.block_root(),
            sidecar.block_parent_root(),
            sidecar.block_proposer_index(),
            props.seen_timestamp,
            da_out_of_range,
            props.source,
            custody,
        );
        entity
            .add_blob(props, AddOptions::default())
            .expect("adding the founding blob to a fresh entity succeeds");
        entity
    }

    /// Create an entity from a data-column sidecar. An empty sampled set or an empty carried
    /// commitment vector makes the entity complete immediately, even without the block.
    pub fn new_from_column(
        props: SidecarProps<DataColumnSidecar<E>>,
        fork: ForkName,
        da_out_of_range: bool,
        custody: &CustodyContext,
    ) -> Arc<Self> {
        let sidecar = props.sidecar.clone();
        let entity = Self::new_inner(
            DaType::Columns,
            fork,
            sidecar.slot(),
            sidecar.block_root(),
            sidecar.block_parent_root(),
            sidecar.block_proposer_index(),
            props.seen_timestamp,
            da_out_of_range,
            props.source,
            custody,
        );
        entity
            .add_column(props, AddOptions::default())
            .expect("adding the founding column to a fresh entity succeeds");
        entity
    }

    #[allow(clippy::too_many_arguments)]
    fn new_inner(
        da_type: DaType,
        fork: ForkName,
        slot: Slot,
        block_root: Hash256,
        parent_root: Hash256,
        proposer_index: u64,
        created: SeenTimestamp,
        da_out_of_range: bool,
        init_source: BlockSource,
        custody: &CustodyContext,
    ) -> Arc<Self> {
        let (sampled_columns, custody_columns) = if da_type == DaType::Columns {
            (custody.sampled_columns(), custody.custody_columns())
        } else {
            (Arc::new(HashSet::new()), Arc::new(HashSet::new()))
        };

        let state = match da_type {
            DaType::PreData => State::PreData { block: None },
            DaType::Blobs => State::Blobs {
                block: None,
                blobs: BTreeMap::new(),
            },
            DaType::Columns => State::Columns {
                block: None,
                columns: BTreeMap::new(),
                carried_commitment_count: None,
            },
        };

        Arc::new(Self {
            da_type,
            fork,
            slot,
            block_root,
            parent_root,
            proposer_index,
            created,
            da_out_of_range,
            init_source,
            sampled_columns,
            custody_columns,
            state: RwLock::new(state),
            time_complete: RwLock::new(None),
            block_tx: watch::Sender::new(None),
            data_tx: watch::Sender::new(None),
        })
    }

    /*
     * Identity accessors.
     */

    pub fn da_type(&self) -> DaType {
        self.da_type
    }

    pub fn fork(&self) -> ForkName {
        self.fork
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn block_root(&self) -> Hash256 {
        self.block_root
    }

    pub fn parent_root(&self) -> Hash256 {
        self.parent_root
    }

    pub fn proposer_index(&self) -> u64 {
        self.proposer_index
    }

    pub fn created(&self) -> SeenTimestamp {
        self.created
    }

    pub fn da_out_of_range(&self) -> bool {
        self.da_out_of_range
    }

    pub fn init_source(&self) -> BlockSource {
        self.init_source
    }

    pub fn sampled_column_indices(&self) -> &HashSet<ColumnIndex> {
        &self.sampled_columns
    }

    pub fn custody_column_indices(&self) -> &HashSet<ColumnIndex> {
        &self.custody_columns
    }

    /*
     * Ingestion.
     */

    /// Add the block to this entity.
    ///
    /// Fails on a root mismatch (the entity is unchanged) and, when strict, on a duplicate
    /// add. On first addition any cached sidecars that fail KZG pairing against the block are
    /// ejected, the block promise resolves, and the data promise resolves if all required
    /// data is already present.
    pub fn add_block(&self, props: BlockProps<E>, opts: AddOptions) -> Result<(), BlockInputError> {
        let computed_root = props.block.canonical_root();
        if computed_root != self.block_root {
            return Err(BlockInputError::MismatchedBlockRoot {
                expected: self.block_root,
                got: computed_root,
            });
        }

        let versioned_hashes = props
            .block
            .message()
            .body()
            .blob_kzg_commitments()
            .map(|commitments| {
                commitments
                    .iter()
                    .map(kzg::kzg_commitment_to_versioned_hash)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut state = self.state.write();
        if state.block().is_some() {
            return if opts.throw_on_duplicate_add {
                Err(BlockInputError::DuplicateBlockAdd(self.block_root))
            } else {
                Ok(())
            };
        }

        let cached = CachedBlock {
            block: props.block.clone(),
            source: props.source,
            peer_id: props.peer_id,
            block_bytes: props.block_bytes,
            versioned_hashes,
        };

        match &mut *state {
            State::PreData { block } => {
                *block = Some(cached);
            }
            State::Blobs { block, blobs } => {
                let commitments = props
                    .block
                    .message()
                    .body()
                    .blob_kzg_commitments()
                    .ok()
                    .cloned()
                    .unwrap_or_default();
                // Pairing sweep: keep exactly the cached blobs whose commitment matches the
                // block's commitment at their index.
                blobs.retain(|index, cached_blob| {
                    let paired = commitments
                        .get(*index as usize)
                        .is_some_and(|c| *c == cached_blob.sidecar.kzg_commitment);
                    if !paired {
                        debug!(
                            block_root = ?self.block_root,
                            index,
                            "Dropping unpaired cached blob"
                        );
                    }
                    paired
                });
                *block = Some(cached);
            }
            State::Columns {
                block,
                columns,
                carried_commitment_count: _,
            } => {
                let commitments = props
                    .block
                    .message()
                    .body()
                    .blob_kzg_commitments()
                    .ok()
                    .cloned()
                    .unwrap_or_default();
                // All columns of a block carry the full commitment vector; a mismatch against
                // the block ejects the column.
                columns.retain(|index, cached_column| {
                    let paired = cached_column.sidecar.kzg_commitments == commitments;
                    if !paired {
                        debug!(
                            block_root = ?self.block_root,
                            index,
                            "Dropping unpaired cached column"
                        );
                    }
                    paired
                });
                *block = Some(cached);
            }
        }

        self.resolve_block_promise(&state);
        self.maybe_complete(&state, props.seen_timestamp);
        Ok(())
    }

    /// Add a blob sidecar. A duplicate is an error when strict, a no-op otherwise. If the
    /// block is known the blob must pair with the block's commitment at its index.
    pub fn add_blob(
        &self,
        props: SidecarProps<BlobSidecar<E>>,
        opts: AddOptions,
    ) -> Result<(), BlockInputError> {
        let sidecar_root = props.sidecar.block_root();
        if sidecar_root != self.block_root {
            return Err(BlockInputError::MismatchedBlockRoot {
                expected: self.block_root,
                got: sidecar_root,
            });
        }

        let mut state = self.state.write();
        let State::Blobs { block, blobs } = &mut *state else {
            return Err(BlockInputError::SidecarTypeMismatch {
                da_type: self.da_type,
            });
        };

        let index = props.sidecar.index;
        if let Some(cached_block) = block {
            let paired = cached_block
                .block
                .message()
                .body()
                .blob_kzg_commitments()
                .ok()
                .and_then(|commitments| commitments.get(index as usize).copied())
                .is_some_and(|commitment| commitment == props.sidecar.kzg_commitment);
            if !paired {
                return Err(BlockInputError::MismatchedKzgCommitment {
                    block_root: self.block_root,
                    index,
                });
            }
        }

        if blobs.contains_key(&index) {
            return if opts.throw_on_duplicate_add {
                Err(BlockInputError::DuplicateSidecarAdd {
                    block_root: self.block_root,
                    index,
                })
            } else {
                Ok(())
            };
        }

        blobs.insert(
            index,
            CachedSidecar {
                sidecar: props.sidecar,
                source: props.source,
                seen_timestamp: props.seen_timestamp,
                peer_id: props.peer_id,
            },
        );

        self.maybe_complete(&state, props.seen_timestamp);
        Ok(())
    }

    /// Add a data-column sidecar. Analogous to `add_blob`, with pairing over the full
    /// commitment vector.
    pub fn add_column(
        &self,
        props: SidecarProps<DataColumnSidecar<E>>,
        opts: AddOptions,
    ) -> Result<(), BlockInputError> {
        let sidecar_root = props.sidecar.block_root();
        if sidecar_root != self.block_root {
            return Err(BlockInputError::MismatchedBlockRoot {
                expected: self.block_root,
                got: sidecar_root,
            });
        }

        let mut state = self.state.write();
        let State::Columns {
            block,
            columns,
            carried_commitment_count,
        } = &mut *state
        else {
            return Err(BlockInputError::SidecarTypeMismatch {
                da_type: self.da_type,
            });
        };

        let index = props.sidecar.index;
        if let Some(cached_block) = block {
            let commitments = cached_block
                .block
                .message()
                .body()
                .blob_kzg_commitments()
                .ok();
            let paired =
                commitments.is_some_and(|commitments| *commitments == props.sidecar.kzg_commitments);
            if !paired {
                return Err(BlockInputError::MismatchedKzgCommitment {
                    block_root: self.block_root,
                    index,
                });
            }
        }

        if columns.contains_key(&index) {
            return if opts.throw_on_duplicate_add {
                Err(BlockInputError::DuplicateSidecarAdd {
                    block_root: self.block_root,
                    index,
                })
            } else {
                Ok(())
            };
        }

        carried_commitment_count.get_or_insert(props.sidecar.kzg_commitments.len());
        columns.insert(
            index,
            CachedSidecar {
                sidecar: props.sidecar,
                source: props.source,
                seen_timestamp: props.seen_timestamp,
                peer_id: props.peer_id,
            },
        );

        self.maybe_complete(&state, props.seen_timestamp);
        Ok(())
    }

    /*
     * Predicates.
     */

    pub fn has_block(&self) -> bool {
        self.state.read().block().is_some()
    }

    pub fn has_all_data(&self) -> bool {
        self.data_tx.borrow().is_some()
    }

    pub fn has_block_and_all_data(&self) -> bool {
        self.has_block() && self.has_all_data()
    }

    pub fn has_blob(&self, index: u64) -> bool {
        match &*self.state.read() {
            State::Blobs { blobs, .. } => blobs.contains_key(&index),
            _ => false,
        }
    }

    pub fn has_column(&self, index: ColumnIndex) -> bool {
        match &*self.state.read() {
            State::Columns { columns, .. } => columns.contains_key(&index),
            _ => false,
        }
    }

    /*
     * Accessors that require the block or completion. Callers are expected to check the
     * predicates first.
     */

    pub fn block(&self) -> Result<Arc<SignedBeaconBlock<E>>, BlockInputError> {
        self.state
            .read()
            .block()
            .map(|cached| cached.block.clone())
            .ok_or(BlockInputError::MissingBlock(self.block_root))
    }

    pub fn block_source(&self) -> Result<BlockSource, BlockInputError> {
        self.state
            .read()
            .block()
            .map(|cached| cached.source)
            .ok_or(BlockInputError::MissingBlock(self.block_root))
    }

    /// The gossip wire bytes of the block, when the sighting carried them.
    pub fn cached_block_bytes(&self) -> Option<Vec<u8>> {
        self.state
            .read()
            .block()
            .and_then(|cached| cached.block_bytes.clone())
    }

    pub fn versioned_hashes(&self) -> Result<Vec<VersionedHash>, BlockInputError> {
        self.state
            .read()
            .block()
            .map(|cached| cached.versioned_hashes.clone())
            .ok_or(BlockInputError::MissingBlock(self.block_root))
    }

    pub fn time_complete(&self) -> Result<SeenTimestamp, BlockInputError> {
        self.time_complete
            .read()
            .ok_or(BlockInputError::MissingTimeComplete(self.block_root))
    }

    /// The blob count this entity is waiting on, if it can be known yet.
    pub fn expected_data_count(&self) -> Option<usize> {
        let state = self.state.read();
        match &*state {
            State::PreData { .. } => Some(0),
            State::Blobs { block, .. } => {
                block.as_ref().map(|cached| cached.versioned_hashes.len())
            }
            State::Columns {
                block,
                carried_commitment_count,
                ..
            } => block
                .as_ref()
                .map(|cached| cached.versioned_hashes.len())
                .or(*carried_commitment_count),
        }
    }

    /// Missing blob indices with their versioned hashes, for use as request identifiers.
    /// Requires the block (the expected count derives from it).
    pub fn missing_blob_meta(&self) -> Result<Vec<MissingBlobMeta>, BlockInputError> {
        let state = self.state.read();
        let State::Blobs { block, blobs } = &*state else {
            return Ok(vec![]);
        };
        let cached_block = block
            .as_ref()
            .ok_or(BlockInputError::MissingBlock(self.block_root))?;
        Ok(cached_block
            .versioned_hashes
            .iter()
            .enumerate()
            .filter(|(index, _)| !blobs.contains_key(&(*index as u64)))
            .map(|(index, versioned_hash)| MissingBlobMeta {
                index: index as u64,
                versioned_hash: *versioned_hash,
            })
            .collect())
    }

    /// Sampled column indices not yet cached, ascending. Empty once complete.
    pub fn missing_sampled_columns(&self) -> Vec<ColumnIndex> {
        if self.has_all_data() {
            return vec![];
        }
        let state = self.state.read();
        let State::Columns { columns, .. } = &*state else {
            return vec![];
        };
        let mut missing = self
            .sampled_columns
            .iter()
            .filter(|index| !columns.contains_key(index))
            .copied()
            .collect::<Vec<_>>();
        missing.sort_unstable();
        missing
    }

    /// Cached blob sidecars, ascending by index.
    pub fn blob_sidecars(&self) -> Vec<Arc<BlobSidecar<E>>> {
        match &*self.state.read() {
            State::Blobs { blobs, .. } => {
                blobs.values().map(|cached| cached.sidecar.clone()).collect()
            }
            _ => vec![],
        }
    }

    /// The cached columns intersected with the node's custody set, ascending by index.
    pub fn custody_columns(&self) -> Vec<Arc<DataColumnSidecar<E>>> {
        self.columns_matching(&self.custody_columns)
    }

    /// The cached columns intersected with the node's sampled set, ascending by index.
    pub fn sampled_columns(&self) -> Vec<Arc<DataColumnSidecar<E>>> {
        self.columns_matching(&self.sampled_columns)
    }

    fn columns_matching(
        &self,
        indices: &HashSet<ColumnIndex>,
    ) -> Vec<Arc<DataColumnSidecar<E>>> {
        match &*self.state.read() {
            State::Columns { columns, .. } => columns
                .iter()
                .filter(|(index, _)| indices.contains(index))
                .map(|(_, cached)| cached.sidecar.clone())
                .collect(),
            _ => vec![],
        }
    }

    /// Every peer that contributed a piece to this entity. Used for fault attribution when
    /// the block later turns out to be invalid.
    pub fn contributing_peers(&self) -> HashSet<PeerId> {
        let state = self.state.read();
        let mut peers = HashSet::new();
        if let Some(peer_id) = state.block().and_then(|cached| cached.peer_id) {
            peers.insert(peer_id);
        }
        match &*state {
            State::PreData { .. } => {}
            State::Blobs { blobs, .. } => {
                peers.extend(blobs.values().filter_map(|cached| cached.peer_id));
            }
            State::Columns { columns, .. } => {
                peers.extend(columns.values().filter_map(|cached| cached.peer_id));
            }
        }
        peers
    }

    /// Sighting metadata of the cached sidecars: `(index, source, seen_timestamp)`.
    pub fn data_sightings(&self) -> Vec<(u64, BlockSource, SeenTimestamp)> {
        match &*self.state.read() {
            State::PreData { .. } => vec![],
            State::Blobs { blobs, .. } => blobs
                .iter()
                .map(|(index, cached)| (*index, cached.source, cached.seen_timestamp))
                .collect(),
            State::Columns { columns, .. } => columns
                .iter()
                .map(|(index, cached)| (*index, cached.source, cached.seen_timestamp))
                .collect(),
        }
    }

    /*
     * Bounded waits.
     */

    /// Wait until the block is present, up to `timeout`.
    pub async fn wait_for_block(
        &self,
        timeout: Duration,
        cancel: exit_future::Exit,
    ) -> Result<Arc<SignedBeaconBlock<E>>, BlockInputError> {
        let mut rx = self.block_tx.subscribe();
        let wait = async move {
            let value = rx
                .wait_for(|value| value.is_some())
                .await
                .map_err(|_| BlockInputError::Cancelled)?;
            Ok(value.clone().expect("checked by wait_for predicate"))
        };
        tokio::select! {
            biased;
            _ = cancel => Err(BlockInputError::Cancelled),
            result = tokio::time::timeout(timeout, wait) => {
                result.map_err(|_| BlockInputError::WaitTimeout)?
            }
        }
    }

    /// Wait until all required data is present, up to `timeout`.
    pub async fn wait_for_all_data(
        &self,
        timeout: Duration,
        cancel: exit_future::Exit,
    ) -> Result<AvailableData<E>, BlockInputError> {
        let mut rx = self.data_tx.subscribe();
        let wait = async move {
            let value = rx
                .wait_for(|value| value.is_some())
                .await
                .map_err(|_| BlockInputError::Cancelled)?;
            Ok(value.clone().expect("checked by wait_for predicate"))
        };
        tokio::select! {
            biased;
            _ = cancel => Err(BlockInputError::Cancelled),
            result = tokio::time::timeout(timeout, wait) => {
                result.map_err(|_| BlockInputError::WaitTimeout)?
            }
        }
    }

    /// Wait until both the block and all required data are present, up to `timeout`.
    pub async fn wait_for_block_and_all_data(
        &self,
        timeout: Duration,
        cancel: exit_future::Exit,
    ) -> Result<(Arc<SignedBeaconBlock<E>>, AvailableData<E>), BlockInputError> {
        let block = self.wait_for_block(timeout, cancel.clone()).await?;
        let data = self.wait_for_all_data(timeout, cancel).await?;
        Ok((block, data))
    }

    /*
     * Completion internals.
     */

    fn resolve_block_promise(&self, state: &State<E>) {
        if let Some(cached) = state.block() {
            // Resolving is idempotent: the first send wins and later sends replace the value
            // with an identical one.
            self.block_tx.send_replace(Some(cached.block.clone()));
        }
    }

    /// Check the completion condition and, on the false -> true transition, pin
    /// `time_complete` to the triggering sighting and resolve the data promise.
    fn maybe_complete(&self, state: &State<E>, seen_timestamp: SeenTimestamp) {
        if self.has_all_data() {
            return;
        }

        let available = match state {
            State::PreData { block } => block.as_ref().map(|_| AvailableData::NoData),
            State::Blobs { block, blobs } => block.as_ref().and_then(|cached| {
                let expected = cached.versioned_hashes.len();
                if self.da_out_of_range || expected == 0 {
                    Some(AvailableData::NoData)
                } else if blobs.len() == expected {
                    Some(AvailableData::Blobs(
                        blobs.values().map(|cached| cached.sidecar.clone()).collect(),
                    ))
                } else {
                    None
                }
            }),
            State::Columns {
                block,
                columns,
                carried_commitment_count,
            } => {
                let commitment_count = block
                    .as_ref()
                    .map(|cached| cached.versioned_hashes.len())
                    .or(*carried_commitment_count);
                let trivially_complete = self.da_out_of_range
                    || self.sampled_columns.is_empty()
                    || commitment_count == Some(0);
                if trivially_complete {
                    Some(AvailableData::NoData)
                } else if self
                    .sampled_columns
                    .iter()
                    .all(|index| columns.contains_key(index))
                {
                    Some(AvailableData::Columns(
                        columns
                            .iter()
                            .filter(|(index, _)| self.sampled_columns.contains(index))
                            .map(|(_, cached)| cached.sidecar.clone())
                            .collect(),
                    ))
                } else {
                    None
                }
            }
        };

        if let Some(available) = available {
            *self.time_complete.write() = Some(seen_timestamp);
            self.data_tx.send_replace(Some(available));
            debug!(
                block_root = ?self.block_root,
                slot = %self.slot,
                "Block input complete"
            );
        }
    }
}

impl<E: EthSpec> State<E> {
    fn block(&self) -> Option<&CachedBlock<E>> {
        match self {
            State::PreData { block } => block.as_ref(),
            State::Blobs { block, .. } => block.as_ref(),
            State::Columns { block, .. } => block.as_ref(),
        }
    }
}
