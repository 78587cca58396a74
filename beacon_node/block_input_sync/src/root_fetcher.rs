//! By-root completion of a partial block input against a single peer.
//!
//! The fetch order is: block (if missing), then blobs via the engine-local path with a p2p
//! residual (pre-Fulu), or the peer's custody intersection of the missing columns
//! (post-Fulu). Pieces that arrive on gossip mid-flight surface as benign duplicates.

use crate::network::{RpcError, SyncNetwork};
use block_input::{
    AddOptions, BlockInput, BlockInputError, BlockProps, BlockSource, DaType, EngineBlobsCache,
    ExecutionEngine, SeenBlockInputCache, SidecarProps, SidecarVerifier, VerificationError,
    fetch_engine_blobs,
};
use libp2p_identity::PeerId;
use slot_clock::SlotClock;
use ssz_types::VariableList;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{
    BlobIdentifier, ColumnIndex, DataColumnsByRootIdentifier, EthSpec, Hash256,
};

#[derive(Debug)]
pub enum RootFetchError {
    Rpc(RpcError),
    /// The peer answered a root request with a block of a different root.
    MismatchedBlockRoot { expected: Hash256, got: Hash256 },
    /// The peer returned nothing for the requested root.
    MissingResponse(Hash256),
    /// The peer's custody does not intersect the missing columns; try another peer.
    NoPeerCoverage,
    Verification(VerificationError),
    BlockInput(BlockInputError),
    /// A sidecar could not be built from an engine blob.
    SidecarBuild(String),
}

impl RootFetchError {
    /// Transient failures do not disqualify the peer from future attempts.
    pub fn is_transient(&self) -> bool {
        matches!(self, RootFetchError::Rpc(e) if e.is_transient())
    }
}

impl From<RpcError> for RootFetchError {
    fn from(e: RpcError) -> Self {
        RootFetchError::Rpc(e)
    }
}

impl From<BlockInputError> for RootFetchError {
    fn from(e: BlockInputError) -> Self {
        RootFetchError::BlockInput(e)
    }
}

/// Fetch whatever `block_root`'s input is still missing from `peer_id`.
///
/// Returns the (possibly new) entity. `Ok` does not imply completeness: the caller checks
/// `has_block_and_all_data` and keeps scheduling until it holds.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_block_input_by_root<E, S, N, Engine, V>(
    block_root: Hash256,
    peer_id: PeerId,
    peer_custody_columns: &HashSet<ColumnIndex>,
    network: &N,
    engine: &Engine,
    engine_cache: &EngineBlobsCache<E>,
    seen_cache: &SeenBlockInputCache<E, S>,
    verifier: &V,
    seen_timestamp: Duration,
) -> Result<Arc<BlockInput<E>>, RootFetchError>
where
    E: EthSpec,
    S: SlotClock,
    N: SyncNetwork<E>,
    Engine: ExecutionEngine<E>,
    V: SidecarVerifier<E>,
{
    // Step 1: the block itself.
    let block_input = match seen_cache.get(&block_root) {
        Some(existing) if existing.has_block() => existing,
        _ => {
            let blocks = network
                .send_beacon_blocks_by_root(peer_id, vec![block_root])
                .await?;
            let block = blocks
                .into_iter()
                .next()
                .ok_or(RootFetchError::MissingResponse(block_root))?;
            let got = block.canonical_root();
            if got != block_root {
                return Err(RootFetchError::MismatchedBlockRoot {
                    expected: block_root,
                    got,
                });
            }
            seen_cache.get_by_block(BlockProps {
                block,
                source: BlockSource::ByRoot,
                seen_timestamp,
                peer_id: Some(peer_id),
                block_bytes: None,
            })?
        }
    };

    if block_input.has_all_data() {
        return Ok(block_input);
    }

    // Step 2/3: the data, by fork.
    match block_input.da_type() {
        DaType::PreData => {}
        DaType::Blobs => {
            fetch_missing_blobs(
                &block_input,
                peer_id,
                network,
                engine,
                engine_cache,
                verifier,
                seen_timestamp,
            )
            .await?;
        }
        DaType::Columns => {
            fetch_missing_columns(
                &block_input,
                peer_id,
                peer_custody_columns,
                network,
                verifier,
                seen_timestamp,
            )
            .await?;
        }
    }

    Ok(block_input)
}

/// Pre-Fulu path: engine-local blobs first, then the residual by root from the peer.
async fn fetch_missing_blobs<E, N, Engine, V>(
    block_input: &Arc<BlockInput<E>>,
    peer_id: PeerId,
    network: &N,
    engine: &Engine,
    engine_cache: &EngineBlobsCache<E>,
    verifier: &V,
    seen_timestamp: Duration,
) -> Result<(), RootFetchError>
where
    E: EthSpec,
    N: SyncNetwork<E>,
    Engine: ExecutionEngine<E>,
    V: SidecarVerifier<E>,
{
    let residual = fetch_engine_blobs(engine, engine_cache, block_input, seen_timestamp)
        .await
        .map_err(|e| match e {
            block_input::FetchEngineBlobsError::BlockInput(e) => RootFetchError::BlockInput(e),
            block_input::FetchEngineBlobsError::SidecarBuild(e) => {
                RootFetchError::SidecarBuild(format!("{e:?}"))
            }
        })?;
    if residual.is_empty() {
        return Ok(());
    }

    let block_root = block_input.block_root();
    let blob_ids = residual
        .iter()
        .map(|meta| BlobIdentifier {
            block_root,
            index: meta.index,
        })
        .collect::<Vec<_>>();
    debug!(?block_root, count = blob_ids.len(), %peer_id, "Requesting blobs by root");

    let blobs = network
        .send_blob_sidecars_by_root(peer_id, blob_ids)
        .await?;

    if !blobs.is_empty() {
        verifier
            .validate_block_blob_sidecars(
                block_input.slot(),
                block_root,
                block_input.versioned_hashes()?.len(),
                &blobs,
            )
            .map_err(RootFetchError::Verification)?;
    }

    for blob in blobs {
        let index = blob.index;
        let result = block_input.add_blob(
            SidecarProps {
                sidecar: blob,
                source: BlockSource::ByRoot,
                seen_timestamp,
                peer_id: Some(peer_id),
            },
            AddOptions::permissive(),
        );
        match result {
            Ok(()) => {}
            // Whether to downscore a peer serving an unpaired blob is an open question;
            // drop the sidecar and keep the rest.
            Err(BlockInputError::MismatchedKzgCommitment { .. }) => {
                warn!(?block_root, index, %peer_id, "Dropping unpaired blob from peer");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Post-Fulu path: request the intersection of our missing sampled columns with the peer's
/// advertised custody.
async fn fetch_missing_columns<E, N, V>(
    block_input: &Arc<BlockInput<E>>,
    peer_id: PeerId,
    peer_custody_columns: &HashSet<ColumnIndex>,
    network: &N,
    verifier: &V,
    seen_timestamp: Duration,
) -> Result<(), RootFetchError>
where
    E: EthSpec,
    N: SyncNetwork<E>,
    V: SidecarVerifier<E>,
{
    let block_root = block_input.block_root();
    let mut requested = block_input
        .missing_sampled_columns()
        .into_iter()
        .filter(|index| peer_custody_columns.contains(index))
        .collect::<Vec<_>>();
    requested.sort_unstable();
    if requested.is_empty() {
        return Err(RootFetchError::NoPeerCoverage);
    }

    debug!(?block_root, count = requested.len(), %peer_id, "Requesting columns by root");
    let columns = network
        .send_data_column_sidecars_by_root(
            peer_id,
            DataColumnsByRootIdentifier {
                block_root,
                columns: VariableList::new(requested)
                    .map_err(|_| RootFetchError::Rpc(RpcError::Rpc("request too long".into())))?,
            },
        )
        .await?;

    if !columns.is_empty() {
        let blob_count = block_input
            .expected_data_count()
            .unwrap_or(0);
        verifier
            .validate_block_data_column_sidecars(
                block_input.slot(),
                block_root,
                blob_count,
                &columns,
            )
            .map_err(RootFetchError::Verification)?;
    }

    for column in columns {
        let index = column.index;
        let result = block_input.add_column(
            SidecarProps {
                sidecar: column,
                source: BlockSource::ByRoot,
                seen_timestamp,
                peer_id: Some(peer_id),
            },
            AddOptions::permissive(),
        );
        match result {
            Ok(()) => {}
            // Pairing failures are dropped silently; the rest of the response is kept.
            Err(BlockInputError::MismatchedKzgCommitment { .. }) => {
                debug!(?block_root, index, %peer_id, "Dropping unpaired column from peer");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
