//! The engine-local blob recovery path.
//!
//! If a blob was seen in the public mempool it is often unnecessary to wait for it on gossip:
//! the execution engine can serve it from its blob pool by versioned hash. Responses are
//! cached so that repeated rounds for the same block do not re-query the engine.

use crate::block_input::{
    AddOptions, BlockInput, BlockInputError, MissingBlobMeta, SidecarProps,
};
use crate::{BlockSource, metrics};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::non_zero_usize::new_non_zero_usize;
use types::{
    Blob, BlobSidecar, BlobSidecarError, EthSpec, ForkName, Hash256, KzgProof, VersionedHash,
};

/// One epoch of blocks at ~16 blobs each.
const ENGINE_BLOBS_CACHE_CAPACITY: NonZeroUsize = new_non_zero_usize(512);

/// Roots for which the engine has already been consulted.
const QUERIED_ROOTS_CAPACITY: NonZeroUsize = new_non_zero_usize(1024);

/// A blob and its proof as returned by the engine's blob-pool query.
#[derive(Debug, Clone)]
pub struct BlobAndProof<E: EthSpec> {
    pub blob: Blob<E>,
    pub proof: KzgProof,
}

#[derive(Debug)]
pub enum EngineError {
    /// The engine endpoint is not configured or unreachable.
    Offline,
    RequestFailed(String),
}

/// The execution-engine collaborator: a bulk blob-pool query keyed by versioned hash.
///
/// A bulk failure is treated by callers as an all-null response.
pub trait ExecutionEngine<E: EthSpec>: Send + Sync {
    fn get_blobs(
        &self,
        fork: ForkName,
        versioned_hashes: Vec<VersionedHash>,
    ) -> impl Future<Output = Result<Vec<Option<BlobAndProof<E>>>, EngineError>> + Send;
}

enum CachedEngineBlob<E: EthSpec> {
    Known(BlobAndProof<E>),
    /// Negative sentinel: the engine was asked for this hash once and did not have it.
    AskedOnce,
}

/// Bounded caches for the engine-local path.
///
/// Lookups deliberately do not refresh recency, so eviction approximates insertion (FIFO)
/// order.
pub struct EngineBlobsCache<E: EthSpec> {
    blobs: Mutex<LruCache<VersionedHash, CachedEngineBlob<E>>>,
    queried_roots: Mutex<LruCache<Hash256, ()>>,
}

impl<E: EthSpec> Default for EngineBlobsCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EthSpec> EngineBlobsCache<E> {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(LruCache::new(ENGINE_BLOBS_CACHE_CAPACITY)),
            queried_roots: Mutex::new(LruCache::new(QUERIED_ROOTS_CAPACITY)),
        }
    }

    pub fn insert(&self, versioned_hash: VersionedHash, blob_and_proof: BlobAndProof<E>) {
        self.blobs
            .lock()
            .put(versioned_hash, CachedEngineBlob::Known(blob_and_proof));
    }

    pub fn insert_negative(&self, versioned_hash: VersionedHash) {
        self.blobs
            .lock()
            .put(versioned_hash, CachedEngineBlob::AskedOnce);
    }

    fn lookup(&self, versioned_hash: &VersionedHash) -> Option<Option<BlobAndProof<E>>> {
        self.blobs
            .lock()
            .peek(versioned_hash)
            .map(|cached| match cached {
                CachedEngineBlob::Known(blob_and_proof) => Some(blob_and_proof.clone()),
                CachedEngineBlob::AskedOnce => None,
            })
    }

    pub fn contains(&self, versioned_hash: &VersionedHash) -> bool {
        self.blobs.lock().peek(versioned_hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    pub fn mark_queried(&self, block_root: Hash256) {
        self.queried_roots.lock().put(block_root, ());
    }

    pub fn was_queried(&self, block_root: &Hash256) -> bool {
        self.queried_roots.lock().peek(block_root).is_some()
    }
}

#[derive(Debug)]
pub enum FetchEngineBlobsError {
    BlockInput(BlockInputError),
    SidecarBuild(BlobSidecarError),
}

impl From<BlockInputError> for FetchEngineBlobsError {
    fn from(e: BlockInputError) -> Self {
        FetchEngineBlobsError::BlockInput(e)
    }
}

/// Try to complete `block_input`'s missing blobs from the engine-local path.
///
/// Returns the residual missing set, which the caller sends to peers. The engine is asked at
/// most once per block root; later rounds are served from the cache only.
pub async fn fetch_engine_blobs<E: EthSpec, Engine: ExecutionEngine<E>>(
    engine: &Engine,
    cache: &EngineBlobsCache<E>,
    block_input: &BlockInput<E>,
    seen_timestamp: Duration,
) -> Result<Vec<MissingBlobMeta>, FetchEngineBlobsError> {
    let missing = block_input.missing_blob_meta()?;
    if missing.is_empty() {
        return Ok(vec![]);
    }

    let block_root = block_input.block_root();
    let block = block_input.block()?;
    let signed_block_header = block.signed_block_header();

    let mut insert_blob = |meta: &MissingBlobMeta,
                           blob_and_proof: BlobAndProof<E>|
     -> Result<(), FetchEngineBlobsError> {
        let sidecar = BlobSidecar::new_with_existing_proof(
            meta.index as usize,
            blob_and_proof.blob,
            &block,
            signed_block_header.clone(),
            blob_and_proof.proof,
        )
        .map_err(FetchEngineBlobsError::SidecarBuild)?;
        // Gossip may have delivered the same blob while we were here.
        block_input.add_blob(
            SidecarProps {
                sidecar: Arc::new(sidecar),
                source: BlockSource::EngineLocal,
                seen_timestamp,
                peer_id: None,
            },
            AddOptions::permissive(),
        )?;
        Ok(())
    };

    // Serve what the cache already knows, and collect true misses.
    let mut cache_misses = vec![];
    for meta in &missing {
        match cache.lookup(&meta.versioned_hash) {
            Some(Some(blob_and_proof)) => insert_blob(meta, blob_and_proof)?,
            Some(None) => {} // asked before, the engine does not have it
            None => cache_misses.push(*meta),
        }
    }

    // One engine round per block root.
    if !cache_misses.is_empty() && !cache.was_queried(&block_root) {
        cache.mark_queried(block_root);

        let hashes = cache_misses
            .iter()
            .map(|meta| meta.versioned_hash)
            .collect::<Vec<_>>();
        metrics::observe(&metrics::BLOBS_FROM_EL_EXPECTED, hashes.len() as f64);
        debug!(
            ?block_root,
            num_expected_blobs = hashes.len(),
            "Fetching blobs from the EL"
        );

        let response = match engine.get_blobs(block_input.fork(), hashes).await {
            Ok(response) => response,
            Err(e) => {
                debug!(?block_root, error = ?e, "Engine blobs request failed");
                metrics::inc_counter(&metrics::BLOBS_FROM_EL_ERROR_TOTAL);
                // A bulk failure is an all-null response.
                vec![None; cache_misses.len()]
            }
        };

        let num_fetched = response.iter().filter(|opt| opt.is_some()).count();
        metrics::observe(&metrics::BLOBS_FROM_EL_RECEIVED, num_fetched as f64);
        if num_fetched == 0 {
            metrics::inc_counter(&metrics::BLOBS_FROM_EL_MISS_TOTAL);
        } else {
            metrics::inc_counter(&metrics::BLOBS_FROM_EL_HIT_TOTAL);
        }

        for (meta, blob_and_proof_opt) in cache_misses.iter().zip(response.into_iter()) {
            match blob_and_proof_opt {
                Some(blob_and_proof) => {
                    cache.insert(meta.versioned_hash, blob_and_proof.clone());
                    insert_blob(meta, blob_and_proof)?;
                }
                None => cache.insert_negative(meta.versioned_hash),
            }
        }
    }

    Ok(block_input.missing_blob_meta()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_input::BlockProps;
    use crate::custody::CustodyContext;
    use maplit::hashset;
    use parking_lot::Mutex as PlMutex;
    use rand::SeedableRng;
    use types::test_utils::{NumBlobs, XorShiftRng, generate_rand_block_and_blobs};
    use types::{ChainSpec, ForkName, MainnetEthSpec};

    type E = MainnetEthSpec;

    /// An engine double returning a canned response and counting calls.
    struct MockEngine {
        response: PlMutex<Option<Vec<Option<BlobAndProof<E>>>>>,
        calls: PlMutex<usize>,
    }

    impl MockEngine {
        fn with_response(response: Vec<Option<BlobAndProof<E>>>) -> Self {
            Self {
                response: PlMutex::new(Some(response)),
                calls: PlMutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: PlMutex::new(None),
                calls: PlMutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    impl ExecutionEngine<E> for MockEngine {
        async fn get_blobs(
            &self,
            _fork: ForkName,
            versioned_hashes: Vec<VersionedHash>,
        ) -> Result<Vec<Option<BlobAndProof<E>>>, EngineError> {
            *self.calls.lock() += 1;
            match self.response.lock().clone() {
                Some(mut response) => {
                    response.truncate(versioned_hashes.len());
                    Ok(response)
                }
                None => Err(EngineError::RequestFailed("boom".into())),
            }
        }
    }

    fn make_input(
        spec: &ChainSpec,
        num_blobs: usize,
        rng: &mut XorShiftRng,
    ) -> (Arc<BlockInput<E>>, Vec<types::BlobSidecar<E>>) {
        let (block, blobs) = generate_rand_block_and_blobs::<E>(
            ForkName::Deneb,
            NumBlobs::Number(num_blobs),
            rng,
            spec,
        );
        let input = BlockInput::new_from_block(
            BlockProps {
                block: Arc::new(block),
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(1),
                peer_id: None,
                block_bytes: None,
            },
            ForkName::Deneb,
            false,
            &CustodyContext::from_columns(hashset! {}, hashset! {}),
        );
        (input, blobs)
    }

    fn blob_and_proof(blob: &types::BlobSidecar<E>) -> BlobAndProof<E> {
        BlobAndProof {
            blob: blob.blob.clone(),
            proof: blob.kzg_proof,
        }
    }

    #[tokio::test]
    async fn engine_round_completes_missing_blobs() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (input, blobs) = make_input(&spec, 2, &mut rng);

        let engine = MockEngine::with_response(vec![
            Some(blob_and_proof(&blobs[0])),
            Some(blob_and_proof(&blobs[1])),
        ]);
        let cache = EngineBlobsCache::new();

        let residual = fetch_engine_blobs(&engine, &cache, &input, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(residual.is_empty());
        assert!(input.has_block_and_all_data());
        assert_eq!(engine.calls(), 1);
        assert_eq!(cache.len(), 2, "positive entries cached");
    }

    #[tokio::test]
    async fn partial_response_caches_negatives_and_skips_second_round() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (input, blobs) = make_input(&spec, 2, &mut rng);

        let engine = MockEngine::with_response(vec![Some(blob_and_proof(&blobs[0])), None]);
        let cache = EngineBlobsCache::new();

        let residual = fetch_engine_blobs(&engine, &cache, &input, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0].index, 1);
        assert!(input.has_blob(0));
        assert!(!input.has_blob(1));

        // A second round must not consult the engine again for this root.
        let residual = fetch_engine_blobs(&engine, &cache, &input, Duration::from_secs(6))
            .await
            .unwrap();
        assert_eq!(residual.len(), 1);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn bulk_engine_error_is_all_null() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (input, _) = make_input(&spec, 2, &mut rng);

        let engine = MockEngine::failing();
        let cache = EngineBlobsCache::new();

        let residual = fetch_engine_blobs(&engine, &cache, &input, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(residual.len(), 2);
        // Negatives cached: the next round is engine-free.
        assert_eq!(cache.len(), 2);
        assert!(cache.was_queried(&input.block_root()));
    }

    #[tokio::test]
    async fn cache_hit_avoids_engine_entirely() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (input, blobs) = make_input(&spec, 1, &mut rng);

        let cache = EngineBlobsCache::new();
        let hashes = input.versioned_hashes().unwrap();
        cache.insert(hashes[0], blob_and_proof(&blobs[0]));

        // An engine that would fail the test if called.
        let engine = MockEngine::with_response(vec![]);
        let residual = fetch_engine_blobs(&engine, &cache, &input, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(residual.is_empty());
        assert_eq!(engine.calls(), 0);
        assert!(input.has_all_data());
    }
}
