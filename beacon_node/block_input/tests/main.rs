//! End-to-end flows through the seen cache, the availability gate and the persistence sink.

use block_input::{
    AvailabilityStatus, BlockProps, BlockSource, CustodyContext, MemoryStore, SeenBlockInputCache,
    SidecarProps, persist_block_inputs, verify_blocks_data_availability,
};
use maplit::hashset;
use rand::SeedableRng;
use slot_clock::{ManualSlotClock, SlotClock};
use std::sync::Arc;
use std::time::Duration;
use types::test_utils::{
    NumBlobs, XorShiftRng, generate_rand_block_and_data_columns, rand_block_with_blobs,
};
use types::{ChainSpec, EthSpec, ForkName, Hash256, MainnetEthSpec, SignedBeaconBlock, Slot};

type E = MainnetEthSpec;

struct Harness {
    seen_cache: Arc<SeenBlockInputCache<E, ManualSlotClock>>,
    store: MemoryStore<E>,
    clock: ManualSlotClock,
    spec: ChainSpec,
    rng: XorShiftRng,
}

impl Harness {
    fn new(fork: ForkName) -> Self {
        let spec = fork.make_genesis_spec(ChainSpec::mainnet());
        let clock = ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            spec.slot_duration(),
        );
        let custody = CustodyContext::from_columns(hashset! {0, 1, 2, 3}, hashset! {0, 1});
        let seen_cache = Arc::new(SeenBlockInputCache::new(
            custody,
            clock.clone(),
            Arc::new(spec.clone()),
        ));
        Self {
            seen_cache,
            store: MemoryStore::new(),
            clock,
            spec,
            rng: XorShiftRng::from_seed([42; 16]),
        }
    }

    fn block_props(&self, block: Arc<SignedBeaconBlock<E>>, seen: u64) -> BlockProps<E> {
        BlockProps {
            block,
            source: BlockSource::Gossip,
            seen_timestamp: Duration::from_secs(seen),
            peer_id: None,
            block_bytes: None,
        }
    }
}

/// A two-block chain arrives with its pieces interleaved across gossip orderings; the gate
/// opens once both inputs complete, and the sink persists and prunes both.
#[tokio::test]
async fn interleaved_gossip_flow_gates_and_persists() {
    let mut harness = Harness::new(ForkName::Deneb);
    harness.clock.set_slot(2);

    let (block_a, blobs_a) = rand_block_with_blobs::<E>(
        ForkName::Deneb,
        NumBlobs::Number(2),
        Slot::new(1),
        Hash256::repeat_byte(0x01),
        &mut harness.rng,
        &harness.spec,
    );
    let block_a = Arc::new(block_a);
    let root_a = block_a.canonical_root();
    let (block_b, blobs_b) = rand_block_with_blobs::<E>(
        ForkName::Deneb,
        NumBlobs::Number(1),
        Slot::new(2),
        root_a,
        &mut harness.rng,
        &harness.spec,
    );
    let block_b = Arc::new(block_b);
    let root_b = block_b.canonical_root();

    // Block A: block first, then blobs. Block B: blob first, then block.
    let input_a = harness
        .seen_cache
        .get_by_block(harness.block_props(block_a, 10))
        .unwrap();
    let input_b = harness
        .seen_cache
        .get_by_blob(SidecarProps {
            sidecar: Arc::new(blobs_b[0].clone()),
            source: BlockSource::Gossip,
            seen_timestamp: Duration::from_secs(11),
            peer_id: None,
        })
        .unwrap();

    // The gate subscribes before the inputs complete.
    let (_signal, exit) = exit_future::signal();
    let gate = {
        let inputs = vec![input_a.clone(), input_b.clone()];
        let exit = exit.clone();
        tokio::spawn(
            async move { verify_blocks_data_availability(&inputs, exit).await },
        )
    };

    for blob in &blobs_a {
        harness
            .seen_cache
            .get_by_blob(SidecarProps {
                sidecar: Arc::new(blob.clone()),
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(12),
                peer_id: None,
            })
            .unwrap();
    }
    harness
        .seen_cache
        .get_by_block(harness.block_props(block_b, 14))
        .unwrap();

    let outcome = gate.await.unwrap().unwrap();
    assert_eq!(
        outcome.statuses,
        vec![AvailabilityStatus::Available, AvailabilityStatus::Available]
    );
    assert_eq!(outcome.available_time, Duration::from_secs(14));

    persist_block_inputs(&harness.store, &harness.seen_cache, &[input_a, input_b]).unwrap();
    assert!(harness.store.get_block_bytes(&root_a).is_some());
    assert_eq!(harness.store.get_blob_sidecars(&root_a).unwrap().len(), 2);
    assert_eq!(harness.store.get_blob_sidecars(&root_b).unwrap().len(), 1);
    assert!(harness.seen_cache.is_empty(), "imported inputs are pruned");
}

/// Post-Fulu: the gate opens on the sampled set and the sink stores only the custody subset.
#[tokio::test]
async fn column_flow_persists_custody_subset() {
    let mut harness = Harness::new(ForkName::Fulu);
    harness.clock.set_slot(1);

    let (block, columns) = generate_rand_block_and_data_columns::<E>(
        ForkName::Fulu,
        NumBlobs::Number(2),
        &mut harness.rng,
        &harness.spec,
    );
    let block_root = block.canonical_root();

    let input = harness
        .seen_cache
        .get_by_block(harness.block_props(block, 5))
        .unwrap();
    // Sampled set is {0, 1, 2, 3}; deliver it out of order, plus a non-sampled extra.
    for index in [3u64, 0, 7, 2, 1] {
        harness
            .seen_cache
            .get_by_column(SidecarProps {
                sidecar: columns[index as usize].clone(),
                source: BlockSource::Gossip,
                seen_timestamp: Duration::from_secs(6),
                peer_id: None,
            })
            .unwrap();
    }
    assert!(input.has_block_and_all_data());

    let (_signal, exit) = exit_future::signal();
    let outcome = verify_blocks_data_availability(&[input.clone()], exit)
        .await
        .unwrap();
    assert_eq!(outcome.statuses, vec![AvailabilityStatus::Available]);

    persist_block_inputs(&harness.store, &harness.seen_cache, &[input]).unwrap();
    let persisted = harness.store.get_data_columns(&block_root).unwrap();
    assert_eq!(persisted.len(), 2, "only the custody subset is stored");
    assert!(persisted.iter().all(|column| column.index < 2));
}

/// Blocks behind the retention window gate through as out-of-range without any sidecars.
#[tokio::test]
async fn out_of_range_blocks_skip_the_data_wait() {
    let mut harness = Harness::new(ForkName::Deneb);
    harness.spec.min_epochs_for_blob_sidecars_requests = 2;
    // Rebuild the cache against the tightened window.
    harness.seen_cache = Arc::new(SeenBlockInputCache::new(
        CustodyContext::from_columns(hashset! {0}, hashset! {0}),
        harness.clock.clone(),
        Arc::new(harness.spec.clone()),
    ));
    harness.clock.set_slot(6 * E::slots_per_epoch());

    let (block, _) = rand_block_with_blobs::<E>(
        ForkName::Deneb,
        NumBlobs::Number(3),
        Slot::new(1),
        Hash256::repeat_byte(0x09),
        &mut harness.rng,
        &harness.spec,
    );
    let input = harness
        .seen_cache
        .get_by_block(harness.block_props(Arc::new(block), 900))
        .unwrap();
    assert!(input.da_out_of_range());

    let (_signal, exit) = exit_future::signal();
    let outcome = verify_blocks_data_availability(&[input], exit)
        .await
        .unwrap();
    assert_eq!(outcome.statuses, vec![AvailabilityStatus::OutOfRange]);
}
