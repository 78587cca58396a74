//! Deterministic generators for blocks and sidecars, shared by the workspace's tests.

use crate::beacon_block_body::{
    BeaconBlockBodyAltair, BeaconBlockBodyBase, BeaconBlockBodyBellatrix, BeaconBlockBodyCapella,
    BeaconBlockBodyDeneb, BeaconBlockBodyElectra, BeaconBlockBodyFulu,
};
use crate::{
    BeaconBlock, BeaconBlockAltair, BeaconBlockBase, BeaconBlockBellatrix, BeaconBlockCapella,
    BeaconBlockDeneb, BeaconBlockElectra, BeaconBlockFulu, Blob, BlobSidecar, Cell, ChainSpec,
    ColumnIndex, DataColumnSidecar, DataColumnSidecarList, EthSpec, ForkName, Hash256,
    KzgCommitment, KzgProof, SignatureBytes, SignedBeaconBlock, Slot,
};
use rand::{Rng, RngCore};
use ssz_types::VariableList;
use std::marker::PhantomData;
use std::sync::Arc;

pub use rand_xorshift::XorShiftRng;

#[derive(Debug, Clone, Copy)]
pub enum NumBlobs {
    None,
    Number(usize),
    Random,
}

pub fn random_hash(rng: &mut impl RngCore) -> Hash256 {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    Hash256::from(bytes)
}

fn random_signature(rng: &mut impl RngCore) -> SignatureBytes {
    let mut bytes = [0u8; 96];
    rng.fill_bytes(&mut bytes);
    SignatureBytes::from_bytes(bytes)
}

fn random_commitments<E: EthSpec>(
    rng: &mut impl RngCore,
    count: usize,
) -> VariableList<KzgCommitment, E::MaxBlobCommitmentsPerBlock> {
    let commitments = (0..count)
        .map(|_| {
            let mut bytes = [0u8; 48];
            rng.fill_bytes(&mut bytes);
            KzgCommitment(bytes)
        })
        .collect::<Vec<_>>();
    VariableList::new(commitments).expect("count is bounded by the caller")
}

fn num_blobs_to_count(num_blobs: NumBlobs, max: usize, rng: &mut impl Rng) -> usize {
    match num_blobs {
        NumBlobs::None => 0,
        NumBlobs::Number(n) => n,
        NumBlobs::Random => rng.random_range(1..=max),
    }
}

/// A random slot inside the first epoch of `fork_name` under `spec`.
fn random_slot_at_fork<E: EthSpec>(
    fork_name: ForkName,
    rng: &mut impl Rng,
    spec: &ChainSpec,
) -> Slot {
    let fork_start = spec
        .fork_epoch(fork_name)
        .unwrap_or_default()
        .start_slot(E::slots_per_epoch());
    fork_start + rng.random_range(0..E::slots_per_epoch())
}

/// Generate a random block of the given fork plus its blob sidecars.
pub fn generate_rand_block_and_blobs<E: EthSpec>(
    fork_name: ForkName,
    num_blobs: NumBlobs,
    rng: &mut impl Rng,
    spec: &ChainSpec,
) -> (SignedBeaconBlock<E>, Vec<BlobSidecar<E>>) {
    let slot = random_slot_at_fork::<E>(fork_name, rng, spec);
    rand_block_with_blobs(fork_name, num_blobs, slot, random_hash(rng), rng, spec)
}

/// Generate a random block at an explicit slot with an explicit parent, plus its blob sidecars.
pub fn rand_block_with_blobs<E: EthSpec>(
    fork_name: ForkName,
    num_blobs: NumBlobs,
    slot: Slot,
    parent_root: Hash256,
    rng: &mut impl Rng,
    spec: &ChainSpec,
) -> (SignedBeaconBlock<E>, Vec<BlobSidecar<E>>) {
    let max_blobs = spec.max_blobs_per_block(slot.epoch(E::slots_per_epoch())) as usize;
    let count = if fork_name.deneb_enabled() {
        num_blobs_to_count(num_blobs, max_blobs, rng)
    } else {
        0
    };

    let block = rand_signed_block::<E>(fork_name, slot, parent_root, count, rng);

    let signed_block_header = block.signed_block_header();
    let mut blob_sidecars = vec![];
    for index in 0..count {
        let mut blob_bytes = vec![0u8; E::bytes_per_blob()];
        rng.fill_bytes(&mut blob_bytes);
        let blob = Blob::<E>::new(blob_bytes).expect("blob bytes match the fixed length");
        let sidecar = BlobSidecar::new_with_existing_proof(
            index,
            blob,
            &block,
            signed_block_header.clone(),
            KzgProof::empty(),
        )
        .expect("commitment exists at index");
        blob_sidecars.push(sidecar);
    }

    (block, blob_sidecars)
}

/// Generate a random Fulu-era block plus a full set of data-column sidecars.
pub fn generate_rand_block_and_data_columns<E: EthSpec>(
    fork_name: ForkName,
    num_blobs: NumBlobs,
    rng: &mut impl Rng,
    spec: &ChainSpec,
) -> (Arc<SignedBeaconBlock<E>>, DataColumnSidecarList<E>) {
    let slot = random_slot_at_fork::<E>(fork_name, rng, spec);
    rand_block_with_data_columns(fork_name, num_blobs, slot, random_hash(rng), rng, spec)
}

/// Generate a random block at an explicit slot plus a full set of data-column sidecars.
pub fn rand_block_with_data_columns<E: EthSpec>(
    fork_name: ForkName,
    num_blobs: NumBlobs,
    slot: Slot,
    parent_root: Hash256,
    rng: &mut impl Rng,
    spec: &ChainSpec,
) -> (Arc<SignedBeaconBlock<E>>, DataColumnSidecarList<E>) {
    assert!(
        fork_name.fulu_enabled(),
        "data columns only exist from Fulu onwards"
    );
    let max_blobs = spec.max_blobs_per_block(slot.epoch(E::slots_per_epoch())) as usize;
    let count = num_blobs_to_count(num_blobs, max_blobs, rng);

    let block = rand_signed_block::<E>(fork_name, slot, parent_root, count, rng);
    let columns = build_data_columns(&block, rng);
    (Arc::new(block), columns)
}

/// Build the full column set for an existing block.
pub fn build_data_columns<E: EthSpec>(
    block: &SignedBeaconBlock<E>,
    rng: &mut impl RngCore,
) -> DataColumnSidecarList<E> {
    let body = block.message().body();
    let kzg_commitments = body
        .blob_kzg_commitments()
        .expect("block is post-Deneb")
        .clone();
    let kzg_commitments_inclusion_proof = body
        .kzg_commitments_merkle_proof()
        .expect("block is post-Deneb");
    let signed_block_header = block.signed_block_header();
    let num_blobs = kzg_commitments.len();

    (0..E::number_of_columns() as ColumnIndex)
        .map(|index| {
            let cells = (0..num_blobs)
                .map(|_| {
                    let mut cell_bytes = vec![0u8; E::bytes_per_cell()];
                    rng.fill_bytes(&mut cell_bytes);
                    Cell::<E>::new(cell_bytes).expect("cell bytes match the fixed length")
                })
                .collect::<Vec<_>>();
            Arc::new(DataColumnSidecar {
                index,
                column: VariableList::new(cells).expect("cells bounded by max commitments"),
                kzg_commitments: kzg_commitments.clone(),
                kzg_proofs: VariableList::new(vec![KzgProof::empty(); num_blobs])
                    .expect("proofs bounded by max commitments"),
                signed_block_header: signed_block_header.clone(),
                kzg_commitments_inclusion_proof: kzg_commitments_inclusion_proof.clone(),
            })
        })
        .collect()
}

fn rand_signed_block<E: EthSpec>(
    fork_name: ForkName,
    slot: Slot,
    parent_root: Hash256,
    num_commitments: usize,
    rng: &mut impl Rng,
) -> SignedBeaconBlock<E> {
    let state_root = random_hash(rng);
    let proposer_index = rng.random_range(0..1_000_000u64);
    let randao_reveal = random_signature(rng);
    let graffiti = random_hash(rng);

    let block = match fork_name {
        ForkName::Base => BeaconBlock::Base(BeaconBlockBase {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyBase {
                randao_reveal,
                graffiti,
                _phantom: PhantomData,
            },
        }),
        ForkName::Altair => BeaconBlock::Altair(BeaconBlockAltair {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyAltair {
                randao_reveal,
                graffiti,
                _phantom: PhantomData,
            },
        }),
        ForkName::Bellatrix => BeaconBlock::Bellatrix(BeaconBlockBellatrix {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyBellatrix {
                randao_reveal,
                graffiti,
                _phantom: PhantomData,
            },
        }),
        ForkName::Capella => BeaconBlock::Capella(BeaconBlockCapella {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyCapella {
                randao_reveal,
                graffiti,
                _phantom: PhantomData,
            },
        }),
        ForkName::Deneb => BeaconBlock::Deneb(BeaconBlockDeneb {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyDeneb {
                randao_reveal,
                graffiti,
                blob_kzg_commitments: random_commitments::<E>(rng, num_commitments),
            },
        }),
        ForkName::Electra => BeaconBlock::Electra(BeaconBlockElectra {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyElectra {
                randao_reveal,
                graffiti,
                blob_kzg_commitments: random_commitments::<E>(rng, num_commitments),
            },
        }),
        ForkName::Fulu => BeaconBlock::Fulu(BeaconBlockFulu {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body: BeaconBlockBodyFulu {
                randao_reveal,
                graffiti,
                blob_kzg_commitments: random_commitments::<E>(rng, num_commitments),
            },
        }),
    };

    SignedBeaconBlock::from_block(block, random_signature(rng))
}
