use crate::beacon_block_body::BLOB_KZG_COMMITMENTS_INDEX;
use crate::{Error, EthSpec, Hash256, SignedBeaconBlock, SignedBeaconBlockHeader, Slot};
use derivative::Derivative;
use kzg::{KzgCommitment, KzgProof};
use merkle_proof::{merkle_root_from_branch, verify_merkle_proof};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::FixedVector;
use std::sync::Arc;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type Blob<E> = FixedVector<u8, <E as EthSpec>::BytesPerBlob>;

/// Container of the data that identifies an individual blob.
#[derive(
    Serialize, Deserialize, Encode, Decode, TreeHash, Copy, Clone, Debug, PartialEq, Eq, Hash,
)]
pub struct BlobIdentifier {
    pub block_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
}

impl PartialOrd for BlobIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative)]
#[serde(bound = "E: EthSpec")]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
pub struct BlobSidecar<E: EthSpec> {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "ssz_types::serde_utils::hex_fixed_vec")]
    pub blob: Blob<E>,
    pub kzg_commitment: KzgCommitment,
    pub kzg_proof: KzgProof,
    pub signed_block_header: SignedBeaconBlockHeader,
    pub kzg_commitment_inclusion_proof: FixedVector<Hash256, E::KzgCommitmentInclusionProofDepth>,
}

impl<E: EthSpec> PartialOrd for BlobSidecar<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: EthSpec> Ord for BlobSidecar<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

#[derive(Debug)]
pub enum BlobSidecarError {
    /// The carrying block predates blob commitments.
    PreDeneb,
    /// The block does not commit to a blob at this index.
    MissingKzgCommitment,
    /// The inclusion proof could not be produced from the block body.
    InclusionProof(Error),
}

impl<E: EthSpec> BlobSidecar<E> {
    /// Build the sidecar for `blob` at `index`, deriving everything else from the carrying
    /// block. The proof is taken as supplied (e.g. from the execution engine).
    pub fn new_with_existing_proof(
        index: usize,
        blob: Blob<E>,
        block: &SignedBeaconBlock<E>,
        signed_block_header: SignedBeaconBlockHeader,
        kzg_proof: KzgProof,
    ) -> Result<Self, BlobSidecarError> {
        let body = block.message().body();
        let kzg_commitment = *body
            .blob_kzg_commitments()
            .map_err(|_| BlobSidecarError::PreDeneb)?
            .get(index)
            .ok_or(BlobSidecarError::MissingKzgCommitment)?;
        let kzg_commitment_inclusion_proof = body
            .kzg_commitment_merkle_proof(index)
            .map_err(BlobSidecarError::InclusionProof)?;

        Ok(Self {
            index: index as u64,
            blob,
            kzg_commitment,
            kzg_proof,
            signed_block_header,
            kzg_commitment_inclusion_proof,
        })
    }

    pub fn id(&self) -> BlobIdentifier {
        BlobIdentifier {
            block_root: self.block_root(),
            index: self.index,
        }
    }

    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    pub fn block_root(&self) -> Hash256 {
        self.signed_block_header.message.tree_hash_root()
    }

    pub fn block_parent_root(&self) -> Hash256 {
        self.signed_block_header.message.parent_root
    }

    pub fn block_proposer_index(&self) -> u64 {
        self.signed_block_header.message.proposer_index
    }

    /// Verifies the kzg commitment inclusion merkle proof.
    pub fn verify_blob_sidecar_inclusion_proof(&self) -> bool {
        // Depth of the subtree rooted at `blob_kzg_commitments` in the `BeaconBlockBody`:
        // the list tree plus one level for the length mixin.
        let kzg_commitments_tree_depth =
            E::max_blob_commitments_per_block().ilog2() as usize + 1;
        // Compute the root of the `blob_kzg_commitments` subtree using the first section of
        // the branch.
        let blob_kzg_commitments_root = merkle_root_from_branch(
            self.kzg_commitment.tree_hash_root(),
            &self.kzg_commitment_inclusion_proof[0..kzg_commitments_tree_depth],
            kzg_commitments_tree_depth,
            self.index as usize,
        );
        // The remaining branches prove the subtree against the body root.
        verify_merkle_proof(
            blob_kzg_commitments_root,
            &self.kzg_commitment_inclusion_proof
                [kzg_commitments_tree_depth..E::kzg_commitment_inclusion_proof_depth()],
            E::kzg_commitment_inclusion_proof_depth() - kzg_commitments_tree_depth,
            BLOB_KZG_COMMITMENTS_INDEX,
            self.signed_block_header.message.body_root,
        )
    }
}

pub type BlobSidecarList<E> = Vec<Arc<BlobSidecar<E>>>;
pub type FixedBlobSidecarList<E> = Vec<Option<Arc<BlobSidecar<E>>>>;
