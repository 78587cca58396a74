use crate::beacon_block_body::{BLOB_KZG_COMMITMENTS_INDEX, KzgCommitments, KzgProofs};
use crate::{Epoch, EthSpec, Hash256, SignedBeaconBlockHeader, Slot};
use derivative::Derivative;
use merkle_proof::verify_merkle_proof;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, VariableList};
use std::sync::Arc;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type ColumnIndex = u64;
pub type Cell<E> = FixedVector<u8, <E as EthSpec>::BytesPerCell>;
pub type DataColumn<E> = VariableList<Cell<E>, <E as EthSpec>::MaxBlobCommitmentsPerBlock>;

/// Identifies a set of data columns associated with a specific beacon block.
#[derive(Encode, Decode, Clone, Debug, PartialEq, TreeHash, Serialize, Deserialize)]
#[serde(bound = "E: EthSpec")]
pub struct DataColumnsByRootIdentifier<E: EthSpec> {
    pub block_root: Hash256,
    pub columns: VariableList<ColumnIndex, E::NumberOfColumns>,
}

pub type DataColumnSidecarList<E> = Vec<Arc<DataColumnSidecar<E>>>;

/// A vertical slice of the blob matrix for one column index, carrying the full commitment
/// vector of its block.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative)]
#[serde(bound = "E: EthSpec", deny_unknown_fields)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
pub struct DataColumnSidecar<E: EthSpec> {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: ColumnIndex,
    #[serde(with = "ssz_types::serde_utils::list_of_hex_fixed_vec")]
    pub column: DataColumn<E>,
    /// All the KZG commitments associated with the block, used for verifying sample cells.
    pub kzg_commitments: KzgCommitments<E>,
    pub kzg_proofs: KzgProofs<E>,
    pub signed_block_header: SignedBeaconBlockHeader,
    /// An inclusion proof, proving the inclusion of `blob_kzg_commitments` in `BeaconBlockBody`.
    pub kzg_commitments_inclusion_proof: FixedVector<Hash256, E::KzgCommitmentsInclusionProofDepth>,
}

impl<E: EthSpec> DataColumnSidecar<E> {
    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
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
    pub fn verify_inclusion_proof(&self) -> bool {
        let blob_kzg_commitments_root = self.kzg_commitments.tree_hash_root();
        verify_merkle_proof(
            blob_kzg_commitments_root,
            &self.kzg_commitments_inclusion_proof,
            E::kzg_commitments_inclusion_proof_depth(),
            BLOB_KZG_COMMITMENTS_INDEX,
            self.signed_block_header.message.body_root,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{NumBlobs, generate_rand_block_and_data_columns};
    use crate::{ChainSpec, ForkName, MainnetEthSpec};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    type E = MainnetEthSpec;

    #[test]
    fn generated_columns_match_block() {
        let spec = ForkName::Fulu.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (block, columns) = generate_rand_block_and_data_columns::<E>(
            ForkName::Fulu,
            NumBlobs::Number(2),
            &mut rng,
            &spec,
        );

        assert_eq!(columns.len(), E::number_of_columns());
        let block_root = block.canonical_root();
        for (i, column) in columns.iter().enumerate() {
            assert_eq!(column.index, i as u64);
            assert_eq!(column.block_root(), block_root);
            assert_eq!(column.column.len(), 2);
            assert!(column.verify_inclusion_proof());
        }
    }
}
