use ssz_types::typenum::{U8, U15, U32, U128, U2048, U4096, U131072, Unsigned};
use std::fmt::Debug;

/// Compile-time preset parameters, selected per Ethereum network flavour.
///
/// Runtime-configurable parameters (fork epochs, per-fork blob limits, custody requirements)
/// live on `ChainSpec`.
pub trait EthSpec:
    'static + Default + Sync + Send + Clone + Debug + PartialEq + Eq + std::hash::Hash
{
    /// Maximum length of the `blob_kzg_commitments` list on a block body.
    type MaxBlobCommitmentsPerBlock: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;
    /// Byte length of a single blob.
    type BytesPerBlob: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;
    /// Byte length of a single data-column cell.
    type BytesPerCell: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;
    /// Number of columns the blob matrix is extended into.
    type NumberOfColumns: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;
    /// Depth of the merkle proof from a single blob KZG commitment to the block body root.
    type KzgCommitmentInclusionProofDepth: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;
    /// Depth of the merkle proof from the `blob_kzg_commitments` list root to the block body
    /// root (used by data-column sidecars).
    type KzgCommitmentsInclusionProofDepth: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + std::hash::Hash;

    fn slots_per_epoch() -> u64;

    fn spec_name() -> &'static str;

    fn max_blob_commitments_per_block() -> usize {
        Self::MaxBlobCommitmentsPerBlock::to_usize()
    }

    fn bytes_per_blob() -> usize {
        Self::BytesPerBlob::to_usize()
    }

    fn bytes_per_cell() -> usize {
        Self::BytesPerCell::to_usize()
    }

    fn number_of_columns() -> usize {
        Self::NumberOfColumns::to_usize()
    }

    fn kzg_commitment_inclusion_proof_depth() -> usize {
        Self::KzgCommitmentInclusionProofDepth::to_usize()
    }

    fn kzg_commitments_inclusion_proof_depth() -> usize {
        Self::KzgCommitmentsInclusionProofDepth::to_usize()
    }
}

/// Ethereum Foundation mainnet-flavoured parameters.
#[derive(Clone, PartialEq, Eq, Debug, Default, Hash)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    type MaxBlobCommitmentsPerBlock = U4096;
    type BytesPerBlob = U131072;
    type BytesPerCell = U2048;
    type NumberOfColumns = U128;
    // 12 levels for the commitments list, 1 for the length mixin, 2 for the body container.
    type KzgCommitmentInclusionProofDepth = U15;
    type KzgCommitmentsInclusionProofDepth = ssz_types::typenum::U2;

    fn slots_per_epoch() -> u64 {
        32
    }

    fn spec_name() -> &'static str {
        "mainnet"
    }
}

/// Ethereum Foundation minimal-flavoured parameters, for testing.
#[derive(Clone, PartialEq, Eq, Debug, Default, Hash)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    type MaxBlobCommitmentsPerBlock = U32;
    type BytesPerBlob = U131072;
    type BytesPerCell = U2048;
    type NumberOfColumns = U128;
    // 5 levels for the commitments list, 1 for the length mixin, 2 for the body container.
    type KzgCommitmentInclusionProofDepth = U8;
    type KzgCommitmentsInclusionProofDepth = ssz_types::typenum::U2;

    fn slots_per_epoch() -> u64 {
        8
    }

    fn spec_name() -> &'static str {
        "minimal"
    }
}
