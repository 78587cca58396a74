mod kzg_commitment;
mod kzg_proof;

pub use crate::{
    kzg_commitment::{KzgCommitment, VERSIONED_HASH_VERSION_KZG},
    kzg_proof::KzgProof,
};

pub use alloy_primitives::B256 as VersionedHash;

pub const BYTES_PER_COMMITMENT: usize = 48;
pub const BYTES_PER_PROOF: usize = 48;
pub const BYTES_PER_FIELD_ELEMENT: usize = 32;
pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;
pub const BYTES_PER_BLOB: usize = FIELD_ELEMENTS_PER_BLOB * BYTES_PER_FIELD_ELEMENT;
pub const FIELD_ELEMENTS_PER_CELL: usize = 64;
pub const BYTES_PER_CELL: usize = FIELD_ELEMENTS_PER_CELL * BYTES_PER_FIELD_ELEMENT;

/// Derive the EIP-4844 versioned hash for a KZG commitment.
pub fn kzg_commitment_to_versioned_hash(commitment: &KzgCommitment) -> VersionedHash {
    commitment.calculate_versioned_hash()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_hash_has_kzg_version_byte() {
        let commitment = KzgCommitment([0xab; BYTES_PER_COMMITMENT]);
        let hash = kzg_commitment_to_versioned_hash(&commitment);
        assert_eq!(hash.as_slice()[0], VERSIONED_HASH_VERSION_KZG);
    }

    #[test]
    fn versioned_hash_is_stable() {
        let commitment = KzgCommitment([0x11; BYTES_PER_COMMITMENT]);
        assert_eq!(
            kzg_commitment_to_versioned_hash(&commitment),
            kzg_commitment_to_versioned_hash(&commitment),
        );
    }

    #[test]
    fn versioned_hash_differs_per_commitment() {
        let a = KzgCommitment([0x01; BYTES_PER_COMMITMENT]);
        let b = KzgCommitment([0x02; BYTES_PER_COMMITMENT]);
        assert_ne!(
            kzg_commitment_to_versioned_hash(&a),
            kzg_commitment_to_versioned_hash(&b),
        );
    }
}
