use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::FixedVector;
use ssz_types::typenum::U96;
use tree_hash::TreeHash;

/// An opaque 96-byte BLS signature container.
///
/// This subsystem never verifies signatures (gossip validation happens upstream), so the bytes
/// are carried without deserialising into a curve point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(transparent)]
#[ssz(struct_behaviour = "transparent")]
pub struct SignatureBytes(
    #[serde(with = "ssz_types::serde_utils::hex_fixed_vec")] FixedVector<u8, U96>,
);

// `tree_hash_derive` does not support `struct_behaviour = "transparent"`, so the delegating
// impl is written by hand (mirrors what the derive would generate).
impl TreeHash for SignatureBytes {
    fn tree_hash_type() -> tree_hash::TreeHashType {
        FixedVector::<u8, U96>::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
        self.0.tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        FixedVector::<u8, U96>::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> tree_hash::Hash256 {
        self.0.tree_hash_root()
    }
}

impl SignatureBytes {
    pub fn empty() -> Self {
        Self(FixedVector::default())
    }

    pub fn from_bytes(bytes: [u8; 96]) -> Self {
        Self(FixedVector::new(bytes.to_vec()).expect("96 bytes fits the fixed vector"))
    }

    pub fn as_serialized(&self) -> &[u8] {
        &self.0
    }
}

impl Default for SignatureBytes {
    fn default() -> Self {
        Self::empty()
    }
}
