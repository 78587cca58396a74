use crate::beacon_block_body::{
    BeaconBlockBodyAltair, BeaconBlockBodyBase, BeaconBlockBodyBellatrix, BeaconBlockBodyCapella,
    BeaconBlockBodyDeneb, BeaconBlockBodyElectra, BeaconBlockBodyFulu, BeaconBlockBodyRef,
};
use crate::{
    BeaconBlockHeader, ChainSpec, Epoch, Error, EthSpec, ForkName, Hash256, InconsistentFork,
    SignatureBytes, SignedBeaconBlockHeader, Slot,
};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz::Decode;
use ssz_derive::{Decode, Encode};
use superstruct::superstruct;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// A block of the `BeaconChain`, trimmed to its identity fields.
#[superstruct(
    variants(Base, Altair, Bellatrix, Capella, Deneb, Electra, Fulu),
    variant_attributes(
        derive(
            Debug,
            Clone,
            Serialize,
            Deserialize,
            Encode,
            Decode,
            TreeHash,
            Derivative,
            Default,
        ),
        derivative(PartialEq, Hash(bound = "E: EthSpec")),
        serde(bound = "E: EthSpec", deny_unknown_fields),
    ),
    ref_attributes(
        derive(Debug, TreeHash),
        tree_hash(enum_behaviour = "transparent")
    ),
    cast_error(ty = "Error", expr = "Error::IncorrectForkVariant"),
    partial_getter_error(ty = "Error", expr = "Error::IncorrectForkVariant")
)]
#[derive(Debug, Clone, Serialize, Encode, TreeHash, Derivative)]
#[derivative(PartialEq, Hash(bound = "E: EthSpec"))]
#[serde(untagged)]
#[serde(bound = "E: EthSpec")]
#[ssz(enum_behaviour = "transparent")]
#[tree_hash(enum_behaviour = "transparent")]
pub struct BeaconBlock<E: EthSpec> {
    #[superstruct(getter(copy))]
    pub slot: Slot,
    #[superstruct(getter(copy))]
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    #[superstruct(getter(copy))]
    pub parent_root: Hash256,
    #[superstruct(getter(copy))]
    pub state_root: Hash256,
    #[superstruct(only(Base), partial_getter(rename = "body_base"))]
    pub body: BeaconBlockBodyBase<E>,
    #[superstruct(only(Altair), partial_getter(rename = "body_altair"))]
    pub body: BeaconBlockBodyAltair<E>,
    #[superstruct(only(Bellatrix), partial_getter(rename = "body_bellatrix"))]
    pub body: BeaconBlockBodyBellatrix<E>,
    #[superstruct(only(Capella), partial_getter(rename = "body_capella"))]
    pub body: BeaconBlockBodyCapella<E>,
    #[superstruct(only(Deneb), partial_getter(rename = "body_deneb"))]
    pub body: BeaconBlockBodyDeneb<E>,
    #[superstruct(only(Electra), partial_getter(rename = "body_electra"))]
    pub body: BeaconBlockBodyElectra<E>,
    #[superstruct(only(Fulu), partial_getter(rename = "body_fulu"))]
    pub body: BeaconBlockBodyFulu<E>,
}

impl<E: EthSpec> BeaconBlock<E> {
    /// Returns an empty block at genesis slot for the given fork, for testing.
    pub fn empty(fork_name: ForkName) -> Self {
        match fork_name {
            ForkName::Base => BeaconBlock::Base(BeaconBlockBase::default()),
            ForkName::Altair => BeaconBlock::Altair(BeaconBlockAltair::default()),
            ForkName::Bellatrix => BeaconBlock::Bellatrix(BeaconBlockBellatrix::default()),
            ForkName::Capella => BeaconBlock::Capella(BeaconBlockCapella::default()),
            ForkName::Deneb => BeaconBlock::Deneb(BeaconBlockDeneb::default()),
            ForkName::Electra => BeaconBlock::Electra(BeaconBlockElectra::default()),
            ForkName::Fulu => BeaconBlock::Fulu(BeaconBlockFulu::default()),
        }
    }

    /// SSZ decode with an explicit fork variant.
    pub fn from_ssz_bytes_by_fork(
        bytes: &[u8],
        fork_name: ForkName,
    ) -> Result<Self, ssz::DecodeError> {
        match fork_name {
            ForkName::Base => BeaconBlockBase::from_ssz_bytes(bytes).map(Self::Base),
            ForkName::Altair => BeaconBlockAltair::from_ssz_bytes(bytes).map(Self::Altair),
            ForkName::Bellatrix => {
                BeaconBlockBellatrix::from_ssz_bytes(bytes).map(Self::Bellatrix)
            }
            ForkName::Capella => BeaconBlockCapella::from_ssz_bytes(bytes).map(Self::Capella),
            ForkName::Deneb => BeaconBlockDeneb::from_ssz_bytes(bytes).map(Self::Deneb),
            ForkName::Electra => BeaconBlockElectra::from_ssz_bytes(bytes).map(Self::Electra),
            ForkName::Fulu => BeaconBlockFulu::from_ssz_bytes(bytes).map(Self::Fulu),
        }
    }

    pub fn body(&self) -> BeaconBlockBodyRef<'_, E> {
        match self {
            BeaconBlock::Base(block) => BeaconBlockBodyRef::Base(&block.body),
            BeaconBlock::Altair(block) => BeaconBlockBodyRef::Altair(&block.body),
            BeaconBlock::Bellatrix(block) => BeaconBlockBodyRef::Bellatrix(&block.body),
            BeaconBlock::Capella(block) => BeaconBlockBodyRef::Capella(&block.body),
            BeaconBlock::Deneb(block) => BeaconBlockBodyRef::Deneb(&block.body),
            BeaconBlock::Electra(block) => BeaconBlockBodyRef::Electra(&block.body),
            BeaconBlock::Fulu(block) => BeaconBlockBodyRef::Fulu(&block.body),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    /// The canonical root of the block: the tree hash root of its message.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }

    /// The fork implied by this block's variant, regardless of its slot.
    pub fn fork_name_unchecked(&self) -> ForkName {
        match self {
            BeaconBlock::Base(_) => ForkName::Base,
            BeaconBlock::Altair(_) => ForkName::Altair,
            BeaconBlock::Bellatrix(_) => ForkName::Bellatrix,
            BeaconBlock::Capella(_) => ForkName::Capella,
            BeaconBlock::Deneb(_) => ForkName::Deneb,
            BeaconBlock::Electra(_) => ForkName::Electra,
            BeaconBlock::Fulu(_) => ForkName::Fulu,
        }
    }

    /// Returns the header corresponding to this block.
    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body().tree_hash_root(),
        }
    }
}

impl<'a, E: EthSpec> BeaconBlockRef<'a, E> {
    pub fn body(&self) -> BeaconBlockBodyRef<'a, E> {
        match self {
            BeaconBlockRef::Base(block) => BeaconBlockBodyRef::Base(&block.body),
            BeaconBlockRef::Altair(block) => BeaconBlockBodyRef::Altair(&block.body),
            BeaconBlockRef::Bellatrix(block) => BeaconBlockBodyRef::Bellatrix(&block.body),
            BeaconBlockRef::Capella(block) => BeaconBlockBodyRef::Capella(&block.body),
            BeaconBlockRef::Deneb(block) => BeaconBlockBodyRef::Deneb(&block.body),
            BeaconBlockRef::Electra(block) => BeaconBlockBodyRef::Electra(&block.body),
            BeaconBlockRef::Fulu(block) => BeaconBlockBodyRef::Fulu(&block.body),
        }
    }
}

/// A `BeaconBlock` and a signature from its proposer.
///
/// The signature is carried opaquely; it was verified by the gossip layer before this
/// subsystem sees the block.
#[superstruct(
    variants(Base, Altair, Bellatrix, Capella, Deneb, Electra, Fulu),
    variant_attributes(
        derive(
            Debug,
            Clone,
            Serialize,
            Deserialize,
            Encode,
            Decode,
            TreeHash,
            Derivative,
            Default,
        ),
        derivative(PartialEq, Hash(bound = "E: EthSpec")),
        serde(bound = "E: EthSpec", deny_unknown_fields),
    ),
    ref_attributes(derive(Debug)),
    cast_error(ty = "Error", expr = "Error::IncorrectForkVariant"),
    partial_getter_error(ty = "Error", expr = "Error::IncorrectForkVariant")
)]
#[derive(Debug, Clone, Serialize, Encode, TreeHash, Derivative)]
#[derivative(PartialEq, Hash(bound = "E: EthSpec"))]
#[serde(untagged)]
#[serde(bound = "E: EthSpec")]
#[ssz(enum_behaviour = "transparent")]
#[tree_hash(enum_behaviour = "transparent")]
pub struct SignedBeaconBlock<E: EthSpec> {
    #[superstruct(only(Base), partial_getter(rename = "message_base"))]
    pub message: BeaconBlockBase<E>,
    #[superstruct(only(Altair), partial_getter(rename = "message_altair"))]
    pub message: BeaconBlockAltair<E>,
    #[superstruct(only(Bellatrix), partial_getter(rename = "message_bellatrix"))]
    pub message: BeaconBlockBellatrix<E>,
    #[superstruct(only(Capella), partial_getter(rename = "message_capella"))]
    pub message: BeaconBlockCapella<E>,
    #[superstruct(only(Deneb), partial_getter(rename = "message_deneb"))]
    pub message: BeaconBlockDeneb<E>,
    #[superstruct(only(Electra), partial_getter(rename = "message_electra"))]
    pub message: BeaconBlockElectra<E>,
    #[superstruct(only(Fulu), partial_getter(rename = "message_fulu"))]
    pub message: BeaconBlockFulu<E>,
    pub signature: SignatureBytes,
}

impl<E: EthSpec> SignedBeaconBlock<E> {
    /// Create a new `SignedBeaconBlock` from a block and signature of the matching fork.
    pub fn from_block(block: BeaconBlock<E>, signature: SignatureBytes) -> Self {
        match block {
            BeaconBlock::Base(message) => {
                SignedBeaconBlock::Base(SignedBeaconBlockBase { message, signature })
            }
            BeaconBlock::Altair(message) => {
                SignedBeaconBlock::Altair(SignedBeaconBlockAltair { message, signature })
            }
            BeaconBlock::Bellatrix(message) => {
                SignedBeaconBlock::Bellatrix(SignedBeaconBlockBellatrix { message, signature })
            }
            BeaconBlock::Capella(message) => {
                SignedBeaconBlock::Capella(SignedBeaconBlockCapella { message, signature })
            }
            BeaconBlock::Deneb(message) => {
                SignedBeaconBlock::Deneb(SignedBeaconBlockDeneb { message, signature })
            }
            BeaconBlock::Electra(message) => {
                SignedBeaconBlock::Electra(SignedBeaconBlockElectra { message, signature })
            }
            BeaconBlock::Fulu(message) => {
                SignedBeaconBlock::Fulu(SignedBeaconBlockFulu { message, signature })
            }
        }
    }

    /// SSZ decode with an explicit fork variant.
    pub fn from_ssz_bytes_by_fork(
        bytes: &[u8],
        fork_name: ForkName,
    ) -> Result<Self, ssz::DecodeError> {
        match fork_name {
            ForkName::Base => SignedBeaconBlockBase::from_ssz_bytes(bytes).map(Self::Base),
            ForkName::Altair => SignedBeaconBlockAltair::from_ssz_bytes(bytes).map(Self::Altair),
            ForkName::Bellatrix => {
                SignedBeaconBlockBellatrix::from_ssz_bytes(bytes).map(Self::Bellatrix)
            }
            ForkName::Capella => SignedBeaconBlockCapella::from_ssz_bytes(bytes).map(Self::Capella),
            ForkName::Deneb => SignedBeaconBlockDeneb::from_ssz_bytes(bytes).map(Self::Deneb),
            ForkName::Electra => SignedBeaconBlockElectra::from_ssz_bytes(bytes).map(Self::Electra),
            ForkName::Fulu => SignedBeaconBlockFulu::from_ssz_bytes(bytes).map(Self::Fulu),
        }
    }

    pub fn message(&self) -> BeaconBlockRef<'_, E> {
        match self {
            SignedBeaconBlock::Base(block) => BeaconBlockRef::Base(&block.message),
            SignedBeaconBlock::Altair(block) => BeaconBlockRef::Altair(&block.message),
            SignedBeaconBlock::Bellatrix(block) => BeaconBlockRef::Bellatrix(&block.message),
            SignedBeaconBlock::Capella(block) => BeaconBlockRef::Capella(&block.message),
            SignedBeaconBlock::Deneb(block) => BeaconBlockRef::Deneb(&block.message),
            SignedBeaconBlock::Electra(block) => BeaconBlockRef::Electra(&block.message),
            SignedBeaconBlock::Fulu(block) => BeaconBlockRef::Fulu(&block.message),
        }
    }

    pub fn slot(&self) -> Slot {
        self.message().slot()
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    pub fn parent_root(&self) -> Hash256 {
        self.message().parent_root()
    }

    pub fn state_root(&self) -> Hash256 {
        self.message().state_root()
    }

    pub fn proposer_index(&self) -> u64 {
        self.message().proposer_index()
    }

    /// The canonical root of the block message.
    pub fn canonical_root(&self) -> Hash256 {
        self.message().tree_hash_root()
    }

    /// The number of blobs this block commits to. Zero for pre-Deneb blocks.
    pub fn num_expected_blobs(&self) -> usize {
        self.message()
            .body()
            .blob_kzg_commitments()
            .map(|commitments| commitments.len())
            .unwrap_or(0)
    }

    pub fn fork_name_unchecked(&self) -> ForkName {
        match self {
            SignedBeaconBlock::Base(_) => ForkName::Base,
            SignedBeaconBlock::Altair(_) => ForkName::Altair,
            SignedBeaconBlock::Bellatrix(_) => ForkName::Bellatrix,
            SignedBeaconBlock::Capella(_) => ForkName::Capella,
            SignedBeaconBlock::Deneb(_) => ForkName::Deneb,
            SignedBeaconBlock::Electra(_) => ForkName::Electra,
            SignedBeaconBlock::Fulu(_) => ForkName::Fulu,
        }
    }

    /// The fork of this block, checked against the fork schedule at its slot.
    pub fn fork_name(&self, spec: &ChainSpec) -> Result<ForkName, InconsistentFork> {
        let fork_at_slot = spec.fork_name_at_slot::<E>(self.slot());
        let object_fork = self.fork_name_unchecked();

        if fork_at_slot == object_fork {
            Ok(object_fork)
        } else {
            Err(InconsistentFork {
                fork_at_slot,
                object_fork,
            })
        }
    }

    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.message().body().tree_hash_root(),
        }
    }

    pub fn signed_block_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self.block_header(),
            signature: self.signature().clone(),
        }
    }
}
