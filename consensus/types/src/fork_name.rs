use crate::{ChainSpec, Epoch};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The name of a hard fork, in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub enum ForkName {
    Base,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
    Fulu,
}

impl ForkName {
    pub fn list_all() -> Vec<ForkName> {
        vec![
            ForkName::Base,
            ForkName::Altair,
            ForkName::Bellatrix,
            ForkName::Capella,
            ForkName::Deneb,
            ForkName::Electra,
            ForkName::Fulu,
        ]
    }

    pub fn latest() -> ForkName {
        ForkName::Fulu
    }

    /// Returns true if this fork carries blob KZG commitments on the block body.
    pub fn deneb_enabled(self) -> bool {
        self >= ForkName::Deneb
    }

    /// Returns true if this fork distributes blob data as column sidecars (PeerDAS).
    pub fn fulu_enabled(self) -> bool {
        self >= ForkName::Fulu
    }

    /// Return a `ChainSpec` based on `spec` where this fork (and all prior) activate at genesis.
    ///
    /// Subsequent forks are disabled.
    pub fn make_genesis_spec(&self, mut spec: ChainSpec) -> ChainSpec {
        let genesis = Some(Epoch::new(0));
        spec.altair_fork_epoch = None;
        spec.bellatrix_fork_epoch = None;
        spec.capella_fork_epoch = None;
        spec.deneb_fork_epoch = None;
        spec.electra_fork_epoch = None;
        spec.fulu_fork_epoch = None;

        // Fallthrough intended: each arm enables its own fork and everything before it.
        match self {
            ForkName::Fulu => {
                spec.fulu_fork_epoch = genesis;
                spec.electra_fork_epoch = genesis;
                spec.deneb_fork_epoch = genesis;
                spec.capella_fork_epoch = genesis;
                spec.bellatrix_fork_epoch = genesis;
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Electra => {
                spec.electra_fork_epoch = genesis;
                spec.deneb_fork_epoch = genesis;
                spec.capella_fork_epoch = genesis;
                spec.bellatrix_fork_epoch = genesis;
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Deneb => {
                spec.deneb_fork_epoch = genesis;
                spec.capella_fork_epoch = genesis;
                spec.bellatrix_fork_epoch = genesis;
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Capella => {
                spec.capella_fork_epoch = genesis;
                spec.bellatrix_fork_epoch = genesis;
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Bellatrix => {
                spec.bellatrix_fork_epoch = genesis;
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Altair => {
                spec.altair_fork_epoch = genesis;
            }
            ForkName::Base => {}
        }
        spec
    }
}

/// The block at a given slot carries a different set of fields per fork; mixing types across
/// forks is a programmer error.
#[derive(Debug, Clone, PartialEq)]
pub struct InconsistentFork {
    pub fork_at_slot: ForkName,
    pub object_fork: ForkName,
}

impl FromStr for ForkName {
    type Err = String;

    fn from_str(fork_name: &str) -> Result<Self, String> {
        Ok(match fork_name.to_lowercase().as_ref() {
            "phase0" | "base" => ForkName::Base,
            "altair" => ForkName::Altair,
            "bellatrix" | "merge" => ForkName::Bellatrix,
            "capella" => ForkName::Capella,
            "deneb" => ForkName::Deneb,
            "electra" => ForkName::Electra,
            "fulu" => ForkName::Fulu,
            _ => return Err(format!("unknown fork name: {}", fork_name)),
        })
    }
}

impl Display for ForkName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ForkName::Base => "phase0".fmt(f),
            ForkName::Altair => "altair".fmt(f),
            ForkName::Bellatrix => "bellatrix".fmt(f),
            ForkName::Capella => "capella".fmt(f),
            ForkName::Deneb => "deneb".fmt(f),
            ForkName::Electra => "electra".fmt(f),
            ForkName::Fulu => "fulu".fmt(f),
        }
    }
}

impl From<ForkName> for String {
    fn from(fork: ForkName) -> String {
        fork.to_string()
    }
}

impl TryFrom<String> for ForkName {
    type Error = String;

    fn try_from(fork_name: String) -> Result<Self, Self::Error> {
        Self::from_str(&fork_name)
    }
}
