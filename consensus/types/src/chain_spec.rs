use crate::{Epoch, EthSpec, ForkName, Slot};

/// Runtime-configurable network parameters.
///
/// Only the parameters consumed by block-input assembly and data-availability tracking are
/// modelled; everything else belongs to the state-transition collaborators.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainSpec {
    pub seconds_per_slot: u64,
    pub genesis_slot: Slot,

    /*
     * Fork activation epochs. `None` = not scheduled.
     */
    pub altair_fork_epoch: Option<Epoch>,
    pub bellatrix_fork_epoch: Option<Epoch>,
    pub capella_fork_epoch: Option<Epoch>,
    pub deneb_fork_epoch: Option<Epoch>,
    pub electra_fork_epoch: Option<Epoch>,
    pub fulu_fork_epoch: Option<Epoch>,

    /*
     * Blob parameters, per activating fork.
     */
    pub max_blobs_per_block_deneb: u64,
    pub max_blobs_per_block_electra: u64,
    pub max_blobs_per_block_fulu: u64,

    /*
     * Data-availability retention windows, in epochs.
     */
    pub min_epochs_for_blob_sidecars_requests: u64,
    pub min_epochs_for_data_column_sidecars_requests: u64,

    /*
     * PeerDAS custody parameters.
     */
    pub number_of_columns: u64,
    pub number_of_custody_groups: u64,
    pub custody_requirement: u64,
    pub samples_per_slot: u64,
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            seconds_per_slot: 12,
            genesis_slot: Slot::new(0),
            altair_fork_epoch: Some(Epoch::new(74240)),
            bellatrix_fork_epoch: Some(Epoch::new(144896)),
            capella_fork_epoch: Some(Epoch::new(194048)),
            deneb_fork_epoch: Some(Epoch::new(269568)),
            electra_fork_epoch: Some(Epoch::new(364032)),
            fulu_fork_epoch: None,
            max_blobs_per_block_deneb: 6,
            max_blobs_per_block_electra: 9,
            max_blobs_per_block_fulu: 12,
            min_epochs_for_blob_sidecars_requests: 4096,
            min_epochs_for_data_column_sidecars_requests: 4096,
            number_of_columns: 128,
            number_of_custody_groups: 128,
            custody_requirement: 4,
            samples_per_slot: 8,
        }
    }

    pub fn minimal() -> Self {
        Self {
            seconds_per_slot: 6,
            min_epochs_for_blob_sidecars_requests: 272,
            min_epochs_for_data_column_sidecars_requests: 272,
            ..Self::mainnet()
        }
    }

    /// Returns the name of the fork activated at `slot`.
    pub fn fork_name_at_slot<E: EthSpec>(&self, slot: Slot) -> ForkName {
        self.fork_name_at_epoch(slot.epoch(E::slots_per_epoch()))
    }

    /// Returns the name of the fork activated at `epoch`.
    pub fn fork_name_at_epoch(&self, epoch: Epoch) -> ForkName {
        match self.fulu_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Fulu,
            _ => (),
        }
        match self.electra_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Electra,
            _ => (),
        }
        match self.deneb_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Deneb,
            _ => (),
        }
        match self.capella_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Capella,
            _ => (),
        }
        match self.bellatrix_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Bellatrix,
            _ => (),
        }
        match self.altair_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Altair,
            _ => (),
        }
        ForkName::Base
    }

    /// Returns the epoch at which `fork_name` activates, if scheduled.
    pub fn fork_epoch(&self, fork_name: ForkName) -> Option<Epoch> {
        match fork_name {
            ForkName::Base => Some(Epoch::new(0)),
            ForkName::Altair => self.altair_fork_epoch,
            ForkName::Bellatrix => self.bellatrix_fork_epoch,
            ForkName::Capella => self.capella_fork_epoch,
            ForkName::Deneb => self.deneb_fork_epoch,
            ForkName::Electra => self.electra_fork_epoch,
            ForkName::Fulu => self.fulu_fork_epoch,
        }
    }

    /// Returns true if data is distributed as column sidecars at `epoch` (PeerDAS).
    pub fn is_peer_das_enabled_for_epoch(&self, epoch: Epoch) -> bool {
        self.fulu_fork_epoch
            .is_some_and(|fulu_epoch| epoch >= fulu_epoch)
    }

    /// Maximum number of blobs a block may commit to at `epoch`.
    pub fn max_blobs_per_block(&self, epoch: Epoch) -> u64 {
        match self.fork_name_at_epoch(epoch) {
            ForkName::Fulu => self.max_blobs_per_block_fulu,
            ForkName::Electra => self.max_blobs_per_block_electra,
            _ => self.max_blobs_per_block_deneb,
        }
    }

    /// The earliest epoch for which sidecars must still be retained and served.
    ///
    /// `None` if Deneb is not scheduled (no data-availability requirement at all).
    pub fn data_availability_boundary(&self, current_epoch: Epoch) -> Option<Epoch> {
        let deneb_fork_epoch = self.deneb_fork_epoch?;
        let retention_epochs = if self.is_peer_das_enabled_for_epoch(current_epoch) {
            self.min_epochs_for_data_column_sidecars_requests
        } else {
            self.min_epochs_for_blob_sidecars_requests
        };
        Some(std::cmp::max(
            deneb_fork_epoch,
            current_epoch.saturating_sub(retention_epochs),
        ))
    }

    /// Returns true if a block at `epoch` requires a data-availability check.
    pub fn da_check_required_for_epoch(&self, current_epoch: Epoch, block_epoch: Epoch) -> bool {
        self.data_availability_boundary(current_epoch)
            .is_some_and(|da_epoch| block_epoch >= da_epoch)
    }

    /// Duration of one slot.
    pub fn slot_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds_per_slot)
    }
}
