//! The availability gate: a bounded wait for a batch of block inputs to report all their
//! data present, run before the blocks enter state transition.

use crate::block_input::{BlockInput, BlockInputError, SeenTimestamp};
use crate::DaType;
use std::sync::Arc;
use std::time::Duration;
use types::{EthSpec, Hash256};

/// How long the gate waits for data before declaring a DA failure.
///
/// A secondary by-root pull for an unavailable block starts 500 ms after first sighting; even
/// in the worst case the node must wait out the full slot budget before giving up, to
/// accommodate late gossip and engine-local blob recovery.
pub const BLOB_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    /// Pre-Deneb: there is no data to be available.
    PreData,
    /// The slot is older than the DA retention window; data is not required.
    OutOfRange,
    /// All required data was observed.
    Available,
}

#[derive(Debug, PartialEq)]
pub enum DataAvailabilityError {
    /// A block's data did not arrive within the availability timeout.
    Timeout(Hash256),
    /// The caller's cancel signal fired.
    Cancelled,
    BlockInput(BlockInputError),
}

/// The gate's successful outcome: one status per input, plus the instant the batch became
/// fully available.
#[derive(Debug)]
pub struct VerifiedAvailability {
    pub statuses: Vec<AvailabilityStatus>,
    /// The maximum `time_complete` across the batch, floored at zero.
    pub available_time: SeenTimestamp,
}

/// Wait (bounded) for every input to report all data present.
///
/// All-or-nothing: a single timeout fails the whole call and nothing is returned for the
/// blocks that did complete.
pub async fn verify_blocks_data_availability<E: EthSpec>(
    block_inputs: &[Arc<BlockInput<E>>],
    cancel: exit_future::Exit,
) -> Result<VerifiedAvailability, DataAvailabilityError> {
    futures::future::try_join_all(block_inputs.iter().map(|block_input| {
        let cancel = cancel.clone();
        async move {
            block_input
                .wait_for_all_data(BLOB_AVAILABILITY_TIMEOUT, cancel)
                .await
                .map_err(|e| match e {
                    BlockInputError::WaitTimeout => {
                        DataAvailabilityError::Timeout(block_input.block_root())
                    }
                    BlockInputError::Cancelled => DataAvailabilityError::Cancelled,
                    other => DataAvailabilityError::BlockInput(other),
                })
        }
    }))
    .await?;

    let statuses = block_inputs
        .iter()
        .map(|block_input| {
            if block_input.da_type() == DaType::PreData {
                AvailabilityStatus::PreData
            } else if block_input.da_out_of_range() {
                AvailabilityStatus::OutOfRange
            } else {
                AvailabilityStatus::Available
            }
        })
        .collect();

    let available_time = block_inputs
        .iter()
        .filter_map(|block_input| block_input.time_complete().ok())
        .max()
        .unwrap_or_default();

    Ok(VerifiedAvailability {
        statuses,
        available_time,
    })
}
