//! Slot timekeeping: maps wall-clock time onto beacon slots.

mod manual_slot_clock;
mod system_time_slot_clock;

use std::time::Duration;

pub use crate::manual_slot_clock::ManualSlotClock;
pub use crate::system_time_slot_clock::SystemTimeSlotClock;
pub use types::Slot;

/// A clock that reports the current slot.
///
/// The clock is not required to be monotonically increasing and may go backwards.
pub trait SlotClock: Send + Sync + Sized + Clone {
    /// Creates a new slot clock where the first slot is `genesis_slot`, genesis occurred
    /// `genesis_duration` after the `UNIX_EPOCH` and each slot is `slot_duration` apart.
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self;

    /// Returns the slot at this present time.
    fn now(&self) -> Option<Slot>;

    /// Returns the present time as a duration since the `UNIX_EPOCH`.
    fn now_duration(&self) -> Option<Duration>;

    /// Indicates if the current time is prior to genesis time.
    ///
    /// Returns `None` if the system clock cannot be read.
    fn is_prior_to_genesis(&self) -> Option<bool>;

    /// Returns the slot of the given duration since the `UNIX_EPOCH`.
    fn slot_of(&self, now: Duration) -> Option<Slot>;

    /// Returns the duration between now and the start of the next slot.
    fn duration_to_next_slot(&self) -> Option<Duration>;

    /// Returns the duration until the start of `slot`, or `None` if it already started.
    fn duration_to_slot(&self, slot: Slot) -> Option<Duration>;

    /// Returns the duration between UNIX epoch and the start of `slot`.
    fn start_of(&self, slot: Slot) -> Option<Duration>;

    /// Returns the first slot to be returned at the genesis time.
    fn genesis_slot(&self) -> Slot;

    /// Returns the duration from `UNIX_EPOCH` to the genesis time.
    fn genesis_duration(&self) -> Duration;

    /// The length of a slot.
    fn slot_duration(&self) -> Duration;

    /// Returns the duration elapsed since the start of `slot`.
    ///
    /// `None` if the clock cannot be read or the slot has not started yet.
    fn duration_from_slot_start(&self, slot: Slot) -> Option<Duration> {
        let now = self.now_duration()?;
        now.checked_sub(self.start_of(slot)?)
    }

    /// Returns the duration until `offset` past the start of `slot`, clamped at zero once the
    /// deadline has passed.
    fn duration_to_slot_offset(&self, slot: Slot, offset: Duration) -> Option<Duration> {
        let deadline = self.start_of(slot)?.checked_add(offset)?;
        Some(deadline.saturating_sub(self.now_duration()?))
    }
}
