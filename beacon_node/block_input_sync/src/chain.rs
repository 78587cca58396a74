//! The chain-layer collaborator boundary: block processing and fork-choice views.

use block_input::BlockInput;
use std::future::Future;
use std::sync::Arc;
use types::{EthSpec, Hash256, Slot};

/// Why the processor refused a block. The driver's retry policy keys off this.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockProcessError {
    /// The parent is not in fork choice yet; retry once it arrives.
    ParentUnknown { parent_root: Hash256 },
    /// The pre-state is not available yet; retry after another cycle.
    PrestateMissing,
    /// The execution engine failed; not the peers' fault.
    ExecutionEngineError(String),
    /// The availability gate gave up on the block's data.
    DataUnavailable,
    /// Another path already imported this block.
    AlreadyKnown,
    /// Consensus-invalid or otherwise rejected.
    Invalid(String),
}

/// The canonical entry into state transition and fork-choice import.
pub trait BlockProcessor<E: EthSpec>: Send + Sync + 'static {
    fn process_block(
        &self,
        block_input: Arc<BlockInput<E>>,
    ) -> impl Future<Output = Result<(), BlockProcessError>> + Send;
}

/// Read-only views of chain state the driver consults.
pub trait ChainView: Send + Sync + 'static {
    /// True once fork choice has accepted the block.
    fn fork_choice_contains_block(&self, block_root: &Hash256) -> bool;

    /// True if this proposer was already observed producing a gossip block at `slot`.
    /// Feeds the anti-unbundling guard.
    fn proposer_seen_at_slot(&self, slot: Slot, proposer_index: u64) -> bool;
}
