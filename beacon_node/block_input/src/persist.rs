//! Writes imported block inputs to the durable store.
//!
//! Contract: a block imported to fork choice must eventually be persisted together with its
//! sidecars, or downstream consistency invariants break. Failures are logged and surfaced,
//! but the seen-cache entry is pruned regardless so the cache cannot leak.

use crate::block_input::BlockInput;
use crate::seen_cache::SeenBlockInputCache;
use crate::store::{Store, StoreError};
use crate::{DaType, metrics};
use slot_clock::SlotClock;
use std::sync::Arc;
use tracing::{debug, error};
use types::EthSpec;

/// Persist each input's block and sidecars, then prune its seen-cache entry.
///
/// Blobs are persisted in full; columns only as the node's custody subset, since the rest of
/// the sampled set is neither stored nor served.
pub fn persist_block_inputs<E: EthSpec, S: SlotClock, St: Store<E>>(
    store: &St,
    seen_cache: &SeenBlockInputCache<E, S>,
    block_inputs: &[Arc<BlockInput<E>>],
) -> Result<(), StoreError> {
    let mut first_error = None;

    for block_input in block_inputs {
        let result = persist_one(store, block_input);
        if let Err(e) = &result {
            error!(
                block_root = ?block_input.block_root(),
                error = ?e,
                "Failed to persist block input"
            );
            metrics::inc_counter(&metrics::PERSIST_ERRORS);
            first_error.get_or_insert_with(|| e.clone());
        } else {
            metrics::inc_counter(&metrics::PERSISTED_BLOCK_INPUTS);
        }
        // Prune regardless of the write outcome so the cache cannot leak entries for
        // imported blocks.
        seen_cache.prune(&block_input.block_root());
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn persist_one<E: EthSpec, St: Store<E>>(
    store: &St,
    block_input: &BlockInput<E>,
) -> Result<(), StoreError> {
    let block_root = block_input.block_root();
    let block = block_input
        .block()
        .map_err(|e| StoreError::Backend(format!("persisting block input without block: {e:?}")))?;

    // Prefer the wire bytes kept from the gossip decode.
    if let Some(bytes) = block_input.cached_block_bytes() {
        store.put_block_bytes(block_root, bytes)?;
    } else {
        store.put_block(block_root, &block)?;
    }

    match block_input.da_type() {
        DaType::PreData => {}
        DaType::Blobs => {
            let blobs = block_input.blob_sidecars();
            if !blobs.is_empty() {
                store.put_blob_sidecars(block_root, &blobs)?;
            }
        }
        DaType::Columns => {
            let custody_columns = block_input.custody_columns();
            if !custody_columns.is_empty() {
                store.put_data_columns(block_root, &custody_columns)?;
            }
        }
    }

    debug!(?block_root, slot = %block_input.slot(), "Persisted block input");
    Ok(())
}

/// Reverse an eager persist after fork choice rejected the block.
pub fn remove_eagerly_persisted_block_inputs<E: EthSpec, St: Store<E>>(
    store: &St,
    block_inputs: &[Arc<BlockInput<E>>],
) -> Result<(), StoreError> {
    for block_input in block_inputs {
        let block_root = block_input.block_root();
        store.delete_block(block_root)?;
        match block_input.da_type() {
            DaType::PreData => {}
            DaType::Blobs => store.delete_blob_sidecars(block_root)?,
            DaType::Columns => store.delete_data_columns(block_root)?,
        }
        debug!(?block_root, "Removed eagerly persisted block input");
    }
    Ok(())
}
