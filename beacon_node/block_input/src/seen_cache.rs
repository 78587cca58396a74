//! The process-wide cache deduplicating block-input sightings across every ingestion path.
//!
//! All gossip handlers, by-root and by-range responses go through `get_by_*`: the first
//! sighting of a root creates the entity, later sightings merge into it. Creation and merge
//! run under a single critical section per root, so concurrent sightings of the same root can
//! never produce two entities.

use crate::block_input::{AddOptions, BlockInput, BlockInputError, BlockProps, SidecarProps};
use crate::custody::CustodyContext;
use crate::metrics;
use parking_lot::Mutex;
use slot_clock::SlotClock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use types::{BlobSidecar, ChainSpec, DataColumnSidecar, EthSpec, Hash256, Slot};

pub struct SeenBlockInputCache<E: EthSpec, S: SlotClock> {
    items: Mutex<HashMap<Hash256, Arc<BlockInput<E>>>>,
    custody: CustodyContext,
    slot_clock: S,
    spec: Arc<ChainSpec>,
}

impl<E: EthSpec, S: SlotClock> SeenBlockInputCache<E, S> {
    pub fn new(custody: CustodyContext, slot_clock: S, spec: Arc<ChainSpec>) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            custody,
            slot_clock,
            spec,
        }
    }

    /// Returns the entity for the block's root, creating it from this sighting if absent and
    /// merging the sighting into it otherwise.
    pub fn get_by_block(
        &self,
        props: BlockProps<E>,
    ) -> Result<Arc<BlockInput<E>>, BlockInputError> {
        let block_root = props.block.canonical_root();
        let slot = props.block.slot();
        let source = props.source;

        let mut items = self.items.lock();
        if let Some(existing) = items.get(&block_root) {
            if existing.has_block() {
                metrics::inc_counter_vec(&metrics::DUPLICATE_BLOCK_SIGHTINGS, &[source.as_str()]);
            }
            existing.add_block(props, AddOptions::permissive())?;
            return Ok(existing.clone());
        }

        let fork = self.spec.fork_name_at_slot::<E>(slot);
        let entity = BlockInput::new_from_block(
            props,
            fork,
            self.da_out_of_range(slot),
            &self.custody,
        );
        metrics::inc_counter_vec(&metrics::BLOCK_INPUT_CREATED_BY_BLOCK, &[source.as_str()]);
        items.insert(block_root, entity.clone());
        metrics::set_gauge(&metrics::SEEN_BLOCK_INPUT_CACHE_SIZE, items.len() as i64);
        Ok(entity)
    }

    /// Returns the entity for the blob's block root, creating or merging as for
    /// `get_by_block`.
    pub fn get_by_blob(
        &self,
        props: SidecarProps<BlobSidecar<E>>,
    ) -> Result<Arc<BlockInput<E>>, BlockInputError> {
        let block_root = props.sidecar.block_root();
        let slot = props.sidecar.slot();
        let source = props.source;

        let mut items = self.items.lock();
        if let Some(existing) = items.get(&block_root) {
            if existing.has_blob(props.sidecar.index) {
                metrics::inc_counter_vec(&metrics::DUPLICATE_BLOB_SIGHTINGS, &[source.as_str()]);
            }
            existing.add_blob(props, AddOptions::permissive())?;
            return Ok(existing.clone());
        }

        let fork = self.spec.fork_name_at_slot::<E>(slot);
        let entity =
            BlockInput::new_from_blob(props, fork, self.da_out_of_range(slot), &self.custody);
        metrics::inc_counter_vec(&metrics::BLOCK_INPUT_CREATED_BY_SIDECAR, &[source.as_str()]);
        items.insert(block_root, entity.clone());
        metrics::set_gauge(&metrics::SEEN_BLOCK_INPUT_CACHE_SIZE, items.len() as i64);
        Ok(entity)
    }

    /// Returns the entity for the column's block root, creating or merging as for
    /// `get_by_block`.
    pub fn get_by_column(
        &self,
        props: SidecarProps<DataColumnSidecar<E>>,
    ) -> Result<Arc<BlockInput<E>>, BlockInputError> {
        let block_root = props.sidecar.block_root();
        let slot = props.sidecar.slot();
        let source = props.source;

        let mut items = self.items.lock();
        if let Some(existing) = items.get(&block_root) {
            if existing.has_column(props.sidecar.index) {
                metrics::inc_counter_vec(&metrics::DUPLICATE_COLUMN_SIGHTINGS, &[source.as_str()]);
            }
            existing.add_column(props, AddOptions::permissive())?;
            return Ok(existing.clone());
        }

        let fork = self.spec.fork_name_at_slot::<E>(slot);
        let entity =
            BlockInput::new_from_column(props, fork, self.da_out_of_range(slot), &self.custody);
        metrics::inc_counter_vec(&metrics::BLOCK_INPUT_CREATED_BY_SIDECAR, &[source.as_str()]);
        items.insert(block_root, entity.clone());
        metrics::set_gauge(&metrics::SEEN_BLOCK_INPUT_CACHE_SIZE, items.len() as i64);
        Ok(entity)
    }

    /// Read-only lookup.
    pub fn get(&self, block_root: &Hash256) -> Option<Arc<BlockInput<E>>> {
        self.items.lock().get(block_root).cloned()
    }

    /// Remove the entity for `block_root`. Safe at any time; a later sighting re-creates it.
    pub fn prune(&self, block_root: &Hash256) {
        let mut items = self.items.lock();
        if items.remove(block_root).is_some() {
            debug!(?block_root, "Pruned block input");
        }
        metrics::set_gauge(&metrics::SEEN_BLOCK_INPUT_CACHE_SIZE, items.len() as i64);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// A block is outside the data-availability window when its epoch precedes the boundary.
    fn da_out_of_range(&self, slot: Slot) -> bool {
        let Some(current_slot) = self.slot_clock.now() else {
            return false;
        };
        let current_epoch = current_slot.epoch(E::slots_per_epoch());
        self.spec
            .data_availability_boundary(current_epoch)
            .is_some_and(|boundary| slot.epoch(E::slots_per_epoch()) < boundary)
    }
}
