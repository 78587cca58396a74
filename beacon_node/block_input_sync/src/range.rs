//! Validation of by-range responses against their requests.
//!
//! Block and blob violations are fatal for the batch: the peer misbehaved or the response is
//! unusable. Column responses are judged more leniently: a peer serving only part of its
//! custody is a warning (the rest is re-requested elsewhere), while structural violations
//! (duplicates, disorder, columns for empty blocks) remain fatal.

use crate::metrics;
use block_input::{SidecarVerifier, VerificationError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use types::{
    BlobSidecar, ColumnIndex, DataColumnSidecar, EthSpec, Hash256, SignedBeaconBlock, Slot,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BlocksByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataColumnsByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
    pub columns: Vec<ColumnIndex>,
}

/// A block from a range response coupled with the sidecars that belong to it.
#[derive(Debug)]
pub struct CoupledBlock<E: EthSpec> {
    pub block: Arc<SignedBeaconBlock<E>>,
    pub block_root: Hash256,
    pub blobs: Vec<Arc<BlobSidecar<E>>>,
    pub columns: Vec<Arc<DataColumnSidecar<E>>>,
}

/// Non-fatal findings in a column response. The coupled data is still returned.
#[derive(Debug, Default)]
pub struct ColumnCouplingWarnings {
    /// Requested columns the peer did not return, per block. Re-request from other peers.
    pub missing_columns: Vec<(Hash256, Vec<ColumnIndex>)>,
    /// Returned columns outside the requested set or for blocks outside the response.
    pub extra_columns: Vec<(Slot, ColumnIndex)>,
}

impl ColumnCouplingWarnings {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty() && self.extra_columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeResponseError {
    /// An empty block response. Empty epochs during liveness incidents require operator
    /// attention, so this is surfaced rather than silently accepted.
    EmptyResponse,
    TooManyBlocks { requested: u64, received: usize },
    BlockOutOfRange { slot: Slot },
    OutOfOrderBlocks { slot: Slot },
    NonLinearParentRoots { slot: Slot },
    /// The blob count does not match the blocks' commitments.
    UnexpectedBlobCount { expected: usize, received: usize },
    /// A block's blob run does not cover indices `0..n`.
    InvalidBlobIndex { block_root: Hash256, index: u64 },
    DuplicateColumn { slot: Slot, index: ColumnIndex },
    OutOfOrderColumns { slot: Slot, index: ColumnIndex },
    /// A column was returned for a block with zero commitments.
    ColumnForEmptyBlock { slot: Slot },
    /// A column was returned for a block of a pre-Fulu fork.
    ColumnForkMismatch { slot: Slot },
    Verification(VerificationError),
}

impl From<VerificationError> for RangeResponseError {
    fn from(e: VerificationError) -> Self {
        RangeResponseError::Verification(e)
    }
}

/// Validate a full set of by-range responses and couple sidecars to their blocks.
///
/// Sidecar KZG verification runs through `verifier` only after the structural checks pass,
/// so a malformed response never reaches the crypto layer.
pub fn validate_range_responses<E: EthSpec, V: SidecarVerifier<E>>(
    blocks_request: &BlocksByRangeRequest,
    blocks: Vec<Arc<SignedBeaconBlock<E>>>,
    blobs: Option<Vec<Arc<BlobSidecar<E>>>>,
    columns: Option<(&DataColumnsByRangeRequest, Vec<Arc<DataColumnSidecar<E>>>)>,
    verifier: &V,
) -> Result<(Vec<CoupledBlock<E>>, ColumnCouplingWarnings), RangeResponseError> {
    let result = validate_range_responses_inner(blocks_request, blocks, blobs, columns, verifier);
    if result.is_err() {
        metrics::inc_counter(&metrics::RANGE_RESPONSE_ERRORS);
    }
    result
}

fn validate_range_responses_inner<E: EthSpec, V: SidecarVerifier<E>>(
    blocks_request: &BlocksByRangeRequest,
    blocks: Vec<Arc<SignedBeaconBlock<E>>>,
    blobs: Option<Vec<Arc<BlobSidecar<E>>>>,
    columns: Option<(&DataColumnsByRangeRequest, Vec<Arc<DataColumnSidecar<E>>>)>,
    verifier: &V,
) -> Result<(Vec<CoupledBlock<E>>, ColumnCouplingWarnings), RangeResponseError> {
    let block_roots = validate_blocks_by_range_response(blocks_request, &blocks)?;

    let mut coupled = blocks
        .into_iter()
        .zip(block_roots)
        .map(|(block, block_root)| CoupledBlock {
            block,
            block_root,
            blobs: vec![],
            columns: vec![],
        })
        .collect::<Vec<_>>();

    if let Some(blobs) = blobs {
        couple_blobs(&mut coupled, blobs, verifier)?;
    }

    let mut warnings = ColumnCouplingWarnings::default();
    if let Some((columns_request, columns)) = columns {
        warnings = couple_columns(&mut coupled, columns_request, columns, verifier)?;
        if !warnings.is_empty() {
            metrics::inc_counter(&metrics::RANGE_COLUMN_WARNINGS);
            warn!(
                missing = warnings.missing_columns.len(),
                extra = warnings.extra_columns.len(),
                "Column range response incomplete"
            );
        }
    }

    Ok((coupled, warnings))
}

/// The block-level checks. All violations are fatal.
pub fn validate_blocks_by_range_response<E: EthSpec>(
    request: &BlocksByRangeRequest,
    blocks: &[Arc<SignedBeaconBlock<E>>],
) -> Result<Vec<Hash256>, RangeResponseError> {
    if blocks.is_empty() {
        return Err(RangeResponseError::EmptyResponse);
    }
    if blocks.len() as u64 > request.count {
        return Err(RangeResponseError::TooManyBlocks {
            requested: request.count,
            received: blocks.len(),
        });
    }

    let end_slot = request.start_slot + request.count;
    let mut block_roots = Vec::with_capacity(blocks.len());
    let mut prev: Option<(Slot, Hash256)> = None;

    for block in blocks {
        let slot = block.slot();
        if slot < request.start_slot || slot >= end_slot {
            return Err(RangeResponseError::BlockOutOfRange { slot });
        }
        let block_root = block.canonical_root();
        if let Some((prev_slot, prev_root)) = prev {
            // Skipped slots are fine; equal or descending slots are not.
            if slot <= prev_slot {
                return Err(RangeResponseError::OutOfOrderBlocks { slot });
            }
            if block.parent_root() != prev_root {
                return Err(RangeResponseError::NonLinearParentRoots { slot });
            }
        }
        prev = Some((slot, block_root));
        block_roots.push(block_root);
    }

    Ok(block_roots)
}

/// Couple blobs to blocks by slot. Every block must receive exactly its committed count,
/// with indices forming the run `0..n`, and no blob may be left over.
fn couple_blobs<E: EthSpec, V: SidecarVerifier<E>>(
    coupled: &mut [CoupledBlock<E>],
    blobs: Vec<Arc<BlobSidecar<E>>>,
    verifier: &V,
) -> Result<(), RangeResponseError> {
    let total_expected = coupled
        .iter()
        .map(|c| c.block.num_expected_blobs())
        .sum::<usize>();
    if blobs.len() != total_expected {
        return Err(RangeResponseError::UnexpectedBlobCount {
            expected: total_expected,
            received: blobs.len(),
        });
    }

    let mut blob_iter = blobs.into_iter().peekable();
    for c in coupled.iter_mut() {
        let expected = c.block.num_expected_blobs();
        while blob_iter
            .peek()
            .is_some_and(|blob| blob.slot() == c.block.slot())
        {
            let blob = blob_iter.next().expect("peeked above");
            // Index must equal the position in this block's run.
            if blob.index != c.blobs.len() as u64 {
                return Err(RangeResponseError::InvalidBlobIndex {
                    block_root: c.block_root,
                    index: blob.index,
                });
            }
            c.blobs.push(blob);
        }
        if c.blobs.len() != expected {
            return Err(RangeResponseError::UnexpectedBlobCount {
                expected,
                received: c.blobs.len(),
            });
        }
    }

    // The total count matched, so a leftover means some blob paired with no block.
    if let Some(unpaired) = blob_iter.next() {
        return Err(RangeResponseError::InvalidBlobIndex {
            block_root: unpaired.block_root(),
            index: unpaired.index,
        });
    }

    for c in coupled.iter() {
        if !c.blobs.is_empty() {
            verifier.validate_block_blob_sidecars(
                c.block.slot(),
                c.block_root,
                c.block.num_expected_blobs(),
                &c.blobs,
            )?;
        }
    }

    Ok(())
}

/// Couple columns to blocks by root. Structural violations are fatal; partial coverage and
/// stray extras are warnings and the surviving data is kept.
fn couple_columns<E: EthSpec, V: SidecarVerifier<E>>(
    coupled: &mut [CoupledBlock<E>],
    request: &DataColumnsByRangeRequest,
    columns: Vec<Arc<DataColumnSidecar<E>>>,
    verifier: &V,
) -> Result<ColumnCouplingWarnings, RangeResponseError> {
    let mut warnings = ColumnCouplingWarnings::default();

    // Responses are ordered by (slot, index) with no duplicates.
    let mut prev: Option<(Slot, ColumnIndex)> = None;
    for column in &columns {
        let key = (column.slot(), column.index);
        if let Some(prev_key) = prev {
            if key == prev_key {
                return Err(RangeResponseError::DuplicateColumn {
                    slot: key.0,
                    index: key.1,
                });
            }
            if key < prev_key {
                return Err(RangeResponseError::OutOfOrderColumns {
                    slot: key.0,
                    index: key.1,
                });
            }
        }
        prev = Some(key);
    }

    let mut columns_by_root: HashMap<Hash256, Vec<Arc<DataColumnSidecar<E>>>> = HashMap::new();
    for column in columns {
        columns_by_root
            .entry(column.block_root())
            .or_default()
            .push(column);
    }

    for c in coupled.iter_mut() {
        let mut block_columns = columns_by_root.remove(&c.block_root).unwrap_or_default();

        if c.block.num_expected_blobs() == 0 {
            if !block_columns.is_empty() {
                return Err(RangeResponseError::ColumnForEmptyBlock {
                    slot: c.block.slot(),
                });
            }
            continue;
        }
        if !c.block.fork_name_unchecked().fulu_enabled() && !block_columns.is_empty() {
            return Err(RangeResponseError::ColumnForkMismatch {
                slot: c.block.slot(),
            });
        }

        // Extras outside the requested set are kept but flagged.
        for column in &block_columns {
            if !request.columns.contains(&column.index) {
                warnings.extra_columns.push((column.slot(), column.index));
            }
        }

        let missing = request
            .columns
            .iter()
            .filter(|index| !block_columns.iter().any(|column| column.index == **index))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            warnings.missing_columns.push((c.block_root, missing));
        }

        if !block_columns.is_empty() {
            verifier.validate_block_data_column_sidecars(
                c.block.slot(),
                c.block_root,
                c.block.num_expected_blobs(),
                &block_columns,
            )?;
        }
        c.columns.append(&mut block_columns);
    }

    // Columns for roots outside the response cannot be coupled; keep them out, flag them.
    for (_, stray) in columns_by_root {
        for column in stray {
            warnings.extra_columns.push((column.slot(), column.index));
        }
    }

    Ok(warnings)
}
