//! Accumulates the partial responses of a by-range batch until every component request has
//! resolved, then validates and couples them.
//!
//! A batch is one blocks-by-range request plus either one blobs-by-range request or a fan-out
//! of column requests (one per peer serving part of the custody set). Responses arrive in any
//! order; `responses` yields nothing until the set is complete.

use crate::range::{
    BlocksByRangeRequest, ColumnCouplingWarnings, CoupledBlock, DataColumnsByRangeRequest,
    RangeResponseError, validate_range_responses,
};
use block_input::SidecarVerifier;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use types::{BlobSidecar, DataColumnSidecar, EthSpec, SignedBeaconBlock};

/// Identifier correlating a component request with its response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeRequestId(pub u32);

impl fmt::Display for RangeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum ByRangeRequest<T> {
    Active(RangeRequestId),
    Complete(T),
}

impl<T> ByRangeRequest<T> {
    fn finish(&mut self, id: RangeRequestId, data: T) -> Result<(), String> {
        match self {
            Self::Active(expected_id) => {
                if *expected_id != id {
                    return Err(format!("unexpected req_id expected {expected_id} got {id}"));
                }
                *self = Self::Complete(data);
                Ok(())
            }
            Self::Complete(_) => Err("request already complete".to_owned()),
        }
    }

    fn to_finished(&self) -> Option<&T> {
        match self {
            Self::Active(_) => None,
            Self::Complete(data) => Some(data),
        }
    }
}

enum RangeBlockDataRequest<E: EthSpec> {
    NoData,
    Blobs(ByRangeRequest<Vec<Arc<BlobSidecar<E>>>>),
    DataColumns {
        requests: HashMap<RangeRequestId, ByRangeRequest<Vec<Arc<DataColumnSidecar<E>>>>>,
        columns_request: DataColumnsByRangeRequest,
    },
}

pub struct RangeBlockComponentsRequest<E: EthSpec> {
    request: BlocksByRangeRequest,
    /// Blocks we have received awaiting their corresponding sidecars.
    blocks_request: ByRangeRequest<Vec<Arc<SignedBeaconBlock<E>>>>,
    /// Sidecars we have received awaiting their corresponding blocks.
    block_data_request: RangeBlockDataRequest<E>,
}

impl<E: EthSpec> RangeBlockComponentsRequest<E> {
    pub fn new(
        request: BlocksByRangeRequest,
        blocks_req_id: RangeRequestId,
        blobs_req_id: Option<RangeRequestId>,
        data_columns: Option<(Vec<RangeRequestId>, DataColumnsByRangeRequest)>,
    ) -> Self {
        let block_data_request = if let Some(blobs_req_id) = blobs_req_id {
            RangeBlockDataRequest::Blobs(ByRangeRequest::Active(blobs_req_id))
        } else if let Some((req_ids, columns_request)) = data_columns {
            RangeBlockDataRequest::DataColumns {
                requests: req_ids
                    .into_iter()
                    .map(|id| (id, ByRangeRequest::Active(id)))
                    .collect(),
                columns_request,
            }
        } else {
            RangeBlockDataRequest::NoData
        };

        Self {
            request,
            blocks_request: ByRangeRequest::Active(blocks_req_id),
            block_data_request,
        }
    }

    pub fn add_blocks(
        &mut self,
        req_id: RangeRequestId,
        blocks: Vec<Arc<SignedBeaconBlock<E>>>,
    ) -> Result<(), String> {
        self.blocks_request.finish(req_id, blocks)
    }

    pub fn add_blobs(
        &mut self,
        req_id: RangeRequestId,
        blobs: Vec<Arc<BlobSidecar<E>>>,
    ) -> Result<(), String> {
        match &mut self.block_data_request {
            RangeBlockDataRequest::NoData => Err("received blobs but expected no data".to_owned()),
            RangeBlockDataRequest::Blobs(req) => req.finish(req_id, blobs),
            RangeBlockDataRequest::DataColumns { .. } => {
                Err("received blobs but expected data columns".to_owned())
            }
        }
    }

    pub fn add_custody_columns(
        &mut self,
        req_id: RangeRequestId,
        columns: Vec<Arc<DataColumnSidecar<E>>>,
    ) -> Result<(), String> {
        match &mut self.block_data_request {
            RangeBlockDataRequest::NoData => {
                Err("received data columns but expected no data".to_owned())
            }
            RangeBlockDataRequest::Blobs(_) => {
                Err("received data columns but expected blobs".to_owned())
            }
            RangeBlockDataRequest::DataColumns { requests, .. } => {
                let req = requests
                    .get_mut(&req_id)
                    .ok_or(format!("unknown data columns by range req_id {req_id}"))?;
                req.finish(req_id, columns)
            }
        }
    }

    /// `None` until every component request has resolved; then the validated coupling.
    #[allow(clippy::type_complexity)]
    pub fn responses<V: SidecarVerifier<E>>(
        &self,
        verifier: &V,
    ) -> Option<Result<(Vec<CoupledBlock<E>>, ColumnCouplingWarnings), RangeResponseError>> {
        let blocks = self.blocks_request.to_finished()?;

        match &self.block_data_request {
            RangeBlockDataRequest::NoData => Some(validate_range_responses(
                &self.request,
                blocks.clone(),
                None,
                None,
                verifier,
            )),
            RangeBlockDataRequest::Blobs(request) => {
                let blobs = request.to_finished()?;
                Some(validate_range_responses(
                    &self.request,
                    blocks.clone(),
                    Some(blobs.clone()),
                    None,
                    verifier,
                ))
            }
            RangeBlockDataRequest::DataColumns {
                requests,
                columns_request,
            } => {
                let mut data_columns = vec![];
                for req in requests.values() {
                    let data = req.to_finished()?;
                    data_columns.extend(data.clone());
                }
                // Across-peer fan-in loses the per-request ordering; restore it for the
                // validator's (slot, index) checks.
                data_columns.sort_by_key(|column| (column.slot(), column.index));

                Some(validate_range_responses(
                    &self.request,
                    blocks.clone(),
                    None,
                    Some((columns_request, data_columns)),
                    verifier,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_input::AcceptAllVerifier;
    use rand::SeedableRng;
    use types::test_utils::{
        NumBlobs, XorShiftRng, build_data_columns, rand_block_with_blobs,
    };
    use types::{ChainSpec, ForkName, Hash256, MainnetEthSpec, Slot};

    type E = MainnetEthSpec;

    fn blocks_request(start_slot: u64, count: u64) -> BlocksByRangeRequest {
        BlocksByRangeRequest {
            start_slot: Slot::new(start_slot),
            count,
        }
    }

    fn chain(
        fork: ForkName,
        slots: &[u64],
        num_blobs: usize,
        spec: &ChainSpec,
        rng: &mut XorShiftRng,
    ) -> (Vec<Arc<SignedBeaconBlock<E>>>, Vec<Arc<BlobSidecar<E>>>) {
        let mut parent_root = Hash256::repeat_byte(0xaa);
        let mut blocks = vec![];
        let mut blobs = vec![];
        for slot in slots {
            let (block, block_blobs) = rand_block_with_blobs::<E>(
                fork,
                NumBlobs::Number(num_blobs),
                Slot::new(*slot),
                parent_root,
                rng,
                spec,
            );
            parent_root = block.canonical_root();
            blocks.push(Arc::new(block));
            blobs.extend(block_blobs.into_iter().map(Arc::new));
        }
        (blocks, blobs)
    }

    fn is_finished(info: &RangeBlockComponentsRequest<E>) -> bool {
        info.responses(&AcceptAllVerifier).is_some()
    }

    #[test]
    fn no_data_batch_finishes_on_blocks() {
        let spec = ForkName::Capella.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (blocks, _) = chain(ForkName::Capella, &[0, 1, 2, 3], 0, &spec, &mut rng);

        let blocks_id = RangeRequestId(1);
        let mut info =
            RangeBlockComponentsRequest::<E>::new(blocks_request(0, 32), blocks_id, None, None);
        assert!(!is_finished(&info));

        info.add_blocks(blocks_id, blocks).unwrap();
        info.responses(&AcceptAllVerifier).unwrap().unwrap();
    }

    #[test]
    fn blob_batch_waits_for_both_streams() {
        let spec = ForkName::Deneb.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let (blocks, blobs) = chain(ForkName::Deneb, &[0, 1, 2], 2, &spec, &mut rng);

        let blocks_id = RangeRequestId(1);
        let blobs_id = RangeRequestId(2);
        let mut info = RangeBlockComponentsRequest::<E>::new(
            blocks_request(0, 32),
            blocks_id,
            Some(blobs_id),
            None,
        );

        info.add_blocks(blocks_id, blocks).unwrap();
        assert!(!is_finished(&info), "still awaiting blobs");

        info.add_blobs(blobs_id, blobs).unwrap();
        let (coupled, _) = info.responses(&AcceptAllVerifier).unwrap().unwrap();
        assert!(coupled.iter().all(|c| c.blobs.len() == 2));
    }

    #[test]
    fn mismatched_request_id_is_rejected() {
        let blocks_id = RangeRequestId(1);
        let mut info =
            RangeBlockComponentsRequest::<E>::new(blocks_request(0, 32), blocks_id, None, None);

        assert!(info.add_blocks(RangeRequestId(9), vec![]).is_err());
        info.add_blocks(blocks_id, vec![]).unwrap();
        assert!(
            info.add_blocks(blocks_id, vec![]).is_err(),
            "a stream cannot complete twice"
        );
    }

    #[test]
    fn unexpected_component_kind_is_rejected() {
        let blocks_id = RangeRequestId(1);
        let mut info =
            RangeBlockComponentsRequest::<E>::new(blocks_request(0, 32), blocks_id, None, None);
        assert!(info.add_blobs(RangeRequestId(2), vec![]).is_err());
        assert!(info.add_custody_columns(RangeRequestId(2), vec![]).is_err());
    }

    #[test]
    fn column_batches_fan_in_across_requests() {
        let spec = ForkName::Fulu.make_genesis_spec(ChainSpec::mainnet());
        let mut rng = XorShiftRng::from_seed([42; 16]);

        let mut parent_root = Hash256::repeat_byte(0xbb);
        let mut blocks = vec![];
        let mut columns_by_block = vec![];
        for slot in [0u64, 1] {
            let (block, _) = rand_block_with_blobs::<E>(
                ForkName::Fulu,
                NumBlobs::Number(1),
                Slot::new(slot),
                parent_root,
                &mut rng,
                &spec,
            );
            parent_root = block.canonical_root();
            let block = Arc::new(block);
            columns_by_block.push(build_data_columns::<E>(&block, &mut rng));
            blocks.push(block);
        }

        // Two column requests batching {1, 2} and {3, 4}.
        let batched_columns = [vec![1u64, 2], vec![3, 4]];
        let all_columns = batched_columns.iter().flatten().copied().collect::<Vec<_>>();
        let columns_request = DataColumnsByRangeRequest {
            start_slot: Slot::new(0),
            count: 32,
            columns: all_columns,
        };
        let blocks_id = RangeRequestId(0);
        let column_ids = vec![RangeRequestId(1), RangeRequestId(2)];
        let mut info = RangeBlockComponentsRequest::<E>::new(
            blocks_request(0, 32),
            blocks_id,
            None,
            Some((column_ids.clone(), columns_request)),
        );

        info.add_blocks(blocks_id, blocks).unwrap();
        assert!(!is_finished(&info));

        for (req_id, indices) in column_ids.iter().zip(batched_columns.iter()) {
            let response = columns_by_block
                .iter()
                .flat_map(|columns| {
                    columns
                        .iter()
                        .filter(|column| indices.contains(&column.index))
                        .cloned()
                })
                .collect::<Vec<_>>();
            info.add_custody_columns(*req_id, response).unwrap();
        }

        let (coupled, warnings) = info.responses(&AcceptAllVerifier).unwrap().unwrap();
        assert!(warnings.is_empty());
        assert!(coupled.iter().all(|c| c.columns.len() == 4));
    }
}
