//! The node's column custody assignment.
//!
//! From Fulu onwards each node custodies a deterministic subset of data columns, derived from
//! its node id, and samples a superset of those for the availability check. This view is
//! computed once at startup; validator-driven custody growth is the chain layer's concern and
//! arrives here as a fresh context.

use ethereum_hashing::hash_fixed;
use std::collections::HashSet;
use std::sync::Arc;
use types::{ChainSpec, ColumnIndex};

/// How the node was configured to participate in column custody.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NodeCustodyType {
    /// Subscribe to all columns.
    Supernode,
    /// Subscribe to half the columns, enough to reconstruct the full data on demand.
    SemiSupernode,
    /// Only the minimal custody requirement.
    #[default]
    Fullnode,
}

impl NodeCustodyType {
    pub fn custody_group_count(&self, spec: &ChainSpec) -> u64 {
        match self {
            Self::Supernode => spec.number_of_custody_groups,
            Self::SemiSupernode => spec.number_of_custody_groups / 2,
            Self::Fullnode => spec.custody_requirement,
        }
    }
}

/// The immutable per-node view of sampled and custody column indices.
///
/// `custody_columns` is always a subset of `sampled_columns`.
#[derive(Debug, Clone)]
pub struct CustodyContext {
    sampled_columns: Arc<HashSet<ColumnIndex>>,
    custody_columns: Arc<HashSet<ColumnIndex>>,
}

impl CustodyContext {
    /// Derive the custody assignment for `node_id` with an explicit custody-group count.
    pub fn new(node_id: [u8; 32], custody_group_count: u64, spec: &ChainSpec) -> Self {
        let cgc = custody_group_count.min(spec.number_of_custody_groups);
        let sampling_count = cgc.max(spec.samples_per_slot).min(spec.number_of_custody_groups);

        let groups = compute_custody_groups(node_id, sampling_count, spec);
        let custody_groups = &groups[..cgc as usize];

        let custody_columns = custody_groups
            .iter()
            .flat_map(|group| columns_for_custody_group(*group, spec))
            .collect::<HashSet<_>>();
        let sampled_columns = groups
            .iter()
            .flat_map(|group| columns_for_custody_group(*group, spec))
            .collect::<HashSet<_>>();

        Self {
            sampled_columns: Arc::new(sampled_columns),
            custody_columns: Arc::new(custody_columns),
        }
    }

    /// Derive the custody assignment implied by the node type flags.
    pub fn new_with_type(
        node_id: [u8; 32],
        node_custody_type: NodeCustodyType,
        spec: &ChainSpec,
    ) -> Self {
        Self::new(node_id, node_custody_type.custody_group_count(spec), spec)
    }

    /// A context with explicit column sets, for testing.
    pub fn from_columns(
        sampled: HashSet<ColumnIndex>,
        custody: HashSet<ColumnIndex>,
    ) -> Self {
        debug_assert!(custody.is_subset(&sampled));
        Self {
            sampled_columns: Arc::new(sampled),
            custody_columns: Arc::new(custody),
        }
    }

    pub fn sampled_columns(&self) -> Arc<HashSet<ColumnIndex>> {
        self.sampled_columns.clone()
    }

    pub fn custody_columns(&self) -> Arc<HashSet<ColumnIndex>> {
        self.custody_columns.clone()
    }

    pub fn num_sampled_columns(&self) -> usize {
        self.sampled_columns.len()
    }
}

/// Deterministically expand `node_id` into `count` distinct custody groups, in derivation
/// order so that a prefix of the list is stable as `count` grows.
fn compute_custody_groups(node_id: [u8; 32], count: u64, spec: &ChainSpec) -> Vec<u64> {
    let mut groups = Vec::with_capacity(count as usize);
    let mut current_id = u64::from_le_bytes(
        node_id[..8]
            .try_into()
            .expect("node id has at least 8 bytes"),
    );
    while (groups.len() as u64) < count {
        let digest = hash_fixed(&current_id.to_le_bytes());
        let group = u64::from_le_bytes(
            digest[..8]
                .try_into()
                .expect("digest has at least 8 bytes"),
        ) % spec.number_of_custody_groups;
        if !groups.contains(&group) {
            groups.push(group);
        }
        current_id = current_id.wrapping_add(1);
    }
    groups
}

/// The columns assigned to a custody group.
fn columns_for_custody_group(group: u64, spec: &ChainSpec) -> Vec<ColumnIndex> {
    let columns_per_group = spec.number_of_columns / spec.number_of_custody_groups;
    (0..columns_per_group)
        .map(|i| spec.number_of_custody_groups * i + group)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ChainSpec;

    #[test]
    fn custody_is_subset_of_sampled() {
        let spec = ChainSpec::mainnet();
        let ctx = CustodyContext::new([7; 32], spec.custody_requirement, &spec);
        assert!(ctx.custody_columns().is_subset(&ctx.sampled_columns()));
        assert_eq!(ctx.custody_columns().len(), spec.custody_requirement as usize);
        assert_eq!(ctx.num_sampled_columns(), spec.samples_per_slot as usize);
    }

    #[test]
    fn derivation_is_deterministic() {
        let spec = ChainSpec::mainnet();
        let a = CustodyContext::new([1; 32], 4, &spec);
        let b = CustodyContext::new([1; 32], 4, &spec);
        assert_eq!(a.sampled_columns(), b.sampled_columns());
        assert_eq!(a.custody_columns(), b.custody_columns());
    }

    #[test]
    fn supernode_custodies_every_column() {
        let spec = ChainSpec::mainnet();
        let ctx = CustodyContext::new_with_type([9; 32], NodeCustodyType::Supernode, &spec);
        assert_eq!(ctx.custody_columns().len(), spec.number_of_columns as usize);
        assert_eq!(ctx.num_sampled_columns(), spec.number_of_columns as usize);
    }

    #[test]
    fn growing_cgc_preserves_custody_prefix() {
        let spec = ChainSpec::mainnet();
        let small = CustodyContext::new([3; 32], 4, &spec);
        let large = CustodyContext::new([3; 32], 16, &spec);
        assert!(small.custody_columns().is_subset(&large.custody_columns()));
    }
}
