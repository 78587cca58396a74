use alloy_primitives::B256 as Hash256;
use ethereum_hashing::{ZERO_HASHES, hash32_concat};

const MAX_TREE_DEPTH: usize = 32;

/// Right-padded sparse binary merkle tree.
#[derive(Debug, PartialEq)]
pub enum MerkleTree {
    /// Finalised leaf, or the root of a fully specified subtree.
    Leaf(Hash256),
    /// Internal node with a cached hash and two subtrees.
    Node(Hash256, Box<Self>, Box<Self>),
    /// An all-zero subtree of the given depth.
    Zero(usize),
}

#[derive(Debug, PartialEq, Clone)]
pub enum MerkleTreeError {
    /// Requested depth exceeds the supported maximum.
    DepthTooSmall,
    /// More leaves were supplied than a tree of this depth can hold.
    MerkleTreeFull,
    /// Leaf index out of bounds for the tree depth.
    InvalidIndex,
}

impl MerkleTree {
    /// Create a new merkle tree of the given depth from a slice of leaves.
    ///
    /// The tree is right-padded with zero subtrees.
    pub fn create(leaves: &[Hash256], depth: usize) -> Self {
        use MerkleTree::*;

        if leaves.is_empty() {
            return Zero(depth);
        }

        match depth {
            0 => {
                debug_assert_eq!(leaves.len(), 1);
                Leaf(leaves[0])
            }
            _ => {
                // Split leaves into the maximum number the left subtree can hold.
                let subtree_capacity = 2usize.pow(depth as u32 - 1);
                let (left_leaves, right_leaves) = if leaves.len() <= subtree_capacity {
                    (leaves, &[] as &[Hash256])
                } else {
                    leaves.split_at(subtree_capacity)
                };

                let left_subtree = MerkleTree::create(left_leaves, depth - 1);
                let right_subtree = MerkleTree::create(right_leaves, depth - 1);
                let hash = Hash256::from(hash32_concat(
                    left_subtree.hash().as_slice(),
                    right_subtree.hash().as_slice(),
                ));

                Node(hash, Box::new(left_subtree), Box::new(right_subtree))
            }
        }
    }

    /// Retrieve the root hash of this merkle tree.
    pub fn hash(&self) -> Hash256 {
        match *self {
            MerkleTree::Leaf(h) => h,
            MerkleTree::Node(h, _, _) => h,
            MerkleTree::Zero(depth) => Hash256::from(ZERO_HASHES[depth]),
        }
    }

    /// Get a reference to the left and right subtrees if they exist.
    pub fn left_and_right_branches(&self) -> Option<(&Self, &Self)> {
        match *self {
            MerkleTree::Leaf(_) | MerkleTree::Zero(0) => None,
            MerkleTree::Node(_, ref l, ref r) => Some((l, r)),
            MerkleTree::Zero(depth) => Some((&ZERO_NODES[depth - 1], &ZERO_NODES[depth - 1])),
        }
    }

    /// Return the leaf at `index` and a merkle proof of its inclusion.
    ///
    /// The `depth` parameter must equal the depth of the tree.
    pub fn generate_proof(
        &self,
        index: usize,
        depth: usize,
    ) -> Result<(Hash256, Vec<Hash256>), MerkleTreeError> {
        if depth > MAX_TREE_DEPTH || index >= 2usize.pow(depth as u32) {
            return Err(MerkleTreeError::InvalidIndex);
        }

        let mut proof = vec![];
        let mut current_node = self;
        let mut current_depth = depth;
        while current_depth > 0 {
            let ith_bit = (index >> (current_depth - 1)) & 0x01;
            // The tree is padded, so a zero subtree can stand in for either child.
            let (left, right) = current_node
                .left_and_right_branches()
                .ok_or(MerkleTreeError::DepthTooSmall)?;

            // Go right, include the left branch in the proof.
            if ith_bit == 1 {
                proof.push(left.hash());
                current_node = right;
            } else {
                proof.push(right.hash());
                current_node = left;
            }
            current_depth -= 1;
        }

        debug_assert_eq!(proof.len(), depth);

        proof.reverse();

        Ok((current_node.hash(), proof))
    }
}

/// Zero-subtree nodes indexed by depth, shared by all padded trees.
static ZERO_NODES: std::sync::LazyLock<Vec<MerkleTree>> = std::sync::LazyLock::new(|| {
    (0..=MAX_TREE_DEPTH).map(MerkleTree::Zero).collect()
});

/// Verify a proof that `leaf` exists at `index` in a merkle tree rooted at `root`.
///
/// The `branch` argument is the main component of the proof: it should be a list of internal
/// node hashes such that the root can be reconstructed (in bottom-up order).
pub fn verify_merkle_proof(
    leaf: Hash256,
    branch: &[Hash256],
    depth: usize,
    index: usize,
    root: Hash256,
) -> bool {
    if branch.len() == depth {
        merkle_root_from_branch(leaf, branch, depth, index) == root
    } else {
        false
    }
}

/// Compute a root hash from a leaf and a merkle proof.
pub fn merkle_root_from_branch(
    leaf: Hash256,
    branch: &[Hash256],
    depth: usize,
    index: usize,
) -> Hash256 {
    assert_eq!(branch.len(), depth, "proof length should equal depth");

    let mut merkle_root = leaf.as_slice().to_vec();

    for (i, leaf) in branch.iter().enumerate().take(depth) {
        let ith_bit = (index >> i) & 0x01;
        if ith_bit == 1 {
            merkle_root = hash32_concat(leaf.as_slice(), &merkle_root)[..].to_vec();
        } else {
            merkle_root = hash32_concat(&merkle_root, leaf.as_slice())[..].to_vec();
        }
    }

    Hash256::from_slice(&merkle_root)
}
