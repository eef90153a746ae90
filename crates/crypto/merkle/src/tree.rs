use std::sync::LazyLock;

use alloy_primitives::B256;

use crate::{
    errors::MerkleError,
    hash::hash_concat,
    index::{GeneralizedIndex, ensure_non_zero, get_generalized_index_length},
};

/// Deepest subtree a 64-bit generalized index can address.
pub const MAX_TREE_DEPTH: usize = 64;

/// Roots of all-zero subtrees, indexed by subtree height.
pub static ZERO_HASHES: LazyLock<[B256; MAX_TREE_DEPTH + 1]> = LazyLock::new(|| {
    let mut hashes = [B256::ZERO; MAX_TREE_DEPTH + 1];
    for height in 1..=MAX_TREE_DEPTH {
        hashes[height] = hash_concat(hashes[height - 1].as_slice(), hashes[height - 1].as_slice());
    }
    hashes
});

pub fn zero_hash(height: u64) -> B256 {
    ZERO_HASHES[(height as usize).min(MAX_TREE_DEPTH)]
}

/// Depth of the smallest tree with at least `count` leaves.
pub fn tree_depth(count: usize) -> u64 {
    count.max(1).next_power_of_two().trailing_zeros() as u64
}

/// A Merkle tree over `leaves`, virtually padded with zero leaves up to `2^depth`.
///
/// Only the non-zero prefix of every layer is stored, so sparse lists with huge limits stay
/// cheap.
#[derive(Debug, Clone)]
pub struct PaddedTree {
    depth: u64,
    /// `layers[0]` are the leaves, `layers[depth]` holds the root.
    layers: Vec<Vec<B256>>,
}

impl PaddedTree {
    pub fn new(leaves: Vec<B256>, depth: u64) -> Result<Self, MerkleError> {
        if depth as usize > MAX_TREE_DEPTH
            || (depth < 64 && leaves.len() as u128 > 1u128 << depth)
        {
            return Err(MerkleError::TooManyLeaves {
                leaves: leaves.len(),
                depth,
            });
        }

        let mut layers = Vec::with_capacity(depth as usize + 1);
        layers.push(leaves);
        for height in 0..depth {
            let below = &layers[height as usize];
            let layer = below
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or_else(|| zero_hash(height));
                    hash_concat(pair[0].as_slice(), right.as_slice())
                })
                .collect::<Vec<_>>();
            layers.push(layer);
        }

        Ok(Self { depth, layers })
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    pub fn root(&self) -> B256 {
        self.layer_node(self.depth, 0)
    }

    /// Return the node at `index`, counted from this tree's root.
    pub fn node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        ensure_non_zero(index)?;
        let level = get_generalized_index_length(index);
        if level > self.depth {
            return Err(MerkleError::InvalidGeneralizedIndex(index));
        }
        Ok(self.layer_node(self.depth - level, index - (1 << level)))
    }

    /// Sibling hashes from the leaf at `leaf_index` up to the root.
    pub fn proof(&self, leaf_index: u64) -> Result<Vec<B256>, MerkleError> {
        if self.depth < 64 && leaf_index >= 1 << self.depth {
            return Err(MerkleError::InvalidGeneralizedIndex(leaf_index));
        }
        Ok((0..self.depth)
            .map(|height| self.layer_node(height, (leaf_index >> height) ^ 1))
            .collect())
    }

    fn layer_node(&self, height: u64, position: u64) -> B256 {
        self.layers
            .get(height as usize)
            .and_then(|layer| layer.get(position as usize))
            .copied()
            .unwrap_or_else(|| zero_hash(height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_valid_merkle_branch;

    #[test]
    fn test_padded_tree() {
        let leaves = vec![
            B256::from_slice(&[0xAA; 32]),
            B256::from_slice(&[0xBB; 32]),
            B256::from_slice(&[0xCC; 32]),
        ];

        let node_2 = hash_concat(leaves[0].as_slice(), leaves[1].as_slice());
        let node_3 = hash_concat(leaves[2].as_slice(), B256::ZERO.as_slice());
        let root = hash_concat(node_2.as_slice(), node_3.as_slice());

        let tree = PaddedTree::new(leaves.clone(), 2).unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.node(1).unwrap(), root);
        assert_eq!(tree.node(3).unwrap(), node_3);
        assert_eq!(tree.node(7).unwrap(), B256::ZERO);
        assert_eq!(
            tree.node(8),
            Err(MerkleError::InvalidGeneralizedIndex(8))
        );

        for (index, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(index as u64).unwrap();
            assert!(is_valid_merkle_branch(*leaf, &proof, 2, index as u64, root));
        }
    }

    #[test]
    fn test_sparse_deep_tree_matches_zero_hashes() {
        let tree = PaddedTree::new(vec![], 40).unwrap();
        assert_eq!(tree.root(), zero_hash(40));

        let leaf = B256::repeat_byte(7);
        let tree = PaddedTree::new(vec![leaf], 40).unwrap();
        let mut expected = leaf;
        for height in 0..40 {
            expected = hash_concat(expected.as_slice(), zero_hash(height).as_slice());
        }
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_too_many_leaves() {
        assert!(PaddedTree::new(vec![B256::ZERO; 3], 1).is_err());
    }
}
