//! https://ethereum.github.io/consensus-specs/ssz/merkle-proofs

use alloy_primitives::B256;

pub mod compact;
pub mod errors;
pub mod hash;
pub mod index;
pub mod multiproof;
pub mod nodes;
pub mod tree;

pub use compact::{CompactMultiproof, compute_descriptor};
pub use errors::MerkleError;
pub use hash::{hash_concat, mix_in_length};
use index::{get_generalized_index_bit, get_generalized_index_length, get_subtree_index};
pub use multiproof::Multiproof;
pub use nodes::{MerkleNodes, container_node, list_node, list_nodes, node_root};
pub use tree::{PaddedTree, tree_depth, zero_hash};

/// Recompute the root from a leaf and its sibling hashes, ordered from the leaf up.
pub fn calculate_merkle_root(leaf: B256, proof: &[B256], generalized_index: u64) -> B256 {
    proof
        .iter()
        .enumerate()
        .fold(leaf, |value, (height, sibling)| {
            if get_generalized_index_bit(generalized_index, height as u64) {
                hash_concat(sibling.as_slice(), value.as_slice())
            } else {
                hash_concat(value.as_slice(), sibling.as_slice())
            }
        })
}

pub fn is_valid_merkle_branch(
    leaf: B256,
    branch: &[B256],
    depth: u64,
    index: u64,
    root: B256,
) -> bool {
    if branch.len() < depth as usize {
        return false;
    }
    let mut value = leaf;
    for i in 0..depth {
        if get_generalized_index_bit(index, i) {
            value = hash_concat(branch[i as usize].as_slice(), value.as_slice());
        } else {
            value = hash_concat(value.as_slice(), branch[i as usize].as_slice());
        }
    }
    value == root
}

pub fn is_valid_normalized_merkle_branch(
    leaf: B256,
    branch: &[B256],
    generalized_index: u64,
    root: B256,
) -> bool {
    if generalized_index == 0 {
        return false;
    }
    let depth = get_generalized_index_length(generalized_index);
    let index = get_subtree_index(generalized_index);
    let Some(num_extra) = branch.len().checked_sub(depth as usize) else {
        return false;
    };
    if branch[..num_extra].iter().any(|node| *node != B256::ZERO) {
        return false;
    }
    is_valid_merkle_branch(leaf, &branch[num_extra..], depth, index, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_branches() {
        let leaves = vec![
            B256::from_slice(&[0xAA; 32]),
            B256::from_slice(&[0xBB; 32]),
            B256::from_slice(&[0xCC; 32]),
            B256::from_slice(&[0xDD; 32]),
        ];

        let depth = tree_depth(leaves.len());

        let node_2: B256 = hash_concat(leaves[0].as_slice(), leaves[1].as_slice());
        let node_3: B256 = hash_concat(leaves[2].as_slice(), leaves[3].as_slice());

        let root: B256 = hash_concat(node_2.as_slice(), node_3.as_slice());

        let tree = PaddedTree::new(leaves.clone(), depth).unwrap();

        assert_eq!(tree.root(), root);

        for (index, leaf) in leaves.iter().enumerate() {
            let index = index as u64;
            let proof = tree.proof(index).unwrap();
            assert!(is_valid_merkle_branch(*leaf, &proof, depth, index, root));
            assert!(is_valid_normalized_merkle_branch(
                *leaf,
                &proof,
                index + (1 << depth),
                root
            ));
            assert_eq!(
                calculate_merkle_root(*leaf, &proof, index + (1 << depth)),
                root
            );
        }

        assert!(!is_valid_merkle_branch(leaves[0], &[], depth, 0, root));
    }
}
