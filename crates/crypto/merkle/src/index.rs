//! Generalized index arithmetic.
//!
//! https://ethereum.github.io/consensus-specs/ssz/merkle-proofs/#generalized-merkle-tree-index

use std::collections::BTreeSet;

use crate::errors::MerkleError;

/// ``LeafIndex`` is the index of a leaf in the **bottom** layer of the ``tree``.
pub type LeafIndex = u64;

/// ``GeneralizedIndex`` is the index of a node in the ``tree``.
pub type GeneralizedIndex = u64;

/// Return the given bit of a generalized index.
/// Note: It is fine to pass ``LeafIndex`` to this function,
/// as the result will be the same.
pub fn get_generalized_index_bit(index: GeneralizedIndex, position: u64) -> bool {
    (index & (1 << position)) > 0
}

/// Depth of the node below the root, i.e. ``floor(log2(index))``.
///
/// `index` must be non-zero.
pub fn get_generalized_index_length(index: GeneralizedIndex) -> u64 {
    63 - index.leading_zeros() as u64
}

pub fn generalized_index_child(
    index: GeneralizedIndex,
    right_side: bool,
) -> GeneralizedIndex {
    index * 2 + right_side as GeneralizedIndex
}

pub fn generalized_index_parent(index: GeneralizedIndex) -> GeneralizedIndex {
    index / 2
}

pub fn generalized_index_sibling(index: GeneralizedIndex) -> GeneralizedIndex {
    index ^ 1
}

pub fn get_subtree_index(generalized_index: GeneralizedIndex) -> LeafIndex {
    generalized_index - (1 << get_generalized_index_length(generalized_index))
}

/// Return the generalized index of the leaf index with ``depth``.
pub fn generalized_index_from_leaf_index(leaf_index: LeafIndex, depth: u64) -> GeneralizedIndex {
    leaf_index + (1 << depth)
}

/// Given generalized indices i1 for A -> B, i2 for B -> C .... i_n for Y -> Z, returns
/// the generalized index for A -> Z.
pub fn concat_generalized_indices(indices: &[GeneralizedIndex]) -> GeneralizedIndex {
    indices.iter().fold(1, |acc, &index| {
        let depth = get_generalized_index_length(index);
        (acc << depth) | get_subtree_index(index)
    })
}

/// Splits `index` at `depth` levels below the root.
///
/// Returns the position of the ancestor at `depth` among its level and the generalized index of
/// `index` relative to that ancestor, or `None` when `index` sits above `depth`.
pub fn split_generalized_index(
    index: GeneralizedIndex,
    depth: u64,
) -> Option<(u64, GeneralizedIndex)> {
    let length = get_generalized_index_length(index);
    if length < depth {
        return None;
    }
    let shift = length - depth;
    let anchor = index >> shift;
    let relative = (1 << shift) | (index & ((1 << shift) - 1));
    Some((anchor - (1 << depth), relative))
}

/// Get the generalized indices of the sister chunks along the path from the chunk with the
/// given tree index to the root.
pub fn get_branch_indices(tree_index: GeneralizedIndex) -> Vec<GeneralizedIndex> {
    let mut branch = vec![generalized_index_sibling(tree_index)];
    while let Some(&last) = branch.last() {
        if last <= 1 {
            break;
        }
        branch.push(generalized_index_sibling(generalized_index_parent(last)));
    }
    branch.pop();
    branch
}

/// Get the generalized indices of the chunks along the path from the chunk with the
/// given tree index to the root.
pub fn get_path_indices(tree_index: GeneralizedIndex) -> Vec<GeneralizedIndex> {
    let mut path = vec![tree_index];
    while let Some(&last) = path.last() {
        if last <= 1 {
            break;
        }
        path.push(generalized_index_parent(last));
    }
    path.pop();
    path
}

/// Get the generalized indices of all "extra" chunks in the tree needed to prove the chunks with
/// the given generalized indices. Note that the decreasing order is chosen deliberately to
/// ensure equivalence to the order of hashes in a regular single-item Merkle proof in the
/// single-item case.
pub fn get_helper_indices(indices: &[GeneralizedIndex]) -> Vec<GeneralizedIndex> {
    let mut all_helper_indices = BTreeSet::new();
    let mut all_path_indices = BTreeSet::new();
    for &index in indices {
        all_helper_indices.extend(get_branch_indices(index));
        all_path_indices.extend(get_path_indices(index));
    }
    all_helper_indices
        .difference(&all_path_indices)
        .copied()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}

pub(crate) fn ensure_non_zero(index: GeneralizedIndex) -> Result<(), MerkleError> {
    if index == 0 {
        return Err(MerkleError::InvalidGeneralizedIndex(index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(3, 1)]
    #[case(105, 6)]
    #[case(169, 7)]
    fn test_generalized_index_length(#[case] index: u64, #[case] expected: u64) {
        assert_eq!(get_generalized_index_length(index), expected);
    }

    #[test]
    fn test_helper_indices() {
        assert_eq!(get_helper_indices(&[42]), vec![43, 20, 11, 4, 3]);
        // 10 and 11 are siblings, so neither needs the other as a helper.
        assert_eq!(get_helper_indices(&[10, 11]), vec![4, 3]);
    }

    #[test]
    fn test_concat_and_split() {
        // Field 20 of a depth-6 container, then the right child of that field.
        let field = generalized_index_from_leaf_index(20, 6);
        let index = concat_generalized_indices(&[field, 3]);
        assert_eq!(index, 169);
        assert_eq!(split_generalized_index(index, 6), Some((20, 3)));
        assert_eq!(split_generalized_index(index, 7), Some((41, 1)));
        assert_eq!(split_generalized_index(3, 2), None);
    }
}
