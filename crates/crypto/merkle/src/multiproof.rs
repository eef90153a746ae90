//! https://ethereum.github.io/consensus-specs/ssz/merkle-proofs/#merkle-multiproofs

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::{
    errors::MerkleError,
    hash::hash_concat,
    index::{
        GeneralizedIndex, generalized_index_parent, generalized_index_sibling,
        get_helper_indices,
    },
};

/// Multiproof is a structure that contains the leaves to be verified with
/// their corresponding proofs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Multiproof {
    /// The leaves to be verified.
    /// Keyed by their generalized indices.
    pub leaves: HashMap<u64, B256>,

    /// The proof nodes.
    /// Keyed by their generalized indices.
    /// Keys of ``proofs`` will be sorted in descending order when generating a single proof.
    pub proofs: BTreeMap<u64, B256>,
}

impl Multiproof {
    /// Generate a multiproof for the given generalized indices, reading nodes through `node`.
    ///
    /// Helper nodes implied by another requested leaf are left out.
    pub fn generate<F>(indices: &[GeneralizedIndex], mut node: F) -> Result<Self, MerkleError>
    where
        F: FnMut(GeneralizedIndex) -> Result<B256, MerkleError>,
    {
        if indices.is_empty() {
            return Err(MerkleError::EmptyIndices);
        }

        let leaves = indices
            .iter()
            .map(|&index| Ok((index, node(index)?)))
            .collect::<Result<HashMap<u64, B256>, MerkleError>>()?;
        let proofs = get_helper_indices(indices)
            .into_iter()
            .map(|index| Ok((index, node(index)?)))
            .collect::<Result<BTreeMap<u64, B256>, MerkleError>>()?;

        Ok(Self { leaves, proofs })
    }

    /// Helper nodes in descending generalized-index order.
    pub fn helpers(&self) -> Vec<B256> {
        self.proofs.values().rev().copied().collect()
    }

    /// Return the root of the multiproof (``calculate_multi_merkle_root``).
    pub fn calculate_root(&self) -> Result<B256, MerkleError> {
        let leaf_indices = self.leaves.keys().cloned().collect::<Vec<_>>();
        let helper_indices = get_helper_indices(&leaf_indices);

        if self.proofs.len() != helper_indices.len() {
            return Err(MerkleError::InvalidProof(format!(
                "proof length ({}) does not match helper indices length ({})",
                self.proofs.len(),
                helper_indices.len(),
            )));
        }

        // ``objects`` is a map of all the indices to their corresponding nodes (hash values).
        let mut objects = HashMap::new();
        for (index, node) in self.leaves.iter().chain(self.proofs.iter()) {
            objects.insert(*index, *node);
        }

        let mut keys = objects.keys().cloned().collect::<Vec<_>>();
        keys.sort_by(|a, b| b.cmp(a)); // Sort in descending order

        let mut pos = 0;
        while pos < keys.len() {
            let key = keys[pos];
            let parent_index = generalized_index_parent(key);

            let sibling_present = objects.contains_key(&generalized_index_sibling(key));
            let parent_missing = !objects.contains_key(&parent_index);

            if key > 1 && sibling_present && parent_missing {
                let right_index = key | 1;
                let left_index = generalized_index_sibling(right_index);
                let left_input = objects.get(&left_index).ok_or_else(|| {
                    MerkleError::InvalidProof(format!("missing left node at index {left_index}"))
                })?;
                let right_input = objects.get(&right_index).ok_or_else(|| {
                    MerkleError::InvalidProof(format!("missing right node at index {right_index}"))
                })?;

                let parent = hash_concat(left_input.as_slice(), right_input.as_slice());
                objects.insert(parent_index, parent);
                keys.push(parent_index);
            }
            pos += 1;
        }

        objects
            .get(&1)
            .copied()
            .ok_or_else(|| MerkleError::InvalidProof("missing root node at index 1".to_string()))
    }

    /// Verify the multiproof against the given root.
    pub fn verify(&self, root: B256) -> Result<(), MerkleError> {
        let calculated = self.calculate_root()?;
        if calculated != root {
            return Err(MerkleError::InvalidProof(format!(
                "expected root {root:?}, but got {calculated:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::generalized_index_from_leaf_index, is_valid_normalized_merkle_branch,
        tree::PaddedTree,
    };

    const DEPTH: u64 = 3;

    #[test]
    fn test_generate_and_verify_multiproof() {
        let leaves = vec![
            B256::from_slice(&[0xAA; 32]),
            B256::from_slice(&[0xBB; 32]),
            B256::from_slice(&[0xCC; 32]),
            B256::from_slice(&[0xDD; 32]),
            B256::from_slice(&[0xEE; 32]),
            B256::from_slice(&[0xFF; 32]),
            B256::from_slice(&[0x11; 32]),
            B256::from_slice(&[0x22; 32]),
        ];
        let tree = PaddedTree::new(leaves, DEPTH).unwrap();

        let target_indices = [2, 7].map(|index| generalized_index_from_leaf_index(index, DEPTH));
        let multiproof = Multiproof::generate(&target_indices, |index| tree.node(index)).unwrap();

        assert_eq!(multiproof.leaves.len(), target_indices.len());

        // We need four nodes to prove those two leaves.
        // See this [illustration](https://hackmd.io/_uploads/H1ZVOVille.png).
        assert_eq!(multiproof.proofs.len(), 4);

        // Should succeed to verify the multiproof.
        multiproof.verify(tree.root()).unwrap();
    }

    #[test]
    fn test_single_leaf_multiproof_is_a_branch() {
        let leaves = (0..8u8).map(B256::repeat_byte).collect::<Vec<_>>();
        let tree = PaddedTree::new(leaves.clone(), DEPTH).unwrap();

        let index = generalized_index_from_leaf_index(5, DEPTH);
        let multiproof = Multiproof::generate(&[index], |index| tree.node(index)).unwrap();
        let branch = multiproof.helpers();

        assert_eq!(branch, tree.proof(5).unwrap());
        assert!(is_valid_normalized_merkle_branch(
            leaves[5],
            &branch,
            index,
            tree.root()
        ));
    }
}
