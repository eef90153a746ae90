//! Merkle proofs against the state root.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::B256;
use vista_consensus_misc::constants::{FINALIZED_ROOT_GINDEX, FINALIZED_ROOT_GINDEX_ELECTRA};
use vista_merkle::{
    CompactMultiproof, MerkleError, Multiproof, PaddedTree,
    index::{
        GeneralizedIndex, get_branch_indices, get_generalized_index_length, get_helper_indices,
        split_generalized_index,
    },
    tree_depth,
};

use crate::{errors::StateError, view::BeaconStateView};

impl BeaconStateView {
    /// Values of the nodes at `indices`, in request order.
    ///
    /// Requests are grouped per field so each field subtree is built at most once.
    pub fn merkle_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, StateError> {
        let fields = self.fields();
        let depth = tree_depth(fields.len());

        let mut nodes = vec![B256::ZERO; indices.len()];
        let mut upper = vec![];
        let mut per_field: BTreeMap<usize, Vec<(usize, GeneralizedIndex)>> = BTreeMap::new();
        for (position, &index) in indices.iter().enumerate() {
            if index == 0 {
                return Err(StateError::InvalidGeneralizedIndex(index));
            }
            match split_generalized_index(index, depth) {
                Some((field, relative)) if get_generalized_index_length(index) > depth => {
                    if field as usize >= fields.len() {
                        return Err(StateError::InvalidGeneralizedIndex(index));
                    }
                    per_field
                        .entry(field as usize)
                        .or_default()
                        .push((position, relative));
                }
                _ => upper.push((position, index)),
            }
        }

        if !upper.is_empty() {
            let roots = fields
                .iter()
                .map(|field| field.field_root())
                .collect::<Result<Vec<_>, _>>()?;
            let tree = PaddedTree::new(roots, depth)?;
            for (position, index) in upper {
                nodes[position] = tree.node(index)?;
            }
        }

        for (field, requests) in per_field {
            let relative = requests.iter().map(|(_, index)| *index).collect::<Vec<_>>();
            let values = fields[field]
                .field_nodes(&relative)
                .map_err(|err| match err {
                    StateError::Merkle(MerkleError::InvalidGeneralizedIndex(bad)) => {
                        let original = requests
                            .iter()
                            .position(|(_, index)| *index == bad)
                            .map(|at| indices[requests[at].0])
                            .unwrap_or(indices[requests[0].0]);
                        StateError::InvalidGeneralizedIndex(original)
                    }
                    err => err,
                })?;
            for ((position, _), value) in requests.into_iter().zip(values) {
                nodes[position] = value;
            }
        }

        Ok(nodes)
    }

    /// Sibling hashes proving the node at ``gindex``, ordered from the node up.
    pub fn get_single_proof(&self, gindex: GeneralizedIndex) -> Result<Vec<B256>, StateError> {
        if gindex == 0 {
            return Err(StateError::InvalidGeneralizedIndex(gindex));
        }
        let mut indices = vec![gindex];
        indices.extend(get_branch_indices(gindex));
        let mut nodes = self.merkle_nodes(&indices)?;
        nodes.remove(0);
        Ok(nodes)
    }

    /// Read every node named by a compact multiproof `descriptor`.
    pub fn create_multi_proof(&self, descriptor: &[u8]) -> Result<CompactMultiproof, StateError> {
        CompactMultiproof::create(descriptor, |indices| self.merkle_nodes(indices))
    }

    /// Classic multiproof of `indices` with the minimal helper set.
    pub fn create_multiproof(&self, indices: &[GeneralizedIndex]) -> Result<Multiproof, StateError> {
        if indices.is_empty() {
            return Err(MerkleError::EmptyIndices.into());
        }
        let helpers = get_helper_indices(indices);
        let values = self.merkle_nodes(&[indices, &helpers].concat())?;
        let (leaf_values, helper_values) = values.split_at(indices.len());
        Ok(Multiproof {
            leaves: indices
                .iter()
                .copied()
                .zip(leaf_values.iter().copied())
                .collect::<HashMap<_, _>>(),
            proofs: helpers
                .into_iter()
                .zip(helper_values.iter().copied())
                .collect::<BTreeMap<_, _>>(),
        })
    }

    pub fn finalized_root_gindex(&self) -> GeneralizedIndex {
        match self.electra.is_some() {
            true => FINALIZED_ROOT_GINDEX_ELECTRA,
            false => FINALIZED_ROOT_GINDEX,
        }
    }

    /// Branch proving ``finalized_checkpoint.root`` against the state root.
    pub fn get_finalized_root_proof(&self) -> Result<Vec<B256>, StateError> {
        self.get_single_proof(self.finalized_root_gindex())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tree_hash::TreeHash;
    use vista_consensus_misc::ForkName;
    use vista_merkle::{
        calculate_merkle_root, compute_descriptor, index::concat_generalized_indices,
        is_valid_normalized_merkle_branch,
    };

    use super::*;
    use crate::test_utils::TestStateBuilder;

    #[rstest]
    #[case(ForkName::Phase0, 105)]
    #[case(ForkName::Altair, 105)]
    #[case(ForkName::Deneb, 105)]
    #[case(ForkName::Electra, 169)]
    #[case(ForkName::Fulu, 169)]
    fn test_finalized_root_proof(#[case] fork: ForkName, #[case] gindex: u64) {
        let state = TestStateBuilder::new(fork).slot(200).build().unwrap();
        assert_eq!(state.finalized_root_gindex(), gindex);

        let proof = state.get_finalized_root_proof().unwrap();
        let root = state.hash_tree_root().unwrap();
        assert!(is_valid_normalized_merkle_branch(
            state.finalized_checkpoint().root,
            &proof,
            gindex,
            root
        ));
    }

    #[test]
    fn test_proofs_into_field_subtrees() {
        let state = TestStateBuilder::new(ForkName::Electra)
            .validator_count(20)
            .build()
            .unwrap();
        let root = state.hash_tree_root().unwrap();

        // validators is field 11 of a 64-leaf container: validators[5].effective_balance
        let validators = 64 + 11;
        let element = concat_generalized_indices(&[validators, 2, (1 << 40) + 5, 8 + 2]);
        let leaf = state.get_validator(5).unwrap().effective_balance.tree_hash_root();
        let proof = state.get_single_proof(element).unwrap();
        assert_eq!(calculate_merkle_root(leaf, &proof, element), root);

        // Length leaf of the balances list.
        let length = concat_generalized_indices(&[64 + 12, 3]);
        let proof = state.get_single_proof(length).unwrap();
        let leaf = state.merkle_nodes(&[length]).unwrap()[0];
        assert_eq!(leaf[0], 20);
        assert_eq!(calculate_merkle_root(leaf, &proof, length), root);

        // The root itself needs no siblings.
        assert!(state.get_single_proof(1).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_indices() {
        let state = TestStateBuilder::new(ForkName::Altair).build().unwrap();
        assert_eq!(
            state.get_single_proof(0),
            Err(StateError::InvalidGeneralizedIndex(0))
        );
        // Altair has 24 fields; leaf 30 is padding and has no subtree below it.
        let padding_child = (32 + 30) * 2;
        assert_eq!(
            state.get_single_proof(padding_child),
            Err(StateError::InvalidGeneralizedIndex(padding_child))
        );
        // The slot is a single chunk.
        let below_slot = (32 + 2) * 2;
        assert_eq!(
            state.get_single_proof(below_slot),
            Err(StateError::InvalidGeneralizedIndex(below_slot))
        );
    }

    #[test]
    fn test_compact_multiproof() {
        let state = TestStateBuilder::new(ForkName::Capella).build().unwrap();
        let root = state.hash_tree_root().unwrap();
        let descriptor = compute_descriptor(&[32 + 2, 32 + 20, 105]).unwrap();

        let proof = state.create_multi_proof(&descriptor).unwrap();
        assert_eq!(proof.calculate_root().unwrap(), root);
        assert_eq!(proof.descriptor, descriptor);
        assert!(state.create_multi_proof(&[0x00]).is_err());
    }

    #[test]
    fn test_classic_multiproof() {
        let state = TestStateBuilder::new(ForkName::Bellatrix).build().unwrap();
        let root = state.hash_tree_root().unwrap();
        let indices = [32 + 2, 105];

        let proof = state.create_multiproof(&indices).unwrap();
        assert_eq!(proof.leaves[&(32 + 2)], state.slot().tree_hash_root());
        assert_eq!(proof.leaves[&105], state.finalized_checkpoint().root);
        assert_eq!(proof.calculate_root().unwrap(), root);
        assert!(!proof.proofs.contains_key(&52));
        assert!(state.create_multiproof(&[]).is_err());
    }
}
