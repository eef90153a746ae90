//! Navigation of SSZ values by generalized index.

use alloy_primitives::{Address, B256, U256, aliases::B32};
use ssz_types::{BitList, BitVector, FixedVector, VariableList, typenum::Unsigned};
use tree_hash::{TreeHash, TreeHashType};

use crate::{
    errors::MerkleError,
    hash::{length_chunk, mix_in_length},
    index::{
        GeneralizedIndex, ensure_non_zero, get_generalized_index_length, split_generalized_index,
    },
    tree::{PaddedTree, tree_depth},
};

/// A value whose Merkle tree can be walked node by node.
pub trait MerkleNodes: TreeHash {
    /// Return the node at `index`, counted from this value's own root (index 1).
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError>;

    /// Return the nodes at `indices` in request order.
    ///
    /// Sequences override this to hash their data subtree once per batch.
    fn merkle_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, MerkleError> {
        indices.iter().map(|&index| self.merkle_node(index)).collect()
    }
}

/// Root of `value`; lets the container macro avoid naming `tree_hash` at the call site.
pub fn node_root<T: TreeHash>(value: &T) -> B256 {
    value.tree_hash_root()
}

fn leaf_node<T: TreeHash>(value: &T, index: GeneralizedIndex) -> Result<B256, MerkleError> {
    match index {
        1 => Ok(value.tree_hash_root()),
        _ => Err(MerkleError::InvalidGeneralizedIndex(index)),
    }
}

macro_rules! impl_leaf_nodes {
    ($($type:ty),+ $(,)?) => {
        $(
            impl MerkleNodes for $type {
                fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
                    leaf_node(self, index)
                }
            }
        )+
    };
}

impl_leaf_nodes!(bool, u8, u16, u32, u64, B32, B256, Address, U256);

/// Node lookup for a container whose field roots are `chunks`.
///
/// Indices below the field level are handed to `descend` together with the field position.
pub fn container_node<F>(
    chunks: &[B256],
    index: GeneralizedIndex,
    descend: F,
) -> Result<B256, MerkleError>
where
    F: FnOnce(usize, GeneralizedIndex) -> Result<B256, MerkleError>,
{
    ensure_non_zero(index)?;
    let depth = tree_depth(chunks.len());
    if get_generalized_index_length(index) <= depth {
        return PaddedTree::new(chunks.to_vec(), depth)?.node(index);
    }
    let (position, relative) =
        split_generalized_index(index, depth).ok_or(MerkleError::InvalidGeneralizedIndex(index))?;
    if position as usize >= chunks.len() {
        return Err(MerkleError::InvalidGeneralizedIndex(index));
    }
    descend(position as usize, relative)
}

/// Chunks of a homogeneous sequence: packed bytes for basic elements, element roots otherwise.
pub fn sequence_chunks<'a, T, I>(items: I) -> Vec<B256>
where
    T: TreeHash + 'a,
    I: IntoIterator<Item = &'a T>,
{
    match T::tree_hash_type() {
        TreeHashType::Basic => {
            let mut bytes = vec![];
            for item in items {
                bytes.extend_from_slice(&item.tree_hash_packed_encoding());
            }
            pack_bytes(&bytes)
        }
        _ => items.into_iter().map(TreeHash::tree_hash_root).collect(),
    }
}

/// Split `bytes` into zero padded 32-byte chunks.
pub fn pack_bytes(bytes: &[u8]) -> Vec<B256> {
    bytes
        .chunks(32)
        .map(|slice| {
            let mut chunk = [0u8; 32];
            chunk[..slice.len()].copy_from_slice(slice);
            B256::from(chunk)
        })
        .collect()
}

/// Maximum number of chunks a sequence of `limit` elements of `T` occupies.
pub fn chunk_limit<T: TreeHash>(limit: usize) -> usize {
    match T::tree_hash_type() {
        TreeHashType::Basic => limit.div_ceil(T::tree_hash_packing_factor()),
        _ => limit,
    }
}

fn sequence_data_nodes<T: MerkleNodes>(
    items: &[T],
    limit: usize,
    indices: &[GeneralizedIndex],
) -> Result<Vec<B256>, MerkleError> {
    let depth = tree_depth(chunk_limit::<T>(limit));
    let within_data = |index: GeneralizedIndex| get_generalized_index_length(index) <= depth;

    let tree = match indices.iter().any(|&index| index != 0 && within_data(index)) {
        true => Some(PaddedTree::new(sequence_chunks(items), depth)?),
        false => None,
    };

    indices
        .iter()
        .map(|&index| {
            ensure_non_zero(index)?;
            match &tree {
                Some(tree) if within_data(index) => tree.node(index),
                _ => element_node(items, depth, index),
            }
        })
        .collect()
}

/// Node strictly below the chunk level of a sequence: only composite elements have one.
fn element_node<T: MerkleNodes>(
    items: &[T],
    depth: u64,
    index: GeneralizedIndex,
) -> Result<B256, MerkleError> {
    if T::tree_hash_type() == TreeHashType::Basic {
        return Err(MerkleError::InvalidGeneralizedIndex(index));
    }
    let (position, relative) =
        split_generalized_index(index, depth).ok_or(MerkleError::InvalidGeneralizedIndex(index))?;
    items
        .get(position as usize)
        .ok_or(MerkleError::InvalidGeneralizedIndex(index))?
        .merkle_node(relative)
}

fn first_node(nodes: Vec<B256>, index: GeneralizedIndex) -> Result<B256, MerkleError> {
    nodes
        .into_iter()
        .next()
        .ok_or(MerkleError::InvalidGeneralizedIndex(index))
}

/// Node lookup below a list root: index 2 roots the data subtree, index 3 is the length leaf.
pub fn list_node<F>(
    root: B256,
    length: usize,
    index: GeneralizedIndex,
    data_node: F,
) -> Result<B256, MerkleError>
where
    F: FnOnce(GeneralizedIndex) -> Result<B256, MerkleError>,
{
    ensure_non_zero(index)?;
    match index {
        1 => Ok(root),
        3 => Ok(length_chunk(length)),
        _ => match split_generalized_index(index, 1) {
            Some((0, relative)) => data_node(relative),
            _ => Err(MerkleError::InvalidGeneralizedIndex(index)),
        },
    }
}

/// Batched form of [`list_node`]: the data subtree is asked for every node in one call.
pub fn list_nodes<F>(
    length: usize,
    indices: &[GeneralizedIndex],
    data_nodes: F,
) -> Result<Vec<B256>, MerkleError>
where
    F: FnOnce(&[GeneralizedIndex]) -> Result<Vec<B256>, MerkleError>,
{
    let mut relative = Vec::with_capacity(indices.len());
    for &index in indices {
        ensure_non_zero(index)?;
        match index {
            // The list root is the data root mixed with the length.
            1 => relative.push(1),
            3 => {}
            _ => match split_generalized_index(index, 1) {
                Some((0, data)) => relative.push(data),
                _ => return Err(MerkleError::InvalidGeneralizedIndex(index)),
            },
        }
    }

    let mut data = data_nodes(&relative)?.into_iter();
    indices
        .iter()
        .map(|&index| match index {
            3 => Ok(length_chunk(length)),
            _ => {
                let node = data
                    .next()
                    .ok_or(MerkleError::InvalidGeneralizedIndex(index))?;
                Ok(match index {
                    1 => mix_in_length(node, length),
                    _ => node,
                })
            }
        })
        .collect()
}

impl<T: MerkleNodes, N: Unsigned> MerkleNodes for FixedVector<T, N> {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        first_node(self.merkle_nodes(&[index])?, index)
    }

    fn merkle_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, MerkleError> {
        sequence_data_nodes(self, N::to_usize(), indices)
    }
}

impl<T: MerkleNodes, N: Unsigned> MerkleNodes for VariableList<T, N> {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        first_node(self.merkle_nodes(&[index])?, index)
    }

    fn merkle_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, MerkleError> {
        list_nodes(self.len(), indices, |relative| {
            sequence_data_nodes(self, N::to_usize(), relative)
        })
    }
}

impl<N: Unsigned + Clone> MerkleNodes for BitVector<N> {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        ensure_non_zero(index)?;
        let depth = tree_depth(N::to_usize().div_ceil(256));
        PaddedTree::new(pack_bytes(self.as_slice()), depth)?.node(index)
    }
}

impl<N: Unsigned + Clone> MerkleNodes for BitList<N> {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        let data_root = || -> Result<PaddedTree, MerkleError> {
            PaddedTree::new(
                pack_bytes(self.as_slice()),
                tree_depth(N::to_usize().div_ceil(256)),
            )
        };
        let root = mix_in_length(data_root()?.root(), self.len());
        list_node(root, self.len(), index, |relative| {
            data_root()?.node(relative)
        })
    }
}

/// Implement [`MerkleNodes`] for an SSZ container by listing its fields in declaration order.
#[macro_export]
macro_rules! impl_merkle_nodes_for_container {
    ($type:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::MerkleNodes for $type {
            #[allow(unused_assignments)]
            fn merkle_node(
                &self,
                index: $crate::index::GeneralizedIndex,
            ) -> Result<::alloy_primitives::B256, $crate::MerkleError> {
                let chunks = [$($crate::node_root(&self.$field)),+];
                $crate::container_node(&chunks, index, |field, relative| {
                    let mut remaining = field;
                    $(
                        if remaining == 0 {
                            return $crate::MerkleNodes::merkle_node(&self.$field, relative);
                        }
                        remaining -= 1;
                    )+
                    Err($crate::MerkleError::InvalidGeneralizedIndex(index))
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use ssz_types::typenum::{U4, U8};
    use tree_hash_derive::TreeHash;

    use super::*;
    use crate::{calculate_merkle_root, hash::hash_concat};

    #[derive(TreeHash)]
    struct Pair {
        left: u64,
        right: B256,
    }

    impl_merkle_nodes_for_container!(Pair { left, right });

    #[derive(TreeHash)]
    struct Outer {
        slot: u64,
        pairs: VariableList<Pair, U8>,
        balances: VariableList<u64, U8>,
        roots: FixedVector<B256, U4>,
    }

    impl_merkle_nodes_for_container!(Outer {
        slot,
        pairs,
        balances,
        roots
    });

    fn outer() -> Outer {
        Outer {
            slot: 9,
            pairs: VariableList::new(vec![
                Pair {
                    left: 1,
                    right: B256::repeat_byte(1),
                },
                Pair {
                    left: 2,
                    right: B256::repeat_byte(2),
                },
            ])
            .unwrap(),
            balances: VariableList::new(vec![5, 6, 7, 8, 9]).unwrap(),
            roots: FixedVector::new(vec![B256::repeat_byte(3); 4]).unwrap(),
        }
    }

    fn proof_for(value: &Outer, index: u64) -> Vec<B256> {
        let mut proof = vec![];
        let mut node = index;
        while node > 1 {
            proof.push(value.merkle_node(node ^ 1).unwrap());
            node /= 2;
        }
        proof
    }

    #[test]
    fn test_container_root_matches_tree_hash() {
        let value = outer();
        assert_eq!(value.merkle_node(1).unwrap(), value.tree_hash_root());
        assert_eq!(
            value.merkle_node(5).unwrap(),
            value.pairs.tree_hash_root()
        );
        let pair_root = hash_concat(
            value.merkle_node(2).unwrap().as_slice(),
            value.merkle_node(3).unwrap().as_slice(),
        );
        assert_eq!(pair_root, value.tree_hash_root());
    }

    #[test]
    fn test_descend_into_list_element() {
        let value = outer();
        // pairs (5) -> data (10) -> depth 3 -> element 1 (81) -> field `right` (163).
        let index = 163;
        let leaf = value.merkle_node(index).unwrap();
        assert_eq!(leaf, B256::repeat_byte(2));
        let proof = proof_for(&value, index);
        assert_eq!(
            calculate_merkle_root(leaf, &proof, index),
            value.tree_hash_root()
        );
    }

    #[test]
    fn test_length_leaf_and_padding() {
        let value = outer();
        // balances (6) -> length leaf (13).
        assert_eq!(value.merkle_node(13).unwrap(), length_chunk(5));
        // Padding element of `pairs` exists as a zero chunk.
        assert_eq!(value.merkle_node(87).unwrap(), B256::ZERO);
        // ...but cannot be descended into.
        assert!(value.merkle_node(175).is_err());
        // Basic list chunks cannot be split further.
        assert!(value.merkle_node(24).is_ok());
        assert!(value.merkle_node(48).is_err());
    }

    #[test]
    fn test_batch_matches_single_lookups() {
        let value = outer();
        let indices = [1, 5, 13, 24, 163, 87];
        let batch = value.merkle_nodes(&indices).unwrap();
        for (index, node) in indices.iter().zip(batch) {
            assert_eq!(value.merkle_node(*index).unwrap(), node);
        }
        assert_eq!(
            value.pairs.merkle_nodes(&[1, 3]).unwrap(),
            vec![value.pairs.tree_hash_root(), length_chunk(2)]
        );
        assert!(value.balances.merkle_nodes(&[2, 0]).is_err());
    }

    #[test]
    fn test_zero_index_is_invalid() {
        assert_eq!(
            outer().merkle_node(0),
            Err(MerkleError::InvalidGeneralizedIndex(0))
        );
    }
}
