//! Compact multiproofs.
//!
//! The descriptor is a pre-order walk of the proof's subtree, one bit per node: `0` for an
//! internal node, `1` for a node whose value is carried in `leaves`. The bits are packed
//! MSB-first and zero padded to a whole byte.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::{
    errors::MerkleError,
    hash::hash_concat,
    index::{GeneralizedIndex, get_generalized_index_length, get_helper_indices},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactMultiproof {
    /// Node values in descriptor order.
    pub leaves: Vec<B256>,
    pub descriptor: Vec<u8>,
}

impl CompactMultiproof {
    /// Build a proof by reading the nodes named by `descriptor` through `nodes`, which returns
    /// one node per index in order.
    pub fn create<F, E>(descriptor: &[u8], nodes: F) -> Result<Self, E>
    where
        F: FnOnce(&[GeneralizedIndex]) -> Result<Vec<B256>, E>,
        E: From<MerkleError>,
    {
        let indices = descriptor_to_generalized_indices(descriptor)?;
        let leaves = nodes(&indices)?;
        if leaves.len() != indices.len() {
            return Err(MerkleError::InvalidProof(format!(
                "read {} nodes for {} indices",
                leaves.len(),
                indices.len()
            ))
            .into());
        }
        Ok(Self {
            leaves,
            descriptor: descriptor.to_vec(),
        })
    }

    /// Recompute the root from the descriptor and leaves alone.
    pub fn calculate_root(&self) -> Result<B256, MerkleError> {
        let bits = descriptor_to_bits(&self.descriptor)?;
        let mut bits = bits.into_iter();
        let mut leaves = self.leaves.iter();
        let root = fold_subtree(&mut bits, &mut leaves, 0)?;
        if leaves.next().is_some() {
            return Err(MerkleError::InvalidProof(
                "more leaves than the descriptor names".to_string(),
            ));
        }
        Ok(root)
    }

    pub fn verify(&self, root: B256) -> Result<(), MerkleError> {
        let calculated = self.calculate_root()?;
        if calculated != root {
            return Err(MerkleError::InvalidProof(format!(
                "expected root {root}, but got {calculated}"
            )));
        }
        Ok(())
    }
}

fn fold_subtree<'a>(
    bits: &mut impl Iterator<Item = bool>,
    leaves: &mut impl Iterator<Item = &'a B256>,
    depth: u64,
) -> Result<B256, MerkleError> {
    if depth >= 64 {
        return Err(MerkleError::InvalidDescriptor("tree deeper than 64 levels"));
    }
    match bits.next() {
        Some(true) => leaves.next().copied().ok_or_else(|| {
            MerkleError::InvalidProof("fewer leaves than the descriptor names".to_string())
        }),
        Some(false) => {
            let left = fold_subtree(bits, leaves, depth + 1)?;
            let right = fold_subtree(bits, leaves, depth + 1)?;
            Ok(hash_concat(left.as_slice(), right.as_slice()))
        }
        None => Err(MerkleError::InvalidDescriptor("descriptor ends early")),
    }
}

/// Compute the descriptor proving `indices` together.
pub fn compute_descriptor(indices: &[GeneralizedIndex]) -> Result<Vec<u8>, MerkleError> {
    let nodes = proof_nodes(indices)?;

    let mut bits = vec![];
    for index in nodes {
        bits.extend(std::iter::repeat_n(false, index.trailing_zeros() as usize));
        bits.push(true);
    }

    Ok(bits
        .chunks(8)
        .map(|byte| {
            byte.iter()
                .enumerate()
                .fold(0u8, |acc, (position, &bit)| acc | ((bit as u8) << (7 - position)))
        })
        .collect())
}

/// The requested indices plus their helpers, in pre-order.
fn proof_nodes(indices: &[GeneralizedIndex]) -> Result<Vec<GeneralizedIndex>, MerkleError> {
    if indices.is_empty() {
        return Err(MerkleError::EmptyIndices);
    }
    for &index in indices {
        if index == 0 {
            return Err(MerkleError::InvalidGeneralizedIndex(index));
        }
    }
    let mut nodes = indices.to_vec();
    nodes.extend(get_helper_indices(indices));
    nodes.sort_by_key(|&index| preorder_key(index));
    nodes.dedup();

    // A requested node must not hide another one below it.
    for pair in nodes.windows(2) {
        let (upper, lower) = (pair[0], pair[1]);
        let shift = get_generalized_index_length(lower)
            .checked_sub(get_generalized_index_length(upper))
            .unwrap_or_default();
        if shift > 0 && lower >> shift == upper {
            return Err(MerkleError::InvalidGeneralizedIndex(lower));
        }
    }
    Ok(nodes)
}

/// Left-aligns the path bits of `index` so that sorting yields pre-order.
fn preorder_key(index: GeneralizedIndex) -> (u64, u64) {
    let length = get_generalized_index_length(index);
    (index << (63 - length), length)
}

/// Unpack and validate the descriptor bits, dropping the padding.
pub fn descriptor_to_bits(descriptor: &[u8]) -> Result<Vec<bool>, MerkleError> {
    let mut bits = vec![];
    let mut zeros = 0usize;
    let mut ones = 0usize;
    let mut complete = false;

    for (byte_index, byte) in descriptor.iter().enumerate() {
        for position in 0..8 {
            let bit = (byte >> (7 - position)) & 1 == 1;
            if complete {
                if bit {
                    return Err(MerkleError::InvalidDescriptor("padding bits must be zero"));
                }
                continue;
            }
            if bit {
                ones += 1;
            } else {
                zeros += 1;
            }
            bits.push(bit);
            if ones > zeros {
                complete = true;
                if byte_index != descriptor.len() - 1 {
                    return Err(MerkleError::InvalidDescriptor(
                        "descriptor has trailing bytes",
                    ));
                }
            }
        }
    }

    if !complete {
        return Err(MerkleError::InvalidDescriptor("descriptor ends early"));
    }
    Ok(bits)
}

/// Generalized indices of the nodes named by `descriptor`, in descriptor order.
pub fn descriptor_to_generalized_indices(
    descriptor: &[u8],
) -> Result<Vec<GeneralizedIndex>, MerkleError> {
    let bits = descriptor_to_bits(descriptor)?;
    let mut indices = vec![];
    let mut index: GeneralizedIndex = 1;

    for bit in bits {
        if !bit {
            if get_generalized_index_length(index) >= 63 {
                return Err(MerkleError::InvalidDescriptor("tree deeper than 64 levels"));
            }
            index *= 2;
            continue;
        }
        indices.push(index);
        while index & 1 == 1 && index > 1 {
            index >>= 1;
        }
        if index == 1 {
            break;
        }
        index += 1;
    }

    Ok(indices)
}
