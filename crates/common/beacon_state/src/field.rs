//! Object-safe access to the fields of a state, so every fork can be walked as one field list.

use alloy_primitives::B256;
use ssz::{BYTES_PER_LENGTH_OFFSET, Encode};
use ssz_types::{BitVector, typenum::U4};
use tree_hash::TreeHash;
use vista_consensus_misc::{
    beacon_block_header::BeaconBlockHeader, checkpoint::Checkpoint, eth_1_data::Eth1Data,
    execution_payload_header::ExecutionPayloadHeader, fork::Fork,
};
use vista_merkle::{MerkleNodes, index::GeneralizedIndex};

use crate::{
    errors::StateError,
    lazy::{Lazy, LazyValue},
    view::{EpochAttestations, ProposerLookahead},
};

pub(crate) trait StateField: Sync {
    fn is_ssz_fixed_len(&self) -> bool;

    /// Bytes the field occupies in the fixed part of the container.
    fn fixed_part_len(&self) -> usize;

    fn ssz_bytes_len(&self) -> usize;

    fn ssz_append(&self, buf: &mut Vec<u8>);

    fn field_root(&self) -> Result<B256, StateError>;

    /// Nodes of the field's own subtree, indexed from the field root.
    fn field_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, StateError>;
}

macro_rules! impl_eager_state_field {
    ($($type:ty),+ $(,)?) => {
        $(
            impl StateField for $type {
                fn is_ssz_fixed_len(&self) -> bool {
                    <$type as Encode>::is_ssz_fixed_len()
                }

                fn fixed_part_len(&self) -> usize {
                    match <$type as Encode>::is_ssz_fixed_len() {
                        true => <$type as Encode>::ssz_fixed_len(),
                        false => BYTES_PER_LENGTH_OFFSET,
                    }
                }

                fn ssz_bytes_len(&self) -> usize {
                    Encode::ssz_bytes_len(self)
                }

                fn ssz_append(&self, buf: &mut Vec<u8>) {
                    Encode::ssz_append(self, buf)
                }

                fn field_root(&self) -> Result<B256, StateError> {
                    Ok(self.tree_hash_root())
                }

                fn field_nodes(
                    &self,
                    indices: &[GeneralizedIndex],
                ) -> Result<Vec<B256>, StateError> {
                    Ok(self.merkle_nodes(indices)?)
                }
            }
        )+
    };
}

impl_eager_state_field!(
    u64,
    B256,
    Fork,
    BeaconBlockHeader,
    Eth1Data,
    BitVector<U4>,
    Checkpoint,
    EpochAttestations,
    ProposerLookahead,
);

impl StateField for ExecutionPayloadHeader {
    fn is_ssz_fixed_len(&self) -> bool {
        false
    }

    fn fixed_part_len(&self) -> usize {
        BYTES_PER_LENGTH_OFFSET
    }

    fn ssz_bytes_len(&self) -> usize {
        self.as_ssz_bytes().len()
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.as_ssz_bytes())
    }

    fn field_root(&self) -> Result<B256, StateError> {
        Ok(self.tree_hash_root())
    }

    fn field_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, StateError> {
        indices
            .iter()
            .map(|&index| Ok(self.merkle_node(index)?))
            .collect()
    }
}

impl<T: LazyValue> StateField for Lazy<T> {
    fn is_ssz_fixed_len(&self) -> bool {
        <T as Encode>::is_ssz_fixed_len()
    }

    fn fixed_part_len(&self) -> usize {
        match <T as Encode>::is_ssz_fixed_len() {
            true => <T as Encode>::ssz_fixed_len(),
            false => BYTES_PER_LENGTH_OFFSET,
        }
    }

    fn ssz_bytes_len(&self) -> usize {
        Lazy::ssz_bytes_len(self)
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        Lazy::ssz_append(self, buf)
    }

    fn field_root(&self) -> Result<B256, StateError> {
        self.tree_hash_root()
    }

    fn field_nodes(&self, indices: &[GeneralizedIndex]) -> Result<Vec<B256>, StateError> {
        if indices == [1] {
            return Ok(vec![self.tree_hash_root()?]);
        }
        Ok(self.get()?.merkle_nodes(indices)?)
    }
}
