use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    FixedVector, VariableList,
    typenum::{U32, U256},
};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;
use vista_merkle::{
    MerkleError, MerkleNodes, impl_merkle_nodes_for_container, index::GeneralizedIndex,
};

use crate::fork_name::ForkName;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Default)]
pub struct BellatrixExecutionPayloadHeader {
    pub parent_hash: B256,
    pub fee_recipient: Address,
    pub state_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: FixedVector<u8, U256>,
    pub prev_randao: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: alloy_primitives::U256,
    pub block_hash: B256,
    pub transactions_root: B256,
}

impl_merkle_nodes_for_container!(BellatrixExecutionPayloadHeader {
    parent_hash,
    fee_recipient,
    state_root,
    receipts_root,
    logs_bloom,
    prev_randao,
    block_number,
    gas_limit,
    gas_used,
    timestamp,
    extra_data,
    base_fee_per_gas,
    block_hash,
    transactions_root
});

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Default)]
pub struct CapellaExecutionPayloadHeader {
    pub parent_hash: B256,
    pub fee_recipient: Address,
    pub state_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: FixedVector<u8, U256>,
    pub prev_randao: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: alloy_primitives::U256,
    pub block_hash: B256,
    pub transactions_root: B256,
    pub withdrawals_root: B256,
}

impl_merkle_nodes_for_container!(CapellaExecutionPayloadHeader {
    parent_hash,
    fee_recipient,
    state_root,
    receipts_root,
    logs_bloom,
    prev_randao,
    block_number,
    gas_limit,
    gas_used,
    timestamp,
    extra_data,
    base_fee_per_gas,
    block_hash,
    transactions_root,
    withdrawals_root
});

/// Header layout from Deneb on; Electra and Fulu reuse it unchanged.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Default)]
pub struct DenebExecutionPayloadHeader {
    pub parent_hash: B256,
    pub fee_recipient: Address,
    pub state_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: FixedVector<u8, U256>,
    pub prev_randao: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: alloy_primitives::U256,
    pub block_hash: B256,
    pub transactions_root: B256,
    pub withdrawals_root: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub blob_gas_used: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub excess_blob_gas: u64,
}

impl_merkle_nodes_for_container!(DenebExecutionPayloadHeader {
    parent_hash,
    fee_recipient,
    state_root,
    receipts_root,
    logs_bloom,
    prev_randao,
    block_number,
    gas_limit,
    gas_used,
    timestamp,
    extra_data,
    base_fee_per_gas,
    block_hash,
    transactions_root,
    withdrawals_root,
    blob_gas_used,
    excess_blob_gas
});

/// `latest_execution_payload_header` in whichever layout the state's fork uses.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionPayloadHeader {
    Bellatrix(BellatrixExecutionPayloadHeader),
    Capella(CapellaExecutionPayloadHeader),
    Deneb(DenebExecutionPayloadHeader),
}

macro_rules! common_field {
    ($self:ident, $field:ident) => {
        match $self {
            ExecutionPayloadHeader::Bellatrix(header) => &header.$field,
            ExecutionPayloadHeader::Capella(header) => &header.$field,
            ExecutionPayloadHeader::Deneb(header) => &header.$field,
        }
    };
}

impl ExecutionPayloadHeader {
    /// Decode the header layout used by states of `fork`.
    pub fn from_ssz_bytes_by_fork(bytes: &[u8], fork: ForkName) -> Result<Self, DecodeError> {
        match fork {
            ForkName::Phase0 | ForkName::Altair => Err(DecodeError::BytesInvalid(format!(
                "{fork} states carry no execution payload header"
            ))),
            ForkName::Bellatrix => Ok(ExecutionPayloadHeader::Bellatrix(
                BellatrixExecutionPayloadHeader::from_ssz_bytes(bytes)?,
            )),
            ForkName::Capella => Ok(ExecutionPayloadHeader::Capella(
                CapellaExecutionPayloadHeader::from_ssz_bytes(bytes)?,
            )),
            ForkName::Deneb | ForkName::Electra | ForkName::Fulu => Ok(
                ExecutionPayloadHeader::Deneb(DenebExecutionPayloadHeader::from_ssz_bytes(bytes)?),
            ),
        }
    }

    /// The default header of `fork`, as found in states from before the merge.
    pub fn default_for_fork(fork: ForkName) -> Option<Self> {
        match fork {
            ForkName::Phase0 | ForkName::Altair => None,
            ForkName::Bellatrix => Some(ExecutionPayloadHeader::Bellatrix(Default::default())),
            ForkName::Capella => Some(ExecutionPayloadHeader::Capella(Default::default())),
            ForkName::Deneb | ForkName::Electra | ForkName::Fulu => {
                Some(ExecutionPayloadHeader::Deneb(Default::default()))
            }
        }
    }

    pub fn parent_hash(&self) -> B256 {
        *common_field!(self, parent_hash)
    }

    pub fn fee_recipient(&self) -> Address {
        *common_field!(self, fee_recipient)
    }

    pub fn state_root(&self) -> B256 {
        *common_field!(self, state_root)
    }

    pub fn block_hash(&self) -> B256 {
        *common_field!(self, block_hash)
    }

    pub fn block_number(&self) -> u64 {
        *common_field!(self, block_number)
    }

    pub fn gas_limit(&self) -> u64 {
        *common_field!(self, gas_limit)
    }

    pub fn timestamp(&self) -> u64 {
        *common_field!(self, timestamp)
    }

    pub fn base_fee_per_gas(&self) -> alloy_primitives::U256 {
        *common_field!(self, base_fee_per_gas)
    }

    pub fn transactions_root(&self) -> B256 {
        *common_field!(self, transactions_root)
    }

    /// Capella onwards.
    pub fn withdrawals_root(&self) -> Option<B256> {
        match self {
            ExecutionPayloadHeader::Bellatrix(_) => None,
            ExecutionPayloadHeader::Capella(header) => Some(header.withdrawals_root),
            ExecutionPayloadHeader::Deneb(header) => Some(header.withdrawals_root),
        }
    }

    /// Deneb onwards.
    pub fn blob_gas_used(&self) -> Option<u64> {
        match self {
            ExecutionPayloadHeader::Deneb(header) => Some(header.blob_gas_used),
            _ => None,
        }
    }

    /// Deneb onwards.
    pub fn excess_blob_gas(&self) -> Option<u64> {
        match self {
            ExecutionPayloadHeader::Deneb(header) => Some(header.excess_blob_gas),
            _ => None,
        }
    }

    /// A default header marks a state from before the merge transition.
    pub fn is_default(&self) -> bool {
        match self {
            ExecutionPayloadHeader::Bellatrix(header) => *header == Default::default(),
            ExecutionPayloadHeader::Capella(header) => *header == Default::default(),
            ExecutionPayloadHeader::Deneb(header) => *header == Default::default(),
        }
    }

    pub fn tree_hash_root(&self) -> B256 {
        match self {
            ExecutionPayloadHeader::Bellatrix(header) => header.tree_hash_root(),
            ExecutionPayloadHeader::Capella(header) => header.tree_hash_root(),
            ExecutionPayloadHeader::Deneb(header) => header.tree_hash_root(),
        }
    }

    pub fn as_ssz_bytes(&self) -> Vec<u8> {
        match self {
            ExecutionPayloadHeader::Bellatrix(header) => header.as_ssz_bytes(),
            ExecutionPayloadHeader::Capella(header) => header.as_ssz_bytes(),
            ExecutionPayloadHeader::Deneb(header) => header.as_ssz_bytes(),
        }
    }

    pub fn merkle_node(&self, index: GeneralizedIndex) -> Result<B256, MerkleError> {
        match self {
            ExecutionPayloadHeader::Bellatrix(header) => header.merkle_node(index),
            ExecutionPayloadHeader::Capella(header) => header.merkle_node(index),
            ExecutionPayloadHeader::Deneb(header) => header.merkle_node(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_specific_fields() {
        let bellatrix = ExecutionPayloadHeader::Bellatrix(Default::default());
        assert!(bellatrix.is_default());
        assert_eq!(bellatrix.withdrawals_root(), None);

        let deneb = ExecutionPayloadHeader::Deneb(DenebExecutionPayloadHeader {
            block_number: 12,
            blob_gas_used: 131072,
            ..Default::default()
        });
        assert!(!deneb.is_default());
        assert_eq!(deneb.block_number(), 12);
        assert_eq!(deneb.blob_gas_used(), Some(131072));
        assert_eq!(deneb.withdrawals_root(), Some(B256::ZERO));
        assert_eq!(deneb.merkle_node(1).unwrap(), deneb.tree_hash_root());
    }

    #[test]
    fn test_decode_by_fork() {
        let capella = ExecutionPayloadHeader::Capella(CapellaExecutionPayloadHeader {
            gas_limit: 30_000_000,
            ..Default::default()
        });
        let bytes = capella.as_ssz_bytes();
        assert_eq!(
            ExecutionPayloadHeader::from_ssz_bytes_by_fork(&bytes, ForkName::Capella).unwrap(),
            capella
        );
        assert!(ExecutionPayloadHeader::from_ssz_bytes_by_fork(&bytes, ForkName::Deneb).is_err());
        assert!(ExecutionPayloadHeader::from_ssz_bytes_by_fork(&bytes, ForkName::Altair).is_err());
        assert_eq!(
            ExecutionPayloadHeader::default_for_fork(ForkName::Electra)
                .unwrap()
                .blob_gas_used(),
            Some(0)
        );
    }
}
