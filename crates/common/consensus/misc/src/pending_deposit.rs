use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;
use vista_bls::{BLSSignature, PubKey};
use vista_merkle::impl_merkle_nodes_for_container;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingDeposit {
    pub pubkey: PubKey,
    pub withdrawal_credentials: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
    pub signature: BLSSignature,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
}

impl_merkle_nodes_for_container!(PendingDeposit {
    pubkey,
    withdrawal_credentials,
    amount,
    signature,
    slot
});
