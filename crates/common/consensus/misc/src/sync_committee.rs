use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, typenum::U512};
use tree_hash_derive::TreeHash;
use vista_bls::PubKey;
use vista_merkle::impl_merkle_nodes_for_container;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncCommittee {
    pub pubkeys: FixedVector<PubKey, U512>,
    pub aggregate_pubkey: PubKey,
}

impl_merkle_nodes_for_container!(SyncCommittee {
    pubkeys,
    aggregate_pubkey
});
