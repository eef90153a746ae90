use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitList, typenum::U2048};
use tree_hash_derive::TreeHash;
use vista_merkle::impl_merkle_nodes_for_container;

use crate::attestation_data::AttestationData;

/// Phase0 record of an included attestation, kept until the epoch after next.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingAttestation {
    pub aggregation_bits: BitList<U2048>,
    pub data: AttestationData,
    #[serde(with = "serde_utils::quoted_u64")]
    pub inclusion_delay: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
}

impl_merkle_nodes_for_container!(PendingAttestation {
    aggregation_bits,
    data,
    inclusion_delay,
    proposer_index
});
