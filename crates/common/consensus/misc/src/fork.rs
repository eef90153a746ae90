use alloy_primitives::aliases::B32;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;
use vista_merkle::impl_merkle_nodes_for_container;

#[derive(
    Debug, PartialEq, Clone, Copy, Serialize, Deserialize, Encode, Decode, TreeHash, Eq, Default,
)]
pub struct Fork {
    pub previous_version: B32,
    pub current_version: B32,
    #[serde(with = "serde_utils::quoted_u64")]
    pub epoch: u64,
}

impl Fork {
    pub const UNSCHEDULED_EPOCH: u64 = u64::MAX;

    /// Fork version in effect at ``epoch``.
    pub fn version_at_epoch(&self, epoch: u64) -> B32 {
        if epoch < self.epoch {
            self.previous_version
        } else {
            self.current_version
        }
    }
}

impl_merkle_nodes_for_container!(Fork {
    previous_version,
    current_version,
    epoch
});
