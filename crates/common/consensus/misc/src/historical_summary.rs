use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;
use vista_merkle::impl_merkle_nodes_for_container;

/// Block and state root summaries of one `SLOTS_PER_HISTORICAL_ROOT` window, Capella onwards.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct HistoricalSummary {
    pub block_summary_root: B256,
    pub state_summary_root: B256,
}

impl_merkle_nodes_for_container!(HistoricalSummary {
    block_summary_root,
    state_summary_root
});
