//! Consensus types and helpers shared by every fork of the beacon state.

pub mod attestation_data;
pub mod beacon_block_header;
pub mod checkpoint;
pub mod constants;
pub mod eth_1_data;
pub mod execution_payload_header;
pub mod fork;
pub mod fork_data;
pub mod fork_name;
pub mod historical_summary;
pub mod misc;
pub mod pending_attestation;
pub mod pending_consolidation;
pub mod pending_deposit;
pub mod pending_partial_withdrawal;
pub mod proposer;
pub mod shuffle;
pub mod signing_data;
pub mod sync_committee;
pub mod validator;
pub mod voluntary_exit;

pub use fork_name::ForkName;
pub use shuffle::{ShuffleError, shuffle_list};
