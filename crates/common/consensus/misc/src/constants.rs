//! Mainnet preset values and protocol constants.

use alloy_primitives::{aliases::B32, fixed_bytes};

// Time
pub const SLOTS_PER_EPOCH: u64 = 32;
pub const MIN_SEED_LOOKAHEAD: u64 = 1;
pub const MAX_SEED_LOOKAHEAD: u64 = 4;
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8192;
pub const EPOCHS_PER_ETH1_VOTING_PERIOD: u64 = 64;
pub const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: u64 = 256;
pub const SHARD_COMMITTEE_PERIOD: u64 = 256;

// State vectors and lists
pub const EPOCHS_PER_HISTORICAL_VECTOR: u64 = 65536;
pub const EPOCHS_PER_SLASHINGS_VECTOR: u64 = 8192;
pub const HISTORICAL_ROOTS_LIMIT: u64 = 16_777_216;
pub const VALIDATOR_REGISTRY_LIMIT: u64 = 1_099_511_627_776;
pub const MAX_ATTESTATIONS: u64 = 128;
pub const PENDING_DEPOSITS_LIMIT: u64 = 134_217_728;
pub const PENDING_PARTIAL_WITHDRAWALS_LIMIT: u64 = 134_217_728;
pub const PENDING_CONSOLIDATIONS_LIMIT: u64 = 262_144;
pub const JUSTIFICATION_BITS_LENGTH: usize = 4;

// Misc
pub const GENESIS_SLOT: u64 = 0;
pub const GENESIS_EPOCH: u64 = 0;
pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;
pub const SHUFFLE_ROUND_COUNT: u64 = 90;
pub const TARGET_COMMITTEE_SIZE: u64 = 128;
pub const MAX_COMMITTEES_PER_SLOT: u64 = 64;
pub const MAX_VALIDATORS_PER_COMMITTEE: u64 = 2048;
pub const SYNC_COMMITTEE_SIZE: u64 = 512;
pub const UNSET_DEPOSIT_REQUESTS_START_INDEX: u64 = u64::MAX;

// Gwei values
pub const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
pub const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
pub const MIN_ACTIVATION_BALANCE: u64 = 32_000_000_000;
pub const MAX_EFFECTIVE_BALANCE_ELECTRA: u64 = 2_048_000_000_000;

// Proposer and sync committee sampling
pub const MAX_RANDOM_BYTE: u64 = 255;
pub const MAX_RANDOM_VALUE: u64 = 65535;

// Rewards
pub const BASE_REWARD_FACTOR: u64 = 64;
pub const PROPOSER_WEIGHT: u64 = 8;
pub const SYNC_REWARD_WEIGHT: u64 = 2;
pub const WEIGHT_DENOMINATOR: u64 = 64;

// Participation flags
pub const TIMELY_SOURCE_FLAG_INDEX: u8 = 0;
pub const TIMELY_TARGET_FLAG_INDEX: u8 = 1;
pub const TIMELY_HEAD_FLAG_INDEX: u8 = 2;

// Domain types
pub const DOMAIN_BEACON_PROPOSER: B32 = fixed_bytes!("0x00000000");
pub const DOMAIN_BEACON_ATTESTER: B32 = fixed_bytes!("0x01000000");
pub const DOMAIN_RANDAO: B32 = fixed_bytes!("0x02000000");
pub const DOMAIN_VOLUNTARY_EXIT: B32 = fixed_bytes!("0x04000000");
pub const DOMAIN_SYNC_COMMITTEE: B32 = fixed_bytes!("0x07000000");

// Generalized indices of the finalized checkpoint root
pub const FINALIZED_ROOT_GINDEX: u64 = 105;
pub const FINALIZED_ROOT_GINDEX_ELECTRA: u64 = 169;

/// Length of `proposer_lookahead`.
pub const PROPOSER_LOOKAHEAD_SLOTS: u64 = (MIN_SEED_LOOKAHEAD + 1) * SLOTS_PER_EPOCH;
