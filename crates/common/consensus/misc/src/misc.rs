use std::ops::Range;

use alloy_primitives::{B256, aliases::B32};
use tree_hash::TreeHash;

use crate::{
    constants::{
        EPOCHS_PER_SYNC_COMMITTEE_PERIOD, GENESIS_EPOCH, MAX_COMMITTEES_PER_SLOT,
        MAX_SEED_LOOKAHEAD, SLOTS_PER_EPOCH, TARGET_COMMITTEE_SIZE,
    },
    fork_data::ForkData,
    signing_data::SigningData,
};

pub fn compute_signing_root<SSZObject: TreeHash>(ssz_object: SSZObject, domain: B256) -> B256 {
    SigningData {
        object_root: ssz_object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

// Return the integer deserialization of ``data`` interpreted as ``ENDIANNESS``-endian.
pub fn bytes_to_int64(slice: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = slice.len().min(8);
    bytes[..len].copy_from_slice(&slice[..len]);
    u64::from_le_bytes(bytes)
}

/// Return the epoch number at ``slot``.
pub fn compute_epoch_at_slot(slot: u64) -> u64 {
    slot / SLOTS_PER_EPOCH
}

/// Return the start slot of ``epoch``.
pub fn compute_start_slot_at_epoch(epoch: u64) -> u64 {
    epoch * SLOTS_PER_EPOCH
}

/// Return the last slot of ``epoch``.
pub fn compute_end_slot_at_epoch(epoch: u64) -> u64 {
    compute_start_slot_at_epoch(epoch + 1) - 1
}

/// Epoch of the checkpoint a state at ``slot`` would produce: the epoch itself on a boundary
/// slot, the next one otherwise.
pub fn compute_checkpoint_epoch_at_state_slot(slot: u64) -> u64 {
    slot.div_ceil(SLOTS_PER_EPOCH)
}

/// Return the epoch during which validator activations and exits initiated in ``epoch`` take
/// effect.
pub fn compute_activation_exit_epoch(epoch: u64) -> u64 {
    epoch + 1 + MAX_SEED_LOOKAHEAD
}

/// Return the previous epoch (unless ``epoch`` is ``GENESIS_EPOCH``).
pub fn compute_previous_epoch(epoch: u64) -> u64 {
    if epoch == GENESIS_EPOCH {
        GENESIS_EPOCH
    } else {
        epoch - 1
    }
}

pub fn is_start_slot_of_epoch(slot: u64) -> bool {
    slot % SLOTS_PER_EPOCH == 0
}

pub fn compute_sync_committee_period(epoch: u64) -> u64 {
    epoch / EPOCHS_PER_SYNC_COMMITTEE_PERIOD
}

pub fn compute_sync_committee_period_at_slot(slot: u64) -> u64 {
    compute_sync_committee_period(compute_epoch_at_slot(slot))
}

/// Return the domain for the ``domain_type`` and ``fork_version``.
pub fn compute_domain(
    domain_type: B32,
    fork_version: B32,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = ForkData {
        current_version: fork_version,
        genesis_validators_root,
    }
    .compute_fork_data_root();
    let mut domain = B256::ZERO;
    domain[..4].copy_from_slice(domain_type.as_slice());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

/// Number of committees per slot for ``active_validator_count`` active validators.
pub fn compute_committee_count_per_slot(active_validator_count: usize) -> u64 {
    (active_validator_count as u64 / SLOTS_PER_EPOCH / TARGET_COMMITTEE_SIZE)
        .clamp(1, MAX_COMMITTEES_PER_SLOT)
}

/// Positions in the epoch's shuffled indices that form committee ``index`` of ``count``.
pub fn compute_committee_range(list_size: usize, index: u64, count: u64) -> Range<usize> {
    let start = (list_size as u64 * index) / count;
    let end = (list_size as u64 * (index + 1)) / count;
    start as usize..end as usize
}
