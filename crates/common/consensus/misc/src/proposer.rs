//! Sampling of validators weighted by effective balance.
//!
//! Both the proposer of a slot and the members of a sync committee are drawn by walking the
//! shuffled candidate list and accepting each candidate with probability
//! `effective_balance / max_effective_balance`.

use alloy_primitives::B256;
use ethereum_hashing::hash;

use crate::{
    constants::{
        EFFECTIVE_BALANCE_INCREMENT, MAX_EFFECTIVE_BALANCE, MAX_EFFECTIVE_BALANCE_ELECTRA,
        MAX_RANDOM_BYTE, MAX_RANDOM_VALUE, SYNC_COMMITTEE_SIZE,
    },
    fork_name::ForkName,
    misc::bytes_to_int64,
    shuffle::{ShuffleError, compute_shuffled_index, seed_from_slice},
};

/// Random value used to accept or reject the `i`-th candidate.
///
/// Before Electra this is one byte of `hash(seed || i / 32)`, afterwards two little-endian bytes
/// of `hash(seed || i / 16)`.
fn random_value(fork: ForkName, seed: &B256, i: u64) -> u64 {
    let (per_hash, width) = if fork.is_electra_or_later() {
        (16, 2)
    } else {
        (32, 1)
    };
    let random_bytes = hash(&[seed.as_slice(), &(i / per_hash).to_le_bytes()].concat());
    let offset = ((i % per_hash) * width) as usize;
    bytes_to_int64(&random_bytes[offset..offset + width as usize])
}

fn is_accepted(fork: ForkName, effective_balance: u64, random_value: u64) -> bool {
    if fork.is_electra_or_later() {
        effective_balance * MAX_RANDOM_VALUE >= MAX_EFFECTIVE_BALANCE_ELECTRA * random_value
    } else {
        effective_balance * MAX_RANDOM_BYTE >= MAX_EFFECTIVE_BALANCE * random_value
    }
}

/// Draw `count` candidates from `indices`, repeats allowed.
///
/// `effective_balance_increments` is indexed by validator index and holds effective balances in
/// units of `EFFECTIVE_BALANCE_INCREMENT`.
fn sample_by_effective_balance(
    fork: ForkName,
    effective_balance_increments: &[u16],
    indices: &[u64],
    seed: &[u8],
    count: usize,
) -> Result<Vec<u64>, ShuffleError> {
    let seed = seed_from_slice(seed)?;
    if indices.is_empty() {
        return Err(ShuffleError::EmptyIndices);
    }

    let total = indices.len();
    let mut selected = Vec::with_capacity(count);
    let mut i = 0u64;
    while selected.len() < count {
        let shuffled_index = compute_shuffled_index(i as usize % total, total, seed)?;
        let candidate_index = indices[shuffled_index];
        let increments = *effective_balance_increments
            .get(candidate_index as usize)
            .ok_or(ShuffleError::IndexOutOfRange {
                index: candidate_index as usize,
                count: effective_balance_increments.len(),
            })?;
        let effective_balance = increments as u64 * EFFECTIVE_BALANCE_INCREMENT;
        if is_accepted(fork, effective_balance, random_value(fork, &seed, i)) {
            selected.push(candidate_index);
        }
        i += 1;
    }
    Ok(selected)
}

/// Return from ``indices`` a random index sampled by effective balance.
pub fn compute_proposer_index(
    fork: ForkName,
    effective_balance_increments: &[u16],
    indices: &[u64],
    seed: &[u8],
) -> Result<u64, ShuffleError> {
    let selected =
        sample_by_effective_balance(fork, effective_balance_increments, indices, seed, 1)?;
    selected.first().copied().ok_or(ShuffleError::EmptyIndices)
}

/// Return the validator indices of the sync committee selected with ``seed``.
pub fn compute_sync_committee_indices(
    fork: ForkName,
    effective_balance_increments: &[u16],
    active_indices: &[u64],
    seed: &[u8],
) -> Result<Vec<u64>, ShuffleError> {
    sample_by_effective_balance(
        fork,
        effective_balance_increments,
        active_indices,
        seed,
        SYNC_COMMITTEE_SIZE as usize,
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn increments() -> Vec<u16> {
        (0..1000u16).map(|i| 32 + 32 * (i % 64)).collect()
    }

    #[rstest]
    #[case(ForkName::Phase0, 789)]
    #[case(ForkName::Altair, 789)]
    #[case(ForkName::Electra, 161)]
    #[case(ForkName::Fulu, 161)]
    fn test_compute_proposer_index(#[case] fork: ForkName, #[case] expected: u64) {
        let indices = (0..1000u64).collect::<Vec<_>>();
        assert_eq!(
            compute_proposer_index(fork, &increments(), &indices, &[1u8; 32]).unwrap(),
            expected
        );
    }

    #[test]
    fn test_invalid_seed_length() {
        let indices = (0..10u64).collect::<Vec<_>>();
        assert_eq!(
            compute_proposer_index(ForkName::Phase0, &increments(), &indices, &[1u8; 16]),
            Err(ShuffleError::InvalidSeedLength(16))
        );
    }

    #[test]
    fn test_empty_indices() {
        assert_eq!(
            compute_proposer_index(ForkName::Electra, &increments(), &[], &[1u8; 32]),
            Err(ShuffleError::EmptyIndices)
        );
    }

    #[test]
    fn test_sync_committee_indices() {
        let indices = (0..100u64).collect::<Vec<_>>();
        let committee =
            compute_sync_committee_indices(ForkName::Altair, &increments(), &indices, &[7u8; 32])
                .unwrap();
        assert_eq!(committee.len(), SYNC_COMMITTEE_SIZE as usize);
        assert!(committee.iter().all(|index| *index < 100));
    }
}
