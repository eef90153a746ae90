//! Swap-or-not shuffling.
//!
//! https://ethereum.github.io/consensus-specs/specs/phase0/beacon-chain/#compute_shuffled_index

use std::cmp::max;

use alloy_primitives::B256;
use ethereum_hashing::hash;
use thiserror::Error;

use crate::{constants::SHUFFLE_ROUND_COUNT, misc::bytes_to_int64};

const SEED_SIZE: usize = 32;
const PIVOT_VIEW_SIZE: usize = SEED_SIZE + 1;
const TOTAL_SIZE: usize = PIVOT_VIEW_SIZE + 4;

/// Largest round count a shuffle accepts; the round number is hashed as one byte.
pub const MAX_SHUFFLE_ROUNDS: u64 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShuffleError {
    #[error("Seed must be 32 bytes, got {0}")]
    InvalidSeedLength(usize),
    #[error("Rounds must be within [0, 255], got {0}")]
    InvalidRoundsSize(u64),
    #[error("Index {index} out of range for {count} elements")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("Cannot sample from an empty index set")]
    EmptyIndices,
}

pub(crate) fn seed_from_slice(seed: &[u8]) -> Result<B256, ShuffleError> {
    if seed.len() != SEED_SIZE {
        return Err(ShuffleError::InvalidSeedLength(seed.len()));
    }
    Ok(B256::from_slice(seed))
}

/// Return the shuffled index corresponding to ``seed`` (and ``index_count``).
pub fn compute_shuffled_index(
    mut index: usize,
    index_count: usize,
    seed: B256,
) -> Result<usize, ShuffleError> {
    if index >= index_count {
        return Err(ShuffleError::IndexOutOfRange {
            index,
            count: index_count,
        });
    }
    let mut buffer = [0u8; TOTAL_SIZE];
    buffer[..SEED_SIZE].copy_from_slice(seed.as_slice());
    for round in 0..SHUFFLE_ROUND_COUNT as u8 {
        index = shuffle_round(&mut buffer, round, index, index_count);
    }
    Ok(index)
}

fn shuffle_round(buffer: &mut [u8; TOTAL_SIZE], round: u8, index: usize, count: usize) -> usize {
    buffer[SEED_SIZE] = round;
    let pivot = bytes_to_int64(&hash(&buffer[..PIVOT_VIEW_SIZE])[..8]) % count as u64;
    let flip = (pivot as usize + count - index) % count;
    let position = max(index, flip);
    buffer[PIVOT_VIEW_SIZE..].copy_from_slice(&((position / 256) as u32).to_le_bytes());
    let source = hash(&buffer[..]);
    let byte = source[(position % 256) / 8];
    if (byte >> (position % 8)) & 1 == 1 {
        flip
    } else {
        index
    }
}

/// Shuffle `input` in place with `rounds` swap-or-not rounds.
///
/// With `forwards = false` the result satisfies
/// `output[i] == input[compute_shuffled_index(i, len, seed)]`, which is the order committees are
/// drawn from. Running the opposite direction with the same arguments restores the input.
pub fn shuffle_list<T>(
    input: &mut [T],
    seed: &[u8],
    rounds: u64,
    forwards: bool,
) -> Result<(), ShuffleError> {
    let seed = seed_from_slice(seed)?;
    if rounds > MAX_SHUFFLE_ROUNDS {
        return Err(ShuffleError::InvalidRoundsSize(rounds));
    }
    let list_size = input.len();
    if rounds == 0 || list_size <= 1 {
        return Ok(());
    }

    let mut buffer = [0u8; TOTAL_SIZE];
    buffer[..SEED_SIZE].copy_from_slice(seed.as_slice());

    let rounds = rounds as u8;
    let mut round = if forwards { 0 } else { rounds - 1 };
    loop {
        buffer[SEED_SIZE] = round;
        let pivot =
            bytes_to_int64(&hash(&buffer[..PIVOT_VIEW_SIZE])[..8]) as usize % list_size;

        // Pairs (i, pivot - i) below the pivot.
        let mirror = (pivot + 1) >> 1;
        set_position_window(&mut buffer, pivot >> 8);
        let mut source = hash(&buffer[..]);
        let mut byte = source[(pivot & 0xff) >> 3];
        for i in 0..mirror {
            let j = pivot - i;
            if j & 0xff == 0xff {
                set_position_window(&mut buffer, j >> 8);
                source = hash(&buffer[..]);
            }
            if j & 0x07 == 0x07 {
                byte = source[(j & 0xff) >> 3];
            }
            if (byte >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i, j);
            }
        }

        // Pairs (i, end - (i - pivot - 1)) above the pivot.
        let mirror = (pivot + list_size + 1) >> 1;
        let end = list_size - 1;
        set_position_window(&mut buffer, end >> 8);
        let mut source = hash(&buffer[..]);
        let mut byte = source[(end & 0xff) >> 3];
        for (step, i) in ((pivot + 1)..mirror).enumerate() {
            let j = end - step;
            if j & 0xff == 0xff {
                set_position_window(&mut buffer, j >> 8);
                source = hash(&buffer[..]);
            }
            if j & 0x07 == 0x07 {
                byte = source[(j & 0xff) >> 3];
            }
            if (byte >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i, j);
            }
        }

        if forwards {
            round += 1;
            if round == rounds {
                break;
            }
        } else {
            if round == 0 {
                break;
            }
            round -= 1;
        }
    }

    Ok(())
}

fn set_position_window(buffer: &mut [u8; TOTAL_SIZE], window: usize) {
    buffer[PIVOT_VIEW_SIZE..].copy_from_slice(&(window as u32).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_backwards_shuffle_vector() {
        let mut list = (0..9u64).collect::<Vec<_>>();
        shuffle_list(&mut list, &[0u8; 32], 32, false).unwrap();
        assert_eq!(list, vec![6, 2, 3, 5, 1, 7, 8, 0, 4]);

        shuffle_list(&mut list, &[0u8; 32], 32, true).unwrap();
        assert_eq!(list, (0..9u64).collect::<Vec<_>>());
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(10)]
    #[case(90)]
    #[case(255)]
    fn test_shuffle_is_invertible(#[case] rounds: u64) {
        let seed = [0x5a; 32];
        let original = (0..300u64).collect::<Vec<_>>();
        for forwards in [true, false] {
            let mut list = original.clone();
            shuffle_list(&mut list, &seed, rounds, forwards).unwrap();
            if rounds == 0 {
                assert_eq!(list, original);
            }
            shuffle_list(&mut list, &seed, rounds, !forwards).unwrap();
            assert_eq!(list, original);
        }
    }

    #[test]
    fn test_backwards_shuffle_matches_shuffled_index() {
        let seed = B256::repeat_byte(0x11);
        let original = (0..600u64).collect::<Vec<_>>();
        let mut list = original.clone();
        shuffle_list(&mut list, seed.as_slice(), SHUFFLE_ROUND_COUNT, false).unwrap();
        for (i, value) in list.iter().enumerate() {
            let shuffled = compute_shuffled_index(i, original.len(), seed).unwrap();
            assert_eq!(*value, original[shuffled]);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let mut list = vec![1, 2, 3];
        assert_eq!(
            shuffle_list(&mut list, &[0u8; 16], 10, true),
            Err(ShuffleError::InvalidSeedLength(16))
        );
        assert_eq!(
            shuffle_list(&mut list, &[0u8; 32], 256, true),
            Err(ShuffleError::InvalidRoundsSize(256))
        );

        let mut empty: Vec<u64> = vec![];
        shuffle_list(&mut empty, &[0u8; 32], 90, true).unwrap();
        assert!(empty.is_empty());

        assert!(compute_shuffled_index(3, 3, B256::ZERO).is_err());
    }
}
