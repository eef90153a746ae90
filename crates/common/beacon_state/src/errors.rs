use ssz::DecodeError;
use thiserror::Error;
use vista_bls::BLSError;
use vista_consensus_misc::{ForkName, ShuffleError};
use vista_merkle::MerkleError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Malformed state encoding: {0}")]
    MalformedEncoding(String),
    #[error("Index {index} is out of range for {count} entries")]
    IndexOutOfRange { index: u64, count: u64 },
    #[error("Generalized index {0} is not part of the state tree")]
    InvalidGeneralizedIndex(u64),
    #[error("Target slot {target} is not after the state slot {slot}")]
    SlotNotInFuture { slot: u64, target: u64 },
    #[error("Slot {slot} is outside the block root window of state slot {state_slot}")]
    SlotOutOfRange { slot: u64, state_slot: u64 },
    #[error("{0} is full")]
    ListFull(&'static str),
    #[error("Epoch {epoch} is out of range: {reason}")]
    EpochOutOfRange { epoch: u64, reason: &'static str },
    #[error("{field} is not part of a {fork} state")]
    ForkMismatch {
        field: &'static str,
        fork: ForkName,
    },
    #[error("Caches of this state were transferred to a newer state")]
    CacheTransferred,
    #[error("Public key of sync committee member {0} is not in the pubkey index")]
    UnknownPubkey(usize),
    #[error("Shuffling error: {0}")]
    Shuffle(#[from] ShuffleError),
    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),
    #[error("BLS error: {0}")]
    Bls(#[from] BLSError),
}

impl From<DecodeError> for StateError {
    fn from(err: DecodeError) -> Self {
        StateError::MalformedEncoding(format!("{err:?}"))
    }
}

impl From<ssz_types::Error> for StateError {
    fn from(err: ssz_types::Error) -> Self {
        StateError::MalformedEncoding(format!("{err:?}"))
    }
}

impl From<ssz::BitfieldError> for StateError {
    fn from(err: ssz::BitfieldError) -> Self {
        StateError::MalformedEncoding(format!("{err:?}"))
    }
}
