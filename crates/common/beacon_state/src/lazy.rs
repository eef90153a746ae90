//! Fields that keep their encoded bytes and decode on first access.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use alloy_primitives::B256;
use bytes::Bytes;
use ssz::{Decode, DecodeError, Encode};
use ssz_types::{FixedVector, VariableList, typenum::Unsigned};
use tree_hash::TreeHash;
use vista_consensus_misc::{
    eth_1_data::Eth1Data,
    historical_summary::HistoricalSummary,
    pending_consolidation::PendingConsolidation,
    pending_deposit::PendingDeposit,
    pending_partial_withdrawal::PendingPartialWithdrawal,
    sync_committee::SyncCommittee,
    validator::{VALIDATOR_SSZ_SIZE, Validator},
};
use vista_merkle::MerkleNodes;

use crate::errors::StateError;

/// A composite state field that can be held undecoded.
pub trait LazyValue:
    Encode + Decode + TreeHash + MerkleNodes + Clone + Send + Sync + 'static
{
    /// Structural checks that do not require decoding the elements.
    fn validate_ssz_bytes(bytes: &[u8]) -> Result<(), DecodeError>;
}

/// Element of a lazily held list or vector.
pub trait LazyElement:
    Encode + Decode + TreeHash + MerkleNodes + Clone + Send + Sync + 'static
{
    /// Checks on one fixed-size encoded element beyond its length.
    fn validate_element(_bytes: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

impl LazyElement for u8 {}
impl LazyElement for u64 {}
impl LazyElement for B256 {}
impl LazyElement for Eth1Data {}
impl LazyElement for HistoricalSummary {}
impl LazyElement for PendingDeposit {}
impl LazyElement for PendingPartialWithdrawal {}
impl LazyElement for PendingConsolidation {}

const VALIDATOR_SLASHED_OFFSET: usize = 88;

impl LazyElement for Validator {
    fn validate_element(bytes: &[u8]) -> Result<(), DecodeError> {
        match bytes.get(VALIDATOR_SLASHED_OFFSET) {
            Some(0 | 1) if bytes.len() == VALIDATOR_SSZ_SIZE => Ok(()),
            Some(flag) => Err(DecodeError::BytesInvalid(format!(
                "invalid slashed flag {flag} in validator record"
            ))),
            None => Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: VALIDATOR_SSZ_SIZE,
            }),
        }
    }
}

fn validate_elements<T: LazyElement>(bytes: &[u8]) -> Result<(), DecodeError> {
    bytes
        .chunks_exact(<T as Decode>::ssz_fixed_len())
        .try_for_each(T::validate_element)
}

fn validate_fixed_len(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() != expected {
        return Err(DecodeError::InvalidByteLength {
            len: bytes.len(),
            expected,
        });
    }
    Ok(())
}

impl<T, N> LazyValue for FixedVector<T, N>
where
    T: LazyElement,
    N: Unsigned + Clone + Send + Sync + 'static,
{
    fn validate_ssz_bytes(bytes: &[u8]) -> Result<(), DecodeError> {
        if !<T as Decode>::is_ssz_fixed_len() {
            return Self::from_ssz_bytes(bytes).map(drop);
        }
        validate_fixed_len(bytes, <T as Decode>::ssz_fixed_len() * N::to_usize())?;
        validate_elements::<T>(bytes)
    }
}

impl<T, N> LazyValue for VariableList<T, N>
where
    T: LazyElement,
    N: Unsigned + Clone + Send + Sync + 'static,
{
    fn validate_ssz_bytes(bytes: &[u8]) -> Result<(), DecodeError> {
        if !<T as Decode>::is_ssz_fixed_len() {
            return Self::from_ssz_bytes(bytes).map(drop);
        }
        let item_len = <T as Decode>::ssz_fixed_len();
        if bytes.len() % item_len != 0 {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: bytes.len() / item_len * item_len,
            });
        }
        let count = bytes.len() / item_len;
        if count > N::to_usize() {
            return Err(DecodeError::BytesInvalid(format!(
                "list of {count} items exceeds its limit of {}",
                N::to_usize()
            )));
        }
        validate_elements::<T>(bytes)
    }
}

impl LazyValue for SyncCommittee {
    fn validate_ssz_bytes(bytes: &[u8]) -> Result<(), DecodeError> {
        validate_fixed_len(bytes, <SyncCommittee as Encode>::ssz_fixed_len())
    }
}

/// A field backed by a slice of the decoded state buffer.
///
/// The value is decoded and memoized on first access. Until the field is mutated it re-encodes
/// from the original bytes, so unmodified fields round-trip byte for byte.
#[derive(Clone)]
pub struct Lazy<T> {
    source: Bytes,
    /// Set once `source` no longer reflects `value`.
    stale: bool,
    value: OnceLock<Arc<T>>,
    root: OnceLock<B256>,
}

impl<T: LazyValue> Lazy<T> {
    pub fn from_raw(source: Bytes) -> Result<Self, DecodeError> {
        T::validate_ssz_bytes(&source)?;
        Ok(Self {
            source,
            stale: false,
            value: OnceLock::new(),
            root: OnceLock::new(),
        })
    }

    pub fn from_value(value: T) -> Self {
        Self {
            source: Bytes::new(),
            stale: true,
            value: OnceLock::from(Arc::new(value)),
            root: OnceLock::new(),
        }
    }

    /// The encoded bytes, while they still describe the value.
    pub fn raw(&self) -> Option<&Bytes> {
        match self.stale {
            true => None,
            false => Some(&self.source),
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn get(&self) -> Result<&Arc<T>, StateError> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let value = T::from_ssz_bytes(&self.source)?;
        Ok(self.value.get_or_init(|| Arc::new(value)))
    }

    /// Mutable access; the field stops re-encoding from its source bytes.
    pub fn make_mut(&mut self) -> Result<&mut T, StateError> {
        self.get()?;
        self.stale = true;
        self.source = Bytes::new();
        self.root.take();
        match self.value.get_mut() {
            Some(value) => Ok(Arc::make_mut(value)),
            None => Err(StateError::MalformedEncoding(
                "field lost its decoded value".to_string(),
            )),
        }
    }

    pub fn set(&mut self, value: T) {
        *self = Self::from_value(value);
    }

    pub fn tree_hash_root(&self) -> Result<B256, StateError> {
        if let Some(root) = self.root.get() {
            return Ok(*root);
        }
        let root = self.get()?.tree_hash_root();
        Ok(*self.root.get_or_init(|| root))
    }

    pub fn ssz_bytes_len(&self) -> usize {
        match (self.raw(), self.value.get()) {
            (Some(raw), _) => raw.len(),
            (None, Some(value)) => value.ssz_bytes_len(),
            (None, None) => 0,
        }
    }

    pub fn ssz_append(&self, buf: &mut Vec<u8>) {
        match (self.raw(), self.value.get()) {
            (Some(raw), _) => buf.extend_from_slice(raw),
            (None, Some(value)) => value.ssz_append(buf),
            (None, None) => {}
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("source_len", &self.source.len())
            .field("stale", &self.stale)
            .field("decoded", &self.value.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ssz_types::typenum::{U4, U8};

    use super::*;

    type Balances = VariableList<u64, U8>;

    #[test]
    fn test_raw_bytes_pass_through() {
        let value = Balances::new(vec![1, 2, 3]).unwrap();
        let lazy = Lazy::<Balances>::from_raw(Bytes::from(value.as_ssz_bytes())).unwrap();
        assert!(!lazy.is_decoded());

        let mut encoded = vec![];
        lazy.ssz_append(&mut encoded);
        assert_eq!(encoded, value.as_ssz_bytes());
        assert!(!lazy.is_decoded());

        assert_eq!(**lazy.get().unwrap(), value);
        assert_eq!(lazy.tree_hash_root().unwrap(), value.tree_hash_root());
    }

    #[test]
    fn test_mutation_resets_root_and_source() {
        let value = Balances::new(vec![1, 2, 3]).unwrap();
        let mut lazy = Lazy::<Balances>::from_raw(Bytes::from(value.as_ssz_bytes())).unwrap();
        let before = lazy.tree_hash_root().unwrap();

        let copy = lazy.clone();
        lazy.make_mut().unwrap().push(4).unwrap();

        assert!(lazy.raw().is_none());
        assert_ne!(lazy.tree_hash_root().unwrap(), before);
        assert_eq!(lazy.ssz_bytes_len(), 32);
        // Clones share nothing mutable.
        assert_eq!(copy.tree_hash_root().unwrap(), before);
        assert_eq!(copy.get().unwrap().len(), 3);
    }

    #[test]
    fn test_validator_records_checked_on_load() {
        let validator = Validator {
            pubkey: Default::default(),
            withdrawal_credentials: B256::ZERO,
            effective_balance: 32_000_000_000,
            slashed: true,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: u64::MAX,
            withdrawable_epoch: u64::MAX,
        };
        let list = VariableList::<Validator, U4>::new(vec![validator.clone(), validator]).unwrap();
        let mut encoded = list.as_ssz_bytes();
        assert!(Lazy::<VariableList<Validator, U4>>::from_raw(Bytes::from(encoded.clone())).is_ok());

        encoded[VALIDATOR_SSZ_SIZE + VALIDATOR_SLASHED_OFFSET] = 2;
        assert!(matches!(
            Lazy::<VariableList<Validator, U4>>::from_raw(Bytes::from(encoded)),
            Err(DecodeError::BytesInvalid(_))
        ));
    }

    #[test]
    fn test_structural_validation() {
        assert!(Lazy::<Balances>::from_raw(Bytes::from(vec![0u8; 12])).is_err());
        assert!(Lazy::<Balances>::from_raw(Bytes::from(vec![0u8; 72])).is_err());
        assert!(Lazy::<FixedVector<u64, U4>>::from_raw(Bytes::from(vec![0u8; 24])).is_err());
        assert!(Lazy::<FixedVector<u64, U4>>::from_raw(Bytes::from(vec![0u8; 32])).is_ok());
    }
}
