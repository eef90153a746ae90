//! Registry reads that avoid decoding the full validator list.

use std::sync::Arc;

use ssz::{Decode, Encode};
use vista_bls::PubKey;
use vista_consensus_misc::{
    constants::EFFECTIVE_BALANCE_INCREMENT,
    validator::{VALIDATOR_SSZ_SIZE, Validator, ValidatorStatus},
};

use crate::{errors::StateError, view::BeaconStateView};

const PUBKEY_RANGE: std::ops::Range<usize> = 0..48;
const EFFECTIVE_BALANCE_OFFSET: usize = 80;
const SLASHED_OFFSET: usize = 88;
const ACTIVATION_EPOCH_OFFSET: usize = 97;
const EXIT_EPOCH_OFFSET: usize = 105;

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(word)
}

/// Columnar projection of the fields epoch processing reads for every validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorColumns {
    /// Effective balances in units of `EFFECTIVE_BALANCE_INCREMENT`.
    pub effective_balance_increments: Vec<u16>,
    pub slashed: Vec<bool>,
    pub activation_epochs: Vec<u64>,
    pub exit_epochs: Vec<u64>,
}

impl ValidatorColumns {
    /// Project encoded validator records without decoding the public keys.
    pub fn from_ssz_bytes(bytes: &[u8]) -> Self {
        let count = bytes.len() / VALIDATOR_SSZ_SIZE;
        let mut columns = Self::with_capacity(count);
        for record in bytes.chunks_exact(VALIDATOR_SSZ_SIZE) {
            columns.push(
                read_u64(record, EFFECTIVE_BALANCE_OFFSET),
                record[SLASHED_OFFSET] == 1,
                read_u64(record, ACTIVATION_EPOCH_OFFSET),
                read_u64(record, EXIT_EPOCH_OFFSET),
            );
        }
        columns
    }

    pub fn from_validators(validators: &[Validator]) -> Self {
        let mut columns = Self::with_capacity(validators.len());
        for validator in validators {
            columns.push(
                validator.effective_balance,
                validator.slashed,
                validator.activation_epoch,
                validator.exit_epoch,
            );
        }
        columns
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            effective_balance_increments: Vec::with_capacity(capacity),
            slashed: Vec::with_capacity(capacity),
            activation_epochs: Vec::with_capacity(capacity),
            exit_epochs: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, effective_balance: u64, slashed: bool, activation: u64, exit: u64) {
        let increments = effective_balance / EFFECTIVE_BALANCE_INCREMENT;
        self.effective_balance_increments
            .push(u16::try_from(increments).unwrap_or(u16::MAX));
        self.slashed.push(slashed);
        self.activation_epochs.push(activation);
        self.exit_epochs.push(exit);
    }

    pub fn len(&self) -> usize {
        self.slashed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slashed.is_empty()
    }

    pub fn is_active(&self, index: usize, epoch: u64) -> bool {
        self.activation_epochs[index] <= epoch && epoch < self.exit_epochs[index]
    }

    /// Return the sequence of active validator indices at ``epoch``.
    pub fn active_indices(&self, epoch: u64) -> Vec<u64> {
        (0..self.len())
            .filter(|&index| self.is_active(index, epoch))
            .map(|index| index as u64)
            .collect()
    }
}

impl BeaconStateView {
    pub fn validator_count(&self) -> Result<usize, StateError> {
        match self.validators.raw() {
            Some(raw) => Ok(raw.len() / VALIDATOR_SSZ_SIZE),
            None => Ok(self.validators.get()?.len()),
        }
    }

    fn ensure_validator_index(&self, index: u64) -> Result<usize, StateError> {
        let count = self.validator_count()? as u64;
        if index >= count {
            return Err(StateError::IndexOutOfRange { index, count });
        }
        Ok(index as usize)
    }

    pub fn validators(&self) -> Result<&Arc<crate::view::ValidatorList>, StateError> {
        self.validators.get()
    }

    pub fn balances(&self) -> Result<&Arc<crate::view::BalanceList>, StateError> {
        self.balances.get()
    }

    /// Decode one validator record.
    pub fn get_validator(&self, index: u64) -> Result<Validator, StateError> {
        let position = self.ensure_validator_index(index)?;
        match self.validators.raw() {
            Some(raw) if !self.validators.is_decoded() => {
                let start = position * VALIDATOR_SSZ_SIZE;
                Ok(Validator::from_ssz_bytes(
                    &raw[start..start + VALIDATOR_SSZ_SIZE],
                )?)
            }
            _ => Ok(self.validators.get()?[position].clone()),
        }
    }

    pub(crate) fn validator_pubkey(&self, index: u64) -> Result<PubKey, StateError> {
        let position = self.ensure_validator_index(index)?;
        match self.validators.raw() {
            Some(raw) if !self.validators.is_decoded() => {
                let start = position * VALIDATOR_SSZ_SIZE;
                let record = &raw[start..start + VALIDATOR_SSZ_SIZE];
                Ok(PubKey::from_ssz_bytes(&record[PUBKEY_RANGE])?)
            }
            _ => Ok(self.validators.get()?[position].pubkey.clone()),
        }
    }

    pub fn get_balance(&self, index: u64) -> Result<u64, StateError> {
        match self.balances.raw() {
            Some(raw) if !self.balances.is_decoded() => {
                let count = (raw.len() / 8) as u64;
                if index >= count {
                    return Err(StateError::IndexOutOfRange { index, count });
                }
                Ok(read_u64(raw, index as usize * 8))
            }
            _ => {
                let balances = self.balances.get()?;
                balances
                    .get(index as usize)
                    .copied()
                    .ok_or(StateError::IndexOutOfRange {
                        index,
                        count: balances.len() as u64,
                    })
            }
        }
    }

    pub fn get_validator_status(&self, index: u64) -> Result<ValidatorStatus, StateError> {
        Ok(self.get_validator(index)?.status(self.epoch()))
    }

    /// Columns of the validator set, computed once and shared with copies of this state.
    pub fn validator_columns(&self) -> Result<Arc<ValidatorColumns>, StateError> {
        self.ensure_caches()?;
        if let Some(columns) = self.caches.columns.get() {
            return Ok(columns.clone());
        }
        let columns = match self.validators.raw() {
            Some(raw) => ValidatorColumns::from_ssz_bytes(raw),
            None => ValidatorColumns::from_validators(self.validators.get()?),
        };
        Ok(self.caches.columns.get_or_init(|| Arc::new(columns)).clone())
    }

    pub fn effective_balance_increments(&self) -> Result<Vec<u16>, StateError> {
        Ok(self.validator_columns()?.effective_balance_increments.clone())
    }

    /// Effective balance increments with inactive and slashed validators zeroed.
    pub fn get_effective_balance_increments_zero_inactive(
        &self,
    ) -> Result<Vec<u16>, StateError> {
        let columns = self.validator_columns()?;
        let epoch = self.epoch();
        Ok((0..columns.len())
            .map(|index| {
                match columns.is_active(index, epoch) && !columns.slashed[index] {
                    true => columns.effective_balance_increments[index],
                    false => 0,
                }
            })
            .collect())
    }

    /// Return the sequence of active validator indices at ``epoch``.
    pub fn get_active_validator_indices(&self, epoch: u64) -> Result<Vec<u64>, StateError> {
        Ok(self.validator_columns()?.active_indices(epoch))
    }

    pub fn active_validator_count(&self) -> Result<usize, StateError> {
        Ok(self.shuffling_at(self.epoch())?.active_indices.len())
    }

    pub fn serialize_validators(&self) -> Result<Vec<u8>, StateError> {
        match self.validators.raw() {
            Some(raw) => Ok(raw.to_vec()),
            None => Ok(self.validators.get()?.as_ssz_bytes()),
        }
    }

    pub fn serialized_validators_size(&self) -> Result<usize, StateError> {
        Ok(self.validator_count()? * VALIDATOR_SSZ_SIZE)
    }

    /// Write the encoded validator list into `buffer` at `offset`, returning the bytes written.
    pub fn serialize_validators_to_bytes(
        &self,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<usize, StateError> {
        let encoded = self.serialize_validators()?;
        let available = buffer.len().saturating_sub(offset);
        if encoded.len() > available {
            return Err(StateError::IndexOutOfRange {
                index: (offset + encoded.len()) as u64,
                count: buffer.len() as u64,
            });
        }
        buffer[offset..offset + encoded.len()].copy_from_slice(&encoded);
        Ok(encoded.len())
    }
}

#[cfg(test)]
mod tests {
    use vista_consensus_misc::{ForkName, constants::FAR_FUTURE_EPOCH};

    use super::*;
    use crate::test_utils::TestStateBuilder;

    #[test]
    fn test_columns_match_decoded_records() {
        let state = TestStateBuilder::new(ForkName::Altair)
            .validator_count(16)
            .build()
            .unwrap();
        let decoded = BeaconStateView::from_ssz_bytes(ForkName::Altair, &state.as_ssz_bytes())
            .unwrap();

        let from_raw = ValidatorColumns::from_ssz_bytes(&decoded.serialize_validators().unwrap());
        let from_list = ValidatorColumns::from_validators(state.validators().unwrap());
        assert_eq!(from_raw, from_list);
        assert_eq!(from_raw.len(), 16);
        assert!(from_raw.effective_balance_increments.iter().all(|&inc| inc == 32));
        assert!(!decoded.validators.is_decoded());
    }

    #[test]
    fn test_single_record_reads() {
        let state = TestStateBuilder::new(ForkName::Electra)
            .validator_count(8)
            .build()
            .unwrap();
        let decoded =
            BeaconStateView::from_ssz_bytes(ForkName::Electra, &state.as_ssz_bytes())
                .unwrap();

        let validator = decoded.get_validator(5).unwrap();
        assert_eq!(validator, state.validators().unwrap()[5]);
        assert_eq!(validator.exit_epoch, FAR_FUTURE_EPOCH);
        assert_eq!(decoded.validator_pubkey(5).unwrap(), validator.pubkey);
        assert_eq!(decoded.get_balance(3).unwrap(), state.balances().unwrap()[3]);
        assert_eq!(
            decoded.get_validator_status(0).unwrap(),
            ValidatorStatus::ActiveOngoing
        );
        assert!(!decoded.validators.is_decoded());
        assert!(!decoded.balances.is_decoded());

        assert_eq!(
            decoded.get_validator(8),
            Err(StateError::IndexOutOfRange { index: 8, count: 8 })
        );
        assert!(decoded.get_balance(8).is_err());
    }

    #[test]
    fn test_zero_inactive_increments() {
        let state = TestStateBuilder::new(ForkName::Deneb)
            .validator_count(6)
            .slot(64)
            .slashed(1)
            .exited(2, 1)
            .pending(3)
            .build()
            .unwrap();
        assert_eq!(
            state
                .get_effective_balance_increments_zero_inactive()
                .unwrap(),
            vec![32, 0, 0, 0, 32, 32]
        );
        assert_eq!(state.effective_balance_increments().unwrap(), vec![32; 6]);
        assert_eq!(state.active_validator_count().unwrap(), 4);
    }

    #[test]
    fn test_validator_count_from_raw_and_decoded() {
        let state = TestStateBuilder::new(ForkName::Bellatrix)
            .validator_count(5)
            .build()
            .unwrap();
        let mut decoded =
            BeaconStateView::from_ssz_bytes(ForkName::Bellatrix, &state.as_ssz_bytes()).unwrap();
        assert_eq!(decoded.validator_count(), Ok(5));
        assert_eq!(decoded.serialized_validators_size(), Ok(5 * VALIDATOR_SSZ_SIZE));

        let extra = decoded.get_validator(0).unwrap();
        decoded.validators.make_mut().unwrap().push(extra).unwrap();
        assert!(decoded.validators.raw().is_none());
        assert_eq!(decoded.validator_count(), Ok(6));
    }

    #[test]
    fn test_oversized_effective_balance_saturates() {
        let mut validator = TestStateBuilder::new(ForkName::Altair)
            .validator_count(1)
            .build()
            .unwrap()
            .get_validator(0)
            .unwrap();
        validator.effective_balance = u64::MAX;
        let columns = ValidatorColumns::from_validators(&[validator.clone()]);
        assert_eq!(columns.effective_balance_increments, vec![u16::MAX]);
        assert_eq!(
            ValidatorColumns::from_ssz_bytes(&validator.as_ssz_bytes()),
            columns
        );
    }

    #[test]
    fn test_validators_serialization() {
        let state = TestStateBuilder::new(ForkName::Capella)
            .validator_count(4)
            .build()
            .unwrap();
        let encoded = state.serialize_validators().unwrap();
        assert_eq!(encoded.len(), state.serialized_validators_size().unwrap());

        let mut buffer = vec![0u8; encoded.len() + 10];
        let written = state.serialize_validators_to_bytes(&mut buffer, 10).unwrap();
        assert_eq!(written, encoded.len());
        assert_eq!(&buffer[10..], &encoded[..]);
        assert!(state.serialize_validators_to_bytes(&mut buffer, 11).is_err());
    }
}
