//! SSZ layout of the beacon state for every fork.

use std::sync::{
    Arc, OnceLock,
    atomic::AtomicU64,
};

use alloy_primitives::B256;
use bytes::Bytes;
use ssz::{BYTES_PER_LENGTH_OFFSET, Decode, DecodeError, SszDecoder, SszDecoderBuilder, SszEncoder};
use vista_consensus_misc::{
    ForkName, beacon_block_header::BeaconBlockHeader, checkpoint::Checkpoint,
    eth_1_data::Eth1Data, execution_payload_header::ExecutionPayloadHeader, fork::Fork,
    sync_committee::SyncCommittee,
};

use crate::{
    caches::EpochCaches,
    errors::StateError,
    lazy::{Lazy, LazyValue},
    pubkey_cache::PubkeyCache,
    view::{
        AltairFields, BalanceList, BeaconStateView, BellatrixFields, CapellaFields,
        ElectraFields, EpochAttestations, Eth1DataVotes, FuluFields, HistoricalRoots,
        HistoricalSummaries, InactivityScores, JustificationBits, ParticipationList,
        PendingConsolidations, PendingDeposits, PendingPartialWithdrawals, Phase0Fields,
        ProposerLookahead, RandaoMixes, RootVector, Slashings, ValidatorList,
    },
};

/// Declare the fields of a `fork` state, in container order.
fn register_layout(builder: &mut SszDecoderBuilder, fork: ForkName) -> Result<(), DecodeError> {
    // Versioning
    builder.register_type::<u64>()?;
    builder.register_type::<B256>()?;
    builder.register_type::<u64>()?;
    builder.register_type::<Fork>()?;

    // History
    builder.register_type::<BeaconBlockHeader>()?;
    builder.register_type::<RootVector>()?;
    builder.register_type::<RootVector>()?;
    builder.register_type::<HistoricalRoots>()?;

    // Eth1
    builder.register_type::<Eth1Data>()?;
    builder.register_type::<Eth1DataVotes>()?;
    builder.register_type::<u64>()?;

    // Registry
    builder.register_type::<ValidatorList>()?;
    builder.register_type::<BalanceList>()?;

    builder.register_type::<RandaoMixes>()?;
    builder.register_type::<Slashings>()?;

    if fork.is_altair_or_later() {
        builder.register_type::<ParticipationList>()?;
        builder.register_type::<ParticipationList>()?;
    } else {
        builder.register_type::<EpochAttestations>()?;
        builder.register_type::<EpochAttestations>()?;
    }

    // Finality
    builder.register_type::<JustificationBits>()?;
    builder.register_type::<Checkpoint>()?;
    builder.register_type::<Checkpoint>()?;
    builder.register_type::<Checkpoint>()?;

    if fork.is_altair_or_later() {
        builder.register_type::<InactivityScores>()?;
        builder.register_type::<SyncCommittee>()?;
        builder.register_type::<SyncCommittee>()?;
    }

    if fork.is_bellatrix_or_later() {
        builder.register_anonymous_variable_length_item()?;
    }

    if fork.is_capella_or_later() {
        builder.register_type::<u64>()?;
        builder.register_type::<u64>()?;
        builder.register_type::<HistoricalSummaries>()?;
    }

    if fork.is_electra_or_later() {
        for _ in 0..6 {
            builder.register_type::<u64>()?;
        }
        builder.register_type::<PendingDeposits>()?;
        builder.register_type::<PendingPartialWithdrawals>()?;
        builder.register_type::<PendingConsolidations>()?;
    }

    if fork.is_fulu_or_later() {
        builder.register_type::<ProposerLookahead>()?;
    }

    Ok(())
}

/// Hands out the fields of a decoded container, keeping composite fields as buffer slices.
struct FieldReader<'a> {
    decoder: SszDecoder<'a>,
    buffer: &'a Bytes,
}

impl FieldReader<'_> {
    fn eager<T: Decode>(&mut self) -> Result<T, DecodeError> {
        self.decoder.decode_next()
    }

    fn lazy<T: LazyValue>(&mut self) -> Result<Lazy<T>, DecodeError> {
        let buffer = self.buffer;
        self.decoder
            .decode_next_with(|slice| Lazy::from_raw(buffer.slice_ref(slice)))
    }

    fn execution_payload_header(
        &mut self,
        fork: ForkName,
    ) -> Result<ExecutionPayloadHeader, DecodeError> {
        self.decoder
            .decode_next_with(|slice| ExecutionPayloadHeader::from_ssz_bytes_by_fork(slice, fork))
    }
}

pub(crate) fn decode_state(
    fork: ForkName,
    bytes: Bytes,
    pubkeys: Arc<PubkeyCache>,
) -> Result<BeaconStateView, StateError> {
    let mut builder = SszDecoderBuilder::new(&bytes);
    register_layout(&mut builder, fork)?;
    let mut reader = FieldReader {
        decoder: builder.build()?,
        buffer: &bytes,
    };

    let genesis_time = reader.eager()?;
    let genesis_validators_root = reader.eager()?;
    let slot = reader.eager()?;
    let state_fork = reader.eager()?;
    let latest_block_header = reader.eager()?;
    let block_roots = reader.lazy()?;
    let state_roots = reader.lazy()?;
    let historical_roots = reader.lazy()?;
    let eth1_data = reader.eager()?;
    let eth1_data_votes = reader.lazy()?;
    let eth1_deposit_index = reader.eager()?;
    let validators = reader.lazy()?;
    let balances = reader.lazy()?;
    let randao_mixes = reader.lazy()?;
    let slashings = reader.lazy()?;

    let (phase0, previous_epoch_participation, current_epoch_participation) =
        match fork.is_altair_or_later() {
            true => (None, Some(reader.lazy()?), Some(reader.lazy()?)),
            false => (
                Some(Phase0Fields {
                    previous_epoch_attestations: reader.eager()?,
                    current_epoch_attestations: reader.eager()?,
                }),
                None,
                None,
            ),
        };

    let justification_bits = reader.eager()?;
    let previous_justified_checkpoint = reader.eager()?;
    let current_justified_checkpoint = reader.eager()?;
    let finalized_checkpoint = reader.eager()?;

    let altair = match (previous_epoch_participation, current_epoch_participation) {
        (Some(previous_epoch_participation), Some(current_epoch_participation)) => {
            Some(AltairFields {
                previous_epoch_participation,
                current_epoch_participation,
                inactivity_scores: reader.lazy()?,
                current_sync_committee: reader.lazy()?,
                next_sync_committee: reader.lazy()?,
            })
        }
        _ => None,
    };

    let bellatrix = match fork.is_bellatrix_or_later() {
        true => Some(BellatrixFields {
            latest_execution_payload_header: reader.execution_payload_header(fork)?,
        }),
        false => None,
    };

    let capella = match fork.is_capella_or_later() {
        true => Some(CapellaFields {
            next_withdrawal_index: reader.eager()?,
            next_withdrawal_validator_index: reader.eager()?,
            historical_summaries: reader.lazy()?,
        }),
        false => None,
    };

    let electra = match fork.is_electra_or_later() {
        true => Some(ElectraFields {
            deposit_requests_start_index: reader.eager()?,
            deposit_balance_to_consume: reader.eager()?,
            exit_balance_to_consume: reader.eager()?,
            earliest_exit_epoch: reader.eager()?,
            consolidation_balance_to_consume: reader.eager()?,
            earliest_consolidation_epoch: reader.eager()?,
            pending_deposits: reader.lazy()?,
            pending_partial_withdrawals: reader.lazy()?,
            pending_consolidations: reader.lazy()?,
        }),
        false => None,
    };

    let fulu = match fork.is_fulu_or_later() {
        true => Some(FuluFields {
            proposer_lookahead: reader.eager()?,
        }),
        false => None,
    };

    Ok(BeaconStateView {
        fork_name: fork,
        genesis_time,
        genesis_validators_root,
        slot,
        fork: state_fork,
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        validators,
        balances,
        randao_mixes,
        slashings,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        phase0,
        altair,
        bellatrix,
        capella,
        electra,
        fulu,
        state_root: OnceLock::new(),
        caches: EpochCaches::default(),
        caches_transferred: false,
        created_with_transfer_cache: false,
        cloned_count: AtomicU64::new(0),
        cloned_count_with_transfer_cache: AtomicU64::new(0),
        pubkeys,
    })
}

impl BeaconStateView {
    pub fn ssz_bytes_len(&self) -> usize {
        self.fields()
            .iter()
            .map(|field| match field.is_ssz_fixed_len() {
                true => field.ssz_bytes_len(),
                false => BYTES_PER_LENGTH_OFFSET + field.ssz_bytes_len(),
            })
            .sum()
    }

    /// Encode the state. Fields that were never modified are copied from the decoded buffer.
    pub fn as_ssz_bytes(&self) -> Vec<u8> {
        let fields = self.fields();
        let fixed_len = fields.iter().map(|field| field.fixed_part_len()).sum();

        let mut buf = Vec::with_capacity(self.ssz_bytes_len());
        let mut encoder = SszEncoder::container(&mut buf, fixed_len);
        for field in &fields {
            encoder.append_parameterized(field.is_ssz_fixed_len(), |buf| field.ssz_append(buf));
        }
        encoder.finalize();
        buf
    }

    /// Encode the state into `buffer` at `offset`, returning the number of bytes written.
    pub fn write_ssz_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, StateError> {
        let encoded = self.as_ssz_bytes();
        let end = offset
            .checked_add(encoded.len())
            .filter(|&end| end <= buffer.len())
            .ok_or(StateError::IndexOutOfRange {
                index: offset.saturating_add(encoded.len()) as u64,
                count: buffer.len() as u64,
            })?;
        buffer[offset..end].copy_from_slice(&encoded);
        Ok(encoded.len())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use ssz::Encode;
    use vista_network_spec::chain_config::{STATE_SLOT_OFFSET, chain_config};

    use super::*;
    use crate::test_utils::TestStateBuilder;

    #[rstest]
    #[case(ForkName::Phase0)]
    #[case(ForkName::Altair)]
    #[case(ForkName::Bellatrix)]
    #[case(ForkName::Capella)]
    #[case(ForkName::Deneb)]
    #[case(ForkName::Electra)]
    #[case(ForkName::Fulu)]
    fn test_reencoding_is_byte_identical(#[case] fork: ForkName) {
        let state = TestStateBuilder::new(fork).slot(77).build().unwrap();
        let encoded = state.as_ssz_bytes();
        assert_eq!(encoded.len(), state.ssz_bytes_len());

        let decoded = BeaconStateView::from_ssz_bytes(fork, &encoded).unwrap();
        assert_eq!(decoded.as_ssz_bytes(), encoded);
        assert_eq!(decoded.ssz_bytes_len(), encoded.len());
        assert_eq!(decoded.hash_tree_root().unwrap(), state.hash_tree_root().unwrap());
        assert_eq!(decoded.slot(), 77);
        assert_eq!(
            u64::from_le_bytes(
                encoded[STATE_SLOT_OFFSET..STATE_SLOT_OFFSET + 8]
                    .try_into()
                    .unwrap()
            ),
            77
        );
    }

    #[test]
    fn test_write_into_buffer() {
        let state = TestStateBuilder::new(ForkName::Deneb).build().unwrap();
        let encoded = state.as_ssz_bytes();
        let mut buffer = vec![0u8; encoded.len() + 4];
        assert_eq!(state.write_ssz_bytes(&mut buffer, 4).unwrap(), encoded.len());
        assert_eq!(&buffer[4..], &encoded[..]);
        assert!(state.write_ssz_bytes(&mut buffer, 5).is_err());
        assert!(matches!(
            state.write_ssz_bytes(&mut buffer, usize::MAX),
            Err(StateError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_slashed_flag_is_rejected() {
        let state = TestStateBuilder::new(ForkName::Altair)
            .validator_count(4)
            .build()
            .unwrap();
        let mut encoded = state.as_ssz_bytes();
        let record = state.get_validator(0).unwrap().as_ssz_bytes();
        let start = encoded
            .windows(record.len())
            .position(|window| window == record.as_slice())
            .unwrap();

        encoded[start + 88] = 2;
        assert!(matches!(
            BeaconStateView::from_ssz_bytes(ForkName::Altair, &encoded),
            Err(StateError::MalformedEncoding(_))
        ));
        encoded[start + 88] = 1;
        let slashed = BeaconStateView::from_ssz_bytes(ForkName::Altair, &encoded).unwrap();
        assert!(slashed.validator_columns().unwrap().slashed[0]);
    }

    #[test]
    fn test_wrong_fork_is_rejected() {
        let state = TestStateBuilder::new(ForkName::Capella).build().unwrap();
        let encoded = state.as_ssz_bytes();
        assert!(matches!(
            BeaconStateView::from_ssz_bytes(ForkName::Deneb, &encoded),
            Err(StateError::MalformedEncoding(_))
        ));
        assert!(BeaconStateView::from_ssz_bytes(ForkName::Altair, &encoded).is_err());
    }

    #[test]
    fn test_malformed_buffers() {
        let state = TestStateBuilder::new(ForkName::Altair).build().unwrap();
        let encoded = state.as_ssz_bytes();

        assert!(BeaconStateView::from_ssz_bytes(ForkName::Altair, &encoded[..100]).is_err());
        assert!(BeaconStateView::from_ssz_bytes(ForkName::Altair, &[]).is_err());

        // Trailing bytes land in inactivity_scores, the last variable-length field.
        let mut extended = encoded.clone();
        extended.push(0);
        assert!(BeaconStateView::from_ssz_bytes(ForkName::Altair, &extended).is_err());

        // First offset (historical_roots) must point right after the fixed part.
        let offset_position = 8 + 32 + 8 + 16 + 112 + 2 * 8192 * 32;
        let mut corrupted = encoded;
        corrupted[offset_position] ^= 0x01;
        assert!(BeaconStateView::from_ssz_bytes(ForkName::Altair, &corrupted).is_err());
    }

    #[test]
    fn test_fork_inference_from_bytes() {
        let config = chain_config();
        let slot = config.fork_epoch(ForkName::Capella).saturating_mul(32);
        let state = TestStateBuilder::new(ForkName::Capella).slot(slot).build().unwrap();
        assert_eq!(
            config.fork_name_from_state_bytes(&state.as_ssz_bytes()),
            Some(config.fork_name_at_slot(slot))
        );
    }
}
