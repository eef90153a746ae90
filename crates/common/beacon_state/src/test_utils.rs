//! Synthetic states for tests.

use std::sync::{Arc, OnceLock, atomic::AtomicU64};

use alloy_primitives::B256;
use ssz_types::FixedVector;
use vista_bls::{BLSError, PrivateKey, PubKey, traits::{Aggregatable, Signable}};
use vista_consensus_misc::{
    ForkName,
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{
        EPOCHS_PER_HISTORICAL_VECTOR, FAR_FUTURE_EPOCH, MAX_EFFECTIVE_BALANCE,
        SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT, SYNC_COMMITTEE_SIZE,
        UNSET_DEPOSIT_REQUESTS_START_INDEX,
    },
    eth_1_data::Eth1Data,
    execution_payload_header::ExecutionPayloadHeader,
    misc::{compute_activation_exit_epoch, compute_epoch_at_slot, compute_signing_root},
    sync_committee::SyncCommittee,
    validator::Validator,
    voluntary_exit::{SignedVoluntaryExit, VoluntaryExit},
};
use vista_network_spec::{chain_config, initialize_test_chain_config};

use crate::{
    caches::EpochCaches,
    errors::StateError,
    lazy::Lazy,
    pubkey_cache::PubkeyCache,
    view::{
        AltairFields, BalanceList, BeaconStateView, BellatrixFields, CapellaFields, ElectraFields,
        FuluFields, InactivityScores, JustificationBits, ParticipationList, Phase0Fields,
        ProposerLookahead, ValidatorList,
    },
};

/// Deterministic key of validator `index`.
pub fn interop_private_key(index: u64) -> Result<PrivateKey, BLSError> {
    let mut ikm = [0u8; 32];
    ikm[..8].copy_from_slice(&(index + 1).to_le_bytes());
    PrivateKey::from_ikm(&ikm)
}

pub fn interop_pubkey(index: u64) -> Result<PubKey, BLSError> {
    interop_private_key(index)?.public_key()
}

/// Sign `exit` with the interop key of its validator, under the domain `state` verifies with.
pub fn sign_voluntary_exit(
    state: &BeaconStateView,
    exit: VoluntaryExit,
) -> Result<SignedVoluntaryExit, StateError> {
    let signing_root = compute_signing_root(exit.clone(), state.voluntary_exit_domain(&exit));
    let signature = interop_private_key(exit.validator_index)?.sign(signing_root.as_slice())?;
    Ok(SignedVoluntaryExit {
        message: exit,
        signature,
    })
}

fn tagged_root(tag: u8, index: u64) -> B256 {
    let mut root = B256::left_padding_from(&index.to_be_bytes());
    root[0] = tag;
    root
}

fn sync_committee(pubkeys: &[PubKey], offset: usize) -> Result<SyncCommittee, StateError> {
    let members = (0..SYNC_COMMITTEE_SIZE as usize)
        .map(|position| pubkeys[(position + offset) % pubkeys.len()].clone())
        .collect::<Vec<_>>();
    let aggregate_pubkey = PubKey::aggregate(&members.iter().collect::<Vec<_>>())?;
    Ok(SyncCommittee {
        pubkeys: FixedVector::new(members)?,
        aggregate_pubkey,
    })
}

/// Builds a state of any fork with `validator_count` active 32 ETH validators, distinct roots in
/// every history vector and full participation in both epochs.
#[derive(Debug, Clone)]
pub struct TestStateBuilder {
    fork: ForkName,
    slot: u64,
    validator_count: usize,
    slashed: Vec<u64>,
    exited: Vec<(u64, u64)>,
    pending: Vec<u64>,
}

impl TestStateBuilder {
    pub fn new(fork: ForkName) -> Self {
        Self {
            fork,
            slot: 0,
            validator_count: 64,
            slashed: vec![],
            exited: vec![],
            pending: vec![],
        }
    }

    pub fn slot(mut self, slot: u64) -> Self {
        self.slot = slot;
        self
    }

    pub fn validator_count(mut self, validator_count: usize) -> Self {
        self.validator_count = validator_count;
        self
    }

    pub fn slashed(mut self, index: u64) -> Self {
        self.slashed.push(index);
        self
    }

    /// Schedule the exit of validator `index` at `exit_epoch`.
    pub fn exited(mut self, index: u64, exit_epoch: u64) -> Self {
        self.exited.push((index, exit_epoch));
        self
    }

    /// Leave validator `index` waiting for activation.
    pub fn pending(mut self, index: u64) -> Self {
        self.pending.push(index);
        self
    }

    fn validator(&self, index: u64, pubkey: PubKey) -> Validator {
        let mut validator = Validator {
            pubkey,
            withdrawal_credentials: tagged_root(0x01, index),
            effective_balance: MAX_EFFECTIVE_BALANCE,
            slashed: self.slashed.contains(&index),
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        };
        if let Some((_, exit_epoch)) = self.exited.iter().find(|(exited, _)| *exited == index) {
            validator.exit_epoch = *exit_epoch;
            validator.withdrawable_epoch = exit_epoch.saturating_add(256);
        }
        if self.pending.contains(&index) {
            validator.activation_eligibility_epoch = FAR_FUTURE_EPOCH;
            validator.activation_epoch = FAR_FUTURE_EPOCH;
        }
        validator
    }

    pub fn build(self) -> Result<BeaconStateView, StateError> {
        initialize_test_chain_config();
        let config = chain_config();
        let fork = self.fork;
        let epoch = compute_epoch_at_slot(self.slot);
        let count = self.validator_count;

        let pubkeys = (0..count as u64)
            .map(interop_pubkey)
            .collect::<Result<Vec<_>, _>>()?;
        let validators = pubkeys
            .iter()
            .enumerate()
            .map(|(index, pubkey)| self.validator(index as u64, pubkey.clone()))
            .collect::<Vec<_>>();

        let block_roots = (0..SLOTS_PER_HISTORICAL_ROOT)
            .map(|slot| tagged_root(0xb0, slot))
            .collect::<Vec<_>>();
        let state_roots = (0..SLOTS_PER_HISTORICAL_ROOT)
            .map(|slot| tagged_root(0x50, slot))
            .collect::<Vec<_>>();
        let randao_mixes = (0..EPOCHS_PER_HISTORICAL_VECTOR)
            .map(|epoch| tagged_root(0x7a, epoch))
            .collect::<Vec<_>>();

        let phase0 = (fork == ForkName::Phase0).then(|| Phase0Fields {
            previous_epoch_attestations: Default::default(),
            current_epoch_attestations: Default::default(),
        });
        let altair = match fork.is_altair_or_later() {
            true => {
                let participation = ParticipationList::new(vec![0b111; count])?;
                Some(AltairFields {
                    previous_epoch_participation: Lazy::from_value(participation.clone()),
                    current_epoch_participation: Lazy::from_value(participation),
                    inactivity_scores: Lazy::from_value(InactivityScores::new(vec![0; count])?),
                    current_sync_committee: Lazy::from_value(sync_committee(&pubkeys, 0)?),
                    next_sync_committee: Lazy::from_value(sync_committee(&pubkeys, 1)?),
                })
            }
            false => None,
        };
        let bellatrix = ExecutionPayloadHeader::default_for_fork(fork).map(|mut header| {
            match &mut header {
                ExecutionPayloadHeader::Bellatrix(header) => header.block_number = 1,
                ExecutionPayloadHeader::Capella(header) => header.block_number = 1,
                ExecutionPayloadHeader::Deneb(header) => header.block_number = 1,
            }
            BellatrixFields {
                latest_execution_payload_header: header,
            }
        });
        let capella = fork.is_capella_or_later().then(|| CapellaFields {
            next_withdrawal_index: 0,
            next_withdrawal_validator_index: 0,
            historical_summaries: Lazy::from_value(Default::default()),
        });
        let electra = fork.is_electra_or_later().then(|| ElectraFields {
            deposit_requests_start_index: UNSET_DEPOSIT_REQUESTS_START_INDEX,
            deposit_balance_to_consume: 0,
            exit_balance_to_consume: 0,
            earliest_exit_epoch: compute_activation_exit_epoch(epoch),
            consolidation_balance_to_consume: 0,
            earliest_consolidation_epoch: compute_activation_exit_epoch(epoch),
            pending_deposits: Lazy::from_value(Default::default()),
            pending_partial_withdrawals: Lazy::from_value(Default::default()),
            pending_consolidations: Lazy::from_value(Default::default()),
        });
        let fulu = fork.is_fulu_or_later().then(|| FuluFields {
            proposer_lookahead: ProposerLookahead::default(),
        });

        let mut state = BeaconStateView {
            fork_name: fork,
            genesis_time: config.min_genesis_time,
            genesis_validators_root: B256::repeat_byte(0x42),
            slot: self.slot,
            fork: config.fork_at(fork),
            latest_block_header: BeaconBlockHeader {
                slot: self.slot,
                proposer_index: 0,
                parent_root: tagged_root(0xa0, self.slot),
                state_root: B256::ZERO,
                body_root: B256::repeat_byte(0x0b),
            },
            block_roots: Lazy::from_value(block_roots.into()),
            state_roots: Lazy::from_value(state_roots.into()),
            historical_roots: Lazy::from_value(Default::default()),
            eth1_data: Eth1Data {
                deposit_root: B256::repeat_byte(0xde),
                deposit_count: count as u64,
                block_hash: B256::repeat_byte(0xe1),
            },
            eth1_data_votes: Lazy::from_value(Default::default()),
            eth1_deposit_index: count as u64,
            validators: Lazy::from_value(ValidatorList::new(validators)?),
            balances: Lazy::from_value(BalanceList::new(vec![MAX_EFFECTIVE_BALANCE; count])?),
            randao_mixes: Lazy::from_value(randao_mixes.into()),
            slashings: Lazy::from_value(Default::default()),
            justification_bits: JustificationBits::new(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint {
                epoch: 0,
                root: B256::repeat_byte(0xf1),
            },
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
            pubkeys: Arc::new(PubkeyCache::new()),
        };

        if state.fulu.is_some() {
            let mut lookahead = state.compute_epoch_proposers(epoch)?;
            lookahead.extend(state.compute_epoch_proposers(epoch + 1)?);
            if let Some(fulu) = state.fulu.as_mut() {
                fulu.proposer_lookahead = lookahead.into();
            }
            // Decision roots may have been read through the old state root.
            state.caches = EpochCaches::default();
            state.invalidate_root();
        }
        debug_assert_eq!(
            state.fulu.as_ref().map(|fulu| fulu.proposer_lookahead.len()),
            state.fulu.as_ref().map(|_| 2 * SLOTS_PER_EPOCH as usize)
        );
        Ok(state)
    }
}
