use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};

use alloy_primitives::B256;
use bytes::Bytes;
use ssz_types::{
    BitVector, FixedVector, VariableList,
    typenum::{
        U4, U64, U2048, U4096, U8192, U65536, U262144, U16777216, U134217728, U1099511627776,
    },
};
use tracing::debug;
use vista_consensus_misc::{
    ForkName,
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{EPOCHS_PER_HISTORICAL_VECTOR, SLOTS_PER_HISTORICAL_ROOT},
    eth_1_data::Eth1Data,
    execution_payload_header::ExecutionPayloadHeader,
    fork::Fork,
    historical_summary::HistoricalSummary,
    misc::{compute_epoch_at_slot, compute_previous_epoch},
    pending_attestation::PendingAttestation,
    pending_consolidation::PendingConsolidation,
    pending_deposit::PendingDeposit,
    pending_partial_withdrawal::PendingPartialWithdrawal,
    sync_committee::SyncCommittee,
    validator::Validator,
};
use vista_merkle::{PaddedTree, tree_depth};

use crate::{
    caches::EpochCaches, codec, errors::StateError, field::StateField, lazy::Lazy,
    pubkey_cache::PubkeyCache,
};

pub type RootVector = FixedVector<B256, U8192>;
pub type HistoricalRoots = VariableList<B256, U16777216>;
pub type Eth1DataVotes = VariableList<Eth1Data, U2048>;
pub type ValidatorList = VariableList<Validator, U1099511627776>;
pub type BalanceList = VariableList<u64, U1099511627776>;
pub type RandaoMixes = FixedVector<B256, U65536>;
pub type Slashings = FixedVector<u64, U8192>;
pub type EpochAttestations = VariableList<PendingAttestation, U4096>;
pub type ParticipationList = VariableList<u8, U1099511627776>;
pub type InactivityScores = VariableList<u64, U1099511627776>;
pub type HistoricalSummaries = VariableList<HistoricalSummary, U16777216>;
pub type PendingDeposits = VariableList<PendingDeposit, U134217728>;
pub type PendingPartialWithdrawals = VariableList<PendingPartialWithdrawal, U134217728>;
pub type PendingConsolidations = VariableList<PendingConsolidation, U262144>;
pub type ProposerLookahead = FixedVector<u64, U64>;
pub type JustificationBits = BitVector<U4>;

/// Attestation bookkeeping, replaced by participation flags in Altair.
#[derive(Debug, Clone)]
pub(crate) struct Phase0Fields {
    pub previous_epoch_attestations: EpochAttestations,
    pub current_epoch_attestations: EpochAttestations,
}

#[derive(Debug, Clone)]
pub(crate) struct AltairFields {
    pub previous_epoch_participation: Lazy<ParticipationList>,
    pub current_epoch_participation: Lazy<ParticipationList>,
    pub inactivity_scores: Lazy<InactivityScores>,
    pub current_sync_committee: Lazy<SyncCommittee>,
    pub next_sync_committee: Lazy<SyncCommittee>,
}

#[derive(Debug, Clone)]
pub(crate) struct BellatrixFields {
    pub latest_execution_payload_header: ExecutionPayloadHeader,
}

#[derive(Debug, Clone)]
pub(crate) struct CapellaFields {
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: Lazy<HistoricalSummaries>,
}

#[derive(Debug, Clone)]
pub(crate) struct ElectraFields {
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: Lazy<PendingDeposits>,
    pub pending_partial_withdrawals: Lazy<PendingPartialWithdrawals>,
    pub pending_consolidations: Lazy<PendingConsolidations>,
}

#[derive(Debug, Clone)]
pub(crate) struct FuluFields {
    pub proposer_lookahead: ProposerLookahead,
}

/// A beacon state decoded from its SSZ bytes.
///
/// Scalars are decoded eagerly. Large composite fields keep their encoded bytes and decode on
/// first access. Derived data (validator columns, shufflings, proposers, indexed sync
/// committees) is memoized in caches that can be moved to the state produced by
/// [`BeaconStateView::process_slots`].
#[derive(Debug)]
pub struct BeaconStateView {
    pub(crate) fork_name: ForkName,

    // Versioning
    pub(crate) genesis_time: u64,
    pub(crate) genesis_validators_root: B256,
    pub(crate) slot: u64,
    pub(crate) fork: Fork,

    // History
    pub(crate) latest_block_header: BeaconBlockHeader,
    pub(crate) block_roots: Lazy<RootVector>,
    pub(crate) state_roots: Lazy<RootVector>,
    /// Frozen in Capella, replaced by historical_summaries
    pub(crate) historical_roots: Lazy<HistoricalRoots>,

    // Eth1
    pub(crate) eth1_data: Eth1Data,
    pub(crate) eth1_data_votes: Lazy<Eth1DataVotes>,
    pub(crate) eth1_deposit_index: u64,

    // Registry
    pub(crate) validators: Lazy<ValidatorList>,
    pub(crate) balances: Lazy<BalanceList>,

    // Randomness
    pub(crate) randao_mixes: Lazy<RandaoMixes>,

    // Slashings
    pub(crate) slashings: Lazy<Slashings>,

    // Finality
    pub(crate) justification_bits: JustificationBits,
    pub(crate) previous_justified_checkpoint: Checkpoint,
    pub(crate) current_justified_checkpoint: Checkpoint,
    pub(crate) finalized_checkpoint: Checkpoint,

    pub(crate) phase0: Option<Phase0Fields>,
    pub(crate) altair: Option<AltairFields>,
    pub(crate) bellatrix: Option<BellatrixFields>,
    pub(crate) capella: Option<CapellaFields>,
    pub(crate) electra: Option<ElectraFields>,
    pub(crate) fulu: Option<FuluFields>,

    pub(crate) state_root: OnceLock<B256>,
    pub(crate) caches: EpochCaches,
    pub(crate) caches_transferred: bool,
    pub(crate) created_with_transfer_cache: bool,
    pub(crate) cloned_count: AtomicU64,
    pub(crate) cloned_count_with_transfer_cache: AtomicU64,
    pub(crate) pubkeys: Arc<PubkeyCache>,
}

impl Clone for BeaconStateView {
    /// Copies share every immutable cache entry with the original.
    fn clone(&self) -> Self {
        self.cloned_count.fetch_add(1, Ordering::Relaxed);
        self.copy_with_caches(self.caches.clone())
    }
}

impl BeaconStateView {
    /// Decode a state of `fork` from `bytes`, with a fresh pubkey index.
    pub fn from_ssz_bytes(fork: ForkName, bytes: &[u8]) -> Result<Self, StateError> {
        Self::from_bytes(fork, Bytes::copy_from_slice(bytes), Arc::default())
    }

    /// Decode a state without copying `bytes`; composite fields keep slices of the buffer.
    pub fn from_bytes(
        fork: ForkName,
        bytes: Bytes,
        pubkeys: Arc<PubkeyCache>,
    ) -> Result<Self, StateError> {
        let state = codec::decode_state(fork, bytes.clone(), pubkeys)?;
        debug!(
            fork = %fork,
            slot = state.slot,
            size = bytes.len(),
            validators = state.validator_count()?,
            "Decoded beacon state"
        );
        Ok(state)
    }

    pub(crate) fn copy_with_caches(&self, caches: EpochCaches) -> Self {
        Self {
            fork_name: self.fork_name,
            genesis_time: self.genesis_time,
            genesis_validators_root: self.genesis_validators_root,
            slot: self.slot,
            fork: self.fork.clone(),
            latest_block_header: self.latest_block_header.clone(),
            block_roots: self.block_roots.clone(),
            state_roots: self.state_roots.clone(),
            historical_roots: self.historical_roots.clone(),
            eth1_data: self.eth1_data.clone(),
            eth1_data_votes: self.eth1_data_votes.clone(),
            eth1_deposit_index: self.eth1_deposit_index,
            validators: self.validators.clone(),
            balances: self.balances.clone(),
            randao_mixes: self.randao_mixes.clone(),
            slashings: self.slashings.clone(),
            justification_bits: self.justification_bits.clone(),
            previous_justified_checkpoint: self.previous_justified_checkpoint,
            current_justified_checkpoint: self.current_justified_checkpoint,
            finalized_checkpoint: self.finalized_checkpoint,
            phase0: self.phase0.clone(),
            altair: self.altair.clone(),
            bellatrix: self.bellatrix.clone(),
            capella: self.capella.clone(),
            electra: self.electra.clone(),
            fulu: self.fulu.clone(),
            state_root: self.state_root.clone(),
            caches,
            caches_transferred: false,
            created_with_transfer_cache: false,
            cloned_count: AtomicU64::new(0),
            cloned_count_with_transfer_cache: AtomicU64::new(0),
            pubkeys: self.pubkeys.clone(),
        }
    }

    /// The fields of this state's fork, in container order.
    pub(crate) fn fields(&self) -> Vec<&dyn StateField> {
        let mut fields: Vec<&dyn StateField> = vec![
            &self.genesis_time,
            &self.genesis_validators_root,
            &self.slot,
            &self.fork,
            &self.latest_block_header,
            &self.block_roots,
            &self.state_roots,
            &self.historical_roots,
            &self.eth1_data,
            &self.eth1_data_votes,
            &self.eth1_deposit_index,
            &self.validators,
            &self.balances,
            &self.randao_mixes,
            &self.slashings,
        ];
        if let Some(phase0) = &self.phase0 {
            fields.push(&phase0.previous_epoch_attestations);
            fields.push(&phase0.current_epoch_attestations);
        }
        if let Some(altair) = &self.altair {
            fields.push(&altair.previous_epoch_participation);
            fields.push(&altair.current_epoch_participation);
        }
        fields.extend([
            &self.justification_bits as &dyn StateField,
            &self.previous_justified_checkpoint,
            &self.current_justified_checkpoint,
            &self.finalized_checkpoint,
        ]);
        if let Some(altair) = &self.altair {
            fields.push(&altair.inactivity_scores);
            fields.push(&altair.current_sync_committee);
            fields.push(&altair.next_sync_committee);
        }
        if let Some(bellatrix) = &self.bellatrix {
            fields.push(&bellatrix.latest_execution_payload_header);
        }
        if let Some(capella) = &self.capella {
            fields.push(&capella.next_withdrawal_index);
            fields.push(&capella.next_withdrawal_validator_index);
            fields.push(&capella.historical_summaries);
        }
        if let Some(electra) = &self.electra {
            fields.extend([
                &electra.deposit_requests_start_index as &dyn StateField,
                &electra.deposit_balance_to_consume,
                &electra.exit_balance_to_consume,
                &electra.earliest_exit_epoch,
                &electra.consolidation_balance_to_consume,
                &electra.earliest_consolidation_epoch,
                &electra.pending_deposits,
                &electra.pending_partial_withdrawals,
                &electra.pending_consolidations,
            ]);
        }
        if let Some(fulu) = &self.fulu {
            fields.push(&fulu.proposer_lookahead);
        }
        fields
    }

    pub fn hash_tree_root(&self) -> Result<B256, StateError> {
        if let Some(root) = self.state_root.get() {
            return Ok(*root);
        }
        let fields = self.fields();
        let roots = fields
            .iter()
            .map(|field| field.field_root())
            .collect::<Result<Vec<_>, _>>()?;
        let root = PaddedTree::new(roots, tree_depth(fields.len()))?.root();
        Ok(*self.state_root.get_or_init(|| root))
    }

    /// Drop the memoized state root after a mutation.
    pub(crate) fn invalidate_root(&mut self) {
        self.state_root.take();
    }

    fn fork_fields<'a, T>(
        &self,
        group: &'a Option<T>,
        field: &'static str,
    ) -> Result<&'a T, StateError> {
        group.as_ref().ok_or(StateError::ForkMismatch {
            field,
            fork: self.fork_name,
        })
    }

    pub(crate) fn phase0_fields(&self, field: &'static str) -> Result<&Phase0Fields, StateError> {
        self.fork_fields(&self.phase0, field)
    }

    pub(crate) fn altair_fields(&self, field: &'static str) -> Result<&AltairFields, StateError> {
        self.fork_fields(&self.altair, field)
    }

    fn bellatrix_fields(&self, field: &'static str) -> Result<&BellatrixFields, StateError> {
        self.fork_fields(&self.bellatrix, field)
    }

    fn capella_fields(&self, field: &'static str) -> Result<&CapellaFields, StateError> {
        self.fork_fields(&self.capella, field)
    }

    pub(crate) fn electra_fields(
        &self,
        field: &'static str,
    ) -> Result<&ElectraFields, StateError> {
        self.fork_fields(&self.electra, field)
    }

    pub(crate) fn fulu_fields(&self, field: &'static str) -> Result<&FuluFields, StateError> {
        self.fork_fields(&self.fulu, field)
    }

    pub fn fork_name(&self) -> ForkName {
        self.fork_name
    }

    pub fn genesis_time(&self) -> u64 {
        self.genesis_time
    }

    pub fn genesis_validators_root(&self) -> B256 {
        self.genesis_validators_root
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// Return the current epoch.
    pub fn epoch(&self) -> u64 {
        compute_epoch_at_slot(self.slot)
    }

    /// Return the previous epoch (unless the current epoch is ``GENESIS_EPOCH``).
    pub fn previous_epoch(&self) -> u64 {
        compute_previous_epoch(self.epoch())
    }

    pub fn fork(&self) -> &Fork {
        &self.fork
    }

    pub fn latest_block_header(&self) -> &BeaconBlockHeader {
        &self.latest_block_header
    }

    pub fn eth1_data(&self) -> &Eth1Data {
        &self.eth1_data
    }

    pub fn eth1_deposit_index(&self) -> u64 {
        self.eth1_deposit_index
    }

    pub fn justification_bits(&self) -> &JustificationBits {
        &self.justification_bits
    }

    pub fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    pub fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    pub fn block_roots(&self) -> Result<&Arc<RootVector>, StateError> {
        self.block_roots.get()
    }

    pub fn state_roots(&self) -> Result<&Arc<RootVector>, StateError> {
        self.state_roots.get()
    }

    pub fn historical_roots(&self) -> Result<&Arc<HistoricalRoots>, StateError> {
        self.historical_roots.get()
    }

    pub fn eth1_data_votes(&self) -> Result<&Arc<Eth1DataVotes>, StateError> {
        self.eth1_data_votes.get()
    }

    pub fn randao_mixes(&self) -> Result<&Arc<RandaoMixes>, StateError> {
        self.randao_mixes.get()
    }

    pub fn slashings(&self) -> Result<&Arc<Slashings>, StateError> {
        self.slashings.get()
    }

    /// Return the block root at a recent ``slot``.
    pub fn get_block_root(&self, slot: u64) -> Result<B256, StateError> {
        if !(slot < self.slot && self.slot <= slot + SLOTS_PER_HISTORICAL_ROOT) {
            return Err(StateError::SlotOutOfRange {
                slot,
                state_slot: self.slot,
            });
        }
        Ok(self.block_roots.get()?[(slot % SLOTS_PER_HISTORICAL_ROOT) as usize])
    }

    /// Return the randao mix at a recent ``epoch``.
    pub fn get_randao_mix(&self, epoch: u64) -> Result<B256, StateError> {
        Ok(self.randao_mixes.get()?[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize])
    }

    pub fn previous_epoch_attestations(&self) -> Result<&EpochAttestations, StateError> {
        Ok(&self
            .phase0_fields("previous_epoch_attestations")?
            .previous_epoch_attestations)
    }

    pub fn current_epoch_attestations(&self) -> Result<&EpochAttestations, StateError> {
        Ok(&self
            .phase0_fields("current_epoch_attestations")?
            .current_epoch_attestations)
    }

    pub fn previous_epoch_participation(&self) -> Result<&Arc<ParticipationList>, StateError> {
        self.altair_fields("previous_epoch_participation")?
            .previous_epoch_participation
            .get()
    }

    pub fn current_epoch_participation(&self) -> Result<&Arc<ParticipationList>, StateError> {
        self.altair_fields("current_epoch_participation")?
            .current_epoch_participation
            .get()
    }

    pub fn inactivity_scores(&self) -> Result<&Arc<InactivityScores>, StateError> {
        self.altair_fields("inactivity_scores")?
            .inactivity_scores
            .get()
    }

    pub fn current_sync_committee(&self) -> Result<&Arc<SyncCommittee>, StateError> {
        self.altair_fields("current_sync_committee")?
            .current_sync_committee
            .get()
    }

    pub fn next_sync_committee(&self) -> Result<&Arc<SyncCommittee>, StateError> {
        self.altair_fields("next_sync_committee")?
            .next_sync_committee
            .get()
    }

    pub fn latest_execution_payload_header(&self) -> Result<&ExecutionPayloadHeader, StateError> {
        Ok(&self
            .bellatrix_fields("latest_execution_payload_header")?
            .latest_execution_payload_header)
    }

    /// Whether the state layout carries an execution payload header.
    pub fn is_execution_state_type(&self) -> bool {
        self.bellatrix.is_some()
    }

    pub fn is_merge_transition_complete(&self) -> bool {
        self.bellatrix
            .as_ref()
            .is_some_and(|bellatrix| !bellatrix.latest_execution_payload_header.is_default())
    }

    pub fn next_withdrawal_index(&self) -> Result<u64, StateError> {
        Ok(self.capella_fields("next_withdrawal_index")?.next_withdrawal_index)
    }

    pub fn next_withdrawal_validator_index(&self) -> Result<u64, StateError> {
        Ok(self
            .capella_fields("next_withdrawal_validator_index")?
            .next_withdrawal_validator_index)
    }

    pub fn historical_summaries(&self) -> Result<&Arc<HistoricalSummaries>, StateError> {
        self.capella_fields("historical_summaries")?
            .historical_summaries
            .get()
    }

    pub fn deposit_requests_start_index(&self) -> Result<u64, StateError> {
        Ok(self
            .electra_fields("deposit_requests_start_index")?
            .deposit_requests_start_index)
    }

    pub fn deposit_balance_to_consume(&self) -> Result<u64, StateError> {
        Ok(self
            .electra_fields("deposit_balance_to_consume")?
            .deposit_balance_to_consume)
    }

    pub fn exit_balance_to_consume(&self) -> Result<u64, StateError> {
        Ok(self
            .electra_fields("exit_balance_to_consume")?
            .exit_balance_to_consume)
    }

    pub fn earliest_exit_epoch(&self) -> Result<u64, StateError> {
        Ok(self.electra_fields("earliest_exit_epoch")?.earliest_exit_epoch)
    }

    pub fn consolidation_balance_to_consume(&self) -> Result<u64, StateError> {
        Ok(self
            .electra_fields("consolidation_balance_to_consume")?
            .consolidation_balance_to_consume)
    }

    pub fn earliest_consolidation_epoch(&self) -> Result<u64, StateError> {
        Ok(self
            .electra_fields("earliest_consolidation_epoch")?
            .earliest_consolidation_epoch)
    }

    pub fn pending_deposits(&self) -> Result<&Arc<PendingDeposits>, StateError> {
        self.electra_fields("pending_deposits")?
            .pending_deposits
            .get()
    }

    pub fn pending_deposits_count(&self) -> Result<usize, StateError> {
        Ok(self.pending_deposits()?.len())
    }

    pub fn pending_partial_withdrawals(
        &self,
    ) -> Result<&Arc<PendingPartialWithdrawals>, StateError> {
        self.electra_fields("pending_partial_withdrawals")?
            .pending_partial_withdrawals
            .get()
    }

    pub fn pending_partial_withdrawals_count(&self) -> Result<usize, StateError> {
        Ok(self.pending_partial_withdrawals()?.len())
    }

    pub fn pending_consolidations(&self) -> Result<&Arc<PendingConsolidations>, StateError> {
        self.electra_fields("pending_consolidations")?
            .pending_consolidations
            .get()
    }

    pub fn pending_consolidations_count(&self) -> Result<usize, StateError> {
        Ok(self.pending_consolidations()?.len())
    }

    pub fn proposer_lookahead(&self) -> Result<&ProposerLookahead, StateError> {
        Ok(&self.fulu_fields("proposer_lookahead")?.proposer_lookahead)
    }

    /// Number of plain copies made of this state, including non-transferring slot advances.
    pub fn cloned_count(&self) -> u64 {
        self.cloned_count.load(Ordering::Relaxed)
    }

    pub fn cloned_count_with_transfer_cache(&self) -> u64 {
        self.cloned_count_with_transfer_cache
            .load(Ordering::Relaxed)
    }

    pub fn created_with_transfer_cache(&self) -> bool {
        self.created_with_transfer_cache
    }

    pub fn pubkey_cache(&self) -> &Arc<PubkeyCache> {
        &self.pubkeys
    }

    /// Fails once the caches of this state were moved to a newer state.
    pub(crate) fn ensure_caches(&self) -> Result<(), StateError> {
        match self.caches_transferred {
            true => Err(StateError::CacheTransferred),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use vista_consensus_misc::constants::SLOTS_PER_EPOCH;

    use super::*;
    use crate::test_utils::TestStateBuilder;

    #[test]
    fn test_scalar_accessors() {
        let state = TestStateBuilder::new(ForkName::Electra)
            .slot(3 * SLOTS_PER_EPOCH + 5)
            .build()
            .unwrap();
        assert_eq!(state.fork_name(), ForkName::Electra);
        assert_eq!(state.epoch(), 3);
        assert_eq!(state.previous_epoch(), 2);
        assert!(state.is_execution_state_type());
        assert!(state.is_merge_transition_complete());
        assert_eq!(state.pending_deposits_count().unwrap(), 0);
        assert_eq!(state.get_randao_mix(3).unwrap(), state.randao_mixes().unwrap()[3]);
    }

    #[test]
    fn test_fork_gated_fields() {
        let state = TestStateBuilder::new(ForkName::Phase0).build().unwrap();
        assert!(state.previous_epoch_attestations().unwrap().is_empty());
        assert!(!state.is_execution_state_type());
        assert!(!state.is_merge_transition_complete());
        assert_eq!(
            state.current_epoch_participation().unwrap_err(),
            StateError::ForkMismatch {
                field: "current_epoch_participation",
                fork: ForkName::Phase0
            }
        );
        assert!(state.latest_execution_payload_header().is_err());
        assert!(state.historical_summaries().is_err());
        assert!(state.pending_consolidations_count().is_err());
        assert!(state.proposer_lookahead().is_err());

        let state = TestStateBuilder::new(ForkName::Capella).build().unwrap();
        assert!(state.previous_epoch_attestations().is_err());
        assert!(state.historical_summaries().unwrap().is_empty());
        assert!(
            state
                .latest_execution_payload_header()
                .unwrap()
                .withdrawals_root()
                .is_some()
        );
        assert!(state.pending_deposits().is_err());
    }

    #[test]
    fn test_block_root_window() {
        let state = TestStateBuilder::new(ForkName::Altair)
            .slot(10)
            .build()
            .unwrap();
        assert_eq!(
            state.get_block_root(9).unwrap(),
            state.block_roots().unwrap()[9]
        );
        assert_eq!(
            state.get_block_root(10),
            Err(StateError::SlotOutOfRange {
                slot: 10,
                state_slot: 10
            })
        );
    }

    #[test]
    fn test_clone_counts() {
        let state = TestStateBuilder::new(ForkName::Deneb).build().unwrap();
        let copy = state.clone();
        assert_eq!(state.cloned_count(), 1);
        assert_eq!(copy.cloned_count(), 0);
        assert!(!copy.created_with_transfer_cache());
        assert_eq!(copy.hash_tree_root().unwrap(), state.hash_tree_root().unwrap());
    }
}
