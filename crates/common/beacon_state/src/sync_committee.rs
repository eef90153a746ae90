use std::{collections::HashMap, sync::Arc};

use vista_bls::{PubKey, traits::Aggregatable};
use vista_consensus_misc::{
    constants::{
        BASE_REWARD_FACTOR, DOMAIN_SYNC_COMMITTEE, EFFECTIVE_BALANCE_INCREMENT, PROPOSER_WEIGHT,
        SLOTS_PER_EPOCH, SYNC_COMMITTEE_SIZE, SYNC_REWARD_WEIGHT, WEIGHT_DENOMINATOR,
    },
    misc::compute_sync_committee_period,
    proposer::compute_sync_committee_indices,
    sync_committee::SyncCommittee,
};

use crate::{errors::StateError, view::BeaconStateView};

/// A sync committee resolved to validator indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSyncCommittee {
    /// Validator index of every committee seat, in seat order.
    pub validator_indices: Vec<u64>,
    /// Seats held by each member; a validator may hold several.
    pub positions: HashMap<u64, Vec<usize>>,
}

impl IndexedSyncCommittee {
    pub fn new(validator_indices: Vec<u64>) -> Self {
        let mut positions: HashMap<u64, Vec<usize>> = HashMap::new();
        for (position, index) in validator_indices.iter().enumerate() {
            positions.entry(*index).or_default().push(position);
        }
        Self {
            validator_indices,
            positions,
        }
    }
}

impl BeaconStateView {
    fn index_sync_committee(
        &self,
        committee: &SyncCommittee,
    ) -> Result<IndexedSyncCommittee, StateError> {
        self.sync_pubkey_cache()?;
        let validator_indices = committee
            .pubkeys
            .iter()
            .enumerate()
            .map(|(position, pubkey)| {
                self.pubkeys
                    .pubkey_to_index(pubkey)
                    .ok_or(StateError::UnknownPubkey(position))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IndexedSyncCommittee::new(validator_indices))
    }

    fn indexed_sync_committee(&self, next: bool) -> Result<Arc<IndexedSyncCommittee>, StateError> {
        self.ensure_caches()?;
        let cell = &self.caches.sync_committees[next as usize];
        if let Some(indexed) = cell.get() {
            return Ok(indexed.clone());
        }
        let committee = match next {
            true => self.next_sync_committee()?,
            false => self.current_sync_committee()?,
        };
        let indexed = self.index_sync_committee(committee)?;
        Ok(cell.get_or_init(|| Arc::new(indexed)).clone())
    }

    pub fn current_sync_committee_indexed(
        &self,
    ) -> Result<Arc<IndexedSyncCommittee>, StateError> {
        self.indexed_sync_committee(false)
    }

    pub fn next_sync_committee_indexed(&self) -> Result<Arc<IndexedSyncCommittee>, StateError> {
        self.indexed_sync_committee(true)
    }

    /// The committee serving ``epoch``, which must fall in the current or next period.
    pub fn get_indexed_sync_committee_at_epoch(
        &self,
        epoch: u64,
    ) -> Result<Arc<IndexedSyncCommittee>, StateError> {
        let current_period = compute_sync_committee_period(self.epoch());
        let period = compute_sync_committee_period(epoch);
        if period == current_period {
            self.current_sync_committee_indexed()
        } else if period == current_period + 1 {
            self.next_sync_committee_indexed()
        } else {
            Err(StateError::EpochOutOfRange {
                epoch,
                reason: "sync committees are known for the current and next period only",
            })
        }
    }

    /// Return the sync committee for the period following the current one.
    pub(crate) fn compute_next_sync_committee(&self) -> Result<SyncCommittee, StateError> {
        let epoch = self.epoch() + 1;
        let columns = self.validator_columns()?;
        let indices = compute_sync_committee_indices(
            self.fork_name,
            &columns.effective_balance_increments,
            &columns.active_indices(epoch),
            self.get_seed(epoch, DOMAIN_SYNC_COMMITTEE)?.as_slice(),
        )?;
        let pubkeys = indices
            .iter()
            .map(|&index| self.validator_pubkey(index))
            .collect::<Result<Vec<_>, _>>()?;
        let aggregate_pubkey = PubKey::aggregate(&pubkeys.iter().collect::<Vec<_>>())?;
        Ok(SyncCommittee {
            pubkeys: pubkeys.into(),
            aggregate_pubkey,
        })
    }

    pub(crate) fn total_active_balance(&self) -> Result<u64, StateError> {
        let columns = self.validator_columns()?;
        let shuffling = self.shuffling_at(self.epoch())?;
        let increments = shuffling
            .active_indices
            .iter()
            .map(|&index| columns.effective_balance_increments[index as usize] as u64)
            .sum::<u64>();
        Ok((increments * EFFECTIVE_BALANCE_INCREMENT).max(EFFECTIVE_BALANCE_INCREMENT))
    }

    /// Reward of one sync committee member for one slot of participation.
    pub fn sync_participant_reward(&self) -> Result<u64, StateError> {
        self.altair_fields("sync_participant_reward")?;
        let total_active_balance = self.total_active_balance()?;
        let total_active_increments = total_active_balance / EFFECTIVE_BALANCE_INCREMENT;
        let base_reward_per_increment =
            EFFECTIVE_BALANCE_INCREMENT * BASE_REWARD_FACTOR / total_active_balance.isqrt();
        let total_base_rewards = base_reward_per_increment * total_active_increments;
        let max_participant_rewards =
            total_base_rewards * SYNC_REWARD_WEIGHT / WEIGHT_DENOMINATOR / SLOTS_PER_EPOCH;
        Ok(max_participant_rewards / SYNC_COMMITTEE_SIZE)
    }

    /// Reward of the block proposer for each included sync committee participant.
    pub fn sync_proposer_reward(&self) -> Result<u64, StateError> {
        Ok(self.sync_participant_reward()? * PROPOSER_WEIGHT
            / (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT))
    }
}

#[cfg(test)]
mod tests {
    use vista_consensus_misc::ForkName;

    use super::*;
    use crate::test_utils::TestStateBuilder;

    #[test]
    fn test_indexed_committee_resolves_pubkeys() {
        let state = TestStateBuilder::new(ForkName::Altair)
            .validator_count(16)
            .build()
            .unwrap();
        let indexed = state.current_sync_committee_indexed().unwrap();
        assert_eq!(indexed.validator_indices.len(), SYNC_COMMITTEE_SIZE as usize);

        let committee = state.current_sync_committee().unwrap();
        for (position, index) in indexed.validator_indices.iter().enumerate() {
            assert_eq!(state.validator_pubkey(*index).unwrap(), committee.pubkeys[position]);
            assert!(indexed.positions[index].contains(&position));
        }
        let seats = indexed.positions.values().map(Vec::len).sum::<usize>();
        assert_eq!(seats, SYNC_COMMITTEE_SIZE as usize);
    }

    #[test]
    fn test_committee_by_epoch() {
        let state = TestStateBuilder::new(ForkName::Bellatrix)
            .slot(300 * SLOTS_PER_EPOCH)
            .build()
            .unwrap();
        assert_eq!(
            state.get_indexed_sync_committee_at_epoch(300).unwrap(),
            state.current_sync_committee_indexed().unwrap()
        );
        assert_eq!(
            state.get_indexed_sync_committee_at_epoch(520).unwrap(),
            state.next_sync_committee_indexed().unwrap()
        );
        assert!(state.get_indexed_sync_committee_at_epoch(100).is_err());
        assert!(state.get_indexed_sync_committee_at_epoch(768).is_err());
    }

    #[test]
    fn test_unknown_member_is_reported() {
        let mut state = TestStateBuilder::new(ForkName::Deneb).build().unwrap();
        let mut committee = (**state.current_sync_committee().unwrap()).clone();
        committee.pubkeys[3] = committee.aggregate_pubkey.clone();
        if let Some(altair) = state.altair.as_mut() {
            altair.current_sync_committee.set(committee);
        }
        assert_eq!(
            state.current_sync_committee_indexed(),
            Err(StateError::UnknownPubkey(3))
        );
    }

    #[test]
    fn test_sync_rewards() {
        // 64 validators at 32 ETH: total balance 2048 ETH.
        let state = TestStateBuilder::new(ForkName::Electra)
            .validator_count(64)
            .build()
            .unwrap();
        let base_reward_per_increment = 1_000_000_000 * 64 / 2_048_000_000_000u64.isqrt();
        let max_participant = base_reward_per_increment * 2048 * 2 / 64 / 32;
        assert_eq!(state.sync_participant_reward().unwrap(), max_participant / 512);
        assert_eq!(
            state.sync_proposer_reward().unwrap(),
            max_participant / 512 * 8 / 56
        );

        let phase0 = TestStateBuilder::new(ForkName::Phase0).build().unwrap();
        assert!(phase0.sync_participant_reward().is_err());
    }

    #[test]
    fn test_next_committee_is_sampled_from_active_set() {
        let state = TestStateBuilder::new(ForkName::Capella)
            .validator_count(32)
            .build()
            .unwrap();
        let committee = state.compute_next_sync_committee().unwrap();
        let cache = state.pubkey_cache();
        assert!(
            committee
                .pubkeys
                .iter()
                .all(|pubkey| cache.pubkey_to_index(pubkey).is_some())
        );
    }
}
