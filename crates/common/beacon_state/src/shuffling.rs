//! Committee shufflings, proposer sequences and the decision roots they are keyed by.

use std::{mem, sync::Arc};

use alloy_primitives::{B256, aliases::B32};
use ethereum_hashing::hash;
use tracing::trace;
use vista_consensus_misc::{
    constants::{
        DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, EPOCHS_PER_HISTORICAL_VECTOR,
        MIN_SEED_LOOKAHEAD, SHUFFLE_ROUND_COUNT, SLOTS_PER_EPOCH,
    },
    misc::{
        compute_committee_count_per_slot, compute_committee_range, compute_epoch_at_slot,
        compute_start_slot_at_epoch,
    },
    proposer::compute_proposer_index,
    shuffle_list,
};

use crate::{
    caches::{CacheTag, RelativeEpoch, rebase_window},
    errors::StateError,
    view::BeaconStateView,
};

/// Committee assignments of one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochShuffling {
    pub epoch: u64,
    pub decision_root: B256,
    pub seed: B256,
    pub active_indices: Vec<u64>,
    /// Active indices in committee order; committees are consecutive slices.
    pub shuffling: Vec<u64>,
    pub committees_per_slot: u64,
}

impl EpochShuffling {
    pub fn new(
        epoch: u64,
        decision_root: B256,
        seed: B256,
        active_indices: Vec<u64>,
    ) -> Result<Self, StateError> {
        let mut shuffling = active_indices.clone();
        shuffle_list(&mut shuffling, seed.as_slice(), SHUFFLE_ROUND_COUNT, false)?;
        Ok(Self {
            epoch,
            decision_root,
            seed,
            committees_per_slot: compute_committee_count_per_slot(active_indices.len()),
            active_indices,
            shuffling,
        })
    }

    /// Members of committee `index` at `slot`.
    pub fn committee(&self, slot: u64, index: u64) -> Result<&[u64], StateError> {
        if compute_epoch_at_slot(slot) != self.epoch {
            return Err(StateError::EpochOutOfRange {
                epoch: compute_epoch_at_slot(slot),
                reason: "slot is outside the shuffling's epoch",
            });
        }
        if index >= self.committees_per_slot {
            return Err(StateError::IndexOutOfRange {
                index,
                count: self.committees_per_slot,
            });
        }
        let committee_index = (slot % SLOTS_PER_EPOCH) * self.committees_per_slot + index;
        let range = compute_committee_range(
            self.shuffling.len(),
            committee_index,
            self.committees_per_slot * SLOTS_PER_EPOCH,
        );
        Ok(&self.shuffling[range])
    }
}

impl CacheTag for EpochShuffling {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn decision_root(&self) -> B256 {
        self.decision_root
    }
}

/// Proposer of every slot of one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochProposers {
    pub epoch: u64,
    pub decision_root: B256,
    pub indices: Vec<u64>,
}

impl CacheTag for EpochProposers {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn decision_root(&self) -> B256 {
        self.decision_root
    }
}

impl BeaconStateView {
    /// Return the seed at ``epoch``.
    pub fn get_seed(&self, epoch: u64, domain_type: B32) -> Result<B256, StateError> {
        let mix =
            self.get_randao_mix(epoch + EPOCHS_PER_HISTORICAL_VECTOR - MIN_SEED_LOOKAHEAD - 1)?;
        Ok(B256::from_slice(&hash(
            &[domain_type.as_slice(), &epoch.to_le_bytes(), mix.as_slice()].concat(),
        )))
    }

    /// Root of the latest block, with the state root filled in if the block was just applied.
    pub fn latest_block_root(&self) -> Result<B256, StateError> {
        let mut header = self.latest_block_header.clone();
        if header.state_root == B256::ZERO {
            header.state_root = self.hash_tree_root()?;
        }
        Ok(tree_hash::TreeHash::tree_hash_root(&header))
    }

    /// Block root at `slot`, or the latest block root when `slot` is not in the past.
    pub(crate) fn block_root_at_or_latest(&self, slot: u64) -> Result<B256, StateError> {
        match slot < self.slot {
            true => self.get_block_root(slot),
            false => self.latest_block_root(),
        }
    }

    /// Root of the block that fixed the committee shuffling of ``epoch``.
    pub fn get_shuffling_decision_root(&self, epoch: u64) -> Result<B256, StateError> {
        let pivot = compute_start_slot_at_epoch(epoch.saturating_sub(MIN_SEED_LOOKAHEAD))
            .saturating_sub(1);
        self.block_root_at_or_latest(pivot)
    }

    /// Root of the block that fixed the proposers of ``epoch``.
    pub fn get_proposer_decision_root(&self, epoch: u64) -> Result<B256, StateError> {
        if self.fulu.is_some() {
            return self.get_shuffling_decision_root(epoch);
        }
        self.block_root_at_or_latest(compute_start_slot_at_epoch(epoch).saturating_sub(1))
    }

    pub fn previous_decision_root(&self) -> Result<B256, StateError> {
        self.get_shuffling_decision_root(self.previous_epoch())
    }

    pub fn current_decision_root(&self) -> Result<B256, StateError> {
        self.get_shuffling_decision_root(self.epoch())
    }

    pub fn next_decision_root(&self) -> Result<B256, StateError> {
        self.get_shuffling_decision_root(self.epoch() + 1)
    }

    /// The cached shuffling of ``epoch``, computed on first use.
    pub fn shuffling_at(&self, epoch: u64) -> Result<Arc<EpochShuffling>, StateError> {
        self.ensure_caches()?;
        let relative = RelativeEpoch::from_epoch(self.epoch(), epoch)?;
        let cell = &self.caches.shufflings[relative as usize];
        if let Some(shuffling) = cell.get() {
            return Ok(shuffling.clone());
        }

        trace!(epoch, "Computing committee shuffling");
        let shuffling = EpochShuffling::new(
            epoch,
            self.get_shuffling_decision_root(epoch)?,
            self.get_seed(epoch, DOMAIN_BEACON_ATTESTER)?,
            self.validator_columns()?.active_indices(epoch),
        )?;
        Ok(cell.get_or_init(|| Arc::new(shuffling)).clone())
    }

    pub fn get_committee_count_per_slot(&self, epoch: u64) -> Result<u64, StateError> {
        Ok(self.shuffling_at(epoch)?.committees_per_slot)
    }

    /// Return the beacon committee at ``slot`` for ``index``.
    pub fn get_beacon_committee(&self, slot: u64, index: u64) -> Result<Vec<u64>, StateError> {
        Ok(self
            .shuffling_at(compute_epoch_at_slot(slot))?
            .committee(slot, index)?
            .to_vec())
    }

    /// Active indices of ``epoch``, through the shuffling cache when the epoch is in its window.
    fn active_indices_at(&self, epoch: u64) -> Result<Vec<u64>, StateError> {
        match RelativeEpoch::from_epoch(self.epoch(), epoch) {
            Ok(_) => Ok(self.shuffling_at(epoch)?.active_indices.clone()),
            Err(_) => Ok(self.validator_columns()?.active_indices(epoch)),
        }
    }

    /// Sample the proposer of every slot of ``epoch`` from the registry.
    pub(crate) fn compute_epoch_proposers(&self, epoch: u64) -> Result<Vec<u64>, StateError> {
        let columns = self.validator_columns()?;
        let indices = self.active_indices_at(epoch)?;
        let epoch_seed = self.get_seed(epoch, DOMAIN_BEACON_PROPOSER)?;
        let start_slot = compute_start_slot_at_epoch(epoch);

        (start_slot..start_slot + SLOTS_PER_EPOCH)
            .map(|slot| {
                let seed = hash(&[epoch_seed.as_slice(), &slot.to_le_bytes()].concat());
                Ok(compute_proposer_index(
                    self.fork_name,
                    &columns.effective_balance_increments,
                    &indices,
                    &seed,
                )?)
            })
            .collect()
    }

    /// The cached proposers of ``epoch``. From Fulu on, the current and next epoch are read
    /// from the proposer lookahead.
    pub fn proposers_at(&self, epoch: u64) -> Result<Arc<EpochProposers>, StateError> {
        self.ensure_caches()?;
        let relative = RelativeEpoch::from_epoch(self.epoch(), epoch)?;
        let cell = &self.caches.proposers[relative as usize];
        if let Some(proposers) = cell.get() {
            return Ok(proposers.clone());
        }

        let slots = SLOTS_PER_EPOCH as usize;
        let indices = match (&self.fulu, relative) {
            (Some(fulu), RelativeEpoch::Current) => fulu.proposer_lookahead[..slots].to_vec(),
            (Some(fulu), RelativeEpoch::Next) => fulu.proposer_lookahead[slots..].to_vec(),
            _ => self.compute_epoch_proposers(epoch)?,
        };
        let proposers = EpochProposers {
            epoch,
            decision_root: self.get_proposer_decision_root(epoch)?,
            indices,
        };
        Ok(cell.get_or_init(|| Arc::new(proposers)).clone())
    }

    /// Return the beacon proposer index at ``slot``.
    pub fn get_beacon_proposer(&self, slot: u64) -> Result<u64, StateError> {
        let proposers = self.proposers_at(compute_epoch_at_slot(slot))?;
        Ok(proposers.indices[(slot % SLOTS_PER_EPOCH) as usize])
    }

    pub fn previous_proposers(&self) -> Result<Vec<u64>, StateError> {
        Ok(self.proposers_at(self.previous_epoch())?.indices.clone())
    }

    pub fn current_proposers(&self) -> Result<Vec<u64>, StateError> {
        Ok(self.proposers_at(self.epoch())?.indices.clone())
    }

    pub fn next_proposers(&self) -> Result<Vec<u64>, StateError> {
        Ok(self.proposers_at(self.epoch() + 1)?.indices.clone())
    }

    /// Realign the epoch caches after the state entered a new epoch.
    pub(crate) fn rebase_caches(&mut self) -> Result<(), StateError> {
        let epochs = [self.previous_epoch(), self.epoch(), self.epoch() + 1];
        let mut shuffling_keys = [(0, B256::ZERO); 3];
        let mut proposer_keys = [(0, B256::ZERO); 3];
        for (position, epoch) in epochs.into_iter().enumerate() {
            shuffling_keys[position] = (epoch, self.get_shuffling_decision_root(epoch)?);
            proposer_keys[position] = (epoch, self.get_proposer_decision_root(epoch)?);
        }

        let shufflings = mem::take(&mut self.caches.shufflings);
        self.caches.shufflings = rebase_window(shufflings, shuffling_keys);
        let proposers = mem::take(&mut self.caches.proposers);
        self.caches.proposers = rebase_window(proposers, proposer_keys);
        Ok(())
    }
}
