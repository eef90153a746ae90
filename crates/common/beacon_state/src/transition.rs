//! Advancing a state through empty slots.

use std::{
    collections::HashSet,
    mem,
    sync::{OnceLock, atomic::Ordering},
};

use alloy_primitives::B256;
use tracing::{debug, trace};
use tree_hash::TreeHash;
use vista_consensus_misc::{
    checkpoint::Checkpoint,
    constants::{
        EFFECTIVE_BALANCE_INCREMENT, EPOCHS_PER_ETH1_VOTING_PERIOD, EPOCHS_PER_HISTORICAL_VECTOR,
        EPOCHS_PER_SLASHINGS_VECTOR, EPOCHS_PER_SYNC_COMMITTEE_PERIOD, GENESIS_EPOCH,
        JUSTIFICATION_BITS_LENGTH, MIN_SEED_LOOKAHEAD, SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT,
        TIMELY_TARGET_FLAG_INDEX,
    },
    historical_summary::HistoricalSummary,
    misc::compute_start_slot_at_epoch,
};
use vista_merkle::hash_concat;

use crate::{
    caches::EpochCaches,
    errors::StateError,
    lazy::Lazy,
    view::{BeaconStateView, EpochAttestations, Eth1DataVotes, JustificationBits, ParticipationList},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSlotsOptions {
    /// Move the epoch caches into the new state instead of sharing them. The source state
    /// fails every cached read afterwards.
    pub transfer_cache: bool,
}

/// Justification state as weighed at an epoch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FinalityCheckpoints {
    justification_bits: [bool; JUSTIFICATION_BITS_LENGTH],
    previous_justified: Checkpoint,
    current_justified: Checkpoint,
    finalized: Checkpoint,
}

impl FinalityCheckpoints {
    fn weigh(
        &mut self,
        current_epoch: u64,
        total_active_balance: u64,
        previous_target_balance: u64,
        current_target_balance: u64,
        previous_checkpoint_root: B256,
        current_checkpoint_root: B256,
    ) {
        let old_previous_justified = self.previous_justified;
        let old_current_justified = self.current_justified;
        self.previous_justified = self.current_justified;

        self.justification_bits.rotate_right(1);
        self.justification_bits[0] = false;
        if previous_target_balance * 3 >= total_active_balance * 2 {
            self.current_justified = Checkpoint {
                epoch: current_epoch - 1,
                root: previous_checkpoint_root,
            };
            self.justification_bits[1] = true;
        }
        if current_target_balance * 3 >= total_active_balance * 2 {
            self.current_justified = Checkpoint {
                epoch: current_epoch,
                root: current_checkpoint_root,
            };
            self.justification_bits[0] = true;
        }

        let bits = self.justification_bits;
        // The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
        if bits[1..4].iter().all(|&bit| bit) && old_previous_justified.epoch + 3 == current_epoch {
            self.finalized = old_previous_justified;
        }
        // The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
        if bits[1..3].iter().all(|&bit| bit) && old_previous_justified.epoch + 2 == current_epoch {
            self.finalized = old_previous_justified;
        }
        // The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
        if bits[0..3].iter().all(|&bit| bit) && old_current_justified.epoch + 2 == current_epoch {
            self.finalized = old_current_justified;
        }
        // The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
        if bits[0..2].iter().all(|&bit| bit) && old_current_justified.epoch + 1 == current_epoch {
            self.finalized = old_current_justified;
        }
    }
}

impl BeaconStateView {
    /// Return a copy of this state advanced to ``target_slot``.
    pub fn process_slots(
        &mut self,
        target_slot: u64,
        options: ProcessSlotsOptions,
    ) -> Result<BeaconStateView, StateError> {
        if target_slot <= self.slot {
            return Err(StateError::SlotNotInFuture {
                slot: self.slot,
                target: target_slot,
            });
        }

        let caches = match options.transfer_cache {
            true => {
                self.ensure_caches()?;
                mem::take(&mut self.caches)
            }
            false => self.caches.clone(),
        };
        let mut state = self.copy_with_caches(caches);
        if let Err(err) = state.advance_to(target_slot) {
            if options.transfer_cache {
                self.reclaim_caches(mem::take(&mut state.caches), state.epoch());
            }
            return Err(err);
        }

        if options.transfer_cache {
            self.caches_transferred = true;
            self.cloned_count_with_transfer_cache
                .fetch_add(1, Ordering::Relaxed);
            state.created_with_transfer_cache = true;
        } else {
            self.cloned_count.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            from = self.slot,
            to = target_slot,
            transfer_cache = options.transfer_cache,
            "Processed slots"
        );
        Ok(state)
    }

    /// Take back caches lent to a transferring advance that failed at `reached_epoch`.
    fn reclaim_caches(&mut self, caches: EpochCaches, reached_epoch: u64) {
        self.caches = match reached_epoch == self.epoch() {
            true => caches,
            // Windows were rebased onto a later epoch; the registry projection still holds.
            false => EpochCaches {
                columns: caches.columns,
                ..EpochCaches::default()
            },
        };
    }

    fn advance_to(&mut self, target_slot: u64) -> Result<(), StateError> {
        while self.slot < target_slot {
            self.process_slot()?;
            // Process epoch on the start slot of the next epoch
            if (self.slot + 1) % SLOTS_PER_EPOCH == 0 {
                self.process_epoch()?;
            }
            self.slot += 1;
            self.invalidate_root();
            if self.slot % SLOTS_PER_EPOCH == 0 {
                self.rebase_caches()?;
                debug!(epoch = self.epoch(), "Entered epoch");
            }
        }
        Ok(())
    }

    fn process_slot(&mut self) -> Result<(), StateError> {
        let position = (self.slot % SLOTS_PER_HISTORICAL_ROOT) as usize;
        // Cache state root
        let previous_state_root = self.hash_tree_root()?;
        self.state_roots.make_mut()?[position] = previous_state_root;
        // Cache latest block header state root
        if self.latest_block_header.state_root == B256::ZERO {
            self.latest_block_header.state_root = previous_state_root;
        }
        // Cache block root
        let previous_block_root = self.latest_block_header.tree_hash_root();
        self.block_roots.make_mut()?[position] = previous_block_root;
        self.invalidate_root();
        trace!(slot = self.slot, "Processed slot");
        Ok(())
    }

    /// Epoch bookkeeping that does not depend on blocks; registry and balance processing is not
    /// performed.
    fn process_epoch(&mut self) -> Result<(), StateError> {
        self.process_justification_and_finalization()?;
        self.process_eth1_data_reset();
        self.process_slashings_reset()?;
        self.process_randao_mixes_reset()?;
        self.process_historical_update()?;
        self.process_participation_updates()?;
        self.process_sync_committee_updates()?;
        self.process_proposer_lookahead()?;
        self.invalidate_root();
        Ok(())
    }

    fn finality_checkpoints(&self) -> FinalityCheckpoints {
        let mut justification_bits = [false; JUSTIFICATION_BITS_LENGTH];
        for (position, bit) in self.justification_bits.iter().enumerate() {
            justification_bits[position] = bit;
        }
        FinalityCheckpoints {
            justification_bits,
            previous_justified: self.previous_justified_checkpoint,
            current_justified: self.current_justified_checkpoint,
            finalized: self.finalized_checkpoint,
        }
    }

    /// Checkpoints after weighing the participation recorded so far.
    fn weighed_checkpoints(&self) -> Result<FinalityCheckpoints, StateError> {
        let mut checkpoints = self.finality_checkpoints();
        let current_epoch = self.epoch();
        // Initial FFG checkpoint values have a `0x00` stub for `root`.
        if current_epoch <= GENESIS_EPOCH + 1 {
            return Ok(checkpoints);
        }

        let previous_epoch = self.previous_epoch();
        checkpoints.weigh(
            current_epoch,
            self.total_active_balance()?,
            self.target_balance(previous_epoch)?,
            self.target_balance(current_epoch)?,
            self.block_root_at_or_latest(compute_start_slot_at_epoch(previous_epoch))?,
            self.block_root_at_or_latest(compute_start_slot_at_epoch(current_epoch))?,
        );
        Ok(checkpoints)
    }

    /// Justified and finalized checkpoints the state would reach if the current epoch ended now.
    pub fn compute_unrealized_checkpoints(&self) -> Result<(Checkpoint, Checkpoint), StateError> {
        let checkpoints = self.weighed_checkpoints()?;
        Ok((checkpoints.current_justified, checkpoints.finalized))
    }

    fn process_justification_and_finalization(&mut self) -> Result<(), StateError> {
        let checkpoints = self.weighed_checkpoints()?;
        let mut justification_bits = JustificationBits::new();
        for (position, bit) in checkpoints.justification_bits.into_iter().enumerate() {
            justification_bits.set(position, bit)?;
        }
        if checkpoints.finalized != self.finalized_checkpoint {
            debug!(
                epoch = checkpoints.finalized.epoch,
                root = %checkpoints.finalized.root,
                "Finalized checkpoint advanced"
            );
        }
        self.justification_bits = justification_bits;
        self.previous_justified_checkpoint = checkpoints.previous_justified;
        self.current_justified_checkpoint = checkpoints.current_justified;
        self.finalized_checkpoint = checkpoints.finalized;
        Ok(())
    }

    /// Effective balance of the unslashed validators that attested to the target of ``epoch``.
    fn target_balance(&self, epoch: u64) -> Result<u64, StateError> {
        let columns = self.validator_columns()?;
        let attesters = match &self.phase0 {
            Some(phase0) => {
                let attestations = match epoch == self.epoch() {
                    true => &phase0.current_epoch_attestations,
                    false => &phase0.previous_epoch_attestations,
                };
                self.matching_target_attesters(attestations, epoch)?
            }
            None => {
                let participation = match epoch == self.epoch() {
                    true => self.current_epoch_participation()?,
                    false => self.previous_epoch_participation()?,
                };
                (0..columns.len())
                    .filter(|&index| {
                        columns.is_active(index, epoch)
                            && participation.get(index).is_some_and(|flags| {
                                flags & (1 << TIMELY_TARGET_FLAG_INDEX) != 0
                            })
                    })
                    .map(|index| index as u64)
                    .collect()
            }
        };
        let increments = attesters
            .into_iter()
            .filter(|&index| !columns.slashed[index as usize])
            .map(|index| columns.effective_balance_increments[index as usize] as u64)
            .sum::<u64>();
        Ok((increments * EFFECTIVE_BALANCE_INCREMENT).max(EFFECTIVE_BALANCE_INCREMENT))
    }

    fn matching_target_attesters(
        &self,
        attestations: &EpochAttestations,
        epoch: u64,
    ) -> Result<HashSet<u64>, StateError> {
        let target_root = self.block_root_at_or_latest(compute_start_slot_at_epoch(epoch))?;
        let mut attesters = HashSet::new();
        for attestation in attestations
            .iter()
            .filter(|attestation| attestation.data.target.root == target_root)
        {
            let committee =
                self.get_beacon_committee(attestation.data.slot, attestation.data.index)?;
            attesters.extend(
                committee
                    .into_iter()
                    .enumerate()
                    .filter(|(position, _)| {
                        attestation.aggregation_bits.get(*position).unwrap_or(false)
                    })
                    .map(|(_, index)| index),
            );
        }
        Ok(attesters)
    }

    fn process_eth1_data_reset(&mut self) {
        let next_epoch = self.epoch() + 1;
        // Reset eth1 data votes
        if next_epoch % EPOCHS_PER_ETH1_VOTING_PERIOD == 0 {
            self.eth1_data_votes.set(Eth1DataVotes::default());
        }
    }

    fn process_slashings_reset(&mut self) -> Result<(), StateError> {
        let next_epoch = self.epoch() + 1;
        self.slashings.make_mut()?[(next_epoch % EPOCHS_PER_SLASHINGS_VECTOR) as usize] = 0;
        Ok(())
    }

    fn process_randao_mixes_reset(&mut self) -> Result<(), StateError> {
        let current_epoch = self.epoch();
        let next_epoch = current_epoch + 1;
        let mix = self.get_randao_mix(current_epoch)?;
        self.randao_mixes.make_mut()?[(next_epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize] = mix;
        Ok(())
    }

    /// Summarize a completed root window: into `historical_summaries` from Capella on, into
    /// `historical_roots` before.
    fn process_historical_update(&mut self) -> Result<(), StateError> {
        let next_epoch = self.epoch() + 1;
        if next_epoch % (SLOTS_PER_HISTORICAL_ROOT / SLOTS_PER_EPOCH) != 0 {
            return Ok(());
        }

        let block_summary_root = self.block_roots.tree_hash_root()?;
        let state_summary_root = self.state_roots.tree_hash_root()?;
        match self.capella.as_mut() {
            Some(capella) => capella
                .historical_summaries
                .make_mut()?
                .push(HistoricalSummary {
                    block_summary_root,
                    state_summary_root,
                })
                .map_err(|_| StateError::ListFull("historical_summaries"))?,
            None => self
                .historical_roots
                .make_mut()?
                .push(hash_concat(
                    block_summary_root.as_slice(),
                    state_summary_root.as_slice(),
                ))
                .map_err(|_| StateError::ListFull("historical_roots"))?,
        }
        Ok(())
    }

    fn process_participation_updates(&mut self) -> Result<(), StateError> {
        let validator_count = self.validator_count()?;
        if let Some(phase0) = self.phase0.as_mut() {
            phase0.previous_epoch_attestations =
                mem::take(&mut phase0.current_epoch_attestations);
        }
        if let Some(altair) = self.altair.as_mut() {
            let participation = ParticipationList::new(vec![0; validator_count])
                .map_err(|_| StateError::ListFull("current_epoch_participation"))?;
            altair.previous_epoch_participation = mem::replace(
                &mut altair.current_epoch_participation,
                Lazy::from_value(participation),
            );
        }
        Ok(())
    }

    fn process_sync_committee_updates(&mut self) -> Result<(), StateError> {
        let next_epoch = self.epoch() + 1;
        if self.altair.is_none() || next_epoch % EPOCHS_PER_SYNC_COMMITTEE_PERIOD != 0 {
            return Ok(());
        }

        let next_sync_committee = self.compute_next_sync_committee()?;
        if let Some(altair) = self.altair.as_mut() {
            altair.current_sync_committee = altair.next_sync_committee.clone();
            altair.next_sync_committee.set(next_sync_committee);
        }
        let [_, next] = mem::take(&mut self.caches.sync_committees);
        self.caches.sync_committees = [next, OnceLock::new()];
        debug!(epoch = next_epoch, "Rotated sync committees");
        Ok(())
    }

    fn process_proposer_lookahead(&mut self) -> Result<(), StateError> {
        if self.fulu.is_none() {
            return Ok(());
        }
        let proposers = self.compute_epoch_proposers(self.epoch() + MIN_SEED_LOOKAHEAD + 1)?;
        if let Some(fulu) = self.fulu.as_mut() {
            let slots = SLOTS_PER_EPOCH as usize;
            let lookahead = &mut fulu.proposer_lookahead;
            lookahead.copy_within(slots.., 0);
            let len = lookahead.len();
            lookahead[len - slots..].copy_from_slice(&proposers);
        }
        Ok(())
    }
}
