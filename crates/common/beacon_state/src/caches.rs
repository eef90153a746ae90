//! Epoch-scoped caches of derived data.
//!
//! Shufflings and proposer sequences are held for the previous, current and next epoch of the
//! owning state and tagged with the decision root they were computed under. When the state
//! crosses an epoch boundary the entries are rebased onto the new epoch window; an entry whose
//! tag no longer matches the state's decision root is dropped and recomputed on demand.

use std::sync::{Arc, OnceLock};

use alloy_primitives::B256;

use crate::{
    errors::StateError,
    shuffling::{EpochProposers, EpochShuffling},
    sync_committee::IndexedSyncCommittee,
    validators::ValidatorColumns,
};

/// Position of an epoch relative to the state's current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelativeEpoch {
    Previous = 0,
    Current = 1,
    Next = 2,
}

impl RelativeEpoch {
    pub(crate) fn from_epoch(current_epoch: u64, epoch: u64) -> Result<Self, StateError> {
        if epoch == current_epoch {
            Ok(RelativeEpoch::Current)
        } else if epoch + 1 == current_epoch {
            Ok(RelativeEpoch::Previous)
        } else if epoch == current_epoch + 1 {
            Ok(RelativeEpoch::Next)
        } else {
            Err(StateError::EpochOutOfRange {
                epoch,
                reason: "only the previous, current and next epoch are cached",
            })
        }
    }
}

/// Identity of a cache entry: the epoch it serves and the root it was decided by.
pub(crate) trait CacheTag {
    fn epoch(&self) -> u64;

    fn decision_root(&self) -> B256;
}

pub(crate) type EpochWindow<T> = [OnceLock<Arc<T>>; 3];

#[derive(Debug, Default, Clone)]
pub(crate) struct EpochCaches {
    pub columns: OnceLock<Arc<ValidatorColumns>>,
    pub shufflings: EpochWindow<EpochShuffling>,
    pub proposers: EpochWindow<EpochProposers>,
    /// Current and next sync committee, keyed by the committee root.
    pub sync_committees: [OnceLock<Arc<IndexedSyncCommittee>>; 2],
}

/// Move the entries of `window` that are still valid for `wanted` into a new window.
pub(crate) fn rebase_window<T: CacheTag>(
    window: EpochWindow<T>,
    wanted: [(u64, B256); 3],
) -> EpochWindow<T> {
    let entries = window
        .into_iter()
        .filter_map(OnceLock::into_inner)
        .collect::<Vec<_>>();
    wanted.map(|(epoch, root)| {
        entries
            .iter()
            .find(|entry| entry.epoch() == epoch && entry.decision_root() == root)
            .cloned()
            .map(OnceLock::from)
            .unwrap_or_default()
    })
}
