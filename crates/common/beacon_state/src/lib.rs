//! Read-optimized view over an SSZ-encoded beacon state.

mod caches;
mod codec;
pub mod errors;
mod field;
pub mod lazy;
pub mod proofs;
pub mod pubkey_cache;
pub mod shuffling;
pub mod sync_committee;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transition;
pub mod validators;
pub mod view;
pub mod voluntary_exit;

pub use errors::StateError;
pub use lazy::Lazy;
pub use pubkey_cache::PubkeyCache;
pub use shuffling::{EpochProposers, EpochShuffling};
pub use sync_committee::IndexedSyncCommittee;
pub use transition::ProcessSlotsOptions;
pub use validators::ValidatorColumns;
pub use view::*;
pub use voluntary_exit::VoluntaryExitValidity;
