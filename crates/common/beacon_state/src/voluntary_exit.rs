use std::fmt;

use alloy_primitives::B256;
use vista_bls::traits::Verifiable;
use vista_consensus_misc::{
    constants::{DOMAIN_VOLUNTARY_EXIT, FAR_FUTURE_EPOCH},
    misc::{compute_domain, compute_signing_root},
    voluntary_exit::{SignedVoluntaryExit, VoluntaryExit},
};
use vista_network_spec::chain_config;

use crate::{errors::StateError, view::BeaconStateView};

/// Outcome of checking a signed voluntary exit against a state; the first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoluntaryExitValidity {
    Valid,
    ExecutionNotEnabled,
    Inactive,
    AlreadyExited,
    EarlyEpoch,
    ShortTimeActive,
    PendingWithdrawals,
    InvalidSignature,
}

impl VoluntaryExitValidity {
    pub fn as_str(self) -> &'static str {
        match self {
            VoluntaryExitValidity::Valid => "valid",
            VoluntaryExitValidity::ExecutionNotEnabled => "execution_not_enabled",
            VoluntaryExitValidity::Inactive => "inactive",
            VoluntaryExitValidity::AlreadyExited => "already_exited",
            VoluntaryExitValidity::EarlyEpoch => "early_epoch",
            VoluntaryExitValidity::ShortTimeActive => "short_time_active",
            VoluntaryExitValidity::PendingWithdrawals => "pending_withdrawals",
            VoluntaryExitValidity::InvalidSignature => "invalid_signature",
        }
    }
}

impl fmt::Display for VoluntaryExitValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BeaconStateView {
    /// Domain exits are signed under. From Deneb on it is pinned to the Capella fork version
    /// (EIP-7044).
    pub fn voluntary_exit_domain(&self, exit: &VoluntaryExit) -> B256 {
        let fork_version = match self.fork_name.is_deneb_or_later() {
            true => chain_config().capella_fork_version,
            false => self.fork.version_at_epoch(exit.epoch),
        };
        compute_domain(
            DOMAIN_VOLUNTARY_EXIT,
            fork_version,
            self.genesis_validators_root,
        )
    }

    /// Return the sum of pending partial withdrawals queued for ``validator_index``.
    pub fn get_pending_balance_to_withdraw(&self, validator_index: u64) -> Result<u64, StateError> {
        Ok(self
            .pending_partial_withdrawals()?
            .iter()
            .filter(|withdrawal| withdrawal.validator_index == validator_index)
            .map(|withdrawal| withdrawal.amount)
            .fold(0u64, u64::saturating_add))
    }

    fn has_pending_withdrawals(&self, validator_index: u64) -> Result<bool, StateError> {
        if self.electra.is_none() {
            return Ok(false);
        }
        if self.get_pending_balance_to_withdraw(validator_index)? > 0 {
            return Ok(true);
        }
        // A consolidation source leaves the registry through the consolidation itself
        Ok(self
            .pending_consolidations()?
            .iter()
            .any(|consolidation| consolidation.source_index == validator_index))
    }

    pub fn get_voluntary_exit_validity(
        &self,
        signed_voluntary_exit: &SignedVoluntaryExit,
        verify_signature: bool,
    ) -> Result<VoluntaryExitValidity, StateError> {
        let voluntary_exit = &signed_voluntary_exit.message;
        let validator = self.get_validator(voluntary_exit.validator_index)?;
        let current_epoch = self.epoch();

        if !self.is_merge_transition_complete() {
            return Ok(VoluntaryExitValidity::ExecutionNotEnabled);
        }
        // Verify the validator is active
        if !validator.is_active_validator(current_epoch) {
            return Ok(VoluntaryExitValidity::Inactive);
        }
        // Verify exit has not been initiated
        if validator.exit_epoch != FAR_FUTURE_EPOCH {
            return Ok(VoluntaryExitValidity::AlreadyExited);
        }
        // Exits must specify an epoch when they become valid; they are not valid before then
        if current_epoch < voluntary_exit.epoch {
            return Ok(VoluntaryExitValidity::EarlyEpoch);
        }
        // Verify the validator has been active long enough
        if current_epoch < validator.activation_epoch + chain_config().shard_committee_period {
            return Ok(VoluntaryExitValidity::ShortTimeActive);
        }
        // Only exit validator if it has no pending withdrawals in the queue
        if self.has_pending_withdrawals(voluntary_exit.validator_index)? {
            return Ok(VoluntaryExitValidity::PendingWithdrawals);
        }

        if verify_signature {
            let signing_root = compute_signing_root(
                voluntary_exit.clone(),
                self.voluntary_exit_domain(voluntary_exit),
            );
            let verified = signed_voluntary_exit
                .signature
                .verify(&validator.pubkey, signing_root.as_slice())
                .unwrap_or(false);
            if !verified {
                return Ok(VoluntaryExitValidity::InvalidSignature);
            }
        }

        Ok(VoluntaryExitValidity::Valid)
    }

    pub fn is_valid_voluntary_exit(
        &self,
        signed_voluntary_exit: &SignedVoluntaryExit,
        verify_signature: bool,
    ) -> Result<bool, StateError> {
        Ok(
            self.get_voluntary_exit_validity(signed_voluntary_exit, verify_signature)?
                == VoluntaryExitValidity::Valid,
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use vista_bls::BLSSignature;
    use vista_consensus_misc::{
        ForkName,
        constants::SLOTS_PER_EPOCH,
        execution_payload_header::{BellatrixExecutionPayloadHeader, ExecutionPayloadHeader},
        pending_consolidation::PendingConsolidation,
        pending_partial_withdrawal::PendingPartialWithdrawal,
    };

    use super::*;
    use crate::test_utils::{TestStateBuilder, sign_voluntary_exit};

    const EXIT_SLOT: u64 = 300 * SLOTS_PER_EPOCH;

    fn signed_exit(state: &BeaconStateView, epoch: u64, validator_index: u64) -> SignedVoluntaryExit {
        sign_voluntary_exit(
            state,
            VoluntaryExit {
                epoch,
                validator_index,
            },
        )
        .unwrap()
    }

    #[rstest]
    #[case(ForkName::Bellatrix)]
    #[case(ForkName::Capella)]
    #[case(ForkName::Deneb)]
    #[case(ForkName::Electra)]
    fn test_valid_exit(#[case] fork: ForkName) {
        let state = TestStateBuilder::new(fork)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .build()
            .unwrap();
        let exit = signed_exit(&state, 280, 3);
        assert_eq!(
            state.get_voluntary_exit_validity(&exit, true).unwrap(),
            VoluntaryExitValidity::Valid
        );
        assert!(state.is_valid_voluntary_exit(&exit, true).unwrap());
    }

    #[test]
    fn test_rejection_reasons() {
        let state = TestStateBuilder::new(ForkName::Deneb)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .pending(1)
            .exited(2, 400)
            .build()
            .unwrap();
        let validity = |exit: &SignedVoluntaryExit| {
            state.get_voluntary_exit_validity(exit, true).unwrap()
        };

        assert_eq!(validity(&signed_exit(&state, 280, 1)), VoluntaryExitValidity::Inactive);
        assert_eq!(
            validity(&signed_exit(&state, 280, 2)),
            VoluntaryExitValidity::AlreadyExited
        );
        assert_eq!(
            validity(&signed_exit(&state, 301, 3)),
            VoluntaryExitValidity::EarlyEpoch
        );

        let mut forged = signed_exit(&state, 280, 3);
        forged.signature = signed_exit(&state, 280, 4).signature;
        assert_eq!(validity(&forged), VoluntaryExitValidity::InvalidSignature);
        assert!(
            state
                .is_valid_voluntary_exit(&forged, false)
                .unwrap()
        );

        let mut garbage = signed_exit(&state, 280, 3);
        garbage.signature = BLSSignature::default();
        assert_eq!(validity(&garbage), VoluntaryExitValidity::InvalidSignature);

        assert_eq!(
            state.get_voluntary_exit_validity(&signed_exit(&state, 280, 3), false),
            Ok(VoluntaryExitValidity::Valid)
        );
        assert_eq!(
            state.get_voluntary_exit_validity(&signed_exit(&state, 280, 8), false),
            Err(StateError::IndexOutOfRange { index: 8, count: 8 })
        );
    }

    #[test]
    fn test_short_time_active() {
        let state = TestStateBuilder::new(ForkName::Bellatrix)
            .slot(100 * SLOTS_PER_EPOCH)
            .build()
            .unwrap();
        let exit = signed_exit(&state, 50, 0);
        assert_eq!(
            state.get_voluntary_exit_validity(&exit, false).unwrap(),
            VoluntaryExitValidity::ShortTimeActive
        );
    }

    #[test]
    fn test_pending_withdrawals_block_exit() {
        let mut state = TestStateBuilder::new(ForkName::Electra)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .build()
            .unwrap();
        if let Some(electra) = state.electra.as_mut() {
            electra
                .pending_partial_withdrawals
                .make_mut()
                .unwrap()
                .push(PendingPartialWithdrawal {
                    validator_index: 4,
                    amount: 1_000_000_000,
                    withdrawable_epoch: 310,
                })
                .unwrap();
            electra
                .pending_partial_withdrawals
                .make_mut()
                .unwrap()
                .push(PendingPartialWithdrawal {
                    validator_index: 7,
                    amount: 0,
                    withdrawable_epoch: 310,
                })
                .unwrap();
            electra
                .pending_consolidations
                .make_mut()
                .unwrap()
                .push(PendingConsolidation {
                    source_index: 5,
                    target_index: 6,
                })
                .unwrap();
        }
        state.invalidate_root();

        for index in [4, 5] {
            let exit = signed_exit(&state, 280, index);
            assert_eq!(
                state.get_voluntary_exit_validity(&exit, true).unwrap(),
                VoluntaryExitValidity::PendingWithdrawals
            );
        }
        assert_eq!(state.get_pending_balance_to_withdraw(4), Ok(1_000_000_000));
        assert_eq!(state.get_pending_balance_to_withdraw(7), Ok(0));

        // Consolidation targets and zero-amount withdrawals do not block the exit.
        for index in [6, 7] {
            let exit = signed_exit(&state, 280, index);
            assert!(state.is_valid_voluntary_exit(&exit, true).unwrap());
        }
    }

    #[rstest]
    #[case(ForkName::Phase0)]
    #[case(ForkName::Altair)]
    fn test_exit_requires_execution(#[case] fork: ForkName) {
        let state = TestStateBuilder::new(fork)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .pending(1)
            .build()
            .unwrap();
        // Execution comes first, ahead of the inactive validator check.
        for index in [1, 3] {
            let exit = signed_exit(&state, 280, index);
            assert_eq!(
                state.get_voluntary_exit_validity(&exit, true).unwrap(),
                VoluntaryExitValidity::ExecutionNotEnabled
            );
            assert!(!state.is_valid_voluntary_exit(&exit, false).unwrap());
        }
    }

    #[test]
    fn test_exit_before_merge_transition() {
        let mut state = TestStateBuilder::new(ForkName::Bellatrix)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .build()
            .unwrap();
        let exit = signed_exit(&state, 280, 3);
        assert!(state.is_valid_voluntary_exit(&exit, true).unwrap());

        if let Some(bellatrix) = state.bellatrix.as_mut() {
            bellatrix.latest_execution_payload_header =
                ExecutionPayloadHeader::Bellatrix(BellatrixExecutionPayloadHeader::default());
        }
        state.invalidate_root();
        assert!(state.is_execution_state_type());
        assert_eq!(
            state.get_voluntary_exit_validity(&exit, false).unwrap(),
            VoluntaryExitValidity::ExecutionNotEnabled
        );
    }

    #[test]
    fn test_deneb_pins_capella_domain() {
        let state = TestStateBuilder::new(ForkName::Electra)
            .slot(EXIT_SLOT)
            .build()
            .unwrap();
        let exit = VoluntaryExit {
            epoch: 280,
            validator_index: 0,
        };
        assert_eq!(
            state.voluntary_exit_domain(&exit),
            compute_domain(
                DOMAIN_VOLUNTARY_EXIT,
                chain_config().capella_fork_version,
                state.genesis_validators_root()
            )
        );
    }

    #[test]
    fn test_validity_agrees_with_boolean_check() {
        let state = TestStateBuilder::new(ForkName::Electra)
            .validator_count(8)
            .slot(EXIT_SLOT)
            .pending(1)
            .exited(2, 310)
            .build()
            .unwrap();
        for index in 0..8 {
            for epoch in [0, 280, 300, 301] {
                for verify_signature in [false, true] {
                    let exit = signed_exit(&state, epoch, index);
                    let validity = state
                        .get_voluntary_exit_validity(&exit, verify_signature)
                        .unwrap();
                    assert_eq!(
                        state
                            .is_valid_voluntary_exit(&exit, verify_signature)
                            .unwrap(),
                        validity == VoluntaryExitValidity::Valid,
                        "index {index} epoch {epoch}: {validity}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_validity_names() {
        assert_eq!(VoluntaryExitValidity::Valid.to_string(), "valid");
        assert_eq!(
            VoluntaryExitValidity::ExecutionNotEnabled.to_string(),
            "execution_not_enabled"
        );
        assert_eq!(
            VoluntaryExitValidity::ShortTimeActive.as_str(),
            "short_time_active"
        );
        assert_eq!(
            VoluntaryExitValidity::PendingWithdrawals.to_string(),
            "pending_withdrawals"
        );
    }
}
