//! CCV driver
//!
//! Owns the single mutable `ProtocolState` root and applies actions to it
//! one at a time. A failed action leaves the root untouched.

use std::collections::VecDeque;

use ccv_core::{CcvConfig, Chain, ConsumerId, ProtocolParams, Result, ValidatorSet};

use crate::actions::Action;
use crate::core::validation::{check_invariants, collect_violations, updates_propagated};
use crate::core::{ConsumerStatus, InvariantViolation, ProtocolState};
use crate::errors::TransitionError;

/// Applies actions to the protocol state and answers read-only queries.
#[derive(Debug, Clone)]
pub struct CcvDriver {
    params: ProtocolParams,
    state: ProtocolState,
}

impl CcvDriver {
    /// Validate `params` and start from the genesis state.
    pub fn new(params: ProtocolParams) -> Result<Self> {
        params.validate()?;
        let state = ProtocolState::init(&params);
        tracing::debug!(consumers = params.consumers.len(), "CCV driver initialized");
        Ok(Self { params, state })
    }

    /// Apply `action`. On success the root is replaced and the timeout flag
    /// returned; on failure nothing changes.
    pub fn apply(&mut self, action: &Action) -> std::result::Result<bool, TransitionError> {
        let step = action.apply(&self.state, &self.params)?;
        tracing::debug!(action = %action, timed_out = step.timed_out, "action applied");
        self.state = step.state;
        Ok(step.timed_out)
    }

    /// Apply `action` and check every invariant, including propagation of
    /// validator set changes across this step.
    pub fn apply_checked(
        &mut self,
        action: &Action,
    ) -> std::result::Result<Vec<InvariantViolation>, TransitionError> {
        let pre = self.state.clone();
        self.apply(action)?;
        let mut violations = collect_violations(&self.state, &self.params);
        if let Err(violation) = updates_propagated(&pre, &self.state) {
            violations.push(violation);
        }
        for violation in &violations {
            tracing::warn!(code = violation.code(), %violation, "invariant violated");
        }
        Ok(violations)
    }

    /// Whether `action` is enabled in the current state.
    pub fn is_enabled(&self, action: &Action) -> bool {
        action.is_enabled(&self.state, &self.params)
    }

    /// Check the state invariants.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        check_invariants(&self.state, &self.params)
    }

    /// Current state.
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Protocol parameters.
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Consume the driver, returning its state.
    pub fn into_state(self) -> ProtocolState {
        self.state
    }

    /// Current validator set of `chain`.
    pub fn current_validator_set(&self, chain: &Chain) -> Option<&ValidatorSet> {
        self.state.current_validator_set(chain)
    }

    /// Validator-set history of `chain`, newest first.
    pub fn voting_power_history(&self, chain: &Chain) -> Option<&VecDeque<ValidatorSet>> {
        self.state.voting_power_history(chain)
    }

    /// Lifecycle status of `consumer`.
    pub fn consumer_status(&self, consumer: &ConsumerId) -> ConsumerStatus {
        self.state.consumer_status(consumer)
    }

    /// VSC packets in transit to `consumer`.
    pub fn outstanding_to_consumer_len(&self, consumer: &ConsumerId) -> usize {
        self.state.outstanding_to_consumer_len(consumer)
    }

    /// VSC packets awaiting maturation from `consumer`.
    pub fn sent_to_consumer_len(&self, consumer: &ConsumerId) -> usize {
        self.state.sent_to_consumer_len(consumer)
    }

    /// Matured packets in transit from `consumer`.
    pub fn outstanding_to_provider_len(&self, consumer: &ConsumerId) -> usize {
        self.state.outstanding_to_provider_len(consumer)
    }

    /// Pending maturations on `consumer`.
    pub fn pending_maturations_len(&self, consumer: &ConsumerId) -> usize {
        self.state.pending_maturations_len(consumer)
    }

    /// Maturations accepted by the provider.
    pub fn received_maturations_len(&self) -> usize {
        self.state.provider_state.received_maturations.len()
    }
}
