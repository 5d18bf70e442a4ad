//! Scheduling policies
//!
//! A policy sits between the random action generator and the protocol: it
//! may shrink the time advancement of a block action or veto it outright,
//! and it contributes its own invariants to the per-step check.

use std::fmt;

use ccv_core::{CcvError, Chain, ProtocolParams, Result, TimeDelta};
use ccv_protocol::core::validation::bounded_drift;
use ccv_protocol::{Action, InvariantViolation, ProtocolState};

/// Decides how far chain clocks may move.
pub trait SchedulingPolicy: fmt::Debug + Send + Sync {
    /// Short name used in traces and logs.
    fn name(&self) -> &'static str;

    /// Time advancement to use when `chain` closes a block, given the
    /// `proposed` one. `None` means the chain may not advance now.
    fn time_advancement(
        &self,
        state: &ProtocolState,
        chain: &Chain,
        proposed: TimeDelta,
    ) -> Option<TimeDelta>;

    /// Adjust a candidate action. Non-block actions pass through.
    fn adjust(&self, state: &ProtocolState, action: Action) -> Option<Action> {
        match (action.advancing_chain(), action.time_advancement()) {
            (Some(chain), Some(proposed)) => {
                let advancement = self.time_advancement(state, &chain, proposed)?;
                Some(action.with_time_advancement(advancement))
            }
            _ => Some(action),
        }
    }

    /// Invariants specific to this policy.
    fn check(&self, state: &ProtocolState) -> Vec<InvariantViolation>;
}

/// Any enabled action fires with whatever advancement was proposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl SchedulingPolicy for Unconstrained {
    fn name(&self) -> &'static str {
        "unconstrained"
    }

    fn time_advancement(
        &self,
        _state: &ProtocolState,
        _chain: &Chain,
        proposed: TimeDelta,
    ) -> Option<TimeDelta> {
        Some(proposed)
    }

    fn check(&self, _state: &ProtocolState) -> Vec<InvariantViolation> {
        Vec::new()
    }
}

/// Keeps every running chain's clock within `max_drift` of every other
/// running chain's last block.
///
/// A block advances by at most `step = max_drift / 2`, and no running clock
/// may pass any other running clock by more than `window = max_drift - step`.
/// Then `running(A) - last(B) <= window + step` for every pair, and the chain
/// with the slowest clock can always advance.
#[derive(Debug, Clone, Copy)]
pub struct BoundedDrift {
    max_drift: TimeDelta,
    step: TimeDelta,
    window: TimeDelta,
}

impl BoundedDrift {
    /// `max_drift` must be at least two seconds and below every trusting
    /// period.
    pub fn new(max_drift: TimeDelta, params: &ProtocolParams) -> Result<Self> {
        if max_drift.as_secs() < 2 {
            return Err(CcvError::invalid(format!(
                "max drift must be at least 2s, got {max_drift}"
            )));
        }
        let trusting = params.min_trusting_period();
        if max_drift >= trusting {
            return Err(CcvError::invalid(format!(
                "max drift {max_drift} must be below the smallest trusting period {trusting}"
            )));
        }
        let step = TimeDelta::from_secs(max_drift.as_secs() / 2);
        Ok(Self {
            max_drift,
            step,
            window: max_drift.saturating_sub(step),
        })
    }

    /// The configured bound.
    pub fn max_drift(&self) -> TimeDelta {
        self.max_drift
    }

    /// Largest advancement of a single block.
    pub fn step(&self) -> TimeDelta {
        self.step
    }
}

impl SchedulingPolicy for BoundedDrift {
    fn name(&self) -> &'static str {
        "bounded-drift"
    }

    fn time_advancement(
        &self,
        state: &ProtocolState,
        chain: &Chain,
        proposed: TimeDelta,
    ) -> Option<TimeDelta> {
        let Some(own) = state.chain_state(chain) else {
            return Some(proposed);
        };
        let running = own.running_timestamp;

        let ceiling = state
            .running_chains()
            .iter()
            .filter(|other| *other != chain)
            .filter_map(|other| state.chain_state(other))
            .map(|other| {
                other
                    .running_timestamp
                    .checked_add(self.window)
                    .map_or(u64::MAX, |t| t.as_secs())
            })
            .min()
            .unwrap_or(u64::MAX);

        let allowed = TimeDelta::from_secs(ceiling.saturating_sub(running.as_secs()));
        let advancement = proposed.min(self.step).min(allowed);
        advancement.is_positive().then_some(advancement)
    }

    fn check(&self, state: &ProtocolState) -> Vec<InvariantViolation> {
        bounded_drift(state, self.max_drift).err().into_iter().collect()
    }
}
