//! Seeded exploration of the protocol
//!
//! Each step samples a candidate action, lets the scheduling policy adjust
//! or veto it, and applies it if enabled. After every applied action the
//! state invariants, the propagation check and the policy's own invariants
//! are evaluated. Runs are fully determined by the seed.
//!
//! ```text
//! ChaCha8Rng → candidate Action → SchedulingPolicy::adjust → CcvDriver::apply
//!                                                                 ↓
//!                                       Trace  ←  record  ←  invariant checks
//! ```

use ccv_core::{CcvConfig, ConsumerId, Result, ValidatorId};
use ccv_protocol::core::validation::{collect_violations, updates_propagated};
use ccv_protocol::{Action, CcvDriver, ConsumerStatus, InvariantViolation, ProtocolState};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SimulatorConfig;
use crate::scheduler::SchedulingPolicy;
use crate::trace::Trace;

/// Candidates sampled per step before the run is declared stuck.
const MAX_ATTEMPTS_PER_STEP: usize = 64;

/// An invariant violation and the step that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepViolation {
    /// Index of the offending trace record
    pub step: usize,
    /// What broke
    pub violation: InvariantViolation,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Every applied action
    pub trace: Trace,
    /// State after the last action
    pub final_state: ProtocolState,
    /// Number of applied actions
    pub steps_applied: usize,
    /// Violations, in step order
    pub violations: Vec<StepViolation>,
}

impl SimulationResult {
    /// Whether every invariant held throughout.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Random explorer over the protocol's action space.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    policy: Box<dyn SchedulingPolicy>,
}

impl Simulator {
    /// Validate `config` and build its policy.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.build_policy()?;
        Ok(Self { config, policy })
    }

    /// The active policy.
    pub fn policy(&self) -> &dyn SchedulingPolicy {
        self.policy.as_ref()
    }

    /// Run with the configured seed.
    pub fn run(&self) -> Result<SimulationResult> {
        self.run_with_seed(self.config.seed)
    }

    /// Run with an explicit seed.
    pub fn run_with_seed(&self, seed: u64) -> Result<SimulationResult> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut driver = CcvDriver::new(self.config.protocol.clone())?;
        let mut trace = Trace::new(Some(seed), self.policy.name());
        let mut violations = Vec::new();

        tracing::info!(
            seed,
            max_steps = self.config.max_steps,
            policy = self.policy.name(),
            "starting simulation"
        );

        for _ in 0..self.config.max_steps {
            let Some(action) = self.pick_action(&mut rng, &driver) else {
                tracing::info!(step = trace.len(), "no enabled action found, stopping");
                break;
            };

            let pre = driver.state().clone();
            let timed_out = match driver.apply(&action) {
                Ok(timed_out) => timed_out,
                Err(e) => {
                    // enabled but still refused, e.g. clock overflow
                    tracing::debug!(action = %action, code = e.code(), "action refused");
                    continue;
                }
            };
            let step = trace.len();
            trace.push(action, timed_out);

            for violation in self.check_step(&pre, driver.state()) {
                tracing::warn!(step, code = violation.code(), %violation, "invariant violated");
                violations.push(StepViolation { step, violation });
            }
        }

        tracing::info!(
            steps = trace.len(),
            violations = violations.len(),
            "simulation finished"
        );

        Ok(SimulationResult {
            steps_applied: trace.len(),
            trace,
            final_state: driver.into_state(),
            violations,
        })
    }

    fn check_step(&self, pre: &ProtocolState, post: &ProtocolState) -> Vec<InvariantViolation> {
        let mut found = collect_violations(post, &self.config.protocol);
        found.extend(updates_propagated(pre, post).err());
        found.extend(self.policy.check(post));
        found
    }

    fn pick_action(&self, rng: &mut ChaCha8Rng, driver: &CcvDriver) -> Option<Action> {
        (0..MAX_ATTEMPTS_PER_STEP).find_map(|_| {
            let candidate = self.sample_action(rng, driver.state());
            let action = self.policy.adjust(driver.state(), candidate)?;
            driver.is_enabled(&action).then_some(action)
        })
    }

    /// Sample one candidate; action kinds are equally likely.
    fn sample_action(&self, rng: &mut ChaCha8Rng, state: &ProtocolState) -> Action {
        let params = &self.config.protocol;
        let configured: Vec<ConsumerId> = params.consumer_ids().cloned().collect();
        let running = state.running_consumers();
        let targets = if running.is_empty() { &configured } else { &running };

        let advancement = self
            .config
            .time_advancements
            .choose(rng)
            .copied()
            .unwrap_or_default();

        match rng.gen_range(0..5) {
            0 => {
                let consumers_to_start = configured
                    .iter()
                    .filter(|c| state.consumer_status(c) == ConsumerStatus::NotConsumer)
                    .filter(|_| rng.gen_bool(0.25))
                    .cloned()
                    .collect();
                let consumers_to_stop = running
                    .iter()
                    .filter(|_| rng.gen_bool(0.05))
                    .cloned()
                    .collect();
                Action::EndAndBeginBlockForProvider {
                    time_advancement: advancement,
                    consumers_to_start,
                    consumers_to_stop,
                }
            }
            1 => Action::EndAndBeginBlockForConsumer {
                chain: pick(rng, targets),
                time_advancement: advancement,
            },
            2 => Action::DeliverVscPacket {
                receiver: pick(rng, targets),
            },
            3 => Action::DeliverVscMaturedPacket {
                sender: pick(rng, targets),
            },
            _ => {
                let validators = params.validator_ids();
                let validator = validators
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| ValidatorId::new("validator"));
                let delta = self.config.power_deltas.choose(rng).copied().unwrap_or(1);
                Action::VotingPowerChange { validator, delta }
            }
        }
    }
}

fn pick(rng: &mut ChaCha8Rng, consumers: &[ConsumerId]) -> ConsumerId {
    consumers
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| ConsumerId::new("consumer"))
}
