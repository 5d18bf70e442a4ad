//! Simulator configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! seed = 7
//! max_steps = 500
//! policy = "bounded-drift"
//! max_drift = 86400
//! time_advancements = [3600, 86400]
//! power_deltas = [-20, 10, 30]
//!
//! [protocol]
//! vsc_timeout = 3024000
//! ```

use ccv_core::{CcvConfig, CcvError, ProtocolParams, Result, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::scheduler::{BoundedDrift, SchedulingPolicy, Unconstrained};

/// Which scheduling policy drives a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Any enabled action with any advancement
    #[default]
    Unconstrained,
    /// Clocks kept within `max_drift` of each other
    BoundedDrift,
}

/// Parameters of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Seed for the action generator
    pub seed: u64,
    /// Number of actions to apply
    pub max_steps: usize,
    /// Scheduling policy
    pub policy: PolicyKind,
    /// Drift bound for `PolicyKind::BoundedDrift`
    pub max_drift: TimeDelta,
    /// Candidate block time advancements
    pub time_advancements: Vec<TimeDelta>,
    /// Candidate voting power deltas
    pub power_deltas: Vec<i64>,
    /// Protocol parameters
    pub protocol: ProtocolParams,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps: 200,
            policy: PolicyKind::default(),
            max_drift: TimeDelta::WEEK,
            time_advancements: vec![
                TimeDelta::HOUR,
                TimeDelta::DAY,
                TimeDelta::WEEK,
                TimeDelta::from_secs(3 * 604_800),
            ],
            power_deltas: vec![-50, -10, 10, 50],
            protocol: ProtocolParams::default(),
        }
    }
}

impl SimulatorConfig {
    /// Instantiate the configured policy.
    pub fn build_policy(&self) -> Result<Box<dyn SchedulingPolicy>> {
        Ok(match self.policy {
            PolicyKind::Unconstrained => Box::new(Unconstrained),
            PolicyKind::BoundedDrift => Box::new(BoundedDrift::new(self.max_drift, &self.protocol)?),
        })
    }
}

impl CcvConfig for SimulatorConfig {
    fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        if self.max_steps == 0 {
            return Err(CcvError::invalid("max_steps must be positive"));
        }
        if self.time_advancements.is_empty() {
            return Err(CcvError::invalid("time_advancements must not be empty"));
        }
        if self.time_advancements.iter().any(|t| !t.is_positive()) {
            return Err(CcvError::invalid("time advancements must be positive"));
        }
        if self.power_deltas.is_empty() || self.power_deltas.contains(&0) {
            return Err(CcvError::invalid(
                "power_deltas must be non-empty and exclude zero",
            ));
        }
        if self.policy == PolicyKind::BoundedDrift {
            BoundedDrift::new(self.max_drift, &self.protocol)?;
        }
        Ok(())
    }
}
