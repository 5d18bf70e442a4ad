//! Protocol parameters
//!
//! Immutable configuration shared by every transition: the fixed chain set,
//! per-chain unbonding and trusting periods, the global VSC timeout, and the
//! provider's genesis validator set.

use super::traits::CcvConfig;
use crate::identifiers::{ConsumerId, ValidatorId};
use crate::time::TimeDelta;
use crate::validator::{NegativePowerPolicy, ValidatorSet};
use crate::{CcvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two weeks.
pub const DEFAULT_UNBONDING_PERIOD: TimeDelta = TimeDelta::from_secs(2 * 604_800);
/// Unbonding period minus one day.
pub const DEFAULT_TRUSTING_PERIOD: TimeDelta = TimeDelta::from_secs(2 * 604_800 - 86_400);
/// Five weeks.
pub const DEFAULT_VSC_TIMEOUT: TimeDelta = TimeDelta::from_secs(5 * 604_800);

/// Per-chain timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// How long a received validator set change must age before maturing
    pub unbonding_period: TimeDelta,
    /// Light-client trusting period; only bounds the drift constant
    pub trusting_period: TimeDelta,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            unbonding_period: DEFAULT_UNBONDING_PERIOD,
            trusting_period: DEFAULT_TRUSTING_PERIOD,
        }
    }
}

/// Protocol-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Provider chain timing
    pub provider: ChainParams,
    /// The fixed set of consumer chains and their timing
    pub consumers: BTreeMap<ConsumerId, ChainParams>,
    /// Time after sending within which a VSC packet must be matured
    pub vsc_timeout: TimeDelta,
    /// Provider validator set at genesis
    pub initial_validator_set: ValidatorSet,
    /// Handling of power changes that would go negative
    pub negative_power_policy: NegativePowerPolicy,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        let consumers = ["consumer1", "consumer2", "consumer3"]
            .into_iter()
            .map(|name| (ConsumerId::new(name), ChainParams::default()))
            .collect();
        let initial_validator_set = ["node1", "node2", "node3"]
            .into_iter()
            .map(|name| (ValidatorId::new(name), 100))
            .collect();

        Self {
            provider: ChainParams::default(),
            consumers,
            vsc_timeout: DEFAULT_VSC_TIMEOUT,
            initial_validator_set,
            negative_power_policy: NegativePowerPolicy::default(),
        }
    }
}

impl ProtocolParams {
    /// Whether `consumer` is one of the configured consumer chains.
    pub fn is_consumer(&self, consumer: &ConsumerId) -> bool {
        self.consumers.contains_key(consumer)
    }

    /// Configured consumer ids in order.
    pub fn consumer_ids(&self) -> impl Iterator<Item = &ConsumerId> {
        self.consumers.keys()
    }

    /// Unbonding period of a consumer chain.
    pub fn unbonding_period(&self, consumer: &ConsumerId) -> Option<TimeDelta> {
        self.consumers.get(consumer).map(|c| c.unbonding_period)
    }

    /// Smallest trusting period over the provider and every consumer.
    pub fn min_trusting_period(&self) -> TimeDelta {
        self.consumers
            .values()
            .map(|c| c.trusting_period)
            .fold(self.provider.trusting_period, TimeDelta::min)
    }

    /// Names of the validators in the genesis set.
    pub fn validator_ids(&self) -> Vec<ValidatorId> {
        self.initial_validator_set
            .iter()
            .map(|(v, _)| v.clone())
            .collect()
    }

    fn validate_chain(name: &str, chain: &ChainParams) -> Result<()> {
        if !chain.unbonding_period.is_positive() {
            return Err(CcvError::invalid(format!(
                "{name}: unbonding period must be positive"
            )));
        }
        if chain.trusting_period >= chain.unbonding_period {
            return Err(CcvError::invalid(format!(
                "{name}: trusting period {} must be below unbonding period {}",
                chain.trusting_period, chain.unbonding_period
            )));
        }
        Ok(())
    }
}

impl CcvConfig for ProtocolParams {
    fn validate(&self) -> Result<()> {
        if self.consumers.is_empty() {
            return Err(CcvError::invalid("at least one consumer chain is required"));
        }
        Self::validate_chain("provider", &self.provider)?;
        for (id, chain) in &self.consumers {
            Self::validate_chain(id.as_str(), chain)?;
        }
        if !self.vsc_timeout.is_positive() {
            return Err(CcvError::invalid("VSC timeout must be positive"));
        }
        if self.initial_validator_set.total_power() == 0 {
            return Err(CcvError::invalid(
                "initial validator set must have positive total power",
            ));
        }
        if let Some((validator, _)) = self.initial_validator_set.iter().find(|(_, p)| **p == 0) {
            return Err(CcvError::invalid(format!(
                "initial validator {validator} has zero power"
            )));
        }
        Ok(())
    }
}
