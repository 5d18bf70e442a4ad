//! Validator sets
//!
//! A validator set maps validators to voting power. Zero-power entries are
//! never stored, so equal sets always compare equal and snapshots can be
//! matched across chains by value.

use crate::identifiers::ValidatorId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Voting power of a single validator.
pub type VotingPower = u64;

/// What to do when a power change would drive a validator below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegativePowerPolicy {
    /// Refuse the change
    #[default]
    Reject,
    /// Floor the resulting power at zero
    Clamp,
}

/// Why a power delta could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowerDeltaError {
    /// The delta would make the power negative under `NegativePowerPolicy::Reject`
    #[error("power of {validator} would become negative: {current} + ({delta})")]
    Negative {
        /// Validator whose power was changed
        validator: ValidatorId,
        /// Power before the change
        current: VotingPower,
        /// Requested delta
        delta: i64,
    },
    /// The delta would overflow the power type
    #[error("power of {validator} overflows: {current} + {delta}")]
    Overflow {
        /// Validator whose power was changed
        validator: ValidatorId,
        /// Power before the change
        current: VotingPower,
        /// Requested delta
        delta: i64,
    },
}

/// Deterministically ordered mapping validator → voting power.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorSet(BTreeMap<ValidatorId, VotingPower>);

impl ValidatorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Power of `validator`, zero when absent.
    pub fn power_of(&self, validator: &ValidatorId) -> VotingPower {
        self.0.get(validator).copied().unwrap_or(0)
    }

    /// Sum of all voting power, saturating.
    pub fn total_power(&self) -> VotingPower {
        self.0.values().fold(0, |acc, p| acc.saturating_add(*p))
    }

    /// Number of validators with positive power.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no validator has power.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate validators in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ValidatorId, &VotingPower)> {
        self.0.iter()
    }

    /// Set a validator's power; zero removes the entry.
    pub fn set_power(&mut self, validator: ValidatorId, power: VotingPower) {
        if power == 0 {
            self.0.remove(&validator);
        } else {
            self.0.insert(validator, power);
        }
    }

    /// Copy of this set with `delta` added to `validator`'s power.
    pub fn with_power_delta(
        &self,
        validator: &ValidatorId,
        delta: i64,
        policy: NegativePowerPolicy,
    ) -> Result<Self, PowerDeltaError> {
        let current = self.power_of(validator);
        let next = if delta >= 0 {
            current
                .checked_add(delta.unsigned_abs())
                .ok_or_else(|| PowerDeltaError::Overflow {
                    validator: validator.clone(),
                    current,
                    delta,
                })?
        } else {
            match current.checked_sub(delta.unsigned_abs()) {
                Some(power) => power,
                None => match policy {
                    NegativePowerPolicy::Clamp => 0,
                    NegativePowerPolicy::Reject => {
                        return Err(PowerDeltaError::Negative {
                            validator: validator.clone(),
                            current,
                            delta,
                        })
                    }
                },
            }
        };

        let mut updated = self.clone();
        updated.set_power(validator.clone(), next);
        Ok(updated)
    }
}

impl FromIterator<(ValidatorId, VotingPower)> for ValidatorSet {
    fn from_iter<I: IntoIterator<Item = (ValidatorId, VotingPower)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (validator, power) in iter {
            set.set_power(validator, power);
        }
        set
    }
}

impl fmt::Display for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (validator, power)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{validator}: {power}")?;
        }
        f.write_str("}")
    }
}
