//! Chain, validator, and packet identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a consumer chain. The set of consumers is fixed by
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Create a consumer identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of a validator (an abstract node name; no keys in the model).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorId(String);

impl ValidatorId {
    /// Create a validator identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidatorId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of a validator-set-change packet, assigned by the provider in
/// strictly increasing order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PacketId(u64);

impl PacketId {
    /// Create a packet id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The id that follows this one, or `None` on overflow.
    #[must_use]
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vsc#{}", self.0)
    }
}

/// A chain in the model: the single provider or one of the consumers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    /// The provider chain whose validator set is replicated
    Provider,
    /// A consumer chain
    Consumer(ConsumerId),
}

impl Chain {
    /// Whether this is the provider.
    pub fn is_provider(&self) -> bool {
        matches!(self, Chain::Provider)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Provider => f.write_str("provider"),
            Chain::Consumer(id) => write!(f, "{id}"),
        }
    }
}

impl From<ConsumerId> for Chain {
    fn from(id: ConsumerId) -> Self {
        Chain::Consumer(id)
    }
}
