//! CCV Core - shared vocabulary for the cross-chain validation model
//!
//! A provider chain replicates its validator set to consumer chains over
//! ordered packet channels. This crate holds the types every layer of the
//! model agrees on and nothing else:
//!
//! - `time`: per-chain `Timestamp` and `TimeDelta` with checked arithmetic
//! - `identifiers`: `Chain`, `ConsumerId`, `ValidatorId`, `PacketId`
//! - `validator`: `ValidatorSet` and the negative-power policy
//! - `config`: `ProtocolParams` loaded from TOML through `CcvConfig`
//! - `errors`: the unified `CcvError`

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Protocol parameters and configuration loading
pub mod config;

/// Chain, validator and packet identifiers
pub mod identifiers;

/// Model time
pub mod time;

/// Validator sets and voting power
pub mod validator;

pub use config::{CcvConfig, ChainParams, ProtocolParams};
pub use errors::{CcvError, ErrorKind, Result};
pub use identifiers::{Chain, ConsumerId, PacketId, ValidatorId};
pub use time::{TimeDelta, Timestamp};
pub use validator::{NegativePowerPolicy, PowerDeltaError, ValidatorSet, VotingPower};
