//! # CCV Protocol - Cross-Chain Validation State Machine
//!
//! A provider chain replicates its validator set to consumer chains. Each
//! change is snapshotted at a provider block boundary and shipped as a VSC
//! packet; consumers apply it, wait out their unbonding period and send a
//! maturation back. Consumers that fail to mature a packet within the VSC
//! timeout are dropped.
//!
//! ## Architecture
//!
//! - **core**: pure state, per-role block logic, packet delivery and the
//!   invariant checker
//! - **actions**: `Action`, the serializable record a scheduler fires
//! - **driver**: `CcvDriver`, owner of the single mutable state root
//! - **errors**: `TransitionError`, the recoverable "not enabled" signal
//!
//! Chains keep independent clocks and the core never looks at wall time;
//! which action fires next is decided outside this crate.

#![forbid(unsafe_code)]

// Pure core - effect-free state machine
pub mod core;

pub mod actions;
pub mod driver;
pub mod errors;

pub use actions::Action;
pub use self::core::{
    ChainState, ConsumerState, ConsumerStatus, InvariantViolation, ProtocolState, ProviderState,
    Step, VscMaturedPacket, VscPacket,
};
pub use driver::CcvDriver;
pub use errors::TransitionError;
