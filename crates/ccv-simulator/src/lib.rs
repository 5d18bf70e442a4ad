//! # CCV Simulator
//!
//! Drives the cross-chain validation model with seeded random schedules.
//!
//! - **scheduler**: `SchedulingPolicy` with the `Unconstrained` and
//!   `BoundedDrift` variants
//! - **simulator**: `Simulator`, the ChaCha-seeded explorer
//! - **trace**: JSON action traces and deterministic replay
//! - **config**: `SimulatorConfig`, loaded from TOML
//!
//! The `ccv-sim` binary wraps all of the above.

#![forbid(unsafe_code)]

pub mod config;
pub mod scheduler;
pub mod simulator;
pub mod trace;

pub use config::{PolicyKind, SimulatorConfig};
pub use scheduler::{BoundedDrift, SchedulingPolicy, Unconstrained};
pub use simulator::{SimulationResult, Simulator, StepViolation};
pub use trace::{replay, Trace, TraceRecord};
