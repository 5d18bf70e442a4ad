//! Pure CCV Core
//!
//! Effect-free state machine for the provider and consumer chain models.
//! Every transition is a function `(&ProtocolState, ...) -> Result<_, TransitionError>`
//! that returns a new state, so the driver can apply transitions
//! all-or-nothing and simulators can probe them freely.

mod chain;
pub mod consumer;
pub mod provider;
pub mod state;
pub mod transitions;
pub mod validation;

pub use consumer::{check_consumer_block_preconditions, end_and_begin_block_for_consumer};
pub use provider::{
    check_provider_block_preconditions, end_and_begin_block_for_provider, timed_out_consumers,
};
pub use state::{
    ChainState, ConsumerState, ConsumerStatus, MaturationReceipt, PendingMaturation,
    ProtocolState, ProviderState, VscMaturedPacket, VscPacket,
};
pub use transitions::{
    check_deliver_to_consumer, check_deliver_to_provider, check_voting_power_change,
    deliver_packet_to_consumer, deliver_packet_to_provider, voting_power_change, Step,
};
pub use validation::{check_invariants, collect_violations, InvariantViolation};
