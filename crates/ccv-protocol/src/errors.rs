//! Transition precondition errors
//!
//! Every variant means "this transition is not enabled in the current state".
//! None of them is fatal: the state is left untouched and the scheduler is
//! free to try another transition.

use ccv_core::{CcvError, ConsumerId, PacketId, TimeDelta, ValidatorId};

use crate::core::state::ConsumerStatus;

/// Why a transition could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Blocks must advance time
    #[error("time advancement must be positive, got {0}")]
    NonPositiveTimeAdvancement(TimeDelta),

    /// Chain is not one of the configured consumers
    #[error("{0} is not a configured consumer chain")]
    UnknownConsumer(ConsumerId),

    /// Operation requires a running consumer
    #[error("consumer {consumer} is not running ({status})")]
    ConsumerNotRunning {
        /// Consumer addressed by the transition
        consumer: ConsumerId,
        /// Its current status
        status: ConsumerStatus,
    },

    /// Only consumers that never ran can be started
    #[error("cannot start consumer {consumer} in status {status}")]
    CannotStartConsumer {
        /// Consumer requested to start
        consumer: ConsumerId,
        /// Its current status
        status: ConsumerStatus,
    },

    /// Only running consumers can be stopped
    #[error("cannot stop consumer {consumer} in status {status}")]
    CannotStopConsumer {
        /// Consumer requested to stop
        consumer: ConsumerId,
        /// Its current status
        status: ConsumerStatus,
    },

    /// A consumer was listed both to start and to stop
    #[error("consumer {0} is both started and stopped in the same block")]
    OverlappingStartStop(ConsumerId),

    /// Nothing to deliver
    #[error("no packet in flight on channel {channel}")]
    EmptyQueue {
        /// Human-readable channel name, e.g. `provider->consumer1`
        channel: String,
    },

    /// A matured packet refers to a VSC packet the provider is not waiting on
    #[error("{consumer} matured {packet}, which the provider has no record of")]
    UnknownPacket {
        /// Sender of the matured packet
        consumer: ConsumerId,
        /// Id carried by the matured packet
        packet: PacketId,
    },

    /// Zero deltas are not validator set changes
    #[error("voting power delta for {0} is zero")]
    ZeroVotingPowerDelta(ValidatorId),

    /// Power would become negative under the reject policy
    #[error("voting power of {validator} would become negative ({current} + {delta})")]
    NegativeVotingPower {
        /// Validator whose power was changed
        validator: ValidatorId,
        /// Power before the change
        current: u64,
        /// Requested delta
        delta: i64,
    },

    /// Power would overflow
    #[error("voting power of {validator} overflows ({current} + {delta})")]
    VotingPowerOverflow {
        /// Validator whose power was changed
        validator: ValidatorId,
        /// Power before the change
        current: u64,
        /// Requested delta
        delta: i64,
    },

    /// The provider must keep at least one validator with power
    #[error("change to {0} would leave the provider without voting power")]
    EmptyValidatorSet(ValidatorId),

    /// Clock arithmetic left the representable range
    #[error("timestamp overflow on {0}")]
    TimeOverflow(String),

    /// Every VSC packet id has been handed out
    #[error("VSC packet ids exhausted after {0}")]
    PacketIdExhausted(PacketId),
}

impl TransitionError {
    /// Stable code for logs and traces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NonPositiveTimeAdvancement(_) => "ccv_non_positive_time_advancement",
            Self::UnknownConsumer(_) => "ccv_unknown_consumer",
            Self::ConsumerNotRunning { .. } => "ccv_consumer_not_running",
            Self::CannotStartConsumer { .. } => "ccv_cannot_start_consumer",
            Self::CannotStopConsumer { .. } => "ccv_cannot_stop_consumer",
            Self::OverlappingStartStop(_) => "ccv_overlapping_start_stop",
            Self::EmptyQueue { .. } => "ccv_empty_queue",
            Self::UnknownPacket { .. } => "ccv_unknown_packet",
            Self::ZeroVotingPowerDelta(_) => "ccv_zero_voting_power_delta",
            Self::NegativeVotingPower { .. } => "ccv_negative_voting_power",
            Self::VotingPowerOverflow { .. } => "ccv_voting_power_overflow",
            Self::EmptyValidatorSet(_) => "ccv_empty_validator_set",
            Self::TimeOverflow(_) => "ccv_time_overflow",
            Self::PacketIdExhausted(_) => "ccv_packet_id_exhausted",
        }
    }
}

impl From<TransitionError> for CcvError {
    fn from(err: TransitionError) -> Self {
        CcvError::precondition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccv_core::ErrorKind;

    #[test]
    fn test_converts_to_recoverable_error() {
        let err = TransitionError::EmptyQueue {
            channel: "provider->consumer1".to_string(),
        };
        assert_eq!(err.code(), "ccv_empty_queue");
        let unified = CcvError::from(err);
        assert_eq!(unified.kind(), ErrorKind::PreconditionViolated);
        assert_eq!(
            unified.to_string(),
            "Precondition violated: no packet in flight on channel provider->consumer1"
        );
    }
}
