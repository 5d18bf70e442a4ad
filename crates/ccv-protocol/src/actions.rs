//! Protocol actions
//!
//! `Action` is the unit a scheduler fires: one variant per transition, with
//! the transition's arguments. It serializes as `{"kind": ..., ...args}` so a
//! run can be written out as a trace and replayed later.

use std::collections::BTreeSet;
use std::fmt;

use ccv_core::{Chain, ConsumerId, ProtocolParams, TimeDelta, ValidatorId};
use serde::{Deserialize, Serialize};

use crate::core::{
    check_consumer_block_preconditions, check_deliver_to_consumer, check_deliver_to_provider,
    check_provider_block_preconditions, check_voting_power_change, deliver_packet_to_consumer,
    deliver_packet_to_provider, end_and_begin_block_for_consumer,
    end_and_begin_block_for_provider, voting_power_change, ProtocolState, Step,
};
use crate::errors::TransitionError;

/// A protocol transition together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Action {
    /// Close the provider block, start and stop consumers, send VSC packets
    EndAndBeginBlockForProvider {
        /// Time until the next provider block
        time_advancement: TimeDelta,
        /// Consumers to start
        #[serde(default)]
        consumers_to_start: BTreeSet<ConsumerId>,
        /// Consumers to stop
        #[serde(default)]
        consumers_to_stop: BTreeSet<ConsumerId>,
    },
    /// Close a consumer block and fire due maturations
    EndAndBeginBlockForConsumer {
        /// Consumer closing the block
        chain: ConsumerId,
        /// Time until its next block
        time_advancement: TimeDelta,
    },
    /// Deliver the oldest VSC packet to a consumer
    DeliverVscPacket {
        /// Receiving consumer
        receiver: ConsumerId,
    },
    /// Deliver the oldest matured packet from a consumer to the provider
    DeliverVscMaturedPacket {
        /// Sending consumer
        sender: ConsumerId,
    },
    /// Change a validator's voting power on the provider
    VotingPowerChange {
        /// Validator whose power changes
        validator: ValidatorId,
        /// Signed change in power
        delta: i64,
    },
}

impl Action {
    /// Transition name as it appears in traces.
    pub fn name(&self) -> &'static str {
        match self {
            Action::EndAndBeginBlockForProvider { .. } => "EndAndBeginBlockForProvider",
            Action::EndAndBeginBlockForConsumer { .. } => "EndAndBeginBlockForConsumer",
            Action::DeliverVscPacket { .. } => "DeliverVscPacket",
            Action::DeliverVscMaturedPacket { .. } => "DeliverVscMaturedPacket",
            Action::VotingPowerChange { .. } => "VotingPowerChange",
        }
    }

    /// The chain whose clock this action advances, if any.
    pub fn advancing_chain(&self) -> Option<Chain> {
        match self {
            Action::EndAndBeginBlockForProvider { .. } => Some(Chain::Provider),
            Action::EndAndBeginBlockForConsumer { chain, .. } => {
                Some(Chain::Consumer(chain.clone()))
            }
            _ => None,
        }
    }

    /// Time advancement carried by a block action.
    pub fn time_advancement(&self) -> Option<TimeDelta> {
        match self {
            Action::EndAndBeginBlockForProvider {
                time_advancement, ..
            }
            | Action::EndAndBeginBlockForConsumer {
                time_advancement, ..
            } => Some(*time_advancement),
            _ => None,
        }
    }

    /// Replace the time advancement of a block action; other actions are
    /// returned unchanged.
    pub fn with_time_advancement(mut self, advancement: TimeDelta) -> Self {
        match &mut self {
            Action::EndAndBeginBlockForProvider {
                time_advancement, ..
            }
            | Action::EndAndBeginBlockForConsumer {
                time_advancement, ..
            } => *time_advancement = advancement,
            _ => {}
        }
        self
    }

    /// Whether the action's preconditions hold in `state`.
    pub fn check(&self, state: &ProtocolState, params: &ProtocolParams) -> Result<(), TransitionError> {
        match self {
            Action::EndAndBeginBlockForProvider {
                time_advancement,
                consumers_to_start,
                consumers_to_stop,
            } => check_provider_block_preconditions(
                state,
                params,
                *time_advancement,
                consumers_to_start,
                consumers_to_stop,
            ),
            Action::EndAndBeginBlockForConsumer {
                chain,
                time_advancement,
            } => check_consumer_block_preconditions(state, params, chain, *time_advancement),
            Action::DeliverVscPacket { receiver } => {
                check_deliver_to_consumer(state, params, receiver)
            }
            Action::DeliverVscMaturedPacket { sender } => {
                check_deliver_to_provider(state, params, sender)
            }
            Action::VotingPowerChange { validator, delta } => {
                check_voting_power_change(state, params, validator, *delta)
            }
        }
    }

    /// Enabled predicate for schedulers.
    ///
    /// Time overflow and unknown matured packets are only detected by
    /// `apply`, so an enabled action can still fail in those cases.
    pub fn is_enabled(&self, state: &ProtocolState, params: &ProtocolParams) -> bool {
        self.check(state, params).is_ok()
    }

    /// Apply the action to `state`, returning the successor.
    pub fn apply(
        &self,
        state: &ProtocolState,
        params: &ProtocolParams,
    ) -> Result<Step, TransitionError> {
        match self {
            Action::EndAndBeginBlockForProvider {
                time_advancement,
                consumers_to_start,
                consumers_to_stop,
            } => end_and_begin_block_for_provider(
                state,
                params,
                *time_advancement,
                consumers_to_start,
                consumers_to_stop,
            )
            .map(Step::completed),
            Action::EndAndBeginBlockForConsumer {
                chain,
                time_advancement,
            } => end_and_begin_block_for_consumer(state, params, chain, *time_advancement)
                .map(Step::completed),
            Action::DeliverVscPacket { receiver } => {
                deliver_packet_to_consumer(state, params, receiver)
            }
            Action::DeliverVscMaturedPacket { sender } => {
                deliver_packet_to_provider(state, params, sender)
            }
            Action::VotingPowerChange { validator, delta } => {
                voting_power_change(state, params, validator, *delta).map(Step::completed)
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |set: &BTreeSet<ConsumerId>| {
            set.iter()
                .map(ConsumerId::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };
        match self {
            Action::EndAndBeginBlockForProvider {
                time_advancement,
                consumers_to_start,
                consumers_to_stop,
            } => write!(
                f,
                "provider block +{time_advancement} start=[{}] stop=[{}]",
                list(consumers_to_start),
                list(consumers_to_stop)
            ),
            Action::EndAndBeginBlockForConsumer {
                chain,
                time_advancement,
            } => write!(f, "{chain} block +{time_advancement}"),
            Action::DeliverVscPacket { receiver } => write!(f, "deliver VSC to {receiver}"),
            Action::DeliverVscMaturedPacket { sender } => {
                write!(f, "deliver maturation from {sender}")
            }
            Action::VotingPowerChange { validator, delta } => {
                write!(f, "power {validator} {delta:+}")
            }
        }
    }
}
