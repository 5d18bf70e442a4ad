//! Packet Delivery and Voting Power Transitions
//!
//! Pure state transition functions. Each takes the current state, checks its
//! preconditions, and returns a new state; the input is never modified, so a
//! failed transition leaves nothing behind.
//!
//! ## Model Correspondence
//! - `deliver_packet_to_consumer` ↔ `DeliverPacketToConsumer`
//! - `deliver_packet_to_provider` ↔ `DeliverPacketToProvider`
//! - `voting_power_change` ↔ `VotingPowerChange`

use ccv_core::{ConsumerId, PowerDeltaError, ProtocolParams, ValidatorId, ValidatorSet};
use serde::{Deserialize, Serialize};

use super::consumer::require_running;
use super::state::{ConsumerStatus, MaturationReceipt, PendingMaturation, ProtocolState};
use crate::errors::TransitionError;

/// Result of a successful transition.
///
/// `timed_out` reports that the transition flipped the addressed consumer to
/// `TimedOut`; it is an observation, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// State after the transition
    pub state: ProtocolState,
    /// Whether the addressed consumer timed out
    pub timed_out: bool,
}

impl Step {
    /// A step that did not time anything out.
    pub fn completed(state: ProtocolState) -> Self {
        Self {
            state,
            timed_out: false,
        }
    }
}

/// Check that a VSC packet can be delivered to `receiver`.
pub fn check_deliver_to_consumer(
    state: &ProtocolState,
    params: &ProtocolParams,
    receiver: &ConsumerId,
) -> Result<(), TransitionError> {
    require_running(state, params, receiver)?;
    if state.outstanding_to_consumer_len(receiver) == 0 {
        return Err(TransitionError::EmptyQueue {
            channel: format!("provider->{receiver}"),
        });
    }
    Ok(())
}

/// Deliver the oldest in-flight VSC packet to `receiver`.
///
/// If the receiver's last block is already past the packet's timeout the
/// receiver times out and the packet is discarded. Otherwise the packet's
/// validator set becomes the receiver's current set and a maturation is
/// scheduled one unbonding period after the receiver's last block.
pub fn deliver_packet_to_consumer(
    state: &ProtocolState,
    params: &ProtocolParams,
    receiver: &ConsumerId,
) -> Result<Step, TransitionError> {
    check_deliver_to_consumer(state, params, receiver)?;
    let unbonding_period = params
        .unbonding_period(receiver)
        .ok_or_else(|| TransitionError::UnknownConsumer(receiver.clone()))?;

    let mut next = state.clone();
    let packet = next
        .provider_state
        .outstanding_packets_to_consumer
        .get_mut(receiver)
        .and_then(|queue| queue.pop_front())
        .ok_or_else(|| TransitionError::EmptyQueue {
            channel: format!("provider->{receiver}"),
        })?;

    let consumer = next
        .consumer_states
        .get_mut(receiver)
        .ok_or_else(|| TransitionError::UnknownConsumer(receiver.clone()))?;

    let timed_out = consumer
        .chain_state
        .last_timestamp
        .is_some_and(|last| packet.is_timed_out_at(last));

    if timed_out {
        time_out_consumer(&mut next, receiver);
        tracing::info!(
            consumer = %receiver,
            packet = %packet.id,
            timeout = %packet.timeout_time,
            "consumer timed out on VSC delivery"
        );
        return Ok(Step {
            state: next,
            timed_out: true,
        });
    }

    let maturation_time = consumer
        .chain_state
        .effective_last_timestamp()
        .checked_add(unbonding_period)
        .ok_or_else(|| TransitionError::TimeOverflow(receiver.to_string()))?;

    consumer.chain_state.current_validator_set = packet.validator_set.clone();
    consumer.maturation_times.push(PendingMaturation {
        packet_id: packet.id,
        maturation_time,
    });
    tracing::debug!(
        consumer = %receiver,
        packet = %packet.id,
        matures_at = %maturation_time,
        "VSC packet delivered"
    );
    consumer.received_vsc_packets.push(packet);

    Ok(Step::completed(next))
}

/// Check that a matured packet can be delivered from `sender`.
pub fn check_deliver_to_provider(
    state: &ProtocolState,
    params: &ProtocolParams,
    sender: &ConsumerId,
) -> Result<(), TransitionError> {
    require_running(state, params, sender)?;
    if state.outstanding_to_provider_len(sender) == 0 {
        return Err(TransitionError::EmptyQueue {
            channel: format!("{sender}->provider"),
        });
    }
    Ok(())
}

/// Deliver the oldest in-flight matured packet from `sender` to the provider.
pub fn deliver_packet_to_provider(
    state: &ProtocolState,
    params: &ProtocolParams,
    sender: &ConsumerId,
) -> Result<Step, TransitionError> {
    check_deliver_to_provider(state, params, sender)?;

    let mut next = state.clone();
    let matured = next
        .consumer_states
        .get_mut(sender)
        .and_then(|c| c.outstanding_packets_to_provider.pop_front())
        .ok_or_else(|| TransitionError::EmptyQueue {
            channel: format!("{sender}->provider"),
        })?;

    let provider_now = next.provider_state.chain_state.effective_last_timestamp();
    let sent = next
        .provider_state
        .sent_vsc_packets_to_consumer
        .entry(sender.clone())
        .or_default();
    let position = sent
        .iter()
        .position(|p| p.id == matured.id)
        .ok_or_else(|| TransitionError::UnknownPacket {
            consumer: sender.clone(),
            packet: matured.id,
        })?;

    if sent[position].is_timed_out_at(provider_now) {
        time_out_consumer(&mut next, sender);
        tracing::info!(
            consumer = %sender,
            packet = %matured.id,
            "consumer timed out: maturation arrived after the VSC timeout"
        );
        return Ok(Step {
            state: next,
            timed_out: true,
        });
    }

    sent.remove(position);
    next.provider_state
        .received_maturations
        .insert(MaturationReceipt {
            consumer: sender.clone(),
            packet: matured,
        });
    tracing::debug!(consumer = %sender, packet = %matured.id, "maturation received");

    Ok(Step::completed(next))
}

/// Check a voting power change against the provider's current set.
pub fn check_voting_power_change(
    state: &ProtocolState,
    params: &ProtocolParams,
    validator: &ValidatorId,
    delta: i64,
) -> Result<(), TransitionError> {
    changed_validator_set(state, params, validator, delta).map(|_| ())
}

/// Add `delta` to `validator`'s power in the provider's current set.
///
/// History is untouched until the provider next closes a block.
pub fn voting_power_change(
    state: &ProtocolState,
    params: &ProtocolParams,
    validator: &ValidatorId,
    delta: i64,
) -> Result<ProtocolState, TransitionError> {
    let updated = changed_validator_set(state, params, validator, delta)?;

    let mut next = state.clone();
    next.provider_state.chain_state.current_validator_set = updated;
    next.provider_state.provider_validator_set_changed_in_this_block = true;

    tracing::debug!(
        validator = %validator,
        delta,
        power = next
            .provider_state
            .chain_state
            .current_validator_set
            .power_of(validator),
        "voting power changed"
    );
    Ok(next)
}

fn changed_validator_set(
    state: &ProtocolState,
    params: &ProtocolParams,
    validator: &ValidatorId,
    delta: i64,
) -> Result<ValidatorSet, TransitionError> {
    if delta == 0 {
        return Err(TransitionError::ZeroVotingPowerDelta(validator.clone()));
    }

    let updated = state
        .provider_state
        .chain_state
        .current_validator_set
        .with_power_delta(validator, delta, params.negative_power_policy)
        .map_err(|err| match err {
            PowerDeltaError::Negative {
                validator,
                current,
                delta,
            } => TransitionError::NegativeVotingPower {
                validator,
                current,
                delta,
            },
            PowerDeltaError::Overflow {
                validator,
                current,
                delta,
            } => TransitionError::VotingPowerOverflow {
                validator,
                current,
                delta,
            },
        })?;

    if updated.total_power() == 0 {
        return Err(TransitionError::EmptyValidatorSet(validator.clone()));
    }
    Ok(updated)
}

fn time_out_consumer(state: &mut ProtocolState, consumer: &ConsumerId) {
    state
        .provider_state
        .consumer_status
        .insert(consumer.clone(), ConsumerStatus::TimedOut);
    state.provider_state.clear_channels(consumer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::core::consumer::end_and_begin_block_for_consumer;
    use crate::core::provider::end_and_begin_block_for_provider;
    use crate::core::state::VscMaturedPacket;
    use ccv_core::{NegativePowerPolicy, PacketId, TimeDelta, Timestamp};
    use std::collections::BTreeSet;

    fn c1() -> ConsumerId {
        ConsumerId::new("consumer1")
    }

    fn provider_block(
        state: &ProtocolState,
        params: &ProtocolParams,
        advance: TimeDelta,
        start: &[&str],
    ) -> ProtocolState {
        let start: BTreeSet<_> = start.iter().map(|c| ConsumerId::new(*c)).collect();
        end_and_begin_block_for_provider(state, params, advance, &start, &BTreeSet::new()).unwrap()
    }

    /// consumer1 running with one VSC packet in flight, sent at one day.
    fn packet_in_flight(params: &ProtocolParams) -> ProtocolState {
        let state = ProtocolState::init(params);
        let state = provider_block(&state, params, TimeDelta::DAY, &["consumer1"]);
        let state = voting_power_change(&state, params, &ValidatorId::new("node3"), 25).unwrap();
        provider_block(&state, params, TimeDelta::DAY, &[])
    }

    #[test]
    fn test_deliver_to_consumer_schedules_maturation() {
        let params = ProtocolParams::default();
        let state = packet_in_flight(&params);

        let step = deliver_packet_to_consumer(&state, &params, &c1()).unwrap();
        assert!(!step.timed_out);

        let state = step.state;
        let consumer = state.consumer(&c1()).unwrap();
        assert_eq!(state.outstanding_to_consumer_len(&c1()), 0);
        // still awaiting maturation on the provider
        assert_eq!(state.sent_to_consumer_len(&c1()), 1);
        assert_eq!(consumer.received_vsc_packets.len(), 1);
        assert_eq!(
            consumer.chain_state.current_validator_set.power_of(&ValidatorId::new("node3")),
            125
        );
        // consumer never closed a block: base is its running time (0)
        assert_eq!(
            consumer.maturation_times,
            vec![PendingMaturation {
                packet_id: PacketId::new(0),
                maturation_time: Timestamp::ZERO
                    .checked_add(params.unbonding_period(&c1()).unwrap())
                    .unwrap(),
            }]
        );
    }

    #[test]
    fn test_deliver_from_empty_queue() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let state = provider_block(&state, &params, TimeDelta::DAY, &["consumer1"]);

        let err = deliver_packet_to_consumer(&state, &params, &c1()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::EmptyQueue {
                channel: "provider->consumer1".to_string()
            }
        );
        let err = deliver_packet_to_provider(&state, &params, &c1()).unwrap_err();
        assert_matches!(err, TransitionError::EmptyQueue { .. });
    }

    #[test]
    fn test_late_delivery_times_out_consumer() {
        let params = ProtocolParams::default();
        let state = packet_in_flight(&params);

        // consumer closes a block past the packet's timeout before receiving it
        let late = params.vsc_timeout.checked_add(TimeDelta::WEEK).unwrap();
        let state = end_and_begin_block_for_consumer(&state, &params, &c1(), late).unwrap();
        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1(), TimeDelta::HOUR).unwrap();

        let step = deliver_packet_to_consumer(&state, &params, &c1()).unwrap();
        assert!(step.timed_out);
        assert_eq!(step.state.consumer_status(&c1()), ConsumerStatus::TimedOut);
        assert_eq!(step.state.outstanding_to_consumer_len(&c1()), 0);
        assert!(step.state.consumer(&c1()).unwrap().received_vsc_packets.is_empty());
    }

    #[test]
    fn test_matured_packet_is_acknowledged() {
        let params = ProtocolParams::default();
        let state = packet_in_flight(&params);
        let state = deliver_packet_to_consumer(&state, &params, &c1())
            .unwrap()
            .state;
        let unbonding = params.unbonding_period(&c1()).unwrap();
        let state = end_and_begin_block_for_consumer(&state, &params, &c1(), unbonding).unwrap();
        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1(), TimeDelta::HOUR).unwrap();
        assert_eq!(state.outstanding_to_provider_len(&c1()), 1);

        let step = deliver_packet_to_provider(&state, &params, &c1()).unwrap();
        assert!(!step.timed_out);
        let state = step.state;
        assert_eq!(state.sent_to_consumer_len(&c1()), 0);
        assert_eq!(state.outstanding_to_provider_len(&c1()), 0);
        assert_eq!(
            state.provider_state.received_maturations.iter().next(),
            Some(&MaturationReceipt {
                consumer: c1(),
                packet: VscMaturedPacket {
                    id: PacketId::new(0),
                    sending_time: Timestamp::ZERO.checked_add(unbonding).unwrap(),
                },
            })
        );
    }

    #[test]
    fn test_stale_maturation_times_out_consumer() {
        let params = ProtocolParams::default();
        let state = packet_in_flight(&params);
        let state = deliver_packet_to_consumer(&state, &params, &c1())
            .unwrap()
            .state;
        // a second packet still in transit
        let state = voting_power_change(&state, &params, &ValidatorId::new("node2"), 5).unwrap();
        let state = provider_block(&state, &params, TimeDelta::DAY, &[]);
        let unbonding = params.unbonding_period(&c1()).unwrap();
        let state = end_and_begin_block_for_consumer(&state, &params, &c1(), unbonding).unwrap();
        let mut state =
            end_and_begin_block_for_consumer(&state, &params, &c1(), TimeDelta::HOUR).unwrap();
        assert_eq!(state.outstanding_to_provider_len(&c1()), 1);
        assert_eq!(state.outstanding_to_consumer_len(&c1()), 1);
        assert_eq!(state.sent_to_consumer_len(&c1()), 2);

        // provider clock moved past the first packet's timeout without a sweep
        let timeout = state.provider_state.sent_vsc_packets_to_consumer[&c1()][0].timeout_time;
        state.provider_state.chain_state.last_timestamp =
            timeout.checked_add(TimeDelta::SECOND);

        let step = deliver_packet_to_provider(&state, &params, &c1()).unwrap();
        assert!(step.timed_out);
        let state = step.state;
        assert_eq!(state.consumer_status(&c1()), ConsumerStatus::TimedOut);
        assert_eq!(state.outstanding_to_consumer_len(&c1()), 0);
        assert_eq!(state.sent_to_consumer_len(&c1()), 0);
        assert_eq!(state.outstanding_to_provider_len(&c1()), 0);
        assert!(state.provider_state.received_maturations.is_empty());
    }

    #[test]
    fn test_unknown_matured_packet_is_rejected() {
        let params = ProtocolParams::default();
        let mut state = packet_in_flight(&params);
        state
            .consumer_states
            .get_mut(&c1())
            .unwrap()
            .outstanding_packets_to_provider
            .push_back(VscMaturedPacket {
                id: PacketId::new(42),
                sending_time: Timestamp::ZERO,
            });
        let before = state.clone();

        let err = deliver_packet_to_provider(&state, &params, &c1()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnknownPacket {
                consumer: c1(),
                packet: PacketId::new(42)
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_voting_power_change() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let node1 = ValidatorId::new("node1");

        let next = voting_power_change(&state, &params, &node1, -40).unwrap();
        assert!(next.provider_state.provider_validator_set_changed_in_this_block);
        assert_eq!(
            next.provider_state.chain_state.current_validator_set.power_of(&node1),
            60
        );
        // history is deferred to the block close
        assert_eq!(next.provider_state.chain_state.voting_power_history.len(), 1);

        let newcomer = ValidatorId::new("node4");
        let next = voting_power_change(&next, &params, &newcomer, 7).unwrap();
        assert_eq!(next.provider_state.chain_state.current_validator_set.len(), 4);
    }

    #[test]
    fn test_voting_power_change_preconditions() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let node1 = ValidatorId::new("node1");

        assert_eq!(
            voting_power_change(&state, &params, &node1, 0).unwrap_err(),
            TransitionError::ZeroVotingPowerDelta(node1.clone())
        );
        assert_matches!(
            voting_power_change(&state, &params, &node1, -101).unwrap_err(),
            TransitionError::NegativeVotingPower { current: 100, .. }
        );

        let clamping = ProtocolParams {
            negative_power_policy: NegativePowerPolicy::Clamp,
            ..ProtocolParams::default()
        };
        let next = voting_power_change(&state, &clamping, &node1, -101).unwrap();
        assert_eq!(next.provider_state.chain_state.current_validator_set.len(), 2);

        let next = voting_power_change(&next, &clamping, &ValidatorId::new("node2"), -100).unwrap();
        assert_eq!(
            voting_power_change(&next, &clamping, &ValidatorId::new("node3"), -500).unwrap_err(),
            TransitionError::EmptyValidatorSet(ValidatorId::new("node3"))
        );
    }
}
