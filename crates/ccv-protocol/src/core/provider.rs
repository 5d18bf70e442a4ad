//! Provider Chain Model
//!
//! Block boundary logic for the provider: consumer lifecycle, the VSC timeout
//! sweep, and snapshotting validator changes into outgoing packets.
//!
//! ## Block boundary, in order
//! 1. close the block; snapshot the validator set if it changed
//! 2. start `consumers_to_start`
//! 3. stop `consumers_to_stop`
//! 4. time out every running consumer with a packet older than the VSC timeout
//! 5. if the set changed, send one VSC packet to every running consumer
//! 6. begin the next block

use std::collections::BTreeSet;

use ccv_core::{ConsumerId, ProtocolParams, TimeDelta, Timestamp};

use super::chain::check_time_advancement;
use super::state::{ConsumerState, ConsumerStatus, ProtocolState, VscPacket};
use crate::errors::TransitionError;

/// Check that a provider block boundary is enabled.
///
/// Preconditions:
/// - `time_advancement > 0`
/// - every consumer to start is configured and `NotConsumer`
/// - every consumer to stop is configured and `Running`
/// - no consumer is both started and stopped
pub fn check_provider_block_preconditions(
    state: &ProtocolState,
    params: &ProtocolParams,
    time_advancement: TimeDelta,
    consumers_to_start: &BTreeSet<ConsumerId>,
    consumers_to_stop: &BTreeSet<ConsumerId>,
) -> Result<(), TransitionError> {
    check_time_advancement(time_advancement)?;

    if let Some(both) = consumers_to_start.intersection(consumers_to_stop).next() {
        return Err(TransitionError::OverlappingStartStop(both.clone()));
    }

    for consumer in consumers_to_start {
        if !params.is_consumer(consumer) {
            return Err(TransitionError::UnknownConsumer(consumer.clone()));
        }
        let status = state.consumer_status(consumer);
        if status != ConsumerStatus::NotConsumer {
            return Err(TransitionError::CannotStartConsumer {
                consumer: consumer.clone(),
                status,
            });
        }
    }

    for consumer in consumers_to_stop {
        if !params.is_consumer(consumer) {
            return Err(TransitionError::UnknownConsumer(consumer.clone()));
        }
        let status = state.consumer_status(consumer);
        if status != ConsumerStatus::Running {
            return Err(TransitionError::CannotStopConsumer {
                consumer: consumer.clone(),
                status,
            });
        }
    }

    Ok(())
}

/// End the provider's current block and begin the next one.
///
/// Returns the new state; `state` itself is never modified.
pub fn end_and_begin_block_for_provider(
    state: &ProtocolState,
    params: &ProtocolParams,
    time_advancement: TimeDelta,
    consumers_to_start: &BTreeSet<ConsumerId>,
    consumers_to_stop: &BTreeSet<ConsumerId>,
) -> Result<ProtocolState, TransitionError> {
    check_provider_block_preconditions(
        state,
        params,
        time_advancement,
        consumers_to_start,
        consumers_to_stop,
    )?;

    let mut next = state.clone();

    // 1. close the block
    let provider = &mut next.provider_state;
    let changed = provider.provider_validator_set_changed_in_this_block
        && provider.chain_state.validator_set_differs_from_snapshot();
    let now = provider.chain_state.close_block();
    if changed {
        provider.chain_state.record_snapshot();
    }
    provider.provider_validator_set_changed_in_this_block = false;

    // 2. start consumers on the current provider validator set
    for consumer in consumers_to_start {
        next.provider_state
            .consumer_status
            .insert(consumer.clone(), ConsumerStatus::Running);
        next.provider_state.clear_channels(consumer);
        next.consumer_states.insert(
            consumer.clone(),
            ConsumerState::new(
                next.provider_state.chain_state.current_validator_set.clone(),
                now,
            ),
        );
        tracing::info!(consumer = %consumer, at = %now, "consumer started");
    }

    // 3. stop consumers
    for consumer in consumers_to_stop {
        next.provider_state
            .consumer_status
            .insert(consumer.clone(), ConsumerStatus::Stopped);
        next.provider_state.clear_channels(consumer);
        tracing::info!(consumer = %consumer, at = %now, "consumer stopped");
    }

    // 4. VSC timeout sweep
    for consumer in timed_out_consumers(&next, now) {
        next.provider_state
            .consumer_status
            .insert(consumer.clone(), ConsumerStatus::TimedOut);
        next.provider_state.clear_channels(&consumer);
        tracing::info!(consumer = %consumer, at = %now, "consumer timed out waiting for maturation");
    }

    // 5. send the new validator set
    if changed {
        send_vsc_packets(&mut next, params, now)?;
    }

    // 6. begin the next block
    next.provider_state
        .chain_state
        .begin_block(time_advancement, "provider")?;

    Ok(next)
}

/// Running consumers whose oldest unmatured packet is past its timeout at `now`.
///
/// Packets are sent in time order, so the head of each queue is the oldest.
pub fn timed_out_consumers(state: &ProtocolState, now: Timestamp) -> Vec<ConsumerId> {
    state
        .provider_state
        .running_consumers()
        .filter(|consumer| {
            state
                .provider_state
                .sent_vsc_packets_to_consumer
                .get(*consumer)
                .and_then(|queue| queue.front())
                .is_some_and(|oldest| oldest.is_timed_out_at(now))
        })
        .cloned()
        .collect()
}

/// Queue one packet carrying the current validator set to every running
/// consumer, on both the in-transit channel and the unmatured record.
fn send_vsc_packets(
    state: &mut ProtocolState,
    params: &ProtocolParams,
    now: Timestamp,
) -> Result<(), TransitionError> {
    let receivers = state.running_consumers();
    if receivers.is_empty() {
        return Ok(());
    }

    let provider = &mut state.provider_state;
    let id = provider.running_vsc_id;
    provider.running_vsc_id = id
        .checked_next()
        .ok_or(TransitionError::PacketIdExhausted(id))?;

    let packet = VscPacket {
        id,
        validator_set: provider.chain_state.current_validator_set.clone(),
        sending_time: now,
        timeout_time: now
            .checked_add(params.vsc_timeout)
            .ok_or_else(|| TransitionError::TimeOverflow("provider".to_string()))?,
    };

    for consumer in &receivers {
        provider
            .outstanding_packets_to_consumer
            .entry(consumer.clone())
            .or_default()
            .push_back(packet.clone());
        provider
            .sent_vsc_packets_to_consumer
            .entry(consumer.clone())
            .or_default()
            .push_back(packet.clone());
    }

    tracing::debug!(
        packet = %packet.id,
        validators = %packet.validator_set,
        receivers = receivers.len(),
        "VSC packet sent"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::core::transitions::voting_power_change;
    use ccv_core::ValidatorId;

    fn consumers(names: &[&str]) -> BTreeSet<ConsumerId> {
        names.iter().map(|n| ConsumerId::new(*n)).collect()
    }

    fn none() -> BTreeSet<ConsumerId> {
        BTreeSet::new()
    }

    #[test]
    fn test_block_advances_clock() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);

        let next =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &none(), &none())
                .unwrap();

        let chain = &next.provider_state.chain_state;
        assert_eq!(chain.last_timestamp, Some(Timestamp::ZERO));
        assert_eq!(chain.running_timestamp, Timestamp::from_secs(86_400));
        // unchanged validator set: no new snapshot
        assert_eq!(chain.voting_power_history.len(), 1);
    }

    #[test]
    fn test_start_consumer() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let start = consumers(&["consumer1"]);

        let next =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &start, &none())
                .unwrap();

        let c1 = ConsumerId::new("consumer1");
        assert_eq!(next.consumer_status(&c1), ConsumerStatus::Running);
        let consumer = next.consumer(&c1).unwrap();
        assert_eq!(consumer.chain_state.last_timestamp, None);
        assert_eq!(
            consumer.chain_state.current_validator_set,
            params.initial_validator_set
        );
    }

    #[test]
    fn test_start_running_consumer_is_rejected() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let start = consumers(&["consumer1"]);
        let state =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &start, &none())
                .unwrap();

        let err =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &start, &none())
                .unwrap_err();
        assert_matches!(
            err,
            TransitionError::CannotStartConsumer {
                status: ConsumerStatus::Running,
                ..
            }
        );
    }

    #[test]
    fn test_invalid_start_stop_sets() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);

        let err = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &consumers(&["nobody"]),
            &none(),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::UnknownConsumer(ConsumerId::new("nobody")));

        let err = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &none(),
            &consumers(&["consumer1"]),
        )
        .unwrap_err();
        assert_matches!(err, TransitionError::CannotStopConsumer { .. });

        let both = consumers(&["consumer1"]);
        let err =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &both, &both)
                .unwrap_err();
        assert_matches!(err, TransitionError::OverlappingStartStop(_));

        let err =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::ZERO, &none(), &none())
                .unwrap_err();
        assert_matches!(err, TransitionError::NonPositiveTimeAdvancement(_));
    }

    #[test]
    fn test_changed_set_is_sent_to_running_consumers() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let state = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &consumers(&["consumer1", "consumer2"]),
            &none(),
        )
        .unwrap();
        let state = voting_power_change(&state, &params, &ValidatorId::new("node1"), 50).unwrap();
        let state =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &none(), &none())
                .unwrap();

        let provider = &state.provider_state;
        assert!(!provider.provider_validator_set_changed_in_this_block);
        assert_eq!(provider.chain_state.voting_power_history.len(), 2);
        assert_eq!(provider.running_vsc_id, ccv_core::PacketId::new(1));

        for name in ["consumer1", "consumer2"] {
            let c = ConsumerId::new(name);
            assert_eq!(state.outstanding_to_consumer_len(&c), 1);
            assert_eq!(state.sent_to_consumer_len(&c), 1);
            let packet = &provider.sent_vsc_packets_to_consumer[&c][0];
            assert_eq!(packet.sending_time, Timestamp::from_secs(86_400));
            assert_eq!(
                packet.timeout_time,
                Timestamp::from_secs(86_400 + params.vsc_timeout.as_secs())
            );
            assert_eq!(packet.validator_set.power_of(&ValidatorId::new("node1")), 150);
        }
        assert_eq!(state.outstanding_to_consumer_len(&ConsumerId::new("consumer3")), 0);
    }

    #[test]
    fn test_change_reverted_within_block_sends_nothing() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let state = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &consumers(&["consumer1"]),
            &none(),
        )
        .unwrap();
        let node1 = ValidatorId::new("node1");
        let state = voting_power_change(&state, &params, &node1, 10).unwrap();
        let state = voting_power_change(&state, &params, &node1, -10).unwrap();
        let state =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &none(), &none())
                .unwrap();

        assert_eq!(state.sent_to_consumer_len(&ConsumerId::new("consumer1")), 0);
        assert_eq!(state.provider_state.chain_state.voting_power_history.len(), 1);
    }

    #[test]
    fn test_stop_consumer_drops_channels() {
        let params = ProtocolParams::default();
        let c1 = ConsumerId::new("consumer1");
        let state = ProtocolState::init(&params);
        let state = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &consumers(&["consumer1"]),
            &none(),
        )
        .unwrap();
        let state = voting_power_change(&state, &params, &ValidatorId::new("node2"), 1).unwrap();
        let state =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &none(), &none())
                .unwrap();
        assert_eq!(state.outstanding_to_consumer_len(&c1), 1);

        let state = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &none(),
            &consumers(&["consumer1"]),
        )
        .unwrap();
        assert_eq!(state.consumer_status(&c1), ConsumerStatus::Stopped);
        assert_eq!(state.outstanding_to_consumer_len(&c1), 0);
        assert_eq!(state.sent_to_consumer_len(&c1), 0);
        // history is retained
        assert!(state.consumer(&c1).is_some());
    }

    #[test]
    fn test_failed_block_leaves_state_untouched() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);
        let before = state.clone();
        let _ = end_and_begin_block_for_provider(
            &state,
            &params,
            TimeDelta::DAY,
            &consumers(&["consumer1", "nobody"]),
            &none(),
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_exhausted_packet_ids_refuse_the_block() {
        let params = ProtocolParams::default();
        let mut state = end_and_begin_block_for_provider(
            &ProtocolState::init(&params),
            &params,
            TimeDelta::DAY,
            &consumers(&["consumer1"]),
            &none(),
        )
        .unwrap();
        let last = ccv_core::PacketId::new(u64::MAX);
        state.provider_state.running_vsc_id = last;
        let state = voting_power_change(&state, &params, &ValidatorId::new("node1"), 5).unwrap();
        let before = state.clone();

        let err =
            end_and_begin_block_for_provider(&state, &params, TimeDelta::DAY, &none(), &none())
                .unwrap_err();
        assert_eq!(err, TransitionError::PacketIdExhausted(last));
        assert_eq!(err.code(), "ccv_packet_id_exhausted");
        assert_eq!(state, before);
    }
}
