//! Consumer Chain Model
//!
//! A consumer closes blocks on its own clock. Each close records the current
//! validator set and fires every pending maturation that has come due, which
//! queues a `VscMaturedPacket` for the provider.

use ccv_core::{ConsumerId, ProtocolParams, TimeDelta};

use super::chain::check_time_advancement;
use super::state::{ConsumerStatus, ProtocolState, VscMaturedPacket};
use crate::errors::TransitionError;

/// Check that `consumer` may close a block.
pub fn check_consumer_block_preconditions(
    state: &ProtocolState,
    params: &ProtocolParams,
    consumer: &ConsumerId,
    time_advancement: TimeDelta,
) -> Result<(), TransitionError> {
    check_time_advancement(time_advancement)?;
    require_running(state, params, consumer)
}

/// A transition addressed to `consumer` needs it configured and running.
pub(crate) fn require_running(
    state: &ProtocolState,
    params: &ProtocolParams,
    consumer: &ConsumerId,
) -> Result<(), TransitionError> {
    if !params.is_consumer(consumer) || !state.consumer_states.contains_key(consumer) {
        return Err(TransitionError::UnknownConsumer(consumer.clone()));
    }
    match state.consumer_status(consumer) {
        ConsumerStatus::Running => Ok(()),
        status => Err(TransitionError::ConsumerNotRunning {
            consumer: consumer.clone(),
            status,
        }),
    }
}

/// End `consumer`'s current block and begin the next one.
pub fn end_and_begin_block_for_consumer(
    state: &ProtocolState,
    params: &ProtocolParams,
    consumer: &ConsumerId,
    time_advancement: TimeDelta,
) -> Result<ProtocolState, TransitionError> {
    check_consumer_block_preconditions(state, params, consumer, time_advancement)?;

    let mut next = state.clone();
    let consumer_state = next
        .consumer_states
        .get_mut(consumer)
        .ok_or_else(|| TransitionError::UnknownConsumer(consumer.clone()))?;

    let now = consumer_state
        .chain_state
        .end_and_begin_block(time_advancement, consumer.as_str())?;

    // Fire due maturations in arrival order
    let (due, pending): (Vec<_>, Vec<_>) = consumer_state
        .maturation_times
        .drain(..)
        .partition(|m| m.maturation_time <= now);
    consumer_state.maturation_times = pending;
    for matured in &due {
        consumer_state
            .outstanding_packets_to_provider
            .push_back(VscMaturedPacket {
                id: matured.packet_id,
                sending_time: now,
            });
    }

    tracing::debug!(
        consumer = %consumer,
        closed_at = %now,
        matured = due.len(),
        "consumer block closed"
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::core::provider::end_and_begin_block_for_provider;
    use crate::core::state::PendingMaturation;
    use ccv_core::{PacketId, Timestamp};
    use std::collections::BTreeSet;

    fn started(params: &ProtocolParams) -> ProtocolState {
        let start: BTreeSet<_> = [ConsumerId::new("consumer1")].into_iter().collect();
        end_and_begin_block_for_provider(
            &ProtocolState::init(params),
            params,
            TimeDelta::DAY,
            &start,
            &BTreeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_block_close_records_history() {
        let params = ProtocolParams::default();
        let c1 = ConsumerId::new("consumer1");
        let state = started(&params);

        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1, TimeDelta::HOUR).unwrap();
        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1, TimeDelta::HOUR).unwrap();

        let chain = &state.consumer(&c1).unwrap().chain_state;
        assert_eq!(chain.last_timestamp, Some(Timestamp::from_secs(3_600)));
        assert_eq!(chain.running_timestamp, Timestamp::from_secs(7_200));
        assert_eq!(chain.voting_power_history.len(), 3);
    }

    #[test]
    fn test_only_running_consumers_close_blocks() {
        let params = ProtocolParams::default();
        let state = ProtocolState::init(&params);

        let err = end_and_begin_block_for_consumer(
            &state,
            &params,
            &ConsumerId::new("consumer1"),
            TimeDelta::HOUR,
        )
        .unwrap_err();
        assert_matches!(
            err,
            TransitionError::ConsumerNotRunning {
                status: ConsumerStatus::NotConsumer,
                ..
            }
        );

        let err = end_and_begin_block_for_consumer(
            &state,
            &params,
            &ConsumerId::new("ghost"),
            TimeDelta::HOUR,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::UnknownConsumer(ConsumerId::new("ghost")));
    }

    #[test]
    fn test_due_maturations_fire_in_order() {
        let params = ProtocolParams::default();
        let c1 = ConsumerId::new("consumer1");
        let mut state = started(&params);
        let pending = &mut state.consumer_states.get_mut(&c1).unwrap().maturation_times;
        pending.push(PendingMaturation {
            packet_id: PacketId::new(0),
            maturation_time: Timestamp::ZERO,
        });
        pending.push(PendingMaturation {
            packet_id: PacketId::new(1),
            maturation_time: Timestamp::from_secs(10),
        });

        // closes at 0: only the first is due
        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1, TimeDelta::SECOND).unwrap();
        let consumer = state.consumer(&c1).unwrap();
        assert_eq!(consumer.maturation_times.len(), 1);
        assert_eq!(
            consumer.outstanding_packets_to_provider.front(),
            Some(&VscMaturedPacket {
                id: PacketId::new(0),
                sending_time: Timestamp::ZERO,
            })
        );

        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1, TimeDelta::DAY).unwrap();
        let consumer = state.consumer(&c1).unwrap();
        assert_eq!(consumer.maturation_times.len(), 1);
        let state =
            end_and_begin_block_for_consumer(&state, &params, &c1, TimeDelta::DAY).unwrap();
        let consumer = state.consumer(&c1).unwrap();
        assert!(consumer.maturation_times.is_empty());
        let ids: Vec<_> = consumer
            .outstanding_packets_to_provider
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![PacketId::new(0), PacketId::new(1)]);
    }
}
