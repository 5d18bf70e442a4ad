//! Pure CCV Invariant Checks
//!
//! Effect-free predicates over `ProtocolState`, evaluated after every
//! transition by drivers and simulators. None of them is consulted by the
//! transitions themselves.
//!
//! ## Model Correspondence
//! - `validator_set_has_existed` ↔ `ValidatorSetHasExisted`
//! - `same_vsc_packets_received` ↔ `SameVscPacketsReceived`
//! - `maturations_fired` ↔ `MatureOnTime`
//! - `pending_packets_within_timeout` ↔ `EventuallyMatureOnProvider`
//! - `bounded_drift` ↔ `TimestampsBoundedByDrift`
//! - `updates_propagated` ↔ `ValidatorUpdatesArePropagated`

use std::collections::BTreeSet;

use ccv_core::{Chain, ConsumerId, PacketId, ProtocolParams, TimeDelta, Timestamp};

use super::state::{ConsumerStatus, ProtocolState};

/// A violated safety property, with enough context to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A consumer ran a validator set the provider never had
    #[error("{consumer} has a validator set the provider never had")]
    ValidatorSetNeverExisted {
        /// Offending consumer
        consumer: ConsumerId,
    },

    /// Two consumers received different packets between shared packets
    #[error("{first} and {second} received different VSC packets between {from} and {to}")]
    DivergentPacketSequences {
        /// One consumer
        first: ConsumerId,
        /// The other consumer
        second: ConsumerId,
        /// Oldest shared packet
        from: PacketId,
        /// Newest shared packet
        to: PacketId,
    },

    /// A maturation that was due at the last block close is still pending
    #[error("{consumer} did not mature {packet} due at {due} by its block at {closed_at}")]
    MaturationNotFired {
        /// Offending consumer
        consumer: ConsumerId,
        /// Unmatured packet
        packet: PacketId,
        /// Its maturation time
        due: Timestamp,
        /// Consumer's last block time
        closed_at: Timestamp,
    },

    /// A running consumer has an unacknowledged packet older than the VSC timeout
    #[error("{consumer} still running with {packet} past its timeout {timeout} at provider time {now}")]
    PacketPastTimeout {
        /// Offending consumer
        consumer: ConsumerId,
        /// Expired packet
        packet: PacketId,
        /// Its timeout
        timeout: Timestamp,
        /// Provider's last block time
        now: Timestamp,
    },

    /// Two running chains drifted apart by more than allowed
    #[error("{ahead} runs {drift} ahead of {behind}, above the bound of {max_drift}")]
    DriftExceeded {
        /// Chain whose running time is ahead
        ahead: Chain,
        /// Chain whose last block lags
        behind: Chain,
        /// Observed distance
        drift: TimeDelta,
        /// Allowed distance
        max_drift: TimeDelta,
    },

    /// A chain lost its validator-set history
    #[error("{0} has an empty validator-set history")]
    EmptyHistory(Chain),

    /// A provider validator set change did not reach a running consumer
    #[error("provider validator set change was not sent to {consumer}")]
    UpdateNotPropagated {
        /// Consumer that missed the update
        consumer: ConsumerId,
    },
}

impl InvariantViolation {
    /// Stable code for logs and traces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidatorSetNeverExisted { .. } => "ccv_validator_set_never_existed",
            Self::DivergentPacketSequences { .. } => "ccv_divergent_packet_sequences",
            Self::MaturationNotFired { .. } => "ccv_maturation_not_fired",
            Self::PacketPastTimeout { .. } => "ccv_packet_past_timeout",
            Self::DriftExceeded { .. } => "ccv_drift_exceeded",
            Self::EmptyHistory(_) => "ccv_empty_history",
            Self::UpdateNotPropagated { .. } => "ccv_update_not_propagated",
        }
    }
}

/// Every validator set in a running consumer's history appears in the
/// provider's history.
pub fn validator_set_has_existed(state: &ProtocolState) -> Result<(), InvariantViolation> {
    let provider = &state.provider_state.chain_state;
    for consumer in state.provider_state.running_consumers() {
        let Some(consumer_state) = state.consumer(consumer) else {
            continue;
        };
        let foreign = consumer_state
            .chain_state
            .voting_power_history
            .iter()
            .any(|set| !provider.has_had_validator_set(set));
        if foreign {
            return Err(InvariantViolation::ValidatorSetNeverExisted {
                consumer: consumer.clone(),
            });
        }
    }
    Ok(())
}

/// Any two running consumers sharing two or more received packets received
/// exactly the same packets between the oldest and newest shared one.
pub fn same_vsc_packets_received(state: &ProtocolState) -> Result<(), InvariantViolation> {
    let running = state.running_consumers();
    for (i, first) in running.iter().enumerate() {
        for second in &running[i + 1..] {
            let ids_first = received_ids(state, first);
            let ids_second = received_ids(state, second);
            let shared: BTreeSet<PacketId> = ids_first
                .iter()
                .filter(|id| ids_second.contains(id))
                .copied()
                .collect();
            let (Some(&from), Some(&to)) = (shared.first(), shared.last()) else {
                continue;
            };
            if from == to {
                continue;
            }
            let window = |ids: &[PacketId]| -> Vec<PacketId> {
                ids.iter()
                    .copied()
                    .filter(|id| (from..=to).contains(id))
                    .collect()
            };
            if window(&ids_first) != window(&ids_second) {
                return Err(InvariantViolation::DivergentPacketSequences {
                    first: first.clone(),
                    second: second.clone(),
                    from,
                    to,
                });
            }
        }
    }
    Ok(())
}

fn received_ids(state: &ProtocolState, consumer: &ConsumerId) -> Vec<PacketId> {
    state
        .consumer(consumer)
        .map(|c| c.received_vsc_packets.iter().map(|p| p.id).collect())
        .unwrap_or_default()
}

/// No running consumer holds a pending maturation due at or before its last
/// completed block.
pub fn maturations_fired(state: &ProtocolState) -> Result<(), InvariantViolation> {
    for consumer in state.provider_state.running_consumers() {
        let Some(consumer_state) = state.consumer(consumer) else {
            continue;
        };
        let Some(closed_at) = consumer_state.chain_state.last_timestamp else {
            continue;
        };
        if let Some(overdue) = consumer_state
            .maturation_times
            .iter()
            .find(|m| m.maturation_time <= closed_at)
        {
            return Err(InvariantViolation::MaturationNotFired {
                consumer: consumer.clone(),
                packet: overdue.packet_id,
                due: overdue.maturation_time,
                closed_at,
            });
        }
    }
    Ok(())
}

/// Every packet still awaiting maturation from a running consumer is within
/// its timeout at the provider's last block.
pub fn pending_packets_within_timeout(state: &ProtocolState) -> Result<(), InvariantViolation> {
    let Some(now) = state.provider_state.chain_state.last_timestamp else {
        return Ok(());
    };
    for consumer in state.provider_state.running_consumers() {
        let expired = state
            .provider_state
            .sent_vsc_packets_to_consumer
            .get(consumer)
            .and_then(|queue| queue.iter().find(|p| p.is_timed_out_at(now)));
        if let Some(packet) = expired {
            return Err(InvariantViolation::PacketPastTimeout {
                consumer: consumer.clone(),
                packet: packet.id,
                timeout: packet.timeout_time,
                now,
            });
        }
    }
    Ok(())
}

/// For every pair of running chains A and B, the running time of A and the
/// last block time of B are at most `max_drift` apart.
///
/// A chain that has not closed a block yet counts its running time as its
/// last block time.
pub fn bounded_drift(state: &ProtocolState, max_drift: TimeDelta) -> Result<(), InvariantViolation> {
    let chains: Vec<_> = state
        .running_chains()
        .into_iter()
        .filter_map(|chain| state.chain_state(&chain).map(|c| (chain, c)))
        .collect();

    for (a, a_state) in &chains {
        for (b, b_state) in &chains {
            if a == b {
                continue;
            }
            let running = a_state.running_timestamp;
            let last = b_state.effective_last_timestamp();
            let drift = running.abs_diff(last);
            if drift > max_drift {
                let (ahead, behind) = if running >= last { (a, b) } else { (b, a) };
                return Err(InvariantViolation::DriftExceeded {
                    ahead: ahead.clone(),
                    behind: behind.clone(),
                    drift,
                    max_drift,
                });
            }
        }
    }
    Ok(())
}

/// The provider and every configured consumer keep at least one snapshot.
pub fn histories_nonempty(
    state: &ProtocolState,
    params: &ProtocolParams,
) -> Result<(), InvariantViolation> {
    let chains = std::iter::once(Chain::Provider)
        .chain(params.consumer_ids().cloned().map(Chain::Consumer));
    for chain in chains {
        let empty = state
            .voting_power_history(&chain)
            .map_or(true, |history| history.is_empty());
        if empty {
            return Err(InvariantViolation::EmptyHistory(chain));
        }
    }
    Ok(())
}

/// Transition-level check: when a provider block records a new snapshot,
/// every consumer running afterwards either was sent that snapshot or was
/// started on it.
pub fn updates_propagated(
    pre: &ProtocolState,
    post: &ProtocolState,
) -> Result<(), InvariantViolation> {
    let pre_history = pre.provider_state.chain_state.voting_power_history.len();
    let post_chain = &post.provider_state.chain_state;
    if post_chain.voting_power_history.len() <= pre_history {
        return Ok(());
    }
    let Some(snapshot) = post_chain.latest_snapshot() else {
        return Ok(());
    };

    for consumer in post.provider_state.running_consumers() {
        let sent = post
            .provider_state
            .sent_vsc_packets_to_consumer
            .get(consumer)
            .and_then(|queue| queue.back())
            .is_some_and(|packet| {
                &packet.validator_set == snapshot
                    && Some(packet.sending_time) == post_chain.last_timestamp
            });
        let started_on_it = pre.consumer_status(consumer) == ConsumerStatus::NotConsumer
            && post.current_validator_set(&Chain::Consumer(consumer.clone())) == Some(snapshot);

        if !sent && !started_on_it {
            return Err(InvariantViolation::UpdateNotPropagated {
                consumer: consumer.clone(),
            });
        }
    }
    Ok(())
}

/// Check every state invariant except the drift bound, stopping at the first
/// violation.
pub fn check_invariants(
    state: &ProtocolState,
    params: &ProtocolParams,
) -> Result<(), InvariantViolation> {
    histories_nonempty(state, params)?;
    validator_set_has_existed(state)?;
    same_vsc_packets_received(state)?;
    maturations_fired(state)?;
    pending_packets_within_timeout(state)?;
    Ok(())
}

/// Every violated state invariant, drift bound excluded.
pub fn collect_violations(state: &ProtocolState, params: &ProtocolParams) -> Vec<InvariantViolation> {
    [
        histories_nonempty(state, params),
        validator_set_has_existed(state),
        same_vsc_packets_received(state),
        maturations_fired(state),
        pending_packets_within_timeout(state),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect()
}
