//! Pure CCV State Definitions
//!
//! Effect-free state structures for the provider and consumer chain models.
//! Every map is ordered so that iteration, serialization, and therefore whole
//! runs are reproducible from a seed.
//!
//! ## Model Correspondence
//! - `ChainState` ↔ `ChainState` (clock + validator-set history, shared by both roles)
//! - `ConsumerStatus` ↔ `ConsumerAdvancementStatus`
//! - `VscPacket` / `VscMaturedPacket` ↔ `VscPacket` / `VscMaturedPacket`
//! - `ProviderState`, `ConsumerState`, `ProtocolState` ↔ the same-named records

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use ccv_core::{Chain, ConsumerId, PacketId, ProtocolParams, Timestamp, ValidatorSet};
use serde::{Deserialize, Serialize};

/// Clock and validator-set history of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Time of the last completed block; `None` until the first block closes
    pub last_timestamp: Option<Timestamp>,

    /// Time of the block currently being built
    pub running_timestamp: Timestamp,

    /// Validator set as of the in-progress block
    pub current_validator_set: ValidatorSet,

    /// Validator-set snapshots, newest first
    pub voting_power_history: VecDeque<ValidatorSet>,
}

/// Lifecycle of a consumer chain as seen by the provider.
///
/// `Stopped` and `TimedOut` are terminal: the consumer never processes
/// another packet, though its state is kept for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerStatus {
    /// Configured but never started
    #[default]
    NotConsumer,
    /// Receiving validator set changes
    Running,
    /// Stopped by the provider
    Stopped,
    /// Removed for failing to mature a packet in time
    #[serde(rename = "TIMEDOUT")]
    TimedOut,
}

/// Validator set change sent from the provider to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VscPacket {
    /// Provider-unique, strictly increasing
    pub id: PacketId,
    /// Provider validator set snapshot carried by the packet
    pub validator_set: ValidatorSet,
    /// Provider time of the block that sent the packet
    pub sending_time: Timestamp,
    /// `sending_time + vsc_timeout`
    pub timeout_time: Timestamp,
}

/// Acknowledgment that a consumer finished unbonding for a VSC packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VscMaturedPacket {
    /// Id of the matured VSC packet
    pub id: PacketId,
    /// Consumer time of the block that emitted the acknowledgment
    pub sending_time: Timestamp,
}

/// A maturation the provider has accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaturationReceipt {
    /// Consumer that matured the packet
    pub consumer: ConsumerId,
    /// The acknowledgment as received
    pub packet: VscMaturedPacket,
}

/// A received VSC packet waiting for its unbonding period to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingMaturation {
    /// Id of the received VSC packet
    pub packet_id: PacketId,
    /// Consumer time at or after which the packet matures
    pub maturation_time: Timestamp,
}

/// Provider chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderState {
    /// Provider clock and validator-set history
    pub chain_state: ChainState,

    /// Lifecycle status of every configured consumer
    pub consumer_status: BTreeMap<ConsumerId, ConsumerStatus>,

    /// In-transit channel provider → consumer, oldest first
    pub outstanding_packets_to_consumer: BTreeMap<ConsumerId, VecDeque<VscPacket>>,

    /// Packets sent but not yet matured, oldest first
    pub sent_vsc_packets_to_consumer: BTreeMap<ConsumerId, VecDeque<VscPacket>>,

    /// Accepted maturations
    pub received_maturations: BTreeSet<MaturationReceipt>,

    /// Set by voting power changes, cleared at every provider block boundary
    pub provider_validator_set_changed_in_this_block: bool,

    /// Id for the next VSC packet
    pub running_vsc_id: PacketId,
}

/// Consumer chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerState {
    /// Consumer clock and validator-set history
    pub chain_state: ChainState,

    /// Every VSC packet applied, in arrival order
    pub received_vsc_packets: Vec<VscPacket>,

    /// Received packets still unbonding, in arrival order
    pub maturation_times: Vec<PendingMaturation>,

    /// In-transit channel consumer → provider, oldest first
    pub outstanding_packets_to_provider: VecDeque<VscMaturedPacket>,
}

/// Global protocol state: the single root every transition rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolState {
    /// The provider
    pub provider_state: ProviderState,
    /// One entry per configured consumer, kept across status changes
    pub consumer_states: BTreeMap<ConsumerId, ConsumerState>,
}

impl fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerStatus::NotConsumer => "NOT_CONSUMER",
            ConsumerStatus::Running => "RUNNING",
            ConsumerStatus::Stopped => "STOPPED",
            ConsumerStatus::TimedOut => "TIMEDOUT",
        };
        f.write_str(s)
    }
}

impl VscPacket {
    /// Whether the packet is past its timeout at time `now`.
    pub fn is_timed_out_at(&self, now: Timestamp) -> bool {
        now > self.timeout_time
    }
}

impl ChainState {
    /// A chain that has not completed any block yet.
    pub fn genesis(validator_set: ValidatorSet, running_timestamp: Timestamp) -> Self {
        Self {
            last_timestamp: None,
            running_timestamp,
            voting_power_history: VecDeque::from([validator_set.clone()]),
            current_validator_set: validator_set,
        }
    }

    /// Newest validator-set snapshot.
    pub fn latest_snapshot(&self) -> Option<&ValidatorSet> {
        self.voting_power_history.front()
    }

    /// Whether the in-progress validator set differs from the last snapshot.
    pub fn validator_set_differs_from_snapshot(&self) -> bool {
        self.latest_snapshot() != Some(&self.current_validator_set)
    }

    /// `last_timestamp`, or `running_timestamp` for a chain that never closed
    /// a block (its first close commits exactly that time).
    pub fn effective_last_timestamp(&self) -> Timestamp {
        self.last_timestamp.unwrap_or(self.running_timestamp)
    }

    /// Whether `set` appears anywhere in the history.
    pub fn has_had_validator_set(&self, set: &ValidatorSet) -> bool {
        self.voting_power_history.iter().any(|s| s == set)
    }
}

impl ConsumerState {
    /// Fresh consumer whose genesis validator set is `validator_set`.
    pub fn new(validator_set: ValidatorSet, running_timestamp: Timestamp) -> Self {
        Self {
            chain_state: ChainState::genesis(validator_set, running_timestamp),
            received_vsc_packets: Vec::new(),
            maturation_times: Vec::new(),
            outstanding_packets_to_provider: VecDeque::new(),
        }
    }
}

impl ProviderState {
    /// Status of `consumer`; unconfigured ids read as `NotConsumer`.
    pub fn status_of(&self, consumer: &ConsumerId) -> ConsumerStatus {
        self.consumer_status
            .get(consumer)
            .copied()
            .unwrap_or_default()
    }

    /// Consumers currently in `Running`, in id order.
    pub fn running_consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.consumer_status
            .iter()
            .filter(|(_, status)| **status == ConsumerStatus::Running)
            .map(|(id, _)| id)
    }

    /// Drop every packet still in flight to or awaiting maturation from `consumer`.
    pub(crate) fn clear_channels(&mut self, consumer: &ConsumerId) {
        if let Some(queue) = self.outstanding_packets_to_consumer.get_mut(consumer) {
            queue.clear();
        }
        if let Some(queue) = self.sent_vsc_packets_to_consumer.get_mut(consumer) {
            queue.clear();
        }
    }
}

impl ProtocolState {
    /// Genesis state: provider at time zero with the configured validator
    /// set, every consumer configured but not yet started.
    pub fn init(params: &ProtocolParams) -> Self {
        let initial = params.initial_validator_set.clone();

        let consumer_status = params
            .consumer_ids()
            .map(|c| (c.clone(), ConsumerStatus::NotConsumer))
            .collect();
        let empty_queues: BTreeMap<ConsumerId, VecDeque<VscPacket>> = params
            .consumer_ids()
            .map(|c| (c.clone(), VecDeque::new()))
            .collect();
        let consumer_states = params
            .consumer_ids()
            .map(|c| (c.clone(), ConsumerState::new(initial.clone(), Timestamp::ZERO)))
            .collect();

        Self {
            provider_state: ProviderState {
                chain_state: ChainState::genesis(initial, Timestamp::ZERO),
                consumer_status,
                outstanding_packets_to_consumer: empty_queues.clone(),
                sent_vsc_packets_to_consumer: empty_queues,
                received_maturations: BTreeSet::new(),
                provider_validator_set_changed_in_this_block: false,
                running_vsc_id: PacketId::new(0),
            },
            consumer_states,
        }
    }

    /// Status of `consumer`.
    pub fn consumer_status(&self, consumer: &ConsumerId) -> ConsumerStatus {
        self.provider_state.status_of(consumer)
    }

    /// Consumers currently running, in id order.
    pub fn running_consumers(&self) -> Vec<ConsumerId> {
        self.provider_state.running_consumers().cloned().collect()
    }

    /// The provider plus every running consumer.
    pub fn running_chains(&self) -> Vec<Chain> {
        std::iter::once(Chain::Provider)
            .chain(self.provider_state.running_consumers().cloned().map(Chain::Consumer))
            .collect()
    }

    /// State of a consumer chain.
    pub fn consumer(&self, consumer: &ConsumerId) -> Option<&ConsumerState> {
        self.consumer_states.get(consumer)
    }

    /// Clock and history of any chain.
    pub fn chain_state(&self, chain: &Chain) -> Option<&ChainState> {
        match chain {
            Chain::Provider => Some(&self.provider_state.chain_state),
            Chain::Consumer(id) => self.consumer_states.get(id).map(|c| &c.chain_state),
        }
    }

    /// Current validator set of any chain.
    pub fn current_validator_set(&self, chain: &Chain) -> Option<&ValidatorSet> {
        self.chain_state(chain).map(|c| &c.current_validator_set)
    }

    /// Validator-set history of any chain, newest first.
    pub fn voting_power_history(&self, chain: &Chain) -> Option<&VecDeque<ValidatorSet>> {
        self.chain_state(chain).map(|c| &c.voting_power_history)
    }

    /// VSC packets in transit to `consumer`.
    pub fn outstanding_to_consumer_len(&self, consumer: &ConsumerId) -> usize {
        self.provider_state
            .outstanding_packets_to_consumer
            .get(consumer)
            .map_or(0, VecDeque::len)
    }

    /// VSC packets sent to `consumer` and not yet matured.
    pub fn sent_to_consumer_len(&self, consumer: &ConsumerId) -> usize {
        self.provider_state
            .sent_vsc_packets_to_consumer
            .get(consumer)
            .map_or(0, VecDeque::len)
    }

    /// Matured packets in transit from `consumer` to the provider.
    pub fn outstanding_to_provider_len(&self, consumer: &ConsumerId) -> usize {
        self.consumer_states
            .get(consumer)
            .map_or(0, |c| c.outstanding_packets_to_provider.len())
    }

    /// Pending maturation entries on `consumer`.
    pub fn pending_maturations_len(&self, consumer: &ConsumerId) -> usize {
        self.consumer_states
            .get(consumer)
            .map_or(0, |c| c.maturation_times.len())
    }
}
