//! Block boundary logic shared by the provider and consumer roles
//!
//! A block boundary is split in three so each role can interleave its own
//! work: `close_block` commits the running time, `record_snapshot` appends
//! the validator set to history, and `begin_block` starts the next block.

use ccv_core::{TimeDelta, Timestamp};

use super::state::ChainState;
use crate::errors::TransitionError;

/// Blocks must move time forward.
pub(crate) fn check_time_advancement(time_advancement: TimeDelta) -> Result<(), TransitionError> {
    if time_advancement.is_positive() {
        Ok(())
    } else {
        Err(TransitionError::NonPositiveTimeAdvancement(time_advancement))
    }
}

impl ChainState {
    /// Commit the in-progress block: `last_timestamp = running_timestamp`.
    pub(crate) fn close_block(&mut self) -> Timestamp {
        self.last_timestamp = Some(self.running_timestamp);
        self.running_timestamp
    }

    /// Append the current validator set to history (newest first).
    pub(crate) fn record_snapshot(&mut self) {
        self.voting_power_history
            .push_front(self.current_validator_set.clone());
    }

    /// Start the next block `time_advancement` after the closed one.
    pub(crate) fn begin_block(
        &mut self,
        time_advancement: TimeDelta,
        chain: &str,
    ) -> Result<(), TransitionError> {
        self.running_timestamp = self
            .running_timestamp
            .checked_add(time_advancement)
            .ok_or_else(|| TransitionError::TimeOverflow(chain.to_string()))?;
        Ok(())
    }

    /// Close the current block, record one snapshot and begin the next.
    pub(crate) fn end_and_begin_block(
        &mut self,
        time_advancement: TimeDelta,
        chain: &str,
    ) -> Result<Timestamp, TransitionError> {
        let closed_at = self.close_block();
        self.record_snapshot();
        self.begin_block(time_advancement, chain)?;
        Ok(closed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccv_core::{ValidatorId, ValidatorSet};

    fn chain() -> ChainState {
        let set: ValidatorSet = [(ValidatorId::new("a"), 5)].into_iter().collect();
        ChainState::genesis(set, Timestamp::from_secs(10))
    }

    #[test]
    fn test_end_and_begin_block() {
        let mut c = chain();
        let closed = c
            .end_and_begin_block(TimeDelta::from_secs(4), "test")
            .unwrap();

        assert_eq!(closed, Timestamp::from_secs(10));
        assert_eq!(c.last_timestamp, Some(Timestamp::from_secs(10)));
        assert_eq!(c.running_timestamp, Timestamp::from_secs(14));
        assert_eq!(c.voting_power_history.len(), 2);
    }

    #[test]
    fn test_history_is_newest_first() {
        let mut c = chain();
        c.current_validator_set = [(ValidatorId::new("b"), 1)].into_iter().collect();
        c.record_snapshot();
        assert_eq!(c.latest_snapshot(), Some(&c.current_validator_set));
        assert_eq!(c.voting_power_history.len(), 2);
    }

    #[test]
    fn test_overflow_is_a_precondition_failure() {
        let mut c = ChainState::genesis(ValidatorSet::new(), Timestamp::from_secs(u64::MAX));
        let err = c.begin_block(TimeDelta::SECOND, "c").unwrap_err();
        assert_eq!(err, TransitionError::TimeOverflow("c".to_string()));
    }

    #[test]
    fn test_time_must_advance() {
        assert!(check_time_advancement(TimeDelta::SECOND).is_ok());
        assert_eq!(
            check_time_advancement(TimeDelta::ZERO),
            Err(TransitionError::NonPositiveTimeAdvancement(TimeDelta::ZERO))
        );
    }
}
