//! Model time
//!
//! Chains keep independent clocks. A `Timestamp` is a point on one chain's
//! clock in seconds since model genesis; a `TimeDelta` is a span of seconds.
//! Arithmetic is checked so the protocol core can refuse a transition rather
//! than wrap.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point on a chain clock, in seconds since genesis.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

/// Span of model time, in seconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeDelta(u64);

impl Timestamp {
    /// Genesis.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from seconds since genesis.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Seconds since genesis.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// `self + delta`, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add(delta.0).map(Self)
    }

    /// Distance between two points, regardless of order.
    #[must_use]
    pub fn abs_diff(self, other: Self) -> TimeDelta {
        TimeDelta(self.0.abs_diff(other.0))
    }
}

impl TimeDelta {
    /// Zero-length span.
    pub const ZERO: Self = Self(0);
    /// One second.
    pub const SECOND: Self = Self(1);
    /// One hour.
    pub const HOUR: Self = Self(3_600);
    /// One day.
    pub const DAY: Self = Self(86_400);
    /// One week.
    pub const WEEK: Self = Self(604_800);

    /// Create a span from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Length in seconds.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Whether this span is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `self + other`, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// `self - other`, floored at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Integer division by a non-zero scalar, or `None` when `divisor` is zero.
    #[must_use]
    pub fn checked_div(self, divisor: u64) -> Option<Self> {
        self.0.checked_div(divisor).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}s", self.0)
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs != 0 && secs % Self::WEEK.0 == 0 {
            write!(f, "{}w", secs / Self::WEEK.0)
        } else if secs != 0 && secs % Self::DAY.0 == 0 {
            write!(f, "{}d", secs / Self::DAY.0)
        } else if secs != 0 && secs % Self::HOUR.0 == 0 {
            write!(f, "{}h", secs / Self::HOUR.0)
        } else {
            write!(f, "{secs}s")
        }
    }
}
