//! Time source for the engine
//!
//! Everything time-dependent asks a [`Clock`] for "now" in the reference
//! timezone, so tests can drive time by hand.

use chrono::{Duration, FixedOffset, Utc};
use std::sync::{PoisonError, RwLock};

use crate::types::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Reference timezone of the instants returned by [`Clock::now`]
    fn offset(&self) -> FixedOffset {
        *self.now().offset()
    }
}

/// Wall clock shifted into a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Build from a whole-hour UTC offset (e.g. -3)
    pub fn from_utc_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::new)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().with_timezone(&self.offset)
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, t: Timestamp) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = t;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
