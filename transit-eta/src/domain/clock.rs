//! Time source for countdown-based operators.

use chrono::{TimeDelta, Utc};

use super::eta::{EtaTime, hk_offset};

/// Where "now" comes from when an operator reports arrivals as countdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// The system clock.
    #[default]
    System,
    /// A fixed instant, so the same payload normalizes identically.
    Fixed(EtaTime),
}

impl Clock {
    pub fn now(&self) -> EtaTime {
        match self {
            Clock::System => Utc::now().with_timezone(&hk_offset()),
            Clock::Fixed(t) => *t,
        }
    }

    /// `now` plus a countdown in seconds, or `None` when the result is out
    /// of range.
    pub fn after_secs(&self, secs: i64) -> Option<EtaTime> {
        self.now().checked_add_signed(TimeDelta::try_seconds(secs)?)
    }
}
