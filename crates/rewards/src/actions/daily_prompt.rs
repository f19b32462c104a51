use chrono::{DateTime, FixedOffset};

use super::next_local_midnight;

/// The "wheel shown today" flag.
///
/// Independent of the claim marker: it only decides whether the wheel should
/// be offered unprompted. A reset is armed for the next local midnight and
/// fires once when [`DailyPrompt::poll`] observes that instant, after which it
/// re-arms for the following midnight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyPrompt {
    shown_today: bool,
    reset_at: DateTime<FixedOffset>,
}

impl DailyPrompt {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            shown_today: false,
            reset_at: next_local_midnight(&now),
        }
    }

    pub fn shown_today(&self) -> bool {
        self.shown_today
    }

    pub fn reset_at(&self) -> DateTime<FixedOffset> {
        self.reset_at
    }

    pub fn mark_shown(&mut self) {
        self.shown_today = true;
    }

    /// Fire the midnight reset if it is due. Returns true when it fired.
    pub fn poll(&mut self, now: DateTime<FixedOffset>) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.shown_today = false;
        self.reset_at = next_local_midnight(&now);
        tracing::debug!(next_reset = %self.reset_at, "daily prompt reset");
        true
    }
}
