pub mod claim_reward;
pub mod consume_rate_limit;
pub mod daily_prompt;
pub mod spin;

pub use claim_reward::*;
pub use consume_rate_limit::*;
pub use daily_prompt::*;
pub use spin::*;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime};

/// Start of the next calendar day in `now`'s offset.
pub fn next_local_midnight(now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let since_midnight = now.time().signed_duration_since(NaiveTime::MIN);
    *now - since_midnight + Duration::days(1)
}

/// Time left before a new daily reward can be claimed.
pub fn time_until_next_reward(now: &DateTime<FixedOffset>) -> Duration {
    next_local_midnight(now) - *now
}

/// `HH:MM:SS`, clamped at zero. Hours are not wrapped.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
