use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::errors::RewardError;

pub mod transaction;
pub use transaction::*;

/// Reward amounts on the default wheel, one per segment, clockwise from 0°.
pub const DEFAULT_REWARDS: [u64; 8] = [2, 3, 5, 8, 10, 0, 15, 1];

/// Identifier used by form throttling when no e-mail was submitted.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

// Form throttling defaults (calls per window).
pub const DEFAULT_RATE_LIMIT: i64 = 5;
pub const DEFAULT_RATE_WINDOW_MS: i64 = 60_000;
pub const CONTACT_RATE_LIMIT: i64 = 3;
pub const CONTACT_RATE_WINDOW_MS: i64 = 60_000;

pub const DEGREES_PER_TURN: f64 = 360.0;

/// Ordered, immutable list of wheel segments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct OutcomeTable {
    rewards: Vec<u64>,
}

impl OutcomeTable {
    pub fn new(rewards: Vec<u64>) -> Result<Self, RewardError> {
        if rewards.is_empty() {
            return Err(RewardError::EmptyOutcomeTable);
        }
        Ok(Self { rewards })
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn reward(&self, index: usize) -> Result<u64, RewardError> {
        self.rewards
            .get(index)
            .copied()
            .ok_or(RewardError::SegmentOutOfRange {
                index,
                len: self.rewards.len(),
            })
    }

    pub fn rewards(&self) -> &[u64] {
        &self.rewards
    }

    /// Angular width of one segment in degrees.
    pub fn segment_degrees(&self) -> f64 {
        DEGREES_PER_TURN / self.rewards.len() as f64
    }
}

impl Default for OutcomeTable {
    fn default() -> Self {
        Self {
            rewards: DEFAULT_REWARDS.to_vec(),
        }
    }
}

impl TryFrom<Vec<u64>> for OutcomeTable {
    type Error = RewardError;

    fn try_from(rewards: Vec<u64>) -> Result<Self, Self::Error> {
        Self::new(rewards)
    }
}

impl From<OutcomeTable> for Vec<u64> {
    fn from(table: OutcomeTable) -> Self {
        table.rewards
    }
}

/// Last accepted daily claim for an account. Overwritten on every accepted
/// claim; the midnight prompt reset never touches it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMarker {
    pub claimed_at: DateTime<FixedOffset>,
    pub amount: u64,
}

/// Fixed-window counter for one identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Calls admitted in the current window.
    pub count: u64,
    /// Window start (unix millis).
    pub window_start_ms: i64,
}

impl RateWindow {
    pub fn opened_at(now_ms: i64) -> Self {
        Self {
            count: 1,
            window_start_ms: now_ms,
        }
    }

    pub fn is_expired(&self, window_ms: i64, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window_ms
    }
}
