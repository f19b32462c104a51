use crate::clock::Clock;
use crate::errors::RewardError;
use crate::state::RateWindow;
use crate::store::KeyValueStore;

/// Validated fixed-window limit: `limit` calls per `window_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u64,
    window_ms: i64,
}

impl RateLimitPolicy {
    pub fn new(limit: i64, window_ms: i64) -> Result<Self, RewardError> {
        let invalid = || RewardError::InvalidRateLimitConfig { limit, window_ms };
        if limit <= 0 || window_ms <= 0 {
            return Err(invalid());
        }
        Ok(Self {
            limit: limit.unsigned_abs(),
            window_ms,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

/// Advance a fixed-window counter by one call at `now_ms`.
///
/// Opens a fresh window `{count: 1, start: now}` when there is none or the
/// current one is older than `window_ms`. Otherwise admits the call only while
/// `count < limit`; a rejected call does not increment the count.
///
/// Windows are fixed, not sliding: a burst at the end of one window followed
/// by a burst at the start of the next admits up to `2 * limit` calls in
/// roughly one window's time.
pub fn consume_rate_limit(window: &mut Option<RateWindow>, policy: &RateLimitPolicy, now_ms: i64) -> bool {
    match window {
        Some(w) if !w.is_expired(policy.window_ms, now_ms) => {
            if w.count >= policy.limit {
                return false;
            }
            w.count += 1;
            true
        }
        _ => {
            *window = Some(RateWindow::opened_at(now_ms));
            true
        }
    }
}

/// Per-identifier throttle for form submissions (login, registration, contact).
pub struct RateLimiter<S, C> {
    windows: S,
    clock: C,
}

impl<S: KeyValueStore<RateWindow>, C: Clock> RateLimiter<S, C> {
    pub fn new(windows: S, clock: C) -> Self {
        Self { windows, clock }
    }

    /// Returns whether a call from `identifier` may proceed.
    ///
    /// Fails closed: a non-positive `limit` or `window_ms`, or any store
    /// error, denies the call.
    pub fn allow(&self, identifier: &str, limit: i64, window_ms: i64) -> bool {
        let policy = match RateLimitPolicy::new(limit, window_ms) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(identifier, error = %e, "rate limit misconfigured, denying");
                return false;
            }
        };
        match self.check(identifier, &policy) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(identifier, error = %e, "rate limit store failed, denying");
                false
            }
        }
    }

    pub fn check(&self, identifier: &str, policy: &RateLimitPolicy) -> Result<bool, RewardError> {
        let now_ms = self.clock.now().timestamp_millis();

        // One store update, so concurrent callers never consume the same count.
        let mut allowed = false;
        self.windows.update(identifier, |current| {
            let mut window = current.copied();
            allowed = consume_rate_limit(&mut window, policy, now_ms);
            if allowed {
                window
            } else {
                None
            }
        })?;

        if allowed {
            tracing::debug!(identifier, limit = policy.limit, "call admitted");
        } else {
            tracing::warn!(
                identifier,
                limit = policy.limit,
                window_ms = policy.window_ms,
                "rate limit exceeded"
            );
        }
        Ok(allowed)
    }

    /// Current window for `identifier`, if one was ever opened.
    pub fn window(&self, identifier: &str) -> Result<Option<RateWindow>, RewardError> {
        Ok(self.windows.get(identifier)?)
    }
}
