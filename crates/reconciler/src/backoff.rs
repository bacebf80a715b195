//! Per-identity exponential backoff for failed reconciliation passes.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Default delay after the first failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling on the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Exponential backoff curve: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl ExponentialBackoff {
    /// Create a backoff curve.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Set the base delay.
    #[must_use]
    pub const fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay after `failures` previous consecutive failures (0-indexed).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        2_u32
            .checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Tracks consecutive failures per key and turns them into delays.
#[derive(Debug, Clone)]
pub struct FailureRateLimiter<K> {
    backoff: ExponentialBackoff,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> FailureRateLimiter<K> {
    /// Create a limiter following the given curve.
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: HashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying.
    pub fn when(&mut self, key: &K) -> Duration {
        let count = self.failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Number of failures recorded for `key` since the last success.
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Reset `key` to the base delay.
    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// The curve this limiter follows.
    #[must_use]
    pub const fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }
}
