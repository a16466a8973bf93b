//! Reconnection backoff shared by every retrying task.
//!
//! [`BackoffPolicy`] describes the schedule (initial delay, multiplier, ceiling, additive jitter,
//! counter wrap-around); [`Backoff`] is the per-task cursor over that schedule.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_MIN_JITTER: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Exponential backoff schedule with additive random jitter.
///
/// The delay for attempt `n` (zero based) is `min(initial * multiplier^n, max_delay)` plus a
/// uniformly random jitter in `[min_jitter, max_jitter]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub min_jitter: Duration,
    pub max_jitter: Duration,
    /// The attempt counter wraps back to zero once it reaches this value.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            min_jitter: DEFAULT_MIN_JITTER,
            max_jitter: DEFAULT_MAX_JITTER,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, min_jitter: Duration, max_jitter: Duration) -> Self {
        self.min_jitter = min_jitter;
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before jitter for the given zero-based attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// A random jitter in `[min_jitter, max_jitter]`.
    #[must_use]
    pub fn sample_jitter(&self) -> Duration {
        if self.max_jitter <= self.min_jitter {
            return self.min_jitter;
        }
        rand::rng().random_range(self.min_jitter..=self.max_jitter)
    }

    /// Full delay (base plus jitter) for the given zero-based attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + self.sample_jitter()
    }
}

/// Attempt counter over a [`BackoffPolicy`].
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of consecutive failures since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget past failures, typically after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay to wait before the next attempt; advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt >= self.policy.max_attempts {
            warn!(
                max_attempts = self.policy.max_attempts,
                "Reached maximum reconnect attempts, restarting backoff schedule"
            );
            self.attempt = 0;
        }
        delay
    }

    /// Sleep for the next delay unless `cancel` fires first.
    ///
    /// Returns `false` if cancelled, in which case the caller must stop retrying.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        debug!(delay_ms = delay.as_millis(), attempt = self.attempt, "Backing off");
        tokio::select! {
            () = cancel.cancelled() => false,
            () = sleep(delay) => true,
        }
    }
}
