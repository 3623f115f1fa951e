//! Retry logic with exponential backoff and jitter.
//!
//! Used around artifact downloads and around pushes of registry entries. The delay before the
//! retry with index `n` (starting at zero) lies in `[2^n * base, 2^n * base * (1 + jitter)]`.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Optional cap applied after the exponential growth.
    pub max_delay: Option<Duration>,
    /// Exponential base (2.0 for doubling).
    pub exponential_base: f64,
    /// Maximum extra fraction of the delay added at random.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(10),
            max_delay: None,
            exponential_base: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Calculate the delay before the retry with the given index (0-indexed).
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let multiplier = self.exponential_base.powi(retry as i32);
        let mut delay_secs = self.base_delay.as_secs_f64() * multiplier;

        if self.jitter > 0.0 {
            let jitter_factor = rand::rng().random_range(0.0..=self.jitter);
            delay_secs += delay_secs * jitter_factor;
        }

        if let Some(max_delay) = self.max_delay {
            delay_secs = delay_secs.min(max_delay.as_secs_f64());
        }

        Duration::from_secs_f64(delay_secs)
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Information handed to the retry hook before sleeping.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub delay: Duration,
    pub reason: String,
}

/// Run `operation` until it succeeds, fails with an error `should_retry` rejects, or the policy
/// runs out of attempts.
///
/// `on_retry` runs once per failed attempt that is followed by another attempt.
pub fn retry<T, E, F, P, H>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
    mut on_retry: H,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut(u32) -> Result<T, E>,
    P: Fn(&E) -> bool,
    H: FnMut(&RetryEvent),
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation(attempt) {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "operation succeeded after retrying");
                }
                return (Ok(value), stats);
            }
            Err(err) => err,
        };

        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("error is not retryable: {err}");
            return (Err(err), stats);
        }

        if attempt + 1 >= max_attempts {
            warn!("all {max_attempts} attempts exhausted, last error: {err}");
            return (Err(err), stats);
        }

        let delay = policy.calculate_delay(attempt);
        stats.total_delay += delay;

        warn!(
            "attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        on_retry(&RetryEvent {
            attempt: attempt + 1,
            delay,
            reason: err.to_string(),
        });

        std::thread::sleep(delay);
        attempt += 1;
    }
}
