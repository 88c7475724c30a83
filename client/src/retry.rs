//! Bounded retry with capped exponential backoff.
//!
//! The delay before retry `n` (counting from zero) is
//! `min(base_delay * 2^n, max_delay)` plus a uniform jitter in
//! `[0, max_jitter]`. An operation is attempted at most `max_retries + 1`
//! times, and only errors that classify as retryable are tried again.

use std::future::Future;
use std::time::Duration;

use backon::BackoffBuilder;
use backon::Retryable;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FetchError;

/// Decides whether a failed attempt may be tried again.
pub trait RetryClassifiable {
    fn is_retryable(&self) -> bool;
}

impl RetryClassifiable for FetchError {
    fn is_retryable(&self) -> bool {
        FetchError::is_retryable(self)
    }
}

/// Retry limits for one request chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the exponential part of the delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the random addend, in milliseconds.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_max_jitter_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    /// Delay schedule for this configuration.
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff {
            base_delay: self.base_delay(),
            max_delay: self.max_delay(),
            max_jitter: self.max_jitter(),
            max_retries: self.max_retries,
            attempt: 0,
        }
    }
}

impl BackoffBuilder for RetryConfig {
    type Backoff = RetryBackoff;

    fn build(self) -> Self::Backoff {
        self.backoff()
    }
}

/// Exponential part of the delay before retry `attempt`, without jitter.
///
/// Saturates instead of overflowing, so any attempt number is safe.
pub fn backoff_delay(base_delay: Duration, max_delay: Duration, attempt: u32) -> Duration {
    base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(max_delay)
}

/// Iterator over the delays between attempts. Yields `max_retries` items.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
    max_retries: u32,
    attempt: u32,
}

impl RetryBackoff {
    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::rng().random_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

impl Iterator for RetryBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let delay = backoff_delay(self.base_delay, self.max_delay, self.attempt) + self.jitter();
        self.attempt += 1;
        Some(delay)
    }
}

/// Run `operation`, retrying retryable failures according to `config`.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once the retry budget is spent.
pub async fn with_retry<T, E, F, Fut>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassifiable + std::fmt::Display,
{
    operation
        .retry(config.clone())
        .sleep(tokio::time::sleep)
        .when(E::is_retryable)
        .notify(|err: &E, delay: Duration| {
            tracing::warn!(?delay, "transient failure, retrying: {err}");
        })
        .await
}
