//! Bounded retry with exponential backoff for calls to external providers.
//!
//! Only failures classified by [`GatewayError::is_retryable`] are retried
//! (network errors, 408, 429, 5xx). Everything else is returned on the first
//! attempt so the caller's fatal/best-effort handling sees it unchanged.
//! Calls that create records at the provider go through [`retry_unsent`],
//! which only repeats requests the provider never received.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Randomization factor, 0.2 = ±20%.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoff {
    retries_done: u32,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries_done: 0,
            max_retries: policy.max_attempts.saturating_sub(1),
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next retry, or `None` once the retries are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_done >= self.max_retries {
            return None;
        }

        let multiplier = self.backoff_multiplier.powi(self.retries_done as i32);
        let base_ms =
            ((self.initial_backoff_ms as f64 * multiplier) as u64).min(self.max_backoff_ms);
        let delay_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);

        self.retries_done += 1;
        Some(Duration::from_millis(delay_ms))
    }

    /// Number of the attempt that follows the last returned delay (1-based).
    pub fn attempt(&self) -> u32 {
        self.retries_done + 1
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if backoff_ms == 0 || self.jitter_factor <= 0.0 {
            return backoff_ms;
        }
        let range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - range).max(0.0);
        let max = backoff_ms as f64 + range;
        rand::thread_rng().gen_range(min..=max) as u64
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry_when(policy, operation, GatewayError::is_retryable, op).await
}

/// Like [`retry`], but only repeats `op` when the previous attempt never
/// reached the provider. A timeout or 5xx may hide a record that was already
/// created, so those are returned to the caller.
pub async fn retry_unsent<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry_when(policy, operation, GatewayError::is_unsent, op).await
}

async fn retry_when<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    should_retry: fn(&GatewayError) -> bool,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut backoff = ExponentialBackoff::new(policy);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) => match backoff.next_backoff() {
                Some(delay) => {
                    tracing::warn!(
                        operation,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        attempt = backoff.attempt(),
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(operation, error = %err, "Retries exhausted");
                    return Err(err);
                }
            },
            Err(err) => return Err(err),
        }
    }
}
