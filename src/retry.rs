//! Retry with exponential backoff for backend calls.
//!
//! Only retryable classified errors (rate limits and transient failures) are retried.
//! A server-supplied delay replaces the computed backoff. Every wait races the caller's
//! cancellation token, and a cancelled wait never fires the retry.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::BackendError;
use crate::error::{GatewayError, Result};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Policy for retrying failed backend calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Ceiling for any single wait, including server-requested ones.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Fraction of the computed backoff added or removed at random.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Computed backoff before retry number `attempt` (0-based), without jitter.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff_ms = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(backoff_ms as u64)
    }

    /// Wait before retry number `attempt` after `err`.
    pub fn delay_for(&self, attempt: u32, err: &BackendError) -> Duration {
        if let Some(secs) = err.retry_after() {
            let ms = secs.saturating_mul(1000).min(self.max_backoff_ms);
            return Duration::from_millis(ms);
        }

        let base = self.calculate_backoff(attempt);
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let scale: f64 = rand::rng().random_range(-jitter..=jitter);
        let base_ms = base.as_millis() as f64;
        let jittered = (base_ms + base_ms * scale).clamp(0.0, self.max_backoff_ms as f64);
        Duration::from_millis(jittered as u64)
    }
}

fn retryable(err: &GatewayError) -> Option<&BackendError> {
    match err {
        GatewayError::Backend(backend) if backend.is_retryable() => Some(backend),
        _ => None,
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of retries, or
/// `cancel` fires. The operation receives the 0-based attempt number.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GatewayError::Cancelled),
            outcome = operation(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Backend call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let Some(backend) = retryable(&error) else {
            return Err(error);
        };
        if attempt >= policy.max_retries {
            warn!(
                attempt,
                max_retries = policy.max_retries,
                error = %backend,
                "Retries exhausted"
            );
            return Err(error);
        }

        let delay = policy.delay_for(attempt, backend);
        warn!(
            attempt,
            kind = backend.kind(),
            delay_ms = delay.as_millis() as u64,
            "Backend call failed, retrying after backoff"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(attempt, "Cancelled while waiting to retry");
                return Err(GatewayError::Cancelled);
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
