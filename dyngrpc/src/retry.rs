//! # Retry Policy
//!
//! Exponential-backoff retry for failed calls. A [`RetryPolicy`] names the
//! status codes worth retrying and bounds the attempt count and backoff
//! growth; [`execute`] runs an operation under a policy.
//!
//! Only errors that classify to a retryable status code are retried.
//! Anything else (non-retryable codes, local errors with no status) is
//! returned to the caller immediately.

use std::future::Future;
use std::time::Duration;
use tonic::Code;

/// Bounds and classification for retrying failed calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff.
    pub max_backoff: Duration,
    /// Growth factor applied to the backoff after each retry.
    pub multiplier: f64,
    /// Status codes that warrant another attempt.
    pub retryable_codes: Vec<Code>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            multiplier: 1.6,
            retryable_codes: vec![
                Code::Unavailable,
                Code::DeadlineExceeded,
                Code::ResourceExhausted,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, code: Code) -> bool {
        self.retryable_codes.contains(&code)
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier;
        // from_secs_f64 panics on negative or NaN input.
        if !grown.is_finite() || grown < 0.0 {
            return current.min(self.max_backoff);
        }
        Duration::from_secs_f64(grown.min(self.max_backoff.as_secs_f64()))
    }
}

/// Runs `operation` under `policy`, sleeping between attempts.
///
/// `classify` extracts a status code from an error; returning `None` marks
/// the error as non-retryable. The final attempt's result is returned as-is,
/// whether it succeeded or not.
pub async fn execute<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Option<Code>,
{
    let mut backoff = policy.initial_backoff;
    for attempt in 1..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(code) = classify(&err) else {
                    return Err(err);
                };
                if !policy.is_retryable(code) {
                    return Err(err);
                }
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    code = ?code,
                    backoff_ms = backoff.as_millis() as u64,
                    "call failed with a retryable status, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = policy.next_backoff(backoff);
            }
        }
    }
    operation().await
}
