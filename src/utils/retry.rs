use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Retry with Exponential Backoff
// ============================================================================
//
// Used for idempotent reads only (reference data, history). Registration and
// replacement are never retried automatically: the user decides.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        scaled.min(self.max_delay)
    }
}

#[derive(Debug, PartialEq)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed with a transient error
    Failed(E),
    /// Retrying would not help
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(err) | RetryResult::PermanentFailure(err) => Err(err),
        }
    }
}

/// Whether an error may go away on its own
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            tracing::debug!(error = %error, "Permanent failure, not retrying");
            return RetryResult::PermanentFailure(error);
        }
        if attempt >= config.max_attempts {
            tracing::error!(attempt, error = %error, "Operation failed after all retries");
            return RetryResult::Failed(error);
        }

        tracing::warn!(
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying after delay"
        );
        sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
