use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::BackendError;

/// Errors that can tell whether trying again might help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        BackendError::is_retryable(self)
    }
}

/// How persistently a backend operation is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` retries until success.
    pub max_attempts: Option<u32>,
    /// Wait before the first retry; doubled on each further retry.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to half the delay at random so parallel workers spread out.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry forever, back to back.
    pub fn immediate() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay.max(initial_delay);
        self
    }

    /// Base wait after the `failures`-th failed attempt, before jitter.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn delay_after(&self, failures: u32) -> Duration {
        let base = self.backoff(failures);
        let half_ms = (base.as_millis() / 2) as u64;
        if !self.jitter || half_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::random::<u64>() % (half_ms + 1))
    }

    fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("permanent failure: {0}")]
    Permanent(E),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled")]
    Cancelled,
}

/// Runs `operation` until it succeeds.
///
/// `on_failure` sees every failure that is about to be retried, together with
/// the number of the attempt that failed. Non-retryable errors end the loop
/// at once, as does `cancel`, which also aborts an attempt in flight.
pub async fn execute_until_success<T, E, Op, Fut, Obs>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: Op,
    mut on_failure: Obs,
) -> Result<T, RetryError<E>>
where
    E: Retryable,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Obs: FnMut(&E, u32),
{
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() {
            return Err(RetryError::Permanent(err));
        }
        if !policy.allows(attempts) {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }
        on_failure(&err, attempts);

        let delay = policy.delay_after(attempts);
        if delay.is_zero() {
            // Keep a hot retry loop from starving the canceller.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
