//! Retry policy with exponential backoff and full jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info_span, warn, Instrument};

use vchat_media::command::wait_for_cancel;

use crate::error::{VlmError, VlmResult};
use crate::metrics::record_retry;

/// Explicit retry policy applied to every model query.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Randomize each delay in `[0, backoff]`
    pub jitter: bool,
    /// Which errors are worth another attempt
    pub retryable: fn(&VlmError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            jitter: true,
            retryable: VlmError::is_retryable,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("VLM_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            base_delay: std::env::var("VLM_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: std::env::var("VLM_RETRY_MAX_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            ..defaults
        }
    }

    /// Upper bound of the delay after the given (zero-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delay to sleep after the given failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.backoff(attempt);
        if !self.jitter || capped.is_zero() {
            return capped;
        }
        let millis = capped.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// A retryable failure on the last attempt becomes
    /// [`VlmError::Unavailable`] carrying that failure. Cancellation is
    /// observed while an attempt is in flight and while sleeping.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &watch::Receiver<bool>,
        mut op: F,
    ) -> VlmResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = VlmResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut cancel = cancel.clone();

        for attempt in 0..max_attempts {
            if *cancel.borrow() {
                return Err(VlmError::Cancelled);
            }

            let span = info_span!("vlm_attempt", operation = %operation, attempt = attempt + 1);
            let result = tokio::select! {
                result = op(attempt).instrument(span) => result,
                _ = wait_for_cancel(&mut cancel) => return Err(VlmError::Cancelled),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.retryable)(&err) {
                return Err(err);
            }

            if attempt + 1 >= max_attempts {
                return Err(VlmError::Unavailable {
                    attempts: max_attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.delay(attempt);
            warn!(
                operation = %operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "VLM request failed, retrying: {}",
                err
            );
            record_retry();

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_cancel(&mut cancel) => return Err(VlmError::Cancelled),
            }
        }

        Err(VlmError::Unavailable {
            attempts: max_attempts,
            last: Box::new(VlmError::Connection("no attempt was made".to_string())),
        })
    }
}
