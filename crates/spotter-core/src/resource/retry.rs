use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FetchError;

use super::descriptor::ResourceDescriptor;

/// Maximum number of attempts per fetch, the first one included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base backoff delay. Attempt `n` that fails waits `n * base` before the next.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Runs a descriptor's transport with bounded retries and linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDriver {
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for RetryDriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

impl RetryDriver {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    /// Fetch and validate. Transport failures are retried, everything else
    /// is returned as is. Cancellation interrupts both the call and the
    /// backoff sleep.
    pub async fn fetch(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let key = descriptor.key();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Aborted);
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Aborted),
                outcome = descriptor.call() => outcome,
            };

            let err = match outcome {
                Ok(raw) => {
                    debug!(key = %key, attempt = attempt, "Transport call succeeded");
                    return raw.into_data().map_err(|reason| {
                        warn!(key = %key, reason = %reason, "Rejecting malformed response");
                        FetchError::InvalidResponse(reason)
                    });
                }
                Err(err) => err,
            };

            if attempt >= self.max_retries {
                warn!(key = %key, attempts = attempt, error = %err, "Retries exhausted");
                return Err(FetchError::MaxRetriesExceeded {
                    attempts: attempt,
                    last: err,
                });
            }

            let backoff = self.backoff_for(attempt);
            warn!(
                key = %key,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Fetch failed, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Aborted),
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }
}
