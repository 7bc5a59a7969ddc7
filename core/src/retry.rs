//! Retry with exponential backoff
//!
//! Wraps idempotent calls (chapter and book reads). The delay before retry
//! `k` (0-indexed) is `base_delay * multiplier^k`; with the defaults that is
//! 1s, 2s, 4s and then the last error is surfaced.
//!
//! Authorization failures are never retried. Streaming suggest/revise calls
//! must not go through here: a partially consumed generation stream cannot
//! be replayed.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that can tell the retry loop to stop immediately
pub trait Retryable {
    /// Credential rejected; retrying cannot help
    fn is_authorization_failure(&self) -> bool;
}

/// Why a retried call gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Authorization failure on some attempt; propagated without delay
    Unauthorized(E),
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The underlying error of the final attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Unauthorized(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Unauthorized(e) => write!(f, "{}", e),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "Gave up after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier,
        }
    }

    /// Delay before retry `retry` (0-indexed)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(retry))
    }

    /// Run `op` until it succeeds, fails with an authorization error, or
    /// runs out of attempts
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_authorization_failure() => {
                    return Err(RetryError::Unauthorized(err));
                }
                Err(err) if attempt >= self.max_retries => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
