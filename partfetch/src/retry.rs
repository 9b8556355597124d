//! Retry policies and the retry executor.
//!
//! Three layers of the engine retry independently, all through
//! [`retry_with_policy`]:
//!
//! ```text
//! whole run     RetryPolicy::Forever   (fixed delay, unbounded)
//!   probe       RetryPolicy::Fixed     (1 + 5 attempts)
//!   segment     RetryPolicy::Fixed     (5 attempts per wave)
//! ```
//!
//! Between attempts the executor sleeps the policy delay and then waits for
//! network connectivity, so an offline machine does not burn attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::download::{DownloadError, DownloadResult};
use crate::transport::{wait_for_connection, Connectivity};

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    #[default]
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier applied to delay after each failure.
        multiplier: f64,
    },

    /// Retry until success or cancellation, with a constant delay.
    Forever {
        /// Delay between attempts.
        delay: Duration,
    },
}

impl RetryPolicy {
    /// Creates an exponential backoff policy with default delays.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a fixed retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    /// * `delay` - Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Creates an unbounded retry policy.
    pub fn forever(delay: Duration) -> Self {
        Self::Forever { delay }
    }

    /// Calculates the delay before the attempt following `attempt`.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that just failed (1-based)
    ///
    /// # Returns
    ///
    /// The delay to wait, or `None` if no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt < *max_attempts {
                    let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                    let delay_ms = initial_delay.as_millis() as f64 * factor;
                    let capped = delay_ms.min(max_delay.as_millis() as f64) as u64;
                    Some(Duration::from_millis(capped))
                } else {
                    None
                }
            }
            Self::Forever { delay } => Some(*delay),
        }
    }

    /// Returns the maximum number of attempts, or `None` when unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::None => Some(1),
            Self::Fixed { max_attempts, .. } => Some(*max_attempts),
            Self::ExponentialBackoff { max_attempts, .. } => Some(*max_attempts),
            Self::Forever { .. } => None,
        }
    }
}

/// Where the retry executor waits for the network between attempts.
#[derive(Clone, Copy)]
pub struct RetryContext<'a> {
    /// Connectivity check run after each back-off delay.
    pub connectivity: &'a dyn Connectivity,
    /// Poll interval while the network is down.
    pub poll_interval: Duration,
    /// Stops the executor between attempts.
    pub cancel: &'a CancellationToken,
}

/// Run `op` until it succeeds or `policy` gives up.
///
/// `op` receives the 1-based attempt number. Non-retryable errors (see
/// [`DownloadError::is_retryable`]) are returned immediately. Cancellation
/// during a delay or a connectivity wait returns
/// [`DownloadError::Cancelled`].
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: RetryContext<'_>,
    label: &str,
    mut op: F,
) -> DownloadResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DownloadResult<T>>,
{
    let mut attempt = 1;
    loop {
        if ctx.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        let Some(delay) = policy.delay_for_attempt(attempt) else {
            debug!(label, attempt, error = %err, "retries exhausted");
            return Err(err);
        };

        warn!(
            label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        if !wait_for_connection(ctx.connectivity, ctx.poll_interval, ctx.cancel).await {
            return Err(DownloadError::Cancelled);
        }

        attempt += 1;
    }
}
