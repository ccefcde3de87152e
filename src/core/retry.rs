//! Retry logic with exponential backoff
//!
//! Only errors explicitly marked retriable (asset uploads) are retried.
//! A failure that keeps coming back with the same message is treated as
//! terminal even when marked retriable: an upload rejected for a duplicate
//! asset name fails identically every time and retrying it only wastes time.

use crate::core::error::PublishError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Options for retry behavior
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of attempts, first try included
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures with the same message
    pub max_identical_failures: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_identical_failures: 2,
        }
    }
}

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use release_publisher::core::{PublishError, RetryManager, RetryOptions};
///
/// # async fn example() -> Result<(), PublishError> {
/// let manager = RetryManager::new(RetryOptions::default());
///
/// let value = manager
///     .retry(|| async { Ok::<_, PublishError>(42) })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Execute the given async operation with retry logic
    pub async fn retry<F, Fut, T>(&self, mut operation: F) -> Result<T, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PublishError>>,
    {
        let mut delay = self.options.initial_delay;
        let mut last_message: Option<String> = None;
        let mut identical = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if !error.is_retriable() || attempt >= self.options.max_attempts {
                return Err(error);
            }

            let message = error.to_string();
            if last_message.as_deref() == Some(message.as_str()) {
                identical += 1;
            } else {
                identical = 1;
                last_message = Some(message);
            }
            if identical >= self.options.max_identical_failures.max(1) {
                warn!(attempt, error = %error, "same failure repeated, giving up");
                return Err(error);
            }

            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
            sleep(delay).await;

            delay = Duration::from_secs_f64(delay.as_secs_f64() * self.options.backoff_multiplier)
                .min(self.options.max_delay);
        }
    }
}
