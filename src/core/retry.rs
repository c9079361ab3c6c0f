//! Retry logic with linear backoff
//!
//! This module provides the bounded retry used for the workflow steps that
//! may be repeated. Retries never sleep past an absolute deadline and stop
//! as soon as the cancellation token fires.

use crate::core::error::{PublishError, PublishStep, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Options for retry behavior
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay added per failed attempt: attempt `n` is followed by `n * backoff_step`
    pub backoff_step: Duration,
}

impl RetryOptions {
    /// A single retry without delay
    pub fn once() -> Self {
        Self {
            max_attempts: 2,
            backoff_step: Duration::ZERO,
        }
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

/// Retry manager for executing operations with linear backoff
///
/// # Examples
///
/// ```no_run
/// use rustore_publisher::core::{PublishError, PublishStep, RetryManager, RetryOptions};
/// use tokio::time::Instant;
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), PublishError> {
/// let manager = RetryManager::new(RetryOptions::default());
/// let deadline = Instant::now() + Duration::from_secs(60);
///
/// let id = manager
///     .retry(PublishStep::CreateDraft, deadline, &CancellationToken::new(), PublishError::is_retryable, |_attempt| async {
///         Ok::<_, PublishError>(42)
///     })
///     .await?;
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

    /// Delay to wait after the given failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.options.backoff_step * attempt
    }

    /// Execute `operation` until it succeeds, fails with an error
    /// `is_retryable` rejects, runs out of attempts, or the next backoff
    /// would end past `deadline`
    ///
    /// The operation receives the 1-based attempt number. An attempt still
    /// running at `deadline` is abandoned with [`PublishError::Timeout`].
    pub async fn retry<F, Fut, T, P>(
        &self,
        step: PublishStep,
        deadline: Instant,
        cancel: &CancellationToken,
        is_retryable: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&PublishError) -> bool,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                result = timeout_at(deadline, operation(attempt)) => result,
            };

            let result = result.map_err(|_| PublishError::Timeout {
                step,
                elapsed: started.elapsed(),
            })?;

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_retryable(&error) || attempt >= max_attempts {
                return Err(error);
            }

            let delay = self.delay_after(attempt);
            if Instant::now() + delay >= deadline {
                warn!(
                    attempt,
                    "Not retrying after {}: time budget exhausted", error
                );
                return Err(error);
            }

            warn!(
                attempt,
                max_attempts,
                "Attempt failed: {}; retrying in {:?}",
                error,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}
