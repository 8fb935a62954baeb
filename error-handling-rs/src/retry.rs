//! # Retry Mechanism
//!
//! Retry with exponential backoff for transient failures. The delay before
//! attempt `n + 1` is `base_delay × 2^(n-1)`, capped at `max_delay`; no
//! jitter is applied so the schedule is deterministic.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{Error, Result};

/// Configuration for a retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// A named retry policy with a predicate deciding which errors are retried
#[derive(Clone)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
    retry_if: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl RetryPolicy {
    /// Creates a policy that retries transient errors
    pub fn new<S: Into<String>>(name: S, config: RetryConfig) -> Self {
        Self {
            name: name.into(),
            config,
            retry_if: Arc::new(|err: &Error| err.is_transient()),
        }
    }

    /// Replaces the retry predicate
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Checks if an error may be retried after `attempt` attempts
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.config.max_attempts && (self.retry_if)(error)
    }

    /// Builds the delay schedule for one retry loop
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.config.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Executes `operation` with retry behavior
    ///
    /// The closure receives the 1-based attempt number. The final error is
    /// returned with an `attempts` context entry.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            policy = %self.name,
                            operation = %operation_name,
                            attempt = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    counter!("retry_failed_attempts_total", 1, "policy" => self.name.clone());

                    if !self.should_retry(&err, attempt) {
                        if attempt > 1 {
                            warn!(
                                policy = %self.name,
                                operation = %operation_name,
                                attempts = attempt,
                                error = %err,
                                "Giving up after retries"
                            );
                        }
                        return Err(err.context("attempts", attempt));
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.config.max_delay);
                    warn!(
                        policy = %self.name,
                        operation = %operation_name,
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed with retryable error, backing off"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Runs `future` under an optional deadline; expiry becomes a transient timeout error
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, label: &str, future: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} timed out after {}ms",
                label,
                limit.as_millis()
            ))
            .context("timeout_ms", limit.as_millis() as u64)),
        },
        None => future.await,
    }
}
