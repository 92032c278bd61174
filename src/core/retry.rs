//! Retry schedules and execution
//!
//! Every provider retry policy reduces to a provider-neutral
//! [`RetrySchedule`]. Broker clients run their network operations through a
//! [`RetryManager`] built from that schedule, so the translated policy is what
//! governs broker-level retries.

use crate::broker::{BrokerError, BrokerErrorKind};
use serde::Serializer;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Provider-neutral retry schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySchedule {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied to the delay after every retry
    pub backoff_multiplier: f64,
    /// Broker failures worth retrying
    pub retry_on: Vec<BrokerErrorKind>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_on: vec![
                BrokerErrorKind::Unavailable,
                BrokerErrorKind::Timeout,
                BrokerErrorKind::Throttled,
            ],
        }
    }
}

impl RetrySchedule {
    /// A schedule that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            retry_on: Vec::new(),
        }
    }

    /// Delay that follows `delay` under this schedule
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let nanos = (delay.as_nanos() as f64 * self.backoff_multiplier).round();
        if !nanos.is_finite() || nanos < 0.0 || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }
}

/// A policy that can be executed as a [`RetrySchedule`]
pub trait RetryPolicy {
    fn schedule(&self) -> RetrySchedule;
}

/// Executes broker operations under a retry schedule
///
/// # Examples
///
/// ```
/// use cloud_messaging::core::{RetryManager, RetrySchedule};
/// use cloud_messaging::broker::BrokerError;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = RetryManager::new(RetrySchedule::no_retry());
/// let result = manager.retry(|| async { Ok::<_, BrokerError>(42) }).await;
/// assert_eq!(result.unwrap(), 42);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    schedule: RetrySchedule,
}

impl RetryManager {
    pub fn new(schedule: RetrySchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    /// Execute the given async operation with retry logic
    pub async fn retry<F, Fut, T>(&self, mut operation: F) -> Result<T, BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let max_attempts = self.schedule.max_attempts.max(1);
        let mut delay = self.schedule.initial_delay.min(self.schedule.max_delay);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.is_retryable_error(&error) || attempt >= max_attempts {
                        return Err(error);
                    }

                    tracing::debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = ?error.kind,
                        "retrying broker operation"
                    );

                    sleep(delay).await;
                    delay = self.schedule.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Check if a broker failure should be retried under this schedule
    fn is_retryable_error(&self, error: &BrokerError) -> bool {
        self.schedule.retry_on.contains(&error.kind)
    }
}

/// Serialize a duration as integer milliseconds
pub(crate) fn serialize_millis<S: Serializer>(
    duration: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
