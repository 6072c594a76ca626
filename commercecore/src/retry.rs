//! Retry logic for operations that abort on concurrency conflicts.
//!
//! A transaction that loses an optimistic race was not applied, so it is
//! safe to run again against fresh state. [`execute_with_retry`] wraps an
//! operation in that loop; delays follow exponential backoff with jitter to
//! avoid thundering-herd retries among concurrent writers.

use crate::errors::CoreResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior on concurrency conflicts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between retry attempts.
    pub base_delay: Duration,
    /// Maximum delay between retry attempts (for exponential backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Configuration for high-throughput scenarios where fast failure is
    /// preferred over persistence.
    pub const fn fast() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
        }
    }

    /// Configuration for fault-tolerant scenarios where eventual success is
    /// preferred over fast failure.
    pub const fn fault_tolerant() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.5,
        }
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculates the delay before the given retry attempt (1-based).
    ///
    /// Exponential backoff capped at `max_delay`, with ±25% jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_delay_ms = self.base_delay.as_millis() as f64;
        let max_delay_ms = self.max_delay.as_millis() as f64;

        let delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let delay = delay.min(max_delay_ms);

        let mut rng = rand::rng();
        let jitter = delay * 0.25 * (rng.random::<f64>() - 0.5) * 2.0;
        let final_delay = (delay + jitter).max(0.0).min(max_delay_ms) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Runs an operation, retrying on retryable errors per the configuration.
///
/// The operation is a closure producing a fresh future per attempt - each
/// attempt must re-read state inside its own transaction. Non-retryable
/// errors and exhausted attempts surface unchanged.
pub async fn execute_with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts.max(1) => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation hit a concurrency conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoreError;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_values_are_reasonable() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn presets_trade_attempts_for_latency() {
        let fast = RetryConfig::fast();
        assert_eq!(fast.max_attempts, 2);
        let tolerant = RetryConfig::fault_tolerant();
        assert_eq!(tolerant.max_attempts, 10);
        assert!(tolerant.base_delay > fast.base_delay);
    }

    #[tokio::test]
    async fn retries_concurrency_conflicts_until_success() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&config, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::ConcurrencyConflict { keys: vec![] })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_the_conflict() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);

        let result: CoreResult<()> = execute_with_retry(&config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::ConcurrencyConflict { keys: vec![] })
        })
        .await;

        assert!(matches!(
            result,
            Err(CoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);

        let result: CoreResult<()> = execute_with_retry(&config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Internal("bug".to_string()))
        })
        .await;

        assert!(matches!(result, Err(CoreError::Internal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn retry_delay_respects_bounds(attempt in 0u32..10) {
            let config = RetryConfig {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 2.0,
                ..RetryConfig::default()
            };

            let delay = config.delay_for_attempt(attempt);

            // Never exceeds max_delay plus jitter tolerance.
            prop_assert!(delay <= Duration::from_secs(7));
        }
    }
}
