//! Configuration for the core services.
//!
//! Services are constructed explicitly with a store handle, collaborator
//! handles, and a [`CoreConfig`]; lifecycle is owned by the composition
//! root, never by first-use side effects.

use crate::retry::RetryConfig;

/// Configuration shared by the workflow services.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Retry behavior for transactions that hit concurrency conflicts.
    pub retry: RetryConfig,
}

impl CoreConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
