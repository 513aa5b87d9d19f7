//! Bounded retry with a caller-supplied retryability predicate

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use credguard_error::{CredentialError, CredentialResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Decides whether a failed attempt may be retried
pub type RetryCondition = Arc<dyn Fn(&CredentialError) -> bool + Send + Sync>;

fn default_condition() -> RetryCondition {
    Arc::new(CredentialError::is_retryable)
}

/// Retry policy for one [`RetryManager`]
///
/// The delay before attempt `n + 1` is
/// `min(base_delay * backoff_multiplier^(n - 1), max_delay)`. With the
/// default multiplier of `1.0` every wait is exactly `base_delay`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Wait before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
    /// Upper bound for any single wait
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Defaults to [`CredentialError::is_retryable`]
    #[serde(skip, default = "default_condition")]
    pub retry_condition: RetryCondition,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            retry_condition: default_condition(),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    /// Set the attempt budget
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial delay
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Enable exponential backoff
    #[must_use]
    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_delay = max_delay;
        self
    }

    /// Replace the retryability predicate
    #[must_use]
    pub fn with_retry_condition<P>(mut self, condition: P) -> Self
    where
        P: Fn(&CredentialError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Arc::new(condition);
        self
    }

    /// Check the policy is usable
    pub fn validate(&self) -> CredentialResult<()> {
        if self.max_attempts == 0 {
            return Err(CredentialError::configuration(
                "retry max_attempts must be at least 1",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(CredentialError::configuration(format!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(CredentialError::configuration(format!(
                "retry max_delay ({:?}) must not be below base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Wait before retry number `retry` (1-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Runs an operation until it succeeds, the predicate refuses, or the
/// attempt budget is spent. Holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a manager for `config`
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Active policy
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation`, returning the first success or the last error
    /// unmodified.
    ///
    /// A circuit-open rejection is returned at once whatever the predicate
    /// says; it neither uses an attempt nor waits.
    pub async fn execute<T, F, Fut>(&self, mut operation: F, label: &str) -> CredentialResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CredentialResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(operation = label, attempt, max_attempts, "attempting");

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.is_circuit_open() {
                debug!(operation = label, attempt, "circuit open, not retrying");
                return Err(err);
            }

            if !(self.config.retry_condition)(&err) {
                debug!(operation = label, attempt, error = %err, "not retryable");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(operation = label, attempts = attempt, error = %err, "retries exhausted");
                return Err(err);
            }

            let delay = self.config.delay_for(attempt);
            warn!(
                operation = label,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
