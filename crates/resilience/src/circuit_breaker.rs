//! Three-state circuit breaker
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────► Open
//!     ▲                               │  recovery_timeout since last failure
//!     │ success                       ▼
//!     └──────────────────────────── HalfOpen ──failure──► Open
//! ```
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! `.await`: the admission check and the result recording each take the lock
//! once, the operation itself runs unlocked.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use credguard_error::{CredentialError, CredentialResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// A trial call is allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cooldown measured from the last failure
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Config with the given threshold and default cooldown
    #[must_use]
    pub fn with_threshold(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            ..Self::default()
        }
    }

    /// Set the cooldown
    #[must_use]
    pub fn with_recovery_timeout(mut self, recovery_timeout: Duration) -> Self {
        self.recovery_timeout = recovery_timeout;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> CredentialResult<()> {
        if self.failure_threshold == 0 {
            return Err(CredentialError::configuration(
                "circuit breaker failure_threshold must be positive",
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(CredentialError::configuration(
                "circuit breaker recovery_timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStatus {
    /// Current state
    pub state: CircuitState,
    /// Failures counted since the last success or reset
    pub failure_count: u32,
    /// Wall-clock time of the last recorded failure
    pub last_failure: Option<SystemTime>,
    /// Remaining cooldown while open
    #[serde(with = "humantime_serde")]
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_wall: Option<SystemTime>,
}

impl Inner {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_wall: None,
        }
    }

    fn remaining_cooldown(&self, recovery_timeout: Duration) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed = self.last_failure.map_or(recovery_timeout, |at| at.elapsed());
        Some(recovery_timeout.saturating_sub(elapsed))
    }

    /// Move `Open` to `HalfOpen` once the cooldown has passed
    fn refresh(&mut self, recovery_timeout: Duration, service: &str) {
        if self.remaining_cooldown(recovery_timeout) == Some(Duration::ZERO) {
            info!(service, "circuit breaker transitioning from OPEN to HALF_OPEN");
            self.state = CircuitState::HalfOpen;
        }
    }
}

/// Circuit breaker guarding one named dependency
#[derive(Clone)]
pub struct CircuitBreaker {
    service: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("failure_threshold", &self.config.failure_threshold)
            .field("recovery_timeout", &self.config.recovery_timeout)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker for `service`
    pub fn new(service: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> CredentialResult<Self> {
        config.validate()?;
        Ok(Self {
            service: service.into(),
            config,
            inner: Arc::new(Mutex::new(Inner::closed())),
        })
    }

    /// Guarded service name
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// A rejection returns [`ErrorKind::CircuitOpen`](credguard_error::ErrorKind)
    /// without invoking `operation` and without touching the failure count.
    pub async fn execute<T, F, Fut>(&self, operation: F, label: &str) -> CredentialResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CredentialResult<T>>,
    {
        let admitted_in = {
            let mut inner = self.inner.lock();
            inner.refresh(self.config.recovery_timeout, &self.service);
            if inner.state == CircuitState::Open {
                let retry_after = inner.remaining_cooldown(self.config.recovery_timeout);
                drop(inner);
                debug!(service = %self.service, operation = label, "circuit open, rejecting call");
                return Err(CredentialError::circuit_open(self.service.as_ref(), retry_after));
            }
            inner.state
        };

        let result = operation().await;

        let mut inner = self.inner.lock();
        match &result {
            Ok(_) => {
                if inner.state != CircuitState::Closed || inner.failure_count > 0 {
                    info!(
                        service = %self.service,
                        operation = label,
                        from = %inner.state,
                        "circuit breaker closed after success"
                    );
                }
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
            Err(err) => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.last_failure = Some(Instant::now());
                inner.last_failure_wall = Some(SystemTime::now());

                let trips = admitted_in == CircuitState::HalfOpen
                    || inner.failure_count >= self.config.failure_threshold;
                if trips && inner.state != CircuitState::Open {
                    warn!(
                        service = %self.service,
                        operation = label,
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        error = %err,
                        "circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                } else {
                    debug!(
                        service = %self.service,
                        operation = label,
                        failure_count = inner.failure_count,
                        error = %err,
                        "circuit breaker recorded failure"
                    );
                }
            }
        }

        result
    }

    /// Current state, applying a pending `Open` to `HalfOpen` transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        inner.refresh(self.config.recovery_timeout, &self.service);
        inner.state
    }

    /// Snapshot for status reporting
    #[must_use]
    pub fn status(&self) -> CircuitBreakerStatus {
        let mut inner = self.inner.lock();
        inner.refresh(self.config.recovery_timeout, &self.service);
        CircuitBreakerStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure_wall,
            retry_after: inner.remaining_cooldown(self.config.recovery_timeout),
        }
    }

    /// Force the breaker back to `Closed` with a zero failure count
    pub fn reset(&self) {
        *self.inner.lock() = Inner::closed();
        info!(service = %self.service, "circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "store",
            CircuitBreakerConfig::with_threshold(threshold).with_recovery_timeout(cooldown),
        )
        .unwrap()
    }

    async fn fail(cb: &CircuitBreaker) -> CredentialError {
        cb.execute(
            || async { Err::<(), _>(CredentialError::network("down")) },
            "fail",
        )
        .await
        .unwrap_err()
    }

    #[tokio::test]
    async fn opens_after_threshold() {
        let cb = breaker(2, Duration::from_secs(60));

        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().failure_count, 2);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60));

        fail(&cb).await;
        fail(&cb).await;
        cb.execute(|| async { Ok::<_, CredentialError>(()) }, "ok")
            .await
            .unwrap();

        assert_eq!(cb.status().failure_count, 0);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let cb = breaker(1, Duration::from_secs(60));
        fail(&cb).await;

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = cb
            .execute(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CredentialError>(())
                },
                "trial",
            )
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert!(err.context_value("retry_after_ms").is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.status().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let cb = breaker(1, Duration::from_secs(30));
        fail(&cb).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.execute(|| async { Ok::<_, CredentialError>(1) }, "trial")
            .await
            .unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.status().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let cb = breaker(3, Duration::from_secs(30));
        for _ in 0..3 {
            fail(&cb).await;
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().retry_after, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn reset_closes_and_clears() {
        let cb = breaker(1, Duration::from_secs(60));
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.last_failure, None);
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = CircuitBreaker::new("x", CircuitBreakerConfig::with_threshold(0)).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }
}
