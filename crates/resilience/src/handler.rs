//! Policy-driven composition of retry, circuit breaking and degradation

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;

use credguard_error::CredentialResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus};
use crate::degradation::{Fallback, GracefulDegradationManager};
use crate::retry::{RetryConfig, RetryManager};

/// Defaults applied when a call does not override them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Retry policy
    pub retry: RetryConfig,
    /// Breaker settings used for every service
    pub circuit_breaker: CircuitBreakerConfig,
}

impl HandlerConfig {
    /// Validate both policies
    pub fn validate(&self) -> CredentialResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Per-call policy selection
pub struct ErrorHandlingOptions<T> {
    /// Wrap in the retry layer
    pub enable_retry: bool,
    /// Wrap in the service's circuit breaker
    pub enable_circuit_breaker: bool,
    /// Fall back once retries are exhausted
    pub enable_graceful_degradation: bool,
    /// Overrides the handler's retry policy
    pub retry: Option<RetryConfig>,
    /// Key for the breaker, health record and fallback
    pub service_name: String,
    /// Operation name used in logs
    pub label: String,
    /// Registered for `service_name` before the call
    pub fallback: Option<Fallback<T>>,
}

impl<T> Default for ErrorHandlingOptions<T> {
    fn default() -> Self {
        Self {
            enable_retry: true,
            enable_circuit_breaker: true,
            enable_graceful_degradation: false,
            retry: None,
            service_name: "default".to_string(),
            label: "operation".to_string(),
            fallback: None,
        }
    }
}

impl<T> fmt::Debug for ErrorHandlingOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlingOptions")
            .field("enable_retry", &self.enable_retry)
            .field("enable_circuit_breaker", &self.enable_circuit_breaker)
            .field("enable_graceful_degradation", &self.enable_graceful_degradation)
            .field("retry", &self.retry)
            .field("service_name", &self.service_name)
            .field("label", &self.label)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<T> ErrorHandlingOptions<T> {
    /// Retry and circuit breaker on, degradation off
    #[must_use]
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Every layer off
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            enable_retry: false,
            enable_circuit_breaker: false,
            ..Self::default()
        }
    }

    /// Operation name for logs
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Toggle the retry layer
    #[must_use]
    pub fn retry(mut self, enabled: bool) -> Self {
        self.enable_retry = enabled;
        self
    }

    /// Toggle the circuit breaker layer
    #[must_use]
    pub fn circuit_breaker(mut self, enabled: bool) -> Self {
        self.enable_circuit_breaker = enabled;
        self
    }

    /// Toggle graceful degradation
    #[must_use]
    pub fn graceful_degradation(mut self, enabled: bool) -> Self {
        self.enable_graceful_degradation = enabled;
        self
    }

    /// Use `config` instead of the handler default
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Enable degradation with `fallback`
    #[must_use]
    pub fn with_fallback(mut self, fallback: Fallback<T>) -> Self {
        self.enable_graceful_degradation = true;
        self.fallback = Some(fallback);
        self
    }
}

/// Snapshot returned by [`CredentialErrorHandler::get_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerStatus {
    /// One entry per service that has used a breaker
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    /// Last observed health per service
    pub service_health: BTreeMap<String, bool>,
}

/// Entry point composing the resilience primitives.
///
/// Layering is fixed, innermost first:
///
/// 1. circuit breaker around the raw call
/// 2. retry around the guarded call (an open circuit is not retryable, so a
///    rejection ends the retry loop without using an attempt)
/// 3. graceful degradation around the retry loop, so the fallback only runs
///    once retries are exhausted
pub struct CredentialErrorHandler {
    config: HandlerConfig,
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    degradation: GracefulDegradationManager,
}

impl fmt::Debug for CredentialErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialErrorHandler")
            .field("config", &self.config)
            .field("breakers", &self.breakers.read().len())
            .field("degradation", &self.degradation)
            .finish()
    }
}

impl CredentialErrorHandler {
    /// Create a handler after validating `config`
    pub fn new(config: HandlerConfig) -> CredentialResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            breakers: RwLock::new(HashMap::new()),
            degradation: GracefulDegradationManager::new(),
        })
    }

    /// Handler defaults
    #[must_use]
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// The degradation registry, for registering long-lived fallbacks
    #[must_use]
    pub fn degradation(&self) -> &GracefulDegradationManager {
        &self.degradation
    }

    /// Breaker for `service`, created on first use
    pub fn circuit_breaker(&self, service: &str) -> CredentialResult<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(service) {
            return Ok(breaker.clone());
        }

        let mut breakers = self.breakers.write();
        if let Some(breaker) = breakers.get(service) {
            return Ok(breaker.clone());
        }
        let breaker = CircuitBreaker::new(service, self.config.circuit_breaker.clone())?;
        breakers.insert(service.to_string(), breaker.clone());
        Ok(breaker)
    }

    /// Run `operation` under the layers selected in `options`.
    ///
    /// With every layer disabled the operation runs once and its error is
    /// returned as is.
    #[tracing::instrument(
        name = "execute_with_error_handling",
        skip_all,
        fields(service = %options.service_name, operation = %options.label)
    )]
    pub async fn execute_with_error_handling<T, F, Fut>(
        &self,
        operation: F,
        options: ErrorHandlingOptions<T>,
    ) -> CredentialResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = CredentialResult<T>>,
    {
        let ErrorHandlingOptions {
            enable_retry,
            enable_circuit_breaker,
            enable_graceful_degradation,
            retry,
            service_name,
            label,
            fallback,
        } = options;

        debug!(
            retry = enable_retry,
            circuit_breaker = enable_circuit_breaker,
            degradation = enable_graceful_degradation,
            "executing with error handling"
        );

        let breaker = if enable_circuit_breaker {
            Some(self.circuit_breaker(&service_name)?)
        } else {
            None
        };
        let retry = enable_retry
            .then(|| RetryManager::new(retry.unwrap_or_else(|| self.config.retry.clone())));
        if let Some(fallback) = fallback {
            self.degradation.register_fallback(service_name.clone(), fallback);
        }

        let op = &operation;
        let breaker = breaker.as_ref();
        let label = label.as_str();

        let guarded = move || async move {
            match breaker {
                Some(cb) => cb.execute(op, label).await,
                None => op().await,
            }
        };

        let retried = async {
            match &retry {
                Some(manager) => manager.execute(&guarded, label).await,
                None => guarded().await,
            }
        };

        if enable_graceful_degradation {
            self.degradation
                .execute_with_fallback(&service_name, || retried, label)
                .await
        } else {
            retried.await
        }
    }

    /// Whether `service` succeeded on its last degradation-guarded call
    #[must_use]
    pub fn is_service_healthy(&self, service: &str) -> bool {
        self.degradation.is_service_healthy(service)
    }

    /// Per-service breaker and health snapshot
    #[must_use]
    pub fn get_status(&self) -> HandlerStatus {
        let circuit_breakers = self
            .breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.status()))
            .collect();
        let service_health = self.degradation.health_snapshot().into_iter().collect();

        HandlerStatus {
            circuit_breakers,
            service_health,
        }
    }

    /// Drop every breaker; calls already in flight keep the instance they
    /// started with, new calls get a fresh closed breaker.
    pub fn reset_circuit_breakers(&self) {
        self.breakers.write().clear();
        debug!("circuit breakers reset");
    }

    /// Reset breakers and health records
    pub fn reset(&self) {
        self.reset_circuit_breakers();
        self.degradation.reset_health();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::degradation::fallback_fn;
    use credguard_error::{CredentialError, ErrorKind};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn handler(threshold: u32) -> CredentialErrorHandler {
        CredentialErrorHandler::new(HandlerConfig {
            retry: RetryConfig::default().with_base_delay(Duration::from_millis(1)),
            circuit_breaker: CircuitBreakerConfig::with_threshold(threshold),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn passthrough_runs_once_and_propagates() {
        let handler = handler(5);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = handler
            .execute_with_error_handling(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CredentialError::network("down"))
                },
                ErrorHandlingOptions::passthrough(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handler.get_status().circuit_breakers.is_empty());
    }

    #[tokio::test]
    async fn retry_recovers_transient_failure() {
        let handler = handler(5);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = handler
            .execute_with_error_handling(
                move || async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CredentialError::timeout("find_all", Duration::from_millis(5)))
                    } else {
                        Ok("projects")
                    }
                },
                ErrorHandlingOptions::for_service("store"),
            )
            .await
            .unwrap();

        assert_eq!(value, "projects");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            handler.get_status().circuit_breakers["store"].state,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn open_breaker_stops_retry_early() {
        let handler = handler(2);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = handler
            .execute_with_error_handling(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CredentialError::network("down"))
                },
                ErrorHandlingOptions::for_service("store").with_retry_config(
                    RetryConfig::default()
                        .with_max_attempts(5)
                        .with_base_delay(Duration::from_millis(1)),
                ),
            )
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            handler.get_status().circuit_breakers["store"].state,
            CircuitState::Open
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_ends_permissive_retry_without_backoff() {
        let handler = handler(1);
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();

        let err = handler
            .execute_with_error_handling(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CredentialError::network("down"))
                },
                ErrorHandlingOptions::for_service("store").with_retry_config(
                    RetryConfig::default()
                        .with_max_attempts(5)
                        .with_base_delay(Duration::from_secs(1))
                        .with_retry_condition(|_| true),
                ),
            )
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // one backoff after the real failure, none after the rejection
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn fallback_runs_after_retries_exhausted() {
        let handler = handler(10);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = handler
            .execute_with_error_handling(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CredentialError::network("down"))
                },
                ErrorHandlingOptions::for_service("store")
                    .with_fallback(fallback_fn(|| async { Ok(Vec::<String>::new()) })),
            )
            .await
            .unwrap();

        assert!(value.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!handler.is_service_healthy("store"));
        assert!(!handler.get_status().service_health["store"]);
    }

    #[tokio::test]
    async fn reset_gives_fresh_breakers() {
        let handler = handler(1);
        let _ = handler
            .execute_with_error_handling(
                || async { Err::<(), _>(CredentialError::network("down")) },
                ErrorHandlingOptions::for_service("store").retry(false),
            )
            .await;
        assert_eq!(
            handler.circuit_breaker("store").unwrap().state(),
            CircuitState::Open
        );

        handler.reset();
        assert!(handler.get_status().circuit_breakers.is_empty());
        assert_eq!(
            handler.circuit_breaker("store").unwrap().state(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn in_flight_call_keeps_breaker_across_reset() {
        let handler = handler(1);
        let before = handler.circuit_breaker("store").unwrap();
        let handler_ref = &handler;

        let err = handler
            .execute_with_error_handling(
                move || async move {
                    handler_ref.reset_circuit_breakers();
                    Err::<(), _>(CredentialError::network("down"))
                },
                ErrorHandlingOptions::for_service("store").retry(false),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(before.state(), CircuitState::Open);
        assert!(handler.get_status().circuit_breakers.is_empty());

        let fresh = handler.circuit_breaker("store").unwrap();
        assert_eq!(fresh.state(), CircuitState::Closed);
        assert_eq!(fresh.status().failure_count, 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let err = CredentialErrorHandler::new(HandlerConfig {
            retry: RetryConfig::default().with_max_attempts(0),
            ..HandlerConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
