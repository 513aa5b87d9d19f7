//! Per-service fallbacks and health tracking

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use credguard_error::{CredentialError, CredentialResult};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Secondary implementation invoked when the primary fails
pub type Fallback<T> = Arc<dyn Fn() -> BoxFuture<'static, CredentialResult<T>> + Send + Sync>;

/// Wrap an async closure as a [`Fallback`]
pub fn fallback_fn<T, F, Fut>(f: F) -> Fallback<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CredentialResult<T>> + Send + 'static,
{
    Arc::new(move || -> BoxFuture<'static, CredentialResult<T>> { Box::pin(f()) })
}

/// Registry of fallbacks keyed by service name, plus last-known health.
///
/// Fallbacks are stored type-erased; a lookup whose result type does not
/// match the registered one behaves as if nothing was registered.
#[derive(Default)]
pub struct GracefulDegradationManager {
    fallbacks: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    health: RwLock<HashMap<String, bool>>,
}

impl fmt::Debug for GracefulDegradationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GracefulDegradationManager")
            .field("fallbacks", &self.fallbacks.read().len())
            .field("health", &*self.health.read())
            .finish()
    }
}

impl GracefulDegradationManager {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fallback for `service`
    pub fn register_fallback<T>(&self, service: impl Into<String>, fallback: Fallback<T>)
    where
        T: Send + 'static,
    {
        let service = service.into();
        debug!(service = %service, "registering fallback");
        self.fallbacks.write().insert(service, Arc::new(fallback));
    }

    fn fallback_for<T: Send + 'static>(&self, service: &str) -> Option<Fallback<T>> {
        let erased = self.fallbacks.read().get(service).cloned()?;
        erased.downcast_ref::<Fallback<T>>().cloned()
    }

    /// Whether a fallback is registered for `service`
    #[must_use]
    pub fn has_fallback(&self, service: &str) -> bool {
        self.fallbacks.read().contains_key(service)
    }

    /// Last observed health; unknown services are healthy
    #[must_use]
    pub fn is_service_healthy(&self, service: &str) -> bool {
        self.health.read().get(service).copied().unwrap_or(true)
    }

    /// Snapshot of every service seen so far
    #[must_use]
    pub fn health_snapshot(&self) -> HashMap<String, bool> {
        self.health.read().clone()
    }

    fn mark(&self, service: &str, healthy: bool) {
        let previous = self.health.write().insert(service.to_string(), healthy);
        if previous != Some(healthy) {
            if healthy {
                info!(service, "service healthy");
            } else {
                warn!(service, "service marked unhealthy");
            }
        }
    }

    /// Run `primary`; on failure fall back to the service's registered
    /// fallback. Fails with [`ErrorKind::FallbackFailed`](credguard_error::ErrorKind)
    /// carrying both causes when no fallback succeeds.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        service: &str,
        primary: F,
        label: &str,
    ) -> CredentialResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CredentialResult<T>>,
    {
        let primary_err = match primary().await {
            Ok(value) => {
                self.mark(service, true);
                return Ok(value);
            }
            Err(err) => err,
        };

        self.mark(service, false);

        let Some(fallback) = self.fallback_for::<T>(service) else {
            warn!(service, operation = label, error = %primary_err, "no fallback registered");
            return Err(CredentialError::fallback_failed(service, &primary_err, None));
        };

        warn!(service, operation = label, error = %primary_err, "primary failed, using fallback");
        match fallback().await {
            Ok(value) => Ok(value),
            Err(fallback_err) => {
                warn!(service, operation = label, error = %fallback_err, "fallback failed");
                Err(CredentialError::fallback_failed(
                    service,
                    &primary_err,
                    Some(&fallback_err),
                ))
            }
        }
    }

    /// Forget health records; registered fallbacks stay
    pub fn reset_health(&self) {
        self.health.write().clear();
    }

    /// Forget everything
    pub fn clear(&self) {
        self.fallbacks.write().clear();
        self.health.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credguard_error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn primary_success_marks_healthy() {
        let manager = GracefulDegradationManager::new();
        let value = manager
            .execute_with_fallback("store", || async { Ok(1) }, "read")
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert!(manager.is_service_healthy("store"));
    }

    #[tokio::test]
    async fn fallback_value_returned_while_unhealthy() {
        let manager = GracefulDegradationManager::new();
        manager.register_fallback("store", fallback_fn(|| async { Ok(vec!["cached"]) }));

        let value = manager
            .execute_with_fallback::<Vec<&'static str>, _, _>(
                "store",
                || async { Err(CredentialError::network("down")) },
                "read",
            )
            .await
            .unwrap();

        assert_eq!(value, vec!["cached"]);
        assert!(!manager.is_service_healthy("store"));
    }

    #[tokio::test]
    async fn missing_fallback_reports_primary_cause() {
        let manager = GracefulDegradationManager::new();
        let err = manager
            .execute_with_fallback::<(), _, _>(
                "store",
                || async { Err(CredentialError::database("relation missing")) },
                "read",
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FallbackFailed);
        assert!(err.message().contains("relation missing"));
        assert!(err.message().contains("no fallback registered"));
    }

    #[tokio::test]
    async fn failing_fallback_carries_both_causes() {
        let manager = GracefulDegradationManager::new();
        manager.register_fallback::<u8>(
            "store",
            fallback_fn(|| async { Err(CredentialError::unknown("cache cold")) }),
        );

        let err = manager
            .execute_with_fallback::<u8, _, _>(
                "store",
                || async { Err(CredentialError::timeout("find_all", std::time::Duration::from_secs(1))) },
                "read",
            )
            .await
            .unwrap_err();

        assert!(err.message().contains("timed out"));
        assert!(err.message().contains("cache cold"));
    }

    #[tokio::test]
    async fn mismatched_fallback_type_is_ignored() {
        let manager = GracefulDegradationManager::new();
        manager.register_fallback("store", fallback_fn(|| async { Ok(String::from("x")) }));

        let err = manager
            .execute_with_fallback::<u32, _, _>(
                "store",
                || async { Err(CredentialError::network("down")) },
                "read",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FallbackFailed);
    }

    #[test]
    fn unknown_service_is_healthy() {
        assert!(GracefulDegradationManager::new().is_service_healthy("anything"));
    }
}
