//! # credguard-resilience
//!
//! Failure-handling primitives used around every call credguard makes to an
//! external collaborator:
//!
//! - [`RetryManager`]: bounded retries gated by a retryability predicate
//! - [`CircuitBreaker`]: CLOSED / OPEN / HALF_OPEN breaker per dependency
//! - [`GracefulDegradationManager`]: per-service fallbacks and health
//! - [`CredentialErrorHandler`]: composes the three per call
//!
//! ```rust
//! use credguard_resilience::{CredentialErrorHandler, ErrorHandlingOptions, HandlerConfig};
//!
//! # async fn demo() -> credguard_error::CredentialResult<()> {
//! let handler = CredentialErrorHandler::new(HandlerConfig::default())?;
//! let projects = handler
//!     .execute_with_error_handling(
//!         || async { Ok(vec!["alpha", "beta"]) },
//!         ErrorHandlingOptions::for_service("project-store").label("find_all"),
//!     )
//!     .await?;
//! assert_eq!(projects.len(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod circuit_breaker;
mod degradation;
mod handler;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState};
pub use degradation::{Fallback, GracefulDegradationManager, fallback_fn};
pub use handler::{CredentialErrorHandler, ErrorHandlingOptions, HandlerConfig, HandlerStatus};
pub use retry::{RetryCondition, RetryConfig, RetryManager};
