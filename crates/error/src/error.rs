//! The [`CredentialError`] struct

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::classify::classify_message;
use crate::kind::{ErrorKind, Severity};

/// Shared, cloneable error source
pub type ErrorSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Error produced by every fallible credguard operation.
///
/// Immutable once built: the `with_*` methods consume the value and are
/// meant to be chained right after a constructor.
#[derive(Error, Debug, Clone, Serialize)]
pub struct CredentialError {
    kind: ErrorKind,
    severity: Severity,
    retryable: bool,
    message: String,
    context: BTreeMap<String, Value>,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    #[source]
    source: Option<ErrorSource>,
}

impl CredentialError {
    /// Create an error of `kind` with the kind's default severity and retryability
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            retryable: kind.default_retryable(),
            message: message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Policy violation or bad input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Transport failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Invalid engine configuration
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Project store / database failure
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// `operation` did not finish within `after`
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorKind::Timeout,
            format!("{operation} timed out after {after:?}"),
        )
        .with_context("operation", operation)
        .with_context("timeout_ms", after.as_millis() as u64)
    }

    /// Unclassified failure
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Rejection from an open circuit breaker
    pub fn circuit_open(service: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let service = service.into();
        let mut err = Self::new(
            ErrorKind::CircuitOpen,
            format!("Circuit breaker is OPEN for service '{service}'"),
        )
        .with_context("service", service);
        if let Some(after) = retry_after {
            err = err.with_context("retry_after_ms", after.as_millis() as u64);
        }
        err
    }

    /// Primary operation failed and the fallback failed too (or was missing)
    pub fn fallback_failed(
        service: impl Into<String>,
        primary: &Self,
        fallback: Option<&Self>,
    ) -> Self {
        let service = service.into();
        let fallback_message = fallback.map_or_else(
            || "no fallback registered".to_string(),
            |e| e.message.clone(),
        );
        Self::new(
            ErrorKind::FallbackFailed,
            format!(
                "Service '{service}' failed: {}; fallback failed: {fallback_message}",
                primary.message
            ),
        )
        .with_context("service", service)
        .with_context("primary_error", primary.message.clone())
        .with_context("primary_kind", primary.kind.code())
        .with_context("fallback_error", fallback_message)
        .with_source(primary.clone())
    }

    /// Build from a bare message, classifying it with keyword heuristics
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_message(&message), message)
    }

    /// Wrap an untyped error, classifying it by its message
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_message(err.to_string()).with_source(err)
    }

    /// Attach a context entry
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Override severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override retryability
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Error category
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable code of the category
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Severity
    #[inline]
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Human-readable message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// All context entries
    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Single context entry
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// When the error was created
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Shortcut for `kind() == ErrorKind::Validation`
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    /// Shortcut for `kind() == ErrorKind::CircuitOpen`
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.kind == ErrorKind::CircuitOpen
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

/// Result alias used across the workspace
pub type CredentialResult<T> = Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn factories_apply_kind_defaults() {
        let err = CredentialError::validation("bad username");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.severity(), Severity::Medium);
        assert!(!err.is_retryable());

        let err = CredentialError::network("reset by peer");
        assert_eq!(err.severity(), Severity::High);
        assert!(err.is_retryable());

        let err = CredentialError::configuration("missing key");
        assert!(!err.is_retryable());

        let err = CredentialError::database("deadlock detected");
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_records_operation_context() {
        let err = CredentialError::timeout("find_all", Duration::from_millis(250));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.context_value("operation"), Some(&Value::from("find_all")));
        assert_eq!(err.context_value("timeout_ms"), Some(&Value::from(250u64)));
    }

    #[test]
    fn from_error_keeps_source_and_classifies() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let err = CredentialError::from_error(io);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.source().unwrap().to_string(), "socket timeout");
        assert!(CredentialError::network("down").source().is_none());
    }

    #[test]
    fn fallback_failure_carries_both_causes() {
        let primary = CredentialError::network("store unreachable");
        let fallback = CredentialError::unknown("cache empty");
        let err = CredentialError::fallback_failed("project-store", &primary, Some(&fallback));

        assert_eq!(err.kind(), ErrorKind::FallbackFailed);
        assert!(err.message().contains("store unreachable"));
        assert!(err.message().contains("cache empty"));
        assert_eq!(
            err.context_value("primary_kind"),
            Some(&Value::from("NETWORK_ERROR"))
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        let err = CredentialError::circuit_open("project-store", Some(Duration::from_secs(5)));
        assert!(err.is_circuit_open());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Circuit breaker is OPEN"));
    }

    #[test]
    fn serializes_without_source() {
        let err = CredentialError::validation("nope").with_context("field", "user");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "VALIDATION");
        assert_eq!(json["context"]["field"], "user");
        assert!(json.get("source").is_none());
    }
}
