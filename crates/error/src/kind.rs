//! Error classification enums

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a [`CredentialError`](crate::CredentialError)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input or a security-policy violation
    Validation,
    /// Transport-level failure talking to a collaborator
    Network,
    /// A collaborator did not answer in time
    Timeout,
    /// Invalid or missing engine configuration
    Configuration,
    /// The project store or database reported a failure
    Database,
    /// A circuit breaker rejected the call without running it
    CircuitOpen,
    /// Primary and fallback operations both failed
    FallbackFailed,
    /// Anything the classifier could not place
    Unknown,
}

impl ErrorKind {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Database => "DATABASE_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN_ERROR",
            Self::FallbackFailed => "FALLBACK_FAILED_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Severity a freshly constructed error of this kind gets
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::Validation | Self::CircuitOpen | Self::Unknown => Severity::Medium,
            Self::Network
            | Self::Timeout
            | Self::Configuration
            | Self::Database
            | Self::FallbackFailed => Severity::High,
        }
    }

    /// Whether errors of this kind are transient by default
    #[must_use]
    pub const fn default_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Database)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How loudly an error should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational, the caller can usually ignore it
    Low,
    /// Expected failure such as a policy violation
    Medium,
    /// Infrastructure failure that needs attention
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}
