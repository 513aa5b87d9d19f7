//! Best-effort classification of untyped error messages
//!
//! Typed errors from the layers below should be preferred. This exists for
//! the boundary with third-party code that only hands back a message.

use crate::kind::ErrorKind;

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "etimedout", "deadline exceeded"];

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "econnrefused",
    "econnreset",
    "enotfound",
    "connection refused",
    "connection reset",
    "fetch failed",
    "socket hang up",
    "dns",
    "unreachable",
];

const CONFIGURATION_MARKERS: &[&str] = &[
    "configuration",
    "config",
    "environment variable",
    "not configured",
];

const DATABASE_MARKERS: &[&str] = &[
    "database",
    "sql",
    "relation",
    "duplicate key",
    "deadlock",
    "constraint",
    "transaction",
];

const VALIDATION_MARKERS: &[&str] = &["validation", "invalid", "required", "must "];

/// Pick an [`ErrorKind`] by scanning `message` for well-known keywords.
///
/// Order matters: "connection timeout" is a timeout, not a network error.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(TIMEOUT_MARKERS) {
        ErrorKind::Timeout
    } else if has(NETWORK_MARKERS) {
        ErrorKind::Network
    } else if has(CONFIGURATION_MARKERS) {
        ErrorKind::Configuration
    } else if has(DATABASE_MARKERS) {
        ErrorKind::Database
    } else if has(VALIDATION_MARKERS) {
        ErrorKind::Validation
    } else {
        ErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Request timeout after 30s", ErrorKind::Timeout)]
    #[case("connection timed out", ErrorKind::Timeout)]
    #[case("connect ECONNREFUSED 127.0.0.1:5432", ErrorKind::Network)]
    #[case("Network is unreachable", ErrorKind::Network)]
    #[case("Missing environment variable POSTGRES_HOST", ErrorKind::Configuration)]
    #[case("duplicate key value violates unique constraint", ErrorKind::Database)]
    #[case("Invalid project reference", ErrorKind::Validation)]
    #[case("something odd happened", ErrorKind::Unknown)]
    fn classifies_by_keyword(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(classify_message(message), expected);
    }

    #[test]
    fn timeout_wins_over_network() {
        assert_eq!(
            classify_message("network connection timeout"),
            ErrorKind::Timeout
        );
    }
}
