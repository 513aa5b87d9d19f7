//! Username policy

use credguard_error::{CredentialError, CredentialResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ValidationResult;

/// Role names the platform itself owns
pub const DEFAULT_RESERVED_NAMES: &[&str] = &[
    "postgres",
    "root",
    "admin",
    "administrator",
    "superuser",
    "supabase_admin",
    "supabase_auth_admin",
    "supabase_storage_admin",
    "supabase_replication_admin",
    "supabase_read_only_user",
    "authenticator",
    "anon",
    "authenticated",
    "service_role",
    "dashboard_user",
    "pgbouncer",
    "replicator",
];

/// SQL keywords that make confusing role names
pub const DEFAULT_RESERVED_KEYWORDS: &[&str] = &[
    "all", "alter", "and", "create", "database", "delete", "drop", "false", "from", "grant",
    "group", "index", "insert", "join", "not", "null", "or", "public", "revoke", "role",
    "schema", "select", "table", "true", "union", "update", "user", "view", "where",
];

/// Rules a database role name must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsernamePolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Maximum length (PostgreSQL truncates identifiers past 63 bytes)
    pub max_length: usize,
    /// Identifier pattern
    pub pattern: String,
    /// Rejected names, compared case-insensitively
    pub reserved_names: Vec<String>,
    /// Rejected SQL keywords, compared case-insensitively
    pub reserved_keywords: Vec<String>,
    /// Required prefix, if any
    pub required_prefix: Option<String>,
    /// Required suffix, if any
    pub required_suffix: Option<String>,
    /// Names shorter than this get a warning
    pub recommended_min_length: usize,
    /// Names with more underscore segments than this get a warning
    pub max_segments: usize,
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 63,
            pattern: r"^[a-zA-Z_][a-zA-Z0-9_]*$".to_string(),
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| (*s).to_string()).collect(),
            reserved_keywords: DEFAULT_RESERVED_KEYWORDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            required_prefix: None,
            required_suffix: None,
            recommended_min_length: 8,
            max_segments: 4,
        }
    }
}

impl UsernamePolicy {
    /// Check the policy is self-consistent and compile its pattern
    pub fn compile(&self) -> CredentialResult<Regex> {
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(CredentialError::configuration(format!(
                "username length bounds {}..={} are invalid",
                self.min_length, self.max_length
            )));
        }
        Regex::new(&self.pattern).map_err(|e| {
            CredentialError::configuration(format!("invalid username pattern: {e}"))
                .with_source(e)
        })
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

pub(crate) fn check_username(
    username: &str,
    policy: &UsernamePolicy,
    pattern: &Regex,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    if username.trim().is_empty() {
        result.error("Username is required");
        return result.finish();
    }

    let len = username.chars().count();
    if len < policy.min_length {
        result.error(format!(
            "Username must be at least {} characters long",
            policy.min_length
        ));
    }
    if len > policy.max_length {
        result.error(format!(
            "Username must be at most {} characters long",
            policy.max_length
        ));
    }

    if !pattern.is_match(username) {
        result.error(
            "Username must start with a letter or underscore and contain only letters, digits and underscores",
        );
    }

    if contains_ignore_case(&policy.reserved_names, username) {
        result.error(format!("Username '{username}' is reserved and cannot be used"));
    }
    if contains_ignore_case(&policy.reserved_keywords, username) {
        result.error(format!("Username '{username}' is a reserved SQL keyword"));
    }

    if let Some(prefix) = &policy.required_prefix {
        if !username.starts_with(prefix.as_str()) {
            result.error(format!("Username must start with '{prefix}'"));
        }
    }
    if let Some(suffix) = &policy.required_suffix {
        if !username.ends_with(suffix.as_str()) {
            result.error(format!("Username must end with '{suffix}'"));
        }
    }

    if len < policy.recommended_min_length {
        result.warning(format!(
            "Username is short; at least {} characters are recommended",
            policy.recommended_min_length
        ));
    }
    let segments = username.split('_').filter(|s| !s.is_empty()).count();
    if segments > policy.max_segments {
        result.warning(format!(
            "Username has {segments} underscore-separated segments; consider a simpler name"
        ));
    }

    result.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn check(username: &str) -> ValidationResult {
        let policy = UsernamePolicy::default();
        let pattern = policy.compile().unwrap();
        check_username(username, &policy, &pattern)
    }

    #[rstest]
    #[case("proj_alpha_user")]
    #[case("_internal_role")]
    #[case("Tenant42")]
    fn accepts_identifiers(#[case] username: &str) {
        let result = check(username);
        assert!(result.is_valid, "{username}: {:?}", result.errors);
    }

    #[rstest]
    #[case("", "required")]
    #[case("ab", "at least 3")]
    #[case("9lives", "must start with a letter")]
    #[case("has-dash", "must start with a letter")]
    #[case("postgres", "reserved")]
    #[case("Supabase_Admin", "reserved")]
    #[case("SELECT", "SQL keyword")]
    fn rejects(#[case] username: &str, #[case] needle: &str) {
        let result = check(username);
        assert!(!result.is_valid);
        assert!(
            result.errors.iter().any(|e| e.contains(needle)),
            "{username}: {:?}",
            result.errors
        );
    }

    #[test]
    fn rejects_overlong_names() {
        let result = check(&"a".repeat(64));
        assert!(result.errors.iter().any(|e| e.contains("at most 63")));
    }

    #[test]
    fn warns_without_failing() {
        let result = check("proj_a_b_c_user");
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("segments")));

        let result = check("abcd");
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("short")));
    }

    #[test]
    fn enforces_prefix_and_suffix() {
        let policy = UsernamePolicy {
            required_prefix: Some("proj_".into()),
            required_suffix: Some("_user".into()),
            ..UsernamePolicy::default()
        };
        let pattern = policy.compile().unwrap();
        let result = check_username("alpha_role", &policy, &pattern);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let policy = UsernamePolicy {
            pattern: "([".into(),
            ..UsernamePolicy::default()
        };
        assert_eq!(policy.compile().unwrap_err().code(), "CONFIGURATION_ERROR");
    }
}
