//! Password policy and stored-hash checks

use credguard_error::{CredentialError, CredentialResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ValidationResult;
use super::strength::{self, CharClasses};

/// Substrings that disqualify a password
pub const DEFAULT_FORBIDDEN_PATTERNS: &[&str] = &[
    "password", "passwd", "123456", "qwerty", "abc123", "letmein", "welcome", "admin",
    "monkey", "dragon", "master", "iloveyou", "postgres", "supabase",
];

/// Matches `$2a$`, `$2b$` and `$2y$` hashes: two-digit cost, 53 chars of
/// salt and digest
pub(crate) const BCRYPT_HASH_PATTERN: &str = r"^\$2[aby]\$(\d{2})\$[./A-Za-z0-9]{53}$";

/// Lowest and highest bcrypt cost accepted
pub const HASH_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Rules a plaintext password must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Maximum length in characters
    pub max_length: usize,
    /// At least one `A-Z`
    pub require_uppercase: bool,
    /// At least one `a-z`
    pub require_lowercase: bool,
    /// At least one `0-9`
    pub require_digits: bool,
    /// At least one non-alphanumeric character
    pub require_special: bool,
    /// Rejected substrings, compared case-insensitively
    pub forbidden_patterns: Vec<String>,
    /// Lowest acceptable strength score
    pub min_score: u8,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digits: true,
            require_special: true,
            forbidden_patterns: DEFAULT_FORBIDDEN_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_score: 60,
        }
    }
}

impl PasswordPolicy {
    /// Check the policy is self-consistent
    pub fn validate(&self) -> CredentialResult<()> {
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(CredentialError::configuration(format!(
                "password length bounds {}..={} are invalid",
                self.min_length, self.max_length
            )));
        }
        if self.min_score > 100 {
            return Err(CredentialError::configuration(
                "password min_score must be within 0..=100",
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_password(password: &str, policy: &PasswordPolicy) -> ValidationResult {
    let mut result = ValidationResult::default();

    if password.is_empty() {
        result.error("Password is required");
        return result.finish();
    }

    let len = password.chars().count();
    if len < policy.min_length {
        result.error(format!(
            "Password must be at least {} characters long",
            policy.min_length
        ));
    }
    if len > policy.max_length {
        result.error(format!(
            "Password must be at most {} characters long",
            policy.max_length
        ));
    }

    let classes = CharClasses::of(password);
    if policy.require_uppercase && !classes.uppercase {
        result.error("Password must contain at least one uppercase letter");
    }
    if policy.require_lowercase && !classes.lowercase {
        result.error("Password must contain at least one lowercase letter");
    }
    if policy.require_digits && !classes.digit {
        result.error("Password must contain at least one number");
    }
    if policy.require_special && !classes.special {
        result.error("Password must contain at least one special character");
    }

    let lower = password.to_lowercase();
    for pattern in &policy.forbidden_patterns {
        if !pattern.is_empty() && lower.contains(&pattern.to_lowercase()) {
            result.error(format!("Password contains a forbidden pattern: '{pattern}'"));
        }
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        result.error("Password cannot consist of numbers only");
    }

    if strength::repeated_runs(password) > 0 {
        result.warning("Password contains three or more repeated characters");
    }
    if password.chars().all(char::is_alphabetic) {
        result.warning("Password consists of letters only");
    }
    if strength::has_repeated_substring(password) {
        result.warning("Password contains a repeated pattern");
    }

    let score = strength::strength_score(password, policy.min_length);
    if score < policy.min_score {
        result.error(format!(
            "Password strength score {score} is below the required {}",
            policy.min_score
        ));
    }
    result.score = Some(score);

    result.finish()
}

pub(crate) fn check_password_hash(hash: &str, pattern: &Regex) -> ValidationResult {
    let mut result = ValidationResult::default();

    if hash.trim().is_empty() {
        result.error("Password hash is required");
        return result.finish();
    }

    if !hash.starts_with('$') {
        result.error("Password appears to be stored in plaintext; an adaptive hash is required");
        return result.finish();
    }

    match pattern.captures(hash) {
        Some(caps) => {
            let cost = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            if !HASH_COST_RANGE.contains(&cost) {
                result.error(format!(
                    "Password hash cost {cost} is outside {}..={}",
                    HASH_COST_RANGE.start(),
                    HASH_COST_RANGE.end()
                ));
            } else if cost < 10 {
                result.warning(format!("Password hash cost {cost} is low for production"));
            }
        }
        None => {
            result.error("Password hash is not a supported bcrypt hash ($2a$, $2b$ or $2y$)");
        }
    }

    result.finish()
}
