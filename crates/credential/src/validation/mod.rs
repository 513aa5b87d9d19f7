//! Username, password and credential-pair validation.
//!
//! Policy violations are reported as data in [`ValidationResult`], never as
//! errors; only an inconsistent policy (bad pattern, inverted bounds) makes
//! [`CredentialValidator::new`] fail.

mod password;
mod similarity;
mod strength;
mod username;

use credguard_error::{CredentialError, CredentialResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::ProjectCredentials;

pub use password::{DEFAULT_FORBIDDEN_PATTERNS, HASH_COST_RANGE, PasswordPolicy};
pub use similarity::{levenshtein, similarity, too_similar};
pub use strength::{shannon_entropy, strength_score};
pub use username::{DEFAULT_RESERVED_KEYWORDS, DEFAULT_RESERVED_NAMES, UsernamePolicy};

/// Outcome of a single-field check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// No errors were recorded
    pub is_valid: bool,
    /// Violated rules
    pub errors: Vec<String>,
    /// Non-fatal advice
    pub warnings: Vec<String>,
    /// Strength score, set for passwords only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

impl ValidationResult {
    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.score = self.score.or(other.score);
        self.finish()
    }
}

/// Outcome of [`CredentialValidator::validate_project_credentials`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedValidationResult {
    /// Every field check passed and no cross-field error was recorded
    pub is_valid: bool,
    /// Username check, when a username was present
    pub user_validation: Option<ValidationResult>,
    /// Password or hash check, when either was present
    pub password_validation: Option<ValidationResult>,
    /// Completeness and similarity failures
    pub overall_errors: Vec<String>,
}

impl DetailedValidationResult {
    /// Every error from every section, in report order
    #[must_use]
    pub fn all_errors(&self) -> Vec<String> {
        let user = self.user_validation.iter().flat_map(|r| r.errors.iter());
        let password = self.password_validation.iter().flat_map(|r| r.errors.iter());
        self.overall_errors
            .iter()
            .chain(user)
            .chain(password)
            .cloned()
            .collect()
    }
}

/// Cross-field checks for a credential pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectValidationOptions {
    /// Both fields must be present
    pub require_complete: bool,
    /// Reject usernames and passwords that resemble each other
    pub check_similarity: bool,
    /// Similarity above this is rejected
    pub similarity_threshold: f64,
}

impl Default for ProjectValidationOptions {
    fn default() -> Self {
        Self {
            require_complete: true,
            check_similarity: true,
            similarity_threshold: 0.8,
        }
    }
}

/// Applies a [`UsernamePolicy`] and a [`PasswordPolicy`]
#[derive(Debug, Clone)]
pub struct CredentialValidator {
    username: UsernamePolicy,
    password: PasswordPolicy,
    username_pattern: Regex,
    hash_pattern: Regex,
}

impl CredentialValidator {
    /// Compile both policies, failing on an inconsistent one
    pub fn new(username: UsernamePolicy, password: PasswordPolicy) -> CredentialResult<Self> {
        password.validate()?;
        let username_pattern = username.compile()?;
        let hash_pattern = Regex::new(password::BCRYPT_HASH_PATTERN).map_err(|e| {
            CredentialError::configuration(format!("invalid hash pattern: {e}"))
        })?;
        Ok(Self {
            username,
            password,
            username_pattern,
            hash_pattern,
        })
    }

    /// Validator with the default policies
    pub fn with_defaults() -> CredentialResult<Self> {
        Self::new(UsernamePolicy::default(), PasswordPolicy::default())
    }

    /// The username policy in force
    #[must_use]
    pub fn username_policy(&self) -> &UsernamePolicy {
        &self.username
    }

    /// The password policy in force
    #[must_use]
    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password
    }

    /// Check a database role name
    #[must_use]
    pub fn validate_username(&self, username: &str) -> ValidationResult {
        username::check_username(username, &self.username, &self.username_pattern)
    }

    /// Check a plaintext password and compute its strength score
    #[must_use]
    pub fn validate_password(&self, password: &str) -> ValidationResult {
        password::check_password(password, &self.password)
    }

    /// Check stored password material is an adaptive hash
    #[must_use]
    pub fn validate_password_hash(&self, hash: &str) -> ValidationResult {
        password::check_password_hash(hash, &self.hash_pattern)
    }

    /// Validate a username/hash pair.
    ///
    /// `plaintext` is the password the hash was derived from, when the
    /// caller still has it (at generation time). With it the full password
    /// policy and the similarity check run; without it only the hash format
    /// is checked.
    #[must_use]
    pub fn validate_project_credentials(
        &self,
        credentials: &ProjectCredentials,
        plaintext: Option<&str>,
        options: &ProjectValidationOptions,
    ) -> DetailedValidationResult {
        let mut overall_errors = Vec::new();

        let user_validation = credentials.user().map(|u| self.validate_username(u));

        let hash_validation = credentials
            .password_hash()
            .map(|h| self.validate_password_hash(h));
        let password_validation = match (plaintext, hash_validation) {
            (Some(plain), Some(hash)) => Some(self.validate_password(plain).merge(hash)),
            (Some(plain), None) => Some(self.validate_password(plain)),
            (None, hash) => hash,
        };

        if options.require_complete {
            if credentials.user().is_none() {
                overall_errors.push("Database username is missing".to_string());
            }
            if credentials.password_hash().is_none() {
                overall_errors.push("Database password hash is missing".to_string());
            }
        }

        if options.check_similarity {
            if let (Some(user), Some(plain)) = (credentials.user(), plaintext) {
                if too_similar(user, plain, options.similarity_threshold) {
                    overall_errors
                        .push("Username and password are too similar".to_string());
                }
            }
        }

        let is_valid = overall_errors.is_empty()
            && user_validation.as_ref().is_none_or(|r| r.is_valid)
            && password_validation.as_ref().is_none_or(|r| r.is_valid);

        debug!(
            is_valid,
            overall_errors = overall_errors.len(),
            "validated project credentials"
        );

        DetailedValidationResult {
            is_valid,
            user_validation,
            password_validation,
            overall_errors,
        }
    }
}
