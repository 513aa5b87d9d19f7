//! Random credential generation

use std::sync::Arc;

use credguard_error::{CredentialError, CredentialResult};
use bcrypt::BcryptError;
use rand::Rng;
use rand::seq::SliceRandom;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::model::ProjectCredentials;
use crate::validation::{CredentialValidator, HASH_COST_RANGE, ProjectValidationOptions};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Characters that are easy to misread for one another
pub const SIMILAR_CHARS: &[char] = &['0', 'O', '1', 'l', 'I'];

/// bcrypt reads at most 72 bytes including the terminating NUL. Every pool
/// is ASCII, so characters and bytes coincide.
pub const MAX_PASSWORD_LENGTH: usize = 71;

/// Fresh passwords drawn before giving up on one that passes the plaintext
/// policy
const MAX_GENERATION_ATTEMPTS: usize = 5;

/// Shape of a generated password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordOptions {
    /// Exact length in characters
    pub length: usize,
    /// Add the punctuation pool and require one of its characters
    pub include_special_chars: bool,
    /// Drop `0 O 1 l I` from every pool
    pub exclude_similar_chars: bool,
    /// Require at least one `A-Z`
    pub require_uppercase: bool,
    /// Require at least one `a-z`
    pub require_lowercase: bool,
    /// Require at least one `0-9`
    pub require_digits: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            length: 32,
            include_special_chars: true,
            exclude_similar_chars: true,
            require_uppercase: true,
            require_lowercase: true,
            require_digits: true,
        }
    }
}

impl PasswordOptions {
    fn required_classes(&self) -> usize {
        [
            self.require_lowercase,
            self.require_uppercase,
            self.require_digits,
            self.include_special_chars,
        ]
        .into_iter()
        .filter(|&b| b)
        .count()
    }

    /// Check the length can hold one character of every required class
    pub fn validate(&self) -> CredentialResult<()> {
        if self.length == 0 || self.length > MAX_PASSWORD_LENGTH {
            return Err(CredentialError::configuration(format!(
                "password length must be within 1..={MAX_PASSWORD_LENGTH}, got {}",
                self.length
            )));
        }
        let required = self.required_classes();
        if self.length < required {
            return Err(CredentialError::configuration(format!(
                "password length {} cannot hold {required} required character classes",
                self.length
            )));
        }
        Ok(())
    }
}

/// Naming, password and hashing parameters for project credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Prepended to the sanitised project ref
    pub username_prefix: String,
    /// Appended to the sanitised project ref
    pub username_suffix: String,
    /// Password shape
    pub password: PasswordOptions,
    /// bcrypt cost factor
    pub hash_cost: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            username_prefix: "proj_".to_string(),
            username_suffix: "_user".to_string(),
            password: PasswordOptions::default(),
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl GenerationOptions {
    /// Validate the password shape and hash cost
    pub fn validate(&self) -> CredentialResult<()> {
        self.password.validate()?;
        if !HASH_COST_RANGE.contains(&self.hash_cost) {
            return Err(CredentialError::configuration(format!(
                "hash cost {} is outside {}..={}",
                self.hash_cost,
                HASH_COST_RANGE.start(),
                HASH_COST_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Credentials ready to store, plus the plaintext needed to provision the
/// database role. The plaintext is redacted from `Debug` output.
#[derive(Debug)]
pub struct GeneratedCredentials {
    /// Username and bcrypt hash
    pub credentials: ProjectCredentials,
    /// Plaintext password
    pub password: SecretString,
}

/// Lowercase `value` and replace every non-alphanumeric character with `_`
#[must_use]
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn pool(chars: &str, exclude_similar: bool) -> Vec<char> {
    chars
        .chars()
        .filter(|c| !exclude_similar || !SIMILAR_CHARS.contains(c))
        .collect()
}

/// Draw a password from the thread-local CSPRNG.
///
/// One character is drawn from each required pool, the rest uniformly from
/// the union of all pools, and the result is shuffled.
pub fn generate_secure_password(options: &PasswordOptions) -> CredentialResult<SecretString> {
    options.validate()?;

    let exclude = options.exclude_similar_chars;
    let lowercase = pool(LOWERCASE, exclude);
    let uppercase = pool(UPPERCASE, exclude);
    let digits = pool(DIGITS, exclude);
    let special = pool(SPECIAL, exclude);

    let mut charset: Vec<char> = Vec::new();
    charset.extend(&lowercase);
    charset.extend(&uppercase);
    charset.extend(&digits);
    if options.include_special_chars {
        charset.extend(&special);
    }

    let required = [
        (options.require_lowercase, &lowercase),
        (options.require_uppercase, &uppercase),
        (options.require_digits, &digits),
        (options.include_special_chars, &special),
    ];

    let mut rng = rand::rng();
    let mut chars: Zeroizing<Vec<char>> = Zeroizing::new(Vec::with_capacity(options.length));

    for (wanted, pool) in required {
        if wanted {
            chars.push(pool[rng.random_range(0..pool.len())]);
        }
    }
    while chars.len() < options.length {
        chars.push(charset[rng.random_range(0..charset.len())]);
    }
    chars.shuffle(&mut rng);

    let password: String = chars.iter().collect();
    Ok(SecretString::from(password))
}

/// Builds usernames and passwords for projects and fences them through a
/// [`CredentialValidator`]
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    validator: Arc<CredentialValidator>,
    defaults: GenerationOptions,
    validation: ProjectValidationOptions,
}

impl CredentialGenerator {
    /// Generator using `defaults` for [`generate_project_credentials`](Self::generate_project_credentials)
    pub fn new(
        validator: Arc<CredentialValidator>,
        defaults: GenerationOptions,
    ) -> CredentialResult<Self> {
        defaults.validate()?;
        Ok(Self {
            validator,
            defaults,
            validation: ProjectValidationOptions::default(),
        })
    }

    /// Replace the cross-field checks run on generated pairs
    #[must_use]
    pub fn with_validation_options(mut self, options: ProjectValidationOptions) -> Self {
        self.validation = options;
        self
    }

    /// Default generation options
    #[must_use]
    pub fn options(&self) -> &GenerationOptions {
        &self.defaults
    }

    /// The validator generated credentials must pass
    #[must_use]
    pub fn validator(&self) -> &Arc<CredentialValidator> {
        &self.validator
    }

    /// `prefix + sanitize(project_ref) + suffix`
    #[must_use]
    pub fn generate_username(&self, project_ref: &str, options: &GenerationOptions) -> String {
        format!(
            "{}{}{}",
            options.username_prefix,
            sanitize(project_ref),
            options.username_suffix
        )
    }

    /// [`generate_secure_password`] with `options`
    pub fn generate_secure_password(
        &self,
        options: &PasswordOptions,
    ) -> CredentialResult<SecretString> {
        generate_secure_password(options)
    }

    /// Generate with the default options
    pub async fn generate_project_credentials(
        &self,
        project_ref: &str,
    ) -> CredentialResult<GeneratedCredentials> {
        self.generate_project_credentials_with(project_ref, &self.defaults)
            .await
    }

    /// Generate a username and hashed password for `project_ref`.
    ///
    /// The pair is re-validated before it is returned; a failure is a
    /// non-retryable validation error listing every violated rule.
    #[tracing::instrument(skip(self, options))]
    pub async fn generate_project_credentials_with(
        &self,
        project_ref: &str,
        options: &GenerationOptions,
    ) -> CredentialResult<GeneratedCredentials> {
        if project_ref.trim().is_empty() {
            return Err(CredentialError::validation("Project reference is required"));
        }
        options.validate()?;

        let user = self.generate_username(project_ref, options);
        let password = self.draw_password(&options.password)?;

        let hash = hash_password(&password, options.hash_cost).await?;
        let credentials = ProjectCredentials::complete(user, hash);

        let report = self.validator.validate_project_credentials(
            &credentials,
            Some(password.expose_secret()),
            &self.validation,
        );
        if !report.is_valid {
            let errors = report.all_errors();
            return Err(CredentialError::validation(format!(
                "Generated credentials for '{project_ref}' failed validation: {}",
                errors.join("; ")
            ))
            .with_context("project_ref", project_ref)
            .with_context("errors", errors));
        }

        debug!(user = credentials.user(), "generated project credentials");
        Ok(GeneratedCredentials {
            credentials,
            password,
        })
    }

    /// Draw until the plaintext policy passes, keeping the last draw
    /// otherwise so the final fence reports the violations.
    fn draw_password(&self, options: &PasswordOptions) -> CredentialResult<SecretString> {
        let mut password = generate_secure_password(options)?;
        for attempt in 1..MAX_GENERATION_ATTEMPTS {
            if self
                .validator
                .validate_password(password.expose_secret())
                .is_valid
            {
                break;
            }
            debug!(attempt, "generated password rejected by policy, drawing again");
            password = generate_secure_password(options)?;
        }
        Ok(password)
    }
}

async fn hash_password(password: &SecretString, cost: u32) -> CredentialResult<String> {
    let plaintext = Zeroizing::new(password.expose_secret().to_owned());
    tokio::task::spawn_blocking(move || bcrypt::non_truncating_hash(plaintext.as_bytes(), cost))
        .await
        .map_err(|e| {
            warn!(error = %e, "hashing task did not complete");
            CredentialError::unknown(format!("password hashing task failed: {e}")).with_source(e)
        })?
        .map_err(|e| match e {
            BcryptError::Truncation(_) => CredentialError::configuration(format!(
                "password exceeds the bcrypt limit of {MAX_PASSWORD_LENGTH} bytes"
            ))
            .with_source(e),
            e => CredentialError::unknown(format!("password hashing failed: {e}")).with_source(e),
        })
}
