//! Engine configuration

use std::str::FromStr;
use std::time::Duration;

use credguard_error::{CredentialError, CredentialResult};
use credguard_resilience::{CircuitBreakerConfig, HandlerConfig, RetryConfig};
use serde::{Deserialize, Serialize};

use crate::generator::GenerationOptions;
use crate::validation::{PasswordPolicy, ProjectValidationOptions, UsernamePolicy};

/// Service key the project store is guarded under
pub const PROJECT_STORE_SERVICE: &str = "project-store";

/// Migration-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Breaker, health and fallback key for store calls
    pub store_service: String,
    /// Cross-field checks run on generated and stored credentials
    pub validation: ProjectValidationOptions,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            store_service: PROJECT_STORE_SERVICE.to_string(),
            validation: ProjectValidationOptions::default(),
        }
    }
}

/// Everything needed to build a [`MigrationManager`](crate::MigrationManager)
///
/// ```
/// use credguard_credential::EngineConfig;
///
/// let config = EngineConfig::from_json_str(
///     r#"{ "retry": { "max_attempts": 5, "base_delay": "200ms" },
///          "generation": { "hash_cost": 10 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.generation.hash_cost, 10);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry policy for store calls
    pub retry: RetryConfig,
    /// Breaker policy for store calls
    pub circuit_breaker: CircuitBreakerConfig,
    /// Username, password and hashing parameters
    pub generation: GenerationOptions,
    /// Username rules
    pub username: UsernamePolicy,
    /// Password rules
    pub password: PasswordPolicy,
    /// Migration settings
    pub migration: MigrationOptions,
}

impl EngineConfig {
    /// Parse from JSON, filling omitted fields with defaults, and validate
    pub fn from_json_str(json: &str) -> CredentialResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CredentialError::configuration(format!("invalid engine configuration: {e}"))
                .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CREDGUARD_*` environment variables
    pub fn from_env() -> CredentialResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> CredentialResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = parse_var(&lookup, "CREDGUARD_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = parse_var(&lookup, "CREDGUARD_RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "CREDGUARD_CB_FAILURE_THRESHOLD")? {
            config.circuit_breaker.failure_threshold = n;
        }
        if let Some(ms) = parse_var(&lookup, "CREDGUARD_CB_RECOVERY_TIMEOUT_MS")? {
            config.circuit_breaker.recovery_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "CREDGUARD_PASSWORD_LENGTH")? {
            config.generation.password.length = n;
        }
        if let Some(n) = parse_var(&lookup, "CREDGUARD_HASH_COST")? {
            config.generation.hash_cost = n;
        }
        if let Some(prefix) = lookup("CREDGUARD_USERNAME_PREFIX") {
            config.generation.username_prefix = prefix;
        }
        if let Some(suffix) = lookup("CREDGUARD_USERNAME_SUFFIX") {
            config.generation.username_suffix = suffix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> CredentialResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.generation.validate()?;
        self.username.compile()?;
        self.password.validate()?;
        if self.migration.store_service.trim().is_empty() {
            return Err(CredentialError::configuration(
                "migration store_service must not be empty",
            ));
        }
        let threshold = self.migration.validation.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CredentialError::configuration(format!(
                "similarity threshold {threshold} is outside 0.0..=1.0"
            )));
        }
        Ok(())
    }

    /// Retry and breaker sections as a handler configuration
    #[must_use]
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            retry: self.retry.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> CredentialResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                CredentialError::configuration(format!("{key}={raw:?} is invalid: {e}"))
                    .with_context("variable", key)
            })
        })
        .transpose()
}
