//! Credential generation, validation and migration for per-project database
//! roles.
//!
//! The [`MigrationManager`] finds projects whose stored credentials are
//! incomplete, generates a username and a bcrypt-hashed password for each,
//! checks them against the [`CredentialValidator`] and writes them back
//! through a [`ProjectStore`]. Store calls run under a
//! [`CredentialErrorHandler`](credguard_resilience::CredentialErrorHandler).
//!
//! ```no_run
//! use std::sync::Arc;
//! use credguard_credential::prelude::*;
//!
//! # async fn example() -> CredentialResult<()> {
//! let store = Arc::new(MemoryProjectStore::with_projects([
//!     ProjectRecord::new("1", "alpha"),
//! ]));
//! let manager = MigrationManager::from_config(
//!     EngineConfig::from_env()?,
//!     store,
//!     Arc::new(DefaultCredentialFallback::new()),
//! )?;
//!
//! let preview = manager.migrate_all_project_credentials(true).await?;
//! assert_eq!(preview.summary.projects_with_missing_credentials, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod fallback;
pub mod generator;
pub mod migration;
pub mod model;
pub mod store;
pub mod validation;

pub use config::{EngineConfig, MigrationOptions, PROJECT_STORE_SERVICE};
pub use fallback::{CredentialFallback, DefaultCredentialFallback};
pub use generator::{
    CredentialGenerator, GeneratedCredentials, GenerationOptions, PasswordOptions,
    generate_secure_password,
};
pub use migration::{
    BatchMigrationResult, MigrationManager, MigrationManagerBuilder, MigrationResult,
    MigrationStats, MigrationSummary,
};
pub use model::{CredentialGap, ProjectCredentialUpdate, ProjectCredentials, ProjectRecord};
pub use store::{MemoryProjectStore, ProjectStore};
pub use validation::{
    CredentialValidator, DetailedValidationResult, PasswordPolicy, ProjectValidationOptions,
    UsernamePolicy, ValidationResult,
};

/// Common imports
pub mod prelude {
    pub use crate::{
        BatchMigrationResult, CredentialFallback, CredentialGenerator, CredentialValidator,
        DefaultCredentialFallback, EngineConfig, GenerationOptions, MemoryProjectStore,
        MigrationManager, MigrationResult, PasswordOptions, ProjectCredentials, ProjectRecord,
        ProjectStore,
    };
    pub use credguard_error::{CredentialError, CredentialResult, ErrorKind};
}
