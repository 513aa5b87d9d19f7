//! Detection and repair of incomplete project credentials.
//!
//! Every store call goes through the [`CredentialErrorHandler`] under the
//! configured store service key, so retry, circuit breaking and health
//! tracking are shared across all operations of one manager. Projects are
//! processed one at a time in store order.

use std::sync::Arc;

use credguard_error::{CredentialError, CredentialResult};
use credguard_resilience::{
    CredentialErrorHandler, ErrorHandlingOptions, HandlerConfig, HandlerStatus, fallback_fn,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, MigrationOptions};
use crate::fallback::{CredentialFallback, DefaultCredentialFallback};
use crate::generator::{CredentialGenerator, GeneratedCredentials, GenerationOptions};
use crate::model::{CredentialGap, ProjectCredentialUpdate, ProjectCredentials, ProjectRecord};
use crate::store::ProjectStore;
use crate::validation::{CredentialValidator, DetailedValidationResult};

const ALREADY_COMPLETE: &str = "Project already has complete credentials; nothing changed";
const DRY_RUN: &str = "Dry run: credentials generated and validated, nothing persisted";
const MIGRATED: &str = "Credentials generated and stored";

/// Outcome for one project
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// The project ends up (or would end up, in a dry run) with valid
    /// complete credentials
    pub success: bool,
    /// Project reference
    pub project_ref: String,
    /// Stored credentials after the migration, or the candidate in a dry run
    pub generated_credentials: Option<ProjectCredentials>,
    /// Failure description
    pub error: Option<String>,
    /// Validation report for the generated or stored pair
    pub validation_result: Option<DetailedValidationResult>,
    /// Human-readable note (no-op, dry run)
    pub message: Option<String>,
}

impl MigrationResult {
    fn succeeded(project_ref: &str, message: &str) -> Self {
        Self {
            success: true,
            project_ref: project_ref.to_string(),
            generated_credentials: None,
            error: None,
            validation_result: None,
            message: Some(message.to_string()),
        }
    }

    fn failed(project_ref: &str, err: &CredentialError) -> Self {
        Self {
            success: false,
            project_ref: project_ref.to_string(),
            generated_credentials: None,
            error: Some(err.message().to_string()),
            validation_result: None,
            message: None,
        }
    }
}

/// Aggregate counts for a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    /// Projects detection flagged
    pub projects_with_missing_credentials: usize,
    /// `total_projects - projects_with_missing_credentials`
    pub projects_already_complete: usize,
    /// `"<ref>: <error>"` per failed project
    pub migration_errors: Vec<String>,
}

/// Outcome of [`MigrationManager::migrate_all_project_credentials`].
///
/// `successful_migrations + failed_migrations` always equals the number of
/// detected projects.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMigrationResult {
    /// Projects returned by the store
    pub total_projects: usize,
    /// Detected projects that succeeded
    pub successful_migrations: usize,
    /// Detected projects that failed
    pub failed_migrations: usize,
    /// One entry per detected project, in detection order
    pub results: Vec<MigrationResult>,
    /// Aggregate counts
    pub summary: MigrationSummary,
}

/// Projects by credential completeness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    /// Projects returned by the store
    pub total_projects: usize,
    /// Both fields present
    pub complete: usize,
    /// Only the username is missing
    pub missing_user: usize,
    /// Only the password hash is missing
    pub missing_password: usize,
    /// Both fields are missing
    pub missing_both: usize,
}

impl MigrationStats {
    fn record(&mut self, gap: CredentialGap) {
        self.total_projects += 1;
        match gap {
            CredentialGap::Complete => self.complete += 1,
            CredentialGap::MissingUser => self.missing_user += 1,
            CredentialGap::MissingPassword => self.missing_password += 1,
            CredentialGap::MissingBoth => self.missing_both += 1,
        }
    }

    /// Projects with at least one missing field
    #[must_use]
    pub fn incomplete(&self) -> usize {
        self.missing_user + self.missing_password + self.missing_both
    }
}

struct Detection {
    total: usize,
    pending: Vec<ProjectRecord>,
}

/// What a migration of one record would write, checked before any write
struct MigrationPlan {
    merged: ProjectCredentials,
    update: ProjectCredentialUpdate,
    validation: DetailedValidationResult,
}

struct MigrationFailure {
    error: CredentialError,
    validation: Option<DetailedValidationResult>,
}

impl From<CredentialError> for MigrationFailure {
    fn from(error: CredentialError) -> Self {
        Self {
            error,
            validation: None,
        }
    }
}

/// Builder state before a store is supplied
#[doc(hidden)]
pub struct NoStore;

/// Builder for [`MigrationManager`]; the project store is required
///
/// ```no_run
/// use std::sync::Arc;
/// use credguard_credential::{MemoryProjectStore, MigrationManager};
///
/// # fn example() -> credguard_error::CredentialResult<()> {
/// let manager = MigrationManager::builder()
///     .store(Arc::new(MemoryProjectStore::new()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MigrationManagerBuilder<S> {
    store: S,
    fallback: Option<Arc<dyn CredentialFallback>>,
    handler: Option<Arc<CredentialErrorHandler>>,
    generator: Option<CredentialGenerator>,
    options: MigrationOptions,
}

impl MigrationManagerBuilder<NoStore> {
    fn new() -> Self {
        Self {
            store: NoStore,
            fallback: None,
            handler: None,
            generator: None,
            options: MigrationOptions::default(),
        }
    }

    /// Set the project store (required)
    pub fn store(
        self,
        store: Arc<dyn ProjectStore>,
    ) -> MigrationManagerBuilder<Arc<dyn ProjectStore>> {
        MigrationManagerBuilder {
            store,
            fallback: self.fallback,
            handler: self.handler,
            generator: self.generator,
            options: self.options,
        }
    }
}

impl<S> MigrationManagerBuilder<S> {
    /// Credential fallback collaborator; defaults to [`DefaultCredentialFallback`]
    pub fn fallback(mut self, fallback: Arc<dyn CredentialFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Shared error handler; defaults to one with default policies
    pub fn handler(mut self, handler: Arc<CredentialErrorHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Credential generator; defaults to default options and policies
    pub fn generator(mut self, generator: CredentialGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Migration settings
    pub fn options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }
}

impl MigrationManagerBuilder<Arc<dyn ProjectStore>> {
    /// Build, constructing defaults for anything not supplied
    pub fn build(self) -> CredentialResult<MigrationManager> {
        let handler = match self.handler {
            Some(handler) => handler,
            None => Arc::new(CredentialErrorHandler::new(HandlerConfig::default())?),
        };
        let generator = match self.generator {
            Some(generator) => generator,
            None => CredentialGenerator::new(
                Arc::new(CredentialValidator::with_defaults()?),
                GenerationOptions::default(),
            )?
            .with_validation_options(self.options.validation.clone()),
        };
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(DefaultCredentialFallback::new()));

        Ok(MigrationManager {
            store: self.store,
            fallback,
            handler,
            generator,
            options: self.options,
        })
    }
}

/// Finds projects with incomplete credentials and fills them in
pub struct MigrationManager {
    store: Arc<dyn ProjectStore>,
    fallback: Arc<dyn CredentialFallback>,
    handler: Arc<CredentialErrorHandler>,
    generator: CredentialGenerator,
    options: MigrationOptions,
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("handler", &self.handler)
            .field("generator", &self.generator)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MigrationManager {
    /// Start building a manager
    pub fn builder() -> MigrationManagerBuilder<NoStore> {
        MigrationManagerBuilder::new()
    }

    /// Build every component from `config`
    pub fn from_config(
        config: EngineConfig,
        store: Arc<dyn ProjectStore>,
        fallback: Arc<dyn CredentialFallback>,
    ) -> CredentialResult<Self> {
        config.validate()?;
        let handler = Arc::new(CredentialErrorHandler::new(config.handler_config())?);
        let validator = Arc::new(CredentialValidator::new(config.username, config.password)?);
        let generator = CredentialGenerator::new(validator, config.generation)?
            .with_validation_options(config.migration.validation.clone());

        Self::builder()
            .store(store)
            .fallback(fallback)
            .handler(handler)
            .generator(generator)
            .options(config.migration)
            .build()
    }

    /// The shared error handler
    #[must_use]
    pub fn handler(&self) -> &Arc<CredentialErrorHandler> {
        &self.handler
    }

    /// The credential generator
    #[must_use]
    pub fn generator(&self) -> &CredentialGenerator {
        &self.generator
    }

    /// Breaker and health snapshot of the handler
    #[must_use]
    pub fn status(&self) -> HandlerStatus {
        self.handler.get_status()
    }

    fn store_options<T>(&self, label: &str) -> ErrorHandlingOptions<T> {
        ErrorHandlingOptions::for_service(self.options.store_service.clone()).label(label)
    }

    /// All projects, degrading to an empty list once retries are exhausted
    async fn load_projects_or_empty(&self) -> CredentialResult<Vec<ProjectRecord>> {
        let store = &self.store;
        let options = self
            .store_options("find_all")
            .with_fallback(fallback_fn(|| async { Ok(Vec::new()) }));
        self.handler
            .execute_with_error_handling(move || store.find_all(), options)
            .await
    }

    async fn find_project(&self, project_ref: &str) -> CredentialResult<ProjectRecord> {
        let store = &self.store;
        let projects = self
            .handler
            .execute_with_error_handling(move || store.find_all(), self.store_options("find_all"))
            .await?;
        projects
            .into_iter()
            .find(|p| p.project_ref == project_ref)
            .ok_or_else(|| {
                CredentialError::validation(format!("Project '{project_ref}' not found"))
                    .with_context("project_ref", project_ref)
            })
    }

    async fn detect(&self) -> CredentialResult<Detection> {
        let projects = self.load_projects_or_empty().await?;
        let total = projects.len();
        let mut pending = Vec::new();

        for record in projects {
            let credentials = match self
                .fallback
                .get_project_credentials(
                    &record.project_ref,
                    record.database_user.as_deref(),
                    record.database_password_hash.as_deref(),
                )
                .await
            {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!(
                        project_ref = %record.project_ref,
                        error = %e,
                        "credential fallback lookup failed, using stored fields"
                    );
                    record.credentials()
                }
            };

            if self.fallback.should_use_fallback(&credentials) {
                self.fallback.log_fallback_usage(
                    &record.project_ref,
                    "missing database credentials",
                    credentials.gap(),
                );
                pending.push(record);
            }
        }

        debug!(total, pending = pending.len(), "detection finished");
        Ok(Detection { total, pending })
    }

    /// References of projects whose credentials need migrating.
    ///
    /// A store that stays unavailable after retries yields an empty list.
    #[tracing::instrument(skip(self))]
    pub async fn detect_projects_with_missing_credentials(&self) -> CredentialResult<Vec<String>> {
        let detection = self.detect().await?;
        Ok(detection
            .pending
            .into_iter()
            .map(|record| record.project_ref)
            .collect())
    }

    /// Count projects by completeness category
    #[tracing::instrument(skip(self))]
    pub async fn get_migration_stats(&self) -> CredentialResult<MigrationStats> {
        let projects = self.load_projects_or_empty().await?;
        let mut stats = MigrationStats::default();
        for record in &projects {
            stats.record(record.credentials().gap());
        }
        Ok(stats)
    }

    /// Generate validated credentials without touching the store
    pub async fn generate_project_credentials(
        &self,
        project_ref: &str,
    ) -> CredentialResult<GeneratedCredentials> {
        self.generator.generate_project_credentials(project_ref).await
    }

    /// Same as [`MigrationManager::generate_project_credentials`] with
    /// explicit naming, password and hashing options
    pub async fn generate_project_credentials_with(
        &self,
        project_ref: &str,
        options: &GenerationOptions,
    ) -> CredentialResult<GeneratedCredentials> {
        self.generator
            .generate_project_credentials_with(project_ref, options)
            .await
    }

    /// Migrate one project with the default generation options
    pub async fn migrate_project_credentials(&self, project_ref: &str) -> MigrationResult {
        let options = self.generator.options().clone();
        self.migrate_project_credentials_with(project_ref, &options)
            .await
    }

    /// Generate and store missing credentials for one project.
    ///
    /// A project that is already complete is left untouched. Existing fields
    /// are kept; only missing ones are written. Failures are reported in the
    /// result, never returned as errors.
    #[tracing::instrument(skip(self, options))]
    pub async fn migrate_project_credentials_with(
        &self,
        project_ref: &str,
        options: &GenerationOptions,
    ) -> MigrationResult {
        match self.find_project(project_ref).await {
            Ok(record) => self.migrate_record(record, options).await,
            Err(e) => {
                error!(project_ref, error = %e, "credential migration failed");
                MigrationResult::failed(project_ref, &e)
            }
        }
    }

    async fn migrate_record(
        &self,
        record: ProjectRecord,
        options: &GenerationOptions,
    ) -> MigrationResult {
        let project_ref = record.project_ref.clone();

        if record.credentials().is_complete() {
            debug!(project_ref = %project_ref, "credentials already complete");
            return MigrationResult::succeeded(&project_ref, ALREADY_COMPLETE);
        }

        match self.store_generated(&record, options).await {
            Ok((stored, validation)) => {
                info!(project_ref = %project_ref, user = stored.user(), "credentials migrated");
                MigrationResult {
                    generated_credentials: Some(stored),
                    validation_result: Some(validation),
                    ..MigrationResult::succeeded(&project_ref, MIGRATED)
                }
            }
            Err(MigrationFailure { error: e, validation }) => {
                error!(project_ref = %project_ref, error = %e, "credential migration failed");
                MigrationResult {
                    validation_result: validation,
                    ..MigrationResult::failed(&project_ref, &e)
                }
            }
        }
    }

    /// Generate credentials for `record`, merge them with the fields it
    /// already has and validate the merged pair. Nothing is written.
    async fn plan(
        &self,
        record: &ProjectRecord,
        options: &GenerationOptions,
    ) -> Result<MigrationPlan, MigrationFailure> {
        let generated = self
            .generator
            .generate_project_credentials_with(&record.project_ref, options)
            .await?;

        let existing = record.credentials();
        let update = ProjectCredentialUpdate {
            database_user: match existing.user() {
                Some(_) => None,
                None => generated.credentials.user().map(str::to_owned),
            },
            database_password_hash: match existing.password_hash() {
                Some(_) => None,
                None => generated.credentials.password_hash().map(str::to_owned),
            },
        };
        let merged = ProjectCredentials::new(
            existing
                .user()
                .or(generated.credentials.user())
                .map(str::to_owned),
            existing
                .password_hash()
                .or(generated.credentials.password_hash())
                .map(str::to_owned),
        );

        // The plaintext only matches the merged hash when that hash is ours.
        let plaintext = existing
            .password_hash()
            .is_none()
            .then(|| generated.password.expose_secret());
        let validation = self.generator.validator().validate_project_credentials(
            &merged,
            plaintext,
            &self.options.validation,
        );

        if !validation.is_valid {
            let err = CredentialError::validation(format!(
                "Credentials for '{}' failed validation: {}",
                record.project_ref,
                validation.all_errors().join("; ")
            ))
            .with_context("project_ref", record.project_ref.as_str());
            return Err(MigrationFailure {
                error: err,
                validation: Some(validation),
            });
        }

        Ok(MigrationPlan {
            merged,
            update,
            validation,
        })
    }

    async fn store_generated(
        &self,
        record: &ProjectRecord,
        options: &GenerationOptions,
    ) -> Result<(ProjectCredentials, DetailedValidationResult), MigrationFailure> {
        let plan = self.plan(record, options).await?;

        let store = &self.store;
        let id = record.id.as_str();
        let update = &plan.update;
        let updated = self
            .handler
            .execute_with_error_handling(
                move || store.update(id, update.clone()),
                self.store_options("update"),
            )
            .await?;

        let stored = updated.credentials();
        if stored != plan.merged {
            let err = CredentialError::database(format!(
                "Store returned credentials for '{}' that differ from those written",
                record.project_ref
            ))
            .with_context("project_ref", record.project_ref.as_str());
            return Err(err.into());
        }
        Ok((stored, plan.validation))
    }

    async fn dry_run_record(
        &self,
        record: &ProjectRecord,
        options: &GenerationOptions,
    ) -> MigrationResult {
        let project_ref = record.project_ref.as_str();
        match self.plan(record, options).await {
            Ok(plan) => MigrationResult {
                generated_credentials: Some(plan.merged),
                validation_result: Some(plan.validation),
                ..MigrationResult::succeeded(project_ref, DRY_RUN)
            },
            Err(MigrationFailure { error: e, validation }) => {
                warn!(project_ref, error = %e, "dry run would fail");
                MigrationResult {
                    validation_result: validation,
                    ..MigrationResult::failed(project_ref, &e)
                }
            }
        }
    }

    /// Migrate every project detection flags, using the default options
    pub async fn migrate_all_project_credentials(
        &self,
        dry_run: bool,
    ) -> CredentialResult<BatchMigrationResult> {
        let options = self.generator.options().clone();
        self.migrate_all_project_credentials_with(&options, dry_run)
            .await
    }

    /// Migrate every project detection flags, one at a time.
    ///
    /// In a dry run credentials are only generated and validated; the store
    /// is never written. A failing project is recorded and the batch goes on.
    #[tracing::instrument(skip(self, options))]
    pub async fn migrate_all_project_credentials_with(
        &self,
        options: &GenerationOptions,
        dry_run: bool,
    ) -> CredentialResult<BatchMigrationResult> {
        let Detection { total, pending } = self.detect().await?;
        info!(total, pending = pending.len(), dry_run, "starting credential migration");

        let mut batch = BatchMigrationResult {
            total_projects: total,
            summary: MigrationSummary {
                projects_with_missing_credentials: pending.len(),
                projects_already_complete: total.saturating_sub(pending.len()),
                migration_errors: Vec::new(),
            },
            ..BatchMigrationResult::default()
        };

        for record in pending {
            let result = if dry_run {
                self.dry_run_record(&record, options).await
            } else {
                self.migrate_record(record, options).await
            };

            if result.success {
                batch.successful_migrations += 1;
            } else {
                batch.failed_migrations += 1;
                batch.summary.migration_errors.push(format!(
                    "{}: {}",
                    result.project_ref,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            batch.results.push(result);
        }

        info!(
            successful = batch.successful_migrations,
            failed = batch.failed_migrations,
            dry_run,
            "credential migration finished"
        );
        Ok(batch)
    }

    /// Validate a project's stored credentials without changing anything
    #[tracing::instrument(skip(self))]
    pub async fn validate_existing_credentials(
        &self,
        project_ref: &str,
    ) -> CredentialResult<DetailedValidationResult> {
        let record = self.find_project(project_ref).await?;
        Ok(self.generator.validator().validate_project_credentials(
            &record.credentials(),
            None,
            &self.options.validation,
        ))
    }
}
