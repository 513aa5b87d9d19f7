//! End-to-end migration runs against the in-memory store

use std::collections::HashSet;
use std::sync::Arc;

use credguard_credential::prelude::*;
use credguard_credential::{CredentialGap, PROJECT_STORE_SERVICE};
use credguard_resilience::CircuitState;
use pretty_assertions::assert_eq;
use regex::Regex;
use secrecy::ExposeSecret;

const HASH: &str = "$2b$04$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

fn fast_config() -> EngineConfig {
    EngineConfig::from_json_str(
        r#"{
            "retry": { "max_attempts": 3, "base_delay": "1ms", "max_delay": "5ms" },
            "circuit_breaker": { "failure_threshold": 5, "recovery_timeout": "60s" },
            "generation": { "hash_cost": 4 }
        }"#,
    )
    .unwrap()
}

fn manager_with(
    config: EngineConfig,
    store: &Arc<MemoryProjectStore>,
) -> (MigrationManager, Arc<DefaultCredentialFallback>) {
    credguard_log::init_test();
    let fallback = Arc::new(DefaultCredentialFallback::new());
    let manager = MigrationManager::from_config(
        config,
        Arc::clone(store) as Arc<dyn ProjectStore>,
        Arc::clone(&fallback) as Arc<dyn CredentialFallback>,
    )
    .unwrap();
    (manager, fallback)
}

fn three_projects() -> Arc<MemoryProjectStore> {
    Arc::new(MemoryProjectStore::with_projects([
        ProjectRecord::new("1", "alpha")
            .with_name("Alpha")
            .with_user("proj_alpha_user")
            .with_password_hash(HASH),
        ProjectRecord::new("2", "beta").with_user("proj_beta_user"),
        ProjectRecord::new("3", "gamma"),
    ]))
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let store = three_projects();
    let (manager, fallback) = manager_with(fast_config(), &store);

    let batch = manager.migrate_all_project_credentials(true).await.unwrap();

    assert_eq!(batch.total_projects, 3);
    assert_eq!(batch.summary.projects_with_missing_credentials, 2);
    assert_eq!(batch.summary.projects_already_complete, 1);
    assert_eq!(batch.successful_migrations, 2);
    assert_eq!(batch.failed_migrations, 0);
    assert_eq!(store.update_calls(), 0);
    assert_eq!(fallback.usage_count(), 2);

    let refs: Vec<&str> = batch.results.iter().map(|r| r.project_ref.as_str()).collect();
    assert_eq!(refs, ["beta", "gamma"]);
    for result in &batch.results {
        assert!(result.message.as_deref().unwrap().starts_with("Dry run"));
        assert!(result.generated_credentials.as_ref().unwrap().is_complete());
        assert!(result.validation_result.as_ref().unwrap().is_valid);
    }
    assert_eq!(store.get("gamma").unwrap().database_user, None);
}

#[tokio::test]
async fn failed_project_is_counted_and_batch_continues() {
    let store = Arc::new(MemoryProjectStore::with_projects([
        ProjectRecord::new("1", "alpha"),
        ProjectRecord::new("2", "beta"),
        ProjectRecord::new("3", "gamma").with_user("proj_gamma_user"),
    ]));
    store.fail_updates_for("2");
    let (manager, _) = manager_with(fast_config(), &store);

    let batch = manager.migrate_all_project_credentials(false).await.unwrap();

    assert_eq!(batch.successful_migrations + batch.failed_migrations, 3);
    assert_eq!(batch.successful_migrations, 2);
    assert_eq!(batch.failed_migrations, 1);
    assert_eq!(batch.summary.migration_errors.len(), 1);
    assert!(batch.summary.migration_errors[0].starts_with("beta: "));

    let beta = store.get("beta").unwrap();
    assert_eq!(beta.credentials().gap(), CredentialGap::MissingBoth);
    let gamma = store.get("gamma").unwrap();
    assert_eq!(gamma.database_user.as_deref(), Some("proj_gamma_user"));
    assert!(gamma.credentials().is_complete());

    // Non-retryable store errors are not retried.
    assert_eq!(store.update_calls(), 3);
}

#[tokio::test]
async fn second_run_finds_nothing_to_do() {
    let store = three_projects();
    let (manager, _) = manager_with(fast_config(), &store);

    let first = manager.migrate_all_project_credentials(false).await.unwrap();
    assert_eq!(first.successful_migrations, 2);

    let second = manager.migrate_all_project_credentials(false).await.unwrap();
    assert_eq!(second.total_projects, 3);
    assert_eq!(second.summary.projects_already_complete, 3);
    assert!(second.results.is_empty());

    let stats = manager.get_migration_stats().await.unwrap();
    assert_eq!(stats.complete, 3);
    assert_eq!(stats.incomplete(), 0);

    let report = manager.validate_existing_credentials("gamma").await.unwrap();
    assert!(report.is_valid, "{:?}", report.all_errors());
}

#[tokio::test]
async fn open_store_breaker_short_circuits_later_calls() {
    let store = Arc::new(MemoryProjectStore::with_projects([
        ProjectRecord::new("1", "alpha"),
        ProjectRecord::new("2", "beta"),
        ProjectRecord::new("3", "gamma"),
    ]));
    for id in ["1", "2", "3"] {
        store.fail_updates_for(id);
    }
    let mut config = fast_config();
    config.circuit_breaker.failure_threshold = 2;
    let (manager, _) = manager_with(config, &store);

    let batch = manager.migrate_all_project_credentials(false).await.unwrap();
    assert_eq!(batch.failed_migrations, 3);
    assert_eq!(store.update_calls(), 2);
    assert!(batch.results[2].error.as_deref().unwrap().contains("OPEN"));

    let status = manager.status();
    assert_eq!(
        status.circuit_breakers[PROJECT_STORE_SERVICE].state,
        CircuitState::Open
    );

    // find_all is rejected too, so detection degrades to an empty list.
    let find_calls = store.find_all_calls();
    let refs = manager.detect_projects_with_missing_credentials().await.unwrap();
    assert!(refs.is_empty());
    assert_eq!(store.find_all_calls(), find_calls);
    assert!(!manager.handler().is_service_healthy(PROJECT_STORE_SERVICE));

    manager.handler().reset();
    let refs = manager.detect_projects_with_missing_credentials().await.unwrap();
    assert_eq!(refs, ["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn generated_credentials_have_expected_shape() {
    let store = Arc::new(MemoryProjectStore::new());
    let (manager, _) = manager_with(fast_config(), &store);
    let hash_shape = Regex::new(r"^\$2[aby]\$\d+\$").unwrap();

    let generated = manager
        .generate_project_credentials("test-project-123")
        .await
        .unwrap();

    assert_eq!(
        generated.credentials.user(),
        Some("proj_test_project_123_user")
    );
    assert!(hash_shape.is_match(generated.credentials.password_hash().unwrap()));
    assert!(generated.credentials.is_complete());
    assert_eq!(generated.password.expose_secret().chars().count(), 32);
}

#[tokio::test]
async fn distinct_refs_get_distinct_hashes() {
    let store = Arc::new(MemoryProjectStore::new());
    let (manager, _) = manager_with(fast_config(), &store);

    let mut hashes = HashSet::new();
    for i in 0..10 {
        let generated = manager
            .generate_project_credentials(&format!("project-{i}"))
            .await
            .unwrap();
        hashes.insert(generated.credentials.password_hash().unwrap().to_string());
    }
    assert_eq!(hashes.len(), 10);
}

#[test]
fn validator_rejects_reserved_names_and_weak_passwords() {
    let validator = CredentialValidator::with_defaults().unwrap();

    let user = validator.validate_username("postgres");
    assert!(!user.is_valid);
    assert!(user.errors.iter().any(|e| e.contains("reserved")));

    let password = validator.validate_password("alllowercase123!");
    assert!(!password.is_valid);
    assert!(password.errors.iter().any(|e| e.contains("uppercase")));
}
