//! Credential fallback collaborator

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use credguard_error::CredentialResult;
use tracing::warn;

use crate::model::{CredentialGap, ProjectCredentials};

/// Decides whether a project must run on fallback credentials and records
/// when it does
#[async_trait]
pub trait CredentialFallback: Send + Sync {
    /// Resolve the credentials a project would connect with
    async fn get_project_credentials(
        &self,
        project_ref: &str,
        user: Option<&str>,
        password_hash: Option<&str>,
    ) -> CredentialResult<ProjectCredentials>;

    /// Whether `credentials` are unusable on their own
    fn should_use_fallback(&self, credentials: &ProjectCredentials) -> bool;

    /// Record that `project_ref` needed the fallback
    fn log_fallback_usage(&self, project_ref: &str, reason: &str, gap: CredentialGap);
}

/// Uses the project's own credentials and needs the fallback whenever they
/// are incomplete
#[derive(Debug, Default)]
pub struct DefaultCredentialFallback {
    usage: AtomicUsize,
}

impl DefaultCredentialFallback {
    /// New fallback with a zero usage count
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times usage was logged
    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.usage.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CredentialFallback for DefaultCredentialFallback {
    async fn get_project_credentials(
        &self,
        _project_ref: &str,
        user: Option<&str>,
        password_hash: Option<&str>,
    ) -> CredentialResult<ProjectCredentials> {
        Ok(ProjectCredentials::new(
            user.map(str::to_owned),
            password_hash.map(str::to_owned),
        ))
    }

    fn should_use_fallback(&self, credentials: &ProjectCredentials) -> bool {
        !credentials.is_complete()
    }

    fn log_fallback_usage(&self, project_ref: &str, reason: &str, gap: CredentialGap) {
        self.usage.fetch_add(1, Ordering::Relaxed);
        warn!(project_ref, reason, gap = %gap, "project is using fallback credentials");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incomplete_credentials_need_fallback() {
        let fallback = DefaultCredentialFallback::new();
        let creds = fallback
            .get_project_credentials("alpha", Some("proj_alpha_user"), None)
            .await
            .unwrap();

        assert!(fallback.should_use_fallback(&creds));
        fallback.log_fallback_usage("alpha", "scan", creds.gap());
        assert_eq!(fallback.usage_count(), 1);
    }

    #[tokio::test]
    async fn complete_credentials_do_not() {
        let fallback = DefaultCredentialFallback::new();
        let creds = fallback
            .get_project_credentials("alpha", Some("proj_alpha_user"), Some("$2b$12$x"))
            .await
            .unwrap();
        assert!(!fallback.should_use_fallback(&creds));
    }
}
