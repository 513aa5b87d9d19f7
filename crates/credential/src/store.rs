//! Project store collaborator and an in-memory implementation

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use credguard_error::{CredentialError, CredentialResult};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::model::{ProjectCredentialUpdate, ProjectRecord};

/// Persistence of project records
///
/// Implementations own transport and storage; the engine only reads the
/// full list and writes credential fields back.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Every project, in a stable order
    async fn find_all(&self) -> CredentialResult<Vec<ProjectRecord>>;

    /// Write `update` onto the project with store id `id`, returning the
    /// updated record
    async fn update(
        &self,
        id: &str,
        update: ProjectCredentialUpdate,
    ) -> CredentialResult<ProjectRecord>;
}

/// In-memory [`ProjectStore`] with call counters and failure injection
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<Vec<ProjectRecord>>,
    find_all_failures: Mutex<VecDeque<CredentialError>>,
    failing_updates: RwLock<HashSet<String>>,
    find_all_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MemoryProjectStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `projects`
    pub fn with_projects(projects: impl IntoIterator<Item = ProjectRecord>) -> Self {
        let store = Self::new();
        store.projects.write().extend(projects);
        store
    }

    /// Append a project
    pub fn insert(&self, project: ProjectRecord) {
        self.projects.write().push(project);
    }

    /// Look a project up by its public reference
    #[must_use]
    pub fn get(&self, project_ref: &str) -> Option<ProjectRecord> {
        self.projects
            .read()
            .iter()
            .find(|p| p.project_ref == project_ref)
            .cloned()
    }

    /// Snapshot of every project
    #[must_use]
    pub fn projects(&self) -> Vec<ProjectRecord> {
        self.projects.read().clone()
    }

    /// Make the next `times` calls to `find_all` fail with `error`
    pub fn fail_find_all(&self, times: usize, error: CredentialError) {
        let mut queue = self.find_all_failures.lock();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Make every `update` of store id `id` fail
    pub fn fail_updates_for(&self, id: impl Into<String>) {
        self.failing_updates.write().insert(id.into());
    }

    /// Number of `find_all` calls so far
    #[must_use]
    pub fn find_all_calls(&self) -> usize {
        self.find_all_calls.load(Ordering::SeqCst)
    }

    /// Number of `update` calls so far
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_all(&self) -> CredentialResult<Vec<ProjectRecord>> {
        self.find_all_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.find_all_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.projects.read().clone())
    }

    async fn update(
        &self,
        id: &str,
        update: ProjectCredentialUpdate,
    ) -> CredentialResult<ProjectRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_updates.read().contains(id) {
            return Err(CredentialError::database(format!(
                "update of project {id} rejected by store"
            ))
            .with_retryable(false));
        }

        let mut projects = self.projects.write();
        let record = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CredentialError::validation(format!("Project with id {id} not found")))?;
        update.apply(record);
        debug!(project_id = id, "project credentials updated");
        Ok(record.clone())
    }
}
