//! Shared in-memory project state.

use crate::core::Project;
use crate::errors::WorkflowError;
use crate::ports::ProjectStore;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A project shared between the engine and the reconciler.
///
/// Writers hold the lock only between suspension points and always
/// replace whole stages or artifact lists.
pub type SharedProject = Arc<RwLock<Project>>;

/// Locally cached projects, keyed by id.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ProjectCache {
    projects: Arc<DashMap<String, SharedProject>>,
}

impl ProjectCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a project.
    pub fn insert(&self, project: Project) -> SharedProject {
        let shared = Arc::new(RwLock::new(project));
        let id = shared.read().id.clone();
        self.projects.insert(id, Arc::clone(&shared));
        shared
    }

    /// Returns the cached project, if any.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<SharedProject> {
        self.projects.get(project_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns a clone of the cached project state.
    #[must_use]
    pub fn snapshot(&self, project_id: &str) -> Option<Project> {
        self.get(project_id).map(|shared| shared.read().clone())
    }

    /// Drops a project from the cache.
    pub fn remove(&self, project_id: &str) -> Option<SharedProject> {
        self.projects.remove(project_id).map(|(_, shared)| shared)
    }

    /// Returns true if the project is cached.
    #[must_use]
    pub fn contains(&self, project_id: &str) -> bool {
        self.projects.contains_key(project_id)
    }

    /// Returns the cached project, loading it from `store` on a miss.
    pub async fn load(
        &self,
        project_id: &str,
        store: &dyn ProjectStore,
    ) -> Result<SharedProject, WorkflowError> {
        if let Some(shared) = self.get(project_id) {
            return Ok(shared);
        }

        let project = store
            .get_project(project_id)
            .await?
            .ok_or_else(|| WorkflowError::ProjectNotFound(project_id.to_string()))?;

        // Another task may have loaded it while we were awaiting.
        let entry = self
            .projects
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(project)));
        Ok(Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryProjectStore;

    #[tokio::test]
    async fn test_load_from_store_once() {
        let store = InMemoryProjectStore::with_projects([Project::from_template("p", "Demo")]);
        let cache = ProjectCache::new();

        let first = cache.load("p", &store).await.unwrap();
        let second = cache.load("p", &store).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_project() {
        let cache = ProjectCache::new();
        let err = cache.load("nope", &InMemoryProjectStore::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ProjectNotFound(_)));
    }

    #[test]
    fn test_clones_share_state() {
        let cache = ProjectCache::new();
        let other = cache.clone();
        cache.insert(Project::from_template("p", "Demo"));
        assert!(other.contains("p"));
        assert_eq!(other.snapshot("p").unwrap().name, "Demo");
        assert!(other.remove("p").is_some());
        assert!(!cache.contains("p"));
    }
}
