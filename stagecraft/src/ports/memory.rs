//! In-memory persistence.

use super::ProjectStore;
use crate::core::{Artifact, Project};
use crate::errors::WorkflowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`ProjectStore`] backed by process memory.
///
/// Suitable for tests and single-process tools. Also counts saves so
/// callers can check how often state was persisted.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<String, Project>>,
    artifacts: RwLock<HashMap<String, Vec<Artifact>>>,
    project_saves: AtomicUsize,
    artifact_saves: AtomicUsize,
}

impl InMemoryProjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `projects`.
    #[must_use]
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = Self::new();
        {
            let mut map = store.projects.write();
            for project in projects {
                map.insert(project.id.clone(), project);
            }
        }
        store
    }

    /// Returns the last saved snapshot of a project.
    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.projects.read().get(project_id).cloned()
    }

    /// Returns the last saved artifact list of a project.
    #[must_use]
    pub fn artifacts(&self, project_id: &str) -> Vec<Artifact> {
        self.artifacts
            .read()
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `save_project` calls.
    #[must_use]
    pub fn project_save_count(&self) -> usize {
        self.project_saves.load(Ordering::SeqCst)
    }

    /// Number of `save_artifacts` calls.
    #[must_use]
    pub fn artifact_save_count(&self) -> usize {
        self.artifact_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, WorkflowError> {
        Ok(self.project(project_id))
    }

    async fn save_project(&self, project: &Project) -> Result<(), WorkflowError> {
        self.projects
            .write()
            .insert(project.id.clone(), project.clone());
        self.project_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_artifacts(
        &self,
        project_id: &str,
        artifacts: &[Artifact],
    ) -> Result<(), WorkflowError> {
        self.artifacts
            .write()
            .insert(project_id.to_string(), artifacts.to_vec());
        self.artifact_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
