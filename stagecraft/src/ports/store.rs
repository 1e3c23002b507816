//! Persistence port.

use crate::core::{Artifact, Project};
use crate::errors::WorkflowError;
use async_trait::async_trait;

/// Local persistence for projects and their artifacts.
///
/// The engine calls `save_project` after every stage transition so that
/// partial progress survives a crash or reload.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Loads a project, or `None` if it does not exist.
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, WorkflowError>;

    /// Persists a full project snapshot.
    async fn save_project(&self, project: &Project) -> Result<(), WorkflowError>;

    /// Persists the flat artifact list of a project.
    async fn save_artifacts(
        &self,
        project_id: &str,
        artifacts: &[Artifact],
    ) -> Result<(), WorkflowError>;
}
