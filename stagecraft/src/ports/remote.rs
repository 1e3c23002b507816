//! Remote generation service port.

use crate::context::ExecutionContext;
use crate::core::{Artifact, ArtifactType, StageId};
use crate::errors::WorkflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Input of one remote stage generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecutionRequest {
    /// Canonical stage id.
    pub stage_id: StageId,
    /// Context the stage runs with.
    pub context: ExecutionContext,
    /// Deliverable types to generate. Empty means the service default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_artifact_types: Vec<ArtifactType>,
}

impl StageExecutionRequest {
    /// Creates a request with no explicit deliverable selection.
    #[must_use]
    pub fn new(stage_id: StageId, context: ExecutionContext) -> Self {
        Self {
            stage_id,
            context,
            selected_artifact_types: Vec::new(),
        }
    }

    /// Narrows generation to the given types.
    #[must_use]
    pub fn with_selected_types(mut self, types: impl IntoIterator<Item = ArtifactType>) -> Self {
        self.selected_artifact_types = types.into_iter().collect();
        self
    }
}

/// Output of one remote stage generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStageOutput {
    /// Generated artifacts.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Tokens reported by the service.
    #[serde(default)]
    pub total_tokens: u64,
}

/// The remote generation and artifact service.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Generates artifacts for one stage.
    async fn execute_stage(
        &self,
        project_id: &str,
        request: &StageExecutionRequest,
    ) -> Result<RemoteStageOutput, WorkflowError>;

    /// Fetches the artifacts of one stage.
    async fn get_stage_artifacts(
        &self,
        project_id: &str,
        stage_id: &StageId,
    ) -> Result<Vec<Artifact>, WorkflowError>;

    /// Fetches every artifact of a project.
    async fn get_all_artifacts(&self, project_id: &str) -> Result<Vec<Artifact>, WorkflowError>;

    /// Deletes one artifact.
    async fn delete_artifact(
        &self,
        project_id: &str,
        artifact_id: &str,
    ) -> Result<(), WorkflowError>;
}
