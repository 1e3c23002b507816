//! Execution results returned to callers.

use crate::core::{Artifact, StageId};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Summary of model-generated artifacts in a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMeta {
    /// Number of artifacts whose source is the model.
    pub model_artifact_count: usize,
    /// True if at least one artifact came from the model.
    pub has_model_artifacts: bool,
    /// Tokens spent on model artifacts.
    pub model_token_total: u64,
}

impl ExecutionMeta {
    /// Computes the summary for `artifacts`.
    #[must_use]
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let (count, tokens) = artifacts
            .iter()
            .filter(|a| a.is_model_output())
            .fold((0, 0), |(count, tokens), a| (count + 1, tokens + a.tokens));
        Self {
            model_artifact_count: count,
            has_model_artifacts: count > 0,
            model_token_total: tokens,
        }
    }
}

/// Result of a single stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecutionResult {
    /// Canonical stage id.
    pub stage_id: StageId,
    /// Artifacts returned by this execution.
    pub artifacts: Vec<Artifact>,
    /// Tokens spent.
    pub total_tokens: u64,
    /// Model-output summary.
    pub meta: ExecutionMeta,
}

impl StageExecutionResult {
    /// Builds a result from the artifacts of one run.
    #[must_use]
    pub fn new(stage_id: StageId, artifacts: Vec<Artifact>, total_tokens: u64) -> Self {
        let meta = ExecutionMeta::from_artifacts(&artifacts);
        Self {
            stage_id,
            artifacts,
            total_tokens,
            meta,
        }
    }

    /// A result for a run that had nothing to do.
    #[must_use]
    pub fn empty(stage_id: StageId) -> Self {
        Self::new(stage_id, Vec::new(), 0)
    }
}

/// One stage's entry in a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStageResult {
    /// Canonical stage id.
    pub stage_id: StageId,
    /// Artifacts returned for the stage.
    pub artifacts: Vec<Artifact>,
}

/// Result of a batch execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Per-stage results, in execution order.
    pub results: Vec<BatchStageResult>,
    /// Tokens spent across the batch.
    pub total_tokens: u64,
    /// When the batch finished.
    pub completed_at: Timestamp,
}

impl BatchResult {
    /// Returns the executed stage ids in order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<&StageId> {
        self.results.iter().map(|r| &r.stage_id).collect()
    }
}
