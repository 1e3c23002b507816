//! Stage and project records.

use super::{Artifact, ArtifactType, ProjectStatus, StageId, StageStatus};
use crate::utils::{now_utc, Timestamp};
use crate::workflow::StageGraph;
use serde::{Deserialize, Serialize};

/// One phase of a project workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Canonical id.
    pub id: StageId,
    /// Display name.
    pub name: String,
    /// Stages that must be completed before this one may become active.
    #[serde(default)]
    pub dependencies: Vec<StageId>,
    /// Current status.
    #[serde(default)]
    pub status: StageStatus,
    /// When the stage first became active.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the stage first completed.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    /// Generated artifacts, in insertion order.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Last time the artifact list was replaced from a remote snapshot.
    #[serde(default)]
    pub artifacts_updated_at: Option<Timestamp>,
    /// Incremented on every artifact-list write.
    #[serde(default)]
    pub revision: u64,
}

impl Stage {
    /// Creates a pending stage. The display name comes from the catalog
    /// for known stages and from the id otherwise.
    #[must_use]
    pub fn new(id: impl Into<StageId>) -> Self {
        let id = id.into();
        let name = id
            .definition()
            .map_or_else(|| id.as_str().to_string(), |def| def.name.to_string());
        Self {
            id,
            name,
            dependencies: Vec::new(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            artifacts: Vec::new(),
            artifacts_updated_at: None,
            revision: 0,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<StageId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Sets the status without running the state machine.
    ///
    /// Intended for fixtures and for loading persisted state.
    #[must_use]
    pub fn with_status(mut self, status: StageStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the artifact list.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Returns the first artifact, used as the stage's context output.
    #[must_use]
    pub fn primary_artifact(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }

    /// Returns true if an artifact of `kind` is attached.
    #[must_use]
    pub fn has_artifact_of(&self, kind: &ArtifactType) -> bool {
        self.artifacts.iter().any(|a| &a.artifact_type == kind)
    }

    /// Replaces the artifact list and bumps the revision.
    pub fn replace_artifacts(&mut self, artifacts: Vec<Artifact>) {
        self.artifacts = artifacts;
        self.revision += 1;
    }
}

/// A project owning one workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// The stage graph.
    pub workflow: StageGraph,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ProjectStatus,
    /// Last modification time.
    #[serde(default = "now_utc")]
    pub updated_at: Timestamp,
}

impl Project {
    /// Creates a project around an existing graph.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, workflow: StageGraph) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workflow,
            status: ProjectStatus::Active,
            updated_at: now_utc(),
        }
    }

    /// Creates a project from the default eight-stage template.
    #[must_use]
    pub fn from_template(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, StageGraph::from_template())
    }

    /// Stamps the modification time.
    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }

    /// Every artifact across all stages, in stage order.
    #[must_use]
    pub fn all_artifacts(&self) -> Vec<Artifact> {
        self.workflow
            .stages()
            .iter()
            .flat_map(|stage| stage.artifacts.iter().cloned())
            .collect()
    }
}
