//! Scripted collaborators for exercising the engine without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::artifacts::merge_artifacts;
use crate::core::{Artifact, ArtifactType, StageId, StageStatus};
use crate::errors::{RemoteCallError, WorkflowError};
use crate::ports::{ProgressReporter, RemoteExecutor, RemoteStageOutput, StageExecutionRequest};

/// A [`RemoteExecutor`] that generates deterministic artifacts.
///
/// Each call returns one artifact per selected type, or one artifact of
/// the stage's first expected type when nothing is selected. Generated
/// artifacts are also kept as the "server side" copy returned by
/// [`RemoteExecutor::get_all_artifacts`].
#[derive(Debug)]
pub struct ScriptedRemote {
    tokens_per_artifact: AtomicU64,
    failing: Mutex<HashSet<StageId>>,
    requests: Mutex<Vec<StageExecutionRequest>>,
    server: Mutex<Vec<Artifact>>,
    deleted: Mutex<Vec<String>>,
    snapshot_fails: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
    snapshot_gate: Mutex<Option<Arc<Notify>>>,
    snapshot_entered: Arc<Notify>,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self {
            tokens_per_artifact: AtomicU64::new(10),
            failing: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            server: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            snapshot_fails: AtomicBool::new(false),
            gate: Mutex::new(None),
            entered: Arc::new(Notify::new()),
            snapshot_gate: Mutex::new(None),
            snapshot_entered: Arc::new(Notify::new()),
        }
    }
}

impl ScriptedRemote {
    /// Creates a remote that succeeds for every stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every execution of `stage_id` fail.
    pub fn fail_on(&self, stage_id: impl Into<StageId>) {
        self.failing.lock().insert(stage_id.into());
    }

    /// Lets `stage_id` succeed again.
    pub fn recover(&self, stage_id: &StageId) {
        self.failing.lock().remove(stage_id);
    }

    /// Tokens reported for each generated artifact.
    pub fn set_tokens_per_artifact(&self, tokens: u64) {
        self.tokens_per_artifact.store(tokens, Ordering::Relaxed);
    }

    /// Replaces the server-side artifact snapshot.
    pub fn set_remote_artifacts(&self, artifacts: Vec<Artifact>) {
        *self.server.lock() = artifacts;
    }

    /// Makes `get_all_artifacts` fail until reset.
    pub fn set_snapshot_fails(&self, fails: bool) {
        self.snapshot_fails.store(fails, Ordering::Relaxed);
    }

    /// Holds every execution until the returned handle is notified.
    #[must_use]
    pub fn hold_executions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once an execution has reached the remote.
    pub async fn execution_entered(&self) {
        self.entered.notified().await;
    }

    /// Holds every `get_all_artifacts` call until the returned handle is
    /// notified.
    #[must_use]
    pub fn hold_snapshots(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.snapshot_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once a snapshot fetch has reached the remote.
    pub async fn snapshot_entered(&self) {
        self.snapshot_entered.notified().await;
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<StageExecutionRequest> {
        self.requests.lock().clone()
    }

    /// Stage ids of every request, in order.
    #[must_use]
    pub fn executed_stages(&self) -> Vec<StageId> {
        self.requests.lock().iter().map(|r| r.stage_id.clone()).collect()
    }

    /// Ids passed to `delete_artifact`.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    fn generate(&self, request: &StageExecutionRequest) -> Vec<Artifact> {
        let tokens = self.tokens_per_artifact.load(Ordering::Relaxed);
        let types: Vec<ArtifactType> = if request.selected_artifact_types.is_empty() {
            vec![request
                .stage_id
                .expected_artifact_types()
                .first()
                .cloned()
                .unwrap_or_default()]
        } else {
            request.selected_artifact_types.clone()
        };

        types
            .into_iter()
            .map(|kind| {
                let content = format!("{} for {}", kind.display_name(), request.stage_id);
                Artifact::generated(request.stage_id.clone(), kind, content).with_tokens(tokens)
            })
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedRemote {
    async fn execute_stage(
        &self,
        _project_id: &str,
        request: &StageExecutionRequest,
    ) -> Result<RemoteStageOutput, WorkflowError> {
        self.requests.lock().push(request.clone());
        self.entered.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().contains(&request.stage_id) {
            return Err(RemoteCallError::new("generation service unavailable")
                .with_status(503)
                .into());
        }

        let artifacts = self.generate(request);
        {
            let mut server = self.server.lock();
            server.retain(|existing| {
                existing.stage_id.as_ref() != Some(&request.stage_id)
                    || !artifacts
                        .iter()
                        .any(|a| a.artifact_type == existing.artifact_type)
            });
            let merged = merge_artifacts(&server, &artifacts);
            *server = merged;
        }
        Ok(RemoteStageOutput {
            total_tokens: artifacts.iter().map(|a| a.tokens).sum(),
            artifacts,
        })
    }

    async fn get_stage_artifacts(
        &self,
        _project_id: &str,
        stage_id: &StageId,
    ) -> Result<Vec<Artifact>, WorkflowError> {
        Ok(self
            .server
            .lock()
            .iter()
            .filter(|a| a.stage_id.as_ref() == Some(stage_id))
            .cloned()
            .collect())
    }

    async fn get_all_artifacts(&self, project_id: &str) -> Result<Vec<Artifact>, WorkflowError> {
        self.snapshot_entered.notify_one();
        let gate = self.snapshot_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.snapshot_fails.load(Ordering::Relaxed) {
            return Err(RemoteCallError::new(format!("artifact listing failed for {project_id}"))
                .with_status(500)
                .into());
        }
        Ok(self.server.lock().clone())
    }

    async fn delete_artifact(
        &self,
        _project_id: &str,
        artifact_id: &str,
    ) -> Result<(), WorkflowError> {
        self.server.lock().retain(|a| a.id != artifact_id);
        self.deleted.lock().push(artifact_id.to_string());
        Ok(())
    }
}

/// A [`ProgressReporter`] that records every callback.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    calls: Mutex<Vec<(StageId, StageStatus, usize)>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded `(stage, status, index)` triples.
    #[must_use]
    pub fn calls(&self) -> Vec<(StageId, StageStatus, usize)> {
        self.calls.lock().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_progress(&self, stage_id: &StageId, status: StageStatus, index: usize) {
        self.calls.lock().push((stage_id.clone(), status, index));
    }
}
