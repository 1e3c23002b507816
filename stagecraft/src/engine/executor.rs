//! The workflow engine: single-stage and batch execution.

use super::cache::{ProjectCache, SharedProject};
use super::guard::ExecutionGuard;
use super::results::{BatchResult, BatchStageResult, StageExecutionResult};
use crate::artifacts::{adopt_existing_ids, assign_stage, remove_artifact, total_tokens};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::core::{
    Artifact, ArtifactType, Project, ProjectStatus, Stage, StageDefinition, StageId, StageStatus,
};
use crate::deliverables::DeliverableSelection;
use crate::errors::{RemoteCallError, WorkflowError};
use crate::events::{
    EventSink, NoOpEventSink, BATCH_COMPLETED, BATCH_FAILED, BATCH_STARTED, STAGE_COMPLETED,
    STAGE_ROLLED_BACK, STAGE_STARTED,
};
use crate::ports::{
    NoOpProgress, ProgressReporter, ProjectStore, RemoteExecutor, StageExecutionRequest,
};
use crate::sync::ArtifactReconciler;
use crate::utils::now_utc;
use crate::workflow::{transition, TransitionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One stage run inside a single execution or a batch.
struct StageRun<'a> {
    project_id: &'a str,
    shared: &'a SharedProject,
    stage_id: &'a StageId,
    context: ExecutionContext,
    selected: Vec<ArtifactType>,
    index: usize,
    progress: &'a dyn ProgressReporter,
}

/// Where to put a stage back when its run fails.
#[derive(Clone, Copy)]
struct Undo<'a> {
    project_id: &'a str,
    shared: &'a SharedProject,
    previous: &'a Stage,
    index: usize,
    progress: &'a dyn ProgressReporter,
}

/// What a finished stage run produced.
struct StageOutcome {
    artifacts: Vec<Artifact>,
    total_tokens: u64,
}

/// Builder for [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    remote: Arc<dyn RemoteExecutor>,
    store: Arc<dyn ProjectStore>,
    progress: Arc<dyn ProgressReporter>,
    events: Arc<dyn EventSink>,
    selection: Arc<DeliverableSelection>,
    projects: ProjectCache,
    config: EngineConfig,
}

impl WorkflowEngineBuilder {
    /// Sets the default progress reporter.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shares an existing deliverable selection.
    #[must_use]
    pub fn with_selection(mut self, selection: Arc<DeliverableSelection>) -> Self {
        self.selection = selection;
        self
    }

    /// Shares an existing project cache.
    #[must_use]
    pub fn with_project_cache(mut self, projects: ProjectCache) -> Self {
        self.projects = projects;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> WorkflowEngine {
        WorkflowEngine {
            remote: self.remote,
            store: self.store,
            progress: self.progress,
            events: self.events,
            selection: self.selection,
            projects: self.projects,
            config: self.config,
            executing: AtomicBool::new(false),
        }
    }
}

/// Drives stage execution for projects.
///
/// Only one execution (single stage or batch) runs per engine at a time;
/// a concurrent request fails with [`WorkflowError::Busy`] without
/// touching any state. Stages of a batch run strictly one after another
/// because each stage's output feeds the next stage's context.
pub struct WorkflowEngine {
    remote: Arc<dyn RemoteExecutor>,
    store: Arc<dyn ProjectStore>,
    progress: Arc<dyn ProgressReporter>,
    events: Arc<dyn EventSink>,
    selection: Arc<DeliverableSelection>,
    projects: ProjectCache,
    config: EngineConfig,
    executing: AtomicBool,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("projects", &self.projects)
            .field("config", &self.config)
            .field("executing", &self.is_executing())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Starts building an engine around its two required collaborators.
    #[must_use]
    pub fn builder(
        remote: Arc<dyn RemoteExecutor>,
        store: Arc<dyn ProjectStore>,
    ) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            remote,
            store,
            progress: Arc::new(NoOpProgress),
            events: Arc::new(NoOpEventSink),
            selection: Arc::new(DeliverableSelection::new()),
            projects: ProjectCache::new(),
            config: EngineConfig::default(),
        }
    }

    /// Returns true while an execution is in flight.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// The deliverable selection used to narrow generation.
    #[must_use]
    pub fn selection(&self) -> &Arc<DeliverableSelection> {
        &self.selection
    }

    /// The shared project cache.
    #[must_use]
    pub fn projects(&self) -> &ProjectCache {
        &self.projects
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Static metadata for a stage id (aliases accepted).
    #[must_use]
    pub fn stage_definition(&self, stage_id: &str) -> Option<StageDefinition> {
        crate::core::stage_definition(stage_id)
    }

    /// Creates a reconciler sharing this engine's collaborators and cache.
    #[must_use]
    pub fn reconciler(&self) -> ArtifactReconciler {
        ArtifactReconciler::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            self.projects.clone(),
            self.config.clone(),
        )
        .with_event_sink(Arc::clone(&self.events))
    }

    /// Registers a newly created project and persists it.
    pub async fn register_project(&self, project: Project) -> Result<(), WorkflowError> {
        project.workflow.validate()?;
        self.store.save_project(&project).await?;
        self.projects.insert(project);
        Ok(())
    }

    /// Returns the current state of a project, loading it if needed.
    pub async fn project(&self, project_id: &str) -> Result<Project, WorkflowError> {
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;
        let snapshot = shared.read().clone();
        Ok(snapshot)
    }

    /// Executes one stage.
    ///
    /// Without an explicit context, the stage runs with the outputs of
    /// every completed stage. Re-executing a completed stage keeps it
    /// completed and merges the new artifacts into it.
    pub async fn execute_stage(
        &self,
        project_id: &str,
        stage_id: &str,
        context: Option<ExecutionContext>,
    ) -> Result<StageExecutionResult, WorkflowError> {
        let _guard = ExecutionGuard::acquire(&self.executing, "execute_stage")?;
        let id = StageId::parse(stage_id);
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;

        let context = match context {
            Some(context) => context,
            None => ExecutionContext::from_completed_stages(&shared.read().workflow, None),
        };
        let selected = self.selected_types(project_id, &id);

        let outcome = self
            .run_stage(StageRun {
                project_id,
                shared: &shared,
                stage_id: &id,
                context,
                selected,
                index: 0,
                progress: self.progress.as_ref(),
            })
            .await?;

        Ok(StageExecutionResult::new(id, outcome.artifacts, outcome.total_tokens))
    }

    /// Executes `stage_ids` in the given order.
    ///
    /// Each stage is activated, generated with the running context,
    /// completed, and its primary artifact added to the context for the
    /// next stage. The first failure aborts the batch: earlier stages
    /// keep their results and the failing stage returns to pending.
    pub async fn execute_batch<S: AsRef<str>>(
        &self,
        project_id: &str,
        stage_ids: &[S],
        seed: ExecutionContext,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<BatchResult, WorkflowError> {
        let _guard = ExecutionGuard::acquire(&self.executing, "execute_batch")?;
        let ids: Vec<StageId> = stage_ids.iter().map(|s| StageId::parse(s.as_ref())).collect();
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;
        self.run_batch(project_id, &shared, &ids, seed, progress.unwrap_or(self.progress.as_ref()))
            .await
    }

    /// Runs every pending stage of a project in dependency order.
    ///
    /// The project is `in_progress` while running, `completed` once every
    /// stage is completed, and back to `active` otherwise.
    pub async fn execute_all_stages(
        &self,
        project_id: &str,
        conversation: &str,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<BatchResult, WorkflowError> {
        let _guard = ExecutionGuard::acquire(&self.executing, "execute_all_stages")?;
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;

        let (pending, seed) = {
            let project = shared.read();
            (
                project.workflow.pending_in_order(),
                ExecutionContext::from_completed_stages(&project.workflow, Some(conversation)),
            )
        };
        self.set_project_status(&shared, ProjectStatus::InProgress).await?;

        let reporter = progress.unwrap_or(self.progress.as_ref());
        match self.run_batch(project_id, &shared, &pending, seed, reporter).await {
            Ok(result) => {
                let all_done = shared.read().workflow.all_completed();
                let status = if all_done {
                    ProjectStatus::Completed
                } else {
                    ProjectStatus::Active
                };
                self.set_project_status(&shared, status).await?;
                Ok(result)
            }
            Err(err) => {
                let reset = self.set_project_status(&shared, ProjectStatus::Active).await;
                if let Err(persist_err) = reset {
                    warn!(
                        project_id,
                        error = %persist_err,
                        "Failed to persist project status after batch failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Generates only the selected deliverables a stage is still missing.
    ///
    /// Returns an empty result without calling the remote service when
    /// nothing is missing.
    pub async fn regenerate_missing(
        &self,
        project_id: &str,
        stage_id: &str,
    ) -> Result<StageExecutionResult, WorkflowError> {
        let _guard = ExecutionGuard::acquire(&self.executing, "regenerate_missing")?;
        let id = StageId::parse(stage_id);
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;

        let (missing, context) = {
            let project = shared.read();
            let stage = project.workflow.require(&id)?;
            (
                self.selection.missing(project_id, stage),
                ExecutionContext::from_completed_stages(&project.workflow, None),
            )
        };
        if missing.is_empty() {
            debug!(project_id, stage_id = %id, "No missing deliverables");
            return Ok(StageExecutionResult::empty(id));
        }

        let outcome = self
            .run_stage(StageRun {
                project_id,
                shared: &shared,
                stage_id: &id,
                context,
                selected: missing,
                index: 0,
                progress: self.progress.as_ref(),
            })
            .await?;

        Ok(StageExecutionResult::new(id, outcome.artifacts, outcome.total_tokens))
    }

    /// Deletes an artifact remotely, then locally.
    ///
    /// Returns the stage that held the artifact, if it was cached locally.
    pub async fn delete_artifact(
        &self,
        project_id: &str,
        artifact_id: &str,
    ) -> Result<Option<StageId>, WorkflowError> {
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;
        self.remote.delete_artifact(project_id, artifact_id).await?;

        let (owner, snapshot) = {
            let mut project = shared.write();
            let owner = remove_artifact(project.workflow.stages_mut(), artifact_id);
            if owner.is_some() {
                project.touch();
            }
            (owner, project.clone())
        };

        if owner.is_some() {
            self.persist(&snapshot, true).await?;
        }
        info!(project_id, artifact_id, "Artifact deleted");
        Ok(owner)
    }

    async fn run_batch(
        &self,
        project_id: &str,
        shared: &SharedProject,
        ids: &[StageId],
        seed: ExecutionContext,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchResult, WorkflowError> {
        {
            let project = shared.read();
            for id in ids {
                project.workflow.require(id)?;
            }
        }

        let stage_names: Vec<&str> = ids.iter().map(StageId::as_str).collect();
        info!(project_id, stages = ?stage_names, "Starting batch");
        self.events
            .emit(
                BATCH_STARTED,
                Some(serde_json::json!({ "project_id": project_id, "stages": stage_names })),
            )
            .await;

        let mut context = seed;
        let mut results = Vec::with_capacity(ids.len());
        let mut batch_tokens = 0;

        for (index, id) in ids.iter().enumerate() {
            let run = StageRun {
                project_id,
                shared,
                stage_id: id,
                context: context.clone(),
                selected: self.selected_types(project_id, id),
                index,
                progress,
            };

            let outcome = match self.run_stage(run).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(project_id, stage_id = %id, index, error = %err, "Batch aborted");
                    self.events
                        .emit(
                            BATCH_FAILED,
                            Some(serde_json::json!({
                                "project_id": project_id,
                                "stage_id": id.as_str(),
                                "index": index,
                                "error": err.to_string(),
                            })),
                        )
                        .await;
                    return Err(err);
                }
            };

            if let Some(primary) = outcome.artifacts.first() {
                context = context.with_stage_output(id, primary);
            }
            batch_tokens += total_tokens(&outcome.artifacts);
            results.push(BatchStageResult {
                stage_id: id.clone(),
                artifacts: outcome.artifacts,
            });
        }

        let result = BatchResult {
            results,
            total_tokens: batch_tokens,
            completed_at: now_utc(),
        };
        info!(project_id, total_tokens = result.total_tokens, "Batch completed");
        self.events
            .emit(
                BATCH_COMPLETED,
                Some(serde_json::json!({
                    "project_id": project_id,
                    "total_tokens": result.total_tokens,
                })),
            )
            .await;
        Ok(result)
    }

    async fn run_stage(&self, run: StageRun<'_>) -> Result<StageOutcome, WorkflowError> {
        let StageRun {
            project_id,
            shared,
            stage_id,
            context,
            selected,
            index,
            progress,
        } = run;

        let previous = {
            let project = shared.read();
            project.workflow.ensure_unblocked(stage_id)?;
            project.workflow.require(stage_id)?.clone()
        };
        let already_completed = previous.status == StageStatus::Completed;
        let undo = Undo {
            project_id,
            shared,
            previous: &previous,
            index,
            progress,
        };

        if !already_completed {
            if let Err(err) = self.apply(shared, stage_id, StageStatus::Active, None).await {
                self.restore(undo).await;
                return Err(err);
            }
            progress.on_progress(stage_id, StageStatus::Active, index);
            self.events
                .emit(
                    STAGE_STARTED,
                    Some(serde_json::json!({
                        "project_id": project_id,
                        "stage_id": stage_id.as_str(),
                        "index": index,
                    })),
                )
                .await;
        }

        let request =
            StageExecutionRequest::new(stage_id.clone(), context).with_selected_types(selected);
        debug!(
            project_id,
            stage_id = %stage_id,
            keys = ?request.context.keys(),
            "Calling remote stage execution"
        );

        let output = match self.remote.execute_stage(project_id, &request).await {
            Ok(output) => output,
            Err(err) => {
                if !already_completed {
                    self.restore(undo).await;
                }
                return Err(attribute_to_stage(err, stage_id));
            }
        };

        // a regenerated deliverable replaces the one of the same type
        let artifacts = adopt_existing_ids(
            assign_stage(output.artifacts, stage_id),
            &previous.artifacts,
        );
        let tokens = if output.total_tokens > 0 {
            output.total_tokens
        } else {
            total_tokens(&artifacts)
        };

        if let Err(err) = self
            .apply(shared, stage_id, StageStatus::Completed, Some(artifacts.clone()))
            .await
        {
            self.restore(undo).await;
            return Err(err);
        }
        progress.on_progress(stage_id, StageStatus::Completed, index);
        info!(
            project_id,
            stage_id = %stage_id,
            artifacts = artifacts.len(),
            tokens,
            "Stage completed"
        );
        self.events
            .emit(
                STAGE_COMPLETED,
                Some(serde_json::json!({
                    "project_id": project_id,
                    "stage_id": stage_id.as_str(),
                    "index": index,
                    "artifacts": artifacts.len(),
                })),
            )
            .await;

        Ok(StageOutcome {
            artifacts,
            total_tokens: tokens,
        })
    }

    /// Puts a stage back the way it was before a failed run, then saves it
    /// best-effort.
    ///
    /// A stage that was not completed always lands on `pending`. The
    /// `started_at` stamp survives; a completion that was never saved does
    /// not.
    async fn restore(&self, undo: Undo<'_>) {
        let Undo {
            project_id,
            shared,
            previous,
            index,
            progress,
        } = undo;
        let stage_id = &previous.id;

        let restored = {
            let mut project = shared.write();
            let restored = match project.workflow.require_mut(stage_id) {
                Ok(stage) => {
                    let artifacts_changed = stage.artifacts != previous.artifacts;
                    let started_at = stage.started_at.or(previous.started_at);
                    let revision = stage.revision;
                    *stage = previous.clone();
                    stage.started_at = started_at;
                    if stage.status != StageStatus::Completed {
                        stage.status = StageStatus::Pending;
                    }
                    if artifacts_changed {
                        stage.revision = revision + 1;
                    }
                    Some(artifacts_changed)
                }
                Err(_) => None,
            };
            restored.map(|artifacts_changed| {
                project.touch();
                (project.clone(), artifacts_changed)
            })
        };

        if let Some((snapshot, artifacts_changed)) = restored {
            if let Err(err) = self.persist(&snapshot, artifacts_changed).await {
                warn!(
                    project_id,
                    stage_id = %stage_id,
                    error = %err,
                    "Restored stage was not persisted"
                );
            }
        }

        if previous.status == StageStatus::Completed {
            warn!(project_id, stage_id = %stage_id, "Kept earlier results of completed stage");
            return;
        }
        progress.on_progress(stage_id, StageStatus::Pending, index);
        warn!(project_id, stage_id = %stage_id, "Stage rolled back to pending");
        self.events
            .emit(
                STAGE_ROLLED_BACK,
                Some(serde_json::json!({
                    "project_id": project_id,
                    "stage_id": stage_id.as_str(),
                })),
            )
            .await;
    }

    /// Applies one transition under the write lock, then persists.
    async fn apply(
        &self,
        shared: &SharedProject,
        stage_id: &StageId,
        status: StageStatus,
        artifacts: Option<Vec<Artifact>>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let (outcome, snapshot) = {
            let mut project = shared.write();
            let stage = project.workflow.require_mut(stage_id)?;
            let outcome = transition(stage, status, artifacts, now_utc())?;
            project.touch();
            (outcome, project.clone())
        };
        self.persist(&snapshot, outcome.artifacts_changed).await?;
        Ok(outcome)
    }

    async fn set_project_status(
        &self,
        shared: &SharedProject,
        status: ProjectStatus,
    ) -> Result<(), WorkflowError> {
        let snapshot = {
            let mut project = shared.write();
            project.status = status;
            project.touch();
            project.clone()
        };
        self.persist(&snapshot, false).await
    }

    async fn persist(
        &self,
        snapshot: &Project,
        artifacts_changed: bool,
    ) -> Result<(), WorkflowError> {
        self.store.save_project(snapshot).await?;
        if artifacts_changed {
            self.store
                .save_artifacts(&snapshot.id, &snapshot.all_artifacts())
                .await?;
        }
        Ok(())
    }

    fn selected_types(&self, project_id: &str, stage_id: &StageId) -> Vec<ArtifactType> {
        self.selection
            .selected(project_id, stage_id)
            .into_iter()
            .collect()
    }
}

/// Makes sure a remote failure names the stage it happened on.
fn attribute_to_stage(err: WorkflowError, stage_id: &StageId) -> WorkflowError {
    match err {
        WorkflowError::RemoteCall(remote) if remote.stage_id.is_some() => {
            WorkflowError::RemoteCall(remote)
        }
        WorkflowError::RemoteCall(remote) => remote.with_stage(stage_id.clone()).into(),
        other => RemoteCallError::new(other.to_string())
            .with_stage(stage_id.clone())
            .into(),
    }
}
