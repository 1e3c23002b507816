//! Polling reconciliation of remote artifact snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::recovery::{normalize_execution_state, RecoveryReport};
use crate::artifacts::group_by_stage;
use crate::config::EngineConfig;
use crate::core::Artifact;
use crate::engine::ProjectCache;
use crate::errors::WorkflowError;
use crate::events::{EventSink, NoOpEventSink, SYNC_APPLIED, SYNC_FAILED, SYNC_RECOVERED};
use crate::ports::{ProjectStore, RemoteExecutor};
use crate::utils::now_utc;

/// Outcome of one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// False when the snapshot was discarded as stale.
    pub applied: bool,
    /// Stages whose artifact list changed.
    pub stages_updated: usize,
    /// What stale-execution recovery did.
    pub recovery: RecoveryReport,
}

impl SyncReport {
    fn discarded() -> Self {
        Self::default()
    }
}

struct PollingHandle {
    project_id: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Everything a polling task needs, cheap to clone into it.
#[derive(Clone)]
struct SyncWorker {
    remote: Arc<dyn RemoteExecutor>,
    store: Arc<dyn ProjectStore>,
    projects: ProjectCache,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
    active: Arc<Mutex<Option<String>>>,
    /// Bumped whenever polling starts or stops.
    generation: Arc<AtomicU64>,
}

impl SyncWorker {
    async fn sync(&self, project_id: &str) -> Result<SyncReport, WorkflowError> {
        let generation = self.generation.load(Ordering::Acquire);
        let shared = self.projects.load(project_id, self.store.as_ref()).await?;

        let remote_artifacts = self
            .remote
            .get_all_artifacts(project_id)
            .await
            .map_err(|err| WorkflowError::reconciliation(project_id, err.to_string()))?;

        // polling was started or stopped while the fetch was in flight
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(project_id, "Discarding snapshot fetched for a superseded polling loop");
            return Ok(SyncReport::discarded());
        }

        let (report, snapshot) = {
            let mut project = shared.write();
            let now = now_utc();
            let stages_updated = apply_snapshot(&mut project.workflow, remote_artifacts, now);
            let recovery =
                normalize_execution_state(&mut project, now, self.config.stale_active_after());
            if stages_updated > 0 || recovery.changed() {
                project.touch();
            }
            let report = SyncReport {
                applied: true,
                stages_updated,
                recovery,
            };
            (report, project.clone())
        };

        self.store.save_project(&snapshot).await?;
        if report.stages_updated > 0 {
            self.store
                .save_artifacts(project_id, &snapshot.all_artifacts())
                .await?;
        }

        debug!(project_id, stages_updated = report.stages_updated, "Snapshot applied");
        self.events
            .emit(
                SYNC_APPLIED,
                Some(serde_json::json!({
                    "project_id": project_id,
                    "stages_updated": report.stages_updated,
                })),
            )
            .await;

        if report.recovery.changed() {
            let reset: Vec<&str> = report
                .recovery
                .reset_stages
                .iter()
                .map(|s| s.as_str())
                .collect();
            info!(
                project_id,
                reset = ?reset,
                status = %report.recovery.status_after,
                "Recovered stale execution state"
            );
            self.events
                .emit(
                    SYNC_RECOVERED,
                    Some(serde_json::json!({
                        "project_id": project_id,
                        "reset_stages": reset,
                        "status": report.recovery.status_after,
                    })),
                )
                .await;
        }

        Ok(report)
    }

    async fn poll(self, project_id: String, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sync(&project_id).await {
                        warn!(
                            project_id = %project_id,
                            error = %err,
                            "Polling tick failed; retrying next tick"
                        );
                        self.events
                            .emit(
                                SYNC_FAILED,
                                Some(serde_json::json!({
                                    "project_id": project_id,
                                    "error": err.to_string(),
                                })),
                            )
                            .await;
                    }
                }
                changed = stop.changed() => {
                    let stopped = changed.is_err() || *stop.borrow();
                    if stopped {
                        break;
                    }
                }
            }
        }
        debug!(project_id = %project_id, "Polling loop exited");
    }
}

/// Replaces each stage's artifacts with the remote snapshot.
///
/// The remote is authoritative: a stage with remote artifacts takes them
/// wholesale and gets a fresh `artifacts_updated_at`; a stage with none is
/// cleared. Returns the number of stages whose list changed.
fn apply_snapshot(
    graph: &mut crate::workflow::StageGraph,
    remote_artifacts: Vec<Artifact>,
    now: crate::utils::Timestamp,
) -> usize {
    let mut grouped = group_by_stage(remote_artifacts);
    let mut updated = 0;

    for stage in graph.stages_mut() {
        let incoming = grouped.remove(&stage.id).unwrap_or_default();
        if !incoming.is_empty() {
            stage.artifacts_updated_at = Some(now);
        }
        if stage.artifacts != incoming {
            stage.replace_artifacts(incoming);
            updated += 1;
        }
    }

    if !grouped.is_empty() {
        let unknown: Vec<&str> = grouped.keys().map(|id| id.as_str()).collect();
        debug!(stages = ?unknown, "Ignoring remote artifacts for stages outside the graph");
    }
    updated
}

/// Keeps a local project view in step with the remote service.
///
/// At most one polling loop runs per reconciler. The loop and the engine
/// may write the same stage concurrently; the last writer wins.
pub struct ArtifactReconciler {
    worker: SyncWorker,
    polling: Mutex<Option<PollingHandle>>,
}

impl std::fmt::Debug for ArtifactReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactReconciler")
            .field("active_project", &self.active_project())
            .field("poll_interval", &self.worker.config.poll_interval())
            .finish_non_exhaustive()
    }
}

impl ArtifactReconciler {
    /// Creates a reconciler over the given collaborators.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteExecutor>,
        store: Arc<dyn ProjectStore>,
        projects: ProjectCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            worker: SyncWorker {
                remote,
                store,
                projects,
                events: Arc::new(NoOpEventSink),
                config,
                active: Arc::new(Mutex::new(None)),
                generation: Arc::new(AtomicU64::new(0)),
            },
            polling: Mutex::new(None),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.worker.events = events;
        self
    }

    /// The project currently being polled.
    #[must_use]
    pub fn active_project(&self) -> Option<String> {
        self.worker.active.lock().clone()
    }

    /// Returns true while a polling loop is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling.lock().is_some()
    }

    /// Starts polling `project_id` on the configured interval.
    ///
    /// Polling the project already being polled is a no-op and returns
    /// false. Any loop for another project is stopped first. Must be called
    /// from within a tokio runtime.
    pub fn start_polling(&self, project_id: impl Into<String>) -> bool {
        let project_id = project_id.into();
        let mut polling = self.polling.lock();

        if polling.as_ref().is_some_and(|h| h.project_id == project_id) {
            return false;
        }
        if let Some(previous) = polling.take() {
            debug!(project_id = %previous.project_id, "Stopping previous polling loop");
            stop_handle(previous);
        }

        *self.worker.active.lock() = Some(project_id.clone());
        self.worker.generation.fetch_add(1, Ordering::AcqRel);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.worker.clone().poll(project_id.clone(), stop_rx));
        info!(
            project_id = %project_id,
            interval_ms = self.worker.config.poll_interval_ms,
            "Polling started"
        );

        *polling = Some(PollingHandle {
            project_id,
            stop,
            task,
        });
        true
    }

    /// Stops the polling loop, if any.
    ///
    /// A fetch already in flight, including one from [`Self::sync_once`],
    /// is discarded when it returns.
    pub fn stop_polling(&self) {
        let handle = self.polling.lock().take();
        *self.worker.active.lock() = None;
        self.worker.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = handle {
            info!(project_id = %handle.project_id, "Polling stopped");
            stop_handle(handle);
        }
    }

    /// Runs one reconciliation tick immediately.
    pub async fn sync_once(&self, project_id: &str) -> Result<SyncReport, WorkflowError> {
        self.worker.sync(project_id).await
    }
}

fn stop_handle(handle: PollingHandle) {
    // The receiver may already be gone if the task finished.
    let _ = handle.stop.send(true);
    handle.task.abort();
}

impl Drop for ArtifactReconciler {
    fn drop(&mut self) {
        if let Some(handle) = self.polling.get_mut().take() {
            stop_handle(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactType, Project, ProjectStatus, Stage, StageId, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::ports::InMemoryProjectStore;
    use crate::testing::{two_stage_project, ScriptedRemote, FIXTURE_PROJECT_ID};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        reconciler: ArtifactReconciler,
        remote: Arc<ScriptedRemote>,
        store: Arc<InMemoryProjectStore>,
        cache: ProjectCache,
        events: Arc<CollectingEventSink>,
    }

    fn fixture(project: Project) -> Fixture {
        let remote = Arc::new(ScriptedRemote::new());
        let store = Arc::new(InMemoryProjectStore::with_projects([project]));
        let cache = ProjectCache::new();
        let events = Arc::new(CollectingEventSink::new());
        let config = EngineConfig::default().with_poll_interval(Duration::from_secs(5));
        let reconciler =
            ArtifactReconciler::new(remote.clone(), store.clone(), cache.clone(), config)
                .with_event_sink(events.clone());
        Fixture {
            reconciler,
            remote,
            store,
            cache,
            events,
        }
    }

    fn remote_artifact(id: &str, stage: StageId) -> Artifact {
        Artifact::new(id, stage, ArtifactType::Document, format!("content {id}"))
    }

    #[tokio::test]
    async fn test_sync_once_replaces_and_clears() {
        let mut project = two_stage_project();
        project
            .workflow
            .stage_mut(&StageId::Design)
            .unwrap()
            .replace_artifacts(vec![remote_artifact("local", StageId::Design)]);
        let fx = fixture(project);
        fx.remote
            .set_remote_artifacts(vec![remote_artifact("r1", StageId::Requirement)]);

        let report = fx.reconciler.sync_once(FIXTURE_PROJECT_ID).await.unwrap();

        assert!(report.applied);
        assert_eq!(report.stages_updated, 2);
        let project = fx.cache.snapshot(FIXTURE_PROJECT_ID).unwrap();
        let requirement = project.workflow.stage(&StageId::Requirement).unwrap();
        assert_eq!(requirement.artifacts.len(), 1);
        assert!(requirement.artifacts_updated_at.is_some());
        assert!(project.workflow.stage(&StageId::Design).unwrap().artifacts.is_empty());
        assert_eq!(fx.store.artifacts(FIXTURE_PROJECT_ID).len(), 1);
        assert_eq!(fx.events.event_types(), vec![SYNC_APPLIED.to_string()]);
    }

    #[tokio::test]
    async fn test_sync_failure_is_reconciliation_error() {
        let fx = fixture(two_stage_project());
        fx.remote.set_snapshot_fails(true);

        let err = fx.reconciler.sync_once(FIXTURE_PROJECT_ID).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Reconciliation { .. }));
        assert_eq!(fx.store.project_save_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_recovers_stale_active_stage() {
        let mut project = two_stage_project();
        project.status = ProjectStatus::InProgress;
        {
            let stage = project.workflow.stage_mut(&StageId::Requirement).unwrap();
            stage.status = StageStatus::Active;
            stage.started_at = Some(now_utc() - chrono::Duration::hours(3));
        }
        let fx = fixture(project);

        let report = fx.reconciler.sync_once(FIXTURE_PROJECT_ID).await.unwrap();

        assert_eq!(report.recovery.reset_stages, vec![StageId::Requirement]);
        let saved = fx.store.project(FIXTURE_PROJECT_ID).unwrap();
        assert_eq!(saved.status, ProjectStatus::Active);
        assert_eq!(
            saved.workflow.stage(&StageId::Requirement).unwrap().status,
            StageStatus::Pending
        );
        assert!(fx.events.event_types().contains(&SYNC_RECOVERED.to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_in_flight_is_discarded_after_stop() {
        let fx = fixture(two_stage_project());
        fx.remote
            .set_remote_artifacts(vec![remote_artifact("r1", StageId::Requirement)]);
        let gate = fx.remote.hold_snapshots();

        let (report, ()) = tokio::join!(fx.reconciler.sync_once(FIXTURE_PROJECT_ID), async {
            fx.remote.snapshot_entered().await;
            fx.reconciler.stop_polling();
            gate.notify_one();
        });

        let report = report.unwrap();
        assert!(!report.applied);
        let project = fx.cache.snapshot(FIXTURE_PROJECT_ID).unwrap();
        assert!(project.workflow.stage(&StageId::Requirement).unwrap().artifacts.is_empty());
        assert_eq!(fx.store.project_save_count(), 0);
        assert!(fx.events.events_of_type(SYNC_APPLIED).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_in_flight_is_discarded_after_project_switch() {
        let mut other = two_stage_project();
        other.id = "project-2".to_string();
        let fx = fixture(two_stage_project());
        fx.store.save_project(&other).await.unwrap();
        fx.remote
            .set_remote_artifacts(vec![remote_artifact("r1", StageId::Requirement)]);
        let gate = fx.remote.hold_snapshots();

        let (report, ()) = tokio::join!(fx.reconciler.sync_once(FIXTURE_PROJECT_ID), async {
            fx.remote.snapshot_entered().await;
            assert!(fx.reconciler.start_polling("project-2"));
            gate.notify_one();
        });

        assert!(!report.unwrap().applied);
        let project = fx.cache.snapshot(FIXTURE_PROJECT_ID).unwrap();
        assert!(project.workflow.stage(&StageId::Requirement).unwrap().artifacts.is_empty());
        fx.reconciler.stop_polling();
    }

    #[tokio::test]
    async fn test_remote_artifacts_for_unknown_stage_are_ignored() {
        let project = Project::new(
            FIXTURE_PROJECT_ID,
            "Single",
            crate::workflow::StageGraph::new(vec![Stage::new(StageId::Requirement)]),
        );
        let fx = fixture(project);
        fx.remote
            .set_remote_artifacts(vec![remote_artifact("r1", StageId::Testing)]);

        let report = fx.reconciler.sync_once(FIXTURE_PROJECT_ID).await.unwrap();
        assert_eq!(report.stages_updated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_applies_on_each_tick() {
        let fx = fixture(two_stage_project());
        assert!(fx.reconciler.start_polling(FIXTURE_PROJECT_ID));
        assert!(!fx.reconciler.start_polling(FIXTURE_PROJECT_ID));
        assert_eq!(fx.reconciler.active_project().as_deref(), Some(FIXTURE_PROJECT_ID));

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.events.events_of_type(SYNC_APPLIED).len(), 1);

        fx.remote
            .set_remote_artifacts(vec![remote_artifact("r1", StageId::Requirement)]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.events.events_of_type(SYNC_APPLIED).len(), 2);
        let project = fx.cache.snapshot(FIXTURE_PROJECT_ID).unwrap();
        assert_eq!(
            project.workflow.stage(&StageId::Requirement).unwrap().artifacts.len(),
            1
        );

        fx.reconciler.stop_polling();
        assert!(!fx.reconciler.is_polling());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fx.events.events_of_type(SYNC_APPLIED).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_survives_failed_ticks() {
        let fx = fixture(two_stage_project());
        fx.remote.set_snapshot_fails(true);
        fx.reconciler.start_polling(FIXTURE_PROJECT_ID);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.events.events_of_type(SYNC_FAILED).len(), 1);

        fx.remote.set_snapshot_fails(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.events.events_of_type(SYNC_APPLIED).len(), 1);
        assert!(fx.reconciler.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_projects_stops_previous_loop() {
        let mut other = two_stage_project();
        other.id = "project-2".to_string();
        let fx = fixture(two_stage_project());
        fx.store.save_project(&other).await.unwrap();

        fx.reconciler.start_polling(FIXTURE_PROJECT_ID);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fx.reconciler.start_polling("project-2"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fx.reconciler.active_project().as_deref(), Some("project-2"));
        let projects: Vec<String> = fx
            .events
            .events_of_type(SYNC_APPLIED)
            .into_iter()
            .filter_map(|(_, data)| data?.get("project_id")?.as_str().map(str::to_string))
            .collect();
        assert_eq!(projects, vec![FIXTURE_PROJECT_ID.to_string(), "project-2".to_string()]);
    }
}
