//! Ready-made projects and engine harnesses.

use std::sync::Arc;

use super::mocks::{RecordingProgress, ScriptedRemote};
use crate::config::EngineConfig;
use crate::core::{Project, Stage, StageId};
use crate::engine::WorkflowEngine;
use crate::events::CollectingEventSink;
use crate::ports::InMemoryProjectStore;
use crate::workflow::StageGraph;

/// Id used by the fixture projects.
pub const FIXTURE_PROJECT_ID: &str = "project-1";

/// A project with `requirement -> design`, both pending.
#[must_use]
pub fn two_stage_project() -> Project {
    let graph = StageGraph::new(vec![
        Stage::new(StageId::Requirement),
        Stage::new(StageId::Design).depends_on(StageId::Requirement),
    ]);
    Project::new(FIXTURE_PROJECT_ID, "Two stage fixture", graph)
}

/// A project using the full linear template.
#[must_use]
pub fn template_project() -> Project {
    Project::from_template(FIXTURE_PROJECT_ID, "Template fixture")
}

/// An engine wired to scripted collaborators, with handles to each.
#[derive(Debug)]
pub struct EngineHarness {
    /// The engine under test.
    pub engine: Arc<WorkflowEngine>,
    /// The scripted remote service.
    pub remote: Arc<ScriptedRemote>,
    /// The in-memory store.
    pub store: Arc<InMemoryProjectStore>,
    /// Every emitted event.
    pub events: Arc<CollectingEventSink>,
    /// The default progress reporter.
    pub progress: Arc<RecordingProgress>,
}

impl EngineHarness {
    /// Builds a harness whose store already holds `project`.
    #[must_use]
    pub fn new(project: Project) -> Self {
        Self::with_config(project, EngineConfig::default())
    }

    /// Builds a harness with a custom configuration.
    #[must_use]
    pub fn with_config(project: Project, config: EngineConfig) -> Self {
        let remote = Arc::new(ScriptedRemote::new());
        let store = Arc::new(InMemoryProjectStore::with_projects([project]));
        let events = Arc::new(CollectingEventSink::new());
        let progress = Arc::new(RecordingProgress::new());

        let engine = WorkflowEngine::builder(remote.clone(), store.clone())
            .with_event_sink(events.clone())
            .with_progress(progress.clone())
            .with_config(config)
            .build();

        Self {
            engine: Arc::new(engine),
            remote,
            store,
            events,
            progress,
        }
    }

    /// The engine's current view of the fixture project.
    pub async fn project(&self) -> Project {
        self.engine
            .project(FIXTURE_PROJECT_ID)
            .await
            .expect("fixture project is registered")
    }
}
