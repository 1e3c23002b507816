//! End-to-end tests for stage and batch execution.

#[cfg(test)]
mod tests {
    use crate::artifacts::merge_artifacts;
    use crate::context::{ExecutionContext, CONVERSATION_KEY};
    use crate::core::{
        Artifact, ArtifactType, Project, ProjectStatus, Stage, StageId, StageStatus,
    };
    use crate::engine::WorkflowEngine;
    use crate::errors::WorkflowError;
    use crate::events::{
        CollectingEventSink, BATCH_COMPLETED, BATCH_FAILED, BATCH_STARTED, STAGE_COMPLETED,
        STAGE_ROLLED_BACK, STAGE_STARTED,
    };
    use crate::ports::ProjectStore;
    use crate::testing::{
        template_project, two_stage_project, EngineHarness, RecordingProgress, ScriptedRemote,
        FIXTURE_PROJECT_ID,
    };
    use crate::workflow::StageGraph;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    const PID: &str = FIXTURE_PROJECT_ID;

    fn stage<'a>(project: &'a Project, id: &StageId) -> &'a Stage {
        project.workflow.stage(id).expect("stage exists")
    }

    #[test]
    fn test_resolve_never_returns_blocked_or_started_stages() {
        const STATUSES: [StageStatus; 3] =
            [StageStatus::Pending, StageStatus::Active, StageStatus::Completed];
        let template = StageGraph::from_template();
        let stage_count = u32::try_from(template.len()).unwrap();

        // every status assignment over the eight-stage template
        for combo in 0..3usize.pow(stage_count) {
            let mut graph = template.clone();
            let mut rest = combo;
            for stage in graph.stages_mut() {
                stage.status = STATUSES[rest % 3];
                rest /= 3;
            }

            let ready = graph.resolve_executable_stages();
            for stage in graph.stages() {
                let deps_done = stage.dependencies.iter().all(|dep| {
                    graph
                        .stage(dep)
                        .is_some_and(|d| d.status == StageStatus::Completed)
                });
                let expected = stage.status == StageStatus::Pending && deps_done;
                assert_eq!(
                    ready.contains(&stage.id),
                    expected,
                    "combo {combo}, stage {}",
                    stage.id
                );
            }
        }
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let a1 = Artifact::new("a1", StageId::Design, ArtifactType::UiDesign, "v1");
        let a2 = Artifact::new("a2", StageId::Design, ArtifactType::Prototype, "p1");
        let existing_sets = [vec![], vec![a1.clone()], vec![a1.clone(), a2.clone()]];
        let incoming_sets = [
            vec![],
            vec![Artifact::new("a1", StageId::Design, ArtifactType::UiDesign, "v2")],
            vec![a2, Artifact::new("a3", StageId::Design, ArtifactType::DesignSpec, "s1")],
        ];

        for existing in &existing_sets {
            for incoming in &incoming_sets {
                let once = merge_artifacts(existing, incoming);
                let twice = merge_artifacts(&once, incoming);
                assert_eq!(twice, once);
            }
        }
    }

    #[tokio::test]
    async fn test_batch_runs_in_order_and_feeds_context_forward() {
        let harness = EngineHarness::new(two_stage_project());

        let result = assert_ok!(
            harness
                .engine
                .execute_batch(
                    PID,
                    &["requirement", "design"],
                    ExecutionContext::seeded("build a todo app"),
                    None,
                )
                .await
        );

        assert_eq!(
            harness.remote.executed_stages(),
            vec![StageId::Requirement, StageId::Design]
        );
        assert_eq!(
            result.stage_ids(),
            vec![&StageId::Requirement, &StageId::Design]
        );

        let requests = harness.remote.requests();
        assert!(!requests[0].context.contains_key("REQUIREMENT"));

        let requirement_output = &result.results[0].artifacts[0].content;
        let design_context = &requests[1].context;
        assert_eq!(design_context.get("REQUIREMENT"), Some(requirement_output.as_str()));
        assert_eq!(design_context.get("PRD"), Some(requirement_output.as_str()));
        assert_eq!(design_context.get(CONVERSATION_KEY), Some("build a todo app"));
        assert_eq!(result.total_tokens, 20);

        assert_eq!(
            harness.events.event_types(),
            vec![
                BATCH_STARTED.to_string(),
                STAGE_STARTED.to_string(),
                STAGE_COMPLETED.to_string(),
                STAGE_STARTED.to_string(),
                STAGE_COMPLETED.to_string(),
                BATCH_COMPLETED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_selection_scenario_reports_progress_in_order() {
        let harness = EngineHarness::new(two_stage_project());
        harness
            .engine
            .selection()
            .set_selected(PID, &StageId::Design, [ArtifactType::UiDesign]);
        let progress = RecordingProgress::new();

        assert_ok!(
            harness
                .engine
                .execute_batch(
                    PID,
                    &["requirement", "design"],
                    ExecutionContext::new(),
                    Some(&progress),
                )
                .await
        );

        let project = harness.project().await;
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert!(!requirement.artifacts.is_empty());

        let design = stage(&project, &StageId::Design);
        assert_eq!(design.status, StageStatus::Completed);
        assert_eq!(design.artifacts.len(), 1);
        assert_eq!(design.artifacts[0].artifact_type, ArtifactType::UiDesign);

        assert_eq!(
            progress.calls(),
            vec![
                (StageId::Requirement, StageStatus::Active, 0),
                (StageId::Requirement, StageStatus::Completed, 0),
                (StageId::Design, StageStatus::Active, 1),
                (StageId::Design, StageStatus::Completed, 1),
            ]
        );
        // the per-call reporter replaces the engine default
        assert!(harness.progress.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_stage_rolls_back_and_keeps_earlier_results() {
        let harness = EngineHarness::new(two_stage_project());
        harness.remote.fail_on(StageId::Design);

        let err = assert_err!(
            harness
                .engine
                .execute_batch(PID, &["requirement", "design"], ExecutionContext::new(), None)
                .await
        );

        assert!(matches!(err, WorkflowError::RemoteCall(_)));
        assert_eq!(err.stage_id(), Some(&StageId::Design));
        assert!(err.is_retryable());

        let project = harness.project().await;
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert_eq!(requirement.artifacts.len(), 1);
        let design = stage(&project, &StageId::Design);
        assert_eq!(design.status, StageStatus::Pending);
        assert!(design.artifacts.is_empty());

        let saved = harness.store.project(PID).unwrap();
        assert_eq!(saved, project);

        assert_eq!(
            harness.progress.calls(),
            vec![
                (StageId::Requirement, StageStatus::Active, 0),
                (StageId::Requirement, StageStatus::Completed, 0),
                (StageId::Design, StageStatus::Active, 1),
                (StageId::Design, StageStatus::Pending, 1),
            ]
        );
        let events = harness.events.event_types();
        assert!(events.contains(&STAGE_ROLLED_BACK.to_string()));
        assert_eq!(events.last(), Some(&BATCH_FAILED.to_string()));
        assert!(!harness.engine.is_executing());
    }

    #[tokio::test]
    async fn test_second_batch_while_running_is_busy() {
        let harness = EngineHarness::new(two_stage_project());
        let gate = harness.remote.hold_executions();

        let engine = Arc::clone(&harness.engine);
        let running = tokio::spawn(async move {
            engine
                .execute_batch(PID, &["requirement", "design"], ExecutionContext::new(), None)
                .await
        });
        harness.remote.execution_entered().await;
        assert!(harness.engine.is_executing());

        let before = harness.project().await;
        let saves_before = harness.store.project_save_count();

        let err = assert_err!(
            harness
                .engine
                .execute_batch(PID, &["requirement", "design"], ExecutionContext::new(), None)
                .await
        );
        assert!(matches!(err, WorkflowError::Busy(_)));
        let err = assert_err!(harness.engine.execute_stage(PID, "design", None).await);
        assert!(matches!(err, WorkflowError::Busy(_)));

        assert_eq!(harness.project().await, before);
        assert_eq!(harness.store.project_save_count(), saves_before);
        assert_eq!(stage(&before, &StageId::Requirement).status, StageStatus::Active);

        gate.notify_one();
        gate.notify_one();
        assert_ok!(running.await.unwrap());
        assert!(!harness.engine.is_executing());
        assert_eq!(harness.remote.executed_stages().len(), 2);
    }

    #[tokio::test]
    async fn test_blocked_stage_reports_missing_dependencies() {
        let harness = EngineHarness::new(two_stage_project());

        let err = assert_err!(harness.engine.execute_stage(PID, "design", None).await);

        match err {
            WorkflowError::DependencyBlocked(blocked) => {
                assert_eq!(blocked.stage_id, StageId::Design);
                assert_eq!(blocked.missing, vec!["Requirement Analysis".to_string()]);
            }
            other => panic!("expected dependency-blocked, got {other}"),
        }
        assert!(harness.remote.requests().is_empty());
        assert_eq!(harness.store.project_save_count(), 0);
    }

    #[tokio::test]
    async fn test_each_transition_is_persisted() {
        let harness = EngineHarness::new(two_stage_project());

        let result = assert_ok!(harness.engine.execute_stage(PID, " Requirements ", None).await);

        assert_eq!(result.stage_id, StageId::Requirement);
        assert_eq!(result.total_tokens, 10);
        // active, then completed
        assert_eq!(harness.store.project_save_count(), 2);
        assert_eq!(harness.store.artifact_save_count(), 1);

        let saved = harness.store.project(PID).unwrap();
        let requirement = stage(&saved, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert!(requirement.started_at.is_some());
        assert!(requirement.completed_at.is_some());
        assert_eq!(harness.store.artifacts(PID), requirement.artifacts);
    }

    #[tokio::test]
    async fn test_rerunning_completed_stage_replaces_same_type_deliverable() {
        let harness = EngineHarness::new(two_stage_project());
        assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);
        let first = stage(&harness.project().await, &StageId::Requirement).clone();
        assert_eq!(first.artifacts.len(), 1);

        harness.remote.set_tokens_per_artifact(25);
        let rerun = assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);
        assert_eq!(rerun.artifacts[0].id, first.artifacts[0].id);

        let project = harness.project().await;
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert_eq!(requirement.artifacts.len(), 1);
        assert_eq!(requirement.artifacts[0].id, first.artifacts[0].id);
        assert_eq!(requirement.artifacts[0].artifact_type, first.artifacts[0].artifact_type);
        assert_eq!(requirement.artifacts[0].tokens, 25);
        assert_eq!(requirement.completed_at, first.completed_at);
        assert_eq!(harness.store.artifacts(PID), requirement.artifacts);
        assert_eq!(
            harness.progress.calls(),
            vec![
                (StageId::Requirement, StageStatus::Active, 0),
                (StageId::Requirement, StageStatus::Completed, 0),
                (StageId::Requirement, StageStatus::Completed, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_rerun_keeps_completed_stage() {
        let harness = EngineHarness::new(two_stage_project());
        assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);
        harness.remote.fail_on(StageId::Requirement);

        assert_err!(harness.engine.execute_stage(PID, "requirement", None).await);

        let project = harness.project().await;
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert_eq!(requirement.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_deliverables_follow_deletions() {
        let harness = EngineHarness::new(two_stage_project());
        let selection = harness.engine.selection();
        selection.set_selected(
            PID,
            &StageId::Design,
            [ArtifactType::UiDesign, ArtifactType::Prototype],
        );

        assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);
        assert_ok!(harness.engine.execute_stage(PID, "design", None).await);

        let project = harness.project().await;
        let design = stage(&project, &StageId::Design);
        assert!(selection.missing(PID, design).is_empty());
        assert!(selection.progress(PID, design).is_complete());

        let prototype_id = design
            .artifacts
            .iter()
            .find(|a| a.artifact_type == ArtifactType::Prototype)
            .map(|a| a.id.clone())
            .unwrap();
        let owner = assert_ok!(harness.engine.delete_artifact(PID, &prototype_id).await);
        assert_eq!(owner, Some(StageId::Design));
        assert_eq!(harness.remote.deleted(), vec![prototype_id]);

        let project = harness.project().await;
        let design = stage(&project, &StageId::Design);
        assert_eq!(selection.missing(PID, design), vec![ArtifactType::Prototype]);
        assert_eq!(design.status, StageStatus::Completed);
        assert_eq!(harness.store.artifacts(PID).len(), 2);
    }

    #[tokio::test]
    async fn test_regenerate_missing_only_requests_missing_types() {
        let harness = EngineHarness::new(two_stage_project());
        let selection = harness.engine.selection();
        assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);
        assert_ok!(harness.engine.execute_stage(PID, "design", None).await);
        selection.set_selected(
            PID,
            &StageId::Design,
            [ArtifactType::UiDesign, ArtifactType::DesignSpec],
        );

        let result = assert_ok!(harness.engine.regenerate_missing(PID, "design").await);

        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].artifact_type, ArtifactType::DesignSpec);
        let last_request = harness.remote.requests().pop().unwrap();
        assert_eq!(last_request.selected_artifact_types, vec![ArtifactType::DesignSpec]);
        assert!(last_request.context.contains_key("PRD"));

        let project = harness.project().await;
        let design = stage(&project, &StageId::Design);
        assert!(selection.missing(PID, design).is_empty());
        assert_eq!(design.artifacts.len(), 2);

        let calls_before = harness.remote.requests().len();
        let result = assert_ok!(harness.engine.regenerate_missing(PID, "design").await);
        assert!(result.artifacts.is_empty());
        assert_eq!(harness.remote.requests().len(), calls_before);
    }

    #[tokio::test]
    async fn test_execute_all_stages_completes_project() {
        let harness = EngineHarness::new(template_project());

        let result = assert_ok!(
            harness
                .engine
                .execute_all_stages(PID, "build a todo app", None)
                .await
        );

        assert_eq!(harness.remote.executed_stages(), StageId::KNOWN.to_vec());
        assert_eq!(result.results.len(), StageId::KNOWN.len());
        assert!(harness
            .remote
            .requests()
            .iter()
            .all(|r| r.context.conversation() == Some("build a todo app")));

        let project = harness.project().await;
        assert!(project.workflow.all_completed());
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.workflow.progress_percent(), 100);
        assert_eq!(harness.store.project(PID).unwrap().status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_execute_all_stages_failure_leaves_project_active() {
        let harness = EngineHarness::new(template_project());
        harness.remote.fail_on(StageId::Architecture);

        let err = assert_err!(
            harness
                .engine
                .execute_all_stages(PID, "build a todo app", None)
                .await
        );
        assert_eq!(err.stage_id(), Some(&StageId::Architecture));

        let project = harness.project().await;
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(
            project.workflow.resolve_executable_stages(),
            vec![StageId::Architecture]
        );
        assert_eq!(stage(&project, &StageId::Design).status, StageStatus::Completed);

        // resuming only runs what is still pending
        harness.remote.recover(&StageId::Architecture);
        assert_ok!(
            harness
                .engine
                .execute_all_stages(PID, "build a todo app", None)
                .await
        );
        assert_eq!(harness.remote.executed_stages().len(), StageId::KNOWN.len() + 1);
        assert_eq!(harness.project().await.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_stage_in_batch_runs_nothing() {
        let harness = EngineHarness::new(two_stage_project());

        let err = assert_err!(
            harness
                .engine
                .execute_batch(PID, &["requirement", "launch"], ExecutionContext::new(), None)
                .await
        );

        assert!(matches!(err, WorkflowError::StageNotFound(ref id) if id == "launch"));
        assert!(harness.remote.requests().is_empty());
        assert!(harness.events.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let harness = EngineHarness::new(two_stage_project());
        let err = assert_err!(harness.engine.execute_stage("nope", "requirement", None).await);
        assert!(matches!(err, WorkflowError::ProjectNotFound(_)));
        assert!(!harness.engine.is_executing());
    }

    #[tokio::test]
    async fn test_reconciler_shares_engine_cache() {
        let harness = EngineHarness::new(two_stage_project());
        assert_ok!(harness.engine.execute_stage(PID, "requirement", None).await);

        let remote_copy =
            Artifact::new("server-1", StageId::Requirement, ArtifactType::Prd, "# PRD v2");
        harness.remote.set_remote_artifacts(vec![remote_copy.clone()]);

        let reconciler = harness.engine.reconciler();
        let report = assert_ok!(reconciler.sync_once(PID).await);
        assert!(report.applied);

        let project = harness.project().await;
        assert_eq!(stage(&project, &StageId::Requirement).artifacts, vec![remote_copy]);
        assert_eq!(stage(&project, &StageId::Requirement).status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_register_project_rejects_invalid_graph() {
        let harness = EngineHarness::new(two_stage_project());
        let graph = StageGraph::new(vec![
            Stage::new(StageId::Requirement).depends_on(StageId::Design),
            Stage::new(StageId::Design).depends_on(StageId::Requirement),
        ]);

        let err = assert_err!(
            harness
                .engine
                .register_project(Project::new("cyclic", "Cyclic", graph))
                .await
        );
        assert!(matches!(err, WorkflowError::Validation(_)));

        assert_ok!(
            harness
                .engine
                .register_project(Project::from_template("fresh", "Fresh"))
                .await
        );
        assert!(harness.engine.projects().contains("fresh"));
        assert!(harness.store.project("fresh").is_some());
    }

    mockall::mock! {
        Store {}

        #[async_trait]
        impl ProjectStore for Store {
            async fn get_project(&self, project_id: &str) -> Result<Option<Project>, WorkflowError>;
            async fn save_project(&self, project: &Project) -> Result<(), WorkflowError>;
            async fn save_artifacts(
                &self,
                project_id: &str,
                artifacts: &[Artifact],
            ) -> Result<(), WorkflowError>;
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_before_remote_call() {
        let mut store = MockStore::new();
        store
            .expect_get_project()
            .times(1)
            .returning(|_| Ok(Some(two_stage_project())));
        store
            .expect_save_project()
            .times(2)
            .returning(|_| Err(WorkflowError::Persistence("disk full".to_string())));
        store.expect_save_artifacts().never();

        let remote = Arc::new(ScriptedRemote::new());
        let progress = Arc::new(RecordingProgress::new());
        let engine = WorkflowEngine::builder(remote.clone(), Arc::new(store))
            .with_progress(progress.clone())
            .build();

        let err = assert_err!(engine.execute_stage(PID, "requirement", None).await);

        assert!(matches!(err, WorkflowError::Persistence(_)));
        assert!(remote.requests().is_empty());
        assert!(!engine.is_executing());
        let project = assert_ok!(engine.project(PID).await);
        assert_eq!(stage(&project, &StageId::Requirement).status, StageStatus::Pending);
        assert_eq!(
            progress.calls(),
            vec![(StageId::Requirement, StageStatus::Pending, 0)]
        );
        assert_eq!(
            project.workflow.resolve_executable_stages(),
            vec![StageId::Requirement]
        );
    }

    /// A store whose `nth` project save (1-based) fails and every other
    /// save succeeds.
    fn store_failing_on_save(nth: usize) -> MockStore {
        let saves = Arc::new(AtomicUsize::new(0));
        let mut store = MockStore::new();
        store
            .expect_get_project()
            .returning(|_| Ok(Some(two_stage_project())));
        store.expect_save_project().returning(move |_| {
            if saves.fetch_add(1, Ordering::SeqCst) + 1 == nth {
                Err(WorkflowError::Persistence("disk full".to_string()))
            } else {
                Ok(())
            }
        });
        store.expect_save_artifacts().returning(|_, _| Ok(()));
        store
    }

    #[tokio::test]
    async fn test_failed_save_of_activation_returns_stage_to_pending() {
        let remote = Arc::new(ScriptedRemote::new());
        let engine =
            WorkflowEngine::builder(remote.clone(), Arc::new(store_failing_on_save(1))).build();

        let err = assert_err!(
            engine
                .execute_batch(PID, &["requirement", "design"], ExecutionContext::new(), None)
                .await
        );

        assert!(matches!(err, WorkflowError::Persistence(_)));
        assert!(remote.requests().is_empty());
        let project = assert_ok!(engine.project(PID).await);
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Pending);
        assert!(requirement.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_of_completion_returns_stage_to_pending() {
        let remote = Arc::new(ScriptedRemote::new());
        let events = Arc::new(CollectingEventSink::new());
        let engine = WorkflowEngine::builder(remote.clone(), Arc::new(store_failing_on_save(2)))
            .with_event_sink(events.clone())
            .build();

        let err = assert_err!(
            engine
                .execute_batch(PID, &["requirement", "design"], ExecutionContext::new(), None)
                .await
        );

        assert!(matches!(err, WorkflowError::Persistence(_)));
        assert_eq!(remote.executed_stages(), vec![StageId::Requirement]);
        let project = assert_ok!(engine.project(PID).await);
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Pending);
        assert!(requirement.artifacts.is_empty());
        assert!(requirement.completed_at.is_none());
        assert_eq!(stage(&project, &StageId::Design).status, StageStatus::Pending);
        let types = events.event_types();
        assert!(types.contains(&STAGE_ROLLED_BACK.to_string()));
        assert!(!types.contains(&STAGE_COMPLETED.to_string()));
    }

    #[tokio::test]
    async fn test_failed_save_on_rerun_keeps_earlier_results() {
        let remote = Arc::new(ScriptedRemote::new());
        // first run saves active then completed; the rerun's completion is the third save
        let engine =
            WorkflowEngine::builder(remote.clone(), Arc::new(store_failing_on_save(3))).build();
        let first = assert_ok!(engine.execute_stage(PID, "requirement", None).await);

        remote.set_tokens_per_artifact(99);
        assert_err!(engine.execute_stage(PID, "requirement", None).await);

        let project = assert_ok!(engine.project(PID).await);
        let requirement = stage(&project, &StageId::Requirement);
        assert_eq!(requirement.status, StageStatus::Completed);
        assert_eq!(requirement.artifacts, first.artifacts);
    }
}
