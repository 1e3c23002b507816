//! Stale-execution recovery.
//!
//! A process that dies mid-batch leaves stages `active` forever. After
//! every applied snapshot the reconciler normalizes the project so the
//! user can run those stages again.

use crate::core::{Project, ProjectStatus, StageId, StageStatus};
use crate::utils::Timestamp;
use crate::workflow::transition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What [`normalize_execution_state`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Active stages returned to pending.
    pub reset_stages: Vec<StageId>,
    /// The project status before normalization.
    pub status_before: ProjectStatus,
    /// The project status after normalization.
    pub status_after: ProjectStatus,
}

impl RecoveryReport {
    /// Returns true if anything was modified.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.reset_stages.is_empty() || self.status_before != self.status_after
    }
}

fn is_stale(started_at: Option<Timestamp>, now: Timestamp, stale_after: Duration) -> bool {
    // nothing to age the stage by; treat it as abandoned
    started_at.map_or(true, |started| {
        now.signed_duration_since(started)
            .to_std()
            .is_ok_and(|age| age > stale_after)
    })
}

/// Resets abandoned executions and realigns the project status.
///
/// - when every active stage has been running longer than `stale_after`,
///   all of them return to pending (their timestamps are kept). A stage
///   without `started_at` is aged by the project's `updated_at`. One fresh
///   active stage means the run is still alive, so nothing is reset;
/// - a project whose stages are all completed becomes `completed`;
/// - an `in_progress` project with no active stage left becomes `active`.
pub fn normalize_execution_state(
    project: &mut Project,
    now: Timestamp,
    stale_after: Duration,
) -> RecoveryReport {
    let status_before = project.status;
    let updated_at = project.updated_at;
    let mut reset_stages = Vec::new();

    let active = project.workflow.active_stages();
    let abandoned = !active.is_empty()
        && project
            .workflow
            .stages()
            .iter()
            .filter(|stage| stage.status == StageStatus::Active)
            .all(|stage| is_stale(stage.started_at.or(Some(updated_at)), now, stale_after));

    if abandoned {
        for stage in project.workflow.stages_mut() {
            // active -> pending is always a legal transition
            if stage.status == StageStatus::Active
                && transition(stage, StageStatus::Pending, None, now).is_ok()
            {
                reset_stages.push(stage.id.clone());
            }
        }
    }

    if project.workflow.all_completed() {
        project.status = ProjectStatus::Completed;
    } else if !reset_stages.is_empty()
        || (project.status == ProjectStatus::InProgress
            && project.workflow.active_stages().is_empty())
    {
        project.status = ProjectStatus::Active;
    }

    RecoveryReport {
        reset_stages,
        status_before,
        status_after: project.status,
    }
}
