//! The per-stage status state machine.

use crate::artifacts::merge_artifacts;
use crate::core::{Artifact, Stage, StageStatus};
use crate::errors::{InvalidTransitionError, WorkflowError};
use crate::utils::Timestamp;

/// What a call to [`transition`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Status before the call.
    pub from: StageStatus,
    /// Status after the call.
    pub to: StageStatus,
    /// True if the artifact list was modified.
    pub artifacts_changed: bool,
}

impl TransitionOutcome {
    /// Returns true if the status changed.
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }

    /// Returns true if this was a failure rollback.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.from == StageStatus::Active && self.to == StageStatus::Pending
    }
}

/// Moves `stage` to `next`, merging `artifacts` into it.
///
/// - Entering `active` stamps `started_at` if unset.
/// - Entering `completed` stamps `completed_at` if unset.
/// - Re-entering the current status only merges artifacts.
/// - Timestamps are never cleared, including on rollback.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidTransition`] for any move other than
/// pending→active, active→completed, active→pending or a same-state call.
pub fn transition(
    stage: &mut Stage,
    next: StageStatus,
    artifacts: Option<Vec<Artifact>>,
    now: Timestamp,
) -> Result<TransitionOutcome, WorkflowError> {
    let from = stage.status;
    if !from.can_transition_to(next) {
        return Err(InvalidTransitionError::new(stage.id.clone(), from, next).into());
    }

    match next {
        StageStatus::Active if stage.started_at.is_none() => stage.started_at = Some(now),
        StageStatus::Completed if stage.completed_at.is_none() => stage.completed_at = Some(now),
        _ => {}
    }
    stage.status = next;

    let artifacts_changed = match artifacts {
        Some(incoming) if !incoming.is_empty() => {
            let merged = merge_artifacts(&stage.artifacts, &incoming);
            let changed = merged != stage.artifacts;
            if changed {
                stage.replace_artifacts(merged);
            }
            changed
        }
        _ => false,
    };

    Ok(TransitionOutcome {
        from,
        to: next,
        artifacts_changed,
    })
}
