//! Progress reporting port.

use crate::core::{StageId, StageStatus};

/// Receives `(stage, status, index)` at every stage transition of a run.
///
/// `index` is the stage's position within the running batch. The engine
/// does not depend on what the reporter does.
pub trait ProgressReporter: Send + Sync {
    /// Called after a stage transition has been applied and persisted.
    fn on_progress(&self, stage_id: &StageId, status: StageStatus, index: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(&StageId, StageStatus, usize) + Send + Sync,
{
    fn on_progress(&self, stage_id: &StageId, status: StageStatus, index: usize) {
        self(stage_id, status, index);
    }
}

/// A reporter that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    fn on_progress(&self, _stage_id: &StageId, _status: StageStatus, _index: usize) {}
}
