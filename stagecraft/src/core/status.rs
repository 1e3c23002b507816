//! Stage and project status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started, or rolled back after a failed execution.
    #[default]
    Pending,
    /// Currently being generated.
    Active,
    /// Finished with artifacts attached.
    Completed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status is terminal for normal flow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    ///
    /// Staying in the same state is always allowed. `Active -> Pending`
    /// is the failure rollback.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Active)
                | (Self::Active, Self::Active | Self::Completed | Self::Pending)
                | (Self::Completed, Self::Completed)
        )
    }
}

/// The lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Created, not currently running a full workflow.
    #[default]
    Active,
    /// A full workflow run is in progress.
    InProgress,
    /// Every stage is completed.
    Completed,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}
