//! Error types for workflow execution.
//!
//! The taxonomy follows what a caller has to react to: a stage that is
//! locked behind unfinished dependencies, an engine that is already busy,
//! a failed remote generation call, and polling failures. Structured
//! errors carry an [`ErrorInfo`] with a stable code and a fix hint.

use crate::core::{StageId, StageStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stage cannot start because dependencies are not completed.
    #[error("{0}")]
    DependencyBlocked(#[from] DependencyBlockedError),

    /// An execution is already in flight on this engine.
    #[error("{0}")]
    Busy(#[from] BusyError),

    /// The remote generation service failed.
    #[error("{0}")]
    RemoteCall(#[from] RemoteCallError),

    /// A status change the state machine does not allow.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// The stage graph is malformed.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// A polling tick failed to refresh the local view.
    #[error("Reconciliation failed for project '{project_id}': {message}")]
    Reconciliation {
        /// The project being synchronised.
        project_id: String,
        /// What went wrong.
        message: String,
    },

    /// The requested stage does not exist in the project graph.
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// The requested project does not exist.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// The persistence collaborator failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl WorkflowError {
    /// Creates a reconciliation error.
    #[must_use]
    pub fn reconciliation(project_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reconciliation {
            project_id: project_id.into(),
            message: message.into(),
        }
    }

    /// Returns the structured error info, if this error carries one.
    #[must_use]
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::DependencyBlocked(err) => Some(&err.error_info),
            Self::Busy(err) => Some(&err.error_info),
            Self::InvalidTransition(err) => Some(&err.error_info),
            Self::Validation(err) => err.error_info.as_ref(),
            _ => None,
        }
    }

    /// Returns the stage the error is about, if known.
    #[must_use]
    pub fn stage_id(&self) -> Option<&StageId> {
        match self {
            Self::DependencyBlocked(err) => Some(&err.stage_id),
            Self::RemoteCall(err) => err.stage_id.as_ref(),
            Self::InvalidTransition(err) => Some(&err.stage_id),
            _ => None,
        }
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::RemoteCall(_) | Self::Reconciliation { .. } | Self::Persistence(_)
        )
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "WORKFLOW-001-BLOCKED").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info. The fix hint defaults to the registered
    /// suggestion for `code`, if any.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        let code = code.into();
        let fix_hint = ErrorSuggestions::get(&code).map(str::to_string);
        Self {
            code,
            summary: summary.into(),
            fix_hint,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

/// Error code for a dependency-blocked stage.
pub const CODE_DEPENDENCY_BLOCKED: &str = "WORKFLOW-001-BLOCKED";
/// Error code for a busy engine.
pub const CODE_BUSY: &str = "WORKFLOW-002-BUSY";
/// Error code for a rejected status change.
pub const CODE_INVALID_TRANSITION: &str = "WORKFLOW-003-TRANSITION";
/// Error code for a dependency cycle.
pub const CODE_CYCLE: &str = "WORKFLOW-004-CYCLE";
/// Error code for a dependency on a stage not in the graph.
pub const CODE_UNKNOWN_DEPENDENCY: &str = "WORKFLOW-004-UNKNOWN_DEP";
/// Error code for duplicated stage ids.
pub const CODE_DUPLICATE_STAGE: &str = "WORKFLOW-004-DUPLICATE";
/// Error code for an empty graph.
pub const CODE_EMPTY_GRAPH: &str = "WORKFLOW-004-EMPTY";

/// Raised when a stage is triggered before its dependencies completed.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage_id}' is blocked by unfinished dependencies: {}", missing.join(", "))]
pub struct DependencyBlockedError {
    /// The blocked stage.
    pub stage_id: StageId,
    /// Display names of the dependencies that are not completed.
    pub missing: Vec<String>,
    /// Structured info.
    pub error_info: ErrorInfo,
}

impl DependencyBlockedError {
    /// Creates a new dependency-blocked error.
    #[must_use]
    pub fn new(stage_id: StageId, missing: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            CODE_DEPENDENCY_BLOCKED,
            format!("Complete {} before starting '{stage_id}'", missing.join(", ")),
        )
        .with_context_entry("stage_id", stage_id.as_str());
        Self {
            stage_id,
            missing,
            error_info: info,
        }
    }
}

/// Raised when an execution is requested while another is in flight.
#[derive(Debug, Clone, Error)]
#[error("Workflow engine is busy: {operation} rejected while another execution is running")]
pub struct BusyError {
    /// The rejected operation.
    pub operation: String,
    /// Structured info.
    pub error_info: ErrorInfo,
}

impl BusyError {
    /// Creates a new busy error.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let info = ErrorInfo::new(CODE_BUSY, "An execution is already in progress")
            .with_context_entry("operation", operation.clone());
        Self {
            operation,
            error_info: info,
        }
    }
}

/// Raised when the remote generation service fails.
#[derive(Debug, Clone, Error)]
pub struct RemoteCallError {
    /// The stage being generated, when the call was stage-scoped.
    pub stage_id: Option<StageId>,
    /// Failure description.
    pub message: String,
    /// HTTP status, when the transport reported one.
    pub status: Option<u16>,
}

impl RemoteCallError {
    /// Creates a new remote-call error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage_id: None,
            message: message.into(),
            status: None,
        }
    }

    /// Attaches the failing stage.
    #[must_use]
    pub fn with_stage(mut self, stage_id: StageId) -> Self {
        self.stage_id = Some(stage_id);
        self
    }

    /// Attaches the transport status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage_id {
            Some(ref stage_id) => write!(
                f,
                "Remote call failed for stage '{stage_id}': {}",
                self.message
            ),
            None => write!(f, "Remote call failed: {}", self.message),
        }
    }
}

/// Raised when the state machine rejects a status change.
#[derive(Debug, Clone, Error)]
#[error("Invalid transition for stage '{stage_id}': {from} -> {to}")]
pub struct InvalidTransitionError {
    /// The stage.
    pub stage_id: StageId,
    /// Current status.
    pub from: StageStatus,
    /// Requested status.
    pub to: StageStatus,
    /// Structured info.
    pub error_info: ErrorInfo,
}

impl InvalidTransitionError {
    /// Creates a new invalid-transition error.
    #[must_use]
    pub fn new(stage_id: StageId, from: StageStatus, to: StageStatus) -> Self {
        let info = ErrorInfo::new(
            CODE_INVALID_TRANSITION,
            format!("Stage '{stage_id}' cannot move from {from} to {to}"),
        );
        Self {
            stage_id,
            from,
            to,
            error_info: info,
        }
    }
}

/// Raised when a stage graph fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional structured info.
    pub error_info: Option<ErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new graph validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the structured info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Creates a cycle error from the offending path.
    #[must_use]
    pub fn cycle(cycle_path: Vec<String>) -> Self {
        let summary = format!(
            "Stage graph contains a dependency cycle: {}",
            cycle_path.join(" -> ")
        );
        Self::new(summary.clone())
            .with_stages(cycle_path)
            .with_error_info(ErrorInfo::new(CODE_CYCLE, summary))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("stages".to_string(), serde_json::json!(self.stages));
        if let Some(ref info) = self.error_info {
            let info_map: serde_json::Map<String, serde_json::Value> =
                info.to_dict().into_iter().collect();
            map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        }
        map
    }
}

/// Provides default suggestions for error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            CODE_DEPENDENCY_BLOCKED => Some(
                "Run the listed dependency stages first, or execute them together in one batch.",
            ),
            CODE_BUSY => Some("Wait for the running execution to finish, then try again."),
            CODE_INVALID_TRANSITION => Some(
                "Stages move pending -> active -> completed; only a failed active stage returns to pending.",
            ),
            CODE_CYCLE => Some(
                "Remove one of the dependencies in the cycle. Workflows are usually a linear chain.",
            ),
            CODE_UNKNOWN_DEPENDENCY => Some(
                "Every dependency must reference a stage in the same workflow. Check for typos.",
            ),
            CODE_DUPLICATE_STAGE => Some(
                "Stage ids must be unique after alias normalization (e.g. 'qa' and 'testing' collide).",
            ),
            CODE_EMPTY_GRAPH => Some("Add at least one stage to the workflow."),
            _ => None,
        }
    }
}
