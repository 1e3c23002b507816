//! Event sink system for observability.
//!
//! Sinks are injected into the engine and reconciler; there is no global
//! sink. Event names are the constants in this module.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage became active.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage completed.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage returned to pending after a failed execution.
pub const STAGE_ROLLED_BACK: &str = "stage.rolled_back";
/// A batch started.
pub const BATCH_STARTED: &str = "batch.started";
/// A batch finished successfully.
pub const BATCH_COMPLETED: &str = "batch.completed";
/// A batch aborted.
pub const BATCH_FAILED: &str = "batch.failed";
/// A remote snapshot was applied.
pub const SYNC_APPLIED: &str = "sync.applied";
/// A polling tick failed.
pub const SYNC_FAILED: &str = "sync.failed";
/// Stale active stages were reset.
pub const SYNC_RECOVERED: &str = "sync.recovered";
