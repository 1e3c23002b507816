//! Reconciliation of local project state with the remote service.

mod reconciler;
mod recovery;

pub use reconciler::{ArtifactReconciler, SyncReport};
pub use recovery::{normalize_execution_state, RecoveryReport};
