//! # Stagecraft
//!
//! A dependency-aware execution engine for multi-stage project workflows.
//!
//! A project owns a graph of stages (requirement, design, architecture and
//! so on). Each stage produces artifacts through a remote generation
//! service. Stagecraft provides:
//!
//! - **Stage graph and state machine**: dependency resolution and
//!   `pending -> active -> completed` transitions with rollback
//! - **Batch execution**: ordered runs where every stage's output feeds
//!   the next stage's context
//! - **Artifact merging**: repeated executions accumulate artifacts by id
//! - **Deliverable selection**: per-stage opt-in of artifact types and
//!   detection of what is still missing
//! - **Reconciliation**: polling the remote service to catch up a local view
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagecraft::prelude::*;
//!
//! let config = EngineConfig::default();
//! let remote = Arc::new(HttpRemoteExecutor::new(&config)?);
//! let store = Arc::new(InMemoryProjectStore::new());
//! let engine = WorkflowEngine::builder(remote, store).with_config(config).build();
//!
//! engine.register_project(Project::from_template("p1", "Todo app")).await?;
//! let result = engine.execute_all_stages("p1", "Build a todo app", None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod config;
pub mod context;
pub mod core;
pub mod deliverables;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod ports;
pub mod sync;
pub mod testing;
pub mod utils;
pub mod workflow;

#[cfg(feature = "http")]
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::merge_artifacts;
    pub use crate::config::{EngineConfig, LoggingConfig};
    pub use crate::context::ExecutionContext;
    pub use crate::core::{
        Artifact, ArtifactType, Project, ProjectStatus, Stage, StageDefinition, StageId,
        StageStatus,
    };
    pub use crate::deliverables::{DeliverableSelection, DeliverableState};
    pub use crate::engine::{BatchResult, StageExecutionResult, WorkflowEngine};
    pub use crate::errors::{
        BusyError, DependencyBlockedError, RemoteCallError, WorkflowError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_tracing;
    pub use crate::ports::{
        InMemoryProjectStore, ProgressReporter, ProjectStore, RemoteExecutor,
        StageExecutionRequest,
    };
    #[cfg(feature = "http")]
    pub use crate::remote::HttpRemoteExecutor;
    pub use crate::sync::ArtifactReconciler;
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
    pub use crate::workflow::StageGraph;
    pub use std::sync::Arc;
}
