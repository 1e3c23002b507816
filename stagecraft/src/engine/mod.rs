//! Stage execution.
//!
//! [`WorkflowEngine`] owns the busy flag and orchestrates single-stage and
//! batch runs against the injected remote executor and project store.

mod cache;
mod executor;
mod guard;
mod results;

#[cfg(test)]
mod integration_tests;

pub use cache::{ProjectCache, SharedProject};
pub use executor::{WorkflowEngine, WorkflowEngineBuilder};
pub use results::{BatchResult, BatchStageResult, ExecutionMeta, StageExecutionResult};
