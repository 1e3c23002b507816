//! Execution context threading between stages.
//!
//! A stage execution receives an immutable [`ExecutionContext`]; once the
//! stage completes, [`ExecutionContext::with_stage_output`] derives the
//! context for the next stage.

mod builder;

pub use builder::{semantic_alias, ExecutionContext, CONVERSATION_KEY};
