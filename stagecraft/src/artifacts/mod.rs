//! Artifact store and merger.
//!
//! Stages own their artifact lists; this module holds the rules for
//! combining, grouping and removing them.

mod merge;
mod store;

pub use merge::merge_artifacts;
pub use store::{adopt_existing_ids, assign_stage, group_by_stage, remove_artifact, total_tokens};
