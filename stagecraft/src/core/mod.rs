//! Core types: identifiers, statuses, artifacts and the stage catalog.

mod aliases;
mod artifact;
mod catalog;
mod stage;
mod stage_id;
mod status;

pub use aliases::{aliases_of, normalize_stage_id, ALIAS_TABLE_VERSION, STAGE_ALIASES};
pub use artifact::{normalize_deliverable_key, Artifact, ArtifactType, MODEL_SOURCE};
pub use catalog::{stage_definition, StageDefinition};
pub use stage::{Project, Stage};
pub use stage_id::StageId;
pub use status::{ProjectStatus, StageStatus};
