//! Stage-keyed artifact helpers used by the engine and the reconciler.

use crate::core::{Artifact, Stage, StageId};
use std::collections::{HashMap, HashSet};

/// Groups artifacts by owning stage, preserving order within each group.
///
/// Artifacts without a stage id are dropped.
#[must_use]
pub fn group_by_stage(artifacts: Vec<Artifact>) -> HashMap<StageId, Vec<Artifact>> {
    let mut grouped: HashMap<StageId, Vec<Artifact>> = HashMap::new();
    for artifact in artifacts {
        if let Some(stage_id) = artifact.stage_id.clone() {
            grouped.entry(stage_id).or_default().push(artifact);
        }
    }
    grouped
}

/// Stamps `stage_id` on every artifact that does not name an owner.
#[must_use]
pub fn assign_stage(artifacts: Vec<Artifact>, stage_id: &StageId) -> Vec<Artifact> {
    artifacts
        .into_iter()
        .map(|mut artifact| {
            if artifact.stage_id.is_none() {
                artifact.stage_id = Some(stage_id.clone());
            }
            artifact
        })
        .collect()
}

/// Gives each incoming artifact the id of an existing artifact of the same
/// type, so merging replaces that deliverable instead of adding a second one.
///
/// Each existing artifact is claimed at most once, in order. Incoming
/// artifacts that already carry an existing id, or have no counterpart,
/// keep their own id.
#[must_use]
pub fn adopt_existing_ids(incoming: Vec<Artifact>, existing: &[Artifact]) -> Vec<Artifact> {
    let mut claimed: HashSet<&str> = existing
        .iter()
        .filter(|e| incoming.iter().any(|a| a.id == e.id))
        .map(|e| e.id.as_str())
        .collect();

    let mut adopted = Vec::with_capacity(incoming.len());
    for mut artifact in incoming {
        if !claimed.contains(artifact.id.as_str()) {
            if let Some(previous) = existing.iter().find(|e| {
                e.artifact_type == artifact.artifact_type && !claimed.contains(e.id.as_str())
            }) {
                artifact.id.clone_from(&previous.id);
                claimed.insert(previous.id.as_str());
            }
        }
        adopted.push(artifact);
    }
    adopted
}

/// Removes the artifact with `artifact_id` from whichever stage holds it.
///
/// Returns the owning stage id if something was removed.
pub fn remove_artifact(stages: &mut [Stage], artifact_id: &str) -> Option<StageId> {
    for stage in stages.iter_mut() {
        if let Some(pos) = stage.artifacts.iter().position(|a| a.id == artifact_id) {
            let mut remaining = stage.artifacts.clone();
            remaining.remove(pos);
            stage.replace_artifacts(remaining);
            return Some(stage.id.clone());
        }
    }
    None
}

/// Sums the token counts of `artifacts`.
#[must_use]
pub fn total_tokens(artifacts: &[Artifact]) -> u64 {
    artifacts.iter().map(|a| a.tokens).sum()
}
