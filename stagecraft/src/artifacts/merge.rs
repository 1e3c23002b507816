//! Merging incoming artifact lists into existing ones.

use crate::core::Artifact;
use std::collections::HashMap;

/// Merges `incoming` into `existing`, keyed by artifact id.
///
/// An incoming artifact whose id is already present replaces the existing
/// one at the same position; the rest are appended in incoming order. If
/// `incoming` repeats an id, the last occurrence wins.
///
/// # Examples
///
/// ```
/// use stagecraft::artifacts::merge_artifacts;
/// use stagecraft::core::{Artifact, ArtifactType, StageId};
///
/// let a = Artifact::new("a", StageId::Design, ArtifactType::UiDesign, "v1");
/// let a2 = Artifact::new("a", StageId::Design, ArtifactType::UiDesign, "v2");
/// let b = Artifact::new("b", StageId::Design, ArtifactType::Prototype, "p");
///
/// let merged = merge_artifacts(&[a], &[a2, b]);
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].content, "v2");
/// ```
#[must_use]
pub fn merge_artifacts(existing: &[Artifact], incoming: &[Artifact]) -> Vec<Artifact> {
    let mut merged: Vec<Artifact> = existing.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(idx, artifact)| (artifact.id.clone(), idx))
        .collect();

    for artifact in incoming {
        match positions.get(&artifact.id) {
            Some(&idx) => merged[idx] = artifact.clone(),
            None => {
                positions.insert(artifact.id.clone(), merged.len());
                merged.push(artifact.clone());
            }
        }
    }

    merged
}
