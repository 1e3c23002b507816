//! Deliverable selection manager.

use crate::core::{ArtifactType, Stage, StageId, StageStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Returns the selected types that have no matching artifact on `stage`.
///
/// The diff is against the stage's current artifacts, not its history, so
/// deleting an artifact makes its type missing again immediately.
#[must_use]
pub fn missing_deliverables(selected: &BTreeSet<ArtifactType>, stage: &Stage) -> Vec<ArtifactType> {
    selected
        .iter()
        .filter(|kind| !stage.has_artifact_of(kind))
        .cloned()
        .collect()
}

/// Per-deliverable state shown next to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableState {
    /// An artifact of this type exists.
    Generated,
    /// Selected, and the stage is running.
    Generating,
    /// Selected, not generated yet.
    Pending,
    /// Not selected.
    Unselected,
}

/// One row of a stage's deliverable checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableStatusItem {
    /// The deliverable type.
    pub artifact_type: ArtifactType,
    /// Display label.
    pub label: String,
    /// Whether the operator selected it.
    pub selected: bool,
    /// Derived state.
    pub state: DeliverableState,
}

/// Selected vs generated counts for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableProgress {
    /// Number of selected types.
    pub selected_count: usize,
    /// Number of selected types with an artifact.
    pub generated_count: usize,
}

impl DeliverableProgress {
    /// Returns true when every selected type has been generated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.generated_count >= self.selected_count
    }
}

/// Serialisable form of one selection, for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    /// Project id.
    pub project_id: String,
    /// Stage id.
    pub stage_id: StageId,
    /// Selected types.
    pub types: Vec<ArtifactType>,
}

/// Tracks selected artifact types per `(project, stage)`.
///
/// Selection is independent of stage status: types can be chosen for a
/// stage that has not run yet.
#[derive(Debug, Default)]
pub struct DeliverableSelection {
    selections: RwLock<HashMap<(String, StageId), BTreeSet<ArtifactType>>>,
}

impl DeliverableSelection {
    /// Creates an empty selection manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(project_id: &str, stage_id: &StageId) -> (String, StageId) {
        (project_id.to_string(), stage_id.clone())
    }

    /// Returns the selected types for a stage.
    #[must_use]
    pub fn selected(&self, project_id: &str, stage_id: &StageId) -> BTreeSet<ArtifactType> {
        self.selections
            .read()
            .get(&Self::key(project_id, stage_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if anything is selected for the stage.
    #[must_use]
    pub fn has_selection(&self, project_id: &str, stage_id: &StageId) -> bool {
        self.selections
            .read()
            .get(&Self::key(project_id, stage_id))
            .is_some_and(|set| !set.is_empty())
    }

    /// Flips membership of `kind` and returns whether it is now selected.
    pub fn toggle(&self, project_id: &str, stage_id: &StageId, kind: ArtifactType) -> bool {
        let mut selections = self.selections.write();
        let set = selections.entry(Self::key(project_id, stage_id)).or_default();
        if set.remove(&kind) {
            false
        } else {
            set.insert(kind);
            true
        }
    }

    /// Replaces the selection for a stage.
    pub fn set_selected(
        &self,
        project_id: &str,
        stage_id: &StageId,
        kinds: impl IntoIterator<Item = ArtifactType>,
    ) {
        self.selections
            .write()
            .insert(Self::key(project_id, stage_id), kinds.into_iter().collect());
    }

    /// Clears the selection for a stage.
    pub fn clear(&self, project_id: &str, stage_id: &StageId) {
        self.selections.write().remove(&Self::key(project_id, stage_id));
    }

    /// Clears every selection of a project.
    pub fn clear_project(&self, project_id: &str) {
        self.selections.write().retain(|(project, _), _| project != project_id);
    }

    /// Selected types with no matching artifact on `stage` yet.
    #[must_use]
    pub fn missing(&self, project_id: &str, stage: &Stage) -> Vec<ArtifactType> {
        missing_deliverables(&self.selected(project_id, &stage.id), stage)
    }

    /// Builds the deliverable checklist for a stage: every catalog type
    /// for the stage followed by selected types outside the catalog.
    #[must_use]
    pub fn status_items(&self, project_id: &str, stage: &Stage) -> Vec<DeliverableStatusItem> {
        let selected = self.selected(project_id, &stage.id);
        let expected = stage.id.expected_artifact_types();
        let extras = selected.iter().filter(|kind| !expected.contains(kind));

        expected
            .iter()
            .chain(extras)
            .map(|kind| {
                let is_selected = selected.contains(kind);
                let state = if stage.has_artifact_of(kind) {
                    DeliverableState::Generated
                } else if !is_selected {
                    DeliverableState::Unselected
                } else if stage.status == StageStatus::Active {
                    DeliverableState::Generating
                } else {
                    DeliverableState::Pending
                };
                DeliverableStatusItem {
                    artifact_type: kind.clone(),
                    label: kind.display_name(),
                    selected: is_selected,
                    state,
                }
            })
            .collect()
    }

    /// Selected vs generated counts for a stage.
    #[must_use]
    pub fn progress(&self, project_id: &str, stage: &Stage) -> DeliverableProgress {
        let selected = self.selected(project_id, &stage.id);
        let generated_count = selected.iter().filter(|k| stage.has_artifact_of(k)).count();
        DeliverableProgress {
            selected_count: selected.len(),
            generated_count,
        }
    }

    /// Exports every non-empty selection, sorted for stable output.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SelectionEntry> {
        let mut entries: Vec<SelectionEntry> = self
            .selections
            .read()
            .iter()
            .filter(|(_, types)| !types.is_empty())
            .map(|((project_id, stage_id), types)| SelectionEntry {
                project_id: project_id.clone(),
                stage_id: stage_id.clone(),
                types: types.iter().cloned().collect(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.project_id.as_str(), &a.stage_id).cmp(&(b.project_id.as_str(), &b.stage_id))
        });
        entries
    }

    /// Replaces all selections with `entries`.
    pub fn restore(&self, entries: Vec<SelectionEntry>) {
        let restored: HashMap<(String, StageId), BTreeSet<ArtifactType>> = entries
            .into_iter()
            .map(|entry| {
                (
                    (entry.project_id, entry.stage_id),
                    entry.types.into_iter().collect(),
                )
            })
            .collect();
        *self.selections.write() = restored;
    }
}
