//! The stage graph: an ordered list of stages with declared dependencies.

use crate::core::{Stage, StageId, StageStatus};
use crate::errors::{
    DependencyBlockedError, ErrorInfo, GraphValidationError, WorkflowError, CODE_DUPLICATE_STAGE,
    CODE_EMPTY_GRAPH, CODE_UNKNOWN_DEPENDENCY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered list of stages with declared dependencies.
///
/// Declaration order is significant: it is the order in which
/// executable stages are reported and the tie-breaker for topological
/// ordering. Every lookup normalizes the incoming id first, so
/// historical aliases resolve to the same stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Creates a graph without validation.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Creates the default template: every built-in stage, each depending
    /// on the one before it.
    #[must_use]
    pub fn from_template() -> Self {
        let mut stages: Vec<Stage> = Vec::with_capacity(StageId::KNOWN.len());
        for id in StageId::KNOWN {
            let stage = match stages.last() {
                Some(previous) => Stage::new(id).depends_on(previous.id.clone()),
                None => Stage::new(id),
            };
            stages.push(stage);
        }
        Self { stages }
    }

    /// Creates a graph from a customized stage list and validates it.
    pub fn customized(stages: Vec<Stage>) -> Result<Self, WorkflowError> {
        let graph = Self { stages };
        graph.validate()?;
        Ok(graph)
    }

    /// Checks for emptiness, duplicate ids, unknown dependencies and cycles.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        if self.stages.is_empty() {
            return Err(GraphValidationError::new("Workflow has no stages")
                .with_error_info(ErrorInfo::new(CODE_EMPTY_GRAPH, "Workflow has no stages")));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(&stage.id) {
                let summary = format!("Duplicate stage id '{}'", stage.id);
                return Err(GraphValidationError::new(summary.clone())
                    .with_stages(vec![stage.id.to_string()])
                    .with_error_info(ErrorInfo::new(CODE_DUPLICATE_STAGE, summary)));
            }
        }

        for stage in &self.stages {
            for dep in &stage.dependencies {
                if !seen.contains(dep) {
                    let summary =
                        format!("Stage '{}' depends on unknown stage '{dep}'", stage.id);
                    return Err(GraphValidationError::new(summary.clone())
                        .with_stages(vec![stage.id.to_string(), dep.to_string()])
                        .with_error_info(ErrorInfo::new(CODE_UNKNOWN_DEPENDENCY, summary)));
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(GraphValidationError::cycle(cycle));
        }

        Ok(())
    }

    /// Returns the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns mutable access to the stages.
    pub fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by raw id (aliases accepted).
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<&Stage> {
        self.stage(&StageId::parse(stage_id))
    }

    /// Looks up a stage by raw id for mutation (aliases accepted).
    pub fn get_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.stage_mut(&StageId::parse(stage_id))
    }

    /// Looks up a stage by canonical id.
    #[must_use]
    pub fn stage(&self, id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.id == id)
    }

    /// Looks up a stage by canonical id for mutation.
    pub fn stage_mut(&mut self, id: &StageId) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| &s.id == id)
    }

    /// Like [`Self::stage`] but reports a missing stage as an error.
    pub fn require(&self, id: &StageId) -> Result<&Stage, WorkflowError> {
        self.stage(id)
            .ok_or_else(|| WorkflowError::StageNotFound(id.to_string()))
    }

    /// Like [`Self::stage_mut`] but reports a missing stage as an error.
    pub fn require_mut(&mut self, id: &StageId) -> Result<&mut Stage, WorkflowError> {
        self.stage_mut(id)
            .ok_or_else(|| WorkflowError::StageNotFound(id.to_string()))
    }

    /// Returns the pending stages whose dependencies are all completed,
    /// in declaration order.
    #[must_use]
    pub fn resolve_executable_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|stage| stage.status == StageStatus::Pending)
            .filter(|stage| self.find_unmet_dependencies(stage).is_empty())
            .map(|stage| stage.id.clone())
            .collect()
    }

    /// Returns the display names of `stage`'s dependencies that are not
    /// completed yet.
    ///
    /// A dependency that is not part of this graph cannot be satisfied or
    /// waited on and is not reported.
    #[must_use]
    pub fn find_unmet_dependencies(&self, stage: &Stage) -> Vec<String> {
        stage
            .dependencies
            .iter()
            .filter_map(|dep| self.stage(dep))
            .filter(|dep| dep.status != StageStatus::Completed)
            .map(|dep| dep.name.clone())
            .collect()
    }

    /// Fails with [`WorkflowError::DependencyBlocked`] when `id` has unmet
    /// dependencies.
    pub fn ensure_unblocked(&self, id: &StageId) -> Result<(), WorkflowError> {
        let stage = self.require(id)?;
        let missing = self.find_unmet_dependencies(stage);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DependencyBlockedError::new(id.clone(), missing).into())
        }
    }

    /// Returns every stage id in dependency order, ties broken by
    /// declaration order.
    #[must_use]
    pub fn topological_order(&self) -> Vec<StageId> {
        fn visit(
            graph: &StageGraph,
            id: &StageId,
            visited: &mut HashSet<StageId>,
            in_progress: &mut HashSet<StageId>,
            result: &mut Vec<StageId>,
        ) {
            if visited.contains(id) || in_progress.contains(id) {
                return;
            }
            in_progress.insert(id.clone());
            if let Some(stage) = graph.stage(id) {
                for dep in &stage.dependencies {
                    visit(graph, dep, visited, in_progress, result);
                }
                result.push(id.clone());
            }
            in_progress.remove(id);
            visited.insert(id.clone());
        }

        let mut result = Vec::with_capacity(self.stages.len());
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        for stage in &self.stages {
            visit(self, &stage.id, &mut visited, &mut in_progress, &mut result);
        }
        result
    }

    /// Returns the pending stage ids in dependency order.
    #[must_use]
    pub fn pending_in_order(&self) -> Vec<StageId> {
        self.topological_order()
            .into_iter()
            .filter(|id| {
                self.stage(id)
                    .is_some_and(|stage| stage.status == StageStatus::Pending)
            })
            .collect()
    }

    /// Returns the ids of stages currently active.
    #[must_use]
    pub fn active_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Active)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Returns true if the graph is non-empty and every stage is completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        !self.stages.is_empty()
            && self
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Completed)
    }

    /// Completed stages as a rounded percentage of all stages.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        if self.stages.is_empty() {
            return 0;
        }
        let completed = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        let percent = (completed * 200 + self.stages.len()) / (self.stages.len() * 2);
        u8::try_from(percent).unwrap_or(100)
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        fn walk(
            graph: &StageGraph,
            id: &StageId,
            path: &mut Vec<StageId>,
            done: &mut HashSet<StageId>,
        ) -> Option<Vec<String>> {
            if let Some(pos) = path.iter().position(|p| p == id) {
                let mut cycle: Vec<String> = path[pos..].iter().map(ToString::to_string).collect();
                cycle.push(id.to_string());
                return Some(cycle);
            }
            if done.contains(id) {
                return None;
            }
            path.push(id.clone());
            if let Some(stage) = graph.stage(id) {
                for dep in &stage.dependencies {
                    if let Some(cycle) = walk(graph, dep, path, done) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            done.insert(id.clone());
            None
        }

        let mut done = HashSet::new();
        self.stages
            .iter()
            .find_map(|stage| walk(self, &stage.id, &mut Vec::new(), &mut done))
    }
}
