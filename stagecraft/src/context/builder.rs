//! Execution context builder.

use crate::core::{Artifact, StageId, StageStatus};
use crate::workflow::StageGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key under which the original conversation/brief is seeded.
pub const CONVERSATION_KEY: &str = "CONVERSATION";

/// Returns the semantic alias for pipeline stages whose output is
/// addressed by meaning in downstream prompts.
#[must_use]
pub fn semantic_alias(stage_id: &StageId) -> Option<&'static str> {
    match stage_id {
        StageId::Requirement => Some("PRD"),
        StageId::Design => Some("DESIGN"),
        StageId::Architecture => Some("ARCHITECTURE"),
        StageId::Development => Some("DEVELOPMENT"),
        _ => None,
    }
}

/// Symbolic key to content mapping passed to each stage execution.
///
/// Values are never mutated in place: every amendment returns a new
/// context, so the context a stage ran with stays intact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the conversation/brief.
    #[must_use]
    pub fn seeded(conversation: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(CONVERSATION_KEY.to_string(), conversation.into());
        Self { values }
    }

    /// Rebuilds the context a stage would see after every completed stage
    /// in `graph`, in dependency order.
    #[must_use]
    pub fn from_completed_stages(graph: &StageGraph, conversation: Option<&str>) -> Self {
        let base = conversation.map_or_else(Self::new, Self::seeded);
        graph
            .topological_order()
            .iter()
            .filter_map(|id| graph.stage(id))
            .filter(|stage| stage.status == StageStatus::Completed)
            .fold(base, |ctx, stage| match stage.primary_artifact() {
                Some(artifact) => ctx.with_stage_output(&stage.id, artifact),
                None => ctx,
            })
    }

    /// Returns a new context extended with a completed stage's primary
    /// artifact.
    ///
    /// The artifact content is stored under the stage's generic key and,
    /// for pipeline stages, under its semantic alias as well. The seeded
    /// conversation is never overwritten.
    #[must_use]
    pub fn with_stage_output(&self, stage_id: &StageId, artifact: &Artifact) -> Self {
        let mut next = self.clone();
        next.insert(stage_id.context_key(), &artifact.content);
        if let Some(alias) = semantic_alias(stage_id) {
            next.insert(alias.to_string(), &artifact.content);
        }
        next
    }

    /// Returns a new context with an extra entry. Ignored for the
    /// conversation key once it is seeded.
    #[must_use]
    pub fn with_entry(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.insert(key.into(), &value.into());
        next
    }

    fn insert(&mut self, key: String, value: &str) {
        if key == CONVERSATION_KEY && self.values.contains_key(CONVERSATION_KEY) {
            tracing::debug!(key = %key, "Refusing to overwrite seeded conversation");
            return;
        }
        self.values.insert(key, value.to_string());
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the seeded conversation.
    #[must_use]
    pub fn conversation(&self) -> Option<&str> {
        self.get(CONVERSATION_KEY)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns all keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}
