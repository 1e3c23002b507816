//! Static catalog of built-in stages.

use super::{ArtifactType, StageId};
use serde::Serialize;

/// Static metadata for a built-in stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    /// Canonical id.
    pub id: StageId,
    /// Display name.
    pub name: &'static str,
    /// Short description of the work the stage covers.
    pub description: &'static str,
    /// Display icon.
    pub icon: &'static str,
    /// Deliverable types the stage can produce.
    pub artifact_types: &'static [ArtifactType],
}

const REQUIREMENT_TYPES: &[ArtifactType] = &[
    ArtifactType::ResearchAnalysisDoc,
    ArtifactType::Prd,
    ArtifactType::UserStory,
    ArtifactType::FeatureList,
    ArtifactType::CorePromptDesign,
];
const STRATEGY_TYPES: &[ArtifactType] = &[ArtifactType::StrategyDoc];
const DESIGN_TYPES: &[ArtifactType] = &[
    ArtifactType::UiDesign,
    ArtifactType::Prototype,
    ArtifactType::DesignSpec,
];
const ARCHITECTURE_TYPES: &[ArtifactType] = &[
    ArtifactType::ArchitectureDoc,
    ArtifactType::ApiSpec,
    ArtifactType::TechStack,
];
const DEVELOPMENT_TYPES: &[ArtifactType] = &[
    ArtifactType::FrontendCode,
    ArtifactType::BackendCode,
    ArtifactType::ApiDoc,
    ArtifactType::ComponentLib,
    ArtifactType::FrontendDoc,
    ArtifactType::BackendDoc,
];
const TESTING_TYPES: &[ArtifactType] = &[
    ArtifactType::TestReport,
    ArtifactType::BugList,
    ArtifactType::PerformanceReport,
];
const DEPLOYMENT_TYPES: &[ArtifactType] = &[
    ArtifactType::DeployDoc,
    ArtifactType::EnvConfig,
    ArtifactType::ReleaseNotes,
];
const OPERATION_TYPES: &[ArtifactType] = &[
    ArtifactType::MarketingPlan,
    ArtifactType::GrowthStrategy,
    ArtifactType::AnalyticsReport,
];

impl StageId {
    /// Returns the static definition, or `None` for custom stages.
    #[must_use]
    pub fn definition(&self) -> Option<StageDefinition> {
        let (name, description, icon, artifact_types) = match self {
            Self::Requirement => (
                "Requirement Analysis",
                "Product positioning, user analysis and feature planning",
                "📋",
                REQUIREMENT_TYPES,
            ),
            Self::Strategy => (
                "Strategy Design",
                "Strategy design built on the PRD, including challenge responses",
                "🎯",
                STRATEGY_TYPES,
            ),
            Self::Design => (
                "Product Design",
                "UI/UX design, interactive prototypes and visual guidelines",
                "🎨",
                DESIGN_TYPES,
            ),
            Self::Architecture => (
                "Architecture Design",
                "System architecture, technology selection and API specification",
                "🏗️",
                ARCHITECTURE_TYPES,
            ),
            Self::Development => (
                "Development",
                "Frontend and backend implementation",
                "💻",
                DEVELOPMENT_TYPES,
            ),
            Self::Testing => (
                "Testing",
                "Functional testing, performance testing and bug fixing",
                "🧪",
                TESTING_TYPES,
            ),
            Self::Deployment => (
                "Deployment",
                "Environment configuration, server deployment and release",
                "🚀",
                DEPLOYMENT_TYPES,
            ),
            Self::Operation => (
                "Operation",
                "Marketing, user operations and data analysis",
                "📈",
                OPERATION_TYPES,
            ),
            Self::Custom(_) => return None,
        };

        Some(StageDefinition {
            id: self.clone(),
            name,
            description,
            icon,
            artifact_types,
        })
    }

    /// Deliverable types the stage can produce (empty for custom stages).
    #[must_use]
    pub fn expected_artifact_types(&self) -> &'static [ArtifactType] {
        self.definition().map_or(&[], |def| def.artifact_types)
    }
}

/// Looks up the static definition for a raw stage id (aliases accepted).
#[must_use]
pub fn stage_definition(stage_id: &str) -> Option<StageDefinition> {
    StageId::parse(stage_id).definition()
}
