//! Artifacts and deliverable types.

use crate::core::StageId;
use crate::utils::timestamps::deserialize_flexible;
use crate::utils::{generate_uuid_v7, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Normalizes a deliverable tag for comparison (trim + lower-case).
#[must_use]
pub fn normalize_deliverable_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

macro_rules! artifact_types {
    ($($(#[$doc:meta])* $variant:ident => $tag:literal),+ $(,)?) => {
        /// A deliverable-type tag.
        ///
        /// Known tags are closed variants; unrecognised tags are kept as
        /// [`ArtifactType::Custom`] in normalized form.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum ArtifactType {
            $($(#[$doc])* $variant,)+
            /// A tag outside the built-in catalog.
            Custom(String),
        }

        impl ArtifactType {
            /// Every built-in tag.
            pub const KNOWN: &'static [Self] = &[$(Self::$variant),+];

            /// Parses a raw tag.
            #[must_use]
            pub fn parse(raw: &str) -> Self {
                let key = normalize_deliverable_key(raw);
                match key.as_str() {
                    $($tag => Self::$variant,)+
                    _ => Self::Custom(key),
                }
            }

            /// Returns the canonical tag.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $tag,)+
                    Self::Custom(tag) => tag,
                }
            }
        }
    };
}

artifact_types! {
    /// Research and analysis report.
    ResearchAnalysisDoc => "research-analysis-doc",
    /// Product requirement document.
    Prd => "prd",
    /// User stories.
    UserStory => "user-story",
    /// Feature list.
    FeatureList => "feature-list",
    /// Core prompt design.
    CorePromptDesign => "core-prompt-design",
    /// Strategy document.
    StrategyDoc => "strategy-doc",
    /// UI design.
    UiDesign => "ui-design",
    /// Interactive prototype.
    Prototype => "prototype",
    /// Design specification.
    DesignSpec => "design-spec",
    /// Architecture document.
    ArchitectureDoc => "architecture-doc",
    /// API specification.
    ApiSpec => "api-spec",
    /// Technology stack.
    TechStack => "tech-stack",
    /// Frontend source code.
    FrontendCode => "frontend-code",
    /// Backend source code.
    BackendCode => "backend-code",
    /// API documentation.
    ApiDoc => "api-doc",
    /// Component library.
    ComponentLib => "component-lib",
    /// Frontend documentation.
    FrontendDoc => "frontend-doc",
    /// Backend documentation.
    BackendDoc => "backend-doc",
    /// Test report.
    TestReport => "test-report",
    /// Bug list.
    BugList => "bug-list",
    /// Performance report.
    PerformanceReport => "performance-report",
    /// Deployment document.
    DeployDoc => "deploy-doc",
    /// Environment configuration.
    EnvConfig => "env-config",
    /// Release notes.
    ReleaseNotes => "release-notes",
    /// Marketing plan.
    MarketingPlan => "marketing-plan",
    /// Growth strategy.
    GrowthStrategy => "growth-strategy",
    /// Analytics report.
    AnalyticsReport => "analytics-report",
    /// Untyped document.
    Document => "document",
}

impl ArtifactType {
    /// Human-readable name for display.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Prd => "PRD".to_string(),
            Self::ApiSpec => "API Spec".to_string(),
            Self::ApiDoc => "API Doc".to_string(),
            Self::UiDesign => "UI Design".to_string(),
            other => other
                .as_str()
                .split('-')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    chars.next().map_or_else(String::new, |first| {
                        first.to_uppercase().chain(chars).collect()
                    })
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Returns true if `raw` names this type after normalization.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        self.as_str() == normalize_deliverable_key(raw)
    }
}

impl Default for ArtifactType {
    fn default() -> Self {
        Self::Document
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ArtifactType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for ArtifactType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<ArtifactType> for String {
    fn from(kind: ArtifactType) -> Self {
        kind.as_str().to_string()
    }
}

/// Value of [`Artifact::source`] for model-generated output.
pub const MODEL_SOURCE: &str = "model";

/// A generated deliverable attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Identifier, stable across regenerations of the same deliverable.
    pub id: String,

    /// The owning stage. Remote snapshots may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,

    /// The deliverable type.
    #[serde(rename = "type", default)]
    pub artifact_type: ArtifactType,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Opaque payload.
    #[serde(default)]
    pub content: String,

    /// Creation time.
    #[serde(default = "now_utc", deserialize_with = "deserialize_flexible")]
    pub created_at: Timestamp,

    /// Tokens spent generating this artifact.
    #[serde(default)]
    pub tokens: u64,

    /// Producer of the artifact (for example `"model"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Artifact {
    /// Creates an artifact with an explicit id.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        stage_id: StageId,
        artifact_type: ArtifactType,
        content: impl Into<String>,
    ) -> Self {
        let name = artifact_type.display_name();
        Self {
            id: id.into(),
            stage_id: Some(stage_id),
            artifact_type,
            name,
            content: content.into(),
            created_at: now_utc(),
            tokens: 0,
            source: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates an artifact with a fresh time-ordered id.
    #[must_use]
    pub fn generated(
        stage_id: StageId,
        artifact_type: ArtifactType,
        content: impl Into<String>,
    ) -> Self {
        Self::new(generate_uuid_v7().to_string(), stage_id, artifact_type, content)
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the token count.
    #[must_use]
    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the artifact was produced by the model.
    #[must_use]
    pub fn is_model_output(&self) -> bool {
        self.source.as_deref() == Some(MODEL_SOURCE)
    }
}
