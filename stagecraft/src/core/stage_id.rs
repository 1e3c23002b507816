//! Canonical stage identifiers.

use super::aliases::normalize_stage_id;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A canonical stage identifier.
///
/// Known workflow stages are closed variants; anything else is carried as
/// [`StageId::Custom`]. Construction always normalizes aliases, so two ids
/// that refer to the same stage compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageId {
    /// Requirement analysis.
    Requirement,
    /// Strategy design.
    Strategy,
    /// Product design.
    Design,
    /// Architecture design.
    Architecture,
    /// Development.
    Development,
    /// Testing and validation.
    Testing,
    /// Deployment.
    Deployment,
    /// Operation and growth.
    Operation,
    /// A stage outside the built-in catalog (already normalized).
    Custom(String),
}

impl StageId {
    /// All built-in stages in default template order.
    pub const KNOWN: [Self; 8] = [
        Self::Requirement,
        Self::Strategy,
        Self::Design,
        Self::Architecture,
        Self::Development,
        Self::Testing,
        Self::Deployment,
        Self::Operation,
    ];

    /// Parses a raw identifier, resolving historical aliases.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let canonical = normalize_stage_id(raw);
        match canonical.as_str() {
            "requirement" => Self::Requirement,
            "strategy" => Self::Strategy,
            "design" => Self::Design,
            "architecture" => Self::Architecture,
            "development" => Self::Development,
            "testing" => Self::Testing,
            "deployment" => Self::Deployment,
            "operation" => Self::Operation,
            _ => Self::Custom(canonical),
        }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Requirement => "requirement",
            Self::Strategy => "strategy",
            Self::Design => "design",
            Self::Architecture => "architecture",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Operation => "operation",
            Self::Custom(id) => id,
        }
    }

    /// Returns true for ids outside the built-in catalog.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Returns the generic execution-context key for this stage.
    ///
    /// The key is the upper-cased canonical id with `-` replaced by `_`.
    #[must_use]
    pub fn context_key(&self) -> String {
        self.as_str().to_uppercase().replace('-', "_")
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for StageId {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for StageId {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<StageId> for String {
    fn from(id: StageId) -> Self {
        id.as_str().to_string()
    }
}
