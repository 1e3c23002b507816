//! Versioned alias table for historical stage identifiers.
//!
//! Older workflow templates used several spellings for the same stage
//! (`ux-design`, `product-design`, `qa`, ...). Identifiers are normalized
//! exactly once, when they enter the system, so every later lookup and
//! dependency check compares canonical ids only.

/// Version of [`STAGE_ALIASES`]. Bump when an entry is added or changed.
pub const ALIAS_TABLE_VERSION: u32 = 1;

/// `(alias, canonical)` pairs, lower-case.
pub const STAGE_ALIASES: &[(&str, &str)] = &[
    ("strategy-validation", "strategy"),
    ("strategy-review", "strategy"),
    ("strategy-plan", "strategy"),
    ("product-definition", "requirement"),
    ("product-requirement", "requirement"),
    ("requirements", "requirement"),
    ("ux-design", "design"),
    ("ui-design", "design"),
    ("product-design", "design"),
    ("experience-design", "design"),
    ("user-experience-design", "design"),
    ("prototype-design", "design"),
    ("architecture-design", "architecture"),
    ("tech-architecture", "architecture"),
    ("system-architecture", "architecture"),
    ("implementation", "development"),
    ("dev", "development"),
    ("qa", "testing"),
    ("test", "testing"),
    ("launch", "deployment"),
    ("release", "deployment"),
    ("ops", "operation"),
];

/// Normalizes a raw stage identifier to its canonical spelling.
///
/// The input is trimmed and lower-cased. Known aliases map to their
/// canonical id; anything else is returned as-is (after trimming and
/// lower-casing) so custom stages survive untouched.
///
/// # Examples
///
/// ```
/// use stagecraft::core::normalize_stage_id;
///
/// assert_eq!(normalize_stage_id(" UX-Design "), "design");
/// assert_eq!(normalize_stage_id("qa"), "testing");
/// assert_eq!(normalize_stage_id("market-research"), "market-research");
/// ```
#[must_use]
pub fn normalize_stage_id(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    STAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key, |(_, canonical)| (*canonical).to_string())
}

/// Returns every alias that maps onto `canonical`.
#[must_use]
pub fn aliases_of(canonical: &str) -> Vec<&'static str> {
    STAGE_ALIASES
        .iter()
        .filter(|(_, target)| *target == canonical)
        .map(|(alias, _)| *alias)
        .collect()
}
