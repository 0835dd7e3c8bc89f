//! Guardian policy

use serde::{Deserialize, Serialize};

/// Component identifiers permitted by default
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "hero",
    "features",
    "pricing",
    "testimonials",
    "gallery",
    "contact",
    "footer",
];

/// Security policy for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Ceiling on raw payload size, in bytes
    pub max_payload_bytes: usize,
    /// Ceiling on a quoted attribute value embedded in a string, in bytes
    pub max_attribute_len: usize,
    /// Permitted component identifiers
    pub allowlist: Vec<String>,
    /// Reject on any disallowed component instead of dropping it
    pub strict_components: bool,
    /// Additional case-insensitive patterns to strip from every string
    pub extra_patterns: Vec<String>,
    /// Dotted path of the component list inside the payload
    pub component_field: String,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 500_000,
            max_attribute_len: 2048,
            allowlist: DEFAULT_ALLOWLIST.iter().map(ToString::to_string).collect(),
            strict_components: false,
            extra_patterns: Vec::new(),
            component_field: "components".to_string(),
        }
    }
}

impl GuardianConfig {
    /// Set payload size ceiling
    #[inline]
    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Set attribute length ceiling
    #[inline]
    #[must_use]
    pub fn with_max_attribute_len(mut self, max: usize) -> Self {
        self.max_attribute_len = max;
        self
    }

    /// Replace the allowlist
    #[must_use]
    pub fn with_allowlist<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Enable strict component checking
    #[inline]
    #[must_use]
    pub fn with_strict_components(mut self, strict: bool) -> Self {
        self.strict_components = strict;
        self
    }

    /// Add a blacklist pattern
    #[must_use]
    pub fn with_extra_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.extra_patterns.push(pattern.into());
        self
    }
}
