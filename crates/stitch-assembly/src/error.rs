//! Error types for assembly
//!
//! Assembly errors are fatal for the run: no partial artifact is returned.

use std::fmt;

/// Why a slot could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Token appears in the template but has no slot declaration
    Undeclared,
    /// Declared payload field is absent or null
    MissingPayloadField(String),
    /// Declared injection key is absent or null
    MissingInjection(String),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undeclared => f.write_str("no slot declaration"),
            Self::MissingPayloadField(field) => write!(f, "payload field `{field}` is missing"),
            Self::MissingInjection(key) => write!(f, "injection `{key}` is missing"),
        }
    }
}

/// Errors during assembly
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// A `{{TOKEN}}` in the template has no value
    #[error("unresolved slot {{{{{slot}}}}}: {reason}")]
    UnresolvedSlot {
        slot: String,
        reason: UnresolvedReason,
    },

    /// Asset path escapes the asset root
    #[error("asset path escapes asset root: {path}")]
    PathTraversal { path: String },

    /// Asset path is inside the root but does not exist
    #[error("asset not found under asset root: {path}")]
    MissingAsset { path: String },

    /// Resolved value does not fit the slot type
    #[error("invalid value for slot {slot}: {reason}")]
    InvalidSlotValue { slot: String, reason: String },

    /// Payload references a component the template does not define
    #[error("template has no fragment for component '{component}'")]
    UnknownComponent { component: String },

    /// Shell does not contain exactly one component marker
    #[error("template '{template}' shell has {found} component markers, expected 1")]
    MissingComponentMarker { template: String, found: usize },

    /// Payload layout has no mapping in the template
    #[error("layout {} is not supported by the template", layout.as_deref().unwrap_or("<missing>"))]
    InvalidLayout { layout: Option<String> },
}

/// Errors while loading a template graph or injection map
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// JSON is malformed
    #[error("template json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML is malformed
    #[error("template toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Template parsed but is internally inconsistent
    #[error("invalid template '{template}': {reason}")]
    Invalid { template: String, reason: String },
}
