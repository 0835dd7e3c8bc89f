//! Error types for schema loading

/// Errors while loading or checking a schema definition
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Schema JSON is malformed
    #[error("schema json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema TOML is malformed
    #[error("schema toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Schema parsed but does not compile as a usable JSON Schema
    #[error("invalid schema '{schema}': {reason}")]
    Invalid { schema: String, reason: String },
}
