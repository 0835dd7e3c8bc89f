//! Schema definitions
//!
//! A [`Schema`] is a Draft 7 JSON Schema document plus its compiled form.
//! Violations are reported in document order: a property's position in its
//! object's `required` list, then the remaining properties by name. That
//! order also drives the outline shown to the generator, so repair feedback
//! stays reproducible.

use crate::error::SchemaError;
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Schema identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub String);

impl SchemaId {
    /// Create a schema identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SchemaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the built-in design variant schema
pub const DESIGN_VARIANT: &str = "design_variant";

/// Layout categories accepted by the built-in schema
pub const LAYOUT_CATEGORIES: &[&str] = &["bento_grid", "single_column", "split_hero", "magazine"];

/// `#RGB`, `#RRGGBB` or `#RRGGBBAA`
pub const HEX_COLOR_PATTERN: &str = "^#([0-9A-Fa-f]{3}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$";

/// One step of a location inside a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
}

/// Render segments as `colors.primary` or `components[2]`
pub(crate) fn render_path(segments: &[Segment]) -> String {
    let mut path = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
            }
            Segment::Index(i) => {
                path.push('[');
                path.push_str(&i.to_string());
                path.push(']');
            }
        }
    }
    path
}

/// On-disk form accepted by the loaders
#[derive(Deserialize)]
struct SchemaFile {
    id: SchemaId,
    #[serde(default = "default_version")]
    version: u32,
    schema: Value,
}

fn default_version() -> u32 {
    1
}

/// Structural contract for a generated payload
#[derive(Clone)]
pub struct Schema {
    /// Schema identifier
    pub id: SchemaId,
    /// Schema version
    pub version: u32,
    document: Value,
    compiled: Arc<JSONSchema>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Schema {
    /// Compile a JSON Schema document
    ///
    /// # Errors
    /// Returns `SchemaError::Invalid` if the root does not describe an object
    /// with properties, or the document fails Draft 7 compilation
    pub fn new(id: impl Into<SchemaId>, document: Value) -> Result<Self, SchemaError> {
        let id = id.into();
        let invalid = |reason: String| SchemaError::Invalid {
            schema: id.to_string(),
            reason,
        };

        if document.get("type").and_then(Value::as_str) != Some("object") {
            return Err(invalid("root must have \"type\": \"object\"".to_string()));
        }
        if !document.get("properties").is_some_and(Value::is_object) {
            return Err(invalid("root must declare \"properties\"".to_string()));
        }
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            id,
            version: 1,
            document,
            compiled: Arc::new(compiled),
        })
    }

    /// Set the version
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Parse `{"id": ..., "version": ..., "schema": {...}}`
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the schema does not compile
    pub fn from_json(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = serde_json::from_str(content)?;
        Ok(Self::new(file.id, file.schema)?.with_version(file.version))
    }

    /// Parse the TOML form of [`Self::from_json`]
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or the schema does not compile
    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;
        Ok(Self::new(file.id, file.schema)?.with_version(file.version))
    }

    /// JSON Schema document
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub(crate) fn compiled(&self) -> &JSONSchema {
        &self.compiled
    }

    /// Subschema governing the value at `segments`, if the document has one
    pub(crate) fn subschema(&self, segments: &[Segment]) -> Option<&Value> {
        let mut node = &self.document;
        for segment in segments {
            node = match segment {
                Segment::Key(key) => node.get("properties")?.get(key)?,
                Segment::Index(_) => node.get("items")?,
            };
        }
        Some(node)
    }

    /// Sort key for a location: document order at each step
    pub(crate) fn rank(&self, segments: &[Segment]) -> Vec<usize> {
        let mut node = Some(&self.document);
        let mut key = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Key(name) => {
                    key.push(node.map_or(usize::MAX, |n| {
                        property_order(n)
                            .iter()
                            .position(|p| p == name)
                            .unwrap_or(usize::MAX)
                    }));
                    node = node
                        .and_then(|n| n.get("properties"))
                        .and_then(|p| p.get(name));
                }
                Segment::Index(i) => {
                    key.push(*i);
                    node = node.and_then(|n| n.get("items"));
                }
            }
        }
        key
    }

    /// One line per leaf property, in document order
    ///
    /// Nested objects are flattened to dotted paths (`colors.primary`).
    #[must_use]
    pub fn outline(&self) -> Vec<String> {
        let mut lines = Vec::new();
        outline_into(&self.document, "", false, &mut lines);
        lines
    }

    /// Built-in contract for one design variant
    ///
    /// Mirrors what the designer agent is asked to return: a name, a layout
    /// category, a component order, a palette, typography and copy.
    #[must_use]
    pub fn design_variant() -> Self {
        DESIGN_VARIANT_SCHEMA.clone()
    }
}

// Built-in document is a literal covered by tests.
static DESIGN_VARIANT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(DESIGN_VARIANT, design_variant_document()).expect("built-in design schema")
});

fn design_variant_document() -> Value {
    let color = json!({
        "type": "string",
        "pattern": HEX_COLOR_PATTERN,
        "description": "hex color string like #1A2B3C"
    });
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": [
            "variant_name",
            "layout",
            "components",
            "colors",
            "typography",
            "border_radius",
            "headline"
        ],
        "properties": {
            "variant_name": {"type": "string", "minLength": 1, "maxLength": 80},
            "layout": {"type": "string", "enum": LAYOUT_CATEGORIES},
            "components": {
                "type": "array",
                "description": "array of component ids, in page order",
                "minItems": 1,
                "maxItems": 12,
                "items": {"type": "string", "minLength": 1, "maxLength": 32}
            },
            "colors": {
                "type": "object",
                "required": ["primary", "secondary", "bg"],
                "properties": {
                    "primary": color.clone(),
                    "secondary": color.clone(),
                    "bg": color
                }
            },
            "typography": {
                "type": "object",
                "required": ["heading", "body"],
                "properties": {
                    "heading": {"type": "string", "minLength": 1, "maxLength": 64},
                    "body": {"type": "string", "minLength": 1, "maxLength": 64}
                }
            },
            "border_radius": {
                "type": "string",
                "maxLength": 16,
                "description": "CSS length such as 4px"
            },
            "headline": {"type": "string", "minLength": 1, "maxLength": 120},
            "tagline": {"type": "string", "maxLength": 280}
        }
    })
}

/// Property names of an object subschema: `required` order, then the rest
/// by name
fn property_order(node: &Value) -> Vec<String> {
    let mut names: Vec<String> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(properties) = node.get("properties").and_then(Value::as_object) {
        let mut rest: Vec<&String> = properties.keys().filter(|k| !names.contains(k)).collect();
        rest.sort();
        names.extend(rest.into_iter().cloned());
    }
    names
}

fn is_required(node: &Value, name: &str) -> bool {
    node.get("required")
        .and_then(Value::as_array)
        .is_some_and(|required| required.iter().any(|r| r.as_str() == Some(name)))
}

fn outline_into(node: &Value, prefix: &str, optional: bool, lines: &mut Vec<String>) {
    for name in property_order(node) {
        let Some(child) = node.get("properties").and_then(|p| p.get(&name)) else {
            continue;
        };
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let child_optional = optional || !is_required(node, &name);
        if child.get("properties").is_some_and(Value::is_object) {
            outline_into(child, &path, child_optional, lines);
        } else {
            let suffix = if child_optional { " (optional)" } else { "" };
            lines.push(format!("`{path}`: {}{suffix}", describe(child)));
        }
    }
}

/// Short human-readable description of a subschema
pub(crate) fn describe(node: &Value) -> String {
    if let Some(description) = node.get("description").and_then(Value::as_str) {
        return description.to_string();
    }
    if let Some(allowed) = node.get("enum").and_then(Value::as_array) {
        let allowed: Vec<String> = allowed.iter().map(display_value).collect();
        return format!("one of [{}]", allowed.join(", "));
    }
    match node.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(Value::Array(kinds)) => {
            let kinds: Vec<String> = kinds.iter().map(display_value).collect();
            kinds.join(" or ")
        }
        _ => "any value".to_string(),
    }
}

/// Strings bare, everything else as JSON
pub(crate) fn display_value(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

/// Schemas available to a run, keyed by id
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaId, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in schemas
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Schema::design_variant());
        registry
    }

    /// Register (or replace) a schema
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.id.clone(), Arc::new(schema));
    }

    /// Look up a schema
    #[must_use]
    pub fn get(&self, id: &SchemaId) -> Option<Arc<Schema>> {
        self.schemas.get(id).cloned()
    }

    /// Registered ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&SchemaId> {
        let mut ids: Vec<_> = self.schemas.keys().collect();
        ids.sort();
        ids
    }
}
