//! Single-pass structural validation
//!
//! The compiled JSON Schema reports every error in one pass; each one is
//! mapped to a [`Violation`] addressed by dotted path and sorted into
//! document order. The repair loop feeds the whole list back to the
//! generator, so a partial list would cost an extra round trip per hidden
//! violation.

use crate::schema::{describe, display_value, render_path, Schema, Segment, HEX_COLOR_PATTERN};
use jsonschema::error::ValidationErrorKind;
use jsonschema::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use stitch_artifact::CandidatePayload;

/// Path used for violations that concern the payload as a whole
pub const ROOT_PATH: &str = "$";

/// What is wrong with one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Output is not parseable JSON
    Malformed { detail: String },
    /// Output parsed but the root is not an object
    NotAnObject { found: String },
    /// Required field absent
    Missing,
    /// Field present with the wrong JSON type
    WrongType { expected: String, found: String },
    /// Value outside an enumerated set
    NotAllowed { value: String, allowed: Vec<String> },
    /// Text shorter than the lower bound (characters)
    TooShort { min: usize, actual: usize },
    /// Text longer than the upper bound (characters)
    TooLong { max: usize, actual: usize },
    /// List with too few items
    TooFewItems { min: usize, actual: usize },
    /// List with too many items
    TooManyItems { max: usize, actual: usize },
    /// Number outside its bounds
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// String is not a hex color
    InvalidColor { value: String },
    /// String does not match the required pattern
    PatternMismatch { value: String, pattern: String },
    /// Any other schema keyword failed
    Constraint { detail: String },
    /// Generator call failed or timed out
    GeneratorFailure { detail: String },
}

/// One schema violation, addressed by field path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted field path (`components[2]` for list items, `$` for the root)
    pub path: String,
    /// What went wrong
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    /// Create a violation
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Violation recorded when the generator itself failed
    #[must_use]
    pub fn generator_failure(detail: impl Into<String>) -> Self {
        Self::new(
            ROOT_PATH,
            ViolationKind::GeneratorFailure {
                detail: detail.into(),
            },
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.path;
        match &self.kind {
            ViolationKind::Malformed { detail } => {
                write!(f, "output is not valid JSON ({detail}); return a single JSON object")
            }
            ViolationKind::NotAnObject { found } => {
                write!(f, "top-level value is {found}; return a JSON object")
            }
            ViolationKind::Missing => write!(f, "`{path}` is required but missing"),
            ViolationKind::WrongType { expected, found } => {
                write!(f, "`{path}` must be {expected}, found {found}")
            }
            ViolationKind::NotAllowed { value, allowed } => write!(
                f,
                "`{path}` is \"{value}\"; allowed values: {}",
                allowed.join(", ")
            ),
            ViolationKind::TooShort { min, actual } => write!(
                f,
                "`{path}` has {actual} characters; at least {min} required"
            ),
            ViolationKind::TooLong { max, actual } => write!(
                f,
                "`{path}` has {actual} characters; at most {max} allowed"
            ),
            ViolationKind::TooFewItems { min, actual } => {
                write!(f, "`{path}` has {actual} items; at least {min} required")
            }
            ViolationKind::TooManyItems { max, actual } => {
                write!(f, "`{path}` has {actual} items; at most {max} allowed")
            }
            ViolationKind::OutOfRange { value, min, max } => {
                write!(f, "`{path}` is {value}; must be")?;
                match (min, max) {
                    (Some(lo), Some(hi)) => write!(f, " between {lo} and {hi}"),
                    (Some(lo), None) => write!(f, " at least {lo}"),
                    (None, Some(hi)) => write!(f, " at most {hi}"),
                    (None, None) => write!(f, " a finite number"),
                }
            }
            ViolationKind::InvalidColor { value } => {
                write!(f, "`{path}` is \"{value}\"; use a hex color like #1A2B3C")
            }
            ViolationKind::PatternMismatch { value, pattern } => {
                write!(f, "`{path}` is \"{value}\"; it must match {pattern}")
            }
            ViolationKind::Constraint { detail } => write!(f, "`{path}`: {detail}"),
            ViolationKind::GeneratorFailure { detail } => {
                write!(f, "previous generation failed: {detail}")
            }
        }
    }
}

/// Outcome of validating one payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True exactly when `errors` is empty
    pub valid: bool,
    /// Violations in document order
    pub errors: Vec<Violation>,
}

impl ValidationResult {
    /// Build a result from collected violations
    #[must_use]
    pub fn from_errors(errors: Vec<Violation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Passing result
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self::from_errors(Vec::new())
    }

    /// Numbered feedback lines, one per violation
    #[must_use]
    pub fn feedback(&self) -> String {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}. {v}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validates candidate payloads against one schema
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Arc<Schema>,
}

impl SchemaValidator {
    /// Create a validator bound to `schema`
    #[inline]
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Bound schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a candidate payload
    #[inline]
    #[must_use]
    pub fn validate(&self, payload: &CandidatePayload) -> ValidationResult {
        validate(payload, &self.schema)
    }
}

/// Validate a candidate payload against `schema`
#[must_use]
pub fn validate(payload: &CandidatePayload, schema: &Schema) -> ValidationResult {
    match payload.structured() {
        Some(value) => validate_value(value, schema),
        None => ValidationResult::from_errors(vec![Violation::new(
            ROOT_PATH,
            ViolationKind::Malformed {
                detail: payload.parse_error().unwrap_or("unparseable").to_string(),
            },
        )]),
    }
}

/// Validate an already-parsed JSON value against `schema`
#[must_use]
pub fn validate_value(value: &Value, schema: &Schema) -> ValidationResult {
    if !value.is_object() {
        return ValidationResult::from_errors(vec![Violation::new(
            ROOT_PATH,
            ViolationKind::NotAnObject {
                found: json_type(value).to_string(),
            },
        )]);
    }

    let Err(errors) = schema.compiled().validate(value) else {
        return ValidationResult::ok();
    };
    let mut located: Vec<(Vec<usize>, Violation)> = errors
        .map(|error| locate(schema, value, &error))
        .collect();
    located.sort_by(|a, b| a.0.cmp(&b.0));
    ValidationResult::from_errors(located.into_iter().map(|(_, v)| v).collect())
}

/// Map one schema error to a violation plus its document-order sort key
fn locate(schema: &Schema, root: &Value, error: &ValidationError<'_>) -> (Vec<usize>, Violation) {
    let mut segments = segments(root, &error.instance_path.to_string());
    if let ValidationErrorKind::Required { property } = &error.kind {
        segments.push(Segment::Key(display_value(property)));
        let violation = Violation::new(render_path(&segments), ViolationKind::Missing);
        return (schema.rank(&segments), violation);
    }

    let rule = schema.subschema(&segments).unwrap_or(&Value::Null);
    let instance: &Value = &error.instance;
    let text = || display_value(instance);
    let chars = instance.as_str().map_or(0, |s| s.chars().count());
    let items = instance.as_array().map_or(0, Vec::len);

    let kind = match &error.kind {
        ValidationErrorKind::Type { .. } => ViolationKind::WrongType {
            expected: describe(rule),
            found: json_type(instance).to_string(),
        },
        ValidationErrorKind::Enum { .. } => ViolationKind::NotAllowed {
            value: text(),
            allowed: rule
                .get("enum")
                .and_then(Value::as_array)
                .map(|allowed| allowed.iter().map(display_value).collect())
                .unwrap_or_default(),
        },
        ValidationErrorKind::MinLength { .. } => ViolationKind::TooShort {
            min: limit(rule, "minLength"),
            actual: chars,
        },
        ValidationErrorKind::MaxLength { .. } => ViolationKind::TooLong {
            max: limit(rule, "maxLength"),
            actual: chars,
        },
        ValidationErrorKind::MinItems { .. } => ViolationKind::TooFewItems {
            min: limit(rule, "minItems"),
            actual: items,
        },
        ValidationErrorKind::MaxItems { .. } => ViolationKind::TooManyItems {
            max: limit(rule, "maxItems"),
            actual: items,
        },
        ValidationErrorKind::Minimum { .. } | ValidationErrorKind::Maximum { .. } => {
            ViolationKind::OutOfRange {
                value: instance.as_f64().unwrap_or(f64::NAN),
                min: rule.get("minimum").and_then(Value::as_f64),
                max: rule.get("maximum").and_then(Value::as_f64),
            }
        }
        ValidationErrorKind::Pattern { .. } => {
            match rule.get("pattern").and_then(Value::as_str) {
                Some(HEX_COLOR_PATTERN) => ViolationKind::InvalidColor { value: text() },
                pattern => ViolationKind::PatternMismatch {
                    value: text(),
                    pattern: pattern.unwrap_or_default().to_string(),
                },
            }
        }
        _ => ViolationKind::Constraint {
            detail: error.to_string(),
        },
    };

    let path = if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        render_path(&segments)
    };
    (schema.rank(&segments), Violation::new(path, kind))
}

/// Split a JSON pointer (`/components/2`) into segments, using the payload
/// to tell array indices from object keys
fn segments(root: &Value, pointer: &str) -> Vec<Segment> {
    let mut node = Some(root);
    let mut out = Vec::new();
    for raw in pointer.split('/').skip(1) {
        let token = raw.replace("~1", "/").replace("~0", "~");
        match (node, token.parse::<usize>()) {
            (Some(Value::Array(items)), Ok(i)) => {
                node = items.get(i);
                out.push(Segment::Index(i));
            }
            _ => {
                node = node.and_then(|n| n.get(&token));
                out.push(Segment::Key(token));
            }
        }
    }
    out
}

fn limit(rule: &Value, keyword: &str) -> usize {
    rule.get(keyword)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
