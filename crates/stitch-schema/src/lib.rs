//! Stitcher Schema Validation
//!
//! Structural contracts for generated payloads. A [`Schema`] is a Draft 7
//! JSON Schema document compiled with `jsonschema`; the validator checks a
//! payload against it in a single pass and returns every violation at once,
//! addressed by dotted path and in document order.
//!
//! # Example
//!
//! ```rust
//! use stitch_schema::{validate_value, Schema};
//!
//! let schema = Schema::design_variant();
//! let result = validate_value(&serde_json::json!({"layout": "carousel"}), &schema);
//! assert!(!result.valid);
//! assert_eq!(result.errors[0].path, "variant_name");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod schema;
mod validator;

pub use error::SchemaError;
pub use schema::{
    Schema, SchemaId, SchemaRegistry, DESIGN_VARIANT, HEX_COLOR_PATTERN, LAYOUT_CATEGORIES,
};
pub use validator::{
    validate, validate_value, SchemaValidator, ValidationResult, Violation, ViolationKind,
    ROOT_PATH,
};
