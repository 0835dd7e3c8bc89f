//! Deterministic injections
//!
//! Facts that must be exact (prices, phone numbers, legal names) are supplied
//! here by the operator and never pass through the generator.

use crate::error::TemplateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Operator-supplied slot values keyed by injection key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InjectionMap(BTreeMap<String, Value>);

impl InjectionMap {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value (builder style)
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value; null counts as absent
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse from a flat JSON object
    ///
    /// # Errors
    /// Returns error if the JSON is not an object
    pub fn from_json(content: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse from a flat TOML table (quote dotted keys: `"contact.phone" = "..."`)
    ///
    /// # Errors
    /// Returns error if the TOML is malformed
    pub fn from_toml(content: &str) -> Result<Self, TemplateError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_is_absent() {
        let map = InjectionMap::new()
            .with("price.pro", 49)
            .with("legal_name", Value::Null);
        assert_eq!(map.get("price.pro"), Some(&json!(49)));
        assert!(map.get("legal_name").is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn parses_toml_with_quoted_keys() {
        let map = InjectionMap::from_toml(
            r#"
            "contact.phone" = "+1 555 0100"
            "price.pro" = 49
            "#,
        )
        .unwrap();
        assert_eq!(map.get("contact.phone"), Some(&json!("+1 555 0100")));
        assert_eq!(map.get("price.pro"), Some(&json!(49)));
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(InjectionMap::from_json("[1, 2]").is_err());
    }
}
