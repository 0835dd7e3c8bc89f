//! Template graphs
//!
//! A template graph is the read-only, versioned blueprint for a document: a
//! shell, one fragment per component id, and a declaration for every slot
//! token the shell and fragments may contain.
//!
//! ```toml
//! id = "landing"
//! version = 3
//! shell = "<main class=\"{{@LAYOUT}}\">{{@COMPONENTS}}</main>"
//!
//! [layouts]
//! bento_grid = "grid grid-cols-3"
//!
//! [components.hero]
//! markup = "<h1>{{HEADLINE}}</h1>"
//! assets = ["img/hero.webp"]
//!
//! [slots.HEADLINE]
//! type = "text"
//! source = { from = "payload", field = "headline" }
//! ```

use crate::error::TemplateError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use stitch_artifact::TemplateRef;

/// Marker receiving the composed component fragments
pub const COMPONENTS_MARKER: &str = "{{@COMPONENTS}}";

/// Marker receiving the layout class for the payload's layout category
pub const LAYOUT_MARKER: &str = "{{@LAYOUT}}";

/// `{{NAME}}` slot token
pub(crate) static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}").expect("slot token pattern"));

/// Expected type of a slot value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    /// Escaped text
    Text,
    /// Link target
    Url,
    /// Finite number
    Numeric,
    /// Hex color
    Color,
}

/// Where a slot value comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum SlotSource {
    /// Dotted path into the sanitized payload
    Payload { field: String },
    /// Key in the deterministic injection map
    Injection { key: String },
}

/// Declaration of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSlot {
    /// Expected value type
    #[serde(rename = "type")]
    pub kind: SlotType,
    /// Single value source
    pub source: SlotSource,
}

impl ComponentSlot {
    /// Slot filled from a payload field
    #[must_use]
    pub fn payload(kind: SlotType, field: impl Into<String>) -> Self {
        Self {
            kind,
            source: SlotSource::Payload {
                field: field.into(),
            },
        }
    }

    /// Slot filled from the injection map
    #[must_use]
    pub fn injection(kind: SlotType, key: impl Into<String>) -> Self {
        Self {
            kind,
            source: SlotSource::Injection { key: key.into() },
        }
    }
}

/// Markup for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Fragment markup, may contain slot tokens
    pub markup: String,
    /// Static assets the fragment references, relative to the asset root
    #[serde(default)]
    pub assets: Vec<String>,
}

impl Fragment {
    /// Fragment without assets
    #[must_use]
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            assets: Vec::new(),
        }
    }

    /// Add a static asset
    #[must_use]
    pub fn with_asset(mut self, path: impl Into<String>) -> Self {
        self.assets.push(path.into());
        self
    }
}

fn default_layout_field() -> String {
    "layout".to_string()
}

/// Versioned document blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateGraph {
    /// Template identifier
    pub id: String,
    /// Template version
    pub version: u32,
    /// Document shell containing [`COMPONENTS_MARKER`]
    pub shell: String,
    /// Static assets the shell itself references
    #[serde(default)]
    pub assets: Vec<String>,
    /// Fragments keyed by component id
    pub components: IndexMap<String, Fragment>,
    /// Slot declarations keyed by token name
    #[serde(default)]
    pub slots: IndexMap<String, ComponentSlot>,
    /// Layout category to class string, used for [`LAYOUT_MARKER`]
    #[serde(default)]
    pub layouts: IndexMap<String, String>,
    /// Payload field holding the layout category
    #[serde(default = "default_layout_field")]
    pub layout_field: String,
}

impl TemplateGraph {
    /// Create an empty graph around a shell
    #[must_use]
    pub fn new(id: impl Into<String>, version: u32, shell: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version,
            shell: shell.into(),
            assets: Vec::new(),
            components: IndexMap::new(),
            slots: IndexMap::new(),
            layouts: IndexMap::new(),
            layout_field: default_layout_field(),
        }
    }

    /// Add a component fragment
    #[must_use]
    pub fn with_component(mut self, id: impl Into<String>, fragment: Fragment) -> Self {
        self.components.insert(id.into(), fragment);
        self
    }

    /// Declare a slot
    #[must_use]
    pub fn with_slot(mut self, name: impl Into<String>, slot: ComponentSlot) -> Self {
        self.slots.insert(name.into(), slot);
        self
    }

    /// Declare a static asset referenced by the shell
    #[must_use]
    pub fn with_asset(mut self, path: impl Into<String>) -> Self {
        self.assets.push(path.into());
        self
    }

    /// Map a layout category to a class string
    #[must_use]
    pub fn with_layout(mut self, category: impl Into<String>, class: impl Into<String>) -> Self {
        self.layouts.insert(category.into(), class.into());
        self
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the graph is inconsistent
    pub fn from_json(content: &str) -> Result<Self, TemplateError> {
        let graph: Self = serde_json::from_str(content)?;
        graph.check()?;
        Ok(graph)
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or the graph is inconsistent
    pub fn from_toml(content: &str) -> Result<Self, TemplateError> {
        let graph: Self = toml::from_str(content)?;
        graph.check()?;
        Ok(graph)
    }

    /// Identity recorded on assembled artifacts
    #[must_use]
    pub fn reference(&self) -> TemplateRef {
        TemplateRef::new(self.id.clone(), self.version)
    }

    /// Check declarations are consistent
    ///
    /// # Errors
    /// Returns `TemplateError::Invalid` describing the first problem found
    pub fn check(&self) -> Result<(), TemplateError> {
        let invalid = |reason: String| TemplateError::Invalid {
            template: self.id.clone(),
            reason,
        };

        let markers = self.shell.matches(COMPONENTS_MARKER).count();
        if markers != 1 {
            return Err(invalid(format!(
                "shell must contain {COMPONENTS_MARKER} exactly once, found {markers}"
            )));
        }
        if self.shell.contains(LAYOUT_MARKER) && self.layouts.is_empty() {
            return Err(invalid(format!("{LAYOUT_MARKER} used but no layouts declared")));
        }
        for name in self.slots.keys() {
            if !is_token_name(name) {
                return Err(invalid(format!("slot name '{name}' is not an uppercase token")));
            }
        }
        for (id, fragment) in &self.components {
            if fragment.markup.contains(COMPONENTS_MARKER) {
                return Err(invalid(format!("fragment '{id}' contains {COMPONENTS_MARKER}")));
            }
        }
        Ok(())
    }
}

/// `NAME` in `{{NAME}}`: an uppercase letter, then uppercase, digits or `_`
#[must_use]
pub fn is_token_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDING: &str = r#"
        id = "landing"
        version = 3
        shell = "<main class=\"{{@LAYOUT}}\">{{@COMPONENTS}}</main>"

        [layouts]
        bento_grid = "grid grid-cols-3"

        [components.hero]
        markup = "<h1>{{HEADLINE}}</h1>"
        assets = ["img/hero.webp"]

        [components.footer]
        markup = "<footer>{{PHONE}}</footer>"

        [slots.HEADLINE]
        type = "text"
        source = { from = "payload", field = "headline" }

        [slots.PHONE]
        type = "text"
        source = { from = "injection", key = "contact.phone" }
    "#;

    #[test]
    fn loads_from_toml_in_declaration_order() {
        let graph = TemplateGraph::from_toml(LANDING).unwrap();
        assert_eq!(graph.reference(), TemplateRef::new("landing", 3));
        let ids: Vec<_> = graph.components.keys().cloned().collect();
        assert_eq!(ids, vec!["hero", "footer"]);
        assert_eq!(
            graph.slots["PHONE"],
            ComponentSlot::injection(SlotType::Text, "contact.phone")
        );
        assert_eq!(graph.layout_field, "layout");
    }

    #[test]
    fn json_and_toml_agree() {
        let from_toml = TemplateGraph::from_toml(LANDING).unwrap();
        let json = serde_json::to_string(&from_toml).unwrap();
        assert_eq!(TemplateGraph::from_json(&json).unwrap(), from_toml);
    }

    #[test]
    fn shell_needs_one_marker() {
        let graph = TemplateGraph::new("t", 1, "<main></main>");
        assert!(matches!(graph.check(), Err(TemplateError::Invalid { .. })));
        let graph = TemplateGraph::new("t", 1, "{{@COMPONENTS}}{{@COMPONENTS}}");
        assert!(graph.check().is_err());
    }

    #[test]
    fn slot_names_must_be_tokens() {
        let graph = TemplateGraph::new("t", 1, "{{@COMPONENTS}}")
            .with_slot("headline", ComponentSlot::payload(SlotType::Text, "headline"));
        assert!(graph.check().is_err());
        let graph = TemplateGraph::new("t", 1, "{{@COMPONENTS}}")
            .with_slot("HEADLINE_2", ComponentSlot::payload(SlotType::Text, "headline"));
        assert!(graph.check().is_ok());
    }
}
