//! Sanitized payloads
//!
//! [`SanitizedPayload`] has no public constructor. Downstream stages take it
//! by reference, so they can only ever see structure that went through
//! [`crate::SecurityGuardian::sanitize`] (or a persisted copy whose seal
//! still verifies).

use crate::error::SecurityError;
use crate::rules::{RedactionAction, RuleId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stitch_artifact::{ContentHash, HashError, PayloadId, PayloadOrigin, VariantIndex};

/// Longest fragment kept in a redaction record, in bytes
pub const MAX_FRAGMENT_BYTES: usize = 256;

/// One redaction applied to a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    /// Field location (`headline`, `components[3]`, `sections[0].body`)
    pub location: String,
    /// Byte offset of the fragment within the field value as submitted
    pub offset: usize,
    /// Rule that fired
    pub rule: RuleId,
    /// Redacted text, truncated to [`MAX_FRAGMENT_BYTES`]
    pub fragment: String,
    /// What was done with it
    pub action: RedactionAction,
}

impl Redaction {
    pub(crate) fn new(
        location: impl Into<String>,
        offset: usize,
        rule: RuleId,
        fragment: &str,
        action: RedactionAction,
    ) -> Self {
        Self {
            location: location.into(),
            offset,
            rule,
            fragment: truncate(fragment, MAX_FRAGMENT_BYTES).to_string(),
            action,
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Structure that passed the security guardian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedPayload {
    source: PayloadId,
    source_hash: ContentHash,
    origin: PayloadOrigin,
    fields: Value,
    components: Vec<String>,
    redactions: Vec<Redaction>,
    seal: ContentHash,
}

impl SanitizedPayload {
    pub(crate) fn sealed(
        source: PayloadId,
        source_hash: ContentHash,
        origin: PayloadOrigin,
        fields: Value,
        components: Vec<String>,
        redactions: Vec<Redaction>,
    ) -> Result<Self, HashError> {
        let mut payload = Self {
            source,
            source_hash,
            origin,
            fields,
            components,
            redactions,
            seal: ContentHash::default(),
        };
        payload.seal = payload.compute_seal()?;
        Ok(payload)
    }

    fn compute_seal(&self) -> Result<ContentHash, HashError> {
        let source = self.source.to_string();
        let origin = serde_json::to_vec(&self.origin)?;
        let fields = serde_json::to_vec(&self.fields)?;
        let components = serde_json::to_vec(&self.components)?;
        let redactions = serde_json::to_vec(&self.redactions)?;
        Ok(ContentHash::compute_parts([
            source.as_bytes(),
            self.source_hash.as_bytes().as_slice(),
            origin.as_slice(),
            fields.as_slice(),
            components.as_slice(),
            redactions.as_slice(),
        ]))
    }

    /// Check the seal against the current contents
    ///
    /// # Errors
    /// Returns `SecurityError::Tampered` if any sealed part changed
    pub fn verify(&self) -> Result<(), SecurityError> {
        let actual = self.compute_seal()?;
        if actual == self.seal {
            Ok(())
        } else {
            Err(SecurityError::Tampered {
                expected: self.seal,
                actual,
            })
        }
    }

    /// Candidate payload this was derived from
    #[inline]
    #[must_use]
    pub fn source(&self) -> PayloadId {
        self.source
    }

    /// Hash of the candidate's raw text
    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> &ContentHash {
        &self.source_hash
    }

    /// Origin of the candidate
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &PayloadOrigin {
        &self.origin
    }

    /// Variant, for generated payloads
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<VariantIndex> {
        self.origin.variant()
    }

    /// Sanitized structure
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Value {
        &self.fields
    }

    /// Look up a field by dotted path
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        self.fields.pointer(&dotted_pointer(path))
    }

    /// Allowlisted component ids, in payload order
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Redactions applied
    #[inline]
    #[must_use]
    pub fn redactions(&self) -> &[Redaction] {
        &self.redactions
    }

    /// Seal over provenance and contents
    #[inline]
    #[must_use]
    pub fn seal(&self) -> &ContentHash {
        &self.seal
    }
}

/// Convert `a.b.c` into the JSON pointer `/a/b/c`
pub(crate) fn dotted_pointer(path: &str) -> String {
    let mut pointer = String::with_capacity(path.len() + 1);
    for segment in path.split('.') {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SanitizedPayload {
        SanitizedPayload::sealed(
            PayloadId::new(),
            ContentHash::compute(b"raw"),
            PayloadOrigin::Generated {
                variant: VariantIndex::FIRST,
                attempt: 1,
            },
            json!({"headline": "Ship", "colors": {"primary": "#fff"}}),
            vec!["hero".into()],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn seal_verifies_after_round_trip() {
        let payload = sample();
        let json = serde_json::to_string(&payload).unwrap();
        let restored: SanitizedPayload = serde_json::from_str(&json).unwrap();
        assert!(restored.verify().is_ok());
        assert_eq!(restored.seal(), payload.seal());
    }

    #[test]
    fn edited_payload_fails_verification() {
        let payload = sample();
        let mut json: Value = serde_json::to_value(&payload).unwrap();
        json["fields"]["headline"] = json!("<script>x</script>");
        let tampered: SanitizedPayload = serde_json::from_value(json).unwrap();
        assert!(matches!(
            tampered.verify(),
            Err(SecurityError::Tampered { .. })
        ));
    }

    #[test]
    fn dotted_field_lookup() {
        let payload = sample();
        assert_eq!(payload.field("colors.primary"), Some(&json!("#fff")));
        assert_eq!(payload.field("colors.bg"), None);
        assert_eq!(dotted_pointer("a/b.c~d"), "/a~1b/c~0d");
    }

    #[test]
    fn fragments_truncated_on_char_boundary() {
        let long = "é".repeat(200);
        let r = Redaction::new("x", 0, RuleId::ScriptTag, &long, RedactionAction::Removed);
        assert!(r.fragment.len() <= MAX_FRAGMENT_BYTES);
        assert_eq!(r.fragment.chars().count(), 128);
    }
}
