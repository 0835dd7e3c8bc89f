//! Candidate payloads produced by the generator or supplied externally
//!
//! A [`CandidatePayload`] is never mutated after construction. Repairs produce
//! new candidates; the old ones are simply dropped. The raw text is parsed
//! on first access, so a size check can reject a payload before any of it
//! is parsed.

use crate::hash::ContentHash;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use ulid::Ulid;

/// Unique payload identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayloadId(pub Ulid);

impl PayloadId {
    /// Generate new payload ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PayloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-based index of a design variant within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VariantIndex(u8);

impl VariantIndex {
    /// First variant
    pub const FIRST: Self = Self(1);

    /// Create a variant index; zero is not a valid index
    #[inline]
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index == 0 {
            None
        } else {
            Some(Self(index))
        }
    }

    /// Numeric value (1-based)
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// All indices `1..=count`
    pub fn range(count: u8) -> impl Iterator<Item = Self> {
        (1..=count).map(Self)
    }
}

impl TryFrom<u8> for VariantIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "variant index must be at least 1".to_string())
    }
}

impl From<VariantIndex> for u8 {
    fn from(value: VariantIndex) -> Self {
        value.0
    }
}

impl fmt::Display for VariantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a candidate payload came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadOrigin {
    /// Produced by the generator for a variant
    Generated {
        /// Variant the payload belongs to
        variant: VariantIndex,
        /// One-based attempt number within the repair loop
        attempt: u32,
    },
    /// Supplied by a human (override mode)
    External {
        /// Free-form reference (URL, file name, design tool link)
        reference: String,
    },
}

impl PayloadOrigin {
    /// Variant index for generated payloads
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<VariantIndex> {
        match self {
            Self::Generated { variant, .. } => Some(*variant),
            Self::External { .. } => None,
        }
    }
}

/// Raw output of one generation call, with its parsed structure
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePayload {
    id: PayloadId,
    origin: PayloadOrigin,
    raw: String,
    #[serde(skip)]
    parsed: OnceCell<Result<Value, String>>,
    hash: ContentHash,
}

impl CandidatePayload {
    /// Wrap generator output for `variant`, attempt `attempt`
    #[must_use]
    pub fn generated(variant: VariantIndex, attempt: u32, raw: impl Into<String>) -> Self {
        Self::from_raw(PayloadOrigin::Generated { variant, attempt }, raw.into())
    }

    /// Wrap externally supplied structure (override mode)
    #[must_use]
    pub fn external(reference: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::from_raw(
            PayloadOrigin::External {
                reference: reference.into(),
            },
            raw.into(),
        )
    }

    fn from_raw(origin: PayloadOrigin, raw: String) -> Self {
        let hash = ContentHash::compute(raw.as_bytes());
        Self {
            id: PayloadId::new(),
            origin,
            raw,
            parsed: OnceCell::new(),
            hash,
        }
    }

    fn parsed(&self) -> &Result<Value, String> {
        self.parsed.get_or_init(|| {
            serde_json::from_str::<Value>(unwrap_code_fence(&self.raw)).map_err(|e| e.to_string())
        })
    }

    /// Payload identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> PayloadId {
        self.id
    }

    /// Payload origin
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &PayloadOrigin {
        &self.origin
    }

    /// Variant index, if generated
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<VariantIndex> {
        self.origin.variant()
    }

    /// Raw text exactly as received
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Size of the raw text in bytes
    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.raw.len()
    }

    /// Parsed JSON structure, if the raw text was valid JSON
    #[must_use]
    pub fn structured(&self) -> Option<&Value> {
        self.parsed().as_ref().ok()
    }

    /// JSON parse error, if the raw text was not valid JSON
    #[must_use]
    pub fn parse_error(&self) -> Option<&str> {
        self.parsed().as_ref().err().map(String::as_str)
    }

    /// Whether the raw text has been parsed yet
    #[inline]
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        self.parsed.get().is_some()
    }

    /// Hash of the raw text
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

/// Strip a surrounding Markdown code fence (```` ```json ... ``` ````)
///
/// Models frequently wrap JSON in fences even when told not to.
#[must_use]
pub fn unwrap_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `html`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn variant_index_rejects_zero() {
        assert!(VariantIndex::new(0).is_none());
        assert_eq!(VariantIndex::new(3).unwrap().get(), 3);
        assert_eq!(VariantIndex::range(5).count(), 5);
        assert_eq!(VariantIndex::FIRST.to_string(), "v1");
    }

    #[test]
    fn variant_index_serde_rejects_zero() {
        assert!(serde_json::from_str::<VariantIndex>("0").is_err());
        let v: VariantIndex = serde_json::from_str("4").unwrap();
        assert_eq!(v.get(), 4);
    }

    #[test]
    fn generated_payload_parses_json() {
        let p = CandidatePayload::generated(VariantIndex::FIRST, 1, r#"{"layout": "bento_grid"}"#);
        assert!(!p.is_parsed());
        assert_eq!(p.size_bytes(), 24);
        assert!(!p.is_parsed());
        assert_eq!(p.structured().unwrap()["layout"], "bento_grid");
        assert!(p.parse_error().is_none());
        assert!(p.is_parsed());
        assert_eq!(p.variant(), Some(VariantIndex::FIRST));
    }

    #[test]
    fn malformed_payload_keeps_raw_and_error() {
        let p = CandidatePayload::generated(VariantIndex::FIRST, 2, "{\"layout\": ");
        assert!(p.structured().is_none());
        assert!(p.parse_error().is_some());
        assert_eq!(p.raw(), "{\"layout\": ");
    }

    #[test]
    fn fenced_output_is_unwrapped() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(unwrap_code_fence(raw), "{\"a\": 1}");
        let p = CandidatePayload::external("figma://ref", raw);
        assert_eq!(p.structured().unwrap()["a"], 1);
        assert_eq!(p.variant(), None);
    }

    #[test]
    fn unfenced_output_is_trimmed_only() {
        assert_eq!(unwrap_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn payload_ids_are_unique() {
        let a = CandidatePayload::generated(VariantIndex::FIRST, 1, "{}");
        let b = CandidatePayload::generated(VariantIndex::FIRST, 1, "{}");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.hash(), b.hash());
    }
}
