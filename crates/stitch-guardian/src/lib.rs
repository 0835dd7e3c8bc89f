//! Stitcher Security Guardian
//!
//! Deterministic, allowlist-first sanitization of validated payloads.
//!
//! # Core Concepts
//!
//! - [`SecurityGuardian`]: size ceiling, component allowlist and forensic
//!   string rules, applied in that order
//! - [`SanitizedPayload`]: the only form of payload downstream stages accept;
//!   sealed so a persisted copy can be checked before reuse, and put through
//!   [`SecurityGuardian::recheck`] since the seal alone proves nothing about
//!   who computed it
//! - [`SecurityLog`]: append-only record of every redaction and rejection
//!
//! # Example
//!
//! ```rust
//! use stitch_artifact::{CandidatePayload, VariantIndex};
//! use stitch_guardian::{GuardianConfig, SecurityGuardian, SecurityLog};
//!
//! let guardian = SecurityGuardian::new(GuardianConfig::default()).unwrap();
//! let log = SecurityLog::new();
//! let payload = CandidatePayload::generated(
//!     VariantIndex::FIRST,
//!     1,
//!     r#"{"components": ["hero", "popup"], "headline": "Hi<script>x()</script>"}"#,
//! );
//! let sanitized = guardian.sanitize(&payload, &log).unwrap();
//! assert_eq!(sanitized.components(), ["hero"]);
//! assert_eq!(sanitized.redactions().len(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod guardian;
mod log;
mod rules;
mod sanitized;

pub use config::{GuardianConfig, DEFAULT_ALLOWLIST};
pub use error::SecurityError;
pub use guardian::SecurityGuardian;
pub use log::{SecurityEvent, SecurityLog, SecurityRecord};
pub use rules::{RedactionAction, RuleId, NEUTRALIZED_SCHEME};
pub use sanitized::{Redaction, SanitizedPayload, MAX_FRAGMENT_BYTES};
