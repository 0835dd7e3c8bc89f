//! Stitcher Artifact Model
//!
//! Content-addressed payloads and documents shared by every pipeline stage.
//!
//! # Core Concepts
//!
//! - [`CandidatePayload`]: immutable raw generator output with parsed structure
//! - [`VariantIndex`]: one-based index of a design variant within a run
//! - [`AssembledArtifact`]: the merged document, patched only by the auditor
//! - [`DiagnosticReport`]: structural scan results and patch log
//! - [`ContentHash`]: 32-byte Blake3 hash linking all of the above
//!
//! # Example
//!
//! ```rust
//! use stitch_artifact::{CandidatePayload, VariantIndex};
//!
//! let payload = CandidatePayload::generated(VariantIndex::FIRST, 1, r#"{"layout": "bento_grid"}"#);
//! assert!(payload.structured().is_some());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod hash;
mod payload;
mod report;

pub use artifact::{ArtifactError, AssembledArtifact, TemplateRef};
pub use hash::{ContentHash, HashError};
pub use payload::{unwrap_code_fence, CandidatePayload, PayloadId, PayloadOrigin, VariantIndex};
pub use report::{
    Defect, DefectKind, DiagnosticReport, DiagnosticState, EditSummary, PatchRecord,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
