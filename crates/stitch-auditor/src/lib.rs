//! # Stitch Auditor
//!
//! Structural audit of assembled documents with bounded autonomous repair.
//!
//! # Core Concepts
//!
//! - **Scan**: one pass over the markup reporting unclosed and stray tags,
//!   duplicate ids, leftover `{{TOKEN}}`s, broken references and empty class
//!   attributes
//! - **Scoped patch**: each defect maps to a local edit; bytes outside the
//!   defect spans are never rewritten
//! - **Budget**: at most `max_patch_attempts` patch passes before the
//!   artifact is declared unrecoverable
//!
//! ```
//! use stitch_artifact::{AssembledArtifact, ContentHash, DiagnosticState, TemplateRef};
//! use stitch_auditor::DiagnosticAuditor;
//!
//! let mut artifact = AssembledArtifact::new(
//!     "<main><section>hi</main>".into(),
//!     TemplateRef::new("landing", 1),
//!     ContentHash::compute(b"seal"),
//!     None,
//!     Vec::new(),
//! );
//! let state = DiagnosticAuditor::default().audit(&mut artifact).unwrap();
//! assert_eq!(state, DiagnosticState::Clean);
//! assert_eq!(artifact.document(), "<main><section>hi</section></main>");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod auditor;
mod error;
mod patch;
mod scan;

pub use auditor::{DiagnosticAuditor, DEFAULT_MAX_PATCH_ATTEMPTS};
pub use error::AuditError;
pub use patch::{patch, Patch, DEAD_LINK};
pub use scan::scan;
