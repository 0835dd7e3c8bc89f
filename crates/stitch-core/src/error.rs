//! Error types for the pipeline
//!
//! Stage errors convert into [`PipelineError`] with `#[from]`. Security and
//! assembly failures are fail-closed: nothing downstream runs and no artifact
//! is produced. An unrecoverable audit is the one failure that still carries
//! its artifact, flagged, for a human to inspect.

use stitch_artifact::{AssembledArtifact, ContentHash, VariantIndex};
use stitch_assembly::{AssemblyError, TemplateError};
use stitch_auditor::AuditError;
use stitch_guardian::SecurityError;
use stitch_schema::{SchemaError, SchemaId, ValidationResult};

/// Repair budget spent without a valid payload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("variant {variant} exhausted {attempts} generation attempts ({} violations on the last)", .last.errors.len())]
pub struct RepairExhausted {
    /// Variant that failed
    pub variant: VariantIndex,
    /// Generator calls made
    pub attempts: u32,
    /// Validation outcome of the last attempt
    pub last: ValidationResult,
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A variant never produced a valid payload
    #[error(transparent)]
    RepairExhausted(#[from] RepairExhausted),

    /// The guardian rejected the payload
    #[error("security rejection: {0}")]
    Security(#[from] SecurityError),

    /// Assembly failed
    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    /// Template graph could not be loaded
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Schema could not be loaded
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The auditor could not run
    #[error("audit failed: {0}")]
    Audit(#[from] AuditError),

    /// Still defective after the patch budget; the artifact is flagged, not clean
    #[error("artifact {} unrecoverable: {} defects remain", .artifact.hash().short(), .artifact.report().map_or(0, |r| r.defects.len()))]
    Unrecoverable {
        /// The sealed, flagged artifact
        artifact: Box<AssembledArtifact>,
    },

    /// Every variant exhausted its repair budget
    #[error("no viable variant: all {exhausted} variants failed")]
    NoViableVariant { exhausted: usize },

    /// The selector picked a variant that has no valid payload
    #[error("invalid selection: {variant} has no valid payload")]
    InvalidSelection { variant: VariantIndex },

    /// The run was cancelled before selection
    #[error("run cancelled")]
    Cancelled,

    /// A persisted sanitized payload no longer matches its seal
    #[error("seal mismatch: expected {expected}, found {actual}")]
    SealMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured schema is not registered
    #[error("unknown schema: {0}")]
    UnknownSchema(SchemaId),
}

impl PipelineError {
    /// Whether a human has to step in (pick another variant, fix the input)
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(
            self,
            Self::Unrecoverable { .. }
                | Self::NoViableVariant { .. }
                | Self::InvalidSelection { .. }
                | Self::RepairExhausted(_)
        )
    }

    /// Whether the failure came from a fail-closed safety check
    #[inline]
    #[must_use]
    pub fn is_fail_closed(&self) -> bool {
        matches!(
            self,
            Self::Security(_)
                | Self::SealMismatch { .. }
                | Self::Assembly(AssemblyError::PathTraversal { .. })
        )
    }

    /// Flagged artifact, for unrecoverable audits
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> Option<&AssembledArtifact> {
        match self {
            Self::Unrecoverable { artifact } => Some(artifact),
            _ => None,
        }
    }

    /// Map a seal check failure onto the pipeline error space
    pub(crate) fn from_seal(err: SecurityError) -> Self {
        match err {
            SecurityError::Tampered { expected, actual } => Self::SealMismatch { expected, actual },
            other => Self::Security(other),
        }
    }
}
