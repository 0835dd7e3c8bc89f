//! Error types for the auditor

use stitch_artifact::ArtifactError;
use thiserror::Error;

/// Errors raised while auditing
#[derive(Debug, Error)]
pub enum AuditError {
    /// The artifact refused a mutation (already sealed)
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
