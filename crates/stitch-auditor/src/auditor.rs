//! Diagnostic auditor
//!
//! Drives the diagnostic state machine for one artifact: scan, then at most
//! `max_patch_attempts` scoped patch passes, each followed by a re-scan. The
//! artifact is sealed with its report whichever terminal state is reached.

use crate::error::AuditError;
use crate::patch::patch;
use crate::scan::scan;
use stitch_artifact::{
    ArtifactError, AssembledArtifact, Defect, DiagnosticReport, DiagnosticState, PatchRecord,
};
use tracing::{debug, error, info, warn};

/// Default number of autonomous patch attempts
pub const DEFAULT_MAX_PATCH_ATTEMPTS: u32 = 2;

/// Structural auditor with a bounded patch budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticAuditor {
    max_patch_attempts: u32,
}

impl Default for DiagnosticAuditor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATCH_ATTEMPTS)
    }
}

impl DiagnosticAuditor {
    /// Create an auditor; zero disables patching
    #[inline]
    #[must_use]
    pub fn new(max_patch_attempts: u32) -> Self {
        Self { max_patch_attempts }
    }

    /// Patch budget
    #[inline]
    #[must_use]
    pub fn max_patch_attempts(&self) -> u32 {
        self.max_patch_attempts
    }

    /// Scan without touching the artifact
    #[must_use]
    pub fn scan(&self, artifact: &AssembledArtifact) -> Vec<Defect> {
        scan(artifact.document(), artifact.assets())
    }

    /// Audit, patch and seal `artifact`
    ///
    /// Returns the terminal state, which is also recorded on the artifact.
    ///
    /// # Errors
    /// Returns `AuditError::Artifact` if the artifact is already sealed
    pub fn audit(&self, artifact: &mut AssembledArtifact) -> Result<DiagnosticState, AuditError> {
        if artifact.is_sealed() {
            return Err(ArtifactError::Sealed(*artifact.hash()).into());
        }

        let mut report = DiagnosticReport::from_scan(self.scan(artifact));
        let mut attempt = 0_u32;

        while !report.state.is_terminal() {
            if attempt >= self.max_patch_attempts {
                report.transition(DiagnosticState::Unrecoverable);
                break;
            }
            attempt += 1;

            let pass = patch(artifact.document(), &report.defects);
            let before = artifact.apply_patch(pass.document)?;
            report.transition(DiagnosticState::Patched);

            let remaining = self.scan(artifact);
            let record = PatchRecord {
                attempt,
                targeted: pass.targeted,
                edits: pass.edits,
                before,
                after: *artifact.hash(),
                remaining: remaining.len(),
            };
            warn!(
                attempt,
                edits = record.edits.len(),
                remaining = record.remaining,
                "Autonomous patch applied: {}",
                record.diff_summary()
            );
            report.patches.push(record);
            report.defects = remaining;
            report.transition(if report.defects.is_empty() {
                DiagnosticState::Clean
            } else {
                DiagnosticState::Defective
            });
        }

        let state = report.state;
        match state {
            DiagnosticState::Clean => info!(
                hash = %artifact.hash().short(),
                patches = report.patches.len(),
                "Artifact clean"
            ),
            _ => error!(
                hash = %artifact.hash().short(),
                defects = report.defects.len(),
                patches = report.patches.len(),
                "Artifact unrecoverable"
            ),
        }
        for defect in &report.defects {
            debug!(%defect, "Remaining defect");
        }

        artifact.attach_report(report)?;
        artifact.seal();
        Ok(state)
    }
}
