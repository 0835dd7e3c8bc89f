//! Assembled artifact
//!
//! The final document produced by the assembly engine. It is created once per
//! run, may be edited in place by bounded diagnostic patch attempts, and is
//! sealed afterwards.

use crate::hash::ContentHash;
use crate::payload::VariantIndex;
use crate::report::{DiagnosticReport, DiagnosticState};
use serde::{Deserialize, Serialize};

/// Errors related to artifact operations
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Mutation attempted after the audit finished
    #[error("artifact {0} is sealed")]
    Sealed(ContentHash),

    /// Hash mismatch (integrity check failed)
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
}

/// Identity of the template graph an artifact was assembled from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Template graph identifier
    pub id: String,
    /// Template graph version
    pub version: u32,
}

impl TemplateRef {
    /// Create new template reference
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

/// Final merged document plus its diagnostic report
///
/// # Invariants
/// - `hash` is always the hash of `document`
/// - once sealed, `document` and `report` never change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledArtifact {
    document: String,
    hash: ContentHash,
    template: TemplateRef,
    source: ContentHash,
    variant: Option<VariantIndex>,
    assets: Vec<String>,
    report: Option<DiagnosticReport>,
    sealed: bool,
}

impl AssembledArtifact {
    /// Create a new, unaudited artifact
    ///
    /// `source` is the seal of the sanitized payload the document was built
    /// from; `assets` are the validated static asset paths it may reference.
    #[must_use]
    pub fn new(
        document: String,
        template: TemplateRef,
        source: ContentHash,
        variant: Option<VariantIndex>,
        assets: Vec<String>,
    ) -> Self {
        let hash = ContentHash::compute(document.as_bytes());
        Self {
            document,
            hash,
            template,
            source,
            variant,
            assets,
            report: None,
            sealed: false,
        }
    }

    /// Document text
    #[inline]
    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Hash of the current document
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Template graph identity
    #[inline]
    #[must_use]
    pub fn template(&self) -> &TemplateRef {
        &self.template
    }

    /// Seal of the sanitized payload this artifact came from
    #[inline]
    #[must_use]
    pub fn source(&self) -> &ContentHash {
        &self.source
    }

    /// Variant the artifact was built from (None for override/patch of external input)
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<VariantIndex> {
        self.variant
    }

    /// Static asset paths validated during assembly
    #[inline]
    #[must_use]
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Diagnostic report, once audited
    #[inline]
    #[must_use]
    pub fn report(&self) -> Option<&DiagnosticReport> {
        self.report.as_ref()
    }

    /// Diagnostic state, once audited
    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<DiagnosticState> {
        self.report.as_ref().map(|r| r.state)
    }

    /// Whether the artifact is sealed
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Replace the document with a patched version
    ///
    /// Returns the hash of the document before the patch.
    ///
    /// # Errors
    /// Returns `ArtifactError::Sealed` after [`Self::seal`]
    pub fn apply_patch(&mut self, document: String) -> Result<ContentHash, ArtifactError> {
        if self.sealed {
            return Err(ArtifactError::Sealed(self.hash));
        }
        let before = self.hash;
        self.hash = ContentHash::compute(document.as_bytes());
        self.document = document;
        Ok(before)
    }

    /// Attach (or replace) the diagnostic report
    ///
    /// # Errors
    /// Returns `ArtifactError::Sealed` after [`Self::seal`]
    pub fn attach_report(&mut self, report: DiagnosticReport) -> Result<(), ArtifactError> {
        if self.sealed {
            return Err(ArtifactError::Sealed(self.hash));
        }
        self.report = Some(report);
        Ok(())
    }

    /// Make the artifact immutable
    #[inline]
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Verify the stored hash against the document
    ///
    /// # Errors
    /// Returns `ArtifactError::HashMismatch` on mismatch
    pub fn verify(&self) -> Result<(), ArtifactError> {
        let actual = ContentHash::compute(self.document.as_bytes());
        if actual == self.hash {
            Ok(())
        } else {
            Err(ArtifactError::HashMismatch {
                expected: self.hash,
                actual,
            })
        }
    }

    /// Consume into the document text
    #[inline]
    #[must_use]
    pub fn into_document(self) -> String {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DiagnosticReport;

    fn artifact(doc: &str) -> AssembledArtifact {
        AssembledArtifact::new(
            doc.to_string(),
            TemplateRef::new("landing", 1),
            ContentHash::compute(b"source"),
            VariantIndex::new(2),
            vec!["css/site.css".into()],
        )
    }

    #[test]
    fn new_artifact_is_unaudited() {
        let a = artifact("<main></main>");
        assert!(a.report().is_none());
        assert!(a.state().is_none());
        assert!(!a.is_sealed());
        assert!(a.verify().is_ok());
    }

    #[test]
    fn patch_updates_hash_and_returns_previous() {
        let mut a = artifact("<main>");
        let original = *a.hash();
        let before = a.apply_patch("<main></main>".into()).unwrap();
        assert_eq!(before, original);
        assert_ne!(*a.hash(), original);
        assert!(a.verify().is_ok());
    }

    #[test]
    fn sealed_artifact_rejects_mutation() {
        let mut a = artifact("<main></main>");
        a.attach_report(DiagnosticReport::from_scan(Vec::new())).unwrap();
        a.seal();
        assert!(matches!(
            a.apply_patch("<p></p>".into()),
            Err(ArtifactError::Sealed(_))
        ));
        assert!(a
            .attach_report(DiagnosticReport::from_scan(Vec::new()))
            .is_err());
        assert_eq!(a.document(), "<main></main>");
    }
}
