//! Structural diagnostic report attached to an assembled artifact

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic state machine over an assembled artifact
///
/// ```text
/// scan ──► Clean (terminal)
///   └────► Defective ──patch──► Patched ──rescan──► Clean
///              ▲                   │
///              └──── defects ──────┘   budget exhausted ──► Unrecoverable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticState {
    /// No structural defects
    Clean,
    /// Defects found, patch budget remaining
    Defective,
    /// A patch attempt was applied and awaits re-scan
    Patched,
    /// Still defective after the patch budget was spent
    Unrecoverable,
}

impl DiagnosticState {
    /// Whether no further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Clean | Self::Unrecoverable)
    }
}

impl fmt::Display for DiagnosticState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clean => "CLEAN",
            Self::Defective => "DEFECTIVE",
            Self::Patched => "PATCHED",
            Self::Unrecoverable => "UNRECOVERABLE",
        };
        f.write_str(s)
    }
}

/// Classes of structural defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// Opening tag never closed (or closed out of order)
    UnclosedTag,
    /// Closing tag with no matching opener
    StrayClosingTag,
    /// `id` attribute value used more than once
    DuplicateId,
    /// `{{TOKEN}}` left in the output
    UnresolvedToken,
    /// Relative reference pointing nowhere
    BrokenReference,
    /// `class=""` with nothing in it
    EmptyClassAttribute,
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnclosedTag => "unclosed_tag",
            Self::StrayClosingTag => "stray_closing_tag",
            Self::DuplicateId => "duplicate_id",
            Self::UnresolvedToken => "unresolved_token",
            Self::BrokenReference => "broken_reference",
            Self::EmptyClassAttribute => "empty_class_attribute",
        };
        f.write_str(s)
    }
}

/// One diagnosed defect
///
/// `offset`/`len` locate the span a scoped patch should touch. For
/// [`DefectKind::UnclosedTag`] the span is empty and marks where the closing
/// tag belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    /// Defect class
    pub kind: DefectKind,
    /// Byte offset into the document
    pub offset: usize,
    /// Length of the affected span in bytes
    pub len: usize,
    /// Tag name, id value, token name or reference, depending on kind
    pub subject: String,
}

impl Defect {
    /// Create a new defect
    #[inline]
    #[must_use]
    pub fn new(kind: DefectKind, offset: usize, len: usize, subject: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            len,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` at byte {}", self.kind, self.subject, self.offset)
    }
}

/// A single scoped edit, summarized for the patch log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSummary {
    /// Byte offset of the edit in the pre-edit document
    pub offset: usize,
    /// Text removed
    pub removed: String,
    /// Text inserted
    pub inserted: String,
}

impl fmt::Display for EditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} -{:?} +{:?}", self.offset, self.removed, self.inserted)
    }
}

/// Log entry for one autonomous patch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    /// One-based attempt number
    pub attempt: u32,
    /// Defect kinds this attempt targeted
    pub targeted: Vec<DefectKind>,
    /// Edits applied, in application order
    pub edits: Vec<EditSummary>,
    /// Document hash before the attempt
    pub before: ContentHash,
    /// Document hash after the attempt
    pub after: ContentHash,
    /// Defects reported by the re-scan
    pub remaining: usize,
}

impl PatchRecord {
    /// One-line diff summary
    #[must_use]
    pub fn diff_summary(&self) -> String {
        let edits: Vec<String> = self.edits.iter().map(ToString::to_string).collect();
        format!(
            "attempt {}: {} -> {} ({} edits; {} defects remain) {}",
            self.attempt,
            self.before.short(),
            self.after.short(),
            self.edits.len(),
            self.remaining,
            edits.join("; ")
        )
    }
}

/// Structural diagnostic report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Final state
    pub state: DiagnosticState,
    /// Every state visited, in order
    pub transitions: Vec<DiagnosticState>,
    /// Defects found by the first scan
    pub initial_defects: Vec<Defect>,
    /// Defects found by the last scan
    pub defects: Vec<Defect>,
    /// Patch attempts, in order
    pub patches: Vec<PatchRecord>,
}

impl DiagnosticReport {
    /// Start a report from the initial scan
    #[must_use]
    pub fn from_scan(defects: Vec<Defect>) -> Self {
        let state = if defects.is_empty() {
            DiagnosticState::Clean
        } else {
            DiagnosticState::Defective
        };
        Self {
            state,
            transitions: vec![state],
            initial_defects: defects.clone(),
            defects,
            patches: Vec::new(),
        }
    }

    /// Record a transition
    pub fn transition(&mut self, next: DiagnosticState) {
        self.state = next;
        self.transitions.push(next);
    }

    /// Whether the report ends clean
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.state == DiagnosticState::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_scan_starts_clean() {
        let report = DiagnosticReport::from_scan(Vec::new());
        assert!(report.is_clean());
        assert_eq!(report.transitions, vec![DiagnosticState::Clean]);
    }

    #[test]
    fn defective_scan_tracks_transitions() {
        let mut report = DiagnosticReport::from_scan(vec![Defect::new(
            DefectKind::UnclosedTag,
            10,
            0,
            "div",
        )]);
        report.transition(DiagnosticState::Patched);
        report.transition(DiagnosticState::Clean);
        assert_eq!(
            report.transitions,
            vec![
                DiagnosticState::Defective,
                DiagnosticState::Patched,
                DiagnosticState::Clean
            ]
        );
        assert_eq!(report.initial_defects.len(), 1);
    }

    #[test]
    fn state_display_is_uppercase() {
        assert_eq!(DiagnosticState::Unrecoverable.to_string(), "UNRECOVERABLE");
        assert!(DiagnosticState::Clean.is_terminal());
        assert!(!DiagnosticState::Patched.is_terminal());
    }

    #[test]
    fn edit_summary_display() {
        let edit = EditSummary {
            offset: 4,
            removed: String::new(),
            inserted: "</div>".into(),
        };
        assert_eq!(edit.to_string(), "@4 -\"\" +\"</div>\"");
    }
}
