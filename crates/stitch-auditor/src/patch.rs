//! Scoped patches
//!
//! Every defect maps to one local edit. Edits never touch bytes outside the
//! defect's own span, so markup that was already fine stays byte-identical.

use crate::scan::collect_ids;
use std::collections::HashSet;
use stitch_artifact::{Defect, DefectKind, EditSummary};

/// Placeholder target for references that point nowhere
pub const DEAD_LINK: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    inserted: String,
}

/// Outcome of one patch pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Patched document
    pub document: String,
    /// Edits applied, in application order
    pub edits: Vec<EditSummary>,
    /// Defect kinds the pass targeted
    pub targeted: Vec<DefectKind>,
}

/// Build and apply one scoped edit per defect
#[must_use]
pub fn patch(document: &str, defects: &[Defect]) -> Patch {
    let mut taken = collect_ids(document);
    let mut edits: Vec<Edit> = Vec::with_capacity(defects.len());

    for defect in defects {
        let end = defect.offset + defect.len;
        if end > document.len() || !document.is_char_boundary(defect.offset) || !document.is_char_boundary(end) {
            continue;
        }
        let inserted = match defect.kind {
            DefectKind::UnclosedTag => {
                let closer = format!("</{}>", defect.subject);
                // Closers for the same position stack up innermost first.
                if let Some(prev) = edits
                    .iter_mut()
                    .find(|e| e.start == defect.offset && e.end == defect.offset)
                {
                    prev.inserted.push_str(&closer);
                    continue;
                }
                closer
            }
            DefectKind::DuplicateId => unique_id(&defect.subject, &mut taken),
            DefectKind::BrokenReference => DEAD_LINK.to_string(),
            DefectKind::StrayClosingTag
            | DefectKind::UnresolvedToken
            | DefectKind::EmptyClassAttribute => String::new(),
        };
        edits.push(Edit {
            start: defect.offset,
            end,
            inserted,
        });
    }

    edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut out = document.to_string();
    let mut summaries = Vec::with_capacity(edits.len());
    let mut limit = document.len();
    for edit in edits {
        if edit.end > limit {
            continue;
        }
        summaries.push(EditSummary {
            offset: edit.start,
            removed: document[edit.start..edit.end].to_string(),
            inserted: edit.inserted.clone(),
        });
        out.replace_range(edit.start..edit.end, &edit.inserted);
        limit = edit.start;
    }

    let mut targeted: Vec<DefectKind> = defects.iter().map(|d| d.kind).collect();
    targeted.sort_unstable();
    targeted.dedup();

    Patch {
        document: out,
        edits: summaries,
        targeted,
    }
}

fn unique_id(id: &str, taken: &mut HashSet<String>) -> String {
    let mut n = 2_u32;
    loop {
        let candidate = format!("{id}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan;
    use pretty_assertions::assert_eq;

    fn fix(doc: &str) -> Patch {
        patch(doc, &scan(doc, &[]))
    }

    #[test]
    fn closes_unclosed_tags_in_place() {
        let p = fix("<main><div><span>x</main>");
        assert_eq!(p.document, "<main><div><span>x</span></div></main>");
        assert_eq!(p.edits.len(), 1);
        assert_eq!(p.targeted, vec![DefectKind::UnclosedTag]);
    }

    #[test]
    fn closes_at_end_of_document() {
        assert_eq!(fix("<section><p>hi</p>").document, "<section><p>hi</p></section>");
    }

    #[test]
    fn removes_stray_closer() {
        assert_eq!(fix("<p>x</p></div><i></i>").document, "<p>x</p><i></i>");
    }

    #[test]
    fn renames_duplicate_ids() {
        let p = fix(r#"<a id="x"></a><b id="x"></b><c id="x-2"></c><d id="x"></d>"#);
        assert_eq!(
            p.document,
            r#"<a id="x"></a><b id="x-3"></b><c id="x-2"></c><d id="x-4"></d>"#
        );
    }

    #[test]
    fn strips_tokens_and_empty_classes() {
        let p = fix(r#"<h1 class="">{{HEADLINE}}</h1><p class="lead">ok</p>"#);
        assert_eq!(p.document, r#"<h1></h1><p class="lead">ok</p>"#);
        assert_eq!(
            p.targeted,
            vec![DefectKind::UnresolvedToken, DefectKind::EmptyClassAttribute]
        );
    }

    #[test]
    fn neutralizes_broken_references() {
        let p = fix(r##"<a href="#nowhere">a</a><img src="img/gone.png">"##);
        assert_eq!(p.document, r##"<a href="#">a</a><img src="#">"##);
    }

    #[test]
    fn untouched_bytes_survive() {
        let doc = "<header>keep</header><div>tail";
        let p = fix(doc);
        assert!(p.document.starts_with("<header>keep</header><div>tail"));
        assert_eq!(p.document, "<header>keep</header><div>tail</div>");
    }

    #[test]
    fn overlapping_edits_are_skipped() {
        let defects = vec![
            Defect::new(DefectKind::UnresolvedToken, 0, 6, "{{AB}}"),
            Defect::new(DefectKind::StrayClosingTag, 2, 2, "x"),
        ];
        let p = patch("{{AB}}", &defects);
        assert_eq!(p.edits.len(), 1);
        assert_eq!(p.document, "{{}}");
    }
}
