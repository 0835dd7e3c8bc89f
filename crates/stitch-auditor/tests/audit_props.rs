use proptest::prelude::*;
use stitch_artifact::{AssembledArtifact, ContentHash, DiagnosticState, TemplateRef};
use stitch_auditor::{scan, DiagnosticAuditor};

fn artifact(doc: String) -> AssembledArtifact {
    AssembledArtifact::new(
        doc,
        TemplateRef::new("landing", 1),
        ContentHash::compute(b"seal"),
        None,
        Vec::new(),
    )
}

fn piece() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "<div>", "</div>", "<section>", "</section>", "<p>", "</p>", "<span>", "</span>",
        "<br>", "text", "{{TOKEN}}", "<a id=\"x\">", "</a>", "<i class=\"\">", "</i>",
        "<a href=\"#x\">", "<img src=\"img/missing.png\">",
    ])
}

fn well_formed(depth: u32) -> BoxedStrategy<String> {
    let leaf = "[a-z ]{0,8}".boxed();
    leaf.prop_recursive(depth, 32, 4, |inner| {
        (
            prop::sample::select(vec!["div", "section", "p", "span"]),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(tag, children)| format!("<{tag}>{}</{tag}>", children.concat()))
    })
    .boxed()
}

proptest! {
    /// Tenet: the auditor never spends more patch attempts than its budget
    #[test]
    fn prop_patch_budget_never_exceeded(
        pieces in prop::collection::vec(piece(), 0..40),
        budget in 0u32..4,
    ) {
        let mut a = artifact(pieces.concat());
        let state = DiagnosticAuditor::new(budget).audit(&mut a).unwrap();
        let report = a.report().unwrap();

        prop_assert!(state.is_terminal());
        prop_assert!(report.patches.len() <= budget as usize);
        prop_assert!(a.is_sealed());
        prop_assert!(a.verify().is_ok());
        if state == DiagnosticState::Clean {
            prop_assert!(scan(a.document(), a.assets()).is_empty());
        } else {
            prop_assert_eq!(report.patches.len(), budget as usize);
        }
    }

    /// Tenet: a structurally sound document passes through byte-identical
    #[test]
    fn prop_clean_documents_untouched(doc in well_formed(4)) {
        let mut a = artifact(doc.clone());
        let state = DiagnosticAuditor::default().audit(&mut a).unwrap();
        prop_assert_eq!(state, DiagnosticState::Clean);
        prop_assert_eq!(a.document(), doc.as_str());
    }
}
