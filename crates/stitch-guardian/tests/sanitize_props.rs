use proptest::prelude::*;
use regex::Regex;
use serde_json::json;
use stitch_artifact::{CandidatePayload, VariantIndex};
use stitch_guardian::{
    GuardianConfig, RuleId, SecurityError, SecurityGuardian, SecurityLog, DEFAULT_ALLOWLIST,
};

fn component() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(DEFAULT_ALLOWLIST).prop_map(str::to_string),
        "[a-z_]{1,12}",
    ]
}

/// Text that one rule removes, splicing its neighbours back together
fn breaker() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "",
        "<iframe>",
        "<embed src=x>",
        "</object>",
        "document.cookie",
        "DOCUMENT.Cookie",
    ])
    .prop_map(str::to_string)
}

/// `word` with a breaker pushed in at any byte position
fn spliced(word: &'static str) -> impl Strategy<Value = String> {
    (0..=word.len(), breaker()).prop_map(move |(at, inner)| {
        format!("{}{inner}{}", &word[..at], &word[at..])
    })
}

fn blacklisting_guardian() -> SecurityGuardian {
    SecurityGuardian::new(GuardianConfig::default().with_extra_pattern(r"document\.cookie"))
        .unwrap()
}

proptest! {
    /// Tenet: a component id off the allowlist never reaches assembly
    #[test]
    fn prop_disallowed_components_never_survive(
        components in prop::collection::vec(component(), 1..10)
    ) {
        let guardian = SecurityGuardian::new(GuardianConfig::default()).unwrap();
        let log = SecurityLog::new();
        let raw = json!({"components": components, "headline": "Hello"}).to_string();
        let payload = CandidatePayload::generated(VariantIndex::FIRST, 1, raw);

        let disallowed: Vec<&String> = components
            .iter()
            .filter(|c| !DEFAULT_ALLOWLIST.contains(&c.as_str()))
            .collect();

        match guardian.sanitize(&payload, &log) {
            Ok(sanitized) => {
                for id in sanitized.components() {
                    prop_assert!(DEFAULT_ALLOWLIST.contains(&id.as_str()));
                }
                let dropped = sanitized
                    .redactions()
                    .iter()
                    .filter(|r| r.rule == RuleId::DisallowedComponent)
                    .count();
                prop_assert_eq!(dropped, disallowed.len());
            }
            Err(SecurityError::DisallowedComponent { rejected, .. }) => {
                prop_assert_eq!(rejected.len(), components.len());
                prop_assert_eq!(log.rejections(), 1);
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    /// Tenet: script tags cannot be smuggled through any string field
    #[test]
    fn prop_no_script_opener_survives(prefix in ".{0,20}", suffix in ".{0,20}") {
        let guardian = SecurityGuardian::new(GuardianConfig::default()).unwrap();
        let headline = format!("{prefix}<scr<script></script>ipt>{suffix}");
        let raw = json!({"components": ["hero"], "headline": headline}).to_string();
        let payload = CandidatePayload::generated(VariantIndex::FIRST, 1, raw);

        if let Ok(sanitized) = guardian.sanitize(&payload, &SecurityLog::new()) {
            let text = sanitized.fields()["headline"].as_str().unwrap_or_default().to_lowercase();
            prop_assert!(!text.contains("<script"));
        }
    }

    /// Tenet: removing one fragment never rebuilds another, and sanitized
    /// output passes through the guardian again untouched
    #[test]
    fn prop_spliced_fragments_never_reassemble(
        prefix in "[a-zA-Z ]{0,12}",
        opener in spliced("<script>"),
        closer in spliced("</script>"),
        handler in spliced(" onclick="),
        nested in spliced("<script src=x>"),
        suffix in "[a-zA-Z ]{0,12}",
    ) {
        let handler_attr = Regex::new(r"(?i)<[^>]*[\s/'\x22]on[a-z]+\s*=\s*[^\s>]").unwrap();
        let guardian = blacklisting_guardian();
        let log = SecurityLog::new();
        let headline = format!("{prefix}{opener}x(){closer}<a{handler}steal()>{nested}{suffix}");
        let raw = json!({"components": ["hero"], "headline": headline}).to_string();
        let payload = CandidatePayload::generated(VariantIndex::FIRST, 1, raw);

        let sanitized = guardian.sanitize(&payload, &log).unwrap();
        let text = sanitized.fields()["headline"].as_str().unwrap_or_default();
        prop_assert!(!text.to_lowercase().contains("<script"), "{}", text);
        prop_assert!(!handler_attr.is_match(text), "{}", text);
        prop_assert!(guardian.recheck(&sanitized, &log).is_ok());

        let again = CandidatePayload::generated(VariantIndex::FIRST, 2, sanitized.fields().to_string());
        let twice = guardian.sanitize(&again, &log).unwrap();
        prop_assert!(twice.redactions().is_empty());
        prop_assert_eq!(twice.fields(), sanitized.fields());
    }
}

#[test]
fn oversized_payload_is_rejected_whole() {
    let guardian = SecurityGuardian::new(GuardianConfig::default()).unwrap();
    let log = SecurityLog::new();
    let raw = json!({"components": ["hero"], "headline": "x".repeat(600_000)}).to_string();
    let payload = CandidatePayload::generated(VariantIndex::FIRST, 1, raw);

    let err = guardian.sanitize(&payload, &log).unwrap_err();
    assert!(matches!(
        err,
        SecurityError::PayloadTooLarge { max: 500_000, .. }
    ));
    assert_eq!(log.len(), 1);
    assert!(!payload.is_parsed());
}
