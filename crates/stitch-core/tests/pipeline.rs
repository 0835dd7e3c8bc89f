//! End-to-end runs through one orchestrator: repair, assembly, audit and the
//! override and patch modes.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stitch_artifact::{
    CandidatePayload, ContentHash, DiagnosticState, PayloadId, PayloadOrigin, VariantIndex,
};
use stitch_assembly::{AssemblyError, InjectionMap, UnresolvedReason};
use stitch_core::{
    FirstViable, FullRun, GenerationRequest, Orchestrator, PipelineConfig, PipelineError,
    RepairLoop, RunContext, Stage, TraceLog,
};
use stitch_guardian::{Redaction, RuleId, SanitizedPayload, SecurityError, SecurityLog};
use stitch_schema::{Schema, SchemaId, SchemaValidator};
use stitch_test_utils::{
    incomplete_variant_json, landing_injections, landing_template,
    landing_template_with_unclosed_tag, valid_variant, valid_variant_json, ScriptedGenerator,
};

fn single_variant() -> PipelineConfig {
    PipelineConfig::new()
        .with_variant_count(1)
        .with_research(false)
}

fn traced() -> (Arc<TraceLog>, RunContext) {
    let log = Arc::new(TraceLog::new());
    let ctx = RunContext::new(log.clone());
    (log, ctx)
}

fn brief() -> FullRun {
    FullRun::new("Luxury pet spa, calm and premium").with_injections(landing_injections())
}

/// Recompute the seal over an edited stored payload, part for part
fn reseal(stored: &mut serde_json::Value) {
    let source: PayloadId = serde_json::from_value(stored["source"].clone()).unwrap();
    let source_hash: ContentHash = serde_json::from_value(stored["source_hash"].clone()).unwrap();
    let origin: PayloadOrigin = serde_json::from_value(stored["origin"].clone()).unwrap();
    let components: Vec<String> = serde_json::from_value(stored["components"].clone()).unwrap();
    let redactions: Vec<Redaction> =
        serde_json::from_value(stored["redactions"].clone()).unwrap();

    let source = source.to_string();
    let origin = serde_json::to_vec(&origin).unwrap();
    let fields = serde_json::to_vec(&stored["fields"]).unwrap();
    let components = serde_json::to_vec(&components).unwrap();
    let redactions = serde_json::to_vec(&redactions).unwrap();
    let seal = ContentHash::compute_parts([
        source.as_bytes(),
        source_hash.as_bytes().as_slice(),
        origin.as_slice(),
        fields.as_slice(),
        components.as_slice(),
        redactions.as_slice(),
    ]);
    stored["seal"] = serde_json::to_value(seal).unwrap();
}

#[tokio::test]
async fn repairs_twice_then_assembles_clean() {
    let generator = Arc::new(ScriptedGenerator::new([
        Ok("Sure! Here is the design you asked for.".to_string()),
        Ok(incomplete_variant_json()),
        Ok(valid_variant_json("Serene Minimal")),
    ]));
    let orchestrator =
        Orchestrator::new(single_variant(), generator.clone(), landing_template()).unwrap();
    let (log, ctx) = traced();

    let out = orchestrator.run_full(brief(), &FirstViable, &ctx).await.unwrap();

    assert_eq!(generator.calls(), 3);
    let prompts = generator.prompts();
    assert_eq!(
        prompts.iter().map(|p| p.feedback.len()).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(prompts[2].prompt().contains("FIX"));

    assert_eq!(out.artifact.state(), Some(DiagnosticState::Clean));
    assert!(out.artifact.is_sealed());
    out.artifact.verify().unwrap();
    assert_eq!(out.artifact.source(), out.sanitized.seal());
    assert!(out.artifact.document().contains("<h1>Grooming, elevated</h1>"));
    assert!(out.artifact.document().contains("$85"));
    assert_eq!(out.artifact.assets(), ["css/site.css", "img/hero.webp"]);

    assert_eq!(log.for_stage(Stage::Generation).len(), 1);
    assert_eq!(log.for_stage(Stage::Repair).len(), 2);
    assert_eq!(log.for_stage(Stage::Audit).len(), 1);
    log.verify_integrity().unwrap();
}

#[tokio::test]
async fn repair_ceiling_is_never_exceeded() {
    let generator = Arc::new(ScriptedGenerator::always(Ok(incomplete_variant_json())));
    let config = single_variant().with_max_repair_attempts(4);
    let orchestrator = Orchestrator::new(config, generator.clone(), landing_template()).unwrap();
    let ctx = RunContext::default();

    let err = orchestrator
        .run_full(brief(), &FirstViable, &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NoViableVariant { exhausted: 1 }));
    assert!(err.requires_human());
    assert_eq!(generator.calls(), 4);
}

#[tokio::test]
async fn timeouts_consume_repair_attempts() {
    let schema = Arc::new(Schema::design_variant());
    let repair = RepairLoop::new(SchemaValidator::new(schema), Duration::from_millis(50));
    let generator =
        ScriptedGenerator::always(Ok(valid_variant_json("Too slow"))).with_delay(Duration::from_millis(500));
    let request = GenerationRequest::new(VariantIndex::FIRST, SchemaId::from("design_variant"), "brief");

    let exhausted = repair
        .generate_valid(request, &generator, &RunContext::default())
        .await
        .unwrap_err();

    assert_eq!(exhausted.attempts, 3);
    assert_eq!(generator.calls(), 3);
    assert!(exhausted.last.feedback().contains("timed out"));
}

#[tokio::test]
async fn missing_injection_produces_no_artifact() {
    let generator = Arc::new(ScriptedGenerator::always(Ok(valid_variant_json("Serene"))));
    let orchestrator = Orchestrator::new(single_variant(), generator, landing_template()).unwrap();
    let (log, ctx) = traced();
    let injections = InjectionMap::new()
        .with("brand.name", "Luxury Pet Spa")
        .with("cta.url", "https://example.com/book");

    let err = orchestrator
        .run_full(FullRun::new("brief").with_injections(injections), &FirstViable, &ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Assembly(AssemblyError::UnresolvedSlot {
            ref slot,
            reason: UnresolvedReason::MissingInjection(_),
        }) if slot == "PRICE"
    ));
    assert!(err.artifact().is_none());
    assert_eq!(log.for_stage(Stage::Assembly).len(), 1);
    assert!(log.for_stage(Stage::Audit).is_empty());
}

#[tokio::test]
async fn unclosed_tag_is_patched_to_clean() {
    let generator = Arc::new(ScriptedGenerator::always(Ok(valid_variant_json("Serene"))));
    let orchestrator =
        Orchestrator::new(single_variant(), generator, landing_template_with_unclosed_tag())
            .unwrap();
    let (log, ctx) = traced();

    let out = orchestrator.run_full(brief(), &FirstViable, &ctx).await.unwrap();

    let report = out.artifact.report().unwrap();
    assert_eq!(
        report.transitions,
        vec![
            DiagnosticState::Defective,
            DiagnosticState::Patched,
            DiagnosticState::Clean
        ]
    );
    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.initial_defects.len(), 1);
    assert!(out.artifact.document().contains("</h2></div></section>"));
    assert!(log.for_stage(Stage::Audit)[0]
        .rationale
        .contains("DEFECTIVE -> PATCHED -> CLEAN"));
}

#[tokio::test]
async fn exhausted_patch_budget_returns_flagged_artifact() {
    let generator = Arc::new(ScriptedGenerator::always(Ok(valid_variant_json("Serene"))));
    let config = single_variant().with_max_patch_attempts(0);
    let orchestrator =
        Orchestrator::new(config, generator, landing_template_with_unclosed_tag()).unwrap();

    let err = orchestrator
        .run_full(brief(), &FirstViable, &RunContext::default())
        .await
        .unwrap_err();

    let artifact = err.artifact().unwrap();
    assert!(artifact.is_sealed());
    assert_eq!(artifact.state(), Some(DiagnosticState::Unrecoverable));
    assert_eq!(artifact.report().unwrap().defects.len(), 1);
    assert!(err.requires_human());
}

#[test]
fn override_goes_through_the_guardian() {
    let generator = Arc::new(ScriptedGenerator::new([]));
    let orchestrator =
        Orchestrator::new(single_variant(), generator.clone(), landing_template()).unwrap();
    let security = Arc::new(SecurityLog::new());
    let log = Arc::new(TraceLog::new());
    let ctx = RunContext::new(log.clone()).with_security_log(security.clone());

    let mut design = valid_variant("Hand made");
    design["components"] = json!(["Hero", "carousel", "footer"]);
    design["headline"] = json!("<script>alert(1)</script>Grooming, elevated");

    let out = orchestrator
        .run_override("figma://landing/v7", &design.to_string(), &landing_injections(), &ctx)
        .unwrap();

    assert_eq!(generator.calls(), 0);
    assert_eq!(out.sanitized.components(), ["hero", "footer"]);
    assert!(!out.artifact.document().contains("<script"));
    assert!(!out.artifact.document().contains("carousel"));
    assert!(out.artifact.document().contains("<h1>Grooming, elevated</h1>"));

    let rules: Vec<RuleId> = security.redactions().into_iter().map(|r| r.rule).collect();
    assert!(rules.contains(&RuleId::DisallowedComponent));
    assert!(rules.contains(&RuleId::ScriptBlock));

    assert_eq!(log.for_stage(Stage::Override).len(), 1);
    assert!(log.for_stage(Stage::Generation).is_empty());
    assert_eq!(out.artifact.variant(), None);
}

#[test]
fn override_rejects_unparseable_structure() {
    let orchestrator = Orchestrator::new(
        single_variant(),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap();

    let err = orchestrator
        .run_override("upload", "<html>not json</html>", &landing_injections(), &RunContext::default())
        .unwrap_err();

    assert!(matches!(err, PipelineError::Security(_)));
    assert!(err.is_fail_closed());
}

#[test]
fn patch_mode_reassembles_persisted_payload() {
    let orchestrator = Orchestrator::new(
        single_variant(),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap();
    let first = orchestrator
        .run_override(
            "upload",
            &valid_variant_json("Persisted"),
            &landing_injections(),
            &RunContext::default(),
        )
        .unwrap();

    let stored = serde_json::to_string(&first.sanitized).unwrap();
    let restored: SanitizedPayload = serde_json::from_str(&stored).unwrap();
    let (log, ctx) = traced();

    let again = orchestrator
        .run_patch(restored, &landing_injections(), &ctx)
        .unwrap();

    assert_eq!(again.artifact.document(), first.artifact.document());
    assert_eq!(again.artifact.hash(), first.artifact.hash());
    assert_eq!(log.for_stage(Stage::Patch).len(), 1);
    assert!(log.for_stage(Stage::Sanitization).is_empty());
}

#[test]
fn patch_mode_rejects_tampered_payload() {
    let orchestrator = Orchestrator::new(
        single_variant(),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap();
    let first = orchestrator
        .run_override(
            "upload",
            &valid_variant_json("Persisted"),
            &landing_injections(),
            &RunContext::default(),
        )
        .unwrap();

    let mut stored = serde_json::to_value(&first.sanitized).unwrap();
    stored["fields"]["headline"] = json!("<img src=x onerror=alert(1)>");
    let tampered: SanitizedPayload = serde_json::from_value(stored).unwrap();
    let (log, ctx) = traced();

    let err = orchestrator
        .run_patch(tampered, &landing_injections(), &ctx)
        .unwrap_err();

    assert!(matches!(err, PipelineError::SealMismatch { .. }));
    assert!(err.is_fail_closed());
    assert!(log.for_stage(Stage::Assembly).is_empty());
}

#[test]
fn patch_mode_rejects_resealed_unsafe_payload() {
    let orchestrator = Orchestrator::new(
        single_variant(),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap();
    let first = orchestrator
        .run_override(
            "upload",
            &valid_variant_json("Persisted"),
            &landing_injections(),
            &RunContext::default(),
        )
        .unwrap();

    let mut stored = serde_json::to_value(&first.sanitized).unwrap();
    stored["fields"]["headline"] = json!("<script>steal()</script>");
    stored["fields"]["components"]
        .as_array_mut()
        .unwrap()
        .push(json!("crypto_miner"));
    stored["components"]
        .as_array_mut()
        .unwrap()
        .push(json!("crypto_miner"));
    reseal(&mut stored);
    let forged: SanitizedPayload = serde_json::from_value(stored).unwrap();
    assert!(forged.verify().is_ok());

    let security = Arc::new(SecurityLog::new());
    let log = Arc::new(TraceLog::new());
    let ctx = RunContext::new(log.clone()).with_security_log(security.clone());
    let err = orchestrator
        .run_patch(forged, &landing_injections(), &ctx)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Security(SecurityError::Unsanitized {
            rule: RuleId::DisallowedComponent,
            ..
        })
    ));
    assert!(err.is_fail_closed());
    assert_eq!(security.rejections(), 1);
    assert!(log.for_stage(Stage::Patch)[0]
        .rationale
        .contains("guardian recheck failed"));
    assert!(log.for_stage(Stage::Assembly).is_empty());
}

#[test]
fn patch_mode_rejects_resealed_script() {
    let orchestrator = Orchestrator::new(
        single_variant(),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap();
    let first = orchestrator
        .run_override(
            "upload",
            &valid_variant_json("Persisted"),
            &landing_injections(),
            &RunContext::default(),
        )
        .unwrap();

    let mut stored = serde_json::to_value(&first.sanitized).unwrap();
    stored["fields"]["headline"] = json!("<scr<iframe>ipt>steal()</script>");
    reseal(&mut stored);
    let forged: SanitizedPayload = serde_json::from_value(stored).unwrap();
    assert!(forged.verify().is_ok());

    let err = orchestrator
        .run_patch(forged, &landing_injections(), &RunContext::default())
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Security(SecurityError::Unsanitized { ref location, .. }) if location == "headline"
    ));
}

#[test]
fn fixture_designs_satisfy_the_design_schema() {
    let validator = SchemaValidator::new(Arc::new(Schema::design_variant()));
    for name in ["Serene Minimal", "Persisted"] {
        let payload = CandidatePayload::external("fixture", valid_variant_json(name));
        let result = validator.validate(&payload);
        assert!(result.valid, "{}", result.feedback());
    }
    let payload = CandidatePayload::external("fixture", incomplete_variant_json());
    assert!(!validator.validate(&payload).valid);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let err = Orchestrator::new(
        PipelineConfig::new().with_variant_count(0),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));

    let err = Orchestrator::new(
        PipelineConfig::new().with_schema("brochure"),
        Arc::new(ScriptedGenerator::new([])),
        landing_template(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownSchema(_)));
}
