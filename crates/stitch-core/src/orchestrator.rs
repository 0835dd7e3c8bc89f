//! Orchestrator
//!
//! Owns the per-run budgets and drives the stages in one of three modes:
//!
//! - **Full**: research, fan out N variant repair loops, wait for a human
//!   selection, then guardian, assembly and audit on the chosen variant
//! - **Override**: externally supplied structure goes straight to the guardian
//! - **Patch**: a persisted sanitized payload (seal verified) is re-assembled
//!   and re-audited
//!
//! Only the generator calls suspend. Everything after selection is
//! synchronous and cannot be cancelled.

use crate::agent::AgentRole;
use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::error::{PipelineError, RepairExhausted};
use crate::generator::{Generator, PromptContext};
use crate::repair::{GenerationRequest, RepairLoop};
use crate::trace::Stage;
use async_trait::async_trait;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stitch_artifact::{AssembledArtifact, CandidatePayload, DiagnosticState, VariantIndex};
use stitch_assembly::{AssemblyEngine, AssetRoot, InjectionMap, TemplateGraph};
use stitch_auditor::DiagnosticAuditor;
use stitch_guardian::{SanitizedPayload, SecurityGuardian};
use stitch_schema::{SchemaId, SchemaRegistry, SchemaValidator};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Result of one variant's repair loop
#[derive(Debug, Clone)]
pub enum VariantOutcome {
    /// Valid payload, eligible for selection
    Ready(CandidatePayload),
    /// Repair budget spent
    Exhausted(RepairExhausted),
    /// The variant task died without a result
    Aborted { variant: VariantIndex, reason: String },
}

impl VariantOutcome {
    /// Variant this outcome belongs to
    #[must_use]
    pub fn variant(&self) -> VariantIndex {
        match self {
            Self::Ready(payload) => payload.variant().unwrap_or(VariantIndex::FIRST),
            Self::Exhausted(e) => e.variant,
            Self::Aborted { variant, .. } => *variant,
        }
    }

    /// Payload, when ready
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&CandidatePayload> {
        match self {
            Self::Ready(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Fan-in of all variants, presented for selection
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    insight: Option<String>,
    outcomes: Vec<VariantOutcome>,
}

impl SelectionSet {
    /// Research insight the variants were generated with
    #[inline]
    #[must_use]
    pub fn insight(&self) -> Option<&str> {
        self.insight.as_deref()
    }

    /// Every outcome, ordered by variant
    #[inline]
    #[must_use]
    pub fn outcomes(&self) -> &[VariantOutcome] {
        &self.outcomes
    }

    /// Valid candidates, ordered by variant
    pub fn candidates(&self) -> impl Iterator<Item = &CandidatePayload> {
        self.outcomes.iter().filter_map(VariantOutcome::payload)
    }

    /// Outcome for `variant`
    #[must_use]
    pub fn get(&self, variant: VariantIndex) -> Option<&VariantOutcome> {
        self.outcomes.iter().find(|o| o.variant() == variant)
    }

    /// Payload for `variant`, when it is ready
    #[must_use]
    pub fn payload(&self, variant: VariantIndex) -> Option<&CandidatePayload> {
        self.get(variant).and_then(VariantOutcome::payload)
    }

    /// Number of ready variants
    #[must_use]
    pub fn viable_count(&self) -> usize {
        self.candidates().count()
    }

    /// Number of variants that ran
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no variant ran
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Human decision at the selection boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Continue with this variant
    Variant(VariantIndex),
    /// Stop the run
    Cancel,
}

/// Selection boundary (a human in practice)
#[async_trait]
pub trait VariantSelector: Send + Sync {
    /// Pick a variant from `set`
    async fn select(&self, set: &SelectionSet) -> Selection;
}

/// Picks the lowest-numbered ready variant
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstViable;

#[async_trait]
impl VariantSelector for FirstViable {
    async fn select(&self, set: &SelectionSet) -> Selection {
        set.candidates()
            .find_map(CandidatePayload::variant)
            .map_or(Selection::Cancel, Selection::Variant)
    }
}

/// Always picks the same variant
#[derive(Debug, Clone, Copy)]
pub struct FixedSelection(pub VariantIndex);

#[async_trait]
impl VariantSelector for FixedSelection {
    async fn select(&self, _set: &SelectionSet) -> Selection {
        Selection::Variant(self.0)
    }
}

/// Caller side of fan-out cancellation
#[derive(Debug, Clone)]
pub struct CancelHandle(AbortHandle);

impl CancelHandle {
    /// Abort the fan-out; in-flight variant tasks are dropped
    pub fn cancel(&self) {
        self.0.abort();
    }

    /// Whether `cancel` was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}

/// Run side of fan-out cancellation
#[derive(Debug)]
pub struct CancelToken(AbortRegistration);

/// Linked cancel handle and token
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (handle, registration) = AbortHandle::new_pair();
    (CancelHandle(handle), CancelToken(registration))
}

/// Full-mode run input
#[derive(Debug)]
pub struct FullRun {
    brief: String,
    injections: InjectionMap,
    cancel: Option<CancelToken>,
}

impl FullRun {
    /// Run for `brief` with no injections
    #[must_use]
    pub fn new(brief: impl Into<String>) -> Self {
        Self {
            brief: brief.into(),
            injections: InjectionMap::new(),
            cancel: None,
        }
    }

    /// With deterministic injections
    #[inline]
    #[must_use]
    pub fn with_injections(mut self, injections: InjectionMap) -> Self {
        self.injections = injections;
        self
    }

    /// Cancellable through the paired handle
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful run output
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Sealed, clean artifact
    pub artifact: AssembledArtifact,
    /// Sanitized payload it was built from (persist this for patch mode)
    pub sanitized: SanitizedPayload,
}

/// The pipeline driver
pub struct Orchestrator {
    config: PipelineConfig,
    generator: Arc<dyn Generator>,
    schema: SchemaId,
    repair: RepairLoop,
    guardian: SecurityGuardian,
    engine: AssemblyEngine,
    auditor: DiagnosticAuditor,
    template: Arc<TemplateGraph>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("schema", &self.schema)
            .field("template", &self.template.reference())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator using the built-in schemas
    ///
    /// # Errors
    /// - `Config` for invalid budgets
    /// - `Template` for an inconsistent template graph
    /// - `UnknownSchema` if the configured schema is not built in
    /// - `Security` if a blacklist pattern does not compile
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        template: TemplateGraph,
    ) -> Result<Self, PipelineError> {
        Self::with_registry(config, &SchemaRegistry::with_builtins(), generator, template)
    }

    /// Orchestrator resolving its schema from `registry`
    ///
    /// # Errors
    /// Same as [`Self::new`]
    pub fn with_registry(
        config: PipelineConfig,
        registry: &SchemaRegistry,
        generator: Arc<dyn Generator>,
        template: TemplateGraph,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        template.check()?;

        let schema_id = SchemaId::new(config.schema.as_str());
        let schema = registry
            .get(&schema_id)
            .ok_or_else(|| PipelineError::UnknownSchema(schema_id.clone()))?;
        let repair = RepairLoop::new(SchemaValidator::new(schema), config.generator_timeout());
        let guardian = SecurityGuardian::new(config.guardian.clone())?;
        let engine = AssemblyEngine::new(
            AssetRoot::new(config.asset_root.clone()).require_existing(config.require_assets),
        );
        let auditor = DiagnosticAuditor::new(config.max_patch_attempts);

        Ok(Self {
            config,
            generator,
            schema: schema_id,
            repair,
            guardian,
            engine,
            auditor,
            template: Arc::new(template),
        })
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Template graph
    #[inline]
    #[must_use]
    pub fn template(&self) -> &TemplateGraph {
        &self.template
    }

    /// Research step; any failure falls back to no insight
    pub async fn research(&self, brief: &str, ctx: &RunContext) -> Option<String> {
        let prompt = PromptContext::research(brief);
        let reply =
            tokio::time::timeout(self.config.generator_timeout(), self.generator.generate(&prompt))
                .await;
        let entry = ctx
            .entry(Stage::Research)
            .with_input(format!("role {}; brief {} bytes", AgentRole::Researcher, brief.len()));

        match reply {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                let insight = text.trim().to_string();
                ctx.record(
                    entry
                        .with_output(format!("{} bytes", insight.len()))
                        .with_rationale("insight attached to every variant prompt"),
                );
                info!(run = %ctx.run(), "Research complete");
                Some(insight)
            }
            other => {
                let reason = match other {
                    Ok(Ok(_)) => "empty response".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "timed out".to_string(),
                };
                ctx.record(
                    entry
                        .with_output(reason.clone())
                        .with_rationale("research failed; continuing without insight"),
                );
                warn!(run = %ctx.run(), %reason, "Research failed; continuing without insight");
                None
            }
        }
    }

    /// Fan out one repair loop per variant and collect every outcome
    ///
    /// Variants run as independent tasks; one variant's exhaustion does not
    /// affect its siblings.
    pub async fn generate_variants(
        &self,
        brief: &str,
        insight: Option<String>,
        ctx: &RunContext,
    ) -> SelectionSet {
        let count = u8::try_from(self.config.variant_count).unwrap_or(u8::MAX);
        let brief: Arc<str> = Arc::from(brief);
        let shared_insight: Option<Arc<str>> = insight.as_deref().map(Arc::from);
        info!(run = %ctx.run(), variants = count, "Fanning out variant generation");

        let mut join_set = JoinSet::new();
        for variant in VariantIndex::range(count) {
            let repair = self.repair.clone();
            let generator = Arc::clone(&self.generator);
            let ctx = ctx.clone();
            let request = GenerationRequest::new(variant, self.schema.clone(), Arc::clone(&brief))
                .with_max_attempts(self.config.max_repair_attempts)
                .with_insight(shared_insight.clone());
            join_set.spawn(async move {
                let outcome = repair.generate_valid(request, generator.as_ref(), &ctx).await;
                (variant, outcome)
            });
        }

        let mut by_variant = BTreeMap::new();
        let mut failures = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((variant, Ok(payload))) => {
                    by_variant.insert(variant, VariantOutcome::Ready(payload));
                }
                Ok((variant, Err(exhausted))) => {
                    warn!(run = %ctx.run(), %variant, "Variant exhausted its repair budget");
                    by_variant.insert(variant, VariantOutcome::Exhausted(exhausted));
                }
                Err(e) => {
                    error!(run = %ctx.run(), error = %e, "Variant task failed");
                    failures.push(e.to_string());
                }
            }
        }
        for variant in VariantIndex::range(count) {
            by_variant.entry(variant).or_insert_with(|| VariantOutcome::Aborted {
                variant,
                reason: failures
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "task ended without a result".to_string()),
            });
        }

        let set = SelectionSet {
            insight,
            outcomes: by_variant.into_values().collect(),
        };
        info!(
            run = %ctx.run(),
            viable = set.viable_count(),
            total = set.len(),
            "Variant fan-in complete"
        );
        set
    }

    /// Full mode
    ///
    /// # Errors
    /// - `Cancelled` if the fan-out was aborted or the selector cancelled
    /// - `NoViableVariant` if every variant exhausted its budget
    /// - `InvalidSelection` if the selected variant has no valid payload
    /// - any guardian, assembly or audit failure on the selected variant
    pub async fn run_full(
        &self,
        run: FullRun,
        selector: &dyn VariantSelector,
        ctx: &RunContext,
    ) -> Result<RunOutput, PipelineError> {
        info!(run = %ctx.run(), mode = "full", "Run started");
        let FullRun {
            brief,
            injections,
            cancel,
        } = run;

        let insight = if self.config.research_enabled {
            self.research(&brief, ctx).await
        } else {
            None
        };

        let fan_out = self.generate_variants(&brief, insight, ctx);
        let set = match cancel {
            Some(CancelToken(registration)) => {
                if let Ok(set) = Abortable::new(fan_out, registration).await {
                    set
                } else {
                    ctx.record(
                        ctx.entry(Stage::Selection)
                            .with_rationale("fan-out cancelled before selection"),
                    );
                    warn!(run = %ctx.run(), "Run cancelled during fan-out");
                    return Err(PipelineError::Cancelled);
                }
            }
            None => fan_out.await,
        };

        if set.viable_count() == 0 {
            ctx.record(
                ctx.entry(Stage::Selection)
                    .with_input(format!("{} variants", set.len()))
                    .with_rationale("no variant produced a valid payload"),
            );
            error!(run = %ctx.run(), "No viable variant");
            return Err(PipelineError::NoViableVariant {
                exhausted: set.len(),
            });
        }

        let variant = match selector.select(&set).await {
            Selection::Variant(variant) => variant,
            Selection::Cancel => {
                ctx.record(
                    ctx.entry(Stage::Selection)
                        .with_input(format!("{} viable of {}", set.viable_count(), set.len()))
                        .with_rationale("selection cancelled"),
                );
                info!(run = %ctx.run(), "Selection cancelled");
                return Err(PipelineError::Cancelled);
            }
        };
        let Some(payload) = set.payload(variant) else {
            ctx.record(
                ctx.entry(Stage::Selection)
                    .with_variant(Some(variant))
                    .with_rationale("selected variant has no valid payload"),
            );
            return Err(PipelineError::InvalidSelection { variant });
        };
        ctx.record(
            ctx.entry(Stage::Selection)
                .with_variant(Some(variant))
                .with_input(format!("{} viable of {}", set.viable_count(), set.len()))
                .with_output(format!("payload {}", payload.id()))
                .with_rationale("human selection"),
        );
        info!(run = %ctx.run(), %variant, "Variant selected");

        let sanitized = self.sanitize(payload, ctx)?;
        let artifact = self.assemble_and_audit(&sanitized, &injections, ctx)?;
        Ok(RunOutput {
            artifact,
            sanitized,
        })
    }

    /// Override mode: external structure, no generation or repair
    ///
    /// # Errors
    /// Any guardian, assembly or audit failure
    pub fn run_override(
        &self,
        reference: &str,
        raw: &str,
        injections: &InjectionMap,
        ctx: &RunContext,
    ) -> Result<RunOutput, PipelineError> {
        info!(run = %ctx.run(), mode = "override", %reference, "Run started");
        let payload = CandidatePayload::external(reference, raw);
        ctx.record(
            ctx.entry(Stage::Override)
                .with_input(format!("reference {reference}"))
                .with_output(format!("payload {}, {} bytes", payload.id(), payload.size_bytes()))
                .with_rationale("human override; generation and repair skipped"),
        );
        let sanitized = self.sanitize(&payload, ctx)?;
        let artifact = self.assemble_and_audit(&sanitized, injections, ctx)?;
        Ok(RunOutput {
            artifact,
            sanitized,
        })
    }

    /// Patch mode: re-assemble a persisted sanitized payload
    ///
    /// The seal is checked first, then the payload goes back through the
    /// guardian's allowlist and rules without being rewritten.
    ///
    /// # Errors
    /// - `SealMismatch` if the payload was altered after sanitization
    /// - `Security` if the guardian would still redact anything
    /// - any assembly or audit failure
    pub fn run_patch(
        &self,
        sanitized: SanitizedPayload,
        injections: &InjectionMap,
        ctx: &RunContext,
    ) -> Result<RunOutput, PipelineError> {
        info!(run = %ctx.run(), mode = "patch", seal = %sanitized.seal().short(), "Run started");
        if let Err(e) = sanitized.verify() {
            ctx.record(
                ctx.entry(Stage::Patch)
                    .with_input(format!("seal {}", sanitized.seal().short()))
                    .with_rationale(format!("seal check failed: {e}")),
            );
            error!(run = %ctx.run(), error = %e, "Persisted payload failed its seal check");
            return Err(PipelineError::from_seal(e));
        }
        if let Err(e) = self.guardian.recheck(&sanitized, ctx.security_log()) {
            ctx.record(
                ctx.entry(Stage::Patch)
                    .with_variant(sanitized.variant())
                    .with_input(format!("seal {}", sanitized.seal().short()))
                    .with_rationale(format!("guardian recheck failed: {e}")),
            );
            return Err(e.into());
        }
        ctx.record(
            ctx.entry(Stage::Patch)
                .with_variant(sanitized.variant())
                .with_input(format!("seal {}", sanitized.seal().short()))
                .with_rationale("seal verified, recheck passed; re-running assembly and audit"),
        );
        let artifact = self.assemble_and_audit(&sanitized, injections, ctx)?;
        Ok(RunOutput {
            artifact,
            sanitized,
        })
    }

    fn sanitize(
        &self,
        payload: &CandidatePayload,
        ctx: &RunContext,
    ) -> Result<SanitizedPayload, PipelineError> {
        let entry = ctx
            .entry(Stage::Sanitization)
            .with_variant(payload.variant())
            .with_input(format!("payload {}, {} bytes", payload.id(), payload.size_bytes()));
        match self.guardian.sanitize(payload, ctx.security_log()) {
            Ok(sanitized) => {
                ctx.record(
                    entry
                        .with_output(format!("seal {}", sanitized.seal().short()))
                        .with_rationale(format!("{} redactions", sanitized.redactions().len())),
                );
                Ok(sanitized)
            }
            Err(e) => {
                ctx.record(entry.with_rationale(format!("rejected: {e}")));
                Err(e.into())
            }
        }
    }

    fn assemble_and_audit(
        &self,
        sanitized: &SanitizedPayload,
        injections: &InjectionMap,
        ctx: &RunContext,
    ) -> Result<AssembledArtifact, PipelineError> {
        let template = self.template.reference();
        let entry = ctx
            .entry(Stage::Assembly)
            .with_variant(sanitized.variant())
            .with_input(format!(
                "seal {}, template {}@{}, {} injections",
                sanitized.seal().short(),
                template.id,
                template.version,
                injections.len()
            ));

        let mut artifact = match self.engine.assemble(sanitized, &self.template, injections) {
            Ok(artifact) => {
                ctx.record(
                    entry
                        .with_output(format!(
                            "{} bytes, hash {}",
                            artifact.document().len(),
                            artifact.hash().short()
                        ))
                        .with_rationale("all slots resolved"),
                );
                artifact
            }
            Err(e) => {
                ctx.record(entry.with_rationale(format!("assembly failed: {e}")));
                error!(run = %ctx.run(), error = %e, "Assembly failed");
                return Err(e.into());
            }
        };

        let before = *artifact.hash();
        let state = self.auditor.audit(&mut artifact)?;
        let (transitions, patches) = artifact.report().map_or((String::new(), 0), |r| {
            let path: Vec<String> = r.transitions.iter().map(ToString::to_string).collect();
            (path.join(" -> "), r.patches.len())
        });
        ctx.record(
            ctx.entry(Stage::Audit)
                .with_variant(sanitized.variant())
                .with_input(format!("hash {}", before.short()))
                .with_output(format!("hash {}, {patches} patches", artifact.hash().short()))
                .with_rationale(transitions),
        );

        if state == DiagnosticState::Unrecoverable {
            return Err(PipelineError::Unrecoverable {
                artifact: Box::new(artifact),
            });
        }
        Ok(artifact)
    }
}
