//! Bounded repair loop
//!
//! ```text
//! request ─► generate ─► validate ─► valid ─────────────► CandidatePayload
//!               ▲                      │ invalid / error / timeout
//!               │                      ▼
//!               └── repair request ◄── attempts left? ── no ─► RepairExhausted
//! ```
//!
//! An explicit loop over an attempt counter. Each retry is a new immutable
//! request carrying every earlier round of feedback.

use crate::agent::AgentRole;
use crate::context::RunContext;
use crate::error::RepairExhausted;
use crate::generator::{Generator, GeneratorError, PromptContext, RepairFeedback};
use crate::trace::Stage;
use std::sync::Arc;
use std::time::Duration;
use stitch_artifact::{CandidatePayload, VariantIndex};
use stitch_schema::{SchemaId, SchemaValidator, ValidationResult, Violation};
use tracing::{debug, info, warn};

/// Bytes of rejected output echoed back to the model
pub const MAX_EXCERPT_BYTES: usize = 1024;

/// One generation request; immutable once issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    variant: VariantIndex,
    schema: SchemaId,
    max_attempts: u32,
    brief: Arc<str>,
    insight: Option<Arc<str>>,
    feedback: Vec<RepairFeedback>,
}

impl GenerationRequest {
    /// Request for `variant` with the default budget of 3 attempts
    #[must_use]
    pub fn new(variant: VariantIndex, schema: SchemaId, brief: impl Into<Arc<str>>) -> Self {
        Self {
            variant,
            schema,
            max_attempts: 3,
            brief: brief.into(),
            insight: None,
            feedback: Vec::new(),
        }
    }

    /// With attempt budget (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// With research insight
    #[inline]
    #[must_use]
    pub fn with_insight(mut self, insight: Option<Arc<str>>) -> Self {
        self.insight = insight;
        self
    }

    /// Variant
    #[inline]
    #[must_use]
    pub fn variant(&self) -> VariantIndex {
        self.variant
    }

    /// Target schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    /// Attempt budget
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Accumulated feedback, oldest first
    #[inline]
    #[must_use]
    pub fn feedback(&self) -> &[RepairFeedback] {
        &self.feedback
    }

    /// Follow-up request carrying the violations of `attempt`
    #[must_use]
    pub fn repair(&self, attempt: u32, result: &ValidationResult, rejected: &str) -> Self {
        let mut next = self.clone();
        next.feedback.push(RepairFeedback {
            attempt,
            violations: result.feedback(),
            excerpt: excerpt(rejected, MAX_EXCERPT_BYTES).to_string(),
        });
        next
    }

    fn prompt(&self, attempt: u32, outline: &[String]) -> PromptContext {
        PromptContext {
            role: AgentRole::Designer,
            variant: Some(self.variant),
            attempt,
            brief: self.brief.to_string(),
            insight: self.insight.as_deref().map(str::to_string),
            schema_outline: outline.to_vec(),
            feedback: self.feedback.clone(),
        }
    }
}

/// Longest prefix of `text` within `max` bytes, cut at a char boundary
fn excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Generate-validate-repair driver for one schema
#[derive(Debug, Clone)]
pub struct RepairLoop {
    validator: SchemaValidator,
    outline: Arc<[String]>,
    timeout: Duration,
}

impl RepairLoop {
    /// Loop validating against `validator`, bounding each call by `timeout`
    #[must_use]
    pub fn new(validator: SchemaValidator, timeout: Duration) -> Self {
        let outline = validator.schema().outline().into();
        Self {
            validator,
            outline,
            timeout,
        }
    }

    /// Validator in use
    #[inline]
    #[must_use]
    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// Call the generator until a payload validates or the budget is spent
    ///
    /// Generator errors and timeouts consume an attempt like any invalid
    /// output and are fed back as a generator-failure violation.
    ///
    /// # Errors
    /// Returns `RepairExhausted` with the last validation result after
    /// `request.max_attempts()` calls
    pub async fn generate_valid(
        &self,
        request: GenerationRequest,
        generator: &dyn Generator,
        ctx: &RunContext,
    ) -> Result<CandidatePayload, RepairExhausted> {
        let variant = request.variant();
        let budget = request.max_attempts().max(1);
        let mut request = request;
        let mut last = ValidationResult::default();

        for attempt in 1..=budget {
            let prompt = request.prompt(attempt, &self.outline);
            let stage = if attempt == 1 { Stage::Generation } else { Stage::Repair };
            let triggered_by = if last.valid || last.errors.is_empty() {
                String::new()
            } else {
                format!("; triggered by:\n{}", last.feedback())
            };
            debug!(%variant, attempt, budget, "Calling generator");

            let (result, rejected, output) =
                match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
                    Ok(Ok(raw)) => {
                        let candidate = CandidatePayload::generated(variant, attempt, raw);
                        let result = self.validator.validate(&candidate);
                        let output = format!(
                            "{} bytes, hash {}",
                            candidate.size_bytes(),
                            candidate.hash().short()
                        );
                        if result.valid {
                            ctx.record(
                                ctx.entry(stage)
                                    .with_variant(Some(variant))
                                    .with_input(format!("attempt {attempt}/{budget}{triggered_by}"))
                                    .with_output(output)
                                    .with_rationale("valid against schema; accepted"),
                            );
                            info!(%variant, attempt, payload = %candidate.id(), "Variant payload valid");
                            return Ok(candidate);
                        }
                        (result, candidate.raw().to_string(), output)
                    }
                    Ok(Err(e)) => failure(&e),
                    Err(_elapsed) => failure(&GeneratorError::Timeout(self.timeout)),
                };

            let next = if attempt < budget {
                "re-prompting with corrective feedback"
            } else {
                "repair budget exhausted"
            };
            ctx.record(
                ctx.entry(stage)
                    .with_variant(Some(variant))
                    .with_input(format!("attempt {attempt}/{budget}{triggered_by}"))
                    .with_output(output)
                    .with_rationale(format!("{} violations; {next}:\n{}", result.errors.len(), result.feedback())),
            );
            warn!(
                %variant,
                attempt,
                budget,
                violations = result.errors.len(),
                "Variant payload rejected; {next}"
            );

            if attempt < budget {
                request = request.repair(attempt, &result, &rejected);
            }
            last = result;
        }

        Err(RepairExhausted {
            variant,
            attempts: budget,
            last,
        })
    }
}

fn failure(err: &GeneratorError) -> (ValidationResult, String, String) {
    (
        ValidationResult::from_errors(vec![Violation::generator_failure(err.to_string())]),
        String::new(),
        err.to_string(),
    )
}
