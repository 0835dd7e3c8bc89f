//! Agent roles
//!
//! Every model call is made by one of a few tagged roles sharing the single
//! [`Generator`](crate::Generator) contract. A role only decides how the
//! prompt text is laid out.

use crate::generator::PromptContext;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Role a generator call is made under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Niche and trend research feeding the designers
    Researcher,
    /// Produces one design variant as structured JSON
    Designer,
}

impl AgentRole {
    /// Persona line opening every prompt for this role
    #[must_use]
    pub fn persona(self) -> &'static str {
        match self {
            Self::Researcher => "ACT AS: UI/UX market researcher.",
            Self::Designer => "ACT AS: Senior UI/UX consultant.",
        }
    }

    /// Render the full prompt text for `ctx`
    #[must_use]
    pub fn render(self, ctx: &PromptContext) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.persona());
        match self {
            Self::Researcher => {
                let _ = writeln!(out, "NICHE: {}", ctx.brief);
                out.push_str(
                    "TASK: Identify high-converting design trends for this niche.\n\
                     Return a concise summary with reasoning.\n",
                );
            }
            Self::Designer => {
                if let Some(variant) = ctx.variant {
                    let _ = writeln!(out, "VARIANT_NUMBER: {}", variant.get());
                }
                let _ = writeln!(out, "BRIEF: {}", ctx.brief);
                if let Some(insight) = &ctx.insight {
                    let _ = writeln!(out, "RESEARCH_INSIGHTS: {insight}");
                }
                out.push_str("TASK: Generate ONE unique UI design variation.\n");
                out.push_str("Return ONLY a valid JSON object with these fields:\n");
                for line in &ctx.schema_outline {
                    let _ = writeln!(out, "- {line}");
                }
                for round in &ctx.feedback {
                    let _ = writeln!(
                        out,
                        "\nYour output for attempt {} was rejected:\n{}",
                        round.attempt, round.violations
                    );
                    if !round.excerpt.is_empty() {
                        let _ = writeln!(out, "REJECTED_OUTPUT (excerpt):\n{}", round.excerpt);
                    }
                }
                if !ctx.feedback.is_empty() {
                    out.push_str("FIX: Return ONLY the corrected JSON object.\n");
                }
            }
        }
        out
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Researcher => "researcher",
            Self::Designer => "designer",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RepairFeedback;
    use stitch_artifact::VariantIndex;

    #[test]
    fn designer_prompt_carries_feedback_in_order() {
        let ctx = PromptContext {
            role: AgentRole::Designer,
            variant: VariantIndex::new(3),
            attempt: 3,
            brief: "Luxury pet spa".into(),
            insight: Some("bento grids convert".into()),
            schema_outline: vec!["`headline`: text (1..=120 chars)".into()],
            feedback: vec![
                RepairFeedback {
                    attempt: 1,
                    violations: "1. `layout` is required but missing".into(),
                    excerpt: "{\"variant_name\"".into(),
                },
                RepairFeedback {
                    attempt: 2,
                    violations: "1. `headline` is required but missing".into(),
                    excerpt: String::new(),
                },
            ],
        };
        let prompt = AgentRole::Designer.render(&ctx);
        assert!(prompt.starts_with("ACT AS: Senior"));
        assert!(prompt.contains("VARIANT_NUMBER: 3"));
        assert!(prompt.contains("RESEARCH_INSIGHTS: bento grids convert"));
        let first = prompt.find("attempt 1").unwrap();
        let second = prompt.find("attempt 2").unwrap();
        assert!(first < second);
        assert!(prompt.ends_with("FIX: Return ONLY the corrected JSON object.\n"));
    }

    #[test]
    fn researcher_prompt_names_niche() {
        let ctx = PromptContext::research("Luxury pet spa");
        let prompt = AgentRole::Researcher.render(&ctx);
        assert!(prompt.contains("NICHE: Luxury pet spa"));
        assert!(!prompt.contains("FIX:"));
    }
}
