//! Generator boundary
//!
//! The model backend is a black box turning a prompt into text. Everything
//! the pipeline knows about the call is in [`PromptContext`] so test doubles
//! can script replies per role, variant or attempt.

use crate::agent::AgentRole;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stitch_artifact::VariantIndex;

/// Errors raised by a generator backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    /// Backend unreachable or returned an error
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with nothing
    #[error("generator returned an empty response")]
    Empty,

    /// Call exceeded the configured timeout
    #[error("generator timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

/// One round of corrective feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFeedback {
    /// Attempt the feedback refers to
    pub attempt: u32,
    /// Numbered violation lines
    pub violations: String,
    /// Bounded excerpt of the rejected output
    pub excerpt: String,
}

/// Everything a generator call is made with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Role making the call
    pub role: AgentRole,
    /// Variant, for designer calls
    pub variant: Option<VariantIndex>,
    /// One-based attempt number within the repair loop
    pub attempt: u32,
    /// Brand brief
    pub brief: String,
    /// Research insight, when available
    pub insight: Option<String>,
    /// One line per schema field
    pub schema_outline: Vec<String>,
    /// Feedback from earlier rejected attempts, oldest first
    pub feedback: Vec<RepairFeedback>,
}

impl PromptContext {
    /// Context for a research call
    #[must_use]
    pub fn research(brief: impl Into<String>) -> Self {
        Self {
            role: AgentRole::Researcher,
            variant: None,
            attempt: 1,
            brief: brief.into(),
            insight: None,
            schema_outline: Vec::new(),
            feedback: Vec::new(),
        }
    }

    /// Rendered prompt text
    #[inline]
    #[must_use]
    pub fn prompt(&self) -> String {
        self.role.render(self)
    }

    /// Whether this is a repair call
    #[inline]
    #[must_use]
    pub fn is_repair(&self) -> bool {
        !self.feedback.is_empty()
    }
}

/// Model backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce raw text for `ctx`
    ///
    /// # Errors
    /// Returns `GeneratorError` if the backend fails; the caller decides
    /// whether the failure consumes a repair attempt.
    async fn generate(&self, ctx: &PromptContext) -> Result<String, GeneratorError>;
}
