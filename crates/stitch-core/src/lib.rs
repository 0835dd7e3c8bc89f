//! Stitcher Core
//!
//! The self-healing generation-and-repair loop and the orchestrator that
//! drives it through sanitization, assembly and structural audit.
//!
//! # Core Concepts
//!
//! - [`RepairLoop`]: bounded generate-validate-repair cycle; feedback from
//!   rejected attempts is carried forward in a new immutable request
//! - [`Orchestrator`]: full, override and patch modes over one
//!   [`PipelineConfig`]
//! - [`RunContext`]: the run id plus the trace and security sinks, passed
//!   explicitly to every stage
//! - [`TraceLog`]: hash-chained cognitive trace of every decision
//!
//! # Control flow
//!
//! ```text
//! research ─► fan-out (N × RepairLoop) ─► selection ─► guardian ─► assembly ─► auditor
//!                                        override ──► guardian ──┘            │
//!                                        patch (seal verified) ──► assembly ─┘
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod repair;
pub mod trace;

pub use agent::AgentRole;
pub use config::{PipelineConfig, MAX_VARIANTS};
pub use context::RunContext;
pub use error::{PipelineError, RepairExhausted};
pub use generator::{Generator, GeneratorError, PromptContext, RepairFeedback};
pub use orchestrator::{
    cancel_pair, CancelHandle, CancelToken, FirstViable, FixedSelection, FullRun, Orchestrator,
    RunOutput, Selection, SelectionSet, VariantOutcome, VariantSelector,
};
pub use repair::{GenerationRequest, RepairLoop, MAX_EXCERPT_BYTES};
pub use trace::{verify_chain, RunId, Stage, TraceEntry, TraceError, TraceLog, TraceSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
