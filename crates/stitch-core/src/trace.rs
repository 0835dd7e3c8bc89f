//! Cognitive trace
//!
//! Append-only record of pipeline decisions for one run. Every entry is
//! chained to its predecessor with SHA-256 so a stored trace can be checked
//! for tampering or gaps.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use stitch_artifact::VariantIndex;
use ulid::Ulid;

/// Identifier of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Fresh run id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage a trace entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Market research call
    Research,
    /// First generation attempt for a variant
    Generation,
    /// Re-prompt carrying corrective feedback
    Repair,
    /// Human choice among variants
    Selection,
    /// Externally supplied structure entered the pipeline
    Override,
    /// Persisted sanitized payload reused
    Patch,
    /// Security guardian pass
    Sanitization,
    /// Template assembly
    Assembly,
    /// Structural audit and patching
    Audit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Research => "RESEARCH",
            Self::Generation => "GENERATION",
            Self::Repair => "REPAIR",
            Self::Selection => "SELECTION",
            Self::Override => "OVERRIDE",
            Self::Patch => "PATCH",
            Self::Sanitization => "SANITIZATION",
            Self::Assembly => "ASSEMBLY",
            Self::Audit => "AUDIT",
        };
        f.write_str(s)
    }
}

/// One trace record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the log, assigned on append
    pub seq: u64,
    /// Run the entry belongs to
    pub run: RunId,
    /// Variant, for per-variant stages
    pub variant: Option<VariantIndex>,
    /// Stage
    pub stage: Stage,
    /// What the stage was given
    pub input: String,
    /// What the stage produced
    pub output: String,
    /// Why the pipeline did what it did next
    pub rationale: String,
    /// Wall-clock time of the append
    pub timestamp: DateTime<Utc>,
    /// Hash of the previous entry (zero for the first)
    pub prev_hash: [u8; 32],
    /// Hash of this entry
    pub hash: [u8; 32],
}

impl TraceEntry {
    /// Start an entry; chain fields are filled in by the sink
    #[must_use]
    pub fn new(run: RunId, stage: Stage) -> Self {
        Self {
            seq: 0,
            run,
            variant: None,
            stage,
            input: String::new(),
            output: String::new(),
            rationale: String::new(),
            timestamp: Utc::now(),
            prev_hash: [0; 32],
            hash: [0; 32],
        }
    }

    /// Tag with a variant
    #[inline]
    #[must_use]
    pub fn with_variant(mut self, variant: Option<VariantIndex>) -> Self {
        self.variant = variant;
        self
    }

    /// Input summary
    #[inline]
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Output summary
    #[inline]
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Decision rationale
    #[inline]
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Hex form of the entry hash
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Trace errors
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Chain broken at `seq`
    #[error("trace integrity violation at entry {seq}")]
    IntegrityViolation { seq: u64 },

    /// A custom sink could not persist the entry
    #[error("trace sink failed: {0}")]
    Sink(String),
}

/// Append interface for trace entries
///
/// Implementations must preserve append order and may not rewrite entries.
pub trait TraceSink: Send + Sync + fmt::Debug {
    /// Append an entry; returns the assigned sequence number
    ///
    /// # Errors
    /// Returns `TraceError::Sink` if the entry could not be stored
    fn append(&self, entry: TraceEntry) -> Result<u64, TraceError>;
}

/// In-memory hash-chained trace
#[derive(Debug, Default)]
pub struct TraceLog {
    inner: Mutex<Vec<TraceEntry>>,
}

impl TraceLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries
    #[must_use]
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.inner.lock().clone()
    }

    /// Entries for one variant, in append order
    #[must_use]
    pub fn for_variant(&self, variant: VariantIndex) -> Vec<TraceEntry> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.variant == Some(variant))
            .cloned()
            .collect()
    }

    /// Entries for one stage, in append order
    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> Vec<TraceEntry> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Walk the chain and recompute every hash
    ///
    /// # Errors
    /// Returns `TraceError::IntegrityViolation` at the first broken link
    pub fn verify_integrity(&self) -> Result<(), TraceError> {
        verify_chain(&self.inner.lock())
    }
}

impl TraceSink for TraceLog {
    fn append(&self, mut entry: TraceEntry) -> Result<u64, TraceError> {
        let mut guard = self.inner.lock();
        entry.seq = guard.len() as u64;
        entry.prev_hash = guard.last().map_or([0; 32], |e| e.hash);
        entry.hash = compute_hash(&entry);
        let seq = entry.seq;
        guard.push(entry);
        Ok(seq)
    }
}

/// Check a standalone chain of entries (for example one read back from disk)
///
/// # Errors
/// Returns `TraceError::IntegrityViolation` at the first broken link
pub fn verify_chain(entries: &[TraceEntry]) -> Result<(), TraceError> {
    let mut prev = [0u8; 32];
    for (i, e) in entries.iter().enumerate() {
        if e.seq != i as u64 || e.prev_hash != prev || e.hash != compute_hash(e) {
            return Err(TraceError::IntegrityViolation { seq: i as u64 });
        }
        prev = e.hash;
    }
    Ok(())
}

fn compute_hash(entry: &TraceEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.seq.to_le_bytes());
    hasher.update(entry.run.0.to_bytes());
    hasher.update([entry.variant.map_or(0, VariantIndex::get)]);
    hasher.update(entry.stage.to_string().as_bytes());
    hasher.update([0]);
    for field in [&entry.input, &entry.output, &entry.rationale] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(entry.timestamp.timestamp_micros().to_le_bytes());
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}
