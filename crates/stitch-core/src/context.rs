//! Per-run context
//!
//! The run id and the two append-only sinks are passed explicitly to every
//! stage; nothing in the pipeline writes to global state.

use crate::trace::{RunId, TraceEntry, TraceLog, TraceSink};
use std::sync::Arc;
use stitch_guardian::SecurityLog;
use tracing::warn;

/// Run id plus the trace and security sinks for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    run: RunId,
    trace: Arc<dyn TraceSink>,
    security: Arc<SecurityLog>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Arc::new(TraceLog::new()))
    }
}

impl RunContext {
    /// Fresh run writing its trace to `trace`
    #[must_use]
    pub fn new(trace: Arc<dyn TraceSink>) -> Self {
        Self {
            run: RunId::new(),
            trace,
            security: Arc::new(SecurityLog::new()),
        }
    }

    /// Share an existing security log
    #[inline]
    #[must_use]
    pub fn with_security_log(mut self, log: Arc<SecurityLog>) -> Self {
        self.security = log;
        self
    }

    /// Run id
    #[inline]
    #[must_use]
    pub fn run(&self) -> RunId {
        self.run
    }

    /// Security audit log
    #[inline]
    #[must_use]
    pub fn security_log(&self) -> &SecurityLog {
        &self.security
    }

    /// Trace sink
    #[inline]
    #[must_use]
    pub fn trace_sink(&self) -> &dyn TraceSink {
        self.trace.as_ref()
    }

    /// Start an entry stamped with this run's id
    #[inline]
    #[must_use]
    pub fn entry(&self, stage: crate::trace::Stage) -> TraceEntry {
        TraceEntry::new(self.run, stage)
    }

    /// Append to the trace
    ///
    /// A failing sink does not stop the run; the failure is logged.
    pub fn record(&self, entry: TraceEntry) {
        let stage = entry.stage;
        if let Err(e) = self.trace.append(entry) {
            warn!(run = %self.run, %stage, error = %e, "Trace append failed");
        }
    }
}
