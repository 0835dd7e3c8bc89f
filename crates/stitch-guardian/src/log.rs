//! Append-only security audit log

use crate::sanitized::Redaction;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stitch_artifact::{ContentHash, PayloadId};

/// What the guardian decided about a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// A fragment or list entry was redacted
    Redacted(Redaction),
    /// The payload was rejected
    Rejected { reason: String },
    /// The payload was accepted and sealed
    Accepted { seal: ContentHash, redactions: usize },
}

/// One log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRecord {
    /// Position in the log, from zero
    pub seq: u64,
    /// Payload the record concerns
    pub payload: PayloadId,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
    /// Decision
    pub event: SecurityEvent,
}

/// Append-only log shared by every guardian call in a run
#[derive(Debug, Default)]
pub struct SecurityLog {
    inner: Mutex<Vec<SecurityRecord>>,
}

impl SecurityLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its sequence number
    pub fn append(&self, payload: PayloadId, event: SecurityEvent) -> u64 {
        let mut guard = self.inner.lock();
        let seq = guard.len() as u64;
        guard.push(SecurityRecord {
            seq,
            payload,
            timestamp: Utc::now(),
            event,
        });
        seq
    }

    /// Snapshot of every record
    #[must_use]
    pub fn records(&self) -> Vec<SecurityRecord> {
        self.inner.lock().clone()
    }

    /// Records about one payload
    #[must_use]
    pub fn for_payload(&self, payload: PayloadId) -> Vec<SecurityRecord> {
        self.inner
            .lock()
            .iter()
            .filter(|r| r.payload == payload)
            .cloned()
            .collect()
    }

    /// Every redaction recorded so far
    #[must_use]
    pub fn redactions(&self) -> Vec<Redaction> {
        self.inner
            .lock()
            .iter()
            .filter_map(|r| match &r.event {
                SecurityEvent::Redacted(redaction) => Some(redaction.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of rejections recorded so far
    #[must_use]
    pub fn rejections(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .filter(|r| matches!(r.event, SecurityEvent::Rejected { .. }))
            .count()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_dense() {
        let log = SecurityLog::new();
        let a = PayloadId::new();
        let b = PayloadId::new();
        assert_eq!(
            log.append(
                a,
                SecurityEvent::Rejected {
                    reason: "too large".into()
                }
            ),
            0
        );
        assert_eq!(
            log.append(
                b,
                SecurityEvent::Accepted {
                    seal: ContentHash::compute(b"x"),
                    redactions: 0
                }
            ),
            1
        );
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_payload(a).len(), 1);
        assert_eq!(log.rejections(), 1);
        assert!(log.redactions().is_empty());
    }
}
