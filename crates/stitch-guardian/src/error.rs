//! Error types for the security guardian
//!
//! Every variant is fail-closed: the payload is discarded and the run stops.
//! The guardian never asks for regeneration.

use crate::rules::RuleId;
use stitch_artifact::{ContentHash, HashError, PayloadId};

/// Reasons a payload is rejected outright
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Raw payload exceeds the size ceiling
    #[error("payload {payload} is {size} bytes, limit is {max}")]
    PayloadTooLarge {
        payload: PayloadId,
        size: usize,
        max: usize,
    },

    /// Component references fail the allowlist
    #[error("payload {payload} references disallowed components: [{}]", rejected.join(", "))]
    DisallowedComponent {
        payload: PayloadId,
        rejected: Vec<String>,
    },

    /// Payload has no usable structure
    #[error("payload {payload} cannot be sanitized: {reason}")]
    Unparseable { payload: PayloadId, reason: String },

    /// Persisted payload carries content the guardian would still redact
    #[error("payload {payload} is not sanitized: {rule} fires at {location}")]
    Unsanitized {
        payload: PayloadId,
        location: String,
        rule: RuleId,
    },

    /// Operator-supplied blacklist pattern does not compile
    #[error("invalid blacklist pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Seal could not be computed
    #[error("seal error: {0}")]
    Seal(#[from] HashError),

    /// Persisted sanitized payload no longer matches its seal
    #[error("sanitized payload tampered: sealed {expected}, contents hash to {actual}")]
    Tampered {
        expected: ContentHash,
        actual: ContentHash,
    },
}

impl SecurityError {
    /// Payload the error refers to, if any
    #[must_use]
    pub fn payload(&self) -> Option<PayloadId> {
        match self {
            Self::PayloadTooLarge { payload, .. }
            | Self::DisallowedComponent { payload, .. }
            | Self::Unparseable { payload, .. }
            | Self::Unsanitized { payload, .. } => Some(*payload),
            Self::InvalidPattern { .. } | Self::Seal(_) | Self::Tampered { .. } => None,
        }
    }
}
