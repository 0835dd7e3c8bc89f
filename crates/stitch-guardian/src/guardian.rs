//! The security guardian
//!
//! Treats validated structure as untrusted input. Checks run in a fixed
//! order: size ceiling, component allowlist, forensic string rules. The
//! guardian never truncates and never asks for regeneration; anything it
//! cannot make safe is rejected.

use crate::config::GuardianConfig;
use crate::error::SecurityError;
use crate::log::{SecurityEvent, SecurityLog};
use crate::rules::{RedactionAction, RuleId, RuleSet};
use crate::sanitized::{dotted_pointer, Redaction, SanitizedPayload};
use serde_json::Value;
use std::collections::HashSet;
use stitch_artifact::{CandidatePayload, PayloadId};
use tracing::{error, info, warn};

/// Deterministic allowlist-first sanitizer
#[derive(Debug, Clone)]
pub struct SecurityGuardian {
    config: GuardianConfig,
    allowlist: HashSet<String>,
    rules: RuleSet,
}

impl SecurityGuardian {
    /// Build a guardian from policy
    ///
    /// # Errors
    /// Returns `SecurityError::InvalidPattern` if an extra pattern does not compile
    pub fn new(config: GuardianConfig) -> Result<Self, SecurityError> {
        let rules = RuleSet::new(&config)?;
        let allowlist = config.allowlist.iter().map(|id| normalize(id)).collect();
        Ok(Self {
            config,
            allowlist,
            rules,
        })
    }

    /// Active policy
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Whether a component id passes the allowlist
    #[must_use]
    pub fn is_allowed(&self, component: &str) -> bool {
        self.allowlist.contains(&normalize(component))
    }

    /// Sanitize a validated payload
    ///
    /// Every redaction and any rejection is appended to `log`.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if the raw text exceeds the size ceiling
    /// - `Unparseable` if there is no object or no component list
    /// - `DisallowedComponent` if no component survives the allowlist, or
    ///   strict mode is on and any component fails it
    pub fn sanitize(
        &self,
        payload: &CandidatePayload,
        log: &SecurityLog,
    ) -> Result<SanitizedPayload, SecurityError> {
        let result = self.sanitize_inner(payload, log);
        match &result {
            Ok(sanitized) => {
                info!(
                    payload = %payload.id(),
                    seal = %sanitized.seal().short(),
                    redactions = sanitized.redactions().len(),
                    "Payload sanitized"
                );
                log.append(
                    payload.id(),
                    SecurityEvent::Accepted {
                        seal: *sanitized.seal(),
                        redactions: sanitized.redactions().len(),
                    },
                );
            }
            Err(e) => {
                error!(payload = %payload.id(), error = %e, "Payload rejected");
                log.append(
                    payload.id(),
                    SecurityEvent::Rejected {
                        reason: e.to_string(),
                    },
                );
            }
        }
        result
    }

    /// Confirm a sanitized payload is still a fixed point of this guardian
    ///
    /// A seal only proves the contents did not change after sealing, and
    /// anyone can compute one. Persisted payloads are therefore put through
    /// the allowlist and the string rules again before reuse. Nothing is
    /// rewritten; the first location that would be redacted rejects the
    /// payload, and the rejection is appended to `log`.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if the serialized fields exceed the size ceiling
    /// - `Unsanitized` if any component or string would be redacted
    pub fn recheck(
        &self,
        payload: &SanitizedPayload,
        log: &SecurityLog,
    ) -> Result<(), SecurityError> {
        let id = payload.source();
        let result = self.recheck_inner(payload);
        if let Err(e) = &result {
            error!(payload = %id, error = %e, "Persisted payload rejected");
            log.append(
                id,
                SecurityEvent::Rejected {
                    reason: e.to_string(),
                },
            );
        }
        result
    }

    fn recheck_inner(&self, payload: &SanitizedPayload) -> Result<(), SecurityError> {
        let id = payload.source();
        let size = serde_json::to_vec(payload.fields())
            .map_err(|e| unparseable(id, &e.to_string()))?
            .len();
        if size > self.config.max_payload_bytes {
            return Err(SecurityError::PayloadTooLarge {
                payload: id,
                size,
                max: self.config.max_payload_bytes,
            });
        }
        let field = self.config.component_field.as_str();
        let disallowed = |location: String| SecurityError::Unsanitized {
            payload: id,
            location,
            rule: RuleId::DisallowedComponent,
        };

        if payload.components().is_empty() {
            return Err(disallowed(field.to_string()));
        }
        if let Some(i) = payload
            .components()
            .iter()
            .position(|c| !self.allowlist.contains(c))
        {
            return Err(disallowed(format!("{field}[{i}]")));
        }
        let listed = payload.field(field).and_then(Value::as_array);
        let matches = listed.is_some_and(|items| {
            items.len() == payload.components().len()
                && items
                    .iter()
                    .zip(payload.components())
                    .all(|(item, kept)| item.as_str() == Some(kept.as_str()))
        });
        if !matches {
            return Err(disallowed(field.to_string()));
        }

        let mut fields = payload.fields().clone();
        let mut redactions = Vec::new();
        self.scrub(&mut fields, String::new(), &mut redactions);
        match redactions.into_iter().next() {
            Some(first) => Err(SecurityError::Unsanitized {
                payload: id,
                location: first.location,
                rule: first.rule,
            }),
            None => Ok(()),
        }
    }

    fn sanitize_inner(
        &self,
        payload: &CandidatePayload,
        log: &SecurityLog,
    ) -> Result<SanitizedPayload, SecurityError> {
        let id = payload.id();

        let size = payload.size_bytes();
        if size > self.config.max_payload_bytes {
            return Err(SecurityError::PayloadTooLarge {
                payload: id,
                size,
                max: self.config.max_payload_bytes,
            });
        }

        let mut fields = match payload.structured() {
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => return Err(unparseable(id, "top-level value is not an object")),
            None => {
                let reason = payload.parse_error().unwrap_or("not valid JSON");
                return Err(unparseable(id, reason));
            }
        };

        let mut redactions = Vec::new();
        let components = self.filter_components(id, &mut fields, &mut redactions, log)?;

        let before = redactions.len();
        self.scrub(&mut fields, String::new(), &mut redactions);
        for redaction in &redactions[before..] {
            warn!(
                payload = %id,
                location = %redaction.location,
                rule = %redaction.rule,
                "Fragment redacted"
            );
            log.append(id, SecurityEvent::Redacted(redaction.clone()));
        }

        Ok(SanitizedPayload::sealed(
            id,
            *payload.hash(),
            payload.origin().clone(),
            fields,
            components,
            redactions,
        )?)
    }

    /// Drop disallowed component ids in place; returns the survivors
    fn filter_components(
        &self,
        id: PayloadId,
        fields: &mut Value,
        redactions: &mut Vec<Redaction>,
        log: &SecurityLog,
    ) -> Result<Vec<String>, SecurityError> {
        let field = self.config.component_field.as_str();
        let Some(Value::Array(items)) = fields.pointer_mut(&dotted_pointer(field)) else {
            return Err(unparseable(id, &format!("missing component list `{field}`")));
        };
        if items.is_empty() {
            return Err(unparseable(id, &format!("component list `{field}` is empty")));
        }

        let mut kept = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match item.as_str().map(normalize) {
                Some(component) if self.allowlist.contains(&component) => kept.push(component),
                _ => {
                    let shown = item.as_str().map_or_else(|| item.to_string(), str::to_string);
                    warn!(payload = %id, component = %shown, "Disallowed component dropped");
                    let redaction = Redaction::new(
                        format!("{field}[{i}]"),
                        0,
                        RuleId::DisallowedComponent,
                        &shown,
                        RedactionAction::Dropped,
                    );
                    log.append(id, SecurityEvent::Redacted(redaction.clone()));
                    redactions.push(redaction);
                    rejected.push(shown);
                }
            }
        }

        if kept.is_empty() || (self.config.strict_components && !rejected.is_empty()) {
            return Err(SecurityError::DisallowedComponent {
                payload: id,
                rejected,
            });
        }

        *items = kept.iter().cloned().map(Value::String).collect();
        Ok(kept)
    }

    fn scrub(&self, value: &mut Value, location: String, redactions: &mut Vec<Redaction>) {
        match value {
            Value::String(text) => {
                if let Some((clean, hits)) = self.rules.scrub(text) {
                    for hit in hits {
                        redactions.push(Redaction::new(
                            location.clone(),
                            hit.offset,
                            hit.rule,
                            &hit.fragment,
                            hit.action,
                        ));
                    }
                    *text = clean;
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.scrub(item, format!("{location}[{i}]"), redactions);
                }
            }
            Value::Object(map) => {
                for (key, item) in map.iter_mut() {
                    let nested = if location.is_empty() {
                        key.clone()
                    } else {
                        format!("{location}.{key}")
                    };
                    self.scrub(item, nested, redactions);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}

fn normalize(component: &str) -> String {
    component.trim().to_ascii_lowercase()
}

fn unparseable(payload: PayloadId, reason: &str) -> SecurityError {
    SecurityError::Unparseable {
        payload,
        reason: reason.to_string(),
    }
}
