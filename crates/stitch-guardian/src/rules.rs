//! Forensic string rules
//!
//! Each rule is a regex plus a replacement. Rules run in a fixed order, each
//! one until the string stops changing, and the whole list repeats until a
//! full round changes nothing. Removing a fragment can splice its neighbours
//! into something an earlier rule handles, so the output is only trusted
//! once it is a fixed point of every rule. Every replacement is strictly
//! shorter than what it replaces, which bounds the number of rounds.

use crate::config::GuardianConfig;
use crate::error::SecurityError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| build(r"(?is)<script\b[^>]*>.*?</script\s*>"));

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| build(r"(?i)</?script\b[^>]*>?"));

static EMBEDDED_FRAME: Lazy<Regex> =
    Lazy::new(|| build(r"(?i)</?(?:iframe|object|embed)\b[^>]*>?"));

// Handler inside a tag (`<img src=x onerror=...>`) or right after a quote
// (`x" onmouseover="...`), so prose like "one = two" is left alone.
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    build(r#"(?i)(?:<[^>]*?[\s/"']|["'/]\s*)(on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))"#)
});

static SCRIPT_URI: Lazy<Regex> = Lazy::new(|| {
    build(r"(?i)(?:j\s*a\s*v\s*a|v\s*b)\s*s\s*c\s*r\s*i\s*p\s*t\s*:")
});

static QUOTED_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| build(r#"(?i)[a-z][a-z0-9_:-]*\s*=\s*("[^"]*"|'[^']*')"#));

// Built-in patterns are literals covered by tests.
fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in guardian pattern")
}

/// Rule that produced a redaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// `<script>...</script>` block
    ScriptBlock,
    /// Lone `<script>` opener or closer
    ScriptTag,
    /// `<iframe>`, `<object>` or `<embed>` tag
    EmbeddedFrame,
    /// Inline `on*=` handler attribute
    EventHandler,
    /// `javascript:` or `vbscript:` URI scheme
    ScriptUri,
    /// Quoted attribute value over the length ceiling
    LongAttribute,
    /// Operator-supplied pattern
    Blacklist { pattern: String },
    /// Component id not on the allowlist
    DisallowedComponent,
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptBlock => f.write_str("script_block"),
            Self::ScriptTag => f.write_str("script_tag"),
            Self::EmbeddedFrame => f.write_str("embedded_frame"),
            Self::EventHandler => f.write_str("event_handler"),
            Self::ScriptUri => f.write_str("script_uri"),
            Self::LongAttribute => f.write_str("long_attribute"),
            Self::Blacklist { pattern } => write!(f, "blacklist({pattern})"),
            Self::DisallowedComponent => f.write_str("disallowed_component"),
        }
    }
}

/// What was done with a redacted fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionAction {
    /// Fragment deleted from the string
    Removed,
    /// Fragment rewritten to an inert form
    Neutralized,
    /// Whole list entry dropped
    Dropped,
}

/// Neutralized form of a script URI scheme
pub const NEUTRALIZED_SCHEME: &str = "blocked:";

/// One fragment matched by a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hit {
    pub(crate) rule: RuleId,
    pub(crate) action: RedactionAction,
    pub(crate) offset: usize,
    pub(crate) fragment: String,
}

#[derive(Debug, Clone)]
struct Rule {
    id: RuleId,
    regex: Regex,
    group: usize,
    replacement: &'static str,
    action: RedactionAction,
    // Only replace captures longer than this many bytes.
    min_capture: usize,
}

impl Rule {
    fn removal(id: RuleId, regex: &Regex, group: usize) -> Self {
        Self {
            id,
            regex: regex.clone(),
            group,
            replacement: "",
            action: RedactionAction::Removed,
            min_capture: 0,
        }
    }

    /// One left-to-right pass; `None` if nothing matched
    fn pass(&self, text: &Scrubbed, hits: &mut Vec<Hit>) -> Option<Scrubbed> {
        let mut out = Scrubbed {
            text: String::with_capacity(text.text.len()),
            origin: Vec::with_capacity(text.origin.len()),
        };
        let mut cursor = 0;
        for caps in self.regex.captures_iter(&text.text) {
            let Some(m) = caps.get(self.group) else {
                continue;
            };
            if m.is_empty() || m.len() <= self.min_capture {
                continue;
            }
            let offset = text.origin[m.start()];
            out.text.push_str(&text.text[cursor..m.start()]);
            out.origin.extend_from_slice(&text.origin[cursor..m.start()]);
            out.text.push_str(self.replacement);
            out.origin
                .resize(out.origin.len() + self.replacement.len(), offset);
            cursor = m.end();
            hits.push(Hit {
                rule: self.id.clone(),
                action: self.action,
                offset,
                fragment: m.as_str().to_string(),
            });
        }
        if cursor == 0 {
            return None;
        }
        out.text.push_str(&text.text[cursor..]);
        out.origin.extend_from_slice(&text.origin[cursor..]);
        Some(out)
    }
}

/// Partly scrubbed text plus where each byte sat in the input
#[derive(Debug)]
struct Scrubbed {
    text: String,
    // `origin[i]` is the input offset byte `i` came from; one extra entry
    // for the end of the string. Replacement bytes map to the match start.
    origin: Vec<usize>,
}

impl Scrubbed {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            origin: (0..=text.len()).collect(),
        }
    }
}

/// Ordered rules for one guardian
#[derive(Debug, Clone)]
pub(crate) struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub(crate) fn new(config: &GuardianConfig) -> Result<Self, SecurityError> {
        let mut rules = vec![
            Rule::removal(RuleId::ScriptBlock, &SCRIPT_BLOCK, 0),
            Rule::removal(RuleId::ScriptTag, &SCRIPT_TAG, 0),
            Rule::removal(RuleId::EmbeddedFrame, &EMBEDDED_FRAME, 0),
            Rule::removal(RuleId::EventHandler, &EVENT_HANDLER, 1),
            Rule {
                id: RuleId::ScriptUri,
                regex: Regex::clone(&SCRIPT_URI),
                group: 0,
                replacement: NEUTRALIZED_SCHEME,
                action: RedactionAction::Neutralized,
                min_capture: 0,
            },
            Rule {
                id: RuleId::LongAttribute,
                regex: Regex::clone(&QUOTED_ATTRIBUTE),
                group: 1,
                replacement: "\"\"",
                action: RedactionAction::Removed,
                // Capture includes both quotes.
                min_capture: config.max_attribute_len.saturating_add(2),
            },
        ];

        for pattern in &config.extra_patterns {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| SecurityError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            rules.push(Rule::removal(
                RuleId::Blacklist {
                    pattern: pattern.clone(),
                },
                &regex,
                0,
            ));
        }

        Ok(Self { rules })
    }

    /// Apply every rule to `text` until none fires; `None` if the text is
    /// already clean
    ///
    /// Hit offsets are byte offsets into `text`. A fragment spliced together
    /// by an earlier removal is reported where its first byte sat.
    pub(crate) fn scrub(&self, text: &str) -> Option<(String, Vec<Hit>)> {
        let mut hits = Vec::new();
        let mut current = Scrubbed::new(text);
        loop {
            let before = hits.len();
            for rule in &self.rules {
                while let Some(next) = rule.pass(&current, &mut hits) {
                    current = next;
                }
            }
            if hits.len() == before {
                break;
            }
        }
        if hits.is_empty() {
            None
        } else {
            Some((current.text, hits))
        }
    }
}
