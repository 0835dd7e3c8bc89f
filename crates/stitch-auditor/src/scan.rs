//! Structural scan
//!
//! A single left-to-right pass over the markup with a tag stack. The scanner
//! is forgiving about everything except the defect classes it
//! reports: it never fails, it only lists what it found.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use stitch_artifact::{Defect, DefectKind};

static MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:"[^"]*"|'[^']*'|[^'">])*)>"#,
    )
    .expect("markup pattern")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"([A-Za-z_:@][-A-Za-z0-9_:.@]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
    )
    .expect("attribute pattern")
});

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("token pattern"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

const REFERENCE_ATTRIBUTES: &[&str] = &["href", "src"];

struct OpenTag {
    name: String,
}

struct Anchor {
    target: String,
    offset: usize,
    len: usize,
}

/// Scan `document` for structural defects, in document order
///
/// `assets` are the relative paths the document may reference.
#[must_use]
pub fn scan(document: &str, assets: &[String]) -> Vec<Defect> {
    let mut defects = Vec::new();
    let mut stack: Vec<OpenTag> = Vec::new();
    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    let mut anchors = Vec::new();

    let mut pos = 0;
    while let Some(caps) = MARKUP.captures_at(document, pos) {
        let Some(whole) = caps.get(0) else { break };
        pos = whole.end();
        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.is_empty());

        if closing {
            close_tag(&mut stack, &name, whole.start(), whole.len(), &mut defects);
            continue;
        }

        if let Some(attrs) = caps.get(3) {
            scan_attributes(
                document,
                attrs.start(),
                attrs.as_str(),
                assets,
                &mut seen_ids,
                &mut anchors,
                &mut defects,
            );
        }

        let self_closing = caps
            .get(3)
            .is_some_and(|m| m.as_str().trim_end().ends_with('/'));
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            // Skip raw text; the closer (if any) is matched on the next iteration.
            let needle = format!("</{name}");
            pos = document[pos..]
                .to_ascii_lowercase()
                .find(&needle)
                .map_or(document.len(), |i| pos + i);
        }
        stack.push(OpenTag { name });
    }

    while let Some(open) = stack.pop() {
        defects.push(Defect::new(
            DefectKind::UnclosedTag,
            document.len(),
            0,
            open.name,
        ));
    }

    for anchor in anchors {
        if !seen_ids.contains_key(&anchor.target) {
            defects.push(Defect::new(
                DefectKind::BrokenReference,
                anchor.offset,
                anchor.len,
                format!("#{}", anchor.target),
            ));
        }
    }

    for m in TOKEN.find_iter(document) {
        defects.push(Defect::new(
            DefectKind::UnresolvedToken,
            m.start(),
            m.len(),
            m.as_str(),
        ));
    }

    defects.sort_by_key(|d| d.offset);
    defects
}

fn close_tag(
    stack: &mut Vec<OpenTag>,
    name: &str,
    offset: usize,
    len: usize,
    defects: &mut Vec<Defect>,
) {
    if VOID_ELEMENTS.contains(&name) {
        // `</br>` and friends are noise, not structure.
        return;
    }
    let Some(depth) = stack.iter().rposition(|t| t.name == name) else {
        defects.push(Defect::new(DefectKind::StrayClosingTag, offset, len, name));
        return;
    };
    // Everything opened inside the matching element is unclosed; the missing
    // closers belong right before this one, innermost first.
    while stack.len() > depth + 1 {
        if let Some(open) = stack.pop() {
            defects.push(Defect::new(DefectKind::UnclosedTag, offset, 0, open.name));
        }
    }
    stack.pop();
}

#[allow(clippy::too_many_arguments)]
fn scan_attributes(
    document: &str,
    base: usize,
    attrs: &str,
    assets: &[String],
    seen_ids: &mut HashMap<String, usize>,
    anchors: &mut Vec<Anchor>,
    defects: &mut Vec<Defect>,
) {
    for caps in ATTRIBUTE.captures_iter(attrs) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let quoted = caps.get(2).or_else(|| caps.get(3));
        let Some(value) = quoted.or_else(|| caps.get(4)) else {
            continue;
        };
        let value_offset = base + value.start();
        let text = value.as_str();

        match name.as_str() {
            "class" if quoted.is_some() && text.trim().is_empty() => {
                let mut start = base + whole.start();
                while start > 0 && document.as_bytes()[start - 1].is_ascii_whitespace() {
                    start -= 1;
                }
                let end = base + whole.end();
                defects.push(Defect::new(
                    DefectKind::EmptyClassAttribute,
                    start,
                    end - start,
                    &document[start..end],
                ));
            }
            "id" if !text.trim().is_empty() => {
                let count = seen_ids.entry(text.to_string()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    defects.push(Defect::new(
                        DefectKind::DuplicateId,
                        value_offset,
                        value.len(),
                        text,
                    ));
                }
            }
            attr if REFERENCE_ATTRIBUTES.contains(&attr) => match classify_reference(text) {
                Reference::Anchor(target) => anchors.push(Anchor {
                    target: target.to_string(),
                    offset: value_offset,
                    len: value.len(),
                }),
                Reference::Relative(path) if !assets.iter().any(|a| *a == path) => {
                    defects.push(Defect::new(
                        DefectKind::BrokenReference,
                        value_offset,
                        value.len(),
                        text,
                    ));
                }
                Reference::Relative(_) | Reference::External | Reference::Ignored => {}
            },
            _ => {}
        }
    }
}

enum Reference<'a> {
    Anchor(&'a str),
    Relative(String),
    External,
    Ignored,
}

fn classify_reference(value: &str) -> Reference<'_> {
    let value = value.trim();
    if value.is_empty() || value == "#" || value.contains("{{") {
        return Reference::Ignored;
    }
    if let Some(target) = value.strip_prefix('#') {
        return Reference::Anchor(target);
    }
    if value.starts_with("//") {
        return Reference::External;
    }
    let path_end = value.find(|c: char| c == '?' || c == '#').unwrap_or(value.len());
    let path = &value[..path_end];
    if path.split('/').next().is_some_and(|head| head.contains(':')) {
        return Reference::External;
    }
    match normalize_path(path) {
        Some(normalized) if normalized.is_empty() => Reference::Ignored,
        Some(normalized) => Reference::Relative(normalized),
        // Escapes the document root: never a declared asset.
        None => Reference::Relative(path.to_string()),
    }
}

fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Every non-empty `id` value in the document
pub(crate) fn collect_ids(document: &str) -> HashSet<String> {
    let mut ids = HashSet::new();
    for caps in MARKUP.captures_iter(document) {
        let (Some(_), Some(attrs)) = (caps.get(2), caps.get(3)) else {
            continue;
        };
        for attr in ATTRIBUTE.captures_iter(attrs.as_str()) {
            let is_id = attr
                .get(1)
                .is_some_and(|n| n.as_str().eq_ignore_ascii_case("id"));
            let value = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4));
            if let (true, Some(value)) = (is_id, value) {
                if !value.as_str().trim().is_empty() {
                    ids.insert(value.as_str().to_string());
                }
            }
        }
    }
    ids
}
