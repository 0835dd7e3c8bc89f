//! Slot value rendering
//!
//! Every rendered value is attribute-safe: it can land in element text or in
//! a quoted attribute. Braces are escaped too, so a value can never look like
//! an unresolved token to the auditor.

use crate::assets::AssetRoot;
use crate::error::AssemblyError;
use crate::template::SlotType;
use serde_json::Value;

/// Outcome of rendering one slot value
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rendered {
    pub(crate) text: String,
    /// Normalized relative asset path, for relative URL values
    pub(crate) asset: Option<String>,
}

/// Escape text for HTML element content and quoted attributes
#[must_use]
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn render(
    slot: &str,
    kind: SlotType,
    value: &Value,
    assets: &AssetRoot,
) -> Result<Rendered, AssemblyError> {
    let invalid = |reason: String| AssemblyError::InvalidSlotValue {
        slot: slot.to_string(),
        reason,
    };
    let plain = |text: String| Rendered { text, asset: None };

    match kind {
        SlotType::Text => match value {
            Value::String(s) => Ok(plain(escape_text(s))),
            Value::Number(n) => Ok(plain(n.to_string())),
            Value::Bool(b) => Ok(plain(b.to_string())),
            other => Err(invalid(format!("expected text, found {}", type_name(other)))),
        },
        SlotType::Numeric => {
            let n = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if n.is_finite() => Ok(plain(match value {
                    Value::Number(num) => num.to_string(),
                    _ => n.to_string(),
                })),
                _ => Err(invalid(format!("expected a finite number, found {value}"))),
            }
        }
        SlotType::Color => match value.as_str() {
            Some(s) if is_hex_color(s) => Ok(plain(s.to_string())),
            _ => Err(invalid(format!("expected a hex color, found {value}"))),
        },
        SlotType::Url => {
            let Some(url) = value.as_str().map(str::trim) else {
                return Err(invalid(format!("expected a URL, found {}", type_name(value))));
            };
            render_url(url, assets).map_err(|e| match e {
                UrlError::Scheme => invalid(format!("URL scheme not allowed: {url}")),
                UrlError::Asset(e) => e,
            })
        }
    }
}

enum UrlError {
    Scheme,
    Asset(AssemblyError),
}

const ALLOWED_SCHEMES: &[&str] = &["http://", "https://", "mailto:", "tel:"];

fn render_url(url: &str, assets: &AssetRoot) -> Result<Rendered, UrlError> {
    if url.is_empty() || url.starts_with("//") {
        return Err(UrlError::Scheme);
    }
    let lower = url.to_ascii_lowercase();
    if ALLOWED_SCHEMES.iter().any(|s| lower.starts_with(s)) || url.starts_with('#') {
        return Ok(Rendered {
            text: escape_text(url),
            asset: None,
        });
    }

    // Anything with a scheme before the first path separator is not relative.
    let path_end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    let path = &url[..path_end];
    if path.split('/').next().is_some_and(|head| head.contains(':')) {
        return Err(UrlError::Scheme);
    }

    let normalized = assets.check(path).map_err(UrlError::Asset)?;
    Ok(Rendered {
        text: escape_text(&format!("{normalized}{}", &url[path_end..])),
        asset: Some(normalized),
    })
}

fn is_hex_color(s: &str) -> bool {
    s.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6 | 8) && hex.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
