//! Structured-Output Recovery
//!
//! Generation providers return free text that *should* contain a JSON
//! document but is frequently fenced, wrapped in prose, or truncated
//! mid-token-budget. Recovery degrades through progressively more
//! aggressive strategies:
//!
//! 1. Fence stripping (drop a wrapping markdown code fence)
//! 2. Envelope extraction (slice from the first `{` to the last `}`)
//! 3. Direct parse
//! 4. Structural repair (trailing commas, mid-string truncation,
//!    unbalanced brackets)
//! 5. Field-by-field extraction against a caller-declared schema
//!
//! Recovery never invents field values: a field appears in a recovered
//! partial object only if literal text for it was found. The structural
//! repair is a best-effort heuristic, not a general JSON repair
//! algorithm; bracket closing is whole-text and nesting-order-blind, so
//! deeply nested truncated structures can still mis-close.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Errors from recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No strategy salvaged a single field from the provider text.
    #[error("no structured data could be recovered for '{label}'")]
    Exhausted { label: String },
}

/// Kinds of fields the last-resort extractor knows how to pull out of
/// raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A plain string field.
    Text,
    /// An array of plain strings.
    TextArray,
}

/// Declarative schema hint for field-by-field extraction: the fields
/// worth salvaging individually when the document as a whole is beyond
/// repair. New document schemas need a new list, not new extraction
/// code.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// JSON field name.
    pub name: String,
    /// How to extract the value.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// A plain string field.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
        }
    }

    /// An array-of-strings field.
    pub fn text_array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::TextArray,
        }
    }
}

/// Recover a JSON value from raw provider text.
///
/// `schema` drives the last-resort field extraction; pass an empty slice
/// when only whole-document recovery makes sense. Returns
/// `RecoveryError::Exhausted` only when nothing at all could be
/// salvaged.
pub fn recover(raw_text: &str, label: &str, schema: &[FieldSpec]) -> Result<Value, RecoveryError> {
    let stripped = strip_code_fences(raw_text);
    let sliced = extract_envelope(stripped).unwrap_or(stripped);

    if let Ok(value) = serde_json::from_str::<Value>(sliced) {
        return Ok(value);
    }

    let repaired = repair_structure(sliced);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        debug!(
            label,
            original_len = sliced.len(),
            repaired_len = repaired.len(),
            "structural repair recovered a parseable document"
        );
        return Ok(value);
    }

    let fields = extract_fields(raw_text, schema);
    if fields.is_empty() {
        return Err(RecoveryError::Exhausted {
            label: label.to_string(),
        });
    }
    debug!(
        label,
        field_count = fields.len(),
        "field extraction salvaged a partial document"
    );
    Ok(Value::Object(fields))
}

/// Strategy 1: remove a wrapping markdown code fence (with optional
/// language tag) and surrounding whitespace.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip the optional language identifier line (e.g. "json").
        let content_start = after.find('\n').map(|nl| nl + 1).unwrap_or(0);
        let content = &after[content_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
        // Unterminated fence, usually a truncated response. Drop the
        // marker and keep going.
        return content.trim();
    }

    trimmed
}

/// Strategy 2: slice out the payload from surrounding prose.
///
/// With a closing brace present, this is first-`{` to last-`}`. Without
/// one the payload was truncated; keep everything from the first `{` so
/// repair can work on it.
fn extract_envelope(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Strategy 4: best-effort structural repair of malformed or truncated
/// output.
fn repair_structure(text: &str) -> String {
    let mut repaired = strip_trailing_commas(text);
    if let Some(cut) = StringScan::of(&repaired).unterminated_start {
        repaired.truncate(cut);
    }
    repaired = strip_dangling_fragment(repaired);
    append_missing_closers(&mut repaired);
    repaired
}

/// Result of a string-aware scan over candidate JSON text.
struct StringScan {
    /// Byte offset of the opening quote of a trailing unterminated
    /// string literal, if the text ends inside one.
    unterminated_start: Option<usize>,
    /// Byte offset of the opening quote of the last *complete* string
    /// literal.
    last_complete_start: Option<usize>,
}

impl StringScan {
    fn of(text: &str) -> Self {
        let mut in_string = false;
        let mut escaped = false;
        let mut current_start = 0usize;
        let mut last_complete_start = None;

        for (i, c) in text.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                    last_complete_start = Some(current_start);
                }
            } else if c == '"' {
                in_string = true;
                current_start = i;
            }
        }

        Self {
            unterminated_start: in_string.then_some(current_start),
            last_complete_start,
        }
    }
}

/// Remove commas that sit directly before a closing bracket or brace,
/// ignoring string contents.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == '}' || c == ']' {
            let kept = out.trim_end().len();
            if out[..kept].ends_with(',') {
                out.truncate(kept - 1);
            }
        }
        out.push(c);
    }

    out
}

/// Drop an incomplete key/value fragment left at the end of truncated
/// text: a dangling `"key":` whose value was cut, or a bare trailing
/// comma.
fn strip_dangling_fragment(mut text: String) -> String {
    truncate_trailing_whitespace(&mut text);

    if text.ends_with(':') {
        text.pop();
        truncate_trailing_whitespace(&mut text);
        if text.ends_with('"') {
            if let Some(key_start) = StringScan::of(&text).last_complete_start {
                text.truncate(key_start);
            }
            truncate_trailing_whitespace(&mut text);
        }
    }

    if text.ends_with(',') {
        text.pop();
        truncate_trailing_whitespace(&mut text);
    }

    text
}

fn truncate_trailing_whitespace(text: &mut String) {
    while text.ends_with(char::is_whitespace) {
        text.pop();
    }
}

/// Count open vs. close brackets and braces outside strings and append
/// the missing `]`s, then the missing `}`s. Whole-text counts; nesting
/// order is not tracked.
fn append_missing_closers(text: &mut String) {
    let mut in_string = false;
    let mut escaped = false;
    let mut open_brackets = 0i32;
    let mut open_braces = 0i32;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '[' => open_brackets += 1,
                ']' => open_brackets -= 1,
                '{' => open_braces += 1,
                '}' => open_braces -= 1,
                _ => {}
            }
        }
    }

    for _ in 0..open_brackets.max(0) {
        text.push(']');
    }
    for _ in 0..open_braces.max(0) {
        text.push('}');
    }
}

/// Strategy 5: pull individually declared fields straight out of the raw
/// text, ignoring overall document validity. A field with no literal
/// trace in the text is omitted, never defaulted.
fn extract_fields(raw: &str, schema: &[FieldSpec]) -> Map<String, Value> {
    let mut fields = Map::new();

    for spec in schema {
        match spec.kind {
            FieldKind::Text => {
                if let Some(value) = extract_text_field(raw, &spec.name) {
                    fields.insert(spec.name.clone(), Value::String(value));
                }
            }
            FieldKind::TextArray => {
                if let Some(items) = extract_array_field(raw, &spec.name) {
                    fields.insert(
                        spec.name.clone(),
                        Value::Array(items.into_iter().map(Value::String).collect()),
                    );
                }
            }
        }
    }

    fields
}

/// Match `"name": "<complete string literal>"` anywhere in the text.
/// Truncated values have no closing quote and therefore never match.
fn extract_text_field(raw: &str, name: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*("(?:[^"\\]|\\.)*")"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let literal = re.captures(raw)?.get(1)?.as_str();
    serde_json::from_str::<String>(literal).ok()
}

/// Match `"name": [` and collect every complete string literal up to the
/// closing bracket, or up to the end of a truncated array.
fn extract_array_field(raw: &str, name: &str) -> Option<Vec<String>> {
    let pattern = format!(r#""{}"\s*:\s*\["#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let tail = &raw[re.find(raw)?.end()..];

    let mut items = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0usize;

    for (i, c) in tail.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                if let Ok(item) = serde_json::from_str::<String>(&tail[start..=i]) {
                    items.push(item);
                }
            }
        } else if c == '"' {
            in_string = true;
            start = i;
        } else if c == ']' {
            break;
        }
    }

    Some(items)
}
