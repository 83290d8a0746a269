//! Brace-aware rewriting of a single `@type{key, ...}` record.
//!
//! Every function here returns its input unchanged when the text is not one
//! well-formed record.

use std::collections::HashSet;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static RECORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(@\w+\s*\{\s*[^,]+\s*,)(.*)(\})\s*$").unwrap());

static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([A-Za-z][A-Za-z0-9_-]*)\s*=\s*").unwrap());

/// One `name = value` pair; `value` indexes the body and includes the
/// original delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawField {
    name: String,
    value: Range<usize>,
}

#[derive(Debug)]
struct ParsedRecord<'a> {
    text: &'a str,
    head: &'a str,
    body: &'a str,
    body_start: usize,
    tail: &'a str,
    fields: Vec<RawField>,
}

impl<'a> ParsedRecord<'a> {
    fn parse(record: &'a str) -> Option<Self> {
        let text = record.trim();
        let caps = RECORD_REGEX.captures(text)?;
        let head = caps.get(1)?.as_str();
        let body = caps.get(2)?;
        let tail = caps.get(3)?.as_str();

        Some(Self {
            text,
            head,
            body: body.as_str(),
            body_start: body.start(),
            tail,
            fields: scan_fields(body.as_str()),
        })
    }

    fn value(&self, field: &RawField) -> &'a str {
        &self.body[field.value.clone()]
    }

    fn find(&self, name: &str) -> impl Iterator<Item = &RawField> {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
    }

    fn emit<'f>(&self, fields: impl IntoIterator<Item = &'f RawField>) -> String {
        let mut lines: Vec<String> = fields
            .into_iter()
            .map(|f| format!("  {} = {},", f.name, self.value(f)))
            .collect();
        if let Some(last) = lines.last_mut()
            && last.ends_with(',')
        {
            last.pop();
        }
        format!("{}\n{}\n{}", self.head, lines.join("\n"), self.tail)
    }
}

/// Depth-tracking scan over the record body. Brace values may nest, quoted
/// values run to the next `"`, and bare values run to `,` or a newline.
fn scan_fields(body: &str) -> Vec<RawField> {
    let bytes = body.as_bytes();
    let mut fields = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(caps) = NAME_REGEX.captures(&body[pos..]) else {
            break;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let name = name.as_str().to_string();
        pos += whole.end();

        let value = match bytes.get(pos) {
            Some(b'{') => {
                let start = pos;
                let mut depth = 0usize;
                while pos < bytes.len() {
                    match bytes[pos] {
                        b'{' => depth += 1,
                        b'}' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                pos += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    pos += 1;
                }
                start..pos
            }
            Some(b'"') => {
                let start = pos;
                pos += 1;
                while pos < bytes.len() && bytes[pos] != b'"' {
                    pos += 1;
                }
                pos = (pos + 1).min(bytes.len());
                start..pos
            }
            _ => {
                let start = pos;
                while pos < bytes.len() && !matches!(bytes[pos], b',' | b'\n') {
                    pos += 1;
                }
                let trimmed = body[start..pos].trim_end().len();
                start..start + trimmed
            }
        };

        let mut comma_seen = false;
        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\r' | b'\n' | b',') {
            if bytes[pos] == b',' {
                if comma_seen {
                    break;
                }
                comma_seen = true;
            }
            pos += 1;
        }

        fields.push(RawField { name, value });
    }

    fields
}

/// Emit fields named in `order` first (case-insensitive, in that order), then
/// the rest in their original order. Field-name casing and value delimiters
/// are preserved; only the final field loses its trailing comma.
pub fn order_fields<S: AsRef<str>>(record: &str, order: &[S]) -> String {
    let Some(parsed) = ParsedRecord::parse(record) else {
        return record.to_string();
    };

    let mut used: HashSet<String> = HashSet::new();
    let mut ordered: Vec<&RawField> = Vec::with_capacity(parsed.fields.len());
    for name in order {
        let name = name.as_ref().to_ascii_lowercase();
        if used.contains(&name) {
            continue;
        }
        if let Some(field) = parsed.find(&name).last() {
            ordered.push(field);
            used.insert(name);
        }
    }
    ordered.extend(
        parsed
            .fields
            .iter()
            .filter(|f| !used.contains(&f.name.to_ascii_lowercase())),
    );

    parsed.emit(ordered)
}

/// Set `field` to `{value}`, replacing every existing occurrence or appending
/// one before the closing brace. An empty `value` leaves the record as is.
pub fn upsert_field(record: &str, field: &str, value: &str) -> String {
    if value.is_empty() {
        return record.to_string();
    }
    let Some(parsed) = ParsedRecord::parse(record) else {
        return record.to_string();
    };

    let replacement = format!("{{{value}}}");
    let spans: Vec<Range<usize>> = parsed.find(field).map(|f| f.value.clone()).collect();

    if spans.is_empty() {
        let without_close = parsed.text[..parsed.text.len() - parsed.tail.len()].trim_end();
        let without_comma = without_close.strip_suffix(',').unwrap_or(without_close);
        return format!("{without_comma},\n  {field} = {replacement}\n}}");
    }

    let mut out = parsed.text.to_string();
    for span in spans.into_iter().rev() {
        let start = parsed.body_start + span.start;
        let end = parsed.body_start + span.end;
        out.replace_range(start..end, &replacement);
    }
    out
}

/// Add `field` only when the record does not already carry it.
pub fn insert_field_if_absent(record: &str, field: &str, value: &str) -> String {
    match ParsedRecord::parse(record) {
        Some(parsed) if parsed.find(field).next().is_some() => record.to_string(),
        Some(_) => upsert_field(record, field, value),
        None => record.to_string(),
    }
}

/// Drop every occurrence of `field`, re-emitting the remaining fields in
/// their original order.
pub fn remove_field(record: &str, field: &str) -> String {
    let Some(parsed) = ParsedRecord::parse(record) else {
        return record.to_string();
    };
    if parsed.find(field).next().is_none() {
        return record.to_string();
    }
    parsed.emit(
        parsed
            .fields
            .iter()
            .filter(|f| !f.name.eq_ignore_ascii_case(field)),
    )
}

/// Swap the citation key in the `@type{KEY,` header; the body is untouched.
/// Only the first header match is replaced.
pub fn replace_key(record: &str, old: &str, new: &str) -> String {
    if old.is_empty() || old == new {
        return record.to_string();
    }
    let pattern = format!(r"(?m)^(\s*@\w+\s*\{{\s*){}(\s*,)", regex::escape(old));
    let Ok(re) = Regex::new(&pattern) else {
        return record.to_string();
    };
    re.replacen(record, 1, |caps: &regex::Captures<'_>| {
        format!("{}{}{}", &caps[1], new, &caps[2])
    })
    .into_owned()
}

/// Value of `field` in the record with its delimiters, if present.
pub fn field_value(record: &str, field: &str) -> Option<String> {
    let parsed = ParsedRecord::parse(record)?;
    let found = parsed.find(field).last()?;
    Some(parsed.value(found).to_string())
}

/// Field names in record order, original casing.
pub fn field_names(record: &str) -> Vec<String> {
    ParsedRecord::parse(record)
        .map(|p| p.fields.into_iter().map(|f| f.name).collect())
        .unwrap_or_default()
}
