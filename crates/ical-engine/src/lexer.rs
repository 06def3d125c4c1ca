//! Content-line tokenizer -- turns raw iCalendar bytes into logical property lines.
//!
//! Folding and escaping are handled in separate passes: [`tokenize`] only unfolds
//! continuation lines and splits each logical line into name, parameters and raw
//! value. Text unescaping happens later via [`unescape_text`], once the parser
//! knows the property is TEXT-valued.

use std::collections::BTreeMap;

use crate::error::{ReadError, Result};

/// One logical line: `NAME;PARAM=VALUE:raw value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name, upper-cased.
    pub name: String,
    /// Parameters keyed by upper-cased name. Quoted values are stored unquoted.
    pub params: BTreeMap<String, String>,
    /// Raw value, still escaped.
    pub value: String,
    /// 1-based index of the logical line in the document.
    pub line: usize,
}

impl ContentLine {
    /// Look up a parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }
}

/// Tokenize a whole document into logical lines.
///
/// # Errors
/// Returns `ReadError::MalformedDocument` when a continuation line has nothing
/// to continue or a line has no `:` separating name from value.
pub fn tokenize(input: &[u8]) -> Result<Vec<ContentLine>> {
    let text = String::from_utf8_lossy(input);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    unfold(text)
        .into_iter()
        .enumerate()
        .map(|(i, raw)| split_line(&raw, i + 1))
        .collect()
}

/// Undo RFC 5545 line folding. Blank lines are dropped.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for physical in text.split('\n') {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);

        if let Some(rest) = physical
            .strip_prefix(' ')
            .or_else(|| physical.strip_prefix('\t'))
        {
            match lines.last_mut() {
                Some(last) => last.push_str(rest),
                // A leading continuation line: keep it so that split_line reports it.
                None => lines.push(physical.to_string()),
            }
            continue;
        }

        if physical.is_empty() {
            continue;
        }
        lines.push(physical.to_string());
    }

    lines
}

/// Split a logical line into name, parameters and value.
fn split_line(raw: &str, line: usize) -> Result<ContentLine> {
    if raw.starts_with(' ') || raw.starts_with('\t') {
        return Err(ReadError::malformed(line, "continuation line without a preceding line"));
    }

    let value_start = find_value_separator(raw)
        .ok_or_else(|| ReadError::malformed(line, format!("missing ':' in {raw:?}")))?;
    let head = &raw[..value_start];
    let value = raw[value_start + 1..].to_string();

    let mut parts = split_unquoted(head, ';').into_iter();
    let name = parts.next().unwrap_or_default().trim().to_ascii_uppercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ReadError::malformed(line, format!("invalid property name in {raw:?}")));
    }

    let mut params = BTreeMap::new();
    for param in parts {
        let (key, val) = param
            .split_once('=')
            .ok_or_else(|| ReadError::malformed(line, format!("parameter without '=' in {raw:?}")))?;
        params.insert(key.trim().to_ascii_uppercase(), unquote(val));
    }

    Ok(ContentLine {
        name,
        params,
        value,
        line,
    })
}

/// Position of the first `:` that is not inside a quoted parameter value.
fn find_value_separator(raw: &str) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in raw.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            out.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&s[start..]);
    out
}

fn unquote(val: &str) -> String {
    // Multi-valued parameters ("a","b") keep their commas; only the quotes go.
    val.split(',')
        .map(|v| v.trim().trim_matches('"'))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode TEXT escapes: `\n`/`\N` become newlines; `\,`, `\;` and `\\` lose their backslash.
///
/// An unknown escape keeps the character after the backslash.
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a multi-valued property value on commas that are not escaped.
pub fn split_list(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                out.push(&raw[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    out.push(&raw[start..]);
    out.into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
