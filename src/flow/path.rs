// SPDX-License-Identifier: MIT

//! Dot/bracket path extraction over JSON values
//!
//! Paths look like `a.b[0].c`, `[0].key` or `items.0.id`. A component that
//! parses as an integer indexes into an array; anything else is an object
//! key. A missing step yields `None` rather than an error; only a malformed
//! path string is an error.

use serde_json::Value;

use crate::error::{FlowError, Result};

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(i64),
}

/// Split a path string into segments.
///
/// `.`, `[` and `]` all separate components and empty components are
/// skipped, so `a[0`, `a]0` and `a[]` read as `a.0`, `a.0` and `a`. A quoted
/// component may contain separators.
pub fn parse(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in path.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                current.push(c);
                quote = None;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') if current.trim().is_empty() => {
                current.push(c);
                quote = Some(c);
            }
            (None, '.' | '[' | ']') => flush(&mut current, &mut segments),
            (None, c) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(FlowError::invalid_path(path, "unterminated quote"));
    }
    flush(&mut current, &mut segments);
    Ok(segments)
}

fn flush(current: &mut String, segments: &mut Vec<Segment>) {
    let part = current.trim();
    if !part.is_empty() {
        let segment = match part.parse::<i64>() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(strip_quotes(part).to_string()),
        };
        segments.push(segment);
    }
    current.clear();
}

fn strip_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Walk `segments` into `value`
pub fn walk<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        if current.is_null() {
            return None;
        }
        current = match segment {
            Segment::Index(i) => {
                let idx = usize::try_from(*i).ok()?;
                current.as_array()?.get(idx)?
            }
            Segment::Key(k) => current.as_object()?.get(k)?,
        };
    }
    Some(current)
}

/// Resolve a path string against a value.
///
/// An empty path returns the value itself. `Ok(None)` means the path was
/// valid but led nowhere.
pub fn resolve(value: &Value, path: &str) -> Result<Option<Value>> {
    if path.trim().is_empty() {
        return Ok(Some(value.clone()));
    }
    let segments = parse(path)?;
    Ok(walk(value, &segments).cloned())
}
