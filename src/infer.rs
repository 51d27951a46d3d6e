//! Kind inference for schema discovery. Works on raw field text, not parsed
//! values: the schema pass never evaluates expressions.

use crate::deser::{parse_date_str, parse_datetime_str};
use crate::types::DataKind;

/// Guess the kind of one field. `None` means the field carries no type
/// information of its own (NULL), leaving the decision to other rows.
pub fn infer_kind(text: &str) -> Option<DataKind> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        return Some(DataKind::Bool);
    }
    if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2 {
        let inner = &text[1..text.len() - 1];
        if parse_date_str(inner).is_some() {
            return Some(DataKind::Date);
        }
        if parse_datetime_str(inner).is_some() {
            return Some(DataKind::Datetime);
        }
        return Some(DataKind::Str);
    }
    if text.starts_with('[') && text.ends_with(']') {
        let body = &text[1..text.len() - 1];
        let mut inner: Option<DataKind> = None;
        for item in split_top_level(body) {
            inner = unify(inner, infer_kind(item));
        }
        return Some(DataKind::list(inner.unwrap_or(DataKind::Str)));
    }
    if text.parse::<i64>().is_ok() {
        return Some(DataKind::Int64);
    }
    if text.parse::<f64>().is_ok() {
        return Some(DataKind::Float64);
    }
    // Anything else (expressions, bare identifiers) falls back to string.
    Some(DataKind::Str)
}

/// Merge kind guesses from two rows of the same column.
pub fn unify(a: Option<DataKind>, b: Option<DataKind>) -> Option<DataKind> {
    use DataKind::*;
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(x), Some(y)) if x == y => Some(x),
        (Some(Int64), Some(Float64)) | (Some(Float64), Some(Int64)) => Some(Float64),
        (Some(Date), Some(Datetime)) | (Some(Datetime), Some(Date)) => Some(Datetime),
        (Some(List { inner: a, .. }), Some(List { inner: b, .. })) => {
            let merged = unify(Some(*a), Some(*b)).unwrap_or(Str);
            Some(DataKind::list(merged))
        }
        _ => Some(Str),
    }
}

/// Split on commas that sit outside quotes and brackets.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut depth = 0i32;
    let mut quoted = false;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quoted => i += 1,
            b'\'' => quoted = !quoted,
            b'[' | b'(' if !quoted => depth += 1,
            b']' | b')' if !quoted => depth -= 1,
            b',' if !quoted && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < text.len() || !parts.is_empty() {
        parts.push(&text[start..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_guesses() {
        assert_eq!(infer_kind("42"), Some(DataKind::Int64));
        assert_eq!(infer_kind("-1.5"), Some(DataKind::Float64));
        assert_eq!(infer_kind("true"), Some(DataKind::Bool));
        assert_eq!(infer_kind("'hi'"), Some(DataKind::Str));
        assert_eq!(infer_kind("NULL"), None);
        assert_eq!(infer_kind("'2024-01-01'"), Some(DataKind::Date));
        assert_eq!(infer_kind("'2024-01-01 12:00:00'"), Some(DataKind::Datetime));
    }

    #[test]
    fn list_guesses() {
        assert_eq!(infer_kind("[1, 2]"), Some(DataKind::list(DataKind::Int64)));
        assert_eq!(infer_kind("[1, 2.5]"), Some(DataKind::list(DataKind::Float64)));
        assert_eq!(infer_kind("[]"), Some(DataKind::list(DataKind::Str)));
    }

    #[test]
    fn unification() {
        assert_eq!(
            unify(Some(DataKind::Int64), Some(DataKind::Float64)),
            Some(DataKind::Float64)
        );
        assert_eq!(
            unify(Some(DataKind::Date), Some(DataKind::Datetime)),
            Some(DataKind::Datetime)
        );
        assert_eq!(unify(None, Some(DataKind::Bool)), Some(DataKind::Bool));
        assert_eq!(
            unify(Some(DataKind::Int64), Some(DataKind::Str)),
            Some(DataKind::Str)
        );
        assert_eq!(
            unify(
                Some(DataKind::list(DataKind::Int64)),
                Some(DataKind::list(DataKind::Float64))
            ),
            Some(DataKind::list(DataKind::Float64))
        );
    }

    #[test]
    fn top_level_split_respects_nesting() {
        assert_eq!(split_top_level("1, [2, 3], 'a,b'"), vec!["1", " [2, 3]", " 'a,b'"]);
        assert_eq!(split_top_level(""), Vec::<&str>::new());
    }
}
