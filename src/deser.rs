//! Streaming literal deserializer. Reads one value of a declared kind
//! directly from the byte cursor without tokenizing. Any shape it cannot
//! handle comes back as a recoverable syntax error so the caller can roll the
//! cursor back and try the expression path instead.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime};

use crate::cursor::Cursor;
use crate::error::{ValuesError, ValuesResult};
use crate::types::DataKind;
use crate::value::Scalar;

/// Outcome of a streaming read. `concrete` is false when the cell was filled
/// in by null-as-default substitution rather than parsed from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Deserialized {
    pub value: Scalar,
    pub concrete: bool,
}

impl Deserialized {
    fn concrete(value: Scalar) -> Self {
        Deserialized { value, concrete: true }
    }
}

/// Read one literal of `kind` at the cursor. The delimiter after the value is
/// left unconsumed. Errors other than `Syntax` and `Overflow` do not occur.
pub fn deserialize_literal<R: Read>(
    cursor: &mut Cursor<R>,
    kind: &DataKind,
    nullable: bool,
    null_as_default: bool,
) -> ValuesResult<Deserialized> {
    if try_keyword(cursor, b"NULL")? {
        if nullable {
            return Ok(Deserialized::concrete(Scalar::Null));
        }
        if null_as_default {
            return Ok(Deserialized { value: kind.default_scalar(), concrete: false });
        }
        return Err(ValuesError::NullNotAllowed { kind: kind.name() });
    }
    let value = match kind {
        DataKind::Bool => read_bool(cursor)?,
        DataKind::Int32 => read_int(cursor, Some((i32::MIN as i64, i32::MAX as i64)))?,
        DataKind::Int64 => read_int(cursor, None)?,
        DataKind::Float64 => read_float(cursor)?,
        DataKind::Str => Scalar::Str(read_quoted_string(cursor)?),
        DataKind::Date => read_date(cursor)?,
        DataKind::Datetime => read_datetime(cursor)?,
        DataKind::List { inner, width } => read_list(cursor, inner, width.as_ref(), nullable, null_as_default)?,
    };
    Ok(Deserialized::concrete(value))
}

/// Consume a keyword if it is next and not part of a longer identifier.
pub(crate) fn try_keyword<R: Read>(cursor: &mut Cursor<R>, word: &[u8]) -> ValuesResult<bool> {
    let start = cursor.abs_pos();
    for (i, &w) in word.iter().enumerate() {
        match cursor.peek()? {
            Some(b) if b.eq_ignore_ascii_case(&w) => cursor.advance(),
            _ => {
                if i > 0 {
                    cursor.seek_abs(start);
                }
                return Ok(false);
            }
        }
    }
    if let Some(b) = cursor.peek()? {
        if b.is_ascii_alphanumeric() || b == b'_' {
            cursor.seek_abs(start);
            return Ok(false);
        }
    }
    Ok(true)
}

fn read_bool<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<Scalar> {
    if try_keyword(cursor, b"true")? {
        return Ok(Scalar::Bool(true));
    }
    if try_keyword(cursor, b"false")? {
        return Ok(Scalar::Bool(false));
    }
    // Accept bare 0/1 as booleans.
    match cursor.peek()? {
        Some(b'0') => {
            cursor.advance();
            ensure_value_boundary(cursor)?;
            Ok(Scalar::Bool(false))
        }
        Some(b'1') => {
            cursor.advance();
            ensure_value_boundary(cursor)?;
            Ok(Scalar::Bool(true))
        }
        _ => Err(ValuesError::syntax(format!(
            "cannot parse boolean here: {}",
            cursor.context_snippet()
        ))),
    }
}

/// The byte after a fixed-width literal must not extend it.
fn ensure_value_boundary<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<()> {
    match cursor.peek()? {
        Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' => Err(
            ValuesError::syntax(format!("unexpected trailing character: {}", cursor.context_snippet())),
        ),
        _ => Ok(()),
    }
}

fn read_int<R: Read>(cursor: &mut Cursor<R>, range: Option<(i64, i64)>) -> ValuesResult<Scalar> {
    let negative = match cursor.peek()? {
        Some(b'-') => {
            cursor.advance();
            true
        }
        Some(b'+') => {
            cursor.advance();
            false
        }
        _ => false,
    };
    let mut value: i64 = 0;
    let mut digits = 0usize;
    while let Some(b) = cursor.peek()? {
        if !b.is_ascii_digit() {
            break;
        }
        cursor.advance();
        digits += 1;
        let d = (b - b'0') as i64;
        value = value
            .checked_mul(10)
            .and_then(|v| if negative { v.checked_sub(d) } else { v.checked_add(d) })
            .ok_or_else(|| ValuesError::overflow("integer literal out of range"))?;
    }
    if digits == 0 {
        return Err(ValuesError::syntax(format!(
            "cannot parse integer here: {}",
            cursor.context_snippet()
        )));
    }
    ensure_value_boundary(cursor)?;
    if let Some((lo, hi)) = range {
        if value < lo || value > hi {
            return Err(ValuesError::overflow(format!("value {value} out of range for Int32")));
        }
    }
    Ok(Scalar::Int(value))
}

fn read_float<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<Scalar> {
    let start = cursor.abs_pos();
    if matches!(cursor.peek()?, Some(b'-') | Some(b'+')) {
        cursor.advance();
    }
    let mut saw_digit = false;
    let mut saw_dot = false;
    let mut saw_exp = false;
    while let Some(b) = cursor.peek()? {
        match b {
            b'0'..=b'9' => {
                saw_digit = true;
                cursor.advance();
            }
            b'.' if !saw_dot && !saw_exp => {
                saw_dot = true;
                cursor.advance();
            }
            b'e' | b'E' if saw_digit && !saw_exp => {
                saw_exp = true;
                cursor.advance();
                if matches!(cursor.peek()?, Some(b'-') | Some(b'+')) {
                    cursor.advance();
                }
            }
            _ => break,
        }
    }
    let end = cursor.abs_pos();
    if !saw_digit {
        return Err(ValuesError::syntax(format!(
            "cannot parse number here: {}",
            cursor.context_snippet()
        )));
    }
    ensure_value_boundary(cursor)?;
    let text = String::from_utf8_lossy(cursor.slice_abs(start, end)).into_owned();
    let parsed: f64 = text
        .parse()
        .map_err(|_| ValuesError::syntax(format!("invalid number '{text}'")))?;
    Ok(Scalar::Float(parsed))
}

/// Read a single-quoted string, handling backslash escapes and `''` doubling.
fn read_quoted_string<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<String> {
    if cursor.peek()? != Some(b'\'') {
        return Err(ValuesError::syntax(format!(
            "expected quoted string here: {}",
            cursor.context_snippet()
        )));
    }
    cursor.advance();
    let mut out = Vec::new();
    loop {
        match cursor.pop()? {
            None => return Err(ValuesError::syntax("unterminated string literal")),
            Some(b'\\') => match cursor.pop()? {
                None => return Err(ValuesError::syntax("unterminated string literal")),
                Some(b'n') => out.push(b'\n'),
                Some(b't') => out.push(b'\t'),
                Some(b'r') => out.push(b'\r'),
                Some(b'0') => out.push(0),
                Some(other) => out.push(other),
            },
            Some(b'\'') => {
                if cursor.peek()? == Some(b'\'') {
                    cursor.advance();
                    out.push(b'\'');
                } else {
                    break;
                }
            }
            Some(b) => out.push(b),
        }
    }
    String::from_utf8(out).map_err(|_| ValuesError::syntax("string literal is not valid UTF-8"))
}

pub(crate) fn parse_date_str(text: &str) -> Option<i32> {
    let d = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some((d - NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch")).num_days() as i32)
}

pub(crate) fn parse_datetime_str(text: &str) -> Option<i64> {
    let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok();
    match parsed {
        Some(dt) => Some(dt.and_utc().timestamp_millis()),
        None => parse_date_str(text).map(|d| d as i64 * 86_400_000),
    }
}

fn read_date<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<Scalar> {
    let text = read_quoted_string(cursor)?;
    parse_date_str(&text)
        .map(Scalar::Date)
        .ok_or_else(|| ValuesError::syntax(format!("cannot parse date '{text}'")))
}

fn read_datetime<R: Read>(cursor: &mut Cursor<R>) -> ValuesResult<Scalar> {
    // Either a quoted timestamp or a bare epoch-seconds integer.
    if cursor.peek()? == Some(b'\'') {
        let text = read_quoted_string(cursor)?;
        return parse_datetime_str(&text)
            .map(Scalar::Datetime)
            .ok_or_else(|| ValuesError::syntax(format!("cannot parse datetime '{text}'")));
    }
    match read_int(cursor, None)? {
        Scalar::Int(secs) => secs
            .checked_mul(1000)
            .map(Scalar::Datetime)
            .ok_or_else(|| ValuesError::overflow("datetime out of range")),
        _ => unreachable!(),
    }
}

fn read_list<R: Read>(
    cursor: &mut Cursor<R>,
    inner: &DataKind,
    width: Option<&usize>,
    nullable: bool,
    null_as_default: bool,
) -> ValuesResult<Scalar> {
    cursor.assert_char(b'[')?;
    let mut items = Vec::new();
    cursor.skip_whitespace()?;
    if cursor.check_char(b']')? {
        check_width(&items, width)?;
        return Ok(Scalar::Array(items));
    }
    loop {
        cursor.skip_whitespace()?;
        let item = deserialize_literal(cursor, inner, nullable, null_as_default)?;
        items.push(item.value);
        cursor.skip_whitespace()?;
        if cursor.check_char(b',')? {
            continue;
        }
        cursor.assert_char(b']')?;
        break;
    }
    check_width(&items, width)?;
    Ok(Scalar::Array(items))
}

fn check_width(items: &[Scalar], width: Option<&usize>) -> ValuesResult<()> {
    if let Some(&w) = width {
        if items.len() != w {
            return Err(ValuesError::type_mismatch(format!(
                "expected {w} list elements, got {}",
                items.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn de(input: &str, kind: DataKind) -> ValuesResult<Deserialized> {
        let mut c = Cursor::new(input.as_bytes());
        deserialize_literal(&mut c, &kind, false, false)
    }

    fn de_nullable(input: &str, kind: DataKind) -> ValuesResult<Deserialized> {
        let mut c = Cursor::new(input.as_bytes());
        deserialize_literal(&mut c, &kind, true, false)
    }

    #[test]
    fn integers() {
        assert_eq!(de("42,", DataKind::Int64).unwrap().value, Scalar::Int(42));
        assert_eq!(de("-7)", DataKind::Int64).unwrap().value, Scalar::Int(-7));
        assert_eq!(
            de("-9223372036854775808,", DataKind::Int64).unwrap().value,
            Scalar::Int(i64::MIN)
        );
    }

    #[test]
    fn int_overflow_is_not_recoverable() {
        let err = de("99999999999999999999,", DataKind::Int64).unwrap_err();
        assert!(matches!(err, ValuesError::Overflow { .. }));
        assert!(!err.is_recoverable_parse());
        let err = de("3000000000,", DataKind::Int32).unwrap_err();
        assert!(matches!(err, ValuesError::Overflow { .. }));
    }

    #[test]
    fn trailing_junk_is_recoverable_syntax() {
        let err = de("12abc,", DataKind::Int64).unwrap_err();
        assert!(err.is_recoverable_parse());
        let err = de("-(1),", DataKind::Int64).unwrap_err();
        assert!(err.is_recoverable_parse());
    }

    #[test]
    fn floats() {
        assert_eq!(de("1.5,", DataKind::Float64).unwrap().value, Scalar::Float(1.5));
        assert_eq!(de("-2e3,", DataKind::Float64).unwrap().value, Scalar::Float(-2000.0));
        assert_eq!(de("3,", DataKind::Float64).unwrap().value, Scalar::Float(3.0));
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            de(r"'a\'b',", DataKind::Str).unwrap().value,
            Scalar::Str("a'b".into())
        );
        assert_eq!(
            de("'it''s',", DataKind::Str).unwrap().value,
            Scalar::Str("it's".into())
        );
        assert_eq!(
            de(r"'x\ny',", DataKind::Str).unwrap().value,
            Scalar::Str("x\ny".into())
        );
    }

    #[test]
    fn dates_and_datetimes() {
        assert_eq!(de("'1970-01-02',", DataKind::Date).unwrap().value, Scalar::Date(1));
        assert_eq!(
            de("'1970-01-01 00:00:01',", DataKind::Datetime).unwrap().value,
            Scalar::Datetime(1000)
        );
        // Bare integer is interpreted as epoch seconds.
        assert_eq!(
            de("60,", DataKind::Datetime).unwrap().value,
            Scalar::Datetime(60_000)
        );
    }

    #[test]
    fn null_handling() {
        assert_eq!(de_nullable("NULL,", DataKind::Int64).unwrap().value, Scalar::Null);
        let err = de("NULL,", DataKind::Int64).unwrap_err();
        assert!(matches!(err, ValuesError::NullNotAllowed { .. }));
        let mut c = Cursor::new("null,".as_bytes());
        let d = deserialize_literal(&mut c, &DataKind::Int64, false, true).unwrap();
        assert_eq!(d.value, Scalar::Int(0));
        assert!(!d.concrete);
        // NULLIF must not be read as the NULL keyword.
        assert!(de_nullable("NULLIF(1,2),", DataKind::Int64).is_err());
    }

    #[test]
    fn lists() {
        let kind = DataKind::list(DataKind::Int64);
        assert_eq!(
            de("[1, 2, 3],", kind.clone()).unwrap().value,
            Scalar::Array(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)])
        );
        assert_eq!(de("[],", kind).unwrap().value, Scalar::Array(vec![]));
        let fixed = DataKind::List { inner: Box::new(DataKind::Int64), width: Some(2) };
        let err = de("[1],", fixed).unwrap_err();
        assert!(matches!(err, ValuesError::TypeMismatch { .. }));
    }

    #[test]
    fn bools() {
        assert_eq!(de("true,", DataKind::Bool).unwrap().value, Scalar::Bool(true));
        assert_eq!(de("0,", DataKind::Bool).unwrap().value, Scalar::Bool(false));
        assert!(de("tru,", DataKind::Bool).is_err());
    }

    #[test]
    fn delimiter_is_left_in_place() {
        let mut c = Cursor::new("42, 43".as_bytes());
        deserialize_literal(&mut c, &DataKind::Int64, false, false).unwrap();
        assert_eq!(c.peek().unwrap(), Some(b','));
    }
}
