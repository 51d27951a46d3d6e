//! Coerce an evaluated scalar into a column's declared kind. This is the
//! strict conversion step applied after expression evaluation and after
//! template replay; the streaming deserializer never goes through here.

use crate::deser::{parse_date_str, parse_datetime_str};
use crate::error::{ValuesError, ValuesResult};
use crate::types::DataKind;
use crate::value::Scalar;

/// Convert `value` to `kind`. Nulls pass through untouched; the caller decides
/// whether the column accepts them. Out-of-range numerics are `Overflow`,
/// structural mismatches are `TypeMismatch`.
pub fn coerce(value: Scalar, kind: &DataKind) -> ValuesResult<Scalar> {
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    match kind {
        DataKind::Bool => match value {
            Scalar::Bool(_) => Ok(value),
            Scalar::Int(0) => Ok(Scalar::Bool(false)),
            Scalar::Int(1) => Ok(Scalar::Bool(true)),
            other => mismatch(&other, kind),
        },
        DataKind::Int32 => {
            let v = to_int(value, kind)?;
            if v < i32::MIN as i64 || v > i32::MAX as i64 {
                Err(ValuesError::overflow(format!("value {v} out of range for Int32")))
            } else {
                Ok(Scalar::Int(v))
            }
        }
        DataKind::Int64 => Ok(Scalar::Int(to_int(value, kind)?)),
        DataKind::Float64 => match value {
            Scalar::Float(_) => Ok(value),
            Scalar::Int(i) => Ok(Scalar::Float(i as f64)),
            Scalar::Bool(b) => Ok(Scalar::Float(if b { 1.0 } else { 0.0 })),
            other => mismatch(&other, kind),
        },
        DataKind::Str => match value {
            Scalar::Str(_) => Ok(value),
            other => mismatch(&other, kind),
        },
        DataKind::Date => match value {
            Scalar::Date(_) => Ok(value),
            Scalar::Str(s) => parse_date_str(&s)
                .map(Scalar::Date)
                .ok_or_else(|| ValuesError::type_mismatch(format!("cannot parse date '{s}'"))),
            other => mismatch(&other, kind),
        },
        DataKind::Datetime => match value {
            Scalar::Datetime(_) => Ok(value),
            Scalar::Date(d) => Ok(Scalar::Datetime(d as i64 * 86_400_000)),
            Scalar::Int(secs) => secs
                .checked_mul(1000)
                .map(Scalar::Datetime)
                .ok_or_else(|| ValuesError::overflow("datetime out of range")),
            Scalar::Str(s) => parse_datetime_str(&s)
                .map(Scalar::Datetime)
                .ok_or_else(|| ValuesError::type_mismatch(format!("cannot parse datetime '{s}'"))),
            other => mismatch(&other, kind),
        },
        DataKind::List { inner, width } => match value {
            Scalar::Array(items) => {
                if let Some(w) = width {
                    if items.len() != *w {
                        return Err(ValuesError::type_mismatch(format!(
                            "expected {w} list elements, got {}",
                            items.len()
                        )));
                    }
                }
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(coerce(item, inner)?);
                }
                Ok(Scalar::Array(out))
            }
            other => mismatch(&other, kind),
        },
    }
}

fn to_int(value: Scalar, kind: &DataKind) -> ValuesResult<i64> {
    match value {
        Scalar::Int(i) => Ok(i),
        Scalar::Bool(b) => Ok(if b { 1 } else { 0 }),
        // Floats convert only when the value is exactly integral.
        Scalar::Float(f) => {
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(f as i64)
            } else {
                Err(ValuesError::type_mismatch(format!(
                    "cannot convert {f} to {}",
                    kind.name()
                )))
            }
        }
        other => Err(mismatch_err(&other, kind)),
    }
}

fn mismatch(value: &Scalar, kind: &DataKind) -> ValuesResult<Scalar> {
    Err(mismatch_err(value, kind))
}

fn mismatch_err(value: &Scalar, kind: &DataKind) -> ValuesError {
    ValuesError::type_mismatch(format!(
        "cannot convert {} to {}",
        value.kind_name(),
        kind.name()
    ))
}
