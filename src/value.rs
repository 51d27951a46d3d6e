//! Tagged value tree produced by literal deserialization and expression
//! evaluation, plus the recursive null-to-default substitution used when
//! null-as-default coercion is configured.

use crate::error::{ValuesError, ValuesResult};
use crate::types::DataKind;

/// Nesting depth allowed when substituting defaults into composite values.
const MAX_SUBSTITUTION_DEPTH: usize = 128;

/// A single parsed or evaluated value. Dates are days since the Unix epoch,
/// datetimes are milliseconds since the Unix epoch (UTC).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(i32),
    Datetime(i64),
    Tuple(Vec<Scalar>),
    Array(Vec<Scalar>),
    Map(Vec<(Scalar, Scalar)>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Best-effort kind of an evaluated value, used for coercion diagnostics.
    /// Null and composite values have no single kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Null => "Null",
            Scalar::Bool(_) => "Bool",
            Scalar::Int(_) => "Int64",
            Scalar::Float(_) => "Float64",
            Scalar::Str(_) => "String",
            Scalar::Date(_) => "Date",
            Scalar::Datetime(_) => "Datetime",
            Scalar::Tuple(_) => "Tuple",
            Scalar::Array(_) => "Array",
            Scalar::Map(_) => "Map",
        }
    }
}

/// Replace NULLs nested inside composite values with the element type's default
/// wherever the element position is non-nullable. Top-level NULLs are left to
/// the caller, which decides between rejection and default insertion.
///
/// Post-order traversal with an explicit depth guard so pathological nesting
/// fails cleanly instead of exhausting the stack.
pub fn replace_null_fields_with_defaults(value: &mut Scalar, kind: &DataKind) -> ValuesResult<()> {
    replace_nulls_rec(value, kind, 0)
}

fn replace_nulls_rec(value: &mut Scalar, kind: &DataKind, depth: usize) -> ValuesResult<()> {
    if depth > MAX_SUBSTITUTION_DEPTH {
        return Err(ValuesError::type_mismatch(format!(
            "value nesting exceeds {MAX_SUBSTITUTION_DEPTH} levels"
        )));
    }
    match (value, kind) {
        (Scalar::Array(items), DataKind::List { inner, width }) => {
            if let Some(w) = width {
                if items.len() != *w {
                    return Err(ValuesError::type_mismatch(format!(
                        "bad size of list: expected {w}, actual {}",
                        items.len()
                    )));
                }
            }
            for item in items.iter_mut() {
                if item.is_null() {
                    *item = inner.default_scalar();
                }
                replace_nulls_rec(item, inner, depth + 1)?;
            }
            Ok(())
        }
        // Tuples and maps have no declared element types in this model; fill
        // nested nulls with nothing and recurse only through list-typed slots.
        (Scalar::Tuple(items), _) => {
            for item in items.iter_mut() {
                replace_nulls_rec(item, kind, depth + 1)?;
            }
            Ok(())
        }
        (Scalar::Map(entries), _) => {
            for (k, v) in entries.iter_mut() {
                replace_nulls_rec(k, kind, depth + 1)?;
                replace_nulls_rec(v, kind, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
