//! Declared column types and their polars mapping.

use polars::prelude::{DataType as PlDataType, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::value::Scalar;

/// Logical data kinds a column can be declared with. Lists carry an optional
/// fixed width; a mismatching literal arity is a type error, not a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Bool,
    Int32,
    Int64,
    Float64,
    Str,
    Date,
    Datetime,
    List { inner: Box<DataKind>, width: Option<usize> },
}

impl DataKind {
    pub fn list(inner: DataKind) -> Self {
        DataKind::List { inner: Box::new(inner), width: None }
    }

    /// Canonical name used in error messages and cache keys.
    pub fn name(&self) -> String {
        match self {
            DataKind::Bool => "Bool".into(),
            DataKind::Int32 => "Int32".into(),
            DataKind::Int64 => "Int64".into(),
            DataKind::Float64 => "Float64".into(),
            DataKind::Str => "String".into(),
            DataKind::Date => "Date".into(),
            DataKind::Datetime => "Datetime".into(),
            DataKind::List { inner, width: None } => format!("List({})", inner.name()),
            DataKind::List { inner, width: Some(w) } => format!("List({}, {})", inner.name(), w),
        }
    }

    pub fn to_polars(&self) -> PlDataType {
        match self {
            DataKind::Bool => PlDataType::Boolean,
            DataKind::Int32 => PlDataType::Int32,
            DataKind::Int64 => PlDataType::Int64,
            DataKind::Float64 => PlDataType::Float64,
            DataKind::Str => PlDataType::String,
            DataKind::Date => PlDataType::Date,
            DataKind::Datetime => PlDataType::Datetime(TimeUnit::Milliseconds, None),
            DataKind::List { inner, .. } => PlDataType::List(Box::new(inner.to_polars())),
        }
    }

    /// The value a cell takes when supplied as DEFAULT or filled by
    /// null-as-default coercion.
    pub fn default_scalar(&self) -> Scalar {
        match self {
            DataKind::Bool => Scalar::Bool(false),
            DataKind::Int32 | DataKind::Int64 => Scalar::Int(0),
            DataKind::Float64 => Scalar::Float(0.0),
            DataKind::Str => Scalar::Str(String::new()),
            DataKind::Date => Scalar::Date(0),
            DataKind::Datetime => Scalar::Datetime(0),
            DataKind::List { width, .. } => match width {
                // Fixed-width lists default to a zero-filled row of element defaults
                Some(w) => {
                    let inner = self.list_inner().expect("list has inner");
                    Scalar::Array(vec![inner.default_scalar(); *w])
                }
                None => Scalar::Array(Vec::new()),
            },
        }
    }

    pub fn list_inner(&self) -> Option<&DataKind> {
        match self {
            DataKind::List { inner, .. } => Some(inner),
            _ => None,
        }
    }
}

/// One declared column: name, kind, nullability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: DataKind,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new<S: Into<String>>(name: S, kind: DataKind) -> Self {
        ColumnSpec { name: name.into(), kind, nullable: false }
    }

    pub fn nullable<S: Into<String>>(name: S, kind: DataKind) -> Self {
        ColumnSpec { name: name.into(), kind, nullable: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_polars_mapping() {
        assert_eq!(DataKind::Int32.name(), "Int32");
        assert_eq!(DataKind::list(DataKind::Float64).name(), "List(Float64)");
        assert_eq!(
            DataKind::List { inner: Box::new(DataKind::Int64), width: Some(3) }.name(),
            "List(Int64, 3)"
        );
        assert_eq!(DataKind::Date.to_polars(), PlDataType::Date);
        assert_eq!(
            DataKind::Datetime.to_polars(),
            PlDataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(DataKind::Int64.default_scalar(), Scalar::Int(0));
        assert_eq!(DataKind::Str.default_scalar(), Scalar::Str(String::new()));
        let fixed = DataKind::List { inner: Box::new(DataKind::Float64), width: Some(2) };
        assert_eq!(
            fixed.default_scalar(),
            Scalar::Array(vec![Scalar::Float(0.0), Scalar::Float(0.0)])
        );
    }
}
