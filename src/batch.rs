//! Columnar accumulation buffers and the finished batch handed to callers.
//! Values arriving here are already coerced to the column kind; a mismatch is
//! a structural defect, not user input.

use polars::prelude::{Column, DataFrame, IntoSeries, ListChunked, NamedFrom, Series};

use crate::error::{ValuesError, ValuesResult};
use crate::types::DataKind;
use crate::value::Scalar;

/// Typed accumulation buffer for one column.
#[derive(Debug)]
pub enum ColumnBuffer {
    Bool(Vec<Option<bool>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Str(Vec<Option<String>>),
    Date(Vec<Option<i32>>),
    Datetime(Vec<Option<i64>>),
    List { inner: DataKind, rows: Vec<Option<Vec<Scalar>>> },
}

impl ColumnBuffer {
    pub fn for_kind(kind: &DataKind) -> Self {
        match kind {
            DataKind::Bool => ColumnBuffer::Bool(Vec::new()),
            DataKind::Int32 => ColumnBuffer::Int32(Vec::new()),
            DataKind::Int64 => ColumnBuffer::Int64(Vec::new()),
            DataKind::Float64 => ColumnBuffer::Float64(Vec::new()),
            DataKind::Str => ColumnBuffer::Str(Vec::new()),
            DataKind::Date => ColumnBuffer::Date(Vec::new()),
            DataKind::Datetime => ColumnBuffer::Datetime(Vec::new()),
            DataKind::List { inner, .. } => {
                ColumnBuffer::List { inner: (**inner).clone(), rows: Vec::new() }
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuffer::Bool(v) => v.len(),
            ColumnBuffer::Int32(v) => v.len(),
            ColumnBuffer::Int64(v) => v.len(),
            ColumnBuffer::Float64(v) => v.len(),
            ColumnBuffer::Str(v) => v.len(),
            ColumnBuffer::Date(v) => v.len(),
            ColumnBuffer::Datetime(v) => v.len(),
            ColumnBuffer::List { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, value: Scalar) -> ValuesResult<()> {
        match (self, value) {
            (ColumnBuffer::Bool(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Bool(v), Scalar::Bool(b)) => v.push(Some(b)),
            (ColumnBuffer::Int32(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Int32(v), Scalar::Int(i)) => v.push(Some(i as i32)),
            (ColumnBuffer::Int64(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Int64(v), Scalar::Int(i)) => v.push(Some(i)),
            (ColumnBuffer::Float64(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Float64(v), Scalar::Float(f)) => v.push(Some(f)),
            (ColumnBuffer::Str(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Str(v), Scalar::Str(s)) => v.push(Some(s)),
            (ColumnBuffer::Date(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Date(v), Scalar::Date(d)) => v.push(Some(d)),
            (ColumnBuffer::Datetime(v), Scalar::Null) => v.push(None),
            (ColumnBuffer::Datetime(v), Scalar::Datetime(ms)) => v.push(Some(ms)),
            (ColumnBuffer::List { rows, .. }, Scalar::Null) => rows.push(None),
            (ColumnBuffer::List { rows, .. }, Scalar::Array(items)) => rows.push(Some(items)),
            (buf, other) => {
                return Err(ValuesError::internal(format!(
                    "buffer for {:?} received {}",
                    std::mem::discriminant(&*buf),
                    other.kind_name()
                )))
            }
        }
        Ok(())
    }

    /// Finish the buffer into a polars series. Temporal columns are built as
    /// plain integers and cast to their logical types.
    pub fn into_series(self, name: &str) -> ValuesResult<Series> {
        let series = match self {
            ColumnBuffer::Bool(v) => Series::new(name.into(), v),
            ColumnBuffer::Int32(v) => Series::new(name.into(), v),
            ColumnBuffer::Int64(v) => Series::new(name.into(), v),
            ColumnBuffer::Float64(v) => Series::new(name.into(), v),
            ColumnBuffer::Str(v) => Series::new(name.into(), v),
            ColumnBuffer::Date(v) => Series::new(name.into(), v)
                .cast(&DataKind::Date.to_polars())
                .map_err(|e| ValuesError::internal(format!("date cast failed: {e}")))?,
            ColumnBuffer::Datetime(v) => Series::new(name.into(), v)
                .cast(&DataKind::Datetime.to_polars())
                .map_err(|e| ValuesError::internal(format!("datetime cast failed: {e}")))?,
            ColumnBuffer::List { inner, rows } => {
                let mut cells: Vec<Option<Series>> = Vec::with_capacity(rows.len());
                for row in rows {
                    match row {
                        None => cells.push(None),
                        Some(items) => {
                            let mut buf = ColumnBuffer::for_kind(&inner);
                            for item in items {
                                buf.push(item)?;
                            }
                            cells.push(Some(buf.into_series("")?));
                        }
                    }
                }
                let chunked: ListChunked = cells.into_iter().collect();
                chunked.into_series().with_name(name.into())
            }
        };
        Ok(series)
    }
}

/// Per-column set of row indexes whose cells were substituted with defaults
/// rather than supplied concretely.
#[derive(Debug, Clone, Default)]
pub struct MissingMask {
    cols: Vec<std::collections::HashSet<usize>>,
}

impl MissingMask {
    pub fn new(columns: usize) -> Self {
        MissingMask { cols: vec![Default::default(); columns] }
    }

    pub fn set(&mut self, col: usize, row: usize) {
        self.cols[col].insert(row);
    }

    pub fn is_set(&self, col: usize, row: usize) -> bool {
        self.cols.get(col).is_some_and(|s| s.contains(&row))
    }

    pub fn any(&self) -> bool {
        self.cols.iter().any(|s| !s.is_empty())
    }

    pub fn clear(&mut self) {
        for s in &mut self.cols {
            s.clear();
        }
    }
}

/// One completed batch of parsed rows.
#[derive(Debug)]
pub struct Batch {
    pub columns: Vec<Series>,
    pub rows: usize,
    pub missing: MissingMask,
}

impl Batch {
    pub fn into_dataframe(self) -> anyhow::Result<DataFrame> {
        let cols = self.columns.into_iter().map(Column::from).collect::<Vec<_>>();
        Ok(DataFrame::new(cols)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_finish_int() {
        let mut b = ColumnBuffer::for_kind(&DataKind::Int64);
        b.push(Scalar::Int(1)).unwrap();
        b.push(Scalar::Null).unwrap();
        b.push(Scalar::Int(3)).unwrap();
        let s = b.into_series("n").unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.null_count(), 1);
    }

    #[test]
    fn temporal_columns_get_logical_types() {
        let mut b = ColumnBuffer::for_kind(&DataKind::Date);
        b.push(Scalar::Date(1)).unwrap();
        let s = b.into_series("d").unwrap();
        assert_eq!(s.dtype(), &DataKind::Date.to_polars());

        let mut b = ColumnBuffer::for_kind(&DataKind::Datetime);
        b.push(Scalar::Datetime(1000)).unwrap();
        let s = b.into_series("t").unwrap();
        assert_eq!(s.dtype(), &DataKind::Datetime.to_polars());
    }

    #[test]
    fn list_column_round_trips() {
        let kind = DataKind::list(DataKind::Int64);
        let mut b = ColumnBuffer::for_kind(&kind);
        b.push(Scalar::Array(vec![Scalar::Int(1), Scalar::Int(2)])).unwrap();
        b.push(Scalar::Null).unwrap();
        let s = b.into_series("xs").unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.null_count(), 1);
    }

    #[test]
    fn kind_mismatch_is_internal() {
        let mut b = ColumnBuffer::for_kind(&DataKind::Int64);
        let err = b.push(Scalar::Str("x".into())).unwrap_err();
        assert!(matches!(err, ValuesError::Internal { .. }));
    }

    #[test]
    fn missing_mask() {
        let mut m = MissingMask::new(2);
        assert!(!m.any());
        m.set(1, 3);
        assert!(m.is_set(1, 3));
        assert!(!m.is_set(0, 3));
        assert!(m.any());
        m.clear();
        assert!(!m.any());
    }

    #[test]
    fn batch_to_dataframe() {
        let mut a = ColumnBuffer::for_kind(&DataKind::Int64);
        a.push(Scalar::Int(1)).unwrap();
        let mut b = ColumnBuffer::for_kind(&DataKind::Str);
        b.push(Scalar::Str("x".into())).unwrap();
        let batch = Batch {
            columns: vec![a.into_series("n").unwrap(), b.into_series("s").unwrap()],
            rows: 1,
            missing: MissingMask::new(2),
        };
        let df = batch.into_dataframe().unwrap();
        assert_eq!(df.shape(), (1, 2));
    }
}
