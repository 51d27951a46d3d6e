use rowlit::{
    BatchReader, CachePolicy, ColumnSpec, DataKind, ReadSettings, TemplateCache, ValuesError,
};
use std::sync::Arc;

fn cols() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("n", DataKind::Int64),
        ColumnSpec::new("s", DataKind::Str),
    ]
}

fn reader(input: &str, columns: Vec<ColumnSpec>, settings: ReadSettings) -> BatchReader<&[u8]> {
    BatchReader::with_cache(
        input.as_bytes(),
        columns,
        settings,
        Arc::new(TemplateCache::new(CachePolicy::Unbounded)),
    )
}

#[test]
fn literal_rows_parse_into_columns() {
    let mut r = reader("(1, 'a'), (2, 'b');", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert_eq!(batch.rows, 2);
    assert_eq!(batch.columns.len(), 2);
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    assert_eq!(n, vec![Some(1), Some(2)]);
    let s: Vec<Option<&str>> = batch.columns[1].str().unwrap().into_iter().collect();
    assert_eq!(s, vec![Some("a"), Some("b")]);
    assert!(!batch.missing.any());
    assert!(r.read_batch().expect("suffix failed").is_none());
    assert_eq!(r.total_rows(), 2);
}

#[test]
fn default_keyword_sets_missing_mask() {
    let mut r = reader("(1, DEFAULT), (DEFAULT, 'x')", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert_eq!(batch.rows, 2);
    assert!(batch.missing.is_set(1, 0));
    assert!(batch.missing.is_set(0, 1));
    assert!(!batch.missing.is_set(0, 0));
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    assert_eq!(n, vec![Some(1), Some(0)]);
    let s: Vec<Option<&str>> = batch.columns[1].str().unwrap().into_iter().collect();
    assert_eq!(s, vec![Some(""), Some("x")]);
}

#[test]
fn int32_scenario_matches_the_declared_types() {
    let columns = vec![
        ColumnSpec::new("n", DataKind::Int32),
        ColumnSpec::new("s", DataKind::Str),
    ];
    let mut r = reader("(1, 'a'), (2, 'b');", columns, ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert_eq!(batch.rows, 2);
    let n: Vec<Option<i32>> = batch.columns[0].i32().unwrap().into_iter().collect();
    assert_eq!(n, vec![Some(1), Some(2)]);
    assert!(!batch.missing.any());
    assert!(r.read_batch().expect("suffix failed").is_none());
}

#[test]
fn literal_batch_round_trips_through_text() {
    let input = "(1, 'a'), (-7, 'b c'), (42, '')";
    let mut r = reader(input, cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");

    // Re-serialize each row as literal text and read it back.
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    let s: Vec<Option<&str>> = batch.columns[1].str().unwrap().into_iter().collect();
    let rendered: Vec<String> = n
        .iter()
        .zip(&s)
        .map(|(a, b)| format!("({}, '{}')", a.unwrap(), b.unwrap()))
        .collect();
    let again = rendered.join(", ");

    let mut r2 = reader(&again, cols(), ReadSettings::default());
    let batch2 = r2.read_batch().expect("re-read failed").expect("expected a batch");
    let n2: Vec<Option<i64>> = batch2.columns[0].i64().unwrap().into_iter().collect();
    let s2: Vec<Option<&str>> = batch2.columns[1].str().unwrap().into_iter().collect();
    assert_eq!(n, n2);
    assert_eq!(s, s2);
}

#[test]
fn trailing_comma_inside_row_is_accepted() {
    let mut r = reader("(1, 'a',), (2, 'b',);", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert_eq!(batch.rows, 2);
}

#[test]
fn whitespace_after_terminator_is_fine() {
    let mut r = reader("(1, 'a');  \n\t ", cols(), ReadSettings::default());
    assert!(r.read_batch().expect("read failed").is_some());
    assert!(r.read_batch().expect("suffix failed").is_none());
}

#[test]
fn data_after_terminator_is_an_error() {
    let mut r = reader("(1, 'a'); (2, 'b')", cols(), ReadSettings::default());
    assert!(r.read_batch().expect("read failed").is_some());
    let err = r.read_batch().expect_err("expected trailing data error");
    assert!(matches!(err, ValuesError::TrailingData));
}

#[test]
fn batches_split_at_the_row_limit() {
    let settings = ReadSettings { max_rows_per_batch: 2, ..ReadSettings::default() };
    let mut r = reader("(1,'a'),(2,'b'),(3,'c')", cols(), settings);
    let first = r.read_batch().expect("read failed").expect("first batch");
    assert_eq!(first.rows, 2);
    let second = r.read_batch().expect("read failed").expect("second batch");
    assert_eq!(second.rows, 1);
    assert!(r.read_batch().expect("suffix failed").is_none());
    assert_eq!(r.total_rows(), 3);
}

#[test]
fn errors_carry_the_row_ordinal() {
    let mut r = reader("(1, 'a'), (oops!, 'b')", cols(), ReadSettings::default());
    let err = r.read_batch().expect_err("expected parse failure");
    match err {
        ValuesError::AtRow { row, .. } => assert_eq!(row, 2),
        other => panic!("expected AtRow, got {other:?}"),
    }
}

#[test]
fn int_overflow_does_not_fall_back_to_expressions() {
    let columns = vec![ColumnSpec::new("n", DataKind::Int32)];
    let mut r = reader("(3000000000)", columns, ReadSettings::default());
    let err = r.read_batch().expect_err("expected overflow");
    match err {
        ValuesError::AtRow { source, .. } => {
            assert!(matches!(*source, ValuesError::Overflow { .. }))
        }
        other => panic!("expected AtRow(Overflow), got {other:?}"),
    }
}

#[test]
fn null_into_non_nullable_is_rejected() {
    let mut r = reader("(NULL, 'a')", cols(), ReadSettings::default());
    let err = r.read_batch().expect_err("expected null rejection");
    match err {
        ValuesError::AtRow { source, .. } => {
            assert!(matches!(*source, ValuesError::NullNotAllowed { .. }))
        }
        other => panic!("expected AtRow(NullNotAllowed), got {other:?}"),
    }
}

#[test]
fn nullable_column_accepts_null() {
    let columns = vec![ColumnSpec::nullable("n", DataKind::Int64)];
    let mut r = reader("(NULL), (7)", columns, ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    assert_eq!(n, vec![None, Some(7)]);
}

#[test]
fn null_as_default_fills_and_masks() {
    let settings = ReadSettings { null_as_default: true, ..ReadSettings::default() };
    let mut r = reader("(NULL, 'a')", cols(), settings);
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert!(batch.missing.is_set(0, 0));
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    assert_eq!(n, vec![Some(0)]);
}

#[test]
fn expression_values_evaluate() {
    let mut r = reader("(1 + 2, upper('ab')), (10 * 3, 'x' || 'y')", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    let n: Vec<Option<i64>> = batch.columns[0].i64().unwrap().into_iter().collect();
    assert_eq!(n, vec![Some(3), Some(30)]);
    let s: Vec<Option<&str>> = batch.columns[1].str().unwrap().into_iter().collect();
    assert_eq!(s, vec![Some("AB"), Some("xy")]);
}

#[test]
fn multibyte_strings_survive_the_expression_path() {
    let mut r = reader("(1, upper('café')), (2, 'héllo')", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    let s: Vec<Option<&str>> = batch.columns[1].str().unwrap().into_iter().collect();
    assert_eq!(s, vec![Some("CAFÉ"), Some("héllo")]);
}

#[test]
fn count_only_skips_parsing() {
    let settings = ReadSettings { count_only: true, ..ReadSettings::default() };
    // The second row would fail full parsing, the boundary scan does not care.
    let mut r = reader("(1, 'a'), (what ??, 'b'), (3, 'c');", cols(), settings);
    let batch = r.read_batch().expect("count failed").expect("expected a batch");
    assert_eq!(batch.rows, 3);
    assert!(batch.columns.is_empty());
    assert!(r.read_batch().expect("suffix failed").is_none());
}

#[test]
fn lists_and_temporals_round_trip() {
    let columns = vec![
        ColumnSpec::new("d", DataKind::Date),
        ColumnSpec::new("t", DataKind::Datetime),
        ColumnSpec::new("xs", DataKind::list(DataKind::Int64)),
    ];
    let mut r = reader(
        "('1970-01-02', '1970-01-01 00:00:01', [1, 2]), ('1970-01-03', 120, [])",
        columns,
        ReadSettings::default(),
    );
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    assert_eq!(batch.rows, 2);
    assert_eq!(batch.columns[0].dtype(), &DataKind::Date.to_polars());
    assert_eq!(batch.columns[1].dtype(), &DataKind::Datetime.to_polars());
    assert_eq!(batch.columns[2].null_count(), 0);
}

#[test]
fn batch_converts_to_dataframe() {
    let mut r = reader("(1, 'a'), (2, 'b')", cols(), ReadSettings::default());
    let batch = r.read_batch().expect("read failed").expect("expected a batch");
    let df = batch.into_dataframe().expect("dataframe failed");
    assert_eq!(df.shape(), (2, 2));
    assert_eq!(df.get_column_names()[0].as_str(), "n");
}

#[test]
fn session_recovers_after_a_terminal_error() {
    let mut r = reader("(1, 'a'), (NULL, 'b'), (3, 'c')", cols(), ReadSettings::default());
    assert!(r.read_batch().is_err());
    // The failed row is not re-readable, but the reader must not be wedged:
    // subsequent reads continue from the stream without panicking.
    let _ = r.read_batch();
}

#[test]
fn unclosed_row_is_a_syntax_error() {
    let mut r = reader("(1, 'a'", cols(), ReadSettings::default());
    let err = r.read_batch().expect_err("expected syntax error");
    match err {
        ValuesError::AtRow { source, .. } => {
            assert!(matches!(*source, ValuesError::Syntax { .. }))
        }
        other => panic!("expected AtRow(Syntax), got {other:?}"),
    }
}
