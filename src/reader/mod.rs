//! Row/batch reader. Drives the per-column strategy state machine over a
//! checkpointable byte cursor and accumulates rows into columnar batches.

pub mod schema;
pub mod strategy;

use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::{Batch, ColumnBuffer, MissingMask};
use crate::cache::TemplateCache;
use crate::coerce::coerce;
use crate::cursor::{skip_to_next_row, Cursor};
use crate::deser::{deserialize_literal, try_keyword};
use crate::error::{ValuesError, ValuesResult};
use crate::expr::{evaluate, parse_expression, EvalContext};
use crate::lexer::{lex_row, match_delimiter, Token, TokenCursor};
use crate::template::TemplateInstance;
use crate::types::ColumnSpec;
use crate::value::replace_null_fields_with_defaults;

pub use schema::SchemaReader;
pub use strategy::{DeduceCounters, Strategy, StrategyKind};

/// Reader configuration. Every field has a working default; deserializing a
/// partial document fills the rest in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReadSettings {
    pub max_rows_per_batch: usize,
    /// When false, any column that needs full evaluation is a hard error.
    pub interpret_expressions: bool,
    /// Coerce evaluated NULLs in non-nullable columns to the type default
    /// instead of rejecting them.
    pub null_as_default: bool,
    pub deduce_templates: bool,
    pub max_parser_depth: u32,
    pub max_parser_backtracks: u32,
    /// Count rows with the boundary scan instead of parsing columns.
    pub count_only: bool,
}

impl Default for ReadSettings {
    fn default() -> Self {
        ReadSettings {
            max_rows_per_batch: 65_409,
            interpret_expressions: true,
            null_as_default: false,
            deduce_templates: true,
            max_parser_depth: 1000,
            max_parser_backtracks: 1_000_000,
            count_only: false,
        }
    }
}

/// Token stream lexed for the current row, tied to a cursor buffer generation.
struct RowTokens {
    tokens: Vec<Token>,
    idx: usize,
    generation: u64,
}

/// Streaming reader turning row-literal text into typed columnar batches.
pub struct BatchReader<R> {
    cursor: Cursor<R>,
    columns: Vec<ColumnSpec>,
    settings: ReadSettings,
    cache: Arc<TemplateCache>,
    strategies: Vec<Strategy>,
    counters: Vec<DeduceCounters>,
    tokens: Option<RowTokens>,
    eval_ctx: EvalContext,
    total_rows: u64,
    started: bool,
    end_of_data: bool,
}

impl<R: Read> BatchReader<R> {
    pub fn new(src: R, columns: Vec<ColumnSpec>, settings: ReadSettings) -> Self {
        Self::with_cache(src, columns, settings, TemplateCache::global())
    }

    pub fn with_cache(
        src: R,
        columns: Vec<ColumnSpec>,
        settings: ReadSettings,
        cache: Arc<TemplateCache>,
    ) -> Self {
        let strategies = columns.iter().map(|_| Strategy::Streaming).collect();
        let counters = columns.iter().map(|_| DeduceCounters::default()).collect();
        BatchReader {
            cursor: Cursor::new(src),
            columns,
            settings,
            cache,
            strategies,
            counters,
            tokens: None,
            eval_ctx: EvalContext::new(),
            total_rows: 0,
            started: false,
            end_of_data: false,
        }
    }

    /// Rows read across all batches so far.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Read the next batch. `None` means the input is exhausted; the statement
    /// suffix has been validated by then.
    pub fn read_batch(&mut self) -> ValuesResult<Option<Batch>> {
        if self.end_of_data {
            return Ok(None);
        }
        if !self.started {
            self.cursor.skip_bom()?;
            self.started = true;
        }

        let ncols = self.columns.len();
        let mut buffers: Vec<ColumnBuffer> =
            self.columns.iter().map(|c| ColumnBuffer::for_kind(&c.kind)).collect();
        let mut missing = MissingMask::new(ncols);
        let mut rows = 0usize;

        while rows < self.settings.max_rows_per_batch {
            self.cursor.skip_whitespace()?;
            match self.cursor.peek()? {
                None | Some(b';') => break,
                _ => {}
            }
            if self.settings.count_only {
                if !skip_to_next_row(&mut self.cursor, 1, 0)? {
                    break;
                }
                rows += 1;
                self.total_rows += 1;
                continue;
            }
            if let Err(e) = self.read_row(&mut buffers, &mut missing) {
                self.reset_session();
                return Err(e.at_row(self.total_rows + 1));
            }
            rows += 1;
            self.total_rows += 1;
        }

        if !self.settings.count_only {
            if let Err(e) = self.flush_templates(&mut buffers, &mut missing) {
                self.reset_session();
                return Err(e);
            }
        }

        if rows == 0 {
            self.read_suffix()?;
            self.end_of_data = true;
            return Ok(None);
        }

        if self.settings.count_only {
            return Ok(Some(Batch { columns: Vec::new(), rows, missing }));
        }

        let mut columns = Vec::with_capacity(ncols);
        for (spec, buf) in self.columns.iter().zip(buffers) {
            if buf.len() != rows {
                return Err(ValuesError::internal(format!(
                    "column '{}' holds {} values for {rows} rows",
                    spec.name,
                    buf.len()
                )));
            }
            columns.push(buf.into_series(&spec.name)?);
        }
        Ok(Some(Batch { columns, rows, missing }))
    }

    fn read_row(
        &mut self,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        self.cursor.assert_char(b'(')?;
        self.tokens = None;
        let ncols = self.columns.len();
        for col in 0..ncols {
            self.cursor.skip_whitespace()?;
            self.cursor.set_checkpoint();
            let res = self.read_value(col, col + 1 == ncols, buffers, missing);
            self.cursor.drop_checkpoint();
            res?;
        }
        self.cursor.skip_whitespace()?;
        // Row separator.
        self.cursor.check_char(b',')?;
        Ok(())
    }

    /// Read one column position. DEFAULT bypasses every strategy; otherwise
    /// dispatch on the column's current strategy.
    fn read_value(
        &mut self,
        col: usize,
        is_last: bool,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        if try_keyword(&mut self.cursor, b"DEFAULT")? {
            // Pending template rows for this column must land first so the
            // buffer stays in row order.
            if let Strategy::Templated(inst) = &mut self.strategies[col] {
                if inst.rows_count() > 0 {
                    let start = buffers[col].len();
                    inst.evaluate_accumulated(&self.eval_ctx, &mut buffers[col], missing, col, start)?;
                }
            }
            buffers[col].push(self.columns[col].kind.default_scalar())?;
            missing.set(col, buffers[col].len() - 1);
            return self.check_delimiter_bytes(is_last);
        }

        match self.strategies[col].kind() {
            StrategyKind::Streaming => match self.try_streaming(col, is_last, buffers, missing) {
                Ok(()) => Ok(()),
                Err(e) if e.is_recoverable_parse() => {
                    self.cursor.rollback_to_checkpoint();
                    self.parse_expression_value(col, is_last, buffers, missing)
                }
                Err(e) => Err(e),
            },
            StrategyKind::Templated => self.try_templated(col, is_last, buffers, missing),
            StrategyKind::SingleExpression => {
                self.parse_expression_value(col, is_last, buffers, missing)
            }
        }
    }

    /// Fast path: deserialize the literal directly and check the delimiter at
    /// the byte level.
    fn try_streaming(
        &mut self,
        col: usize,
        is_last: bool,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        let d = deserialize_literal(
            &mut self.cursor,
            &self.columns[col].kind,
            self.columns[col].nullable,
            self.settings.null_as_default,
        )?;
        self.check_delimiter_bytes(is_last)?;
        buffers[col].push(d.value)?;
        if !d.concrete {
            missing.set(col, buffers[col].len() - 1);
        }
        Ok(())
    }

    fn check_delimiter_bytes(&mut self, is_last: bool) -> ValuesResult<()> {
        self.cursor.skip_whitespace()?;
        if is_last {
            // Trailing comma before the closing parenthesis is accepted.
            if self.cursor.check_char(b',')? {
                self.cursor.skip_whitespace()?;
            }
            self.cursor.assert_char(b')')
        } else {
            self.cursor.assert_char(b',')
        }
    }

    fn row_tokens(&self) -> ValuesResult<&RowTokens> {
        self.tokens
            .as_ref()
            .ok_or_else(|| ValuesError::internal("row tokens missing after retokenize"))
    }

    fn row_tokens_mut(&mut self) -> ValuesResult<&mut RowTokens> {
        self.tokens
            .as_mut()
            .ok_or_else(|| ValuesError::internal("row tokens missing after retokenize"))
    }

    /// Make sure `self.tokens` covers the current row from the cursor position
    /// onward. Re-lexes when the cursor's buffer generation moved; otherwise
    /// just advances the token index to the cursor.
    fn retokenize(&mut self) -> ValuesResult<()> {
        let pos = self.cursor.abs_pos();
        let generation = self.cursor.generation();
        if let Some(row) = &mut self.tokens {
            if row.generation == generation {
                while row
                    .tokens
                    .get(row.idx)
                    .is_some_and(|t| !t.is_terminal() && t.begin < pos)
                {
                    row.idx += 1;
                }
                return Ok(());
            }
        }

        let start = self.cursor.abs_pos();
        if !skip_to_next_row(&mut self.cursor, 0, 1)? {
            return Err(ValuesError::syntax(format!(
                "cannot parse expression here: {}",
                self.cursor.context_snippet()
            )));
        }
        let end = self.cursor.abs_pos();
        let bytes = self.cursor.slice_abs(start, end).to_vec();
        self.cursor.seek_abs(start);
        let tokens = lex_row(&bytes, start);
        self.tokens = Some(RowTokens { tokens, idx: 0, generation: self.cursor.generation() });
        Ok(())
    }

    /// Full-expression path: parse one expression, require the delimiter,
    /// then try the streaming probe, template deduction, and finally one-off
    /// evaluation, in that order.
    fn parse_expression_value(
        &mut self,
        col: usize,
        is_last: bool,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        self.retokenize()?;
        let delimiter = if is_last { b')' } else { b',' };

        let (ast, start_idx, end_idx) = {
            let row = self.row_tokens()?;
            if row.tokens.get(row.idx).map(|t| t.is_terminal()).unwrap_or(true) {
                return Err(ValuesError::syntax(format!(
                    "cannot parse expression here: {}",
                    self.cursor.context_snippet()
                )));
            }
            let mut tc = TokenCursor::new(
                &row.tokens,
                row.idx,
                self.settings.max_parser_depth,
                self.settings.max_parser_backtracks,
            );
            let start_idx = tc.idx();
            let ast = parse_expression(&mut tc)?;
            (ast, start_idx, tc.idx())
        };

        let (next_idx, delim_end) = {
            let row = self.row_tokens()?;
            match match_delimiter(&row.tokens, end_idx, delimiter) {
                Some(found) => found,
                None => {
                    return Err(ValuesError::syntax(format!(
                        "expected '{}' after expression: {}",
                        delimiter as char,
                        self.cursor.context_snippet()
                    )))
                }
            }
        };

        // Probe: a bare literal on a column that left the streaming path may
        // just be a spelling the deserializer rejects. Retry it once; success
        // returns the column to streaming.
        if self.strategies[col].kind() != StrategyKind::Streaming && ast.is_literal() {
            self.cursor.rollback_to_checkpoint();
            match self.try_streaming(col, is_last, buffers, missing) {
                Ok(()) => {
                    tracing::debug!(column = col, "literal probe succeeded, back to streaming");
                    self.strategies[col] = Strategy::Streaming;
                    return Ok(());
                }
                Err(e) if e.is_recoverable_parse() => self.cursor.rollback_to_checkpoint(),
                Err(e) => return Err(e),
            }
        }

        if matches!(self.strategies[col], Strategy::Templated(_)) {
            return Err(ValuesError::internal(
                "column entered expression parsing with an active template",
            ));
        }
        self.strategies[col] = Strategy::SingleExpression;

        if self.settings.deduce_templates && self.counters[col].should_attempt() {
            let deduced = self.cache.get_or_construct(
                &self.row_tokens()?.tokens,
                start_idx,
                end_idx,
                &ast,
                &self.columns[col].kind,
                self.columns[col].nullable,
                self.settings.null_as_default,
                delimiter,
            );
            match deduced {
                Ok((template, was_hit)) => {
                    if was_hit {
                        self.counters[col].cached += 1;
                    } else {
                        self.counters[col].cold += 1;
                    }
                    let mut instance = TemplateInstance::new(template);
                    let (bound, after_idx) = {
                        let row = self.row_tokens()?;
                        let mut tc = TokenCursor::new(
                            &row.tokens,
                            start_idx,
                            self.settings.max_parser_depth,
                            self.settings.max_parser_backtracks,
                        );
                        let bound = instance.try_match_and_bind(&mut tc, &row.tokens)?;
                        (bound, tc.idx())
                    };
                    if let Some(end) = bound {
                        self.row_tokens_mut()?.idx = after_idx;
                        self.cursor.seek_abs(end);
                        self.counters[col].replayed += 1;
                        tracing::debug!(column = col, "column switched to templated parsing");
                        self.strategies[col] = Strategy::Templated(instance);
                        return Ok(());
                    }
                    // The template came from this very row; a mismatch means
                    // the shape cannot replay it. Evaluate directly instead.
                    tracing::debug!(column = col, "deduced template did not match its own row");
                }
                Err(e) => {
                    tracing::debug!(column = col, error = %e, "template deduction failed");
                }
            }
        }

        if !self.settings.interpret_expressions {
            return Err(ValuesError::ExpressionsDisabled);
        }

        self.row_tokens_mut()?.idx = next_idx;
        self.cursor.seek_abs(delim_end);

        let kind = &self.columns[col].kind;
        let mut value = evaluate(&ast, &[], &self.eval_ctx)?;
        if self.settings.null_as_default {
            replace_null_fields_with_defaults(&mut value, kind)?;
        }
        let value = coerce(value, kind)?;
        if value.is_null() && !self.columns[col].nullable {
            if self.settings.null_as_default {
                buffers[col].push(kind.default_scalar())?;
                missing.set(col, buffers[col].len() - 1);
                return Ok(());
            }
            return Err(ValuesError::NullNotAllowed { kind: kind.name() });
        }
        buffers[col].push(value)?;
        Ok(())
    }

    /// Templated path: match the row against the column's active template. On
    /// mismatch, flush the accumulated rows and fall back to expression
    /// parsing for this row.
    fn try_templated(
        &mut self,
        col: usize,
        is_last: bool,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        self.retokenize()?;
        let Strategy::Templated(mut instance) =
            std::mem::replace(&mut self.strategies[col], Strategy::SingleExpression)
        else {
            return Err(ValuesError::internal("templated dispatch without a template"));
        };

        let (bound, after_idx) = {
            let row = self.row_tokens()?;
            let mut tc = TokenCursor::new(
                &row.tokens,
                row.idx,
                self.settings.max_parser_depth,
                self.settings.max_parser_backtracks,
            );
            let bound = instance.try_match_and_bind(&mut tc, &row.tokens)?;
            (bound, tc.idx())
        };

        if let Some(end) = bound {
            self.row_tokens_mut()?.idx = after_idx;
            self.cursor.seek_abs(end);
            self.counters[col].replayed += 1;
            self.strategies[col] = Strategy::Templated(instance);
            return Ok(());
        }

        tracing::debug!(
            column = col,
            pending = instance.rows_count(),
            "template mismatch, flushing accumulated rows"
        );
        let start = buffers[col].len();
        instance.evaluate_accumulated(&self.eval_ctx, &mut buffers[col], missing, col, start)?;
        self.cursor.rollback_to_checkpoint();
        self.parse_expression_value(col, is_last, buffers, missing)
    }

    /// Evaluate every column's pending template rows at the end of a batch.
    fn flush_templates(
        &mut self,
        buffers: &mut [ColumnBuffer],
        missing: &mut MissingMask,
    ) -> ValuesResult<()> {
        for (col, strat) in self.strategies.iter_mut().enumerate() {
            if let Strategy::Templated(instance) = strat {
                if instance.rows_count() > 0 {
                    let start = buffers[col].len();
                    instance.evaluate_accumulated(
                        &self.eval_ctx,
                        &mut buffers[col],
                        missing,
                        col,
                        start,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Validate the statement suffix once the rows run out: an optional
    /// semicolon, then nothing but whitespace.
    fn read_suffix(&mut self) -> ValuesResult<()> {
        self.cursor.skip_whitespace()?;
        if self.cursor.check_char(b';')? {
            self.cursor.skip_whitespace()?;
            if !self.cursor.is_eof()? {
                return Err(ValuesError::TrailingData);
            }
            return Ok(());
        }
        if !self.cursor.is_eof()? {
            return Err(ValuesError::internal(format!(
                "unread data left at end of input: {}",
                self.cursor.context_snippet()
            )));
        }
        Ok(())
    }

    /// Discard all per-session strategy state after a terminal error so a
    /// retried session starts clean.
    fn reset_session(&mut self) {
        for s in &mut self.strategies {
            *s = Strategy::Streaming;
        }
        for c in &mut self.counters {
            c.reset();
        }
        self.tokens = None;
        self.cursor.clear_checkpoint();
    }
}
