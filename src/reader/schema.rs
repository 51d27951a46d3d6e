//! Schema inference over the same row grammar. Reads raw field text without
//! evaluating anything and unifies kind guesses across sample rows.

use std::io::Read;

use crate::cursor::Cursor;
use crate::error::{ValuesError, ValuesResult};
use crate::infer::{infer_kind, unify};
use crate::types::DataKind;

pub struct SchemaReader<R> {
    cursor: Cursor<R>,
    started: bool,
    end_of_data: bool,
}

impl<R: Read> SchemaReader<R> {
    pub fn new(src: R) -> Self {
        SchemaReader { cursor: Cursor::new(src), started: false, end_of_data: false }
    }

    /// Read one row and guess each column's kind. `None` per column means the
    /// field was NULL; `None` overall means the input is exhausted. Once a
    /// statement terminator is seen no further rows are read.
    pub fn read_row_kinds(&mut self) -> ValuesResult<Option<Vec<Option<DataKind>>>> {
        if self.end_of_data {
            return Ok(None);
        }
        if !self.started {
            self.cursor.skip_bom()?;
            self.started = true;
        }
        self.cursor.skip_whitespace()?;
        match self.cursor.peek()? {
            None => {
                self.end_of_data = true;
                return Ok(None);
            }
            Some(b';') => {
                self.cursor.advance();
                self.end_of_data = true;
                return Ok(None);
            }
            _ => {}
        }

        self.cursor.assert_char(b'(')?;
        let mut kinds = Vec::new();
        loop {
            self.cursor.skip_whitespace()?;
            let field = self.read_field_text()?;
            kinds.push(infer_kind(&field));
            self.cursor.skip_whitespace()?;
            if self.cursor.check_char(b',')? {
                // Trailing comma directly before the closing parenthesis.
                self.cursor.skip_whitespace()?;
                if self.cursor.check_char(b')')? {
                    break;
                }
                continue;
            }
            self.cursor.assert_char(b')')?;
            break;
        }
        self.cursor.skip_whitespace()?;
        // Row separator.
        self.cursor.check_char(b',')?;
        Ok(Some(kinds))
    }

    /// Raw text of one field: everything up to the next top-level comma or
    /// closing parenthesis, respecting quotes and nesting.
    fn read_field_text(&mut self) -> ValuesResult<String> {
        let mut out = Vec::new();
        let mut depth = 0i32;
        let mut quoted = false;
        loop {
            let Some(b) = self.cursor.peek()? else {
                return Err(ValuesError::syntax("unexpected end of input inside a row"));
            };
            match b {
                b'\\' if quoted => {
                    out.push(b);
                    self.cursor.advance();
                    if let Some(next) = self.cursor.pop()? {
                        out.push(next);
                    }
                    continue;
                }
                b'\'' => quoted = !quoted,
                b'(' | b'[' if !quoted => depth += 1,
                b']' if !quoted => depth -= 1,
                b')' if !quoted => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                b',' if !quoted && depth == 0 => break,
                _ => {}
            }
            out.push(b);
            self.cursor.advance();
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Sample up to `max_rows` rows and unify per-column guesses. Columns that
    /// stay undetermined (all NULL) fall back to strings.
    pub fn infer_schema(&mut self, max_rows: usize) -> ValuesResult<Vec<DataKind>> {
        let mut acc: Option<Vec<Option<DataKind>>> = None;
        let mut rows = 0usize;
        while rows < max_rows {
            let Some(kinds) = self.read_row_kinds()? else { break };
            match &mut acc {
                None => acc = Some(kinds),
                Some(merged) => {
                    if merged.len() != kinds.len() {
                        return Err(ValuesError::type_mismatch(format!(
                            "row {} has {} columns, expected {}",
                            rows + 1,
                            kinds.len(),
                            merged.len()
                        )));
                    }
                    for (slot, kind) in merged.iter_mut().zip(kinds) {
                        *slot = unify(slot.take(), kind);
                    }
                }
            }
            rows += 1;
        }
        let Some(acc) = acc else {
            return Err(ValuesError::syntax("no rows to infer a schema from"));
        };
        Ok(acc.into_iter().map(|k| k.unwrap_or(DataKind::Str)).collect())
    }
}
