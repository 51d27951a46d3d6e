//! Checkpointable byte cursor over a blocking `Read` source.
//!
//! The cursor buffers the underlying stream in one contiguous `Vec`, so the
//! byte range from a checkpoint to the current position is always materialized
//! in memory. Consumed bytes are compacted away only while no checkpoint is
//! outstanding; every compaction bumps a generation counter so token streams
//! lexed from an earlier window can detect that their offsets went stale.
//!
//! The blocking `read` call inside `fill_more` is the only suspension point in
//! the whole reader.

use std::io::Read;

use crate::error::{ValuesError, ValuesResult};

const READ_CHUNK: usize = 8 * 1024;

pub struct Cursor<R> {
    src: R,
    buf: Vec<u8>,
    /// Absolute stream offset of `buf[0]`.
    base: u64,
    pos: usize,
    checkpoint: Option<usize>,
    generation: u64,
    hit_eof: bool,
}

impl<R: Read> Cursor<R> {
    pub fn new(src: R) -> Self {
        Cursor { src, buf: Vec::new(), base: 0, pos: 0, checkpoint: None, generation: 0, hit_eof: false }
    }

    /// Absolute position of the next unread byte.
    pub fn abs_pos(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Incremented whenever the backing storage is compacted; token streams
    /// compare this instead of inspecting raw addresses.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn fill_more(&mut self) -> ValuesResult<bool> {
        if self.hit_eof {
            return Ok(false);
        }
        // Compact consumed bytes, but never past an outstanding checkpoint.
        if self.checkpoint.is_none() && self.pos > 0 {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
            self.generation += 1;
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.src.read(&mut chunk)?;
        if n == 0 {
            self.hit_eof = true;
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    pub fn peek(&mut self) -> ValuesResult<Option<u8>> {
        while self.pos >= self.buf.len() {
            if !self.fill_more()? {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    pub fn advance(&mut self) {
        debug_assert!(self.pos < self.buf.len());
        self.pos += 1;
    }

    pub fn pop(&mut self) -> ValuesResult<Option<u8>> {
        match self.peek()? {
            Some(b) => {
                self.advance();
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    pub fn is_eof(&mut self) -> ValuesResult<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Record the current position. At most one checkpoint may be outstanding;
    /// marking again is a programmer error and aborts.
    pub fn set_checkpoint(&mut self) {
        if self.checkpoint.is_some() {
            panic!("cursor checkpoint already set");
        }
        self.checkpoint = Some(self.pos);
    }

    /// Restore the position saved by `set_checkpoint`. The checkpoint stays
    /// active and may be rolled back to again.
    pub fn rollback_to_checkpoint(&mut self) {
        match self.checkpoint {
            Some(cp) => self.pos = cp,
            None => panic!("rollback without an active cursor checkpoint"),
        }
    }

    pub fn drop_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    /// Drop the checkpoint if one is outstanding; used when a session aborts.
    pub fn clear_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Reposition inside the currently buffered window.
    pub fn seek_abs(&mut self, abs: u64) {
        let lo = self.base;
        let hi = self.base + self.buf.len() as u64;
        assert!(abs >= lo && abs <= hi, "seek target {abs} outside buffered window {lo}..{hi}");
        self.pos = (abs - lo) as usize;
    }

    /// Contiguous view of an already-buffered byte range. The range must have
    /// been pulled in by prior reads (e.g. a row-boundary scan past it).
    pub fn slice_abs(&self, start_abs: u64, end_abs: u64) -> &[u8] {
        let lo = (start_abs - self.base) as usize;
        let hi = (end_abs - self.base) as usize;
        &self.buf[lo..hi]
    }

    pub fn skip_whitespace(&mut self) -> ValuesResult<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.advance();
        }
        Ok(())
    }

    /// Consume `c` if it is the next byte.
    pub fn check_char(&mut self, c: u8) -> ValuesResult<bool> {
        if self.peek()? == Some(c) {
            self.advance();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn assert_char(&mut self, c: u8) -> ValuesResult<()> {
        if self.check_char(c)? {
            Ok(())
        } else {
            Err(ValuesError::syntax(format!(
                "expected '{}' before: {}",
                c as char,
                self.context_snippet()
            )))
        }
    }

    /// Skip a UTF-8 byte-order mark at the very start of the stream.
    pub fn skip_bom(&mut self) -> ValuesResult<()> {
        while self.buf.len() - self.pos < 3 && !self.hit_eof {
            self.fill_more()?;
        }
        if self.buf[self.pos..].starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.pos += 3;
        }
        Ok(())
    }

    /// A short slice of upcoming text for error messages.
    pub fn context_snippet(&self) -> String {
        let end = (self.pos + 32).min(self.buf.len());
        let raw = &self.buf[self.pos..end];
        String::from_utf8_lossy(raw).into_owned()
    }
}

/// Scan forward to the end of the current row, tracking parenthesis balance
/// and quoting. An escape byte always consumes the following byte; a quote
/// toggles quoted state; parentheses change balance only outside quotes.
/// Scanning stops once balance returns to the supplied starting value, or once
/// `min_chunk_bytes` have been consumed while the region is still balanced —
/// the latter mode is what lets a caller carve a large stream into bounded
/// chunks for parallel parsing without tokenizing anything.
///
/// Returns false when there is no row to skip (end of input or a statement
/// terminator). A trailing row separator comma is consumed.
pub fn skip_to_next_row<R: Read>(
    cursor: &mut Cursor<R>,
    min_chunk_bytes: usize,
    balance: i64,
) -> ValuesResult<bool> {
    cursor.skip_whitespace()?;
    match cursor.peek()? {
        None | Some(b';') => return Ok(false),
        _ => {}
    }

    let mut quoted = false;
    let mut balance = balance;
    let chunk_begin = cursor.abs_pos();
    while balance != 0 || (cursor.abs_pos() - chunk_begin) < min_chunk_bytes as u64 {
        let Some(b) = cursor.peek()? else { break };
        match b {
            b'\\' => {
                cursor.advance();
                if cursor.peek()?.is_some() {
                    cursor.advance();
                }
            }
            b'\'' => {
                quoted = !quoted;
                cursor.advance();
            }
            b')' => {
                cursor.advance();
                if !quoted {
                    balance -= 1;
                }
            }
            b'(' => {
                cursor.advance();
                if !quoted {
                    balance += 1;
                }
            }
            _ => cursor.advance(),
        }
    }

    if cursor.peek()? == Some(b',') {
        cursor.advance();
    }
    Ok(true)
}
