//! Expression templates. A compiled template is the token shape of one
//! column expression with every literal wildcarded into a slot, paired with
//! the parameterized AST. Subsequent rows whose token stream fits the shape
//! skip parsing entirely: their literals are bound as parameters and the
//! whole column is evaluated in one accumulated pass at flush time.

use std::sync::Arc;

use crate::batch::{ColumnBuffer, MissingMask};
use crate::coerce::coerce;
use crate::error::{ValuesError, ValuesResult};
use crate::expr::parser::parse_number;
use crate::expr::{evaluate, EvalContext, Expr};
use crate::lexer::{match_delimiter, Token, TokenCursor, TokenKind};
use crate::types::DataKind;
use crate::value::{replace_null_fields_with_defaults, Scalar};

/// Literal class a wildcard slot was compiled from. A slot only binds
/// literals of the same class, so a row whose literal changes type falls out
/// of the template instead of carrying a bad bind to flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Number,
    String,
    Null,
    Bool,
}

/// One element of a template's token shape. Literal positions are wildcards
/// tagged with their literal class; everything else must match the original
/// token exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeItem {
    Exact { kind: TokenKind, text: String },
    Slot(SlotKind),
}

/// True when a sign op sits at a primary position, i.e. where the expression
/// parser would fold it into the following number literal.
fn sign_at_primary(prev: Option<&ShapeItem>) -> bool {
    match prev {
        None => true,
        Some(ShapeItem::Slot(_)) => false,
        Some(ShapeItem::Exact { kind, .. }) => matches!(
            kind,
            TokenKind::Op | TokenKind::Comma | TokenKind::OpenParen | TokenKind::OpenBracket
        ),
    }
}

fn is_literal_keyword(text: &str) -> bool {
    text.eq_ignore_ascii_case("NULL")
        || text.eq_ignore_ascii_case("TRUE")
        || text.eq_ignore_ascii_case("FALSE")
}

/// Derive the wildcarded shape of the token range `[start, end)`. Sign tokens
/// fold into the following number exactly as the parser folds them, so the
/// slot count lines up with the parameterized AST.
pub(crate) fn shape_of(tokens: &[Token], start: usize, end: usize) -> Vec<ShapeItem> {
    let mut shape = Vec::with_capacity(end - start);
    let mut i = start;
    while i < end {
        let tok = &tokens[i];
        match tok.kind {
            TokenKind::Number => shape.push(ShapeItem::Slot(SlotKind::Number)),
            TokenKind::StringLit => shape.push(ShapeItem::Slot(SlotKind::String)),
            TokenKind::Ident if tok.text.eq_ignore_ascii_case("NULL") => {
                shape.push(ShapeItem::Slot(SlotKind::Null))
            }
            TokenKind::Ident if is_literal_keyword(&tok.text) => {
                shape.push(ShapeItem::Slot(SlotKind::Bool))
            }
            TokenKind::Op
                if (tok.text == "-" || tok.text == "+")
                    && i + 1 < end
                    && tokens[i + 1].kind == TokenKind::Number
                    && sign_at_primary(shape.last()) =>
            {
                shape.push(ShapeItem::Slot(SlotKind::Number));
                i += 2;
                continue;
            }
            _ => shape.push(ShapeItem::Exact { kind: tok.kind, text: tok.text.clone() }),
        }
        i += 1;
    }
    shape
}

/// Immutable compiled form, shared through the cache.
#[derive(Debug)]
pub struct CompiledTemplate {
    pub shape: Vec<ShapeItem>,
    expr: Expr,
    param_count: usize,
    pub target: DataKind,
    pub nullable: bool,
    pub null_as_default: bool,
    pub delimiter: u8,
}

impl CompiledTemplate {
    /// Compile from the token range an expression was parsed out of and its
    /// AST. Fails when the shape's slots disagree with the AST's literals,
    /// which happens for literals the lexer cannot see (none today, but the
    /// check keeps replay honest).
    pub fn compile(
        tokens: &[Token],
        start: usize,
        end: usize,
        ast: &Expr,
        target: DataKind,
        nullable: bool,
        null_as_default: bool,
        delimiter: u8,
    ) -> ValuesResult<CompiledTemplate> {
        let shape = shape_of(tokens, start, end);
        Self::with_shape(shape, ast, target, nullable, null_as_default, delimiter)
    }

    /// Compile against an already-derived shape (the cache derives the shape
    /// up front to build its key).
    pub(crate) fn with_shape(
        shape: Vec<ShapeItem>,
        ast: &Expr,
        target: DataKind,
        nullable: bool,
        null_as_default: bool,
        delimiter: u8,
    ) -> ValuesResult<CompiledTemplate> {
        let (expr, params) = ast.parameterize();
        let slots = shape.iter().filter(|s| matches!(s, ShapeItem::Slot(_))).count();
        if slots != params.len() {
            return Err(ValuesError::internal(format!(
                "template shape has {slots} slots for {} literals",
                params.len()
            )));
        }
        Ok(CompiledTemplate {
            shape,
            expr,
            param_count: params.len(),
            target,
            nullable,
            null_as_default,
            delimiter,
        })
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Try to match this template at the cursor position, including the
    /// trailing delimiter. On success the cursor is left after the delimiter
    /// and the bound literals are returned with the delimiter's absolute end
    /// offset. On mismatch the cursor is restored and nothing is bound.
    pub fn match_and_bind(
        &self,
        tc: &mut TokenCursor,
        tokens: &[Token],
    ) -> ValuesResult<Option<(Vec<Scalar>, u64)>> {
        let saved = tc.save();
        let mut params = Vec::with_capacity(self.param_count);
        for item in &self.shape {
            let matched = match item {
                ShapeItem::Exact { kind, text } => {
                    let tok = tc.peek();
                    if tok.kind == *kind && tok.text == *text {
                        tc.advance();
                        true
                    } else {
                        false
                    }
                }
                ShapeItem::Slot(want) => match match_slot(tc, *want)? {
                    Some(v) => {
                        params.push(v);
                        true
                    }
                    None => false,
                },
            };
            if !matched {
                tc.restore(saved)?;
                return Ok(None);
            }
        }
        match match_delimiter(tokens, tc.idx(), self.delimiter) {
            Some((next_idx, delim_end)) => {
                while tc.idx() < next_idx {
                    tc.advance();
                }
                Ok(Some((params, delim_end)))
            }
            None => {
                tc.restore(saved)?;
                Ok(None)
            }
        }
    }
}

/// Match one wildcard position: a literal token of the slot's class,
/// optionally signed if the sign applies directly to a number.
fn match_slot(tc: &mut TokenCursor, want: SlotKind) -> ValuesResult<Option<Scalar>> {
    let tok = tc.peek().clone();
    match (want, tok.kind) {
        (SlotKind::Number, TokenKind::Number) => {
            tc.advance();
            Ok(Some(parse_number(&tok.text, false)?))
        }
        (SlotKind::String, TokenKind::StringLit) => {
            tc.advance();
            Ok(Some(Scalar::Str(tok.text)))
        }
        (SlotKind::Null, TokenKind::Ident) if tok.text.eq_ignore_ascii_case("NULL") => {
            tc.advance();
            Ok(Some(Scalar::Null))
        }
        (SlotKind::Bool, TokenKind::Ident) if tok.text.eq_ignore_ascii_case("TRUE") => {
            tc.advance();
            Ok(Some(Scalar::Bool(true)))
        }
        (SlotKind::Bool, TokenKind::Ident) if tok.text.eq_ignore_ascii_case("FALSE") => {
            tc.advance();
            Ok(Some(Scalar::Bool(false)))
        }
        (SlotKind::Number, TokenKind::Op) if tok.text == "-" || tok.text == "+" => {
            let saved = tc.save();
            tc.advance();
            let next = tc.peek().clone();
            if next.kind == TokenKind::Number {
                tc.advance();
                Ok(Some(parse_number(&next.text, tok.text == "-")?))
            } else {
                tc.restore(saved)?;
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

/// A template plus the parameter rows accumulated against it.
#[derive(Debug)]
pub struct TemplateInstance {
    compiled: Arc<CompiledTemplate>,
    bindings: Vec<Vec<Scalar>>,
}

impl TemplateInstance {
    pub fn new(compiled: Arc<CompiledTemplate>) -> Self {
        TemplateInstance { compiled, bindings: Vec::new() }
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }

    pub fn rows_count(&self) -> usize {
        self.bindings.len()
    }

    /// Match the current row against the template and accumulate its literals.
    /// Returns the delimiter's absolute end offset on success.
    pub fn try_match_and_bind(
        &mut self,
        tc: &mut TokenCursor,
        tokens: &[Token],
    ) -> ValuesResult<Option<u64>> {
        match self.compiled.match_and_bind(tc, tokens)? {
            Some((params, delim_end)) => {
                self.bindings.push(params);
                Ok(Some(delim_end))
            }
            None => Ok(None),
        }
    }

    /// Evaluate every accumulated row into the column buffer. `start_row` is
    /// the buffer length the first accumulated row belongs at; the caller
    /// flushes templates in buffer order so this always equals `buf.len()`.
    pub fn evaluate_accumulated(
        &mut self,
        ctx: &EvalContext,
        buf: &mut ColumnBuffer,
        missing: &mut MissingMask,
        col: usize,
        start_row: usize,
    ) -> ValuesResult<()> {
        let t = &*self.compiled;
        for (i, params) in self.bindings.iter().enumerate() {
            let mut value = evaluate(&t.expr, params, ctx)?;
            if t.null_as_default {
                replace_null_fields_with_defaults(&mut value, &t.target)?;
            }
            let value = coerce(value, &t.target)?;
            if value.is_null() && !t.nullable {
                if t.null_as_default {
                    buf.push(t.target.default_scalar())?;
                    missing.set(col, start_row + i);
                    continue;
                }
                return Err(ValuesError::NullNotAllowed { kind: t.target.name() });
            }
            buf.push(value)?;
        }
        self.bindings.clear();
        Ok(())
    }
}
