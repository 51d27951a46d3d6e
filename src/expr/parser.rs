//! Precedence-climbing parser from a row token stream to a constant
//! expression AST. Depth and backtrack budgets live in the token cursor.

use crate::error::{ValuesError, ValuesResult};
use crate::lexer::{TokenCursor, TokenKind};
use crate::value::Scalar;

use super::ast::{BinOp, Expr, UnOp};

fn prec(op: BinOp) -> u8 {
    match op {
        BinOp::Concat => 1,
        BinOp::Add | BinOp::Sub => 2,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 3,
    }
}

fn bin_op(text: &str) -> Option<BinOp> {
    match text {
        "+" => Some(BinOp::Add),
        "-" => Some(BinOp::Sub),
        "*" => Some(BinOp::Mul),
        "/" => Some(BinOp::Div),
        "%" => Some(BinOp::Mod),
        "||" => Some(BinOp::Concat),
        _ => None,
    }
}

/// Parse one expression starting at the cursor position. The cursor is left
/// on the first token after the expression (typically the column delimiter).
pub fn parse_expression(tc: &mut TokenCursor) -> ValuesResult<Expr> {
    parse_binary(tc, 0)
}

fn parse_binary(tc: &mut TokenCursor, min_prec: u8) -> ValuesResult<Expr> {
    tc.enter()?;
    let mut left = parse_primary(tc)?;
    loop {
        let tok = tc.peek();
        let Some(op) = (if tok.kind == TokenKind::Op { bin_op(&tok.text) } else { None }) else {
            break;
        };
        let p = prec(op);
        if p < min_prec {
            break;
        }
        tc.advance();
        let right = parse_binary(tc, p + 1)?;
        left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
    }
    tc.leave();
    Ok(left)
}

pub(crate) fn parse_number(text: &str, negative: bool) -> ValuesResult<Scalar> {
    let signed: String = if negative { format!("-{text}") } else { text.to_string() };
    if let Ok(i) = signed.parse::<i64>() {
        return Ok(Scalar::Int(i));
    }
    signed
        .parse::<f64>()
        .map(Scalar::Float)
        .map_err(|_| ValuesError::syntax(format!("bad numeric literal '{text}'")))
}

fn parse_primary(tc: &mut TokenCursor) -> ValuesResult<Expr> {
    tc.enter()?;
    let tok = tc.peek().clone();
    let out = match tok.kind {
        TokenKind::Number => {
            tc.advance();
            Expr::Literal(parse_number(&tok.text, false)?)
        }
        TokenKind::StringLit => {
            tc.advance();
            Expr::Literal(Scalar::Str(tok.text))
        }
        TokenKind::Op if tok.text == "-" || tok.text == "+" => {
            tc.advance();
            let negative = tok.text == "-";
            // A sign directly applied to a number folds into the literal, so
            // templates see one literal slot for the signed value.
            let next = tc.peek().clone();
            if next.kind == TokenKind::Number {
                tc.advance();
                Expr::Literal(parse_number(&next.text, negative)?)
            } else {
                let inner = parse_primary(tc)?;
                let op = if negative { UnOp::Neg } else { UnOp::Plus };
                Expr::Unary { op, expr: Box::new(inner) }
            }
        }
        TokenKind::Ident => {
            tc.advance();
            let upper = tok.text.to_ascii_uppercase();
            match upper.as_str() {
                "NULL" => Expr::Literal(Scalar::Null),
                "TRUE" => Expr::Literal(Scalar::Bool(true)),
                "FALSE" => Expr::Literal(Scalar::Bool(false)),
                _ => {
                    if tc.peek().kind == TokenKind::OpenParen {
                        tc.advance();
                        let args = parse_comma_list(tc, TokenKind::CloseParen)?;
                        Expr::Function { name: tok.text, args }
                    } else {
                        Expr::Identifier(tok.text)
                    }
                }
            }
        }
        TokenKind::OpenParen => {
            tc.advance();
            let items = parse_comma_list(tc, TokenKind::CloseParen)?;
            match items.len() {
                0 => return Err(ValuesError::syntax("empty parenthesized expression")),
                1 => items.into_iter().next().unwrap_or(Expr::Tuple(Vec::new())),
                _ => Expr::Tuple(items),
            }
        }
        TokenKind::OpenBracket => {
            tc.advance();
            let items = parse_comma_list(tc, TokenKind::CloseBracket)?;
            Expr::Array(items)
        }
        other => {
            return Err(ValuesError::syntax(format!(
                "unexpected token {:?} in expression",
                other
            )))
        }
    };
    tc.leave();
    Ok(out)
}

fn parse_comma_list(tc: &mut TokenCursor, close: TokenKind) -> ValuesResult<Vec<Expr>> {
    let mut items = Vec::new();
    if tc.peek().kind == close {
        tc.advance();
        return Ok(items);
    }
    loop {
        items.push(parse_binary(tc, 0)?);
        let tok = tc.peek().clone();
        if tok.kind == TokenKind::Comma {
            tc.advance();
            continue;
        }
        if tok.kind == close {
            tc.advance();
            return Ok(items);
        }
        return Err(ValuesError::syntax(format!(
            "expected ',' or closing bracket, got {:?}",
            tok.kind
        )));
    }
}
