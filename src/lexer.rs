//! Row tokenizer and the budgeted token cursor the expression parser and
//! template matcher walk. A token stream is lexed once per row (from the
//! column checkpoint to the row boundary) and re-used for the remaining
//! columns of that row unless the cursor's buffer generation moved.

use crate::error::{ValuesError, ValuesResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    StringLit,
    Ident,
    Comma,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Op,
    Semicolon,
    Error,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Decoded contents for string literals, source lexeme otherwise.
    pub text: String,
    /// Absolute byte offsets into the input stream.
    pub begin: u64,
    pub end: u64,
}

impl Token {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, TokenKind::Error | TokenKind::End)
    }
}

/// Lex one row's byte range. `base_abs` is the absolute offset of `bytes[0]`.
/// The result always ends with an `End` token, or an `Error` token when the
/// input breaks off mid-literal or contains an unknown byte.
pub fn lex_row(bytes: &[u8], base_abs: u64) -> Vec<Token> {
    let mut out = Vec::new();
    let mut i = 0usize;
    let n = bytes.len();
    let tok = |kind, text: String, b: usize, e: usize| Token {
        kind,
        text,
        begin: base_abs + b as u64,
        end: base_abs + e as u64,
    };

    while i < n {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        match c {
            b',' => {
                i += 1;
                out.push(tok(TokenKind::Comma, ",".into(), start, i));
            }
            b'(' => {
                i += 1;
                out.push(tok(TokenKind::OpenParen, "(".into(), start, i));
            }
            b')' => {
                i += 1;
                out.push(tok(TokenKind::CloseParen, ")".into(), start, i));
            }
            b'[' => {
                i += 1;
                out.push(tok(TokenKind::OpenBracket, "[".into(), start, i));
            }
            b']' => {
                i += 1;
                out.push(tok(TokenKind::CloseBracket, "]".into(), start, i));
            }
            b';' => {
                i += 1;
                out.push(tok(TokenKind::Semicolon, ";".into(), start, i));
            }
            b'+' | b'-' | b'*' | b'/' | b'%' => {
                i += 1;
                out.push(tok(TokenKind::Op, (c as char).to_string(), start, i));
            }
            b'|' => {
                if i + 1 < n && bytes[i + 1] == b'|' {
                    i += 2;
                    out.push(tok(TokenKind::Op, "||".into(), start, i));
                } else {
                    out.push(tok(TokenKind::Error, "|".into(), start, i + 1));
                    return out;
                }
            }
            b'\'' => {
                i += 1;
                let mut raw: Vec<u8> = Vec::new();
                let mut closed = false;
                while i < n {
                    match bytes[i] {
                        b'\\' => {
                            i += 1;
                            if i < n {
                                raw.push(unescape(bytes[i]));
                                i += 1;
                            }
                        }
                        b'\'' => {
                            // Doubled quote is an escaped quote.
                            if i + 1 < n && bytes[i + 1] == b'\'' {
                                raw.push(b'\'');
                                i += 2;
                            } else {
                                i += 1;
                                closed = true;
                                break;
                            }
                        }
                        b => {
                            raw.push(b);
                            i += 1;
                        }
                    }
                }
                // Literal bytes are UTF-8, same as the streaming deserializer.
                let text = match String::from_utf8(raw) {
                    Ok(s) => s,
                    Err(e) => {
                        let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                        out.push(tok(TokenKind::Error, lossy, start, i));
                        return out;
                    }
                };
                if !closed {
                    out.push(tok(TokenKind::Error, text, start, i));
                    return out;
                }
                out.push(tok(TokenKind::StringLit, text, start, i));
            }
            b'0'..=b'9' | b'.' => {
                while i < n && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Exponent part.
                if i < n && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < n && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < n && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < n && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                out.push(tok(TokenKind::Number, text, start, i));
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                while i < n && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                out.push(tok(TokenKind::Ident, text, start, i));
            }
            _ => {
                out.push(tok(TokenKind::Error, (c as char).to_string(), start, i + 1));
                return out;
            }
        }
    }
    out.push(Token { kind: TokenKind::End, text: String::new(), begin: base_abs + n as u64, end: base_abs + n as u64 });
    out
}

fn unescape(b: u8) -> u8 {
    match b {
        b'n' => b'\n',
        b't' => b'\t',
        b'r' => b'\r',
        b'0' => 0,
        other => other,
    }
}

/// Forward view over a lexed row with explicit recursion-depth and
/// backtracking budgets; exceeding either yields an error instead of
/// unbounded work.
pub struct TokenCursor<'a> {
    tokens: &'a [Token],
    idx: usize,
    depth: u32,
    max_depth: u32,
    backtracks: u32,
    max_backtracks: u32,
}

static END_TOKEN: Token =
    Token { kind: TokenKind::End, text: String::new(), begin: u64::MAX, end: u64::MAX };

impl<'a> TokenCursor<'a> {
    pub fn new(tokens: &'a [Token], idx: usize, max_depth: u32, max_backtracks: u32) -> Self {
        TokenCursor { tokens, idx, depth: 0, max_depth, backtracks: 0, max_backtracks }
    }

    pub fn peek(&self) -> &Token {
        self.tokens.get(self.idx).unwrap_or(&END_TOKEN)
    }

    pub fn advance(&mut self) {
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn save(&self) -> usize {
        self.idx
    }

    pub fn restore(&mut self, saved: usize) -> ValuesResult<()> {
        self.backtracks += 1;
        if self.backtracks > self.max_backtracks {
            return Err(ValuesError::syntax("maximum parser backtracks exceeded"));
        }
        self.idx = saved;
        Ok(())
    }

    pub fn enter(&mut self) -> ValuesResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ValuesError::syntax("maximum parse depth exceeded"));
        }
        Ok(())
    }

    pub fn leave(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth -= 1;
    }
}

/// Match the trailing delimiter after a column expression. A comma delimiter
/// must be a lone comma; a closing-parenthesis delimiter accepts one optional
/// trailing comma first. Returns the index after the delimiter and the
/// absolute end offset of its last token.
pub(crate) fn match_delimiter(tokens: &[Token], at: usize, delimiter: u8) -> Option<(usize, u64)> {
    let get = |i: usize| tokens.get(i);
    match delimiter {
        b',' => match get(at) {
            Some(t) if t.kind == TokenKind::Comma => Some((at + 1, t.end)),
            _ => None,
        },
        b')' => {
            let mut j = at;
            if matches!(get(j), Some(t) if t.kind == TokenKind::Comma) {
                j += 1;
            }
            match get(j) {
                Some(t) if t.kind == TokenKind::CloseParen => Some((j + 1, t.end)),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex_row(src.as_bytes(), 0).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_simple_row() {
        use TokenKind::*;
        assert_eq!(
            kinds("(1, 'a'),"),
            vec![OpenParen, Number, Comma, StringLit, CloseParen, Comma, End]
        );
    }

    #[test]
    fn string_escapes_decode() {
        let toks = lex_row(br"'a\'b''c\n'", 0);
        assert_eq!(toks[0].kind, TokenKind::StringLit);
        assert_eq!(toks[0].text, "a'b'c\n");
    }

    #[test]
    fn string_literals_keep_multibyte_utf8() {
        let toks = lex_row("'café', 'héllo'".as_bytes(), 0);
        assert_eq!(toks[0].kind, TokenKind::StringLit);
        assert_eq!(toks[0].text, "café");
        assert_eq!(toks[2].text, "héllo");
        assert_eq!(toks[2].text.chars().count(), 5);
    }

    #[test]
    fn unterminated_string_is_error() {
        let toks = lex_row(b"'abc", 0);
        assert_eq!(toks.last().unwrap().kind, TokenKind::Error);
    }

    #[test]
    fn numbers_with_exponent() {
        let toks = lex_row(b"1.5e-3, 42", 0);
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].text, "1.5e-3");
        assert_eq!(toks[2].text, "42");
    }

    #[test]
    fn offsets_are_absolute() {
        let toks = lex_row(b"now() + 1", 100);
        assert_eq!(toks[0].begin, 100);
        assert_eq!(toks[0].end, 103);
        let plus = toks.iter().find(|t| t.kind == TokenKind::Op).unwrap();
        assert_eq!(plus.text, "+");
        assert_eq!(plus.begin, 106);
    }

    #[test]
    fn depth_budget_enforced() {
        let toks = lex_row(b"1", 0);
        let mut tc = TokenCursor::new(&toks, 0, 2, 10);
        tc.enter().unwrap();
        tc.enter().unwrap();
        assert!(tc.enter().is_err());
    }

    #[test]
    fn backtrack_budget_enforced() {
        let toks = lex_row(b"1", 0);
        let mut tc = TokenCursor::new(&toks, 0, 10, 1);
        let s = tc.save();
        tc.restore(s).unwrap();
        assert!(tc.restore(s).is_err());
    }

    #[test]
    fn delimiter_matching() {
        let toks = lex_row(b", )", 0);
        assert_eq!(match_delimiter(&toks, 0, b','), Some((1, 1)));
        // Trailing comma before the closing paren is accepted.
        assert_eq!(match_delimiter(&toks, 0, b')'), Some((2, 3)));
        let toks = lex_row(b")", 0);
        assert_eq!(match_delimiter(&toks, 0, b')'), Some((1, 1)));
        assert_eq!(match_delimiter(&toks, 0, b','), None);
    }
}
