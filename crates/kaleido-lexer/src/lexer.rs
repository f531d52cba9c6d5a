//! Lexer for the Kaleido language
//!
//! Wraps the `logos`-generated scanner, turning byte ranges into
//! line/column [`Span`]s and scanner failures into diagnostics.
//! Rejected input is reported and skipped, so the token stream the
//! parser sees only ever contains valid tokens followed by one `Eof`.

use crate::token::{LexError, Token, TokenKind};
use kaleido_error::{
    span::{Position, Span},
    Diagnostic, Diagnostics, ErrorCode,
};
use logos::Logos;
use tracing::trace;

pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    file_id: u32,
    /// Position of the cursor used to turn byte offsets into line/column
    cursor: Position,
    diagnostics: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file_id: u32) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            file_id,
            cursor: Position::new(1, 1, 0),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Moves the cursor forward to `offset`. Offsets only ever grow.
    fn position_at(&mut self, offset: usize) -> Position {
        let skipped = self.source.get(self.cursor.offset..offset).unwrap_or("");
        for ch in skipped.chars() {
            if ch == '\n' {
                self.cursor.line += 1;
                self.cursor.column = 1;
            } else {
                self.cursor.column += 1;
            }
        }
        self.cursor.offset = offset.max(self.cursor.offset);
        self.cursor
    }

    fn span_of(&mut self, range: std::ops::Range<usize>) -> Span {
        let start = self.position_at(range.start);
        let end = self.position_at(range.end);
        Span::new(start, end, self.file_id)
    }

    fn report(&mut self, error: LexError, span: Span, text: &str) {
        let diagnostic = match error {
            LexError::UnexpectedChar => Diagnostic::error(format!("unexpected character `{}`", text))
                .with_code(ErrorCode::UNEXPECTED_CHAR)
                .with_label(span, "not part of any token"),
            LexError::InvalidNumber(literal) => {
                Diagnostic::error(format!("invalid numeric literal `{}`", literal))
                    .with_code(ErrorCode::INVALID_NUMBER)
                    .with_label(span, "expected digits with at most one decimal point")
            }
        };
        self.diagnostics.push(diagnostic);
    }

    /// Scans the next valid token, reporting anything rejected on the way.
    pub fn next_token(&mut self) -> Token {
        loop {
            match self.inner.next() {
                Some(Ok(kind)) => {
                    let span = self.span_of(self.inner.span());
                    trace!(token = %kind, line = span.start.line, "scanned");
                    return Token::new(kind, span);
                }
                Some(Err(error)) => {
                    let text = self.inner.slice();
                    let span = self.span_of(self.inner.span());
                    self.report(error, span, text);
                }
                None => {
                    let end = self.position_at(self.source.len());
                    return Token::new(TokenKind::Eof, Span::point(end, self.file_id));
                }
            }
        }
    }

    /// Tokenizes the whole source. The last token is always `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.is_eof();
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }
}

/// Tokenizes source code and returns the tokens with any diagnostics
pub fn tokenize(source: &str, file_id: u32) -> (Vec<Token>, Diagnostics) {
    let mut lexer = Lexer::new(source, file_id);
    let tokens = lexer.tokenize();
    (tokens, lexer.take_diagnostics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = tokenize(source, 0);
        assert!(diagnostics.is_empty(), "unexpected diagnostics for {:?}", source);
        tokens
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Eof)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Ident(name.into())
    }

    #[test]
    fn test_function_definition() {
        let tokens = lex("def add(x, y): x + y;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Def,
                ident("add"),
                TokenKind::LParen,
                ident("x"),
                TokenKind::Comma,
                ident("y"),
                TokenKind::RParen,
                TokenKind::Colon,
                ident("x"),
                TokenKind::Plus,
                ident("y"),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_keywords_and_prefixed_identifiers() {
        let tokens = lex("if then else for var in and or not global extern defx");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                TokenKind::Then,
                TokenKind::Else,
                TokenKind::For,
                TokenKind::Var,
                TokenKind::In,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Global,
                TokenKind::Extern,
                ident("defx"),
            ]
        );
        assert!(tokens[..11].iter().all(TokenKind::is_keyword));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("42 3.25 .5"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.25),
                TokenKind::Number(0.5),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("++i = i + 1 == 2 < 3 - 4 * 5 / 6"),
            vec![
                TokenKind::PlusPlus,
                ident("i"),
                TokenKind::Eq,
                ident("i"),
                TokenKind::Plus,
                TokenKind::Number(1.0),
                TokenKind::EqEq,
                TokenKind::Number(2.0),
                TokenKind::Lt,
                TokenKind::Number(3.0),
                TokenKind::Minus,
                TokenKind::Number(4.0),
                TokenKind::Star,
                TokenKind::Number(5.0),
                TokenKind::Slash,
                TokenKind::Number(6.0),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("# leading comment\nglobal g; # trailing\n");
        assert_eq!(tokens, vec![TokenKind::Global, ident("g"), TokenKind::Semicolon]);
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let (tokens, _) = tokenize("def f()\n  x", 0);
        let x = &tokens[4];
        assert_eq!(x.kind, ident("x"));
        assert_eq!(x.span.start.line, 2);
        assert_eq!(x.span.start.column, 3);
        assert_eq!(x.span.start.offset, 10);
        assert_eq!(x.span.end.column, 4);
        assert!(tokens.last().map_or(false, Token::is_eof));
    }

    #[test]
    fn test_invalid_input_is_reported_and_skipped() {
        let (tokens, diagnostics) = tokenize("1.2.3 $ x", 0);
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![ident("x"), TokenKind::Eof]);

        let codes: Vec<_> = diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(codes, vec![ErrorCode::INVALID_NUMBER, ErrorCode::UNEXPECTED_CHAR]);
    }
}
