//! Tokens of the Kaleido language.

use kaleido_error::span::Span;
use logos::Logos;
use std::fmt;

/// Why the scanner rejected a piece of input.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedChar,
    /// A run of digits and dots that is not a float, e.g. `1.2.3`
    InvalidNumber(String),
}

fn number(lex: &mut logos::Lexer<'_, TokenKind>) -> Result<f64, LexError> {
    let text = lex.slice();
    text.parse()
        .map_err(|_| LexError::InvalidNumber(text.to_string()))
}

/// Token kinds. `Eof` is synthesized by [`Lexer`](crate::Lexer), never scanned.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum TokenKind {
    // =========================================
    // Keywords
    // =========================================
    /// `def` - function definition
    #[token("def")]
    Def,
    /// `extern` - standalone prototype
    #[token("extern")]
    Extern,
    /// `global` - module-level variable
    #[token("global")]
    Global,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    /// `var` - introduces fresh local bindings
    #[token("var")]
    Var,
    #[token("in")]
    In,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    // =========================================
    // Literals and names
    // =========================================
    /// Every number is a 64-bit float: `1`, `2.5`, `.5`
    #[regex(r"[0-9.]+", number)]
    Number(f64),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // =========================================
    // Operators
    // =========================================
    #[token("+")]
    Plus,
    /// `++` - increment a local in place
    #[token("++")]
    PlusPlus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("<")]
    Lt,
    #[token("==")]
    EqEq,
    #[token("=")]
    Eq,

    // =========================================
    // Punctuation
    // =========================================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    /// Optional separator between a prototype and its body
    #[token(":")]
    Colon,

    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Extern
                | TokenKind::Global
                | TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::For
                | TokenKind::Var
                | TokenKind::In
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Def => "def",
            TokenKind::Extern => "extern",
            TokenKind::Global => "global",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::Var => "var",
            TokenKind::In => "in",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::Number(n) => return write!(f, "{}", n),
            TokenKind::Ident(name) => return f.write_str(name),
            TokenKind::Plus => "+",
            TokenKind::PlusPlus => "++",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Lt => "<",
            TokenKind::EqEq => "==",
            TokenKind::Eq => "=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}

/// A token with its location in the source code
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Compares kinds, ignoring payloads
    pub fn is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(kind)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.kind, self.span.start.line, self.span.start.column
        )
    }
}
