//! kaleido-lexer - Tokenizer for the Kaleido language
//!
//! Kaleido has a single value type (64-bit float), so the token set is
//! small: a dozen keywords, numbers, identifiers, arithmetic and
//! comparison operators, `++`, and punctuation. `#` starts a comment
//! that runs to the end of the line.
//!
//! # Example
//!
//! ```rust
//! use kaleido_lexer::{Lexer, TokenKind};
//!
//! let mut lexer = Lexer::new("def twice(x) x * 2;", 0);
//! let tokens = lexer.tokenize();
//!
//! assert_eq!(tokens[0].kind, TokenKind::Def);
//! assert!(tokens.last().unwrap().is_eof());
//! ```

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer};
pub use token::{LexError, Token, TokenKind};
