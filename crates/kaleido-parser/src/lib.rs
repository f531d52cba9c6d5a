//! kaleido-parser - Parser for the Kaleido language
//!
//! Converts a token stream into a single [`Ast::Sequence`] of top-level
//! items (`def`, `extern`, `global`).
//!
//! # Example
//!
//! ```rust
//! use kaleido_lexer::Lexer;
//! use kaleido_parser::{parse, Ast};
//!
//! let mut lexer = Lexer::new("extern sin(x); def f(x) sin(x) * 2;", 0);
//! let (program, diagnostics) = parse(lexer.tokenize());
//!
//! assert!(!diagnostics.has_errors());
//! assert!(matches!(program, Ast::Sequence(ref items) if items.len() == 2));
//! ```

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::{parse, Parser};
