//! kaleido-error - Diagnostics for the Kaleido compiler
//!
//! Every stage (lexer, parser, IR generation) reports problems as
//! [`Diagnostic`]s collected into a [`Diagnostics`] list; the driver
//! renders them against a [`SourceCache`].
//!
//! # Example
//!
//! ```rust
//! use kaleido_error::{Diagnostic, DiagnosticRenderer, ErrorCode, SourceCache};
//! use kaleido_error::span::{Position, Span};
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add("demo.kl", "def f(x) y");
//! let span = Span::new(Position::new(1, 10, 9), Position::new(1, 11, 10), file_id);
//!
//! let diagnostic = Diagnostic::error("unknown variable name: `y`")
//!     .with_code(ErrorCode::UNDEFINED_VARIABLE)
//!     .with_label(span, "not bound locally or globally");
//!
//! let text = DiagnosticRenderer::new(&cache).without_colors().render(&diagnostic);
//! assert!(text.contains("error[EG001]"));
//! ```

pub mod diagnostic;
pub mod span;

pub use diagnostic::{
    Diagnostic, DiagnosticRenderer, ErrorCode, Label, Level, SourceCache, SourceError, SourceFile,
};
pub use span::{Position, Span, Spanned};

/// Result type for operations that fail with a single diagnostic
pub type Result<T> = std::result::Result<T, Diagnostic>;

/// Diagnostics accumulated during one compilation
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders every diagnostic, separated by blank lines
    pub fn render(&self, renderer: &DiagnosticRenderer<'_>) -> String {
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_errors() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warning("function `f` failed verification"));
        assert!(!diagnostics.has_errors());

        let mut more = Diagnostics::new();
        more.push(Diagnostic::error("unknown function referenced: `g`"));
        more.push(Diagnostic::error("unknown variable name: `x`"));
        diagnostics.extend(more);

        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.has_errors());
    }
}
