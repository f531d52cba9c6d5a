//! Structured diagnostics and their rustc-style rendering.
//!
//! ```text
//! error[EG003]: unknown function referenced: `foo`
//!  --> demo.kl:2:1
//!   |
//! 2 | def main() foo()
//!   | ^^^^^^^^^^^^^^^^ while lowering `main`
//!   = help: declare it first with `extern foo(...)`
//! ```

use crate::span::Span;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Note,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",
            Level::Warning => "\x1b[1;33m",
            Level::Note => "\x1b[1;36m",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error code rendered as `E{category}{number:03}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// L = lexer, P = parser, G = IR generation, V = IR verification
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Lexer
    pub const UNEXPECTED_CHAR: Self = Self::new('L', 1);
    pub const INVALID_NUMBER: Self = Self::new('L', 2);

    // Parser
    pub const UNEXPECTED_TOKEN: Self = Self::new('P', 1);
    pub const EXPECTED_EXPRESSION: Self = Self::new('P', 2);
    pub const EXPECTED_IDENTIFIER: Self = Self::new('P', 3);
    pub const EXPECTED_DECLARATION: Self = Self::new('P', 4);

    // IR generation
    pub const UNDEFINED_VARIABLE: Self = Self::new('G', 1);
    pub const UNDEFINED_LOCAL: Self = Self::new('G', 2);
    pub const UNDEFINED_FUNCTION: Self = Self::new('G', 3);
    pub const ARGUMENT_COUNT: Self = Self::new('G', 4);
    pub const MISSING_CONDITION: Self = Self::new('G', 5);
    pub const MISSING_BRANCH_VALUE: Self = Self::new('G', 6);
    pub const UNDEFINED_OPERATOR: Self = Self::new('G', 7);
    pub const REDEFINED_FUNCTION: Self = Self::new('G', 8);
    pub const REDEFINED_GLOBAL: Self = Self::new('G', 9);
    pub const BACKEND: Self = Self::new('G', 10);

    // Verifier
    pub const MALFORMED_FUNCTION: Self = Self::new('V', 1);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A span with a message attached.
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    /// Primary labels are underlined with `^`, secondary ones with `-`.
    pub primary: bool,
}

/// A single reported problem.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
            primary: true,
        });
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
            primary: false,
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for Diagnostic {
    /// Single-line form, used in logs and test failure messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level)?;
        if let Some(code) = self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Failure to load a source file into the cache.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A source file with a line index for snippet lookup.
#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Text of a 1-indexed line, without its newline.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next.saturating_sub(1))
            .unwrap_or(self.source.len());
        self.source.get(start..end)
    }
}

/// All source files of one compiler invocation, addressed by `file_id`.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile::new(name, source));
        id
    }

    /// Reads `path` from disk and registers it.
    pub fn load(&mut self, path: &Path) -> Result<u32, SourceError> {
        let source = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.add(path.display().to_string(), source))
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

struct Style {
    level: &'static str,
    accent: &'static str,
    bold: &'static str,
    reset: &'static str,
}

impl Style {
    fn new(level: Level, colored: bool) -> Self {
        if colored {
            Self {
                level: level.color(),
                accent: "\x1b[1;34m",
                bold: "\x1b[1m",
                reset: "\x1b[0m",
            }
        } else {
            Self {
                level: "",
                accent: "",
                bold: "",
                reset: "",
            }
        }
    }
}

/// Renders diagnostics against the files of a [`SourceCache`].
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
    colored: bool,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self {
            cache,
            colored: true,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let style = Style::new(diagnostic.level, self.colored);
        let mut out = String::new();

        out.push_str(style.level);
        out.push_str(diagnostic.level.as_str());
        if let Some(code) = diagnostic.code {
            out.push_str(&format!("[{}]", code));
        }
        out.push_str(&format!(
            "{}{}: {}{}\n",
            style.reset, style.bold, diagnostic.message, style.reset
        ));

        for label in &diagnostic.labels {
            self.render_label(&mut out, label, &style);
        }
        for note in &diagnostic.notes {
            out.push_str(&format!("  = {}note{}: {}\n", style.bold, style.reset, note));
        }
        for help in &diagnostic.help {
            out.push_str(&format!("  = {}help{}: {}\n", style.bold, style.reset, help));
        }
        out
    }

    fn render_label(&self, out: &mut String, label: &Label, style: &Style) {
        let Some(file) = self.cache.get(label.span.file_id) else {
            return;
        };
        let start = label.span.start;
        out.push_str(&format!(
            " {}-->{} {}:{}:{}\n",
            style.accent, style.reset, file.name, start.line, start.column
        ));

        let Some(text) = file.line(start.line) else {
            return;
        };
        let gutter = " ".repeat(start.line.to_string().len());
        let column = start.column.max(1) as usize;
        let width = if label.span.end.line == start.line {
            label.span.end.column.saturating_sub(start.column).max(1) as usize
        } else {
            text.len().saturating_sub(column - 1).max(1)
        };
        let marker = if label.primary { "^" } else { "-" };
        let marker_color = if label.primary { style.level } else { style.accent };

        out.push_str(&format!("{} {}|{}\n", gutter, style.accent, style.reset));
        out.push_str(&format!(
            "{}{} |{} {}\n",
            style.accent, start.line, style.reset, text
        ));
        out.push_str(&format!(
            "{} {}|{} {}{}{}{} {}\n",
            gutter,
            style.accent,
            style.reset,
            " ".repeat(column - 1),
            marker_color,
            marker.repeat(width),
            style.reset,
            label.message
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::UNDEFINED_FUNCTION.to_string(), "EG003");
        assert_eq!(ErrorCode::UNEXPECTED_CHAR.to_string(), "EL001");
        assert_eq!(ErrorCode::MALFORMED_FUNCTION.to_string(), "EV001");
    }

    #[test]
    fn test_render_without_colors() {
        let mut cache = SourceCache::new();
        let file = cache.add("demo.kl", "extern sin(x);\ndef main() foo()");
        let span = Span::new(Position::new(2, 12, 26), Position::new(2, 17, 31), file);

        let diagnostic = Diagnostic::error("unknown function referenced: `foo`")
            .with_code(ErrorCode::UNDEFINED_FUNCTION)
            .with_label(span, "called here")
            .with_help("declare it first with `extern foo(...)`");

        let output = DiagnosticRenderer::new(&cache).without_colors().render(&diagnostic);
        assert!(output.starts_with("error[EG003]: unknown function referenced: `foo`\n"));
        assert!(output.contains("demo.kl:2:12"));
        assert!(output.contains("2 | def main() foo()"));
        assert!(output.contains("^^^^^ called here"));
        assert!(output.contains("= help: declare it first"));
    }

    #[test]
    fn test_single_line_display() {
        let diagnostic = Diagnostic::warning("function `f` failed verification")
            .with_code(ErrorCode::MALFORMED_FUNCTION);
        assert_eq!(
            diagnostic.to_string(),
            "warning[EV001]: function `f` failed verification"
        );
        assert!(!diagnostic.is_error());
    }

    #[test]
    fn test_source_file_lines() {
        let file = SourceFile::new("a.kl", "global g;\n\ndef f() g");
        assert_eq!(file.line(1), Some("global g;"));
        assert_eq!(file.line(2), Some(""));
        assert_eq!(file.line(3), Some("def f() g"));
        assert_eq!(file.line(4), None);
        assert_eq!(file.line(0), None);
    }

    #[test]
    fn test_load_missing_file() {
        let mut cache = SourceCache::new();
        let err = cache
            .load(Path::new("/definitely/not/here.kl"))
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot read `/definitely/not/here.kl`"));
    }
}
