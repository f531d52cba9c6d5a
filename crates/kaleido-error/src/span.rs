//! Source locations.
//!
//! Every token carries a [`Span`]; the parser widens spans over the
//! declarations it builds so lowering failures can point back at the
//! offending `def`, `extern` or `global`.

/// A point in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed)
    pub column: u32,
    /// Byte offset from the beginning of the file
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// A half-open region `[start, end)` of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    /// Index of the file in a [`SourceCache`](crate::SourceCache)
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    pub fn point(pos: Position, file_id: u32) -> Self {
        Self::new(pos, pos, file_id)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id, "spans from different files");
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        Span::new(start, end, self.file_id)
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slices the covered text out of `source`.
    pub fn text<'s>(&self, source: &'s str) -> Option<&'s str> {
        source.get(self.start.offset..self.end.offset)
    }
}

/// Anything that knows where it came from.
pub trait Spanned {
    fn span(&self) -> Span;
}

impl Spanned for Span {
    fn span(&self) -> Span {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span::new(
            Position::new(1, start as u32 + 1, start),
            Position::new(1, end as u32 + 1, end),
            0,
        )
    }

    #[test]
    fn test_span_to_covers_both() {
        let merged = span(4, 7).to(span(0, 3));
        assert_eq!(merged.start.offset, 0);
        assert_eq!(merged.end.offset, 7);
        assert_eq!(merged.len(), 7);
    }

    #[test]
    fn test_span_text() {
        let source = "def f(x) x";
        assert_eq!(span(4, 5).text(source), Some("f"));
        assert_eq!(span(4, 40).text(source), None);
        assert!(span(3, 3).is_empty());
    }
}
