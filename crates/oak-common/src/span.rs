use serde::{Deserialize, Serialize};

/// A point in a source file: 1-based line/column plus 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// The source range a syntax node was parsed from.
///
/// Spans are produced by the external parser and only ever read here: both
/// back ends attach them to diagnostics so hosts can point at the offending
/// code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub file: String,
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(file: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }

    /// A zero-width span at `line:column` with no file attached.
    pub fn point(line: u32, column: u32) -> Self {
        let at = Position::new(line, column, 0);
        Self {
            file: String::new(),
            start: at,
            end: at,
        }
    }

    /// Span for nodes that were built programmatically rather than parsed.
    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        self.start == Position::default() && self.end == Position::default()
    }

    /// Byte range suitable for a diagnostic label; never empty.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        let start = self.start.offset as usize;
        let end = (self.end.offset as usize).max(start + 1);
        start..end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.file, self.start)
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
