use std::fmt;

/// Byte range inside a source file's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Self { start, end }
    }

    /// Span starting at `start` covering `length` bytes
    pub fn with_length(start: usize, length: usize) -> Self {
        Self::new(start, start + length)
    }

    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// 1-based line and 0-based column of `offset`, plus the full line's text
/// with trailing whitespace removed.
pub fn line_and_column(text: &str, offset: usize) -> (usize, usize, String) {
    let offset = offset.min(text.len());
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = text[..line_start].matches('\n').count() + 1;
    let column = text[line_start..offset].chars().count();
    let line_end = text[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(text.len());

    (line, column, text[line_start..line_end].trim_end().to_string())
}
