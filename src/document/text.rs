//! Text utilities for position conversion.
//!
//! Offsets are byte offsets into the UTF-8 text. Positions follow the LSP
//! convention: zero-based line, column in UTF-16 code units.

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Range};

/// Compute the byte offset at which every line starts.
///
/// A line starts at offset 0 and right after `\n`, or after a `\r` that is
/// not followed by `\n`. `\r\n` counts as a single break.
pub fn line_offsets(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut offsets = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                offsets.push(i + 1);
            }
            b'\n' => offsets.push(i + 1),
            _ => {}
        }
        i += 1;
    }
    offsets
}

/// Convert a byte offset into a position. The offset is clamped to the text.
pub fn position_at(offset: usize, text: &str) -> Position {
    position_at_with(offset, text, &line_offsets(text))
}

/// Convert a position into a byte offset. Never fails: out-of-range lines
/// map to the end of the text, long columns to the end of their line.
pub fn offset_at(position: Position, text: &str) -> usize {
    offset_at_with(position, text, &line_offsets(text))
}

fn position_at_with(offset: usize, text: &str, line_starts: &[usize]) -> Position {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let line = match line_starts.binary_search(&offset) {
        Ok(line) => line,
        Err(line) => line.saturating_sub(1),
    };
    let line_start = line_starts[line];
    let character: usize = text[line_start..offset].chars().map(char::len_utf16).sum();

    Position::new(line as u32, character as u32)
}

fn offset_at_with(position: Position, text: &str, line_starts: &[usize]) -> usize {
    let line = position.line as usize;
    if line >= line_starts.len() {
        return text.len();
    }

    let line_start = line_starts[line];
    let line_end = content_end(text, line_starts.get(line + 1).copied());

    let mut utf16_col = 0u32;
    for (i, c) in text[line_start..line_end].char_indices() {
        if utf16_col >= position.character {
            return line_start + i;
        }
        utf16_col += c.len_utf16() as u32;
    }
    line_end
}

/// End of a line's content, excluding its line break.
fn content_end(text: &str, next_line_start: Option<usize>) -> usize {
    let Some(next) = next_line_start else {
        return text.len();
    };
    let bytes = text.as_bytes();
    let mut end = next;
    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && bytes[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// Pre-computed line index for repeated position lookups on one text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
    source: Arc<str>,
}

impl LineIndex {
    /// Build a line index from source text.
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        let source = source.into();
        Self {
            line_starts: line_offsets(&source),
            source,
        }
    }

    /// Get the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shared handle to the source text.
    pub fn shared_source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Convert a byte offset to an LSP position.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        position_at_with(offset, &self.source, &self.line_starts)
    }

    /// Convert an LSP position to a byte offset, clamping out-of-range input.
    pub fn position_to_offset(&self, position: Position) -> usize {
        offset_at_with(position, &self.source, &self.line_starts)
    }

    /// Convert a byte span to an LSP range.
    pub fn span_to_range(&self, span: &std::ops::Range<usize>) -> Range {
        Range::new(
            self.offset_to_position(span.start),
            self.offset_to_position(span.end),
        )
    }

    /// Convert an LSP range to a byte span.
    pub fn range_to_span(&self, range: Range) -> std::ops::Range<usize> {
        self.position_to_offset(range.start)..self.position_to_offset(range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_offsets_handles_all_break_styles() {
        assert_eq!(line_offsets(""), vec![0]);
        assert_eq!(line_offsets("a\nb"), vec![0, 2]);
        assert_eq!(line_offsets("a\r\nb"), vec![0, 3]);
        assert_eq!(line_offsets("a\rb"), vec![0, 2]);
        assert_eq!(line_offsets("a\n\r\nb\r"), vec![0, 2, 4, 6]);
    }

    #[test]
    fn multi_line() {
        let idx = LineIndex::new("hello\nworld\ntest");
        assert_eq!(idx.offset_to_position(0), Position::new(0, 0));
        assert_eq!(idx.offset_to_position(5), Position::new(0, 5));
        assert_eq!(idx.offset_to_position(6), Position::new(1, 0));
        assert_eq!(idx.offset_to_position(11), Position::new(1, 5));
        assert_eq!(idx.offset_to_position(12), Position::new(2, 0));
    }

    #[test]
    fn offsets_are_clamped() {
        let text = "hello\nworld";
        assert_eq!(position_at(100, text), Position::new(1, 5));
        assert_eq!(offset_at(Position::new(5, 0), text), text.len());
        // Long column on a short line stays on that line.
        assert_eq!(offset_at(Position::new(0, 40), text), 5);
        assert_eq!(offset_at(Position::new(0, 40), "ab\r\ncd"), 2);
    }

    #[test]
    fn utf16_handling() {
        // '😀' is 4 bytes in UTF-8 but 2 code units in UTF-16
        let idx = LineIndex::new("a😀b");
        assert_eq!(idx.offset_to_position(1), Position::new(0, 1));
        assert_eq!(idx.offset_to_position(5), Position::new(0, 3));
        assert_eq!(idx.position_to_offset(Position::new(0, 3)), 5);
        // Offsets inside the emoji snap to its start.
        assert_eq!(idx.offset_to_position(3), Position::new(0, 1));
    }

    #[test]
    fn round_trip_every_offset() {
        let text = "<h1>Hi</h1>\r\n<style>\n  h1 { color: blue }\r</style>\n";
        let idx = LineIndex::new(text);
        for offset in 0..=text.len() {
            // The byte between '\r' and '\n' is not addressable.
            if offset > 0 && &text[offset - 1..offset] == "\r" && text[offset..].starts_with('\n')
            {
                continue;
            }
            let position = idx.offset_to_position(offset);
            assert_eq!(idx.position_to_offset(position), offset, "offset {offset}");
        }
    }

    #[test]
    fn span_to_range() {
        let idx = LineIndex::new("hello\nworld");
        let range = idx.span_to_range(&(6..11));
        assert_eq!(range.start, Position::new(1, 0));
        assert_eq!(range.end, Position::new(1, 5));
        assert_eq!(idx.range_to_span(range), 6..11);
    }
}
