//! Source-map backed position mapping for generated code.
//!
//! The `mappings` field of a v3 source map is decoded into per-line segments,
//! then coalesced into ranges where generated and original text are
//! byte-identical. Inside such a range translation is exact; elsewhere a
//! position snaps to the nearest preceding mapped segment.

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Url};

use super::DocumentMapper;
use crate::document::LineIndex;
use crate::error::{Error, Result};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// One decoded segment. Lines and columns are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_column: u32,
    /// `(line, column)` in the original text; `None` for unmapped code.
    pub source: Option<(u32, u32)>,
}

/// A span where generated and original text are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    pub generated: usize,
    pub original: usize,
    pub len: usize,
}

impl MappedRange {
    fn contains_generated(&self, offset: usize) -> bool {
        offset >= self.generated && offset <= self.generated + self.len
    }

    fn contains_original(&self, offset: usize) -> bool {
        offset >= self.original && offset <= self.original + self.len
    }
}

fn base64_value(byte: u8) -> Option<i64> {
    BASE64.iter().position(|&b| b == byte).map(|v| v as i64)
}

fn decode_vlq(field: &[u8], values: &mut Vec<i64>) -> Result<()> {
    let mut value = 0i64;
    let mut shift = 0u32;
    for &byte in field {
        let digit = base64_value(byte)
            .ok_or_else(|| Error::SourceMap(format!("invalid base64 digit `{}`", byte as char)))?;
        if shift > 60 {
            return Err(Error::SourceMap("VLQ value overflows".to_string()));
        }
        value += (digit & 31) << shift;
        if digit & 32 != 0 {
            shift += 5;
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }
    if shift != 0 {
        return Err(Error::SourceMap("truncated VLQ value".to_string()));
    }
    Ok(())
}

fn non_negative(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::SourceMap(format!("negative {what}: {value}")))
}

/// Decode a `mappings` string into one segment list per generated line.
pub fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>> {
    let mut lines = Vec::new();
    // Source fields are relative to the previous segment across the whole map.
    let (mut source_index, mut source_line, mut source_column) = (0i64, 0i64, 0i64);

    for line in mappings.split(';') {
        let mut segments = Vec::new();
        let mut generated_column = 0i64;
        let mut values = Vec::with_capacity(5);

        for field in line.split(',').filter(|f| !f.is_empty()) {
            values.clear();
            decode_vlq(field.as_bytes(), &mut values)?;
            generated_column += values[0];
            let source = match values.len() {
                1 => None,
                4 | 5 => {
                    source_index += values[1];
                    source_line += values[2];
                    source_column += values[3];
                    non_negative(source_index, "source index")?;
                    Some((
                        non_negative(source_line, "source line")?,
                        non_negative(source_column, "source column")?,
                    ))
                }
                n => return Err(Error::SourceMap(format!("segment with {n} fields"))),
            };
            segments.push(Segment {
                generated_column: non_negative(generated_column, "generated column")?,
                source,
            });
        }

        segments.sort_by_key(|s| s.generated_column);
        lines.push(segments);
    }

    Ok(lines)
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = vlq & 31;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 32;
        }
        out.push(BASE64[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Incrementally encodes a single-source `mappings` string.
#[derive(Debug, Default)]
pub struct MappingsBuilder {
    out: String,
    line: u32,
    line_has_segment: bool,
    generated_column: i64,
    source_line: i64,
    source_column: i64,
}

impl MappingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a segment. Segments must be added in generated order.
    pub fn add(&mut self, generated: Position, source: Option<Position>) {
        while self.line < generated.line {
            self.out.push(';');
            self.line += 1;
            self.line_has_segment = false;
            self.generated_column = 0;
        }
        if self.line_has_segment {
            self.out.push(',');
        }
        self.line_has_segment = true;

        encode_vlq(generated.character as i64 - self.generated_column, &mut self.out);
        self.generated_column = generated.character as i64;

        if let Some(source) = source {
            encode_vlq(0, &mut self.out);
            encode_vlq(source.line as i64 - self.source_line, &mut self.out);
            encode_vlq(source.character as i64 - self.source_column, &mut self.out);
            self.source_line = source.line as i64;
            self.source_column = source.character as i64;
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[derive(Debug, Clone, Copy)]
struct MappedPoint {
    generated: usize,
    original: usize,
}

/// Maps generated code back to the fragment it was produced from, then through
/// `parent` to the document the editor sees.
pub struct SourceMapDocumentMapper {
    generated: Arc<LineIndex>,
    original: Arc<LineIndex>,
    parent: Arc<dyn DocumentMapper>,
    /// Mapped segments in generated order.
    points: Vec<MappedPoint>,
    ranges: Vec<MappedRange>,
}

impl std::fmt::Debug for SourceMapDocumentMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMapDocumentMapper")
            .field("points", &self.points.len())
            .field("ranges", &self.ranges)
            .finish_non_exhaustive()
    }
}

impl SourceMapDocumentMapper {
    /// Build a mapper from a `mappings` string. `generated` is the generated
    /// text and `original` the text the map points into.
    pub fn new(
        generated: Arc<LineIndex>,
        original: Arc<LineIndex>,
        mappings: &str,
        parent: Arc<dyn DocumentMapper>,
    ) -> Result<Self> {
        let lines = decode_mappings(mappings)?;
        let (points, ranges) = coalesce(&lines, &generated, &original);
        Ok(Self {
            generated,
            original,
            parent,
            points,
            ranges,
        })
    }

    pub fn ranges(&self) -> &[MappedRange] {
        &self.ranges
    }

    /// Generated offset to original offset.
    pub fn offset_to_original(&self, offset: usize) -> usize {
        let index = self.ranges.partition_point(|r| r.generated <= offset);
        if let Some(range) = index.checked_sub(1).map(|i| self.ranges[i]) {
            if range.contains_generated(offset) {
                return range.original + (offset - range.generated);
            }
        }

        let index = self.points.partition_point(|p| p.generated <= offset);
        index
            .checked_sub(1)
            .or(if self.points.is_empty() { None } else { Some(0) })
            .map_or(0, |i| self.points[i].original)
    }

    /// Original offset to generated offset.
    pub fn offset_to_generated(&self, offset: usize) -> usize {
        if let Some(range) = self.ranges.iter().find(|r| r.contains_original(offset)) {
            return range.generated + (offset - range.original);
        }

        let preceding = self
            .points
            .iter()
            .filter(|p| p.original <= offset)
            .fold(None::<MappedPoint>, |best, p| match best {
                Some(b) if b.original >= p.original => Some(b),
                _ => Some(*p),
            });
        preceding
            .or_else(|| self.points.first().copied())
            .map_or(0, |p| p.generated)
    }
}

impl DocumentMapper for SourceMapDocumentMapper {
    fn to_original(&self, generated: Position) -> Position {
        let offset = self.generated.position_to_offset(generated);
        let original = self
            .original
            .offset_to_position(self.offset_to_original(offset));
        self.parent.to_original(original)
    }

    fn to_generated(&self, original: Position) -> Position {
        let local = self.parent.to_generated(original);
        let offset = self.original.position_to_offset(local);
        self.generated
            .offset_to_position(self.offset_to_generated(offset))
    }

    fn is_in_generated(&self, original: Position) -> bool {
        self.parent.is_in_generated(original)
    }

    fn generated_url(&self) -> Option<&Url> {
        self.parent.generated_url()
    }
}

/// Resolve segments to offsets and merge runs of identical text.
fn coalesce(
    lines: &[Vec<Segment>],
    generated: &LineIndex,
    original: &LineIndex,
) -> (Vec<MappedPoint>, Vec<MappedRange>) {
    let generated_text = generated.source().as_bytes();
    let original_text = original.source().as_bytes();
    let mut points = Vec::new();
    let mut ranges: Vec<MappedRange> = Vec::new();

    for (line, segments) in lines.iter().enumerate() {
        if line >= generated.line_count() {
            break;
        }
        let line_end = generated
            .line_starts()
            .get(line + 1)
            .copied()
            .unwrap_or(generated_text.len());

        for (i, segment) in segments.iter().enumerate() {
            let Some((source_line, source_column)) = segment.source else {
                continue;
            };
            let g = generated.position_to_offset(Position::new(line as u32, segment.generated_column));
            let o = original.position_to_offset(Position::new(source_line, source_column));
            points.push(MappedPoint {
                generated: g,
                original: o,
            });

            let limit = segments
                .get(i + 1)
                .map(|next| {
                    generated.position_to_offset(Position::new(line as u32, next.generated_column))
                })
                .unwrap_or(line_end)
                .max(g);
            let len = generated_text[g..limit]
                .iter()
                .zip(original_text.get(o..).unwrap_or_default())
                .take_while(|(a, b)| a == b)
                .count();
            let len = floor_char_boundary(generated.source(), g + len) - g;

            match ranges.last_mut() {
                Some(prev) if prev.generated + prev.len == g && prev.original + prev.len == o => {
                    prev.len += len;
                }
                _ => ranges.push(MappedRange {
                    generated: g,
                    original: o,
                    len,
                }),
            }
        }
    }

    (points, ranges)
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
