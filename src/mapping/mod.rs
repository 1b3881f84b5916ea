//! Coordinate mapping between a parent document and the fragments carved out
//! of it.
//!
//! A [`DocumentMapper`] translates positions between a "generated" space (the
//! fragment a language service sees) and the "original" space (the parent
//! document the editor sees). Three mappers exist:
//!
//! - [`IdentityMapper`]: both spaces are the same.
//! - [`FragmentMapper`]: the fragment is a contiguous slice of the parent.
//! - [`SourceMapDocumentMapper`]: the fragment is generated code tied to a
//!   slice by a source map, chained onto another mapper.

mod project;
mod source_map;

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Range, Url};

use crate::document::{Document, LineIndex, TagInfo};

pub use project::*;
pub use source_map::{
    decode_mappings, MappedRange, MappingsBuilder, Segment, SourceMapDocumentMapper,
};

/// The text+offset surface language services work against.
pub trait TextDocument {
    fn uri(&self) -> &Url;
    fn text(&self) -> &str;
    fn version(&self) -> i32;
    fn position_at(&self, offset: usize) -> Position;
    fn offset_at(&self, position: Position) -> usize;
}

impl TextDocument for Document {
    fn uri(&self) -> &Url {
        Document::uri(self)
    }

    fn text(&self) -> &str {
        Document::text(self)
    }

    fn version(&self) -> i32 {
        Document::version(self)
    }

    fn position_at(&self, offset: usize) -> Position {
        Document::position_at(self, offset)
    }

    fn offset_at(&self, position: Position) -> usize {
        Document::offset_at(self, position)
    }
}

/// Bidirectional position translation. Every method is total: input outside
/// the mapped space is clamped, never rejected.
pub trait DocumentMapper: Send + Sync {
    /// Generated (fragment) position to original (parent) position.
    fn to_original(&self, generated: Position) -> Position;

    /// Original (parent) position to generated (fragment) position.
    fn to_generated(&self, original: Position) -> Position;

    /// Whether an original position falls inside the generated space.
    fn is_in_generated(&self, original: Position) -> bool;

    /// URL of the generated document, used to tell local links from
    /// cross-file ones.
    fn generated_url(&self) -> Option<&Url>;

    fn range_to_original(&self, range: Range) -> Range {
        Range::new(self.to_original(range.start), self.to_original(range.end))
    }

    fn range_to_generated(&self, range: Range) -> Range {
        Range::new(self.to_generated(range.start), self.to_generated(range.end))
    }
}

/// Generated and original space are the same.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    url: Url,
}

impl IdentityMapper {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl DocumentMapper for IdentityMapper {
    fn to_original(&self, generated: Position) -> Position {
        generated
    }

    fn to_generated(&self, original: Position) -> Position {
        original
    }

    fn is_in_generated(&self, _original: Position) -> bool {
        true
    }

    fn generated_url(&self) -> Option<&Url> {
        Some(&self.url)
    }
}

/// The fragment is the text between `tag.start` and `tag.end` of the parent.
#[derive(Debug, Clone)]
pub struct FragmentMapper {
    parent: Arc<LineIndex>,
    fragment: Arc<LineIndex>,
    start: usize,
    end: usize,
    url: Url,
}

impl FragmentMapper {
    pub fn new(parent: Arc<LineIndex>, tag: &TagInfo, url: Url) -> Self {
        Self {
            fragment: Arc::new(LineIndex::new(tag.content.as_str())),
            parent,
            start: tag.start,
            end: tag.end,
            url,
        }
    }

    pub fn fragment_index(&self) -> &Arc<LineIndex> {
        &self.fragment
    }

    /// Fragment offset to parent offset.
    pub fn offset_to_original(&self, offset: usize) -> usize {
        self.start + offset.min(self.end - self.start)
    }

    /// Parent offset to fragment offset, clamped into the fragment.
    pub fn offset_to_generated(&self, offset: usize) -> usize {
        offset.clamp(self.start, self.end) - self.start
    }
}

impl DocumentMapper for FragmentMapper {
    fn to_original(&self, generated: Position) -> Position {
        let offset = self.fragment.position_to_offset(generated);
        self.parent
            .offset_to_position(self.offset_to_original(offset))
    }

    fn to_generated(&self, original: Position) -> Position {
        let offset = self.parent.position_to_offset(original);
        self.fragment
            .offset_to_position(self.offset_to_generated(offset))
    }

    fn is_in_generated(&self, original: Position) -> bool {
        let offset = self.parent.position_to_offset(original);
        offset >= self.start && offset <= self.end
    }

    fn generated_url(&self) -> Option<&Url> {
        Some(&self.url)
    }
}

/// A carved-out piece of a parent document with its own coordinate space.
#[derive(Clone)]
pub struct Fragment {
    url: Url,
    version: i32,
    tag: TagInfo,
    index: Arc<LineIndex>,
    mapper: Arc<dyn DocumentMapper>,
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("url", &self.url)
            .field("version", &self.version)
            .field("container", &self.tag.container)
            .finish_non_exhaustive()
    }
}

impl Fragment {
    /// A fragment holding the content of `tag` verbatim.
    pub fn from_tag(document: &Document, tag: &TagInfo) -> Self {
        let mapper = FragmentMapper::new(
            Arc::clone(document.line_index()),
            tag,
            document.uri().clone(),
        );
        Self {
            url: document.uri().clone(),
            version: document.version(),
            tag: tag.clone(),
            index: Arc::clone(mapper.fragment_index()),
            mapper: Arc::new(mapper),
        }
    }

    /// A fragment holding generated text, mapped back through `mapper`.
    pub fn generated(
        document: &Document,
        tag: &TagInfo,
        text: impl Into<Arc<str>>,
        mapper: Arc<dyn DocumentMapper>,
    ) -> Self {
        Self {
            url: document.uri().clone(),
            version: document.version(),
            tag: tag.clone(),
            index: Arc::new(LineIndex::new(text)),
            mapper,
        }
    }

    /// The block this fragment was carved from.
    pub fn tag(&self) -> &TagInfo {
        &self.tag
    }

    pub fn mapper(&self) -> &dyn DocumentMapper {
        self.mapper.as_ref()
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    /// Whether a parent position falls inside this fragment.
    pub fn is_in_fragment(&self, parent: Position) -> bool {
        self.mapper.is_in_generated(parent)
    }

    pub fn to_fragment(&self, parent: Position) -> Position {
        self.mapper.to_generated(parent)
    }

    pub fn to_parent(&self, position: Position) -> Position {
        self.mapper.to_original(position)
    }
}

impl TextDocument for Fragment {
    fn uri(&self) -> &Url {
        &self.url
    }

    fn text(&self) -> &str {
        self.index.source()
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn position_at(&self, offset: usize) -> Position {
        self.index.offset_to_position(offset)
    }

    fn offset_at(&self, position: Position) -> usize {
        self.index.position_to_offset(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "<h1>Hi</h1>\n<style>\nh1 {\n  color: blue;\n}\n</style>";

    fn style_fragment() -> (Document, Fragment) {
        let doc = Document::new(Url::parse("file:///App.svelte").unwrap(), TEXT, 0);
        let tag = doc.style_info().unwrap().clone();
        let fragment = Fragment::from_tag(&doc, &tag);
        (doc, fragment)
    }

    #[test]
    fn fragment_positions_round_trip() {
        let (doc, fragment) = style_fragment();
        let tag = fragment.tag().clone();
        for offset in tag.start..=tag.end {
            let parent = doc.position_at(offset);
            let local = fragment.to_fragment(parent);
            assert_eq!(fragment.to_parent(local), parent, "offset {offset}");
            assert_eq!(
                fragment.to_fragment(fragment.to_parent(local)),
                local,
                "offset {offset}"
            );
        }
    }

    #[test]
    fn fragment_translates_lines() {
        let (_, fragment) = style_fragment();
        // `color` sits on parent line 3, fragment line 2.
        assert_eq!(fragment.to_fragment(Position::new(3, 2)), Position::new(2, 2));
        assert_eq!(fragment.to_parent(Position::new(2, 2)), Position::new(3, 2));
        assert_eq!(fragment.text(), "\nh1 {\n  color: blue;\n}\n");
    }

    #[test]
    fn containment_is_inclusive() {
        let (doc, fragment) = style_fragment();
        let tag = fragment.tag();
        assert!(fragment.is_in_fragment(doc.position_at(tag.start)));
        assert!(fragment.is_in_fragment(doc.position_at(tag.end)));
        assert!(!fragment.is_in_fragment(doc.position_at(tag.start - 1)));
        assert!(!fragment.is_in_fragment(doc.position_at(tag.end + 1)));
    }

    #[test]
    fn outside_positions_clamp() {
        let (_, fragment) = style_fragment();
        assert_eq!(fragment.to_fragment(Position::new(0, 0)), Position::new(0, 0));
        let end = fragment.position_at(fragment.text().len());
        assert_eq!(fragment.to_fragment(Position::new(99, 0)), end);
    }

    #[test]
    fn identity_is_transparent() {
        let mapper = IdentityMapper::new(Url::parse("file:///a.svelte").unwrap());
        let p = Position::new(4, 2);
        assert_eq!(mapper.to_original(p), p);
        assert_eq!(mapper.to_generated(p), p);
        assert!(mapper.is_in_generated(Position::new(1000, 0)));
    }
}
