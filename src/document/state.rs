//! The in-memory representation of an open component file.

use std::sync::{Arc, OnceLock};

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use super::region::{DocumentTags, TagInfo};
use super::text::LineIndex;

/// An open document.
///
/// `version` is bumped on every mutation. The line index and the extracted
/// block metadata are derived lazily and dropped whenever the text changes.
#[derive(Debug, Clone)]
pub struct Document {
    uri: Url,
    language_id: String,
    text: Arc<str>,
    version: i32,
    /// Version number last reported by the editor.
    client_version: Option<i32>,
    opened_by_client: bool,
    line_index: OnceLock<Arc<LineIndex>>,
    tags: OnceLock<DocumentTags>,
}

impl Document {
    pub fn new(uri: Url, text: impl Into<Arc<str>>, version: i32) -> Self {
        Self {
            uri,
            language_id: "svelte".to_string(),
            text: text.into(),
            version,
            client_version: None,
            opened_by_client: false,
            line_index: OnceLock::new(),
            tags: OnceLock::new(),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn client_version(&self) -> Option<i32> {
        self.client_version
    }

    pub fn set_client_version(&mut self, version: i32) {
        self.client_version = Some(version);
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn set_language_id(&mut self, language_id: impl Into<String>) {
        self.language_id = language_id.into();
    }

    pub fn opened_by_client(&self) -> bool {
        self.opened_by_client
    }

    pub fn set_opened_by_client(&mut self, opened: bool) {
        self.opened_by_client = opened;
    }

    pub fn line_index(&self) -> &Arc<LineIndex> {
        self.line_index
            .get_or_init(|| Arc::new(LineIndex::new(Arc::clone(&self.text))))
    }

    /// Top-level blocks of this version of the text.
    pub fn tags(&self) -> &DocumentTags {
        self.tags
            .get_or_init(|| DocumentTags::extract(&self.text, self.line_index()))
    }

    pub fn script_info(&self) -> Option<&TagInfo> {
        self.tags().instance_script()
    }

    pub fn module_script_info(&self) -> Option<&TagInfo> {
        self.tags().module_script()
    }

    pub fn style_info(&self) -> Option<&TagInfo> {
        self.tags().style()
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index().offset_to_position(offset)
    }

    pub fn offset_at(&self, position: Position) -> usize {
        self.line_index().position_to_offset(position)
    }

    /// Replace the whole text.
    pub fn set_text(&mut self, text: impl Into<Arc<str>>) {
        self.text = text.into();
        self.invalidate();
    }

    /// Replace the bytes in `start..end` with `replacement`. Offsets are clamped.
    pub fn update(&mut self, replacement: &str, start: usize, end: usize) {
        let start = floor_boundary(&self.text, start);
        let end = floor_boundary(&self.text, end).max(start);
        let mut text = String::with_capacity(self.text.len() - (end - start) + replacement.len());
        text.push_str(&self.text[..start]);
        text.push_str(replacement);
        text.push_str(&self.text[end..]);
        self.set_text(text);
    }

    /// Apply one editor change event, ranged or full.
    pub fn apply_change(&mut self, change: &TextDocumentContentChangeEvent) {
        match change.range {
            Some(range) => {
                let start = self.offset_at(range.start);
                let end = self.offset_at(range.end);
                self.update(&change.text, start, end);
            }
            None => self.set_text(change.text.as_str()),
        }
    }

    fn invalidate(&mut self) {
        self.version += 1;
        self.line_index = OnceLock::new();
        self.tags = OnceLock::new();
    }
}

fn floor_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Range;

    fn doc(text: &str) -> Document {
        Document::new(Url::parse("file:///App.svelte").unwrap(), text, 0)
    }

    #[test]
    fn incremental_change_bumps_version_and_refreshes_tags() {
        let mut d = doc("<style>a{}</style>");
        assert_eq!(d.style_info().map(|t| t.content.clone()), Some("a{}".to_string()));

        d.apply_change(&TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 7), Position::new(0, 10))),
            range_length: None,
            text: "b{color:red}".to_string(),
        });

        assert_eq!(d.version(), 1);
        assert_eq!(d.text(), "<style>b{color:red}</style>");
        assert_eq!(
            d.style_info().map(|t| t.content.as_str()),
            Some("b{color:red}")
        );
    }

    #[test]
    fn full_change_replaces_text() {
        let mut d = doc("hello\nworld");
        assert_eq!(d.line_index().line_count(), 2);
        d.apply_change(&TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "one line".to_string(),
        });
        assert_eq!(d.text(), "one line");
        assert_eq!(d.line_index().line_count(), 1);
        assert_eq!(d.version(), 1);
    }

    #[test]
    fn update_clamps_offsets() {
        let mut d = doc("abc");
        d.update("!", 10, 20);
        assert_eq!(d.text(), "abc!");
        d.update("X", 2, 1);
        assert_eq!(d.text(), "abXc!");
    }

    #[test]
    fn scripts_are_split_by_context() {
        let d = doc("<script context=\"module\">a</script><script>b</script>");
        assert_eq!(d.module_script_info().map(|t| t.content.as_str()), Some("a"));
        assert_eq!(d.script_info().map(|t| t.content.as_str()), Some("b"));
    }
}
