//! Extraction of embedded top-level blocks (`<script>`, `<style>`).
//!
//! A block only counts when it is real top-level markup: tags inside HTML
//! comments, inside `{#if}`/`{#each}`/`{#await}`/`{#key}` blocks, or inside a
//! `{@html ...}` string are ignored.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::Position;

use super::html::{matching_brace, parse_roots, Node};
use super::text::LineIndex;

/// Open/close marker pairs for control-flow blocks.
static CONTROL_FLOW_MARKERS: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    ["if", "each", "await", "key"]
        .iter()
        .map(|kind| {
            (
                Regex::new(&format!(r"\{{\s*#{kind}\b")).unwrap(),
                Regex::new(&format!(r"\{{\s*/{kind}\b")).unwrap(),
            )
        })
        .collect()
});

static RAW_HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\s*@html\b").unwrap());

/// Metadata for one extracted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Text between the open tag's `>` and the close tag's `<`.
    pub content: String,
    /// Attributes with quotes stripped. Boolean attributes map to their own name.
    pub attributes: HashMap<String, String>,
    /// Offset of the first content character.
    pub start: usize,
    /// Offset of the close tag's `<` (or the end of the document if unclosed).
    pub end: usize,
    pub start_pos: Position,
    pub end_pos: Position,
    /// Span of the whole element, tags included.
    pub container: Range<usize>,
}

impl TagInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether this is the module-level variant of a `<script>` block.
    pub fn is_module_script(&self) -> bool {
        self.attribute("context") == Some("module") || self.attributes.contains_key("module")
    }

    /// Whether `offset` lies within the content, both ends inclusive.
    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.start && offset <= self.end
    }
}

/// All top-level script and style blocks of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTags {
    pub scripts: Vec<TagInfo>,
    pub styles: Vec<TagInfo>,
}

impl DocumentTags {
    pub fn extract(text: &str, line_index: &LineIndex) -> Self {
        let blanked = blank_control_markers(text);
        let roots = parse_roots(&blanked);
        Self {
            scripts: collect_tags(text, &blanked, &roots, "script", line_index),
            styles: collect_tags(text, &blanked, &roots, "style", line_index),
        }
    }

    /// The canonical instance script. The first one wins.
    pub fn instance_script(&self) -> Option<&TagInfo> {
        self.scripts.iter().find(|tag| !tag.is_module_script())
    }

    /// The canonical module script. The first one wins.
    pub fn module_script(&self) -> Option<&TagInfo> {
        self.scripts.iter().find(|tag| tag.is_module_script())
    }

    pub fn style(&self) -> Option<&TagInfo> {
        self.styles.first()
    }
}

/// Extract every top-level occurrence of `tag` from `text`.
pub fn extract_tags(text: &str, tag: &str) -> Vec<TagInfo> {
    let blanked = blank_control_markers(text);
    let roots = parse_roots(&blanked);
    collect_tags(text, &blanked, &roots, tag, &LineIndex::new(text))
}

fn collect_tags(
    text: &str,
    blanked: &str,
    roots: &[Node],
    tag: &str,
    line_index: &LineIndex,
) -> Vec<TagInfo> {
    let tag = tag.to_ascii_lowercase();
    roots
        .iter()
        .enumerate()
        .filter(|(_, node)| node.tag == tag)
        .filter(|(index, _)| !inside_control_flow(blanked, roots, *index))
        .filter(|(index, _)| !inside_raw_html(blanked, roots, *index))
        .filter_map(|(_, node)| to_tag_info(text, node, line_index))
        .collect()
}

fn to_tag_info(text: &str, node: &Node, line_index: &LineIndex) -> Option<TagInfo> {
    let start = node.start_tag_end?;
    let end = node.end_tag_start.unwrap_or(node.end).max(start);

    let mut attributes = HashMap::new();
    for raw in &node.attributes {
        let value = match &raw.value {
            Some(value) => strip_quotes(value).to_string(),
            None => raw.name.clone(),
        };
        attributes.insert(raw.name.clone(), value);
    }

    Some(TagInfo {
        content: text.get(start..end)?.to_string(),
        attributes,
        start,
        end,
        start_pos: line_index.offset_to_position(start),
        end_pos: line_index.offset_to_position(end),
        container: node.start..node.end,
    })
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Root-level text following the node at `index`, with element bodies removed.
fn root_text_after(text: &str, roots: &[Node], index: usize) -> String {
    let nodes = &roots[index..];
    let mut out = String::new();
    for (i, node) in nodes.iter().enumerate() {
        let from = if node.start_tag_end.is_some() {
            node.end
        } else {
            node.start + node.tag.len()
        };
        let to = nodes.get(i + 1).map_or(text.len(), |next| next.start);
        if let Some(segment) = text.get(from.min(to)..to) {
            out.push_str(segment);
        }
    }
    out
}

/// Root-level text preceding the node at `index`, with element bodies removed.
fn root_text_before(text: &str, roots: &[Node], index: usize) -> String {
    let mut out = String::new();
    let mut from = 0;
    for node in &roots[..=index] {
        if let Some(segment) = text.get(from.min(node.start)..node.start) {
            out.push_str(segment);
        }
        from = node.end;
    }
    out
}

/// A tag is inside a control-flow block when, scanning forward through the
/// root-level text, the block's close marker shows up before any open marker.
fn inside_control_flow(text: &str, roots: &[Node], index: usize) -> bool {
    let after = root_text_after(text, roots, index);
    CONTROL_FLOW_MARKERS.iter().any(|(open, close)| {
        let open_at = open.find(&after).map_or(usize::MAX, |m| m.start());
        let close_at = close.find(&after).map_or(usize::MAX, |m| m.start());
        close_at < open_at
    })
}

/// A tag is inside `{@html ...}` when the last such marker before it was never
/// closed by a `}`.
fn inside_raw_html(text: &str, roots: &[Node], index: usize) -> bool {
    let before = root_text_before(text, roots, index);
    let Some(marker) = RAW_HTML_MARKER.find_iter(&before).last() else {
        return false;
    };
    !before[marker.end()..].contains('}')
}

/// Replace the expressions of `{#...}` and `{:...}` markers with spaces so that
/// operators like `<` are not read as tags. Keywords, braces, and newlines are
/// kept so that every offset stays valid.
pub fn blank_control_markers(text: &str) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] != b'{' || !matches!(bytes[i + 1], b'#' | b':') {
            i += 1;
            continue;
        }
        let Some(close) = matching_brace(text.as_bytes(), i) else {
            break;
        };
        let keyword_end = marker_keyword_end(text, i + 2, close);
        for byte in &mut bytes[keyword_end..close] {
            if *byte != b'\n' && *byte != b'\r' {
                *byte = b' ';
            }
        }
        i = close + 1;
    }
    // Only ASCII bytes were written over whole characters, so the result is valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// End of `if`, `each`, `else if` and similar keywords following `{#` or `{:`.
fn marker_keyword_end(text: &str, from: usize, limit: usize) -> usize {
    let word_end = |start: usize| {
        text[start..limit]
            .find(|c: char| !c.is_ascii_alphabetic())
            .map_or(limit, |p| start + p)
    };
    let end = word_end(from);
    if &text[from..end] == "else" {
        let rest = &text[end..limit];
        let trimmed = rest.trim_start();
        if trimmed.starts_with("if") {
            let if_start = end + (rest.len() - trimmed.len());
            return word_end(if_start);
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_style_with_offsets() {
        let text = "<h1>Hi</h1>\n<style>h1{color:blue}</style>";
        let tags = extract_tags(text, "style");
        assert_eq!(tags.len(), 1);
        let style = &tags[0];
        assert_eq!(style.content, "h1{color:blue}");
        assert_eq!(style.start, 19);
        assert_eq!(style.end, 33);
        assert_eq!(style.start_pos, Position::new(1, 7));
        assert_eq!(style.container, 12..41);
    }

    #[test]
    fn comment_hides_tag() {
        let text = "<!--<style>a{color:red}</style>-->\n<style>b{}</style>";
        let tags = extract_tags(text, "style");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].content, "b{}");
    }

    #[test]
    fn prefix_names_do_not_match() {
        assert!(extract_tags("<styles>a{}</styles>", "style").is_empty());
    }

    #[test]
    fn tag_inside_if_block_is_skipped() {
        let text = "{#if a < b}<style>a{}</style>{/if}";
        assert!(extract_tags(text, "style").is_empty());
    }

    #[test]
    fn tag_after_closed_block_is_kept() {
        let text = "{#if a < b}<style>a{}</style>{/if}\n<style>b{}</style>";
        let tags = extract_tags(text, "style");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].content, "b{}");
    }

    #[test]
    fn tag_inside_each_with_nested_if_is_skipped() {
        let text = "{#each items as item}{#if item}<p/>{/if}<style>a{}</style>{/each}";
        assert!(extract_tags(text, "style").is_empty());
    }

    #[test]
    fn tag_inside_raw_html_is_skipped() {
        let text = "{@html '<style>a{}</style>'}<style>b{}</style>";
        let tags = extract_tags(text, "style");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].content, "b{}");
    }

    #[test]
    fn attributes_are_unquoted_and_later_wins() {
        let text = r#"<script lang="js" context='module' lang="ts" defer>let a;</script>"#;
        let tag = &extract_tags(text, "script")[0];
        assert_eq!(tag.attribute("lang"), Some("ts"));
        assert_eq!(tag.attribute("context"), Some("module"));
        assert_eq!(tag.attribute("defer"), Some("defer"));
        assert!(tag.is_module_script());
    }

    #[test]
    fn canonical_scripts_are_partitioned() {
        let text = "<script context=\"module\">export const x = 1;</script>\n\
                    <script>let a;</script>\n<script>let b;</script>";
        let tags = DocumentTags::extract(text, &LineIndex::new(text));
        assert_eq!(tags.scripts.len(), 3);
        assert_eq!(tags.module_script().map(|t| t.content.as_str()), Some("export const x = 1;"));
        assert_eq!(tags.instance_script().map(|t| t.content.as_str()), Some("let a;"));
    }

    #[test]
    fn blanking_preserves_length_and_lines() {
        let text = "{#if a < b && c > d}\n{:else if x<y\n}{/if}";
        let blanked = blank_control_markers(text);
        assert_eq!(blanked.len(), text.len());
        let expected = format!(
            "{{#if{}}}\n{{:else if{}\n}}{{/if}}",
            " ".repeat(15),
            " ".repeat(4)
        );
        assert_eq!(blanked, expected);
        assert!(!blanked.contains('<'));
    }
}
