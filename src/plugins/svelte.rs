//! Markup provider: works on the whole component file.

use std::ops::Range;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, FoldingRange, FoldingRangeKind, FormattingOptions, Hover,
    HoverContents, MarkupContent, MarkupKind, NumberOrString, Position, TextEdit,
};

use crate::document::html::{parse_roots, VOID_ELEMENTS};
use crate::document::{blank_control_markers, Document, TagInfo};
use crate::error::Result;
use crate::host::{Capability, Provider, Section};
use crate::settings::{ConfigManager, WarningLevel};

static BLOCK_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\s*([#:/@])\s*([a-z]+)").unwrap());

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").unwrap());

static OPEN_TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<([A-Za-z][\w:.-]*)").unwrap());

const BLOCK_KINDS: &[&str] = &["if", "each", "await", "key", "snippet"];

const CAPABILITIES: &[Capability] = &[
    Capability::Diagnostics,
    Capability::Hover,
    Capability::Formatting,
    Capability::TagComplete,
    Capability::FoldingRanges,
];

/// A `{#if ...`, `{:else`, `{/if`, `{@html` style marker. The span ends after
/// the keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Marker {
    sigil: char,
    keyword: String,
    span: Range<usize>,
}

/// An opened control-flow block and its close marker, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    keyword: String,
    open: Range<usize>,
    close: Option<Range<usize>>,
}

fn markup_markers(text: &str) -> Vec<Marker> {
    let mut skipped: Vec<Range<usize>> = parse_roots(&blank_control_markers(text))
        .into_iter()
        .filter(|node| node.tag == "script" || node.tag == "style")
        .map(|node| node.start..node.end)
        .collect();
    skipped.extend(COMMENT.find_iter(text).map(|m| m.range()));

    BLOCK_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if skipped.iter().any(|r| r.contains(&whole.start())) {
                return None;
            }
            Some(Marker {
                sigil: caps.get(1)?.as_str().chars().next()?,
                keyword: caps.get(2)?.as_str().to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Pair open and close markers. A close marker also closes every block
/// opened after its partner; those stay unclosed. Stray closes are ignored.
fn pair_blocks(markers: &[Marker]) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    for marker in markers {
        match marker.sigil {
            '#' if BLOCK_KINDS.contains(&marker.keyword.as_str()) => {
                open.push(blocks.len());
                blocks.push(Block {
                    keyword: marker.keyword.clone(),
                    open: marker.span.clone(),
                    close: None,
                });
            }
            '/' => {
                if let Some(depth) = open
                    .iter()
                    .rposition(|&i| blocks[i].keyword == marker.keyword)
                {
                    blocks[open[depth]].close = Some(marker.span.clone());
                    open.truncate(depth);
                }
            }
            _ => {}
        }
    }
    blocks
}

fn marker_docs(sigil: char, keyword: &str) -> Option<&'static str> {
    Some(match (sigil, keyword) {
        ('#' | '/', "if") => "`{#if expression}...{:else if expression}...{:else}...{/if}`\n\nRenders content only when the condition is truthy.",
        ('#' | '/', "each") => "`{#each items as item, index (key)}...{:else}...{/each}`\n\nRenders content for every item of an iterable. `{:else}` renders when it is empty.",
        ('#' | '/', "await") => "`{#await promise}...{:then value}...{:catch error}...{/await}`\n\nRenders content for the pending, fulfilled and rejected states of a promise.",
        ('#' | '/', "key") => "`{#key expression}...{/key}`\n\nDestroys and recreates its content whenever the expression changes.",
        ('#' | '/', "snippet") => "`{#snippet name(params)}...{/snippet}`\n\nDeclares a reusable chunk of markup.",
        (':', "else") => "`{:else}`\n\nContent rendered when the preceding branch does not apply.",
        (':', "then") => "`{:then value}`\n\nContent rendered once the promise resolves.",
        (':', "catch") => "`{:catch error}`\n\nContent rendered if the promise rejects.",
        ('@', "html") => "`{@html expression}`\n\nInserts raw HTML. The string is not escaped or sanitized.",
        ('@', "debug") => "`{@debug var1, var2}`\n\nLogs the values whenever they change and pauses if devtools are open.",
        ('@', "const") => "`{@const name = expression}`\n\nDeclares a local constant inside a block.",
        ('@', "render") => "`{@render snippet(args)}`\n\nRenders a snippet.",
        _ => return None,
    })
}

/// The close tag to insert after an open tag that ends exactly at `offset`.
fn tag_to_close(text: &str, offset: usize) -> Option<String> {
    let before = text.get(..offset)?;
    if !before.ends_with('>') || before.ends_with("/>") {
        return None;
    }
    let tag_text = &before[before.rfind('<')?..];
    // `=>` inside an attribute expression is not the end of the tag.
    if tag_text.matches('{').count() != tag_text.matches('}').count() {
        return None;
    }
    let name = OPEN_TAG_NAME.captures(tag_text)?.get(1)?.as_str();
    if VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
        return None;
    }
    if text[offset..].trim_start().starts_with(&format!("</{name}")) {
        return None;
    }
    Some(format!("$0</{name}>"))
}

fn diagnostic(
    document: &Document,
    span: Range<usize>,
    severity: DiagnosticSeverity,
    code: &str,
    message: String,
) -> Diagnostic {
    Diagnostic {
        range: document.line_index().span_to_range(&span),
        severity: Some(severity),
        code: Some(NumberOrString::String(code.to_string())),
        code_description: None,
        source: Some("svelte".to_string()),
        message,
        related_information: None,
        tags: None,
        data: None,
    }
}

fn open_tag_span(tag: &TagInfo) -> Range<usize> {
    tag.container.start..tag.start
}

/// Markup-level intelligence: block markers, tag completion, layout.
pub struct SvelteProvider {
    config: Arc<ConfigManager>,
}

impl SvelteProvider {
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self { config }
    }

    fn duplicate_blocks(&self, document: &Document) -> Vec<Diagnostic> {
        let tags = document.tags();
        let instance = tags.scripts.iter().filter(|t| !t.is_module_script()).skip(1);
        let module = tags.scripts.iter().filter(|t| t.is_module_script()).skip(1);
        let styles = tags.styles.iter().skip(1);

        let warn = |tag: &TagInfo, message: &str| {
            diagnostic(
                document,
                open_tag_span(tag),
                DiagnosticSeverity::WARNING,
                "duplicate-block",
                message.to_string(),
            )
        };

        instance
            .map(|t| warn(t, "A component can only have one instance-level <script> element"))
            .chain(module.map(|t| {
                warn(t, "A component can only have one <script context=\"module\"> element")
            }))
            .chain(styles.map(|t| warn(t, "A component can only have one <style> element")))
            .collect()
    }

    fn unclosed_blocks(&self, document: &Document) -> Vec<Diagnostic> {
        pair_blocks(&markup_markers(document.text()))
            .into_iter()
            .filter(|block| block.close.is_none())
            .map(|block| {
                diagnostic(
                    document,
                    block.open,
                    DiagnosticSeverity::ERROR,
                    "unclosed-block",
                    format!("{{#{}}} block is never closed", block.keyword),
                )
            })
            .collect()
    }

    /// Drop or escalate diagnostics per `compilerWarnings`.
    fn apply_overrides(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        diagnostics
            .into_iter()
            .filter_map(|mut d| {
                let code = match &d.code {
                    Some(NumberOrString::String(code)) => code.as_str(),
                    _ => return Some(d),
                };
                match self.config.compiler_warning(code) {
                    Some(WarningLevel::Ignore) => None,
                    Some(WarningLevel::Error) => {
                        d.severity = Some(DiagnosticSeverity::ERROR);
                        Some(d)
                    }
                    None => Some(d),
                }
            })
            .collect()
    }
}

#[tower_lsp::async_trait]
impl Provider for SvelteProvider {
    fn name(&self) -> &'static str {
        "svelte"
    }

    fn section(&self) -> Section {
        Section::Svelte
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn diagnostics(&self, document: &Document) -> Result<Vec<Diagnostic>> {
        let mut diagnostics = self.duplicate_blocks(document);
        diagnostics.extend(self.unclosed_blocks(document));
        Ok(self.apply_overrides(diagnostics))
    }

    async fn hover(&self, document: &Document, position: Position) -> Result<Option<Hover>> {
        let offset = document.offset_at(position);
        let hover = markup_markers(document.text())
            .into_iter()
            .find(|m| m.span.start <= offset && offset <= m.span.end)
            .and_then(|marker| {
                let docs = marker_docs(marker.sigil, &marker.keyword)?;
                Some(Hover {
                    contents: HoverContents::Markup(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: docs.to_string(),
                    }),
                    range: Some(document.line_index().span_to_range(&marker.span)),
                })
            });
        Ok(hover)
    }

    async fn tag_complete(&self, document: &Document, position: Position) -> Result<Option<String>> {
        let offset = document.offset_at(position);
        let tags = document.tags();
        let in_embedded = tags
            .scripts
            .iter()
            .chain(&tags.styles)
            .any(|t| offset > t.start && offset <= t.end);
        if in_embedded {
            return Ok(None);
        }
        Ok(tag_to_close(document.text(), offset))
    }

    async fn folding_ranges(&self, document: &Document) -> Result<Vec<FoldingRange>> {
        let text = document.text();
        let index = document.line_index();
        let line = |offset: usize| index.offset_to_position(offset).line;
        let fold = |start: usize, close: usize| {
            let (start_line, close_line) = (line(start), line(close));
            (close_line > start_line + 1).then(|| FoldingRange {
                start_line,
                end_line: close_line - 1,
                kind: Some(FoldingRangeKind::Region),
                ..Default::default()
            })
        };

        let elements = parse_roots(&blank_control_markers(text))
            .into_iter()
            .filter_map(|node| fold(node.start, node.end_tag_start?));
        let blocks = pair_blocks(&markup_markers(text))
            .into_iter()
            .filter_map(|block| fold(block.open.start, block.close?.start));

        let mut ranges: Vec<FoldingRange> = elements.chain(blocks).collect();
        ranges.sort_by_key(|r| (r.start_line, r.end_line));
        Ok(ranges)
    }

    async fn format(
        &self,
        document: &Document,
        options: &FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>> {
        let text = document.text();
        let mut formatted: String = if options.trim_trailing_whitespace.unwrap_or(true) {
            text.split('\n')
                .map(|line| {
                    let (content, cr) = match line.strip_suffix('\r') {
                        Some(content) => (content, "\r"),
                        None => (line, ""),
                    };
                    format!("{}{}", content.trim_end_matches([' ', '\t']), cr)
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            text.to_string()
        };
        if options.trim_final_newlines.unwrap_or(true) {
            let trimmed = formatted.trim_end_matches(['\n', '\r']).len();
            let keep_one = formatted.len() > trimmed;
            formatted.truncate(trimmed);
            if keep_one {
                formatted.push('\n');
            }
        }
        if options.insert_final_newline.unwrap_or(true)
            && !formatted.is_empty()
            && !formatted.ends_with('\n')
        {
            formatted.push('\n');
        }

        if formatted == text {
            return Ok(Some(Vec::new()));
        }
        let index = document.line_index();
        Ok(Some(vec![TextEdit {
            range: index.span_to_range(&(0..text.len())),
            new_text: formatted,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConfigPatch;
    use tower_lsp::lsp_types::Url;

    fn provider() -> SvelteProvider {
        SvelteProvider::new(Arc::new(ConfigManager::default()))
    }

    fn document(text: &str) -> Document {
        Document::new(Url::parse("file:///App.svelte").unwrap(), text, 0)
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics
            .iter()
            .map(|d| match &d.code {
                Some(NumberOrString::String(code)) => code.clone(),
                _ => String::new(),
            })
            .collect()
    }

    #[test]
    fn blocks_pair_and_nest() {
        let text = "{#if a}{#each b as c}{/each}{/if}{/key}{#await p}";
        let blocks = pair_blocks(&markup_markers(text));
        let summary: Vec<(&str, bool)> = blocks
            .iter()
            .map(|b| (b.keyword.as_str(), b.close.is_some()))
            .collect();
        assert_eq!(summary, vec![("if", true), ("each", true), ("await", false)]);
    }

    #[test]
    fn markers_in_script_and_comments_are_ignored() {
        let text = "<script>let s = '{#if x}';</script>\n<!-- {#each} -->\n{@html h}";
        let markers = markup_markers(text);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].keyword, "html");
    }

    #[tokio::test]
    async fn reports_duplicate_and_unclosed_blocks() {
        let doc = document(
            "<script>a</script>\n<script>b</script>\n<style></style>\n<style></style>\n{#if x}\n<p></p>",
        );
        let diagnostics = provider().diagnostics(&doc).await.unwrap();
        assert_eq!(
            codes(&diagnostics),
            vec!["duplicate-block", "duplicate-block", "unclosed-block"]
        );
        assert_eq!(diagnostics[0].range.start, Position::new(1, 0));
        assert_eq!(diagnostics[0].range.end, Position::new(1, 8));
        assert_eq!(diagnostics[2].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostics[2].message, "{#if} block is never closed");
    }

    #[tokio::test]
    async fn module_and_instance_scripts_coexist() {
        let doc = document("<script context=\"module\">a</script>\n<script>b</script>");
        assert!(provider().diagnostics(&doc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compiler_warning_overrides() {
        let config = Arc::new(ConfigManager::default());
        let provider = SvelteProvider::new(Arc::clone(&config));
        let doc = document("<style></style><style></style>{#if x}");

        config.update(
            &ConfigPatch::from_client_settings(serde_json::json!({
                "svelte": { "compilerWarnings": { "duplicate-block": "error" } }
            }))
            .unwrap(),
        );
        let diagnostics = provider.diagnostics(&doc).await.unwrap();
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));

        config.update(
            &ConfigPatch::from_client_settings(serde_json::json!({
                "svelte": { "compilerWarnings": { "unclosed-block": "ignore" } }
            }))
            .unwrap(),
        );
        let diagnostics = provider.diagnostics(&doc).await.unwrap();
        assert_eq!(codes(&diagnostics), vec!["duplicate-block"]);
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
    }

    #[tokio::test]
    async fn hover_on_block_marker() {
        let doc = document("<p>{#each items as item}{item}{/each}</p>");
        let hover = provider()
            .hover(&doc, Position::new(0, 6))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            hover.range,
            Some(tower_lsp::lsp_types::Range::new(
                Position::new(0, 3),
                Position::new(0, 9)
            ))
        );
        match hover.contents {
            HoverContents::Markup(markup) => assert!(markup.value.starts_with("`{#each")),
            other => panic!("unexpected contents {other:?}"),
        }

        assert_eq!(provider().hover(&doc, Position::new(0, 20)).await.unwrap(), None);
    }

    #[test]
    fn closes_open_tags() {
        assert_eq!(tag_to_close("<div>", 5), Some("$0</div>".to_string()));
        assert_eq!(
            tag_to_close("<Button on:click={() => go()}>", 30),
            Some("$0</Button>".to_string())
        );
        assert_eq!(tag_to_close("<div class=\"a\">", 15), Some("$0</div>".to_string()));
        assert_eq!(tag_to_close("<br>", 4), None);
        assert_eq!(tag_to_close("<div/>", 6), None);
        assert_eq!(tag_to_close("</div>", 6), None);
        assert_eq!(tag_to_close("<div>\n</div>", 5), None);
        assert_eq!(tag_to_close("<a onclick={() =>", 17), None);
    }

    #[tokio::test]
    async fn no_tag_completion_inside_script() {
        let doc = document("<script>\nlet a = <b>\n</script>");
        let position = Position::new(1, 11);
        assert_eq!(provider().tag_complete(&doc, position).await.unwrap(), None);

        let doc = document("<main>");
        assert_eq!(
            provider().tag_complete(&doc, Position::new(0, 6)).await.unwrap(),
            Some("$0</main>".to_string())
        );
    }

    #[tokio::test]
    async fn folds_elements_and_blocks() {
        let doc = document("<script>\nlet a;\n</script>\n{#if a}\n<p>\nhi\n</p>\n{/if}\n");
        let ranges = provider().folding_ranges(&doc).await.unwrap();
        let lines: Vec<(u32, u32)> = ranges.iter().map(|r| (r.start_line, r.end_line)).collect();
        assert_eq!(lines, vec![(0, 1), (3, 6), (4, 5)]);
    }

    #[tokio::test]
    async fn formats_whitespace() {
        let doc = document("<p>hi</p>  \r\n<b></b>\t\n\n\n");
        let edits = provider()
            .format(&doc, &FormattingOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edits[0].new_text, "<p>hi</p>\r\n<b></b>\n");

        let clean = document("<p>hi</p>\n");
        let edits = provider()
            .format(&clean, &FormattingOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(edits.is_empty());
    }
}
