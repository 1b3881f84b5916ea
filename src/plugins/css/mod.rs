//! Style provider, run on the `<style>` fragment of a component.

mod service;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionContext, CodeActionKind, Color, ColorInformation,
    ColorPresentation, CompletionItem, CompletionItemKind, CompletionList, CompletionTextEdit,
    Diagnostic, DiagnosticSeverity, Documentation, FoldingRange, FoldingRangeKind, Hover,
    HoverContents, InsertTextFormat, Location, MarkupContent, MarkupKind, NumberOrString, Position,
    Range as LspRange, SelectionRange, SymbolInformation, SymbolKind, TextEdit, WorkspaceEdit,
};

use crate::document::{DocumentEvent, Phase, VersionedCache};
use crate::error::Result;
use crate::host::{Capability, PluginHandle, Provider, Section};
use crate::mapping::{Fragment, TextDocument};

pub use service::{parse, specificity, Declaration, Rule, Stylesheet, SyntaxError};

const CAPABILITIES: &[Capability] = &[
    Capability::Diagnostics,
    Capability::Hover,
    Capability::Completions,
    Capability::DocumentColors,
    Capability::ColorPresentations,
    Capability::DocumentSymbols,
    Capability::CodeActions,
    Capability::FoldingRanges,
    Capability::SelectionRanges,
];

const EMPTY_RULE: &str = "empty-rule";

fn code(diagnostic: &Diagnostic) -> Option<&str> {
    match &diagnostic.code {
        Some(NumberOrString::String(code)) => Some(code),
        _ => None,
    }
}

fn markdown(value: String) -> HoverContents {
    HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value,
    })
}

/// Span of the identifier-like word ending at `offset`.
fn word_before(text: &str, offset: usize) -> Range<usize> {
    let start = text[..offset]
        .rfind(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .map_or(0, |p| p + 1);
    start..offset
}

struct Candidate {
    label: String,
    kind: CompletionItemKind,
    description: Option<&'static str>,
    /// Properties are inserted as `name: $0;`.
    is_property: bool,
}

impl Candidate {
    fn value(label: &str, kind: CompletionItemKind) -> Self {
        Self {
            label: label.to_string(),
            kind,
            description: None,
            is_property: false,
        }
    }
}

fn contains(span: &Range<usize>, offset: usize) -> bool {
    span.start <= offset && offset <= span.end
}

/// CSS intelligence over a style fragment. Parsed stylesheets are cached per
/// document version.
#[derive(Default)]
pub struct CssProvider {
    stylesheets: Arc<VersionedCache<Stylesheet>>,
}

impl CssProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn stylesheet(&self, fragment: &Fragment) -> Arc<Stylesheet> {
        self.stylesheets
            .get_or_insert_with(fragment.uri(), fragment.version(), || parse(fragment.text()))
    }

    /// Preprocessor languages are parsed best effort and not validated.
    fn validates(fragment: &Fragment) -> bool {
        matches!(
            fragment.tag().attribute("lang").or(fragment.tag().attribute("type")),
            None | Some("css") | Some("text/css")
        )
    }

    /// Completion candidates for the block under `offset`, if any.
    fn completion_candidates(text: &str, sheet: &Stylesheet, offset: usize) -> Option<Vec<Candidate>> {
        let rule = sheet
            .rules_at(offset)
            .into_iter()
            .rev()
            .find(|rule| contains(&rule.body, offset))?;
        let segment_start = text[rule.body.start..offset]
            .rfind([';', '{', '}'])
            .map_or(rule.body.start, |p| rule.body.start + p + 1);
        let segment = &text[segment_start..offset];

        let items = match segment.find(':') {
            None => service::PROPERTIES
                .iter()
                .map(|(name, description)| Candidate {
                    label: name.to_string(),
                    kind: CompletionItemKind::PROPERTY,
                    description: Some(*description),
                    is_property: true,
                })
                .collect(),
            Some(colon) => {
                let property = segment[..colon].trim().to_ascii_lowercase();
                let keywords = service::keyword_values(&property)
                    .iter()
                    .chain(service::global_values())
                    .map(|v| Candidate::value(v, CompletionItemKind::VALUE));
                let colors = service::is_color_property(&property)
                    .then(service::named_colors)
                    .unwrap_or_default()
                    .iter()
                    .map(|v| Candidate::value(v, CompletionItemKind::COLOR));
                keywords.chain(colors).collect()
            }
        };
        Some(items)
    }

    fn selection_chain(sheet: &Stylesheet, len: usize, offset: usize) -> Vec<Range<usize>> {
        let mut spans = vec![0..len];
        let rules = sheet.rules_at(offset);
        for rule in &rules {
            spans.push(rule.span.clone());
            if contains(&rule.selector_span, offset) {
                spans.push(rule.selector_span.clone());
                break;
            }
            if contains(&rule.body, offset) {
                spans.push(rule.body.clone());
            }
        }
        if let Some(declaration) = rules
            .last()
            .and_then(|rule| rule.declarations.iter().find(|d| contains(&d.span, offset)))
        {
            spans.push(declaration.span.clone());
            if contains(&declaration.property_span, offset) {
                spans.push(declaration.property_span.clone());
            } else if contains(&declaration.value_span, offset) {
                spans.push(declaration.value_span.clone());
            }
        }
        spans.dedup();
        spans
    }
}

#[tower_lsp::async_trait]
impl Provider<Fragment> for CssProvider {
    fn name(&self) -> &'static str {
        "css"
    }

    fn section(&self) -> Section {
        Section::Css
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn on_register(&self, host: &dyn PluginHandle<Fragment>) {
        for event in [DocumentEvent::Open, DocumentEvent::Change] {
            let stylesheets = Arc::clone(&self.stylesheets);
            host.on(
                event,
                Phase::Main,
                Arc::new(move |fragment: &Fragment| {
                    stylesheets.get_or_insert_with(fragment.uri(), fragment.version(), || {
                        parse(fragment.text())
                    });
                }),
            );
        }
        let stylesheets = Arc::clone(&self.stylesheets);
        host.on(
            DocumentEvent::Close,
            Phase::Post,
            Arc::new(move |fragment: &Fragment| stylesheets.remove(fragment.uri())),
        );
    }

    async fn diagnostics(&self, fragment: &Fragment) -> Result<Vec<Diagnostic>> {
        if !Self::validates(fragment) {
            return Ok(Vec::new());
        }
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let diagnostic = |span: &Range<usize>, severity, code: &str, message: String| Diagnostic {
            range: index.span_to_range(span),
            severity: Some(severity),
            code: Some(NumberOrString::String(code.to_string())),
            source: Some("css".to_string()),
            message,
            ..Default::default()
        };

        let mut diagnostics: Vec<Diagnostic> = sheet
            .errors
            .iter()
            .map(|e| diagnostic(&e.span, DiagnosticSeverity::ERROR, "css-syntax", e.message.clone()))
            .collect();
        for rule in sheet.all_rules() {
            if rule.is_empty() {
                diagnostics.push(diagnostic(
                    &rule.span,
                    DiagnosticSeverity::WARNING,
                    EMPTY_RULE,
                    "Do not use empty rulesets".to_string(),
                ));
            }
            for declaration in &rule.declarations {
                if !service::is_known_property(&declaration.property) {
                    diagnostics.push(diagnostic(
                        &declaration.property_span,
                        DiagnosticSeverity::WARNING,
                        "unknown-property",
                        format!("Unknown property: '{}'", declaration.property),
                    ));
                }
            }
        }
        Ok(diagnostics)
    }

    async fn hover(&self, fragment: &Fragment, position: Position) -> Result<Option<Hover>> {
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let offset = fragment.offset_at(position);
        let Some(rule) = sheet.rules_at(offset).pop() else {
            return Ok(None);
        };

        if let Some(declaration) = rule
            .declarations
            .iter()
            .find(|d| contains(&d.property_span, offset))
        {
            let property = declaration.property.to_ascii_lowercase();
            return Ok(service::property_description(&property).map(|description| Hover {
                contents: markdown(format!("**{property}**\n\n{description}")),
                range: Some(index.span_to_range(&declaration.property_span)),
            }));
        }

        if rule.is_at_rule() || !contains(&rule.selector_span, offset) {
            return Ok(None);
        }
        // The comma-separated part of the selector list under the cursor.
        let mut start = rule.selector_span.start;
        for part in rule.selector.split(',') {
            let end = start + part.len();
            if offset <= end {
                let selector = part.trim();
                let (a, b, c) = specificity(selector);
                let span = (start + part.len() - part.trim_start().len())
                    ..(end - (part.len() - part.trim_end().len()));
                return Ok(Some(Hover {
                    contents: markdown(format!(
                        "```css\n{selector}\n```\n\n[Selector Specificity](https://developer.mozilla.org/docs/Web/CSS/Specificity): ({a}, {b}, {c})"
                    )),
                    range: Some(index.span_to_range(&span)),
                }));
            }
            start = end + 1;
        }
        Ok(None)
    }

    async fn completions(
        &self,
        fragment: &Fragment,
        position: Position,
        _trigger: Option<String>,
    ) -> Result<Option<CompletionList>> {
        let sheet = self.stylesheet(fragment);
        let text = fragment.text();
        let offset = fragment.offset_at(position);
        let Some(candidates) = Self::completion_candidates(text, &sheet, offset) else {
            return Ok(None);
        };
        let replace = fragment.line_index().span_to_range(&word_before(text, offset));

        let items = candidates
            .into_iter()
            .map(|candidate| {
                let (new_text, format) = if candidate.is_property {
                    (format!("{}: $0;", candidate.label), InsertTextFormat::SNIPPET)
                } else {
                    (candidate.label.clone(), InsertTextFormat::PLAIN_TEXT)
                };
                CompletionItem {
                    label: candidate.label,
                    kind: Some(candidate.kind),
                    documentation: candidate
                        .description
                        .map(|d| Documentation::String(d.to_string())),
                    insert_text_format: Some(format),
                    text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                        range: replace,
                        new_text,
                    })),
                    ..Default::default()
                }
            })
            .collect();
        Ok(Some(CompletionList {
            is_incomplete: false,
            items,
        }))
    }

    async fn document_colors(&self, fragment: &Fragment) -> Result<Vec<ColorInformation>> {
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let colors = sheet
            .all_rules()
            .into_iter()
            .flat_map(|rule| &rule.declarations)
            .flat_map(|declaration| {
                service::find_colors(&declaration.value)
                    .into_iter()
                    .map(move |(span, color)| {
                        let start = declaration.value_span.start;
                        ColorInformation {
                            range: index.span_to_range(&(start + span.start..start + span.end)),
                            color,
                        }
                    })
            })
            .collect();
        Ok(colors)
    }

    async fn color_presentations(
        &self,
        _fragment: &Fragment,
        range: LspRange,
        color: Color,
    ) -> Result<Vec<ColorPresentation>> {
        Ok(service::color_labels(&color)
            .into_iter()
            .map(|label| ColorPresentation {
                text_edit: Some(TextEdit {
                    range,
                    new_text: label.clone(),
                }),
                label,
                additional_text_edits: None,
            })
            .collect())
    }

    #[allow(deprecated)]
    async fn document_symbols(&self, fragment: &Fragment) -> Result<Vec<SymbolInformation>> {
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let mut symbols = Vec::new();
        fn walk(
            rules: &[Rule],
            container: Option<&str>,
            fragment: &Fragment,
            index: &crate::document::LineIndex,
            out: &mut Vec<SymbolInformation>,
        ) {
            for rule in rules {
                out.push(SymbolInformation {
                    name: rule.selector.clone(),
                    kind: if rule.is_at_rule() {
                        SymbolKind::MODULE
                    } else {
                        SymbolKind::CLASS
                    },
                    tags: None,
                    deprecated: None,
                    location: Location::new(fragment.uri().clone(), index.span_to_range(&rule.span)),
                    container_name: container.map(str::to_string),
                });
                walk(&rule.children, Some(&rule.selector), fragment, index, out);
            }
        }
        walk(&sheet.rules, None, fragment, index, &mut symbols);
        Ok(symbols)
    }

    async fn code_actions(
        &self,
        fragment: &Fragment,
        _range: LspRange,
        context: &CodeActionContext,
    ) -> Result<Vec<CodeAction>> {
        let actions = context
            .diagnostics
            .iter()
            .filter(|d| code(d) == Some(EMPTY_RULE))
            .map(|d| CodeAction {
                title: "Remove empty rule".to_string(),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![d.clone()]),
                edit: Some(WorkspaceEdit::new(HashMap::from([(
                    fragment.uri().clone(),
                    vec![TextEdit {
                        range: d.range,
                        new_text: String::new(),
                    }],
                )]))),
                ..Default::default()
            })
            .collect();
        Ok(actions)
    }

    async fn folding_ranges(&self, fragment: &Fragment) -> Result<Vec<FoldingRange>> {
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let line = |offset: usize| index.offset_to_position(offset).line;

        let rules = sheet.all_rules().into_iter().filter_map(|rule| {
            let (start, close) = (line(rule.span.start), line(rule.body.end));
            (close > start + 1).then(|| FoldingRange {
                start_line: start,
                end_line: close - 1,
                kind: Some(FoldingRangeKind::Region),
                ..Default::default()
            })
        });
        let comments = sheet.comments.iter().filter_map(|comment| {
            let (start, end) = (line(comment.start), line(comment.end));
            (end > start).then(|| FoldingRange {
                start_line: start,
                end_line: end,
                kind: Some(FoldingRangeKind::Comment),
                ..Default::default()
            })
        });

        let mut ranges: Vec<FoldingRange> = rules.chain(comments).collect();
        ranges.sort_by_key(|r| (r.start_line, r.end_line));
        Ok(ranges)
    }

    async fn selection_ranges(
        &self,
        fragment: &Fragment,
        positions: &[Position],
    ) -> Result<Option<Vec<SelectionRange>>> {
        let sheet = self.stylesheet(fragment);
        let index = fragment.line_index();
        let len = fragment.text().len();
        let ranges = positions
            .iter()
            .map(|position| {
                let offset = fragment.offset_at(*position);
                Self::selection_chain(&sheet, len, offset)
                    .into_iter()
                    .fold(None, |parent, span| {
                        Some(SelectionRange {
                            range: index.span_to_range(&span),
                            parent: parent.map(Box::new),
                        })
                    })
                    .unwrap_or(SelectionRange {
                        range: LspRange::new(*position, *position),
                        parent: None,
                    })
            })
            .collect();
        Ok(Some(ranges))
    }
}
