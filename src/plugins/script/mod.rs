//! Script provider, run on the program generated from the component's
//! `<script>` block.
//!
//! The generated program is a fragment whose mapper chains the transpiler's
//! source map onto the slice of the `<script>` block, so every position the
//! provider produces lands back in the component file.

mod transpile;

use std::ops::Range;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionTextEdit, Hover, HoverContents,
    Location, LocationLink, MarkupContent, MarkupKind, Position, SymbolInformation, SymbolKind,
    TextEdit,
};
use tracing::{debug, warn};

use crate::document::{Document, DocumentEvent, LineIndex, Phase, TagInfo, VersionedCache};
use crate::error::Result;
use crate::host::{wrap_fragment_provider, Capability, FragmentSelector, PluginHandle, Provider, Section};
use crate::mapping::{Fragment, FragmentMapper, SourceMapDocumentMapper, TextDocument};

pub use transpile::{ScriptTranspiler, TranspileOutput, HEADER};

const CAPABILITIES: &[Capability] = &[
    Capability::Hover,
    Capability::Completions,
    Capability::DocumentSymbols,
    Capability::Definitions,
];

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(let|const|var|function|class)\s+([A-Za-z_$][\w$]*)").unwrap()
});

type GeneratedCache = VersionedCache<Option<Fragment>>;

/// The script provider wired onto the generated program of each document.
pub fn script_provider() -> Arc<dyn Provider> {
    let selector = GeneratedScriptSelector::new();
    let provider = ScriptProvider::new(selector.cache());
    wrap_fragment_provider(provider, selector)
}

/// Selects the instance script (or, failing that, the module script) and
/// transpiles it. The result is cached per document version; a failed
/// transpile caches `None` so the next version retries.
#[derive(Default)]
pub struct GeneratedScriptSelector {
    transpiler: ScriptTranspiler,
    cache: Arc<GeneratedCache>,
}

impl GeneratedScriptSelector {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> Arc<GeneratedCache> {
        Arc::clone(&self.cache)
    }

    fn build(&self, document: &Document) -> Option<Fragment> {
        let tag = document
            .script_info()
            .or_else(|| document.module_script_info())?;
        match self.generate(document, tag) {
            Ok(fragment) => Some(fragment),
            Err(err) => {
                warn!(uri = %document.uri(), version = document.version(), error = %err, "omitting generated script");
                None
            }
        }
    }

    fn generate(&self, document: &Document, tag: &TagInfo) -> Result<Fragment> {
        let output = self.transpiler.transpile(&tag.content)?;
        let slice = FragmentMapper::new(
            Arc::clone(document.line_index()),
            tag,
            document.uri().clone(),
        );
        let generated = Arc::new(LineIndex::new(output.code));
        let mapper = SourceMapDocumentMapper::new(
            Arc::clone(&generated),
            Arc::clone(slice.fragment_index()),
            &output.mappings,
            Arc::new(slice),
        )?;
        debug!(uri = %document.uri(), version = document.version(), "generated script");
        Ok(Fragment::generated(
            document,
            tag,
            generated.shared_source(),
            Arc::new(mapper),
        ))
    }
}

impl FragmentSelector for GeneratedScriptSelector {
    fn select(&self, document: &Document) -> Option<Fragment> {
        let fragment = self
            .cache
            .get_or_insert_with(document.uri(), document.version(), || self.build(document));
        (*fragment).clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclarationKind {
    Let,
    Const,
    Var,
    Function,
    Class,
}

impl DeclarationKind {
    fn parse(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "let" => Self::Let,
            "const" => Self::Const,
            "var" => Self::Var,
            "function" => Self::Function,
            "class" => Self::Class,
            _ => return None,
        })
    }

    fn symbol_kind(self) -> SymbolKind {
        match self {
            Self::Let | Self::Var => SymbolKind::VARIABLE,
            Self::Const => SymbolKind::CONSTANT,
            Self::Function => SymbolKind::FUNCTION,
            Self::Class => SymbolKind::CLASS,
        }
    }

    fn completion_kind(self) -> CompletionItemKind {
        match self {
            Self::Let | Self::Var => CompletionItemKind::VARIABLE,
            Self::Const => CompletionItemKind::CONSTANT,
            Self::Function => CompletionItemKind::FUNCTION,
            Self::Class => CompletionItemKind::CLASS,
        }
    }
}

/// A top-level-looking declaration in the generated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    kind: DeclarationKind,
    name: String,
    /// Span of the name.
    name_span: Range<usize>,
    /// Span from the keyword to the end of its line.
    span: Range<usize>,
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier_at(text: &str, offset: usize) -> Option<Range<usize>> {
    let start = text[..offset]
        .rfind(|c: char| !is_identifier_char(c))
        .map_or(0, |p| p + 1);
    let end = text[offset..]
        .find(|c: char| !is_identifier_char(c))
        .map_or(text.len(), |p| offset + p);
    (start < end).then_some(start..end)
}

/// Declarations outside of line comments, in source order.
fn declarations(text: &str) -> Vec<Declaration> {
    DECLARATION
        .captures_iter(text)
        .filter_map(|caps| {
            let keyword = caps.get(1)?;
            let name = caps.get(2)?;
            let line_start = text[..keyword.start()].rfind('\n').map_or(0, |p| p + 1);
            if text[line_start..keyword.start()].contains("//") {
                return None;
            }
            let line_end = text[keyword.start()..]
                .find('\n')
                .map_or(text.len(), |p| keyword.start() + p);
            Some(Declaration {
                kind: DeclarationKind::parse(keyword.as_str())?,
                name: name.as_str().to_string(),
                name_span: name.range(),
                span: keyword.start()..line_end,
            })
        })
        .collect()
}

/// Declaration intelligence over the generated program.
pub struct ScriptProvider {
    declarations: Arc<VersionedCache<Vec<Declaration>>>,
    generated: Arc<GeneratedCache>,
}

impl ScriptProvider {
    fn new(generated: Arc<GeneratedCache>) -> Self {
        Self {
            declarations: Arc::new(VersionedCache::new()),
            generated,
        }
    }

    fn declarations(&self, fragment: &Fragment) -> Arc<Vec<Declaration>> {
        self.declarations
            .get_or_insert_with(fragment.uri(), fragment.version(), || {
                declarations(fragment.text())
            })
    }

    /// The identifier under `position` and the declaration it names.
    fn resolve(&self, fragment: &Fragment, position: Position) -> Option<(Range<usize>, Declaration)> {
        let text = fragment.text();
        let word = identifier_at(text, fragment.offset_at(position))?;
        let declaration = self
            .declarations(fragment)
            .iter()
            .find(|d| d.name == text[word.clone()])
            .cloned()?;
        Some((word, declaration))
    }
}

#[tower_lsp::async_trait]
impl Provider<Fragment> for ScriptProvider {
    fn name(&self) -> &'static str {
        "script"
    }

    fn section(&self) -> Section {
        Section::Typescript
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn on_register(&self, host: &dyn PluginHandle<Fragment>) {
        let declarations = Arc::clone(&self.declarations);
        let generated = Arc::clone(&self.generated);
        host.on(
            DocumentEvent::Close,
            Phase::Post,
            Arc::new(move |fragment: &Fragment| {
                declarations.remove(fragment.uri());
                generated.remove(fragment.uri());
            }),
        );
    }

    async fn hover(&self, fragment: &Fragment, position: Position) -> Result<Option<Hover>> {
        let Some((word, declaration)) = self.resolve(fragment, position) else {
            return Ok(None);
        };
        let statement = fragment.text()[declaration.span].trim_end();
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```ts\n{statement}\n```"),
            }),
            range: Some(fragment.line_index().span_to_range(&word)),
        }))
    }

    async fn completions(
        &self,
        fragment: &Fragment,
        position: Position,
        trigger: Option<String>,
    ) -> Result<Option<CompletionList>> {
        // Member access needs type information.
        if trigger.as_deref() == Some(".") {
            return Ok(None);
        }
        let text = fragment.text();
        let offset = fragment.offset_at(position);
        let start = text[..offset]
            .rfind(|c: char| !is_identifier_char(c))
            .map_or(0, |p| p + 1);
        let prefix = &text[start..offset];
        let range = fragment.line_index().span_to_range(&(start..offset));

        let mut items: Vec<CompletionItem> = Vec::new();
        for declaration in self.declarations(fragment).iter() {
            if !declaration.name.starts_with(prefix)
                || items.iter().any(|item| item.label == declaration.name)
            {
                continue;
            }
            items.push(CompletionItem {
                label: declaration.name.clone(),
                kind: Some(declaration.kind.completion_kind()),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                    range,
                    new_text: declaration.name.clone(),
                })),
                ..Default::default()
            });
        }

        Ok(Some(CompletionList {
            is_incomplete: false,
            items,
        }))
    }

    async fn document_symbols(&self, fragment: &Fragment) -> Result<Vec<SymbolInformation>> {
        let index = fragment.line_index();
        #[allow(deprecated)]
        let symbols = self
            .declarations(fragment)
            .iter()
            .map(|declaration| SymbolInformation {
                name: declaration.name.clone(),
                kind: declaration.kind.symbol_kind(),
                tags: None,
                deprecated: None,
                location: Location::new(
                    fragment.uri().clone(),
                    index.span_to_range(&declaration.name_span),
                ),
                container_name: None,
            })
            .collect();
        Ok(symbols)
    }

    async fn definitions(&self, fragment: &Fragment, position: Position) -> Result<Vec<LocationLink>> {
        let Some((word, declaration)) = self.resolve(fragment, position) else {
            return Ok(Vec::new());
        };
        let index = fragment.line_index();
        Ok(vec![LocationLink {
            origin_selection_range: Some(index.span_to_range(&word)),
            target_uri: fragment.uri().clone(),
            target_range: index.span_to_range(&declaration.span),
            target_selection_range: index.span_to_range(&declaration.name_span),
        }])
    }
}
