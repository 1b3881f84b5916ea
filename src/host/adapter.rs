//! Runs a fragment-shaped provider against whole documents.
//!
//! [`FragmentAdapter`] resolves the fragment for each request, translates the
//! request's positions into fragment space, delegates, and maps the result
//! back. Documents without a fragment, and positions outside it, short-circuit
//! to the capability's empty value without calling the inner provider.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionContext, Color, ColorInformation, ColorPresentation, CompletionList,
    Diagnostic, FileEvent, FoldingRange, FormattingOptions, Hover, LocationLink, Position, Range,
    SelectionRange, SymbolInformation, TextEdit, Url,
};

use super::{Capability, PluginHandle, Provider, Section};
use crate::document::{Document, DocumentEvent, Listener, Phase};
use crate::error::Result;
use crate::mapping::{self, Fragment};

/// Picks the fragment a provider works on out of a parent document.
pub trait FragmentSelector: Send + Sync + 'static {
    fn select(&self, document: &Document) -> Option<Fragment>;
}

impl<F> FragmentSelector for F
where
    F: Fn(&Document) -> Option<Fragment> + Send + Sync + 'static,
{
    fn select(&self, document: &Document) -> Option<Fragment> {
        self(document)
    }
}

/// Selects the canonical `<style>` block verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleSelector;

impl FragmentSelector for StyleSelector {
    fn select(&self, document: &Document) -> Option<Fragment> {
        document
            .style_info()
            .map(|tag| Fragment::from_tag(document, tag))
    }
}

/// A provider over documents, built from a provider over fragments.
pub struct FragmentAdapter<P, S> {
    inner: P,
    selector: Arc<S>,
}

impl<P, S> FragmentAdapter<P, S> {
    pub fn new(inner: P, selector: S) -> Self {
        Self {
            inner,
            selector: Arc::new(selector),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P, S: FragmentSelector> FragmentAdapter<P, S> {
    fn fragment(&self, document: &Document) -> Option<Fragment> {
        self.selector.select(document)
    }

    /// The fragment, only if `position` falls inside it.
    fn fragment_at(&self, document: &Document, position: Position) -> Option<Fragment> {
        self.fragment(document)
            .filter(|fragment| fragment.is_in_fragment(position))
    }
}

/// Wrap `provider` so it sees the fragment chosen by `selector`.
pub fn wrap_fragment_provider<P, S>(provider: P, selector: S) -> Arc<dyn Provider>
where
    P: Provider<Fragment> + 'static,
    S: FragmentSelector,
{
    Arc::new(FragmentAdapter::new(provider, selector))
}

/// Registration handle that turns document events into fragment events.
struct FragmentHandle<'a, S> {
    host: &'a dyn PluginHandle<Document>,
    selector: Arc<S>,
}

impl<S: FragmentSelector> PluginHandle<Fragment> for FragmentHandle<'_, S> {
    fn on(&self, event: DocumentEvent, phase: Phase, listener: Listener<Fragment>) {
        let selector = Arc::clone(&self.selector);
        let wrapped: Listener<Document> = Arc::new(move |document: &Document| {
            if let Some(fragment) = selector.select(document) {
                listener(&fragment);
            }
        });
        self.host.on(event, phase, wrapped);
    }

    fn open_virtual_document(&self, uri: Url, text: String) -> Arc<Document> {
        self.host.open_virtual_document(uri, text)
    }

    fn lock_document(&self, uri: &Url) {
        self.host.lock_document(uri);
    }
}

#[tower_lsp::async_trait]
impl<P, S> Provider<Document> for FragmentAdapter<P, S>
where
    P: Provider<Fragment>,
    S: FragmentSelector,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn section(&self) -> Section {
        self.inner.section()
    }

    fn capabilities(&self) -> &[Capability] {
        self.inner.capabilities()
    }

    fn on_register(&self, host: &dyn PluginHandle<Document>) {
        let handle = FragmentHandle {
            host,
            selector: Arc::clone(&self.selector),
        };
        self.inner.on_register(&handle);
    }

    async fn diagnostics(&self, document: &Document) -> Result<Vec<Diagnostic>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(Vec::new());
        };
        let diagnostics = self.inner.diagnostics(&fragment).await?;
        Ok(diagnostics
            .into_iter()
            .map(|d| mapping::map_diagnostic_to_original(fragment.mapper(), d))
            .collect())
    }

    async fn hover(&self, document: &Document, position: Position) -> Result<Option<Hover>> {
        let Some(fragment) = self.fragment_at(document, position) else {
            return Ok(None);
        };
        let hover = self
            .inner
            .hover(&fragment, fragment.to_fragment(position))
            .await?;
        Ok(hover.map(|h| mapping::map_hover_to_original(fragment.mapper(), h)))
    }

    async fn completions(
        &self,
        document: &Document,
        position: Position,
        trigger: Option<String>,
    ) -> Result<Option<CompletionList>> {
        let Some(fragment) = self.fragment_at(document, position) else {
            return Ok(None);
        };
        let list = self
            .inner
            .completions(&fragment, fragment.to_fragment(position), trigger)
            .await?;
        Ok(list.map(|l| mapping::map_completion_list_to_original(fragment.mapper(), l)))
    }

    async fn format(
        &self,
        document: &Document,
        options: &FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(None);
        };
        let edits = self.inner.format(&fragment, options).await?;
        Ok(edits.map(|edits| {
            edits
                .into_iter()
                .map(|e| mapping::map_text_edit_to_original(fragment.mapper(), e))
                .collect()
        }))
    }

    async fn tag_complete(&self, document: &Document, position: Position) -> Result<Option<String>> {
        let Some(fragment) = self.fragment_at(document, position) else {
            return Ok(None);
        };
        self.inner
            .tag_complete(&fragment, fragment.to_fragment(position))
            .await
    }

    async fn document_colors(&self, document: &Document) -> Result<Vec<ColorInformation>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(Vec::new());
        };
        let colors = self.inner.document_colors(&fragment).await?;
        Ok(colors
            .into_iter()
            .map(|c| mapping::map_color_information_to_original(fragment.mapper(), c))
            .collect())
    }

    async fn color_presentations(
        &self,
        document: &Document,
        range: Range,
        color: Color,
    ) -> Result<Vec<ColorPresentation>> {
        let Some(fragment) = self.fragment_at(document, range.start) else {
            return Ok(Vec::new());
        };
        let presentations = self
            .inner
            .color_presentations(&fragment, fragment.mapper().range_to_generated(range), color)
            .await?;
        Ok(presentations
            .into_iter()
            .map(|p| mapping::map_color_presentation_to_original(fragment.mapper(), p))
            .collect())
    }

    async fn document_symbols(&self, document: &Document) -> Result<Vec<SymbolInformation>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(Vec::new());
        };
        let symbols = self.inner.document_symbols(&fragment).await?;
        Ok(symbols
            .into_iter()
            .map(|s| mapping::map_symbol_information_to_original(fragment.mapper(), s))
            .collect())
    }

    async fn definitions(&self, document: &Document, position: Position) -> Result<Vec<LocationLink>> {
        let Some(fragment) = self.fragment_at(document, position) else {
            return Ok(Vec::new());
        };
        let links = self
            .inner
            .definitions(&fragment, fragment.to_fragment(position))
            .await?;
        Ok(links
            .into_iter()
            .map(|l| mapping::map_location_link_to_original(fragment.mapper(), l))
            .collect())
    }

    async fn code_actions(
        &self,
        document: &Document,
        range: Range,
        context: &CodeActionContext,
    ) -> Result<Vec<CodeAction>> {
        let Some(fragment) = self.fragment_at(document, range.start) else {
            return Ok(Vec::new());
        };
        let mapper = fragment.mapper();
        let context = CodeActionContext {
            diagnostics: context
                .diagnostics
                .iter()
                .cloned()
                .map(|d| mapping::map_diagnostic_to_generated(mapper, d))
                .collect(),
            ..context.clone()
        };
        let actions = self
            .inner
            .code_actions(&fragment, mapper.range_to_generated(range), &context)
            .await?;
        Ok(actions
            .into_iter()
            .map(|a| mapping::map_code_action_to_original(fragment.mapper(), a))
            .collect())
    }

    async fn folding_ranges(&self, document: &Document) -> Result<Vec<FoldingRange>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(Vec::new());
        };
        let ranges = self.inner.folding_ranges(&fragment).await?;
        Ok(ranges
            .into_iter()
            .map(|r| mapping::map_folding_range_to_original(fragment.mapper(), r))
            .collect())
    }

    async fn selection_ranges(
        &self,
        document: &Document,
        positions: &[Position],
    ) -> Result<Option<Vec<SelectionRange>>> {
        let Some(fragment) = self.fragment(document) else {
            return Ok(None);
        };
        // One result per position is required, so all must be inside.
        if !positions.iter().all(|p| fragment.is_in_fragment(*p)) {
            return Ok(None);
        }
        let local: Vec<Position> = positions.iter().map(|p| fragment.to_fragment(*p)).collect();
        let ranges = self.inner.selection_ranges(&fragment, &local).await?;
        Ok(ranges.map(|ranges| {
            ranges
                .into_iter()
                .map(|r| mapping::map_selection_range_to_original(fragment.mapper(), r))
                .collect()
        }))
    }

    async fn watched_files_changed(&self, changes: &[FileEvent]) -> Result<()> {
        self.inner.watched_files_changed(changes).await
    }
}
