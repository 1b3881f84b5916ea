//! Capability tags and the provider interface.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionContext, Color, ColorInformation, ColorPresentation, CompletionList,
    Diagnostic, FileEvent, FoldingRange, FormattingOptions, Hover, LocationLink, Position, Range,
    SelectionRange, SymbolInformation, TextEdit, Url,
};

use crate::document::{Document, DocumentEvent, Listener, Phase};
use crate::error::Result;

/// An editor-intelligence operation a provider may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Diagnostics,
    Hover,
    Completions,
    Formatting,
    TagComplete,
    DocumentColors,
    ColorPresentations,
    DocumentSymbols,
    Definitions,
    CodeActions,
    FoldingRanges,
    SelectionRanges,
    /// Lifecycle hook for watched file changes. Has no config toggle.
    WatchedFiles,
}

impl Capability {
    /// The per-section settings key that toggles this capability.
    pub fn config_key(self) -> Option<&'static str> {
        Some(match self {
            Capability::Diagnostics => "diagnostics",
            Capability::Hover => "hover",
            Capability::Completions => "completions",
            Capability::Formatting => "format",
            Capability::TagComplete => "tagComplete",
            Capability::DocumentColors => "documentColors",
            Capability::ColorPresentations => "colorPresentations",
            Capability::DocumentSymbols => "documentSymbols",
            Capability::Definitions => "definitions",
            Capability::CodeActions => "codeActions",
            Capability::FoldingRanges => "foldingRanges",
            Capability::SelectionRanges => "selectionRange",
            Capability::WatchedFiles => return None,
        })
    }
}

/// Top-level settings section a provider is configured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Svelte,
    Css,
    Typescript,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Section::Svelte => "svelte",
            Section::Css => "css",
            Section::Typescript => "typescript",
        }
    }
}

/// Host primitives handed to a provider when it is registered.
pub trait PluginHandle<D>: Send + Sync {
    /// Subscribe to a document lifecycle event.
    fn on(&self, event: DocumentEvent, phase: Phase, listener: Listener<D>);

    /// Open a document the editor does not know about.
    fn open_virtual_document(&self, uri: Url, text: String) -> Arc<Document>;

    /// Keep a document alive after the client closes it.
    fn lock_document(&self, uri: &Url);
}

/// A unit implementing some editor-intelligence operations over documents of
/// type `D`.
///
/// Only methods whose [`Capability`] appears in [`Provider::capabilities`] are
/// ever called; the defaults return the capability's empty value.
#[tower_lsp::async_trait]
pub trait Provider<D: Send + Sync + 'static = Document>: Send + Sync {
    fn name(&self) -> &'static str;

    fn section(&self) -> Section;

    fn capabilities(&self) -> &[Capability];

    fn on_register(&self, _host: &dyn PluginHandle<D>) {}

    async fn diagnostics(&self, _document: &D) -> Result<Vec<Diagnostic>> {
        Ok(Vec::new())
    }

    async fn hover(&self, _document: &D, _position: Position) -> Result<Option<Hover>> {
        Ok(None)
    }

    async fn completions(
        &self,
        _document: &D,
        _position: Position,
        _trigger: Option<String>,
    ) -> Result<Option<CompletionList>> {
        Ok(None)
    }

    async fn format(
        &self,
        _document: &D,
        _options: &FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>> {
        Ok(None)
    }

    /// Text to insert after a just-typed opening tag, as a snippet.
    async fn tag_complete(&self, _document: &D, _position: Position) -> Result<Option<String>> {
        Ok(None)
    }

    async fn document_colors(&self, _document: &D) -> Result<Vec<ColorInformation>> {
        Ok(Vec::new())
    }

    async fn color_presentations(
        &self,
        _document: &D,
        _range: Range,
        _color: Color,
    ) -> Result<Vec<ColorPresentation>> {
        Ok(Vec::new())
    }

    async fn document_symbols(&self, _document: &D) -> Result<Vec<SymbolInformation>> {
        Ok(Vec::new())
    }

    async fn definitions(&self, _document: &D, _position: Position) -> Result<Vec<LocationLink>> {
        Ok(Vec::new())
    }

    async fn code_actions(
        &self,
        _document: &D,
        _range: Range,
        _context: &CodeActionContext,
    ) -> Result<Vec<CodeAction>> {
        Ok(Vec::new())
    }

    async fn folding_ranges(&self, _document: &D) -> Result<Vec<FoldingRange>> {
        Ok(Vec::new())
    }

    async fn selection_ranges(
        &self,
        _document: &D,
        _positions: &[Position],
    ) -> Result<Option<Vec<SelectionRange>>> {
        Ok(None)
    }

    async fn watched_files_changed(&self, _changes: &[FileEvent]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lifecycle_hooks_lack_a_toggle() {
        assert_eq!(Capability::SelectionRanges.config_key(), Some("selectionRange"));
        assert_eq!(Capability::TagComplete.config_key(), Some("tagComplete"));
        assert_eq!(Capability::WatchedFiles.config_key(), None);
    }
}
