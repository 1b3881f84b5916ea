//! Provider registration and multi-provider dispatch.
//!
//! Providers declare the [`Capability`] tags they implement; a request is
//! routed to every provider that declares the capability and whose settings
//! section has it enabled. Results are combined by one of three policies:
//!
//! - [`ExecuteMode::FirstNonNull`]: providers run one after another in
//!   registration order until one yields a value.
//! - [`ExecuteMode::Collect`]: providers run concurrently and every result is
//!   kept, in registration order.
//! - [`ExecuteMode::None`]: providers run concurrently for their side effects.
//!
//! A provider that errors or panics is logged and counts as "no contribution".

mod adapter;
mod capability;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use tower_lsp::lsp_types::{
    CodeAction, CodeActionContext, Color, ColorInformation, ColorPresentation, CompletionList,
    Diagnostic, FileEvent, FoldingRange, FormattingOptions, Hover, LocationLink, Position, Range,
    SelectionRange, SymbolInformation, TextEdit, Url,
};

use crate::document::{Document, DocumentEvent, DocumentManager, Listener, Phase};
use crate::error::Result;
use crate::settings::ConfigManager;

pub use adapter::{wrap_fragment_provider, FragmentAdapter, FragmentSelector, StyleSelector};
pub use capability::{Capability, PluginHandle, Provider, Section};

/// Result-combination policy for [`PluginHost`] dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
    FirstNonNull,
    Collect,
    None,
}

/// The handle providers receive on registration.
struct HostHandle {
    documents: Arc<DocumentManager>,
}

impl PluginHandle<Document> for HostHandle {
    fn on(&self, event: DocumentEvent, phase: Phase, listener: Listener<Document>) {
        self.documents.on(event, phase, listener);
    }

    fn open_virtual_document(&self, uri: Url, text: String) -> Arc<Document> {
        self.documents.open_document(uri, text)
    }

    fn lock_document(&self, uri: &Url) {
        self.documents.lock(uri);
    }
}

/// Aggregates registered providers behind one typed API.
pub struct PluginHost {
    documents: Arc<DocumentManager>,
    config: Arc<ConfigManager>,
    providers: RwLock<Vec<Arc<dyn Provider>>>,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.providers.read().iter().map(|p| p.name()).collect();
        f.debug_struct("PluginHost")
            .field("providers", &names)
            .finish_non_exhaustive()
    }
}

/// Outcome of one provider call, errors and panics folded together.
fn settle<T>(name: &'static str, outcome: std::thread::Result<Result<T>>) -> Option<T> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            tracing::warn!(provider = name, %error, "provider failed");
            None
        }
        Err(_) => {
            tracing::warn!(provider = name, "provider panicked");
            None
        }
    }
}

impl PluginHost {
    pub fn new(documents: Arc<DocumentManager>, config: Arc<ConfigManager>) -> Self {
        Self {
            documents,
            config,
            providers: RwLock::new(Vec::new()),
        }
    }

    pub fn documents(&self) -> &Arc<DocumentManager> {
        &self.documents
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    /// Append a provider and run its registration hook.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let handle = HostHandle {
            documents: Arc::clone(&self.documents),
        };
        provider.on_register(&handle);
        tracing::debug!(provider = provider.name(), "provider registered");
        self.providers.write().push(provider);
    }

    /// Providers implementing `capability` that are currently enabled, in
    /// registration order.
    fn enabled_providers(&self, capability: Capability) -> Vec<Arc<dyn Provider>> {
        self.providers
            .read()
            .iter()
            .filter(|p| p.capabilities().contains(&capability))
            .filter(|p| self.config.is_enabled(p.section(), capability))
            .cloned()
            .collect()
    }

    /// Call providers sequentially and return the first `Some`.
    pub async fn execute_first_non_null<T, F, Fut>(&self, capability: Capability, call: F) -> Option<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for provider in self.enabled_providers(capability) {
            let name = provider.name();
            let outcome = AssertUnwindSafe(call(provider)).catch_unwind().await;
            if let Some(Some(value)) = settle(name, outcome) {
                tracing::debug!(provider = name, ?capability, "first non-null result");
                return Some(value);
            }
        }
        None
    }

    /// Call providers concurrently and keep one result per provider; failed
    /// providers contribute `T::default()`.
    pub async fn execute_collect<T, F, Fut>(&self, capability: Capability, call: F) -> Vec<T>
    where
        T: Default,
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let calls = self.enabled_providers(capability).into_iter().map(|provider| {
            let name = provider.name();
            let fut = AssertUnwindSafe(call(provider)).catch_unwind();
            async move { settle(name, fut.await).unwrap_or_default() }
        });
        join_all(calls).await
    }

    /// Call providers concurrently for their side effects.
    pub async fn execute_none<F, Fut>(&self, capability: Capability, call: F)
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute_collect(capability, call).await;
    }

    /// Dispatch with a runtime-chosen mode. `FirstNonNull` keeps at most one
    /// value; the other modes keep every non-null one.
    pub async fn execute<T, F, Fut>(&self, capability: Capability, mode: ExecuteMode, call: F) -> Vec<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        match mode {
            ExecuteMode::FirstNonNull => self
                .execute_first_non_null(capability, call)
                .await
                .into_iter()
                .collect(),
            ExecuteMode::Collect => self
                .execute_collect(capability, call)
                .await
                .into_iter()
                .flatten()
                .collect(),
            ExecuteMode::None => {
                self.execute_collect(capability, call).await;
                Vec::new()
            }
        }
    }

    pub async fn diagnostics(&self, uri: &Url) -> Result<Vec<Diagnostic>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::Diagnostics, |provider| {
                let document = Arc::clone(&document);
                async move { provider.diagnostics(&document).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn hover(&self, uri: &Url, position: Position) -> Result<Option<Hover>> {
        let document = self.documents.get(uri)?;
        Ok(self
            .execute_first_non_null(Capability::Hover, |provider| {
                let document = Arc::clone(&document);
                async move { provider.hover(&document, position).await }
            })
            .await)
    }

    /// Completions from every provider merged into one list, incomplete if
    /// any contribution is.
    pub async fn completions(
        &self,
        uri: &Url,
        position: Position,
        trigger: Option<String>,
    ) -> Result<CompletionList> {
        let document = self.documents.get(uri)?;
        let lists = self
            .execute_collect(Capability::Completions, |provider| {
                let document = Arc::clone(&document);
                let trigger = trigger.clone();
                async move { provider.completions(&document, position, trigger).await }
            })
            .await;
        Ok(lists
            .into_iter()
            .flatten()
            .fold(CompletionList::default(), |mut merged, list| {
                merged.is_incomplete |= list.is_incomplete;
                merged.items.extend(list.items);
                merged
            }))
    }

    pub async fn format(&self, uri: &Url, options: FormattingOptions) -> Result<Vec<TextEdit>> {
        let document = self.documents.get(uri)?;
        Ok(self
            .execute_first_non_null(Capability::Formatting, |provider| {
                let document = Arc::clone(&document);
                let options = options.clone();
                async move { provider.format(&document, &options).await }
            })
            .await
            .unwrap_or_default())
    }

    pub async fn tag_complete(&self, uri: &Url, position: Position) -> Result<Option<String>> {
        let document = self.documents.get(uri)?;
        Ok(self
            .execute_first_non_null(Capability::TagComplete, |provider| {
                let document = Arc::clone(&document);
                async move { provider.tag_complete(&document, position).await }
            })
            .await)
    }

    pub async fn document_colors(&self, uri: &Url) -> Result<Vec<ColorInformation>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::DocumentColors, |provider| {
                let document = Arc::clone(&document);
                async move { provider.document_colors(&document).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn color_presentations(
        &self,
        uri: &Url,
        range: Range,
        color: Color,
    ) -> Result<Vec<ColorPresentation>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::ColorPresentations, |provider| {
                let document = Arc::clone(&document);
                async move { provider.color_presentations(&document, range, color).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn document_symbols(&self, uri: &Url) -> Result<Vec<SymbolInformation>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::DocumentSymbols, |provider| {
                let document = Arc::clone(&document);
                async move { provider.document_symbols(&document).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn definitions(&self, uri: &Url, position: Position) -> Result<Vec<LocationLink>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::Definitions, |provider| {
                let document = Arc::clone(&document);
                async move { provider.definitions(&document, position).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn code_actions(
        &self,
        uri: &Url,
        range: Range,
        context: CodeActionContext,
    ) -> Result<Vec<CodeAction>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::CodeActions, |provider| {
                let document = Arc::clone(&document);
                let context = context.clone();
                async move { provider.code_actions(&document, range, &context).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn folding_ranges(&self, uri: &Url) -> Result<Vec<FoldingRange>> {
        let document = self.documents.get(uri)?;
        let results = self
            .execute_collect(Capability::FoldingRanges, |provider| {
                let document = Arc::clone(&document);
                async move { provider.folding_ranges(&document).await }
            })
            .await;
        Ok(results.into_iter().flatten().collect())
    }

    pub async fn selection_ranges(
        &self,
        uri: &Url,
        positions: Vec<Position>,
    ) -> Result<Vec<SelectionRange>> {
        let document = self.documents.get(uri)?;
        let positions: Arc<[Position]> = positions.into();
        Ok(self
            .execute_first_non_null(Capability::SelectionRanges, |provider| {
                let document = Arc::clone(&document);
                let positions = Arc::clone(&positions);
                async move { provider.selection_ranges(&document, &positions).await }
            })
            .await
            .unwrap_or_default())
    }

    pub async fn watched_files_changed(&self, changes: Vec<FileEvent>) {
        let changes: Arc<[FileEvent]> = changes.into();
        self.execute_none(Capability::WatchedFiles, |provider| {
            let changes = Arc::clone(&changes);
            async move { provider.watched_files_changed(&changes).await }
        })
        .await;
    }
}
