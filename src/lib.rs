//! Svelte Language Server implementation.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod document;
pub mod error;
pub mod host;
pub mod lsp;
pub mod mapping;
pub mod plugins;
pub mod settings;

pub use document::{Document, DocumentManager, LineIndex};
pub use error::Error;
pub use host::{ExecuteMode, PluginHost};
pub use settings::{discover_settings, load_settings, ConfigManager, ConfigPatch, LsConfig};

use host::{wrap_fragment_provider, StyleSelector};
use lsp::DiagnosticsScheduler;
use plugins::{script_provider, CssProvider, SvelteProvider};

/// Name of the custom request that returns the closing tag for a just-typed
/// opening tag.
pub const TAG_COMPLETE_METHOD: &str = "svelte/tagComplete";

/// Register the markup, style, and script providers, in that order.
pub fn register_default_providers(host: &PluginHost) {
    host.register(Arc::new(SvelteProvider::new(Arc::clone(host.config()))));
    host.register(wrap_fragment_provider(CssProvider::new(), StyleSelector));
    host.register(script_provider());
}

/// A host with fresh document and config stores and the default providers.
pub fn create_host(config: LsConfig) -> Arc<PluginHost> {
    let host = PluginHost::new(
        Arc::new(DocumentManager::new()),
        Arc::new(ConfigManager::new(config)),
    );
    register_default_providers(&host);
    Arc::new(host)
}

pub struct Backend {
    client: Client,
    host: Arc<PluginHost>,
    diagnostics: DiagnosticsScheduler,
    workspace_root: OnceLock<PathBuf>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        let host = create_host(LsConfig::default());
        Self {
            diagnostics: DiagnosticsScheduler::new(client.clone(), Arc::clone(&host)),
            client,
            host,
            workspace_root: OnceLock::new(),
        }
    }

    fn documents(&self) -> &DocumentManager {
        self.host.documents()
    }

    fn apply_client_settings(&self, settings: serde_json::Value) {
        match ConfigPatch::from_client_settings(settings) {
            Ok(patch) => self.host.config().update(&patch),
            Err(error) => tracing::warn!(%error, "ignoring client settings"),
        }
    }

    /// Handler for `svelte/tagComplete`.
    async fn tag_complete(&self, params: TextDocumentPositionParams) -> Result<Option<String>> {
        Ok(self
            .host
            .tag_complete(&params.text_document.uri, params.position)
            .await?)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        if let Some(root) = workspace_root {
            let _ = self.workspace_root.set(root.clone());

            // Discover settings by walking up the directory tree
            let (settings, settings_dir) = settings::discover_settings(&root);
            tracing::debug!(dir = %settings_dir.display(), "loaded workspace settings");
            self.host.config().update(&settings);
        }

        if let Some(options) = params.initialization_options {
            self.apply_client_settings(options);
        }

        Ok(InitializeResult {
            capabilities: lsp::server_capabilities(),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Svelte language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        self.documents()
            .open_client_document(item.uri.clone(), item.text, item.version, &item.language_id);
        self.diagnostics.schedule(item.uri);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        match self
            .documents()
            .update(&uri, &params.content_changes, params.text_document.version)
        {
            Ok(_) => self.diagnostics.schedule(uri),
            Err(error) => tracing::warn!(%error, "change for unknown document"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Err(error) = self.documents().close(&uri) {
            tracing::warn!(%error, "close for unknown document");
        }
        self.diagnostics.clear(uri).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.apply_client_settings(params.settings);
        self.diagnostics.schedule_all();
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut changes = Vec::with_capacity(params.changes.len());
        for change in params.changes {
            let opened = self
                .documents()
                .get(&change.uri)
                .is_ok_and(|document| document.opened_by_client());
            // The editor buffer wins over disk for documents it has open.
            if change.typ == FileChangeType::DELETED && !opened {
                self.documents().release(&change.uri);
            }
            if change.typ == FileChangeType::CHANGED && opened {
                continue;
            }
            changes.push(change);
        }
        if !changes.is_empty() {
            self.host.watched_files_changed(changes).await;
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        Ok(self.host.hover(uri, position).await?)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let trigger = params.context.and_then(|c| c.trigger_character);
        let list = self.host.completions(uri, position, trigger).await?;
        Ok(Some(CompletionResponse::List(list)))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let edits = self
            .host
            .format(&params.text_document.uri, params.options)
            .await?;
        Ok(Some(edits))
    }

    async fn document_color(&self, params: DocumentColorParams) -> Result<Vec<ColorInformation>> {
        Ok(self.host.document_colors(&params.text_document.uri).await?)
    }

    async fn color_presentation(
        &self,
        params: ColorPresentationParams,
    ) -> Result<Vec<ColorPresentation>> {
        Ok(self
            .host
            .color_presentations(&params.text_document.uri, params.range, params.color)
            .await?)
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let symbols = self.host.document_symbols(&params.text_document.uri).await?;
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let links = self.host.definitions(uri, position).await?;
        Ok((!links.is_empty()).then_some(GotoDefinitionResponse::Link(links)))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let actions = self
            .host
            .code_actions(&params.text_document.uri, params.range, params.context)
            .await?;
        Ok(Some(
            actions
                .into_iter()
                .map(CodeActionOrCommand::CodeAction)
                .collect(),
        ))
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        Ok(Some(self.host.folding_ranges(&params.text_document.uri).await?))
    }

    async fn selection_range(
        &self,
        params: SelectionRangeParams,
    ) -> Result<Option<Vec<SelectionRange>>> {
        let ranges = self
            .host
            .selection_ranges(&params.text_document.uri, params.positions)
            .await?;
        Ok(Some(ranges))
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::build(Backend::new)
        .custom_method(TAG_COMPLETE_METHOD, Backend::tag_complete)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_can_be_created() {
        let (_service, _socket) = create_service();
    }

    #[tokio::test]
    async fn default_providers_answer_in_every_region() {
        let host = create_host(LsConfig::default());
        let uri = Url::parse("file:///App.svelte").unwrap();
        host.documents().open_client_document(
            uri.clone(),
            "<script>\n  let count = 0;\n</script>\n{#if count}\n<p>{count}</p>\n{/if}\n<style>\n  p { color: red; }\n</style>\n"
                .into(),
            1,
            "svelte",
        );

        let marker = host.hover(&uri, Position::new(3, 2)).await.unwrap();
        assert!(marker.is_some());
        let property = host.hover(&uri, Position::new(7, 8)).await.unwrap();
        assert!(property.is_some());
        let declaration = host.hover(&uri, Position::new(1, 8)).await.unwrap();
        assert!(declaration.is_some());
    }
}
