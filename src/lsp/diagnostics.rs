//! Debounced diagnostics publishing.
//!
//! Each document has at most one pending recomputation. Scheduling again
//! aborts the pending task, so a burst of edits produces a single publish.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{Diagnostic, Url};
use tower_lsp::Client;

use crate::host::PluginHost;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Where computed diagnostics go.
#[tower_lsp::async_trait]
pub trait DiagnosticsSink: Send + Sync + 'static {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>);
}

#[tower_lsp::async_trait]
impl DiagnosticsSink for Client {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.publish_diagnostics(uri, diagnostics, version).await;
    }
}

pub struct DiagnosticsScheduler<S = Client> {
    sink: Arc<S>,
    host: Arc<PluginHost>,
    delay: Duration,
    pending: DashMap<Url, JoinHandle<()>>,
}

impl<S: DiagnosticsSink> DiagnosticsScheduler<S> {
    pub fn new(sink: S, host: Arc<PluginHost>) -> Self {
        Self {
            sink: Arc::new(sink),
            host,
            delay: DEFAULT_DELAY,
            pending: DashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Recompute and publish diagnostics for `uri` once the document has been
    /// quiet for the debounce delay.
    pub fn schedule(&self, uri: Url) {
        let sink = Arc::clone(&self.sink);
        let host = Arc::clone(&self.host);
        let delay = self.delay;
        let target = uri.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            publish(sink.as_ref(), &host, target).await;
        });
        if let Some(previous) = self.pending.insert(uri, task) {
            previous.abort();
        }
    }

    /// Schedule every document the editor has open, e.g. after a settings change.
    pub fn schedule_all(&self) {
        for document in self.host.documents().all_opened_by_client() {
            self.schedule(document.uri().clone());
        }
    }

    /// Cancel pending work for `uri` and clear its published diagnostics.
    pub async fn clear(&self, uri: Url) {
        if let Some((_, task)) = self.pending.remove(&uri) {
            task.abort();
        }
        self.sink.publish(uri, Vec::new(), None).await;
    }
}

async fn publish<S: DiagnosticsSink>(sink: &S, host: &PluginHost, uri: Url) {
    // The document may have been closed while the task slept.
    let Ok(document) = host.documents().get(&uri) else {
        tracing::debug!(%uri, "skipping diagnostics for closed document");
        return;
    };
    match host.diagnostics(&uri).await {
        Ok(diagnostics) => {
            tracing::debug!(%uri, count = diagnostics.len(), "publishing diagnostics");
            sink.publish(uri, diagnostics, document.client_version())
                .await;
        }
        Err(error) => tracing::warn!(%uri, %error, "diagnostics failed"),
    }
}
