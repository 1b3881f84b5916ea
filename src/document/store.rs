//! Document lifecycle management.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use super::events::{DocumentEvent, EventBus, Listener, Phase};
use super::Document;
use crate::error::{Error, Result};

/// Thread-safe storage for open documents.
///
/// Each stored document is a snapshot; mutation swaps in a new snapshot
/// atomically, so readers never observe a half-applied edit.
#[derive(Debug, Default)]
pub struct DocumentManager {
    documents: DashMap<Url, Arc<Document>>,
    /// Documents whose deletion is deferred when the client closes them.
    locked: DashSet<Url>,
    events: EventBus,
}

impl DocumentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a `didOpen` from the editor.
    pub fn open_client_document(
        &self,
        uri: Url,
        text: String,
        version: i32,
        language_id: &str,
    ) -> Arc<Document> {
        let document = {
            let mut entry = self
                .documents
                .entry(uri.clone())
                .or_insert_with(|| Arc::new(Document::new(uri.clone(), "", 0)));
            let document = Arc::make_mut(entry.value_mut());
            document.set_text(text);
            document.set_client_version(version);
            document.set_language_id(language_id);
            document.set_opened_by_client(true);
            Arc::clone(entry.value())
        };
        tracing::debug!(%uri, version, "document opened by client");
        self.events.notify(DocumentEvent::Open, &document);
        document
    }

    /// Open a document that the editor does not know about, such as a file
    /// read from disk by a provider. An existing entry is returned unchanged.
    pub fn open_document(&self, uri: Url, text: String) -> Arc<Document> {
        if let Some(existing) = self.documents.get(&uri) {
            return Arc::clone(&existing);
        }
        let document = Arc::new(Document::new(uri.clone(), text, 0));
        self.documents.insert(uri, Arc::clone(&document));
        self.events.notify(DocumentEvent::Open, &document);
        document
    }

    /// Apply editor changes in order.
    pub fn update(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<Arc<Document>> {
        let document = {
            let mut entry = self
                .documents
                .get_mut(uri)
                .ok_or_else(|| Error::UnknownDocument(uri.clone()))?;
            let document = Arc::make_mut(entry.value_mut());
            for change in changes {
                document.apply_change(change);
            }
            document.set_client_version(version);
            Arc::clone(entry.value())
        };
        self.events.notify(DocumentEvent::Change, &document);
        Ok(document)
    }

    /// Handle a `didClose`. Locked documents stay in memory but are no longer
    /// marked as opened by the client.
    pub fn close(&self, uri: &Url) -> Result<()> {
        let document = self
            .get(uri)
            .map_err(|_| Error::UnknownDocument(uri.clone()))?;
        self.events.notify(DocumentEvent::Close, &document);

        if self.locked.contains(uri) {
            if let Some(mut entry) = self.documents.get_mut(uri) {
                Arc::make_mut(entry.value_mut()).set_opened_by_client(false);
            }
            tracing::debug!(%uri, "close deferred for locked document");
        } else {
            self.documents.remove(uri);
            tracing::debug!(%uri, "document closed");
        }
        Ok(())
    }

    /// Drop a document regardless of locks, e.g. after its file was deleted.
    pub fn release(&self, uri: &Url) {
        self.locked.remove(uri);
        if let Some((_, document)) = self.documents.remove(uri) {
            self.events.notify(DocumentEvent::Close, &document);
        }
    }

    /// Keep the document alive after the client closes it.
    pub fn lock(&self, uri: &Url) {
        self.locked.insert(uri.clone());
    }

    pub fn is_locked(&self, uri: &Url) -> bool {
        self.locked.contains(uri)
    }

    pub fn get(&self, uri: &Url) -> Result<Arc<Document>> {
        self.documents
            .get(uri)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| Error::UnknownDocument(uri.clone()))
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn all_opened_by_client(&self) -> Vec<Arc<Document>> {
        self.documents
            .iter()
            .filter(|entry| entry.opened_by_client())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn on(&self, event: DocumentEvent, phase: Phase, listener: Listener<Document>) {
        self.events.subscribe(event, phase, listener);
    }
}
