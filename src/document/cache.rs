//! Version-stamped side tables for artifacts derived from a document.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

struct Entry<T> {
    version: i32,
    value: Arc<T>,
}

/// Caches one value per document, valid only for the version it was built from.
pub struct VersionedCache<T> {
    entries: DashMap<Url, Entry<T>>,
}

impl<T> Default for VersionedCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> VersionedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `(uri, version)`, if one exists.
    pub fn get(&self, uri: &Url, version: i32) -> Option<Arc<T>> {
        self.entries
            .get(uri)
            .filter(|entry| entry.version == version)
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn insert(&self, uri: Url, version: i32, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.insert(
            uri,
            Entry {
                version,
                value: Arc::clone(&value),
            },
        );
        value
    }

    /// Return the cached value or build, store, and return a fresh one.
    pub fn get_or_insert_with(&self, uri: &Url, version: i32, build: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.get(uri, version) {
            return value;
        }
        self.insert(uri.clone(), version, build())
    }

    pub fn remove(&self, uri: &Url) {
        self.entries.remove(uri);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
