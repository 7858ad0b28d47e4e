//
// document_store.rs
//
// Concurrent store for open documents, keyed by URI
//

// The full store surface (clear, keys, each) is part of the contract even
// where the router does not reach it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use crate::document::{ContentChange, Document};

/// URI → document mapping shared between the router and the handlers.
///
/// Readers proceed in parallel; writers are exclusive. `each` holds the read
/// guard for the duration of the visit, so visitors must not call back into
/// the store.
#[derive(Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of a document. Rope contents clone cheaply.
    pub fn get(&self, uri: &str) -> Option<Document> {
        let guard = self.documents.read().ok()?;
        guard.get(uri).cloned()
    }

    /// Insert or replace a document under its URI.
    pub fn set(&self, document: Document) {
        if let Ok(mut guard) = self.documents.write() {
            guard.insert(document.uri.clone(), document);
        }
    }

    /// Apply an edit batch to a stored document under the write guard.
    ///
    /// Returns false when the URI is not open.
    pub fn update(&self, uri: &str, edits: &[ContentChange]) -> bool {
        let Ok(mut guard) = self.documents.write() else {
            return false;
        };
        match guard.get_mut(uri) {
            Some(document) => {
                document.update(edits);
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, uri: &str) {
        if let Ok(mut guard) = self.documents.write() {
            guard.remove(uri);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.documents.write() {
            guard.clear();
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.documents
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Visit every open document under a single read guard.
    pub fn each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Document),
    {
        if let Ok(guard) = self.documents.read() {
            for (uri, document) in guard.iter() {
                visitor(uri, document);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
