use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, TextDocumentItem, Url};

use crate::{
    Error,
    cache::{
        MAX_DOC, compile,
        document::{Document, Language},
        version::VersionContext,
    },
    capabilities::DiagnosticsSink,
};

/// Distance between the bases of two documents: a full slot plus the unused base position.
const STRIDE: usize = MAX_DOC + 2;

/// All open documents, keyed by URI.
///
/// Lookups return the document together with the context of its current version. Holding
/// on to that context is what lets a request notice that the document changed under it.
pub struct DocumentCache {
    documents: DashMap<Url, Arc<Document>>,
    next_base: AtomicUsize,
    sink: Arc<dyn DiagnosticsSink>,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("documents", &self.documents.len())
            .field("next_base", &self.next_base)
            .finish_non_exhaustive()
    }
}

impl DocumentCache {
    #[must_use]
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            documents: DashMap::new(),
            next_base: AtomicUsize::new(0),
            sink,
        }
    }

    /// Open a document and start compiling it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Oversize`] for documents over [`MAX_DOC`] bytes,
    /// [`Error::DuplicateUri`] if the URI is already open and [`Error::Protocol`] for an
    /// unknown language.
    pub fn add(&self, item: TextDocumentItem) -> Result<Arc<Document>, Error> {
        if item.text.len() > MAX_DOC {
            return Err(Error::Oversize {
                len: item.text.len(),
            });
        }
        let language = Language::from_id(&item.language_id).ok_or_else(|| {
            Error::Protocol(format!("unsupported language {:?}", item.language_id))
        })?;

        let doc = match self.documents.entry(item.uri.clone()) {
            Entry::Occupied(_) => return Err(Error::DuplicateUri(item.uri)),
            Entry::Vacant(slot) => {
                // A reopened URI gets a fresh slot so stale positions can never point into it.
                let base = self.next_base.fetch_add(STRIDE, Ordering::SeqCst);
                let doc = Arc::new(Document::new(
                    item.uri,
                    language,
                    base,
                    item.text,
                    item.version,
                )?);
                slot.insert(Arc::clone(&doc));
                doc
            }
        };
        tracing::debug!("opened {} at base {}", doc.uri(), doc.base());
        compile::dispatch(Arc::clone(&doc), doc.context(), Arc::clone(&self.sink));
        Ok(doc)
    }

    /// The document and the context of its current version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the URI is not open.
    pub fn get(&self, uri: &Url) -> Result<(Arc<Document>, VersionContext), Error> {
        let doc = self
            .documents
            .get(uri)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(uri.clone()))?;
        let ctx = doc.context();
        Ok((doc, ctx))
    }

    /// Close a document. Work still running for it is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the URI is not open.
    pub fn remove(&self, uri: &Url) -> Result<(), Error> {
        let (_, doc) = self
            .documents
            .remove(uri)
            .ok_or_else(|| Error::NotFound(uri.clone()))?;
        doc.close();
        tracing::debug!("closed {uri}");
        Ok(())
    }

    /// Replace the whole content of a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`], [`Error::VersionConflict`] unless `version` is newer than
    /// the current one, or [`Error::Oversize`].
    pub fn set_content(&self, uri: &Url, text: String, version: i32) -> Result<(), Error> {
        let (doc, _) = self.get(uri)?;
        let ctx = doc.set_content(text, version)?;
        compile::dispatch(doc, ctx, Arc::clone(&self.sink));
        Ok(())
    }

    /// Apply LSP content changes in order.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentCache::set_content`], plus [`Error::Position`] for a change range
    /// outside the text.
    pub fn apply_changes(
        &self,
        uri: &Url,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<(), Error> {
        let (doc, _) = self.get(uri)?;
        let ctx = doc.apply_changes(changes, version)?;
        tracing::debug!("{uri} is now at version {version}");
        compile::dispatch(doc, ctx, Arc::clone(&self.sink));
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
