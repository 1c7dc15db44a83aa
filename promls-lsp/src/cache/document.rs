//! A single open document and its per-version artifacts.

use std::sync::Arc;

use parking_lot::RwLock;
use promls_parser::Expr;
use tower_lsp::lsp_types::{Diagnostic, Position, TextDocumentContentChangeEvent, Url};

use crate::{
    Error,
    cache::{
        MAX_DOC,
        position::{self, LineIndex},
        version::VersionContext,
        yaml::Node,
    },
};

/// Languages the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// A buffer holding a single PromQL expression.
    PromQl,
    /// A Prometheus rule or alert file with embedded expressions.
    Yaml,
}

impl Language {
    /// Map an LSP `languageId`.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "promql" => Some(Self::PromQl),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// A PromQL expression found in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Global position of the first byte of the expression text.
    pub pos: usize,
    /// Global position one past the last byte of the expression text.
    pub end: usize,
    /// Syntax tree, present whenever the text parsed, even if it failed type checking.
    pub expr: Option<Expr>,
    pub error: Option<promls_parser::Error>,
    /// Name of the recording rule the expression belongs to.
    pub record: Option<String>,
}

impl Query {
    /// Whether a global position falls inside `[pos, end)`.
    #[must_use]
    pub fn covers(&self, global: usize) -> bool {
        self.pos <= global && global < self.end
    }
}

/// One document of a multi-document YAML stream.
#[derive(Debug, Clone, PartialEq)]
pub struct YamlDoc {
    pub root: Option<Node>,
    /// Global position of the document terminator.
    pub end: usize,
    /// Lines preceding the document, added to the parser's line numbers.
    pub line_offset: usize,
}

#[derive(Debug)]
struct DocumentState {
    text: String,
    version: i32,
    line_index: LineIndex,
    ctx: VersionContext,
    /// Sorted by `pos`.
    queries: Vec<Arc<Query>>,
    yamls: Vec<YamlDoc>,
    diagnostics: Vec<Diagnostic>,
}

/// A text buffer under an LSP URI.
///
/// The document owns a slot of `MAX_DOC` positions in the cache's global position space,
/// starting right after `base`.
#[derive(Debug)]
pub struct Document {
    uri: Url,
    language: Language,
    base: usize,
    state: RwLock<DocumentState>,
}

impl Document {
    pub(crate) fn new(
        uri: Url,
        language: Language,
        base: usize,
        text: String,
        version: i32,
    ) -> Result<Self, Error> {
        check_size(&text)?;
        Ok(Self {
            uri,
            language,
            base,
            state: RwLock::new(DocumentState {
                line_index: LineIndex::new(&text),
                text,
                version,
                ctx: VersionContext::new(version),
                queries: Vec::new(),
                yamls: Vec::new(),
                diagnostics: Vec::new(),
            }),
        })
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Start of the document's slot in the global position space.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// The version context of the current content.
    #[must_use]
    pub fn context(&self) -> VersionContext {
        self.state.read().ctx.clone()
    }

    /// Read lock on the state, provided `ctx` still belongs to the current content.
    fn read(
        &self,
        ctx: &VersionContext,
    ) -> Result<parking_lot::RwLockReadGuard<'_, DocumentState>, Error> {
        ctx.check()?;
        let state = self.state.read();
        // Cancellation happens under the write lock, so this cannot race with an update.
        ctx.check()?;
        Ok(state)
    }

    fn write(
        &self,
        ctx: &VersionContext,
    ) -> Result<parking_lot::RwLockWriteGuard<'_, DocumentState>, Error> {
        ctx.check()?;
        let state = self.state.write();
        ctx.check()?;
        Ok(state)
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn content(&self, ctx: &VersionContext) -> Result<String, Error> {
        Ok(self.read(ctx)?.text.clone())
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn version(&self, ctx: &VersionContext) -> Result<i32, Error> {
        Ok(self.read(ctx)?.version)
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn queries(&self, ctx: &VersionContext) -> Result<Vec<Arc<Query>>, Error> {
        Ok(self.read(ctx)?.queries.clone())
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn yamls(&self, ctx: &VersionContext) -> Result<Vec<YamlDoc>, Error> {
        Ok(self.read(ctx)?.yamls.clone())
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn diagnostics(&self, ctx: &VersionContext) -> Result<Vec<Diagnostic>, Error> {
        Ok(self.read(ctx)?.diagnostics.clone())
    }

    /// Text of a global range, clamped to the document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled, or [`Error::Position`] if the range
    /// does not fall on character boundaries.
    pub fn slice(&self, ctx: &VersionContext, start: usize, end: usize) -> Result<String, Error> {
        let state = self.read(ctx)?;
        let start = self.local(start).min(state.text.len());
        let end = self.local(end).min(state.text.len());
        state
            .text
            .get(start..end)
            .map(str::to_string)
            .ok_or_else(|| Error::Position(format!("{start}..{end} is not a character range")))
    }

    /// The query covering a global position. A cursor right after the last character of a
    /// query belongs to it unless the next query starts there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled.
    pub fn query_at(
        &self,
        ctx: &VersionContext,
        global: usize,
    ) -> Result<Option<Arc<Query>>, Error> {
        let state = self.read(ctx)?;
        let idx = state.queries.partition_point(|query| query.end <= global);
        if let Some(query) = state.queries.get(idx).filter(|query| query.covers(global)) {
            return Ok(Some(Arc::clone(query)));
        }
        Ok(idx
            .checked_sub(1)
            .and_then(|prev| state.queries.get(prev))
            .filter(|query| query.end == global)
            .cloned())
    }

    fn local(&self, global: usize) -> usize {
        global.saturating_sub(self.base + 1)
    }

    fn global(&self, local: usize) -> usize {
        self.base + local + 1
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled, or [`Error::Position`] if the
    /// position lies outside the text.
    pub fn lsp_to_global(&self, ctx: &VersionContext, position: Position) -> Result<usize, Error> {
        let state = self.read(ctx)?;
        position::lsp_to_offset(&state.text, &state.line_index, position)
            .map(|local| self.global(local))
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled, or [`Error::Position`] if the
    /// position lies outside this document.
    pub fn global_to_lsp(&self, ctx: &VersionContext, global: usize) -> Result<Position, Error> {
        if global <= self.base || global > self.base + MAX_DOC + 1 {
            return Err(Error::Position(format!(
                "{global} is outside the slot of {}",
                self.uri
            )));
        }
        let state = self.read(ctx)?;
        position::offset_to_lsp(&state.text, &state.line_index, self.local(global))
    }

    /// # Errors
    ///
    /// Returns [`Error::Stale`] if `ctx` was cancelled, or [`Error::Position`] if the line
    /// does not exist.
    pub fn yaml_to_global(
        &self,
        ctx: &VersionContext,
        line: usize,
        column: usize,
        line_offset: usize,
    ) -> Result<usize, Error> {
        let state = self.read(ctx)?;
        position::yaml_to_offset(&state.text, &state.line_index, line, column, line_offset)
            .map(|local| self.global(local))
    }

    /// Replace the whole text. Returns the context of the new version.
    pub(crate) fn set_content(&self, text: String, version: i32) -> Result<VersionContext, Error> {
        let mut state = self.state.write();
        check_version(state.version, version)?;
        check_size(&text)?;
        Ok(Self::commit(&mut state, text, version))
    }

    /// Apply LSP content changes in order. A change without a range replaces the whole text.
    pub(crate) fn apply_changes(
        &self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<VersionContext, Error> {
        let mut state = self.state.write();
        check_version(state.version, version)?;

        let mut text = state.text.clone();
        for change in changes {
            let Some(range) = change.range else {
                text = change.text;
                continue;
            };
            let index = LineIndex::new(&text);
            let start = position::lsp_to_offset(&text, &index, range.start)?;
            let end = position::lsp_to_offset(&text, &index, range.end)?;
            if start > end || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
                return Err(Error::Position(format!("invalid change range {range:?}")));
            }
            text.replace_range(start..end, &change.text);
        }
        check_size(&text)?;
        Ok(Self::commit(&mut state, text, version))
    }

    fn commit(state: &mut DocumentState, text: String, version: i32) -> VersionContext {
        state.ctx.cancel();
        state.ctx = VersionContext::new(version);
        state.line_index = LineIndex::new(&text);
        state.text = text;
        state.version = version;
        state.queries.clear();
        state.yamls.clear();
        state.diagnostics.clear();
        state.ctx.clone()
    }

    /// Cancel the current version for good, used when the document is closed.
    pub(crate) fn close(&self) {
        self.state.read().ctx.cancel();
    }

    pub(crate) fn push_query(&self, ctx: &VersionContext, query: Query) -> Result<(), Error> {
        let mut state = self.write(ctx)?;
        let idx = state.queries.partition_point(|q| q.pos <= query.pos);
        state.queries.insert(idx, Arc::new(query));
        Ok(())
    }

    pub(crate) fn push_yaml(&self, ctx: &VersionContext, yaml: YamlDoc) -> Result<(), Error> {
        self.write(ctx)?.yamls.push(yaml);
        Ok(())
    }

    pub(crate) fn push_diagnostic(
        &self,
        ctx: &VersionContext,
        diagnostic: Diagnostic,
    ) -> Result<(), Error> {
        self.write(ctx)?.diagnostics.push(diagnostic);
        Ok(())
    }
}

fn check_size(text: &str) -> Result<(), Error> {
    if text.len() > MAX_DOC {
        Err(Error::Oversize { len: text.len() })
    } else {
        Ok(())
    }
}

fn check_version(current: i32, received: i32) -> Result<(), Error> {
    if received > current {
        Ok(())
    } else {
        Err(Error::VersionConflict { current, received })
    }
}
