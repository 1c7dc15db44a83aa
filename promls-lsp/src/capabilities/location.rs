//! Resolution of an LSP position to the query and syntax node under it.

use std::sync::Arc;

use promls_parser::{Expr, Span};
use tower_lsp::lsp_types::{Position, Range, Url};

use crate::{
    Error,
    cache::{Document, DocumentCache, Query, VersionContext},
};

/// A cursor position resolved against the current version of a document.
#[derive(Debug, Clone)]
pub struct Located {
    pub doc: Arc<Document>,
    pub ctx: VersionContext,
    /// Global position of the cursor.
    pub global: usize,
    /// The query covering the cursor, if any.
    pub query: Option<Arc<Query>>,
}

/// Wait for the current version of `uri` to finish compiling, then resolve `position`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for unknown documents, [`Error::Stale`] if the document
/// changed while waiting and [`Error::Position`] for positions outside the text.
pub async fn locate(
    cache: &DocumentCache,
    uri: &Url,
    position: Position,
) -> Result<Located, Error> {
    let (doc, ctx) = cache.get(uri)?;
    ctx.wait_compiled().await?;
    let global = doc.lsp_to_global(&ctx, position)?;
    let query = doc.query_at(&ctx, global)?;
    Ok(Located {
        doc,
        ctx,
        global,
        query,
    })
}

impl Located {
    /// Cursor offset into the query text.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.query
            .as_ref()
            .map(|query| self.global.saturating_sub(query.pos))
    }

    #[must_use]
    pub fn expr(&self) -> Option<&Expr> {
        self.query.as_ref().and_then(|query| query.expr.as_ref())
    }

    /// Smallest node under the cursor. A cursor right after the expression counts as being
    /// on its last character.
    #[must_use]
    pub fn node(&self) -> Option<&Expr> {
        let expr = self.expr()?;
        let offset = self.offset()?;
        let offset = if offset >= expr.span().end {
            offset.saturating_sub(1)
        } else {
            offset
        };
        promls_parser::node_at(expr, offset)
    }

    /// Text of the query under the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stale`] if the document changed.
    pub fn query_text(&self) -> Result<Option<String>, Error> {
        self.query
            .as_ref()
            .map(|query| self.doc.slice(&self.ctx, query.pos, query.end))
            .transpose()
    }

    /// LSP range of a span of the query under the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Position`] when there is no query or the span lies outside it.
    pub fn range(&self, span: Span) -> Result<Range, Error> {
        let query = self
            .query
            .as_ref()
            .ok_or_else(|| Error::Position("no query under the cursor".to_string()))?;
        span_range(&self.doc, &self.ctx, query, span)
    }
}

pub(crate) fn span_range(
    doc: &Document,
    ctx: &VersionContext,
    query: &Query,
    span: Span,
) -> Result<Range, Error> {
    Ok(Range::new(
        doc.global_to_lsp(ctx, query.pos + span.start)?,
        doc.global_to_lsp(ctx, query.pos + span.end)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::open;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_smallest_node_under_cursor() -> Result<(), Error> {
        let (cache, uri) = open("promql", "+1 + -2 * 1")?;
        let located = locate(&cache, &uri, Position::new(0, 4)).await?;
        assert_eq!(located.offset(), Some(4));
        assert_eq!(located.node().map(Expr::kind), Some("BinaryExpr"));
        assert_eq!(located.query_text()?.as_deref(), Some("+1 + -2 * 1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cursor_after_expression() -> Result<(), Error> {
        let (cache, uri) = open("promql", "up")?;
        let located = locate(&cache, &uri, Position::new(0, 2)).await?;
        assert_eq!(located.node().map(Expr::kind), Some("VectorSelector"));
        let span = located.node().map(Expr::span).unwrap_or_default();
        assert_eq!(
            located.range(span)?,
            Range::new(Position::new(0, 0), Position::new(0, 2))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_position_outside_any_query() -> Result<(), Error> {
        let (cache, uri) = open("yaml", "alerts:\n- expr: up\n  for: 5m\n")?;
        let located = locate(&cache, &uri, Position::new(0, 2)).await?;
        assert!(located.query.is_none());
        assert_eq!(located.node(), None);

        let located = locate(&cache, &uri, Position::new(1, 9)).await?;
        assert_eq!(located.node().map(Expr::kind), Some("VectorSelector"));
        Ok(())
    }
}
