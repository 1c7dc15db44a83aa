//! Go to definition: from a selector to the recording rules that produce it

use promls_parser::Expr;
use tower_lsp::lsp_types::{Location, Range};

use crate::{Error, capabilities::Located, capabilities::location::span_range};

/// Every query in the document recorded under the name of the selector at the cursor.
///
/// # Errors
///
/// Returns [`Error::Stale`] if the document changed.
pub fn compute_definition(located: &Located) -> Result<Vec<Location>, Error> {
    let name = match located.node() {
        Some(Expr::VectorSelector(vs)) => vs.metric_name(),
        Some(Expr::MatrixSelector(ms)) => ms.selector().and_then(|vs| vs.metric_name()),
        Some(_) | None => None,
    };
    let Some(name) = name else {
        return Ok(Vec::new());
    };

    let (doc, ctx) = (&located.doc, &located.ctx);
    doc.queries(ctx)?
        .iter()
        .filter(|query| query.record.as_deref() == Some(name))
        .map(|query| -> Result<Location, Error> {
            let range = match &query.expr {
                Some(expr) => span_range(doc, ctx, query, expr.span())?,
                None => Range::new(
                    doc.global_to_lsp(ctx, query.pos)?,
                    doc.global_to_lsp(ctx, query.end)?,
                ),
            };
            Ok(Location::new(doc.uri().clone(), range))
        })
        .collect()
}
