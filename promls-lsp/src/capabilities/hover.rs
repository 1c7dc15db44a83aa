//! Hover: metric metadata for selectors, documentation for functions and operators

use promls_parser::{
    Expr, Span,
    functions::{self, Function},
};
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

use crate::{
    Error,
    capabilities::Located,
    metadata::{Metadata, MetadataService},
};

/// Hover for the node under the cursor, `None` where there is nothing to show.
///
/// # Errors
///
/// Returns [`Error::Upstream`] if the metadata service fails and [`Error::Position`] if the
/// node cannot be mapped back to the document.
pub async fn compute_hover(
    located: &Located,
    metadata: &dyn MetadataService,
) -> Result<Option<Hover>, Error> {
    let Some(node) = located.node() else {
        return Ok(None);
    };
    let content = match node {
        Expr::VectorSelector(vs) => match vs.metric_name() {
            Some(name) => metadata
                .metric_metadata(name)
                .await?
                .map(|m| (metric_markdown(&m), vs.span)),
            None => None,
        },
        Expr::Call(call) => functions::function(&call.func)
            .map(|func| (function_markdown(func), call.name_span)),
        Expr::AggregateExpr(agg) => functions::aggregation(agg.op)
            .map(|aggregation| {
                (
                    code_markdown(&aggregation.signature(), aggregation.doc),
                    agg.op_span,
                )
            }),
        Expr::BinaryExpr(bin) => Some((
            format!("`{}`: {}", bin.op, functions::operator_doc(bin.op)),
            bin.op_span,
        )),
        Expr::NumberLiteral(_)
        | Expr::StringLiteral(_)
        | Expr::MatrixSelector(_)
        | Expr::ParenExpr(_)
        | Expr::SubqueryExpr(_)
        | Expr::UnaryExpr(_) => None,
    };
    content
        .map(|(value, span)| hover(located, value, span))
        .transpose()
}

fn hover(located: &Located, value: String, span: Span) -> Result<Hover, Error> {
    Ok(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(located.range(span)?),
    })
}

fn metric_markdown(metadata: &Metadata) -> String {
    let mut value = format!("**{}**", metadata.kind);
    if !metadata.unit.is_empty() {
        value.push_str(&format!(" — *{}*", metadata.unit));
    }
    if !metadata.help.is_empty() {
        value.push_str("\n\n");
        value.push_str(&metadata.help);
    }
    value
}

fn function_markdown(func: &Function) -> String {
    code_markdown(&func.signature(), func.doc)
}

fn code_markdown(signature: &str, doc: &str) -> String {
    format!("```promql\n{signature}\n```\n\n{doc}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capabilities::testing::located, metadata::testing::StaticMetadata};
    use pretty_assertions::assert_eq;
    use tower_lsp::lsp_types::{Position, Range};

    fn markdown(hover: Option<&Hover>) -> Option<&str> {
        match hover.map(|hover| &hover.contents) {
            Some(HoverContents::Markup(content)) => Some(content.value.as_str()),
            Some(HoverContents::Scalar(_) | HoverContents::Array(_)) | None => None,
        }
    }

    fn metadata() -> StaticMetadata {
        StaticMetadata::default().metric(
            "http_requests_total",
            "counter",
            "Total number of HTTP requests.",
        )
    }

    #[tokio::test]
    async fn test_number_has_no_hover() -> Result<(), Error> {
        let located = located("1", 0, 0).await?;
        assert_eq!(compute_hover(&located, &metadata()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_metric_hover() -> Result<(), Error> {
        let located = located("rate(http_requests_total[5m])", 0, 8).await?;
        let hover = compute_hover(&located, &metadata()).await?;
        assert_eq!(
            markdown(hover.as_ref()),
            Some("**counter**\n\nTotal number of HTTP requests.")
        );
        assert_eq!(
            hover.and_then(|hover| hover.range),
            Some(Range::new(Position::new(0, 5), Position::new(0, 24)))
        );
        Ok(())
    }

    #[test]
    fn test_metric_markdown_with_unit() {
        let metadata = Metadata {
            kind: "gauge".to_string(),
            help: "Temperature.".to_string(),
            unit: "celsius".to_string(),
        };
        assert_eq!(
            metric_markdown(&metadata),
            "**gauge** — *celsius*\n\nTemperature."
        );
    }

    #[tokio::test]
    async fn test_unknown_metric_has_no_hover() -> Result<(), Error> {
        let located = located("up", 0, 1).await?;
        assert_eq!(compute_hover(&located, &metadata()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_function_hover() -> Result<(), Error> {
        let located = located("rate(http_requests_total[5m])", 0, 2).await?;
        let hover = compute_hover(&located, &metadata()).await?;
        let value = markdown(hover.as_ref()).unwrap_or_default();
        assert!(value.starts_with("```promql\nrate(v range vector) instant vector\n```"));
        assert_eq!(
            hover.and_then(|hover| hover.range),
            Some(Range::new(Position::new(0, 0), Position::new(0, 4)))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_aggregation_and_operator_hover() -> Result<(), Error> {
        let located = located("sum by (job) (up)", 0, 1).await?;
        let hover = compute_hover(&located, &metadata()).await?;
        assert!(
            markdown(hover.as_ref())
                .is_some_and(|value| value.ends_with("Calculate sum over dimensions."))
        );

        let located = crate::capabilities::testing::located("up / up", 0, 3).await?;
        let hover = compute_hover(&located, &metadata()).await?;
        assert!(markdown(hover.as_ref()).is_some_and(|value| value.starts_with("`/`: Division.")));
        Ok(())
    }
}
