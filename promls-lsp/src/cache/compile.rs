//! Background compilation of document content into queries and diagnostics.
//!
//! Every update spawns one job per version. YAML documents fan out into one more job per
//! embedded expression. Jobs count themselves in the version context; the job that brings the
//! counter back to zero publishes the diagnostics, unless the version was superseded by then.

use std::sync::Arc;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range};

use crate::{
    Error,
    cache::{
        document::{Document, Language, Query, YamlDoc},
        position,
        version::VersionContext,
        yaml::{self, ScalarStyle},
    },
    capabilities::DiagnosticsSink,
};

/// `source` of every diagnostic the server produces.
pub(crate) const SOURCE: &str = "promql-lsp";

pub(crate) fn dispatch(doc: Arc<Document>, ctx: VersionContext, sink: Arc<dyn DiagnosticsSink>) {
    ctx.begin_job();
    tokio::spawn(async move {
        let result = match doc.language() {
            Language::PromQl => compile_promql(&doc, &ctx).await,
            Language::Yaml => compile_yaml(&doc, &ctx, &sink).await,
        };
        report(&doc, result);
        finish(&doc, &ctx, sink.as_ref()).await;
    });
}

fn report(doc: &Document, result: Result<(), Error>) {
    match result {
        // Superseded versions are expected, their output is simply dropped.
        Ok(()) | Err(Error::Stale) => {}
        Err(err) => tracing::warn!(uri = %doc.uri(), "compile failed: {err}"),
    }
}

async fn finish(doc: &Document, ctx: &VersionContext, sink: &dyn DiagnosticsSink) {
    if !ctx.finish_job() {
        return;
    }
    match doc.diagnostics(ctx) {
        Ok(diagnostics) => {
            tracing::debug!(
                "publishing {} diagnostic(s) for {} at version {}",
                diagnostics.len(),
                doc.uri(),
                ctx.version()
            );
            sink.publish(doc.uri().clone(), diagnostics, ctx.version())
                .await;
        }
        Err(_) => tracing::debug!("version {} of {} was superseded", ctx.version(), doc.uri()),
    }
}

#[tracing::instrument(skip_all, fields(uri = %doc.uri(), version = ctx.version()))]
async fn compile_promql(doc: &Document, ctx: &VersionContext) -> Result<(), Error> {
    let text = doc.content(ctx)?;
    let pos = doc.base() + 1;
    let end = pos + text.len();
    compile_query(doc, ctx, text, pos, end, None).await
}

/// Parse and check one expression, then record it with its diagnostic.
async fn compile_query(
    doc: &Document,
    ctx: &VersionContext,
    text: String,
    pos: usize,
    end: usize,
    record: Option<String>,
) -> Result<(), Error> {
    let (expr, error) = tokio::task::spawn_blocking(move || {
        match promls_parser::parse(&text) {
            Ok(expr) => {
                let error = promls_parser::check(&expr).err();
                (Some(expr), error)
            }
            Err(error) => (None, Some(error)),
        }
    })
    .await?;

    if let Some(error) = &error {
        let diagnostic = parse_diagnostic(doc, ctx, pos, error)?;
        doc.push_diagnostic(ctx, diagnostic)?;
    }
    doc.push_query(
        ctx,
        Query {
            pos,
            end,
            expr,
            error,
            record,
        },
    )
}

/// Syntax errors only know where they start and get a range up to the next line. Semantic
/// errors cover the offending node.
fn parse_diagnostic(
    doc: &Document,
    ctx: &VersionContext,
    pos: usize,
    error: &promls_parser::Error,
) -> Result<Diagnostic, Error> {
    let start = doc.global_to_lsp(ctx, pos + error.offset())?;
    let end = match error.span() {
        Some(span) => doc.global_to_lsp(ctx, pos + span.end)?,
        None => position::end_of_line(start),
    };
    Ok(diagnostic(
        Range::new(start, end),
        DiagnosticSeverity::ERROR,
        error.to_string(),
    ))
}

fn diagnostic(range: Range, severity: DiagnosticSeverity, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        source: Some(SOURCE.to_string()),
        message,
        ..Diagnostic::default()
    }
}

#[tracing::instrument(skip_all, fields(uri = %doc.uri(), version = ctx.version()))]
async fn compile_yaml(
    doc: &Arc<Document>,
    ctx: &VersionContext,
    sink: &Arc<dyn DiagnosticsSink>,
) -> Result<(), Error> {
    let text = doc.content(ctx)?;
    let scan = tokio::task::spawn_blocking(move || yaml::scan(&text)).await?;
    let base = doc.base();

    for scanned in scan.docs {
        let doc_end = base + scanned.end + 1;
        for embedded in &scanned.queries {
            let pos = doc.yaml_to_global(
                ctx,
                embedded.start.line,
                embedded.start.col,
                scanned.line_offset,
            )?;
            let end = doc
                .yaml_to_global(ctx, embedded.end.line, embedded.end.col, scanned.line_offset)?
                .clamp(pos, doc_end.max(pos));

            let raw = doc.slice(ctx, pos, end)?;
            let mut text = raw.trim_end();
            if embedded.flow {
                text = text.strip_suffix(',').unwrap_or(text).trim_end();
            }
            let end = pos + text.len();

            if embedded.style == ScalarStyle::Quoted {
                let range = Range::new(doc.global_to_lsp(ctx, pos)?, doc.global_to_lsp(ctx, end)?);
                doc.push_diagnostic(
                    ctx,
                    diagnostic(
                        range,
                        DiagnosticSeverity::WARNING,
                        "Quoted queries are not supported".to_string(),
                    ),
                )?;
                continue;
            }

            spawn_query(doc, ctx, sink, text.to_string(), pos, end, embedded.record.clone());
        }
        doc.push_yaml(
            ctx,
            YamlDoc {
                root: scanned.root,
                end: doc_end,
                line_offset: scanned.line_offset,
            },
        )?;
    }

    if let Some(failure) = scan.error {
        let global =
            doc.yaml_to_global(ctx, failure.mark.line, failure.mark.col, failure.line_offset)?;
        let start = doc.global_to_lsp(ctx, global)?;
        doc.push_diagnostic(
            ctx,
            diagnostic(
                Range::new(start, position::end_of_line(start)),
                DiagnosticSeverity::ERROR,
                failure.message,
            ),
        )?;
    }
    Ok(())
}

fn spawn_query(
    doc: &Arc<Document>,
    ctx: &VersionContext,
    sink: &Arc<dyn DiagnosticsSink>,
    text: String,
    pos: usize,
    end: usize,
    record: Option<String>,
) {
    ctx.begin_job();
    let doc = Arc::clone(doc);
    let ctx = ctx.clone();
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let result = compile_query(&doc, &ctx, text, pos, end, record).await;
        report(&doc, result);
        finish(&doc, &ctx, sink.as_ref()).await;
    });
}
