//! Protocol facade shared by the LSP backend, the REST API and the tests.
//!
//! Every method takes the LSP parameter types and answers with LSP result types, but nothing
//! here knows about transports.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, GotoDefinitionParams, Hover, HoverParams, Location,
    PublishDiagnosticsParams, SignatureHelp, SignatureHelpParams, Url,
};

use crate::{
    Error,
    cache::DocumentCache,
    capabilities::{DiagnosticsSink, completion, definition, hover, locate, signature},
    metadata::MetadataClient,
};

#[derive(Debug)]
pub struct HeadlessServer {
    cache: DocumentCache,
    metadata: Arc<MetadataClient>,
}

impl HeadlessServer {
    #[must_use]
    pub fn new(sink: Arc<dyn DiagnosticsSink>, metadata: Arc<MetadataClient>) -> Self {
        Self {
            cache: DocumentCache::new(sink),
            metadata,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataClient> {
        &self.metadata
    }

    /// # Errors
    ///
    /// See [`DocumentCache::add`].
    pub fn did_open(&self, params: DidOpenTextDocumentParams) -> Result<(), Error> {
        self.cache.add(params.text_document).map(|_| ())
    }

    /// # Errors
    ///
    /// See [`DocumentCache::apply_changes`].
    pub fn did_change(&self, params: DidChangeTextDocumentParams) -> Result<(), Error> {
        self.cache.apply_changes(
            &params.text_document.uri,
            params.content_changes,
            params.text_document.version,
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the document is not open.
    pub fn did_close(&self, params: DidCloseTextDocumentParams) -> Result<(), Error> {
        self.cache.remove(&params.text_document.uri)
    }

    /// Diagnostics of the latest version, once it has finished compiling, in the shape they
    /// are published in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the document is not open or was closed while waiting.
    pub async fn get_diagnostics(&self, uri: &Url) -> Result<PublishDiagnosticsParams, Error> {
        loop {
            let (doc, ctx) = self.cache.get(uri)?;
            let result = match ctx.wait_compiled().await {
                Ok(()) => doc.diagnostics(&ctx).map(|diagnostics| {
                    PublishDiagnosticsParams::new(uri.clone(), diagnostics, Some(ctx.version()))
                }),
                Err(err) => Err(err),
            };
            if !matches!(result, Err(Error::Stale)) {
                return result;
            }
            // A newer version arrived; wait for that one instead.
            tracing::debug!("{uri} changed while waiting for diagnostics");
        }
    }

    /// # Errors
    ///
    /// See [`locate`] and [`hover::compute_hover`].
    pub async fn hover(&self, params: HoverParams) -> Result<Option<Hover>, Error> {
        let position = params.text_document_position_params;
        let located = locate(&self.cache, &position.text_document.uri, position.position).await?;
        hover::compute_hover(&located, self.metadata.as_ref()).await
    }

    /// # Errors
    ///
    /// See [`locate`] and [`completion::compute_completions`].
    pub async fn completion(
        &self,
        params: CompletionParams,
        limit: Option<usize>,
    ) -> Result<Vec<CompletionItem>, Error> {
        let position = params.text_document_position;
        let located = locate(&self.cache, &position.text_document.uri, position.position).await?;
        completion::compute_completions(&located, self.metadata.as_ref(), limit).await
    }

    /// # Errors
    ///
    /// See [`locate`].
    pub async fn signature_help(
        &self,
        params: SignatureHelpParams,
    ) -> Result<Option<SignatureHelp>, Error> {
        let position = params.text_document_position_params;
        let located = locate(&self.cache, &position.text_document.uri, position.position).await?;
        signature::compute_signature_help(&located)
    }

    /// # Errors
    ///
    /// See [`locate`].
    pub async fn definition(&self, params: GotoDefinitionParams) -> Result<Vec<Location>, Error> {
        let position = params.text_document_position_params;
        let located = locate(&self.cache, &position.text_document.uri, position.position).await?;
        definition::compute_definition(&located)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::NoopSink;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower_lsp::lsp_types::{
        Position, TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
        TextDocumentPositionParams, VersionedTextDocumentIdentifier, WorkDoneProgressParams,
    };

    fn server() -> HeadlessServer {
        HeadlessServer::new(
            Arc::new(NoopSink),
            Arc::new(MetadataClient::new(
                Duration::from_secs(3600),
                Duration::from_secs(1),
            )),
        )
    }

    fn uri() -> Result<Url, Error> {
        Url::parse("file:///a.promql").map_err(|e| Error::Protocol(e.to_string()))
    }

    fn open(server: &HeadlessServer, text: &str) -> Result<Url, Error> {
        let uri = uri()?;
        server.did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "promql".to_string(),
                version: 0,
                text: text.to_string(),
            },
        })?;
        Ok(uri)
    }

    fn at(uri: &Url, line: u32, character: u32) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position::new(line, character),
        }
    }

    #[tokio::test]
    async fn test_diagnostics_follow_changes() -> Result<(), Error> {
        let server = server();
        let uri = open(&server, "sum(")?;
        let published = server.get_diagnostics(&uri).await?;
        assert_eq!(published.uri, uri);
        assert_eq!(published.version, Some(0));
        assert_eq!(published.diagnostics.len(), 1);

        server.did_change(DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version: 1,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "sum(up)".to_string(),
            }],
        })?;
        let published = server.get_diagnostics(&uri).await?;
        assert_eq!(published.version, Some(1));
        assert_eq!(published.diagnostics, Vec::new());
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_document_is_not_found() -> Result<(), Error> {
        let server = server();
        let uri = open(&server, "up")?;
        server.did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        })?;
        assert_eq!(
            server.get_diagnostics(&uri).await,
            Err(Error::NotFound(uri.clone()))
        );
        let hover = server
            .hover(HoverParams {
                text_document_position_params: at(&uri, 0, 0),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await;
        assert_eq!(hover, Err(Error::NotFound(uri)));
        Ok(())
    }

    #[tokio::test]
    async fn test_signature_help_through_facade() -> Result<(), Error> {
        let server = server();
        let uri = open(&server, "rate(up[5m])")?;
        let help = server
            .signature_help(SignatureHelpParams {
                context: None,
                text_document_position_params: at(&uri, 0, 6),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await?;
        assert_eq!(help.map(|help| help.signatures.len()), Some(1));
        Ok(())
    }
}
