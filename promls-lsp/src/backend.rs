//! LSP backend
//!
//! Thin adapter from [`LanguageServer`] to the [`HeadlessServer`]. Errors of notifications
//! can only be logged; errors of requests go back to the client.

use std::sync::Arc;

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverParams, HoverProviderCapability, InitializeParams,
    InitializeResult, InitializedParams, MessageType, OneOf, ServerCapabilities, ServerInfo,
    SignatureHelp, SignatureHelpOptions, SignatureHelpParams, TextDocumentSyncCapability,
    TextDocumentSyncKind,
};
use tower_lsp::{Client, LanguageServer};

use crate::{HeadlessServer, metadata::MetadataClient};

const COMPLETION_TRIGGERS: [&str; 5] = ["{", ",", "=", "(", "\""];
const SIGNATURE_TRIGGERS: [&str; 2] = ["(", ","];

/// LSP backend for `PromQL` buffers and Prometheus rule files
#[derive(Debug)]
pub struct Backend {
    /// Client handle, used for log messages
    client: Client,
    server: HeadlessServer,
    /// Log every request and notification under the `rpc` target
    rpc_log: bool,
}

impl Backend {
    /// Create a backend publishing diagnostics through `client`.
    #[must_use]
    pub fn new(client: Client, metadata: Arc<MetadataClient>, rpc_log: bool) -> Self {
        Self {
            server: HeadlessServer::new(Arc::new(client.clone()), metadata),
            client,
            rpc_log,
        }
    }

    fn log_rpc(&self, method: &str, params: &impl std::fmt::Debug) {
        if self.rpc_log {
            tracing::info!(target: "rpc", "{method} {params:?}");
        }
    }

    /// Notifications have no reply, so failures are logged and shown to the user.
    async fn notify_failure(&self, method: &str, result: std::result::Result<(), crate::Error>) {
        if let Err(err) = result {
            tracing::warn!("{method} failed: {err}");
            self.client
                .log_message(MessageType::ERROR, format!("{method}: {err}"))
                .await;
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.log_rpc("initialize", &params.client_info);
        tracing::info!("Initializing promql-langserver");

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        COMPLETION_TRIGGERS.iter().map(ToString::to_string).collect(),
                    ),
                    ..CompletionOptions::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(
                        SIGNATURE_TRIGGERS.iter().map(ToString::to_string).collect(),
                    ),
                    ..SignatureHelpOptions::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "promql-langserver".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        tracing::info!("promql-langserver initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down promql-langserver");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.log_rpc("textDocument/didOpen", &params.text_document.uri);
        tracing::debug!("Document opened: {}", params.text_document.uri);
        let result = self.server.did_open(params);
        self.notify_failure("textDocument/didOpen", result).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.log_rpc("textDocument/didChange", &params.text_document);
        let result = self.server.did_change(params);
        self.notify_failure("textDocument/didChange", result).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.log_rpc("textDocument/didClose", &params.text_document.uri);
        let uri = params.text_document.uri.clone();
        let result = self.server.did_close(params);
        self.notify_failure("textDocument/didClose", result).await;
        // Clear diagnostics for closed file
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.log_rpc("textDocument/hover", &params.text_document_position_params);
        Ok(self.server.hover(params).await?)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.log_rpc("textDocument/completion", &params.text_document_position);
        let items = self.server.completion(params, None).await?;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        self.log_rpc(
            "textDocument/signatureHelp",
            &params.text_document_position_params,
        );
        Ok(self.server.signature_help(params).await?)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.log_rpc(
            "textDocument/definition",
            &params.text_document_position_params,
        );
        let locations = self.server.definition(params).await?;
        Ok((!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations)))
    }
}
