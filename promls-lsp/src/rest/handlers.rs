//! Request handlers. Each request opens its expression as a throwaway document.

use std::sync::Arc;

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionParams, Diagnostic, DidOpenTextDocumentParams,
    GotoDefinitionParams, Hover, HoverParams, Location, PartialResultParams, Position,
    SignatureHelp, SignatureHelpParams, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, Url, WorkDoneProgressParams,
};

use crate::{
    Error, HeadlessServer,
    rest::models::{ApiError, ExprRequest, PositionRequest, body},
};

type Server = State<Arc<HeadlessServer>>;

/// An expression opened under a unique URI, closed again when dropped.
struct TempDocument<'a> {
    server: &'a HeadlessServer,
    uri: Url,
}

impl<'a> TempDocument<'a> {
    fn open(server: &'a HeadlessServer, expr: String) -> Result<Self, Error> {
        let uri = Url::parse(&format!("file:///rest/{}.promql", uuid::Uuid::new_v4()))
            .map_err(|err| Error::Internal(err.to_string()))?;
        server.did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "promql".to_string(),
                version: 0,
                text: expr,
            },
        })?;
        Ok(Self { server, uri })
    }

    fn at(&self, position: Position) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier {
                uri: self.uri.clone(),
            },
            position,
        }
    }
}

impl Drop for TempDocument<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.server.cache().remove(&self.uri) {
            tracing::debug!("closing {}: {err}", self.uri);
        }
    }
}

pub(crate) async fn diagnostics(
    State(server): Server,
    payload: Result<Json<ExprRequest>, JsonRejection>,
) -> Result<Json<Vec<Diagnostic>>, ApiError> {
    let request = body(payload)?;
    let doc = TempDocument::open(&server, request.expr)?;
    let mut diagnostics = server.get_diagnostics(&doc.uri).await?.diagnostics;
    if let Some(limit) = request.limit {
        diagnostics.truncate(limit);
    }
    Ok(Json(diagnostics))
}

pub(crate) async fn completion(
    State(server): Server,
    payload: Result<Json<PositionRequest>, JsonRejection>,
) -> Result<Json<Vec<CompletionItem>>, ApiError> {
    let request = body(payload)?;
    let position = request.position();
    let doc = TempDocument::open(&server, request.expr)?;
    let params = CompletionParams {
        text_document_position: doc.at(position),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: None,
    };
    Ok(Json(server.completion(params, request.limit).await?))
}

pub(crate) async fn hover(
    State(server): Server,
    payload: Result<Json<PositionRequest>, JsonRejection>,
) -> Result<Json<Option<Hover>>, ApiError> {
    let request = body(payload)?;
    let position = request.position();
    let doc = TempDocument::open(&server, request.expr)?;
    let params = HoverParams {
        text_document_position_params: doc.at(position),
        work_done_progress_params: WorkDoneProgressParams::default(),
    };
    Ok(Json(server.hover(params).await?))
}

pub(crate) async fn signature_help(
    State(server): Server,
    payload: Result<Json<PositionRequest>, JsonRejection>,
) -> Result<Json<Option<SignatureHelp>>, ApiError> {
    let request = body(payload)?;
    let position = request.position();
    let doc = TempDocument::open(&server, request.expr)?;
    let params = SignatureHelpParams {
        context: None,
        text_document_position_params: doc.at(position),
        work_done_progress_params: WorkDoneProgressParams::default(),
    };
    Ok(Json(server.signature_help(params).await?))
}

pub(crate) async fn definition(
    State(server): Server,
    payload: Result<Json<PositionRequest>, JsonRejection>,
) -> Result<Json<Vec<Location>>, ApiError> {
    let request = body(payload)?;
    let position = request.position();
    let doc = TempDocument::open(&server, request.expr)?;
    let params = GotoDefinitionParams {
        text_document_position_params: doc.at(position),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    Ok(Json(server.definition(params).await?))
}
