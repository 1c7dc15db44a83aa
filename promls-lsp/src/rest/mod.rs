//! JSON over HTTP access to the language features, one expression per request

mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{Router, routing::post};

use crate::HeadlessServer;

/// Routes of the REST API, nested under `prefix` unless it is empty.
#[must_use]
pub fn router(server: Arc<HeadlessServer>, prefix: &str) -> Router {
    let api = Router::new()
        .route("/diagnostics", post(handlers::diagnostics))
        .route("/completion", post(handlers::completion))
        .route("/hover", post(handlers::hover))
        .route("/signatureHelp", post(handlers::signature_help))
        .route("/definition", post(handlers::definition))
        .with_state(server);
    if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    }
}

/// Serve the REST API on all interfaces until the process ends.
///
/// # Errors
///
/// Returns an I/O error if the port cannot be bound.
pub async fn serve(server: Arc<HeadlessServer>, port: u16, prefix: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("REST API listening on {}{prefix}", listener.local_addr()?);
    axum::serve(listener, router(server, prefix)).await
}
