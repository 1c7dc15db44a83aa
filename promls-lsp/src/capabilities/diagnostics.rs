//! Delivery of compile diagnostics to whoever is listening.

use async_trait::async_trait;
use tower_lsp::{
    Client,
    lsp_types::{Diagnostic, Url},
};

/// Receives the diagnostics of a document version once all of its compile jobs are done.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: i32);
}

#[async_trait]
impl DiagnosticsSink for Client {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: i32) {
        self.publish_diagnostics(uri, diagnostics, Some(version))
            .await;
    }
}

/// Discards everything. Used by the REST API, which reads diagnostics on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl DiagnosticsSink for NoopSink {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: i32) {
        tracing::trace!(
            "dropping {} diagnostic(s) for {uri} at version {version}",
            diagnostics.len()
        );
    }
}
