//! promql-langserver: language server for `PromQL` buffers and Prometheus rule files
//!
//! Speaks LSP on stdio by default, or over WebSocket with `websocket_port` set. With
//! `rest_api_port` set, serves the same features as a JSON API over HTTP instead.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use promls_lsp::{
    Backend, HeadlessServer,
    capabilities::NoopSink,
    config::{Config, LogFormat},
    metadata::MetadataClient,
    rest, websocket,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; `LANGSERVER_*` variables override its values
    #[arg(long)]
    config_file: Option<PathBuf>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the LSP transport
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config_file.as_deref()).context("loading configuration")?;
    init_tracing(config.log_format);
    tracing::debug!("configuration: {config:?}");

    let metadata = Arc::new(MetadataClient::new(
        config.metadata_lookback_interval,
        config.request_timeout,
    ));
    if let Err(err) = metadata
        .change_data_source(config.prometheus_url.as_deref())
        .await
    {
        tracing::warn!("cannot use Prometheus at {:?}: {err}", config.prometheus_url);
    }

    if config.rest_api_port != 0 {
        let server = Arc::new(HeadlessServer::new(Arc::new(NoopSink), metadata));
        rest::serve(server, config.rest_api_port, &config.rest_prefix())
            .await
            .with_context(|| format!("serving REST API on port {}", config.rest_api_port))?;
    } else if config.websocket_port != 0 {
        websocket::serve(metadata, config.websocket_port, config.activate_rpc_log)
            .await
            .with_context(|| format!("serving LSP on WebSocket port {}", config.websocket_port))?;
    } else {
        tracing::info!("Starting promql-langserver on stdio");
        let (service, socket) = LspService::new(|client| {
            Backend::new(client, Arc::clone(&metadata), config.activate_rpc_log)
        });
        Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
            .serve(service)
            .await;
    }
    Ok(())
}
