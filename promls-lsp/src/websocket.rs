//! LSP over WebSocket
//!
//! Every text or binary message carries one JSON-RPC message. Each connection gets its own
//! [`Backend`], fed through an in-memory pipe using the `Content-Length` framing the LSP
//! server speaks on stdio.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tower_lsp::{LspService, Server};

use crate::{Backend, metadata::MetadataClient};

const PIPE_CAPACITY: usize = 64 * 1024;
const OUTGOING_QUEUE: usize = 32;

#[derive(Debug, Clone)]
struct Shared {
    metadata: Arc<MetadataClient>,
    rpc_log: bool,
}

/// Routes accepting WebSocket upgrades at `/`.
#[must_use]
pub fn router(metadata: Arc<MetadataClient>, rpc_log: bool) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .with_state(Shared { metadata, rpc_log })
}

/// Accept LSP clients over WebSocket on all interfaces until the process ends.
///
/// # Errors
///
/// Returns an I/O error if the port cannot be bound.
pub async fn serve(
    metadata: Arc<MetadataClient>,
    port: u16,
    rpc_log: bool,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("LSP WebSocket listening on {}", listener.local_addr()?);
    axum::serve(listener, router(metadata, rpc_log)).await
}

async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Shared>) -> Response {
    ws.on_upgrade(move |socket| connection(socket, shared))
}

async fn connection(mut socket: WebSocket, shared: Shared) {
    tracing::info!("WebSocket client connected");
    let mut session = Session::start(shared.metadata, shared.rpc_log);
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let body = match incoming {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::warn!("WebSocket receive failed: {err}");
                        break;
                    }
                };
                if let Err(err) = session.send(&body).await {
                    tracing::warn!("LSP server stopped reading: {err}");
                    break;
                }
            }
            outgoing = session.recv() => {
                let Some(body) = outgoing else { break };
                if let Err(err) = socket.send(Message::Text(body)).await {
                    tracing::warn!("WebSocket send failed: {err}");
                    break;
                }
            }
        }
    }
    session.close().await;
    tracing::info!("WebSocket client disconnected");
}

/// A language server running on an in-memory pipe.
struct Session {
    input: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    output: mpsc::Receiver<String>,
    server: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Session {
    fn start(metadata: Arc<MetadataClient>, rpc_log: bool) -> Self {
        let (client_end, server_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_read, server_write) = tokio::io::split(server_end);
        let (client_read, input) = tokio::io::split(client_end);

        let (service, socket) =
            LspService::new(move |client| Backend::new(client, metadata, rpc_log));
        let server = tokio::spawn(Server::new(server_read, server_write, socket).serve(service));

        let (tx, output) = mpsc::channel(OUTGOING_QUEUE);
        let reader = tokio::spawn(async move {
            if let Err(err) = read_frames(client_read, tx).await {
                tracing::warn!("malformed LSP output: {err}");
            }
        });
        Self {
            input,
            output,
            server,
            reader,
        }
    }

    async fn send(&mut self, body: &[u8]) -> std::io::Result<()> {
        write_frame(&mut self.input, body).await
    }

    async fn recv(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Close the input so the server winds down, then drop whatever is still running.
    async fn close(mut self) {
        if let Err(err) = self.input.shutdown().await {
            tracing::debug!("closing LSP input: {err}");
        }
        self.server.abort();
        self.reader.abort();
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> std::io::Result<()> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Split `Content-Length` framed messages read from `reader` and forward their bodies until
/// the stream or the receiver ends.
async fn read_frames<R: AsyncRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<String>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    loop {
        let mut length = None;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                length = value.trim().parse::<usize>().ok();
            }
        }
        let Some(length) = length else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "missing Content-Length header",
            ));
        };
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;
        let body = String::from_utf8(body)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        if tx.send(body).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::time::Duration;

    #[tokio::test]
    async fn test_frames_are_split_by_content_length() -> std::io::Result<()> {
        let mut framed = Vec::new();
        write_frame(&mut framed, br#"{"id":1}"#).await?;
        write_frame(&mut framed, "{\"x\":\"é\"}".as_bytes()).await?;
        let (tx, mut rx) = mpsc::channel(4);
        read_frames(framed.as_slice(), tx).await?;
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"id":1}"#));
        assert_eq!(rx.recv().await.as_deref(), Some("{\"x\":\"é\"}"));
        assert_eq!(rx.recv().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_frame_without_length_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = read_frames(b"Content-Type: x\r\n\r\n{}".as_slice(), tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_answers_initialize() -> anyhow::Result<()> {
        let metadata = Arc::new(MetadataClient::new(
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));
        let mut session = Session::start(metadata, false);
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "capabilities": {} },
        });
        session.send(request.to_string().as_bytes()).await?;

        let reply = tokio::time::timeout(Duration::from_secs(5), session.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("session ended without a reply"))?;
        let reply: Value = serde_json::from_str(&reply)?;
        assert_eq!(reply.pointer("/id"), Some(&json!(1)));
        assert_eq!(
            reply.pointer("/result/serverInfo/name"),
            Some(&json!("promql-langserver"))
        );
        assert_eq!(
            reply.pointer("/result/capabilities/definitionProvider"),
            Some(&json!(true))
        );
        session.close().await;
        Ok(())
    }
}
