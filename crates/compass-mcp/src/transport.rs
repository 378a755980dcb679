//! Client-side transport.
//!
//! Runs a background writer and reader over any byte stream pair (usually a
//! spawned server's stdin/stdout) and correlates responses with pending
//! requests by id. When either side of the stream fails, the transport is
//! marked closed and every pending request resolves with `ConnectionLost`.

use crate::error::{CodecError, McpError};
use crate::jsonrpc::{
    self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, RequestId,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Async transport for talking to one MCP server.
pub struct ClientTransport {
    next_id: AtomicU64,
    write_tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    closed: CancellationToken,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    child: Option<Arc<Mutex<Child>>>,
    timeout_ms: u64,
}

impl ClientTransport {
    /// Spawn a server process and talk to it over its stdin/stdout.
    ///
    /// The child's stderr is inherited so its logs stay visible.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: command.to_string(),
            source: e,
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(McpError::Protocol(format!(
                "'{command}' was spawned without piped stdio"
            )));
        };

        tracing::debug!("Spawned MCP server '{command}' (pid {:?})", child.id());

        let mut transport = Self::from_stream(stdout, stdin, timeout_ms);
        transport.child = Some(Arc::new(Mutex::new(child)));
        Ok(transport)
    }

    /// Start background reader/writer tasks over an existing stream pair.
    pub fn from_stream<R, W>(reader: R, writer: W, timeout_ms: u64) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();

        // Writer task: drains channel and writes frames to the stream
        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(64);
        let writer_pending = Arc::clone(&pending);
        let writer_closed = closed.clone();
        let writer_handle = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(frame) = write_rx.recv().await {
                if writer.write_all(&frame).await.is_err() || writer.flush().await.is_err() {
                    tracing::warn!("MCP transport write failed, closing connection");
                    fail_pending(&writer_closed, &writer_pending).await;
                    return;
                }
            }
            // All senders dropped: signal EOF to the server
            let _ = writer.shutdown().await;
        });

        // Reader task: reads lines, decodes, routes responses by id
        let reader_pending = Arc::clone(&pending);
        let reader_closed = closed.clone();
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::debug!("MCP server closed its output");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("MCP transport read failed: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match jsonrpc::decode(line.as_bytes()) {
                    Ok(Message::Response(resp)) => route(&reader_pending, resp).await,
                    Ok(Message::Notification(notif)) => {
                        tracing::debug!("Ignoring server notification '{}'", notif.method);
                    }
                    Ok(Message::Request(req)) => {
                        tracing::debug!("Ignoring server request '{}'", req.method);
                    }
                    Err(CodecError::UnknownMessageType(detail)) => {
                        tracing::warn!("Ignoring unrecognized message from server: {detail}");
                    }
                    Err(e) => {
                        tracing::warn!("Corrupt message from MCP server: {e}: {line}");
                        break;
                    }
                }
            }
            fail_pending(&reader_closed, &reader_pending).await;
        });

        Self {
            next_id: AtomicU64::new(1),
            write_tx,
            pending,
            closed,
            reader_handle,
            writer_handle,
            child: None,
            timeout_ms,
        }
    }

    /// Send a JSON-RPC request and wait for the response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = jsonrpc::encode(&JsonRpcRequest::new(id, method, params).into())?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // Checked under the lock so a concurrent close cannot miss this entry.
            if self.closed.is_cancelled() {
                return Err(McpError::SessionClosed);
            }
            pending.insert(id, tx);
        }

        if self.write_tx.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpError::ConnectionLost);
        }

        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::ConnectionLost),
            Err(_) => {
                // Clean up pending entry on timeout
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.timeout_ms,
                })
            }
        }
    }

    /// Send a JSON-RPC notification (fire-and-forget, no response expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        if self.closed.is_cancelled() {
            return Err(McpError::SessionClosed);
        }
        let frame = jsonrpc::encode(&JsonRpcNotification::new(method, params).into())?;
        self.write_tx
            .send(frame)
            .await
            .map_err(|_| McpError::ConnectionLost)
    }

    /// Whether the connection has been lost.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Shut down the transport: close the write side, wait briefly, then kill.
    pub async fn shutdown(self) {
        // Drop write channel to send EOF to the server
        drop(self.write_tx);
        let mut writer_handle = self.writer_handle;
        let _ = tokio::time::timeout(Duration::from_secs(1), &mut writer_handle).await;

        if let Some(child) = self.child {
            // Give the child 5 seconds to exit gracefully
            let graceful = tokio::time::timeout(Duration::from_secs(5), async {
                let mut child = child.lock().await;
                let _ = child.wait().await;
            })
            .await;

            if graceful.is_err() {
                tracing::warn!("MCP server did not exit in time, killing it");
                let mut child = child.lock().await;
                let _ = child.kill().await;
            }
        }

        self.closed.cancel();
        self.reader_handle.abort();
        writer_handle.abort();
    }
}

async fn route(pending: &PendingMap, resp: JsonRpcResponse) {
    match resp.id.as_ref().and_then(RequestId::as_u64) {
        Some(id) => {
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(resp);
            } else {
                tracing::debug!("Dropping response for unknown request {id}");
            }
        }
        None => tracing::warn!("Dropping response with unexpected id {:?}", resp.id),
    }
}

/// Mark the transport closed and fail every waiting request.
async fn fail_pending(closed: &CancellationToken, pending: &PendingMap) {
    closed.cancel();
    // Dropping the senders wakes each receiver with an error.
    pending.lock().await.clear();
}
