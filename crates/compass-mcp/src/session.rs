//! Server session: drives the read/dispatch/write cycle on one stream.
//!
//! A session moves `Idle -> Connected` on `initialize`, stays `Connected`
//! while serving requests, and goes through `Closing` to `Closed` when the
//! peer closes the stream, sends `notifications/close`, the shutdown token
//! fires, or the stream turns out to be corrupt. Requests are served strictly
//! one at a time: each response is written before the next line is read.

use crate::config::SessionConfig;
use crate::dispatcher::{CallToolRequest, Dispatcher};
use crate::error::{CodecError, McpError};
use crate::jsonrpc::{
    self, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, METHOD_NOT_FOUND, Message, PARSE_ERROR, RequestId, SERVER_NOT_INITIALIZED,
};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, ListToolsResult, PROTOCOL_VERSION,
    ToolInfo, methods,
};
use compass_types::{Implementation, ToolResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Closing,
    Closed,
}

/// One server-side connection over a reader/writer pair.
pub struct ServerSession<R, W> {
    reader: BufReader<R>,
    writer: W,
    state: SessionState,
    dispatcher: Arc<Dispatcher>,
    config: SessionConfig,
    shutdown: CancellationToken,
    peer: Option<Implementation>,
}

impl<R, W> ServerSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        dispatcher: Arc<Dispatcher>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            state: SessionState::Idle,
            dispatcher,
            config,
            shutdown,
            peer: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The client that completed the handshake, if any.
    pub fn peer(&self) -> Option<&Implementation> {
        self.peer.as_ref()
    }

    /// Serve until the session ends.
    ///
    /// Returns `Ok(())` on a clean close and the fatal error otherwise. A
    /// session that has already closed rejects the call with `SessionClosed`.
    pub async fn run(&mut self) -> Result<(), McpError> {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return Err(McpError::SessionClosed);
        }

        let outcome = self.serve().await;
        if let Err(e) = &outcome {
            tracing::error!("MCP session failed: {e}");
        }

        self.state = SessionState::Closing;
        let flushed = self.writer.shutdown().await;
        self.state = SessionState::Closed;
        tracing::debug!("MCP session closed");

        outcome?;
        flushed?;
        Ok(())
    }

    async fn serve(&mut self) -> Result<(), McpError> {
        while matches!(self.state, SessionState::Idle | SessionState::Connected) {
            let Some(line) = self.read_frame().await? else {
                tracing::debug!("Peer closed the stream");
                break;
            };

            match jsonrpc::decode(&line) {
                Ok(message) => self.handle_message(message).await?,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Rejecting message: {e}");
                    self.send(JsonRpcResponse::failure(
                        jsonrpc::peek_id(&line),
                        INVALID_REQUEST,
                        format!("Invalid request: {e}"),
                    ))
                    .await?;
                }
                Err(e) => {
                    // Best effort: the peer may already be gone.
                    let _ = self
                        .send(JsonRpcResponse::failure(
                            None,
                            PARSE_ERROR,
                            format!("Parse error: {e}"),
                        ))
                        .await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Read the next non-blank line. `None` means end of stream or shutdown.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, McpError> {
        let limit = self.config.max_message_bytes;
        let shutdown = self.shutdown.clone();
        loop {
            let mut buf = Vec::new();
            let mut bounded = (&mut self.reader).take(limit as u64 + 1);
            let read = bounded.read_until(b'\n', &mut buf);
            let n = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Shutdown requested");
                    return Ok(None);
                }
                n = read => n?,
            };

            if n == 0 {
                return Ok(None);
            }
            if buf.last() != Some(&b'\n') && buf.len() > limit {
                return Err(CodecError::MessageTooLarge { limit }.into());
            }
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(buf));
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), McpError> {
        match message {
            Message::Request(req) => {
                let response = self.handle_request(req).await;
                self.send(response).await
            }
            Message::Notification(notif) => {
                self.handle_notification(notif);
                Ok(())
            }
            Message::Response(resp) => {
                tracing::warn!("Ignoring unexpected response (id {:?})", resp.id);
                Ok(())
            }
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest { id, method, params } = req;
        match method.as_str() {
            methods::INITIALIZE => self.initialize(id, params),
            methods::PING => JsonRpcResponse::success(id, serde_json::json!({})),
            _ if self.state != SessionState::Connected => JsonRpcResponse::failure(
                Some(id),
                SERVER_NOT_INITIALIZED,
                format!("Server not initialized: '{method}' sent before initialize"),
            ),
            methods::LIST_TOOLS => self.list_tools(id),
            methods::CALL_TOOL => self.call_tool(id, params).await,
            other => JsonRpcResponse::failure(
                Some(id),
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }

    fn handle_notification(&mut self, notif: JsonRpcNotification) {
        match notif.method.as_str() {
            methods::INITIALIZED => tracing::debug!("Client finished initialization"),
            methods::CLOSE => {
                tracing::info!("Client requested close");
                self.state = SessionState::Closing;
            }
            other => tracing::debug!("Ignoring notification '{other}'"),
        }
    }

    fn initialize(&mut self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        if self.state != SessionState::Idle {
            return JsonRpcResponse::failure(
                Some(id),
                INVALID_REQUEST,
                "Session is already initialized",
            );
        }

        let params: InitializeParams = match parse_params(methods::INITIALIZE, params) {
            Ok(p) => p,
            Err(message) => return JsonRpcResponse::failure(Some(id), INVALID_PARAMS, message),
        };

        if params.protocol_version != PROTOCOL_VERSION {
            tracing::debug!(
                "Client asked for protocol {}, answering with {}",
                params.protocol_version,
                PROTOCOL_VERSION
            );
        }
        tracing::info!(
            "Client '{}' v{} connected",
            params.client_info.name,
            params.client_info.version
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: self.dispatcher.server().clone(),
        };
        self.peer = Some(params.client_info);
        self.state = SessionState::Connected;
        to_response(id, &result)
    }

    fn list_tools(&self, id: RequestId) -> JsonRpcResponse {
        let tools = self
            .dispatcher
            .registry()
            .definitions()
            .iter()
            .map(ToolInfo::from)
            .collect();
        to_response(id, &ListToolsResult { tools })
    }

    async fn call_tool(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(methods::CALL_TOOL, params) {
            Ok(p) => p,
            Err(message) => return JsonRpcResponse::failure(Some(id), INVALID_PARAMS, message),
        };

        let tool = params.name;
        let request = CallToolRequest {
            id: id.clone(),
            tool_name: tool.clone(),
            arguments: params.arguments.unwrap_or(Value::Null),
        };

        let cancel = self.shutdown.child_token();
        let timeout = self.config.tool_timeout();
        let call = self.dispatcher.handle(request, cancel.clone());
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                tracing::warn!("Tool '{tool}' timed out after {}ms", self.config.tool_timeout_ms);
                ToolResult::error(format!(
                    "Tool '{tool}' timed out after {}ms",
                    self.config.tool_timeout_ms
                ))
            }
        };
        to_response(id, &result)
    }

    async fn send(&mut self, response: JsonRpcResponse) -> Result<(), McpError> {
        let bytes = jsonrpc::encode(&Message::Response(response))?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, String> {
    let params = params.ok_or_else(|| format!("'{method}' requires params"))?;
    serde_json::from_value(params).map_err(|e| format!("Invalid params for '{method}': {e}"))
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(Some(id), INTERNAL_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_tools::ToolRegistry;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, DuplexStream, ReadHalf, WriteHalf};

    type Session = ServerSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    struct Peer {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send_raw(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
            let line = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
            self.send_raw(&line.to_string()).await;
            self.recv().await
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    fn session_pair(config: SessionConfig) -> (Session, Peer) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let (server_r, server_w) = tokio::io::split(server_io);
        let (client_r, client_w) = tokio::io::split(client_io);
        let dispatcher = Arc::new(Dispatcher::new(
            ToolRegistry::with_builtins("9.9.9").seal(),
            Implementation::new("compass-protocol", "9.9.9"),
        ));
        let session = ServerSession::new(
            server_r,
            server_w,
            dispatcher,
            config,
            CancellationToken::new(),
        );
        let peer = Peer {
            lines: BufReader::new(client_r).lines(),
            writer: client_w,
        };
        (session, peer)
    }

    fn init_params() -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.0.1"}
        })
    }

    #[tokio::test]
    async fn handshake_then_close_notification() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        assert_eq!(session.state(), SessionState::Idle);

        let server = tokio::spawn(async move {
            let outcome = session.run().await;
            (session, outcome)
        });

        let resp = peer.request(1, "initialize", init_params()).await;
        assert_eq!(resp["result"]["serverInfo"]["version"], "9.9.9");
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        peer.send_raw(r#"{"jsonrpc":"2.0","method":"notifications/close"}"#)
            .await;

        let (mut session, outcome) = server.await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.peer().unwrap().name, "test-client");
        assert!(matches!(session.run().await, Err(McpError::SessionClosed)));
    }

    #[tokio::test]
    async fn tools_rejected_before_initialize() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        let resp = peer.request(1, "tools/list", json!({})).await;
        assert_eq!(resp["error"]["code"], SERVER_NOT_INITIALIZED);

        let resp = peer.request(2, "ping", json!({})).await;
        assert_eq!(resp["result"], json!({}));

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        peer.request(1, "initialize", init_params()).await;
        let resp = peer.request(2, "initialize", init_params()).await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 2);

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn list_and_call_tools() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });
        peer.request(1, "initialize", init_params()).await;

        let resp = peer.request(2, "tools/list", json!({})).await;
        let names: Vec<&str> = resp["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["greet", "ping", "version"]);

        let resp = peer
            .request(3, "tools/call", json!({"name": "version", "arguments": {}}))
            .await;
        assert_eq!(resp["id"], 3);
        assert_eq!(resp["result"]["isError"], false);
        assert_eq!(
            resp["result"]["content"][0]["text"],
            "Compass Protocol MCP Server version: 9.9.9"
        );

        let resp = peer.request(4, "tools/call", json!({"arguments": {}})).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);

        let resp = peer.request(5, "resources/list", json!({})).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn unknown_message_shape_is_recoverable() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        peer.send_raw(r#"{"jsonrpc":"2.0","id":1}"#).await;
        let resp = peer.recv().await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 1);

        peer.send_raw(r#"{"jsonrpc":"2.0","id":{"n":1},"method":"ping"}"#)
            .await;
        let resp = peer.recv().await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert!(resp["id"].is_null());

        peer.send_raw("[1, 2]").await;
        let resp = peer.recv().await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert!(resp["id"].is_null());

        let resp = peer.request(2, "ping", json!({})).await;
        assert_eq!(resp["id"], 2);

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn negative_and_fractional_ids_are_echoed() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        peer.send_raw(r#"{"jsonrpc":"2.0","id":-1,"method":"ping"}"#)
            .await;
        let resp = peer.recv().await;
        assert_eq!(resp["id"], -1);
        assert_eq!(resp["result"], json!({}));

        let initialize =
            json!({"jsonrpc": "2.0", "id": 1.5, "method": "initialize", "params": init_params()});
        peer.send_raw(&initialize.to_string()).await;
        let resp = peer.recv().await;
        assert_eq!(resp["id"], 1.5);
        assert_eq!(resp["result"]["serverInfo"]["name"], "compass-protocol");

        let resp = peer.request(2, "ping", json!({})).await;
        assert_eq!(resp["id"], 2);

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn malformed_line_is_fatal() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        peer.send_raw("{this is not json").await;
        let resp = peer.recv().await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);

        let outcome = server.await.unwrap();
        assert!(matches!(
            outcome,
            Err(McpError::Codec(CodecError::MalformedMessage(_)))
        ));
        assert!(peer.lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_line_is_fatal() {
        let config = SessionConfig {
            max_message_bytes: 64,
            ..SessionConfig::default()
        };
        let (mut session, mut peer) = session_pair(config);
        let server = tokio::spawn(async move { session.run().await });

        let padding = "x".repeat(200);
        peer.send_raw(&format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{padding}"}}}}"#
        ))
        .await;

        let outcome = server.await.unwrap();
        assert!(matches!(
            outcome,
            Err(McpError::Codec(CodecError::MessageTooLarge { limit: 64 }))
        ));
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut session, mut peer) = session_pair(SessionConfig::default());
        let server = tokio::spawn(async move { session.run().await });

        peer.send_raw("").await;
        peer.send_raw("   ").await;
        let resp = peer.request(1, "ping", json!({})).await;
        assert_eq!(resp["id"], 1);

        drop(peer);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn shutdown_token_closes_idle_session() {
        let (server_io, _client_io) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(server_io);
        let dispatcher = Arc::new(Dispatcher::new(
            ToolRegistry::new().seal(),
            Implementation::new("compass-protocol", "dev"),
        ));
        let shutdown = CancellationToken::new();
        let mut session = ServerSession::new(
            r,
            w,
            dispatcher,
            SessionConfig::default(),
            shutdown.clone(),
        );
        shutdown.cancel();
        assert!(session.run().await.is_ok());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
