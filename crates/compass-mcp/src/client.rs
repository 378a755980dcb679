//! MCP client: manages one server connection.
//!
//! Handles the handshake (initialize + initialized notification), tool
//! discovery (tools/list), and tool invocation (tools/call). Calls are issued
//! one at a time per client.

use crate::config::ClientConfig;
use crate::error::McpError;
use crate::jsonrpc::JsonRpcResponse;
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, ListToolsResult, PROTOCOL_VERSION,
    ToolInfo, methods,
};
use crate::transport::ClientTransport;
use compass_types::{Implementation, ToolResult};
use serde_json::Value;
use tokio::sync::Mutex;

/// Client for a single MCP server.
pub struct McpClient {
    transport: ClientTransport,
    server_info: Implementation,
    protocol_version: String,
    call_gate: Mutex<()>,
}

impl McpClient {
    /// Spawn the configured server process and connect to it.
    pub async fn spawn(
        config: &ClientConfig,
        client_info: Implementation,
    ) -> Result<Self, McpError> {
        let transport =
            ClientTransport::spawn(&config.command, &config.args, &config.env, config.timeout_ms)?;
        Self::connect(transport, client_info).await
    }

    /// Perform the handshake over an established transport.
    ///
    /// On failure the transport is shut down and the cause is reported as
    /// [`McpError::Handshake`].
    pub async fn connect(
        transport: ClientTransport,
        client_info: Implementation,
    ) -> Result<Self, McpError> {
        match handshake(&transport, client_info).await {
            Ok(init) => {
                tracing::info!(
                    "Connected to MCP server '{}' v{} (protocol {})",
                    init.server_info.name,
                    init.server_info.version,
                    init.protocol_version
                );
                Ok(Self {
                    transport,
                    server_info: init.server_info,
                    protocol_version: init.protocol_version,
                    call_gate: Mutex::new(()),
                })
            }
            Err(e) => {
                transport.shutdown().await;
                Err(McpError::Handshake(e.to_string()))
            }
        }
    }

    /// Call a tool on the server.
    ///
    /// A result with `is_error` set is a normal return; only transport and
    /// protocol failures are errors.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, McpError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result = self
            .request(methods::CALL_TOOL, Some(serde_json::to_value(&params)?))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse tools/call result: {e}")))
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        let result = self.request(methods::LIST_TOOLS, None).await?;
        let list: ListToolsResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
        })?;
        Ok(list.tools)
    }

    /// Protocol-level liveness check.
    pub async fn ping(&self) -> Result<(), McpError> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// Name and version the server reported during the handshake.
    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Tell the server we are leaving and shut the connection down.
    pub async fn close(self) {
        if let Err(e) = self.transport.send_notification(methods::CLOSE, None).await {
            tracing::debug!("Close notification not delivered: {e}");
        }
        self.transport.shutdown().await;
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let _gate = self.call_gate.lock().await;
        let resp = self.transport.send_request(method, params).await?;
        into_result(resp)
    }
}

async fn handshake(
    transport: &ClientTransport,
    client_info: Implementation,
) -> Result<InitializeResult, McpError> {
    let params = InitializeParams {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: serde_json::json!({}),
        client_info,
    };
    let resp = transport
        .send_request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
        .await?;
    let init: InitializeResult = serde_json::from_value(into_result(resp)?)
        .map_err(|e| McpError::Protocol(format!("Failed to parse initialize response: {e}")))?;

    transport.send_notification(methods::INITIALIZED, None).await?;
    Ok(init)
}

fn into_result(resp: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = resp.error {
        return Err(McpError::JsonRpc {
            code: err.code,
            message: err.message,
        });
    }
    resp.result
        .ok_or_else(|| McpError::Protocol("response has neither result nor error".to_string()))
}
