//! McpServer: owns the sealed tool set and opens sessions over streams.

use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::McpError;
use crate::session::ServerSession;
use compass_tools::SealedRegistry;
use compass_types::Implementation;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// A tool server. Construction fixes its name, version and tools.
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    config: SessionConfig,
}

impl McpServer {
    pub fn new(info: Implementation, registry: SealedRegistry, config: SessionConfig) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(registry, info)),
            config,
        }
    }

    pub fn info(&self) -> &Implementation {
        self.dispatcher.server()
    }

    pub fn tool_count(&self) -> usize {
        self.dispatcher.registry().len()
    }

    /// Open a session over an arbitrary stream pair without running it.
    pub fn session<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> ServerSession<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        ServerSession::new(
            reader,
            writer,
            Arc::clone(&self.dispatcher),
            self.config.clone(),
            shutdown,
        )
    }

    /// Serve one session to completion.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.session(reader, writer, shutdown).run().await
    }

    /// Serve one session on the process's stdin/stdout.
    pub async fn serve_stdio(&self, shutdown: CancellationToken) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_tools::ToolRegistry;

    #[test]
    fn server_reports_injected_info() {
        let server = McpServer::new(
            Implementation::new("compass-protocol", "4.5.6"),
            ToolRegistry::with_builtins("4.5.6").seal(),
            SessionConfig::default(),
        );
        assert_eq!(server.info().version, "4.5.6");
        assert_eq!(server.tool_count(), 3);
    }

    #[tokio::test]
    async fn serve_returns_when_input_ends() {
        let server = McpServer::new(
            Implementation::new("compass-protocol", "dev"),
            ToolRegistry::new().seal(),
            SessionConfig::default(),
        );
        let input: &[u8] = b"";
        let mut output = Vec::new();
        server
            .serve(input, &mut output, CancellationToken::new())
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn serve_answers_each_line_in_order() {
        let server = McpServer::new(
            Implementation::new("compass-protocol", "dev"),
            ToolRegistry::with_builtins("dev").seal(),
            SessionConfig::default(),
        );
        let input: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}
{"jsonrpc":"2.0","id":2,"method":"ping"}
"#;
        let mut output = Vec::new();
        server
            .serve(input, &mut output, CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<u64> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, [1, 2]);
    }

    #[tokio::test]
    async fn signed_id_does_not_end_the_session() {
        let server = McpServer::new(
            Implementation::new("compass-protocol", "dev"),
            ToolRegistry::with_builtins("dev").seal(),
            SessionConfig::default(),
        );
        let input: &[u8] = br#"{"jsonrpc":"2.0","id":-1,"method":"ping"}
{"jsonrpc":"2.0","id":2,"method":"ping"}
"#;
        let mut output = Vec::new();
        server
            .serve(input, &mut output, CancellationToken::new())
            .await
            .unwrap();

        let responses: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], -1);
        assert_eq!(responses[1]["id"], 2);
        assert!(responses.iter().all(|r| r.get("error").is_none()));
    }
}
