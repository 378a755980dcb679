//! MCP-style tool server and client for Compass Protocol.
//!
//! Messages are newline-delimited JSON-RPC 2.0 objects exchanged over a single
//! bidirectional byte stream (stdin/stdout for a spawned server). The server
//! side decodes each line, dispatches `tools/call` requests to a sealed tool
//! registry, and writes exactly one response per request before reading the
//! next. The client side correlates responses to requests by id.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod jsonrpc;
pub mod protocol;
pub mod server;
pub mod session;
mod transport;

pub use client::McpClient;
pub use config::{ClientConfig, SessionConfig};
pub use dispatcher::{CallToolRequest, DispatchError, Dispatcher};
pub use error::{CodecError, McpError};
pub use jsonrpc::{Message, RequestId};
pub use protocol::ToolInfo;
pub use server::McpServer;
pub use session::{ServerSession, SessionState};
pub use transport::ClientTransport;
