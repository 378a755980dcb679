//! Tool trait and related types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::schema::ObjectSchema;

/// Name and version of a protocol participant (server or client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Static description of a tool: what it is called and what it accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ObjectSchema,
}

/// A single content item in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
    Structured { data: Value },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }

    /// The text of this item, if it is a text item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            ToolContent::Structured { .. } => None,
        }
    }
}

/// What a successful handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    /// A single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
        }
    }

    /// A single structured-data item.
    pub fn structured(data: Value) -> Self {
        Self {
            content: vec![ToolContent::Structured { data }],
        }
    }
}

/// The outcome of a tool call as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    /// Create an error text result.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: true,
        }
    }

    /// All text items joined with newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ToolContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<ToolOutput> for ToolResult {
    fn from(output: ToolOutput) -> Self {
        Self {
            content: output.content,
            is_error: false,
        }
    }
}

/// Arguments that have already passed the tool's schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolInput {
    tool: String,
    args: Map<String, Value>,
}

impl ToolInput {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Deserialize the arguments into a typed input struct.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.args)).map_err(|e| ToolError::InvalidInput {
            tool: self.tool,
            message: e.to_string(),
        })
    }
}

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Correlation id of the request being served, as text.
    pub request_id: String,
    /// The server the tool is running in.
    pub server: Implementation,
    /// Fires when the call is cancelled or times out.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(request_id: impl Into<String>, server: Implementation) -> Self {
        Self {
            request_id: request_id.into(),
            server,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;

/// Trait that all tools must implement.
///
/// A tool is a named operation the server exposes for remote invocation.
/// Implementations only see arguments that already match
/// [`ToolDefinition::input_schema`].
pub trait Tool: Send + Sync {
    /// Name, description and input schema. The name is the registry key.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with validated input.
    ///
    /// The context is passed by value to avoid lifetime issues with dyn dispatch.
    fn execute(&self, input: ToolInput, ctx: ToolContext) -> ToolFuture<'_>;
}
