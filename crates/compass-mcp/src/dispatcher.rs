//! Dispatcher: turns one `tools/call` request into one tool result.
//!
//! Every failure inside a single invocation (unknown tool, bad arguments, a
//! handler error or panic, cancellation) is converted into an in-band result
//! with `is_error = true`. Nothing here can fail the session.

use crate::jsonrpc::RequestId;
use compass_tools::SealedRegistry;
use compass_types::{Implementation, ToolContext, ToolError, ToolInput, ToolOutput, ToolResult};
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A decoded `tools/call` request.
#[derive(Debug, Clone, PartialEq)]
pub struct CallToolRequest {
    pub id: RequestId,
    pub tool_name: String,
    /// Raw arguments; `Null` means none were sent.
    pub arguments: Value,
}

/// Why a tool call did not produce output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    HandlerFailure { tool: String, message: String },

    #[error("Tool '{tool}' panicked: {message}")]
    HandlerPanicked { tool: String, message: String },

    #[error("Tool '{tool}' was cancelled")]
    Cancelled { tool: String },
}

impl From<DispatchError> for ToolResult {
    fn from(err: DispatchError) -> Self {
        ToolResult::error(err.to_string())
    }
}

/// Resolves, validates and invokes tools from a sealed registry.
pub struct Dispatcher {
    registry: SealedRegistry,
    server: Implementation,
}

impl Dispatcher {
    pub fn new(registry: SealedRegistry, server: Implementation) -> Self {
        Self { registry, server }
    }

    pub fn registry(&self) -> &SealedRegistry {
        &self.registry
    }

    /// The implementation info handed to every tool context.
    pub fn server(&self) -> &Implementation {
        &self.server
    }

    /// Handle a call, always producing a result.
    pub async fn handle(&self, request: CallToolRequest, cancel: CancellationToken) -> ToolResult {
        let id = request.id.clone();
        match self.dispatch(request, cancel).await {
            Ok(output) => output.into(),
            Err(e) => {
                tracing::warn!("tools/call {id}: {e}");
                e.into()
            }
        }
    }

    /// Resolve, validate and run the tool, reporting failures as [`DispatchError`].
    pub async fn dispatch(
        &self,
        request: CallToolRequest,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, DispatchError> {
        let CallToolRequest {
            id,
            tool_name,
            arguments,
        } = request;

        let descriptor = self
            .registry
            .lookup(&tool_name)
            .map_err(|_| DispatchError::ToolNotFound {
                name: tool_name.clone(),
            })?;

        let args = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(DispatchError::InvalidArguments {
                    tool: tool_name,
                    message: format!("arguments must be an object, got {}", kind_of(&other)),
                });
            }
        };

        descriptor
            .input_schema
            .validate(&args)
            .map_err(|message| DispatchError::InvalidArguments {
                tool: tool_name.clone(),
                message,
            })?;

        tracing::debug!("Invoking tool '{tool_name}' for request {id}");

        let ctx =
            ToolContext::new(id.to_string(), self.server.clone()).with_cancel(cancel.clone());
        let input = ToolInput::new(tool_name.clone(), args);
        let handler = &descriptor.handler;
        let call =
            AssertUnwindSafe(async move { handler.execute(input, ctx).await }).catch_unwind();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled { tool: tool_name }),
            outcome = call => match outcome {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(ToolError::InvalidInput { message, .. })) => {
                    Err(DispatchError::InvalidArguments { tool: tool_name, message })
                }
                Ok(Err(ToolError::ExecutionFailed(message))) => {
                    Err(DispatchError::HandlerFailure { tool: tool_name, message })
                }
                Err(payload) => Err(DispatchError::HandlerPanicked {
                    tool: tool_name,
                    message: panic_message(payload.as_ref()),
                }),
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
