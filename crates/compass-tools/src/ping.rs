//! Ping tool: health check.

use compass_types::{
    ObjectSchema, Tool, ToolContext, ToolDefinition, ToolFuture, ToolInput, ToolOutput,
};

/// Tool that always answers "pong".
pub struct PingTool;

impl Tool for PingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ping".to_string(),
            description: "Simple health check that returns 'pong'".to_string(),
            input_schema: ObjectSchema::new(),
        }
    }

    fn execute(&self, _input: ToolInput, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async { Ok(ToolOutput::text("pong")) })
    }
}
