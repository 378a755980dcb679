//! FnTool: a tool backed by a closure.

use compass_types::{
    ObjectSchema, Tool, ToolContext, ToolDefinition, ToolError, ToolFuture, ToolInput, ToolOutput,
};
use std::future::Future;

/// Adapts an async closure to the [`Tool`] trait.
///
/// ```ignore
/// let echo = FnTool::new("echo", "Echo the text back", schema, |input, _ctx| async move {
///     Ok(ToolOutput::text(input.get_str("text").unwrap_or_default()))
/// });
/// ```
pub struct FnTool<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ObjectSchema,
        handler: F,
    ) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler,
        }
    }
}

impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute(&self, input: ToolInput, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin((self.handler)(input, ctx))
    }
}
