//! Version tool: reports the server version it was built with.

use compass_types::{
    ObjectSchema, Tool, ToolContext, ToolDefinition, ToolFuture, ToolInput, ToolOutput,
};

/// Tool that reports a fixed server version.
///
/// The version is injected at construction and never changes afterwards.
pub struct VersionTool {
    version: String,
}

impl VersionTool {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Tool for VersionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "version".to_string(),
            description: "Returns the server version".to_string(),
            input_schema: ObjectSchema::new(),
        }
    }

    fn execute(&self, _input: ToolInput, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            Ok(ToolOutput::text(format!(
                "Compass Protocol MCP Server version: {}",
                self.version
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_types::Implementation;

    #[tokio::test]
    async fn reports_injected_version() {
        let tool = VersionTool::new("1.2.3");
        let ctx = ToolContext::new("7", Implementation::new("compass-protocol", "1.2.3"));
        let first = tool.execute(ToolInput::default(), ctx.clone()).await.unwrap();
        let second = tool.execute(ToolInput::default(), ctx).await.unwrap();
        assert_eq!(
            first,
            ToolOutput::text("Compass Protocol MCP Server version: 1.2.3")
        );
        assert_eq!(first, second);
    }
}
