//! Greet tool: welcomes a person by name.

use compass_types::{
    ObjectSchema, SchemaType, Tool, ToolContext, ToolDefinition, ToolFuture, ToolInput,
    ToolOutput,
};
use serde::Deserialize;

/// Tool that greets a person by name.
pub struct GreetTool;

#[derive(Deserialize)]
struct GreetInput {
    name: String,
}

fn greeting(name: &str) -> String {
    format!("Hello, {name}! Welcome to Compass Protocol MCP Server.")
}

impl Tool for GreetTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "greet".to_string(),
            description: "Greets a person by name".to_string(),
            input_schema: ObjectSchema::new().required_property(
                "name",
                SchemaType::String,
                "the name of the person to greet",
            ),
        }
    }

    fn execute(&self, input: ToolInput, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let input: GreetInput = input.parse()?;
            Ok(ToolOutput::text(greeting(&input.name)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_types::{Implementation, ToolContent};

    fn ctx() -> ToolContext {
        ToolContext::new("1", Implementation::new("compass-protocol", "test"))
    }

    #[tokio::test]
    async fn greets_by_name() {
        let args = serde_json::json!({"name": "Alice"})
            .as_object()
            .cloned()
            .unwrap();
        let output = GreetTool
            .execute(ToolInput::new("greet", args), ctx())
            .await
            .unwrap();
        assert_eq!(
            output.content,
            vec![ToolContent::text(
                "Hello, Alice! Welcome to Compass Protocol MCP Server."
            )]
        );
    }

    #[tokio::test]
    async fn empty_name_is_still_greeted() {
        let args = serde_json::json!({"name": ""}).as_object().cloned().unwrap();
        let output = GreetTool
            .execute(ToolInput::new("greet", args), ctx())
            .await
            .unwrap();
        assert_eq!(
            output.content[0].as_text(),
            Some("Hello, ! Welcome to Compass Protocol MCP Server.")
        );
    }

    #[test]
    fn schema_requires_name() {
        let def = GreetTool.definition();
        assert_eq!(def.input_schema.required(), ["name".to_string()]);
        assert!(def.input_schema.validate(&serde_json::Map::new()).is_err());
    }
}
