//! Tool registry for name-based dispatch.
//!
//! Tools are registered once at startup into a [`ToolRegistry`], which is then
//! sealed into a [`SealedRegistry`]. The sealed form is immutable and cheap to
//! clone, so any number of sessions can look tools up without locking.

use compass_types::{ObjectSchema, RegistryError, Tool, ToolDefinition};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered tool: its public description plus the handler that runs it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: ObjectSchema,
    pub handler: Arc<dyn Tool>,
}

impl ToolDescriptor {
    /// Build a descriptor from a tool's own definition.
    pub fn from_tool(tool: Arc<dyn Tool>) -> Self {
        let ToolDefinition {
            name,
            description,
            input_schema,
        } = tool.definition();
        Self {
            name,
            description,
            input_schema,
            handler: tool,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Registry of available tools, mutable until sealed.
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with all built-in tools.
    ///
    /// `version` is what the `version` tool reports.
    pub fn with_builtins(version: impl Into<String>) -> Self {
        let builtins: [Arc<dyn Tool>; 3] = [
            Arc::new(super::GreetTool),
            Arc::new(super::PingTool),
            Arc::new(super::VersionTool::new(version)),
        ];
        let tools = builtins
            .into_iter()
            .map(ToolDescriptor::from_tool)
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        Self { tools }
    }

    /// Register a descriptor. Fails if the name is already taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool {
                name: descriptor.name,
            });
        }
        tracing::debug!("Registered tool '{}'", descriptor.name);
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Register a tool using its own definition.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        self.register(ToolDescriptor::from_tool(tool))
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, RegistryError> {
        lookup(&self.tools, name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Freeze the registry. No further registration is possible.
    pub fn seal(self) -> SealedRegistry {
        SealedRegistry {
            tools: Arc::new(self.tools),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a registry, shareable across tasks.
#[derive(Clone, Debug)]
pub struct SealedRegistry {
    tools: Arc<HashMap<String, ToolDescriptor>>,
}

impl SealedRegistry {
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, RegistryError> {
        lookup(&self.tools, name)
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(ToolDescriptor::definition).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn lookup<'a>(
    tools: &'a HashMap<String, ToolDescriptor>,
    name: &str,
) -> Result<&'a ToolDescriptor, RegistryError> {
    tools.get(name).ok_or_else(|| RegistryError::NotFound {
        name: name.to_string(),
    })
}
