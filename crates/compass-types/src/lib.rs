//! Shared types and error hierarchy for Compass Protocol.

pub mod error;
pub mod schema;
pub mod tool;

pub use error::{ConfigError, RegistryError, ToolError};
pub use schema::{ObjectSchema, PropertySchema, SchemaType};
pub use tool::*;
