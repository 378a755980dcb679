//! Tool registry and built-in tool implementations for Compass Protocol.

mod func;
mod greet;
mod ping;
mod registry;
mod version;

pub use func::FnTool;
pub use greet::GreetTool;
pub use ping::PingTool;
pub use registry::{SealedRegistry, ToolDescriptor, ToolRegistry};
pub use version::VersionTool;
