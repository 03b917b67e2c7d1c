pub mod definitions;
pub mod handlers;
pub mod registry;
pub mod validation;

pub use registry::{create_tool_registry, ToolRegistry};
pub use validation::validate_args;
