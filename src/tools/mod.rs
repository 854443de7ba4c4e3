//! Tool system for function calling.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolExecutionContext, ToolHandler};
pub use types::{ParameterBuilder, ToolDefinition, ToolParameters};
pub use validation::{BasicSchemaValidator, SchemaValidator};
