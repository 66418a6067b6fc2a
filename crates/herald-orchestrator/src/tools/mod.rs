//! Tool abstraction shared by the planner and executor.

pub mod catalog;
pub mod registry;
pub mod tool;

pub use registry::{ToolRegistry, ToolStats, ToolUsage};
pub use tool::{
    FnHandler, ParamType, ToolArguments, ToolCategory, ToolDescriptor, ToolEnvelope, ToolExample, ToolHandler,
    ToolParameters, ToolPropertySchema, handler_fn,
};
