//! Tool vocabulary: which capabilities a parsed call may name.
//!
//! - [`registry`]: `ToolKind`, `ToolRegistry`
//! - [`call`]: `ToolCall`

pub mod call;
pub mod registry;

pub use call::ToolCall;
pub use registry::{ToolKind, ToolRegistry, DATABASE_TOOLS, SHELL_TOOL, TERMINATE_TOOL};
