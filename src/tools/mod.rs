//! Pluggable tool capabilities and their registry.

pub mod registry;
pub mod tool;
pub mod types;

pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool};
pub use types::{ToolDescriptor, ToolParameters};

/// Reserved tool name through which an agent proposes a handoff.
///
/// Calls to this name are intercepted by the session driver and turned into
/// a [`HandoffDirective`](crate::types::HandoffDirective) instead of being
/// routed through the invocation gate.
pub const HANDOFF_TOOL: &str = "handoff";
