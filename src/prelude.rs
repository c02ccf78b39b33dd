//! Convenience re-exports for common use.

pub use crate::agents::{AgentDefinition, AgentRegistry, Session, TurnReport};
pub use crate::config::TroupeConfig;
pub use crate::error::{Result, TroupeError};
pub use crate::gate::{ApprovalDecision, ApprovalPolicy, InvocationGate};
pub use crate::memory::{KeywordMemoryStore, MemoryItem, MemoryStore};
pub use crate::provider::{
    ProviderGateway, RetryingGateway, ScriptedGateway, TurnRequest, TurnScript,
};
pub use crate::store::ConversationStore;
pub use crate::tools::{FnTool, Tool, ToolDescriptor, ToolParameters, ToolRegistry};
pub use crate::types::{
    ContentPart, HandoffDirective, Message, MessageDraft, Role, StreamEvent, StreamEventPayload,
    ThinkingLevel, ToolCall, ToolCallState, ToolResult,
};
