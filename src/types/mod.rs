//! Core types shared across the engine.

pub mod message;
pub mod stream;
pub mod tool;

pub use message::{ContentPart, Message, MessageDraft, Role};
pub use stream::{
    HandoffDirective, StreamEvent, StreamEventPayload, ThinkingLevel, TurnId,
};
pub use tool::{ProposedToolCall, ToolCall, ToolCallState, ToolResult};
