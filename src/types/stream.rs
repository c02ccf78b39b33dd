//! Streaming protocol between the provider gateway and turn consumers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tool::{ProposedToolCall, ToolResult};

/// Unique identifier for one streamed turn.
pub type TurnId = Uuid;

/// How much reasoning output the backend should surface.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Brief,
    Extended,
}

/// Directive, produced by a turn's structured output, to transfer the
/// active-agent role to another named agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffDirective {
    pub target: String,
    /// Free-text task brief appended to the target agent's context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// Envelope for one event within a turn.
///
/// `seq` is relative to the producing turn and increases in generation
/// order. Exactly one terminal payload ([`StreamEventPayload::TurnComplete`]
/// or [`StreamEventPayload::Error`]) ends every turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    pub turn_id: TurnId,
    pub seq: u64,
    pub payload: StreamEventPayload,
}

/// Tagged union of everything a backend turn can emit.
///
/// Thinking events are advisory: consumers must not assume any ordering
/// contract between them and `ToolCallProposed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventPayload {
    TextDelta { text: String },
    Thinking { text: String },
    ToolCallProposed { call: ProposedToolCall },
    ToolCallResult { result: ToolResult },
    TurnComplete { handoff: Option<HandoffDirective> },
    Error { message: String },
}

impl StreamEventPayload {
    /// Whether this payload ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnComplete { .. } | Self::Error { .. })
    }
}
