//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    /// Reserved for externally appended tool-result messages; the session
    /// embeds results in the proposing call's [`ContentPart::ToolCall`].
    ToolResult,
    /// Engine-produced messages: consolidation summaries, recorded failures.
    System,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    FileRef { uri: String },
    ImageRef { uri: String, mime_type: String },
    ToolCall(ToolCall),
}

/// A not-yet-appended message. The conversation store assigns the sequence
/// number at append time, producing a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDraft {
    pub role: Role,
    /// Originating agent name for agent/tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub content: Vec<ContentPart>,
    /// Set when a turn was cut short (cancel or mid-stream failure) and the
    /// streamed prefix is kept visible rather than retracted.
    #[serde(default)]
    pub incomplete: bool,
}

impl MessageDraft {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            agent: None,
            content: vec![ContentPart::Text { text: text.into() }],
            incomplete: false,
        }
    }

    pub fn agent(name: impl Into<String>, content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Agent,
            agent: Some(name.into()),
            content,
            incomplete: false,
        }
    }

    pub fn agent_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::agent(name, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            agent: None,
            content: vec![ContentPart::Text { text: text.into() }],
            incomplete: false,
        }
    }

    pub fn incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }
}

/// An appended message. Immutable after creation except for the
/// `superseded` flag, which only the conversation store flips (rollback and
/// consolidation never delete).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Strictly increasing and gapless within one conversation.
    pub seq: u64,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub content: Vec<ContentPart>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub incomplete: bool,
    #[serde(default)]
    pub superseded: bool,
}

impl Message {
    pub(crate) fn from_draft(seq: u64, draft: MessageDraft) -> Self {
        Self {
            seq,
            role: draft.role,
            agent: draft.agent,
            content: draft.content,
            created_at: Utc::now(),
            incomplete: draft.incomplete,
            superseded: false,
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool calls embedded in this message.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }
}
