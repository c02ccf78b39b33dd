//! Tool invocation types: proposed calls, results, and the approval state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TroupeError};

/// A tool call as proposed by a model turn, before the gate has seen it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            payload,
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            payload: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// Approval/execution state of a [`ToolCall`].
///
/// Legal transitions:
/// `Proposed → Approved → Executing → {Completed | Failed}` or
/// `Proposed → Denied`. Denied and Failed are terminal; nothing moves
/// backward and no stage repeats.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallState {
    Proposed,
    Approved,
    Denied,
    Executing,
    Completed,
    Failed,
}

/// One recorded state transition, kept for audit/replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallTransition {
    pub to: ToolCallState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A tool call owned by the message that proposed it.
///
/// Carries the full approval history so the conversation store alone is
/// enough to replay what the gate decided and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    /// Agent that requested the call.
    pub agent: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<ToolResult>,
    transitions: Vec<ToolCallTransition>,
}

impl ToolCall {
    /// Create a call in the `Proposed` state.
    pub fn proposed(agent: impl Into<String>, call: ProposedToolCall) -> Self {
        Self {
            id: call.id,
            agent: agent.into(),
            tool_name: call.tool_name,
            arguments: call.arguments,
            state: ToolCallState::Proposed,
            result: None,
            transitions: vec![ToolCallTransition {
                to: ToolCallState::Proposed,
                at: Utc::now(),
                note: None,
            }],
        }
    }

    pub fn state(&self) -> ToolCallState {
        self.state
    }

    pub fn result(&self) -> Option<&ToolResult> {
        self.result.as_ref()
    }

    /// Audit trail of every transition, oldest first.
    pub fn transitions(&self) -> &[ToolCallTransition] {
        &self.transitions
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ToolCallState::Denied | ToolCallState::Completed | ToolCallState::Failed
        )
    }

    pub fn approve(&mut self) -> Result<()> {
        self.transition(ToolCallState::Proposed, ToolCallState::Approved, None)
    }

    pub fn deny(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(
            ToolCallState::Proposed,
            ToolCallState::Denied,
            Some(reason.into()),
        )
    }

    pub fn begin_execution(&mut self) -> Result<()> {
        self.transition(ToolCallState::Approved, ToolCallState::Executing, None)
    }

    pub fn complete(&mut self, result: ToolResult) -> Result<()> {
        self.transition(ToolCallState::Executing, ToolCallState::Completed, None)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.transition(
            ToolCallState::Executing,
            ToolCallState::Failed,
            Some(reason.clone()),
        )?;
        self.result = Some(ToolResult::error(self.id.clone(), reason));
        Ok(())
    }

    fn transition(
        &mut self,
        expected: ToolCallState,
        to: ToolCallState,
        note: Option<String>,
    ) -> Result<()> {
        if self.state != expected {
            return Err(TroupeError::InvalidState(format!(
                "tool call {} cannot move {} -> {}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        self.transitions.push(ToolCallTransition {
            to,
            at: Utc::now(),
            note,
        });
        Ok(())
    }
}
