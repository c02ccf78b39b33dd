//! Approval policy types for the tool invocation gate.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::types::ToolCall;

/// An approval request put to the decision source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub agent: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl ApprovalRequest {
    pub fn for_call(call: &ToolCall) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            agent: call.agent.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

/// Decision for one approval request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

/// Async decision source: a human-in-the-loop callback or any external
/// policy engine.
pub type ApprovalHandler =
    Arc<dyn Fn(ApprovalRequest) -> BoxFuture<'static, ApprovalDecision> + Send + Sync>;

/// How the gate decides whether a proposed tool call proceeds.
///
/// Resolution order: deny list, then allow list, then the interactive
/// handler. A call that matches nothing and has no handler is denied — the
/// gate never executes a tool nobody approved.
#[derive(Clone, Default)]
pub struct ApprovalPolicy {
    auto_allow: HashSet<String>,
    deny: HashSet<String>,
    handler: Option<ApprovalHandler>,
}

impl ApprovalPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools approved without asking.
    pub fn allow(mut self, tool_name: impl Into<String>) -> Self {
        self.auto_allow.insert(tool_name.into());
        self
    }

    /// Tools rejected without asking. Deny wins over allow.
    pub fn deny(mut self, tool_name: impl Into<String>) -> Self {
        self.deny.insert(tool_name.into());
        self
    }

    /// Interactive fallback for tools on neither list.
    pub fn with_handler(mut self, handler: ApprovalHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Resolve a decision for the call.
    pub async fn decide(&self, call: &ToolCall) -> ApprovalDecision {
        if self.deny.contains(&call.tool_name) {
            return ApprovalDecision::Deny;
        }
        if self.auto_allow.contains(&call.tool_name) {
            return ApprovalDecision::Approve;
        }
        match &self.handler {
            Some(handler) => handler(ApprovalRequest::for_call(call)).await,
            None => ApprovalDecision::Deny,
        }
    }
}

impl std::fmt::Debug for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalPolicy")
            .field("auto_allow", &self.auto_allow)
            .field("deny", &self.deny)
            .field("handler", &self.handler.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProposedToolCall;

    fn call(name: &str) -> ToolCall {
        ToolCall::proposed(
            "researcher",
            ProposedToolCall {
                id: "tc-1".into(),
                tool_name: name.into(),
                arguments: serde_json::Value::Null,
            },
        )
    }

    #[tokio::test]
    async fn allow_list_approves_without_handler() {
        let policy = ApprovalPolicy::new().allow("web_search");
        assert_eq!(policy.decide(&call("web_search")).await, ApprovalDecision::Approve);
    }

    #[tokio::test]
    async fn deny_list_wins_over_allow_list() {
        let policy = ApprovalPolicy::new().allow("shell").deny("shell");
        assert_eq!(policy.decide(&call("shell")).await, ApprovalDecision::Deny);
    }

    #[tokio::test]
    async fn unlisted_without_handler_is_denied() {
        let policy = ApprovalPolicy::new();
        assert_eq!(policy.decide(&call("anything")).await, ApprovalDecision::Deny);
    }

    #[tokio::test]
    async fn handler_decides_unlisted_tools() {
        let policy = ApprovalPolicy::new().with_handler(Arc::new(|request| {
            Box::pin(async move {
                if request.tool_name == "safe_tool" {
                    ApprovalDecision::Approve
                } else {
                    ApprovalDecision::Deny
                }
            })
        }));
        assert_eq!(policy.decide(&call("safe_tool")).await, ApprovalDecision::Approve);
        assert_eq!(policy.decide(&call("scary_tool")).await, ApprovalDecision::Deny);
    }
}
