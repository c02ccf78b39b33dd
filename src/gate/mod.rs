//! Tool invocation gate: approval, execution, timeout.
//!
//! Every model-issued tool call passes through here. The gate drives the
//! call's state machine (Proposed → Approved → Executing → Completed/Failed,
//! or Proposed → Denied), delegates execution to the registered [`Tool`]
//! implementation, and enforces a per-execution timeout. The full
//! transition audit stays on the [`ToolCall`], which the session records in
//! the originating message — approval history is replayable from the
//! conversation store alone.

pub mod policy;

pub use policy::{ApprovalDecision, ApprovalHandler, ApprovalPolicy, ApprovalRequest};

use std::sync::Arc;
use std::time::Duration;

use crate::error::TroupeError;
use crate::tools::ToolRegistry;
use crate::types::{ToolCall, ToolResult};
use crate::util::with_timeout;

/// The gate. Cheap to clone per session.
#[derive(Clone, Debug)]
pub struct InvocationGate {
    tools: Arc<ToolRegistry>,
    policy: ApprovalPolicy,
    execution_timeout: Duration,
}

impl InvocationGate {
    pub fn new(tools: Arc<ToolRegistry>, policy: ApprovalPolicy, execution_timeout: Duration) -> Self {
        Self {
            tools,
            policy,
            execution_timeout,
        }
    }

    /// Run one proposed call to a terminal state.
    ///
    /// `permitted` is the requesting agent's tool list; calls outside it are
    /// denied before the policy is even consulted. Denied and Failed are
    /// terminal — the gate never retries, re-proposal is the agent's choice.
    pub async fn run(&self, call: &mut ToolCall, permitted: &[String]) {
        if !permitted.iter().any(|name| name == &call.tool_name) {
            tracing::debug!(
                tool = %call.tool_name,
                agent = %call.agent,
                "tool not permitted for agent, denying"
            );
            let reason = format!("tool not permitted for agent '{}'", call.agent);
            let _ = call.deny(reason);
            return;
        }

        match self.policy.decide(call).await {
            ApprovalDecision::Deny => {
                let _ = call.deny("approval denied");
                return;
            }
            ApprovalDecision::Approve => {
                if call.approve().is_err() {
                    return;
                }
            }
        }

        let Some(tool) = self.tools.get(&call.tool_name).cloned() else {
            // Approved but unregistered: surface as an execution failure so
            // the agent sees why nothing happened.
            let _ = call.begin_execution();
            let _ = call.fail(format!("tool '{}' not found", call.tool_name));
            return;
        };

        if call.begin_execution().is_err() {
            return;
        }
        tracing::debug!(tool = %call.tool_name, call_id = %call.id, "executing tool");

        let outcome = with_timeout(self.execution_timeout, async {
            tool.execute(&call.arguments).await
        })
        .await;

        match outcome {
            Ok(payload) => {
                let result = ToolResult::ok(call.id.clone(), payload);
                let _ = call.complete(result);
            }
            Err(TroupeError::Timeout(ms)) => {
                let _ = call.fail(format!("execution timed out after {ms}ms"));
            }
            Err(err) => {
                let _ = call.fail(err.to_string());
            }
        }
    }
}
