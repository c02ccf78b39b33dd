//! Session driver: routes user turns through the active agent, the tool
//! invocation gate, and the conversation store.
//!
//! One session owns one conversation. Exactly one agent is active at any
//! time; handoffs swap it between dispatches within a user turn, bounded by
//! the configured depth. At most one user turn is in flight per session —
//! rollback and consolidation take the same guard, so they can never
//! interleave with a turn writing to the store.

use std::sync::{Arc, Mutex as StdMutex};

use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::definition::AgentDefinition;
use super::registry::AgentRegistry;
use crate::config::TroupeConfig;
use crate::error::{Result, TroupeError};
use crate::gate::{ApprovalPolicy, InvocationGate};
use crate::memory::{recall_within, MemoryStore};
use crate::provider::{ProviderGateway, RetryingGateway, TurnRequest};
use crate::store::ConversationStore;
use crate::tools::{ToolDescriptor, ToolParameters, ToolRegistry, HANDOFF_TOOL};
use crate::types::{
    ContentPart, HandoffDirective, Message, MessageDraft, ProposedToolCall, Role,
    StreamEventPayload, ToolCall, ToolCallState, ToolResult,
};

/// What one completed user turn produced.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Agent that authored the final reply (the active agent afterwards).
    pub final_agent: String,
    /// Text of the final agent message.
    pub reply: String,
    /// Handoffs followed during the turn.
    pub handoffs: usize,
    /// Whether the turn was cut short by [`Session::cancel`].
    pub cancelled: bool,
}

struct DispatchOutcome {
    reply: String,
    handoff: Option<HandoffDirective>,
    cancelled: bool,
}

/// One conversation and the machinery that drives it.
pub struct Session {
    id: Uuid,
    config: TroupeConfig,
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    gate: InvocationGate,
    gateway: Arc<dyn ProviderGateway>,
    memory: Arc<dyn MemoryStore>,
    memory_scope: String,
    store: Arc<ConversationStore>,
    active_agent: StdMutex<String>,
    /// Held for the duration of a user turn; also taken by rollback and
    /// consolidation. `try_lock` everywhere — contention is an error, not
    /// a queue.
    turn_guard: AsyncMutex<()>,
    cancel_token: StdMutex<CancellationToken>,
}

impl Session {
    /// Build a session over the given gateway.
    ///
    /// The gateway is wrapped in a [`RetryingGateway`] driven by
    /// `config.retry`; pass [`RetryPolicy::none`](crate::util::RetryPolicy::none)
    /// there to surface transport failures on the first attempt.
    pub fn new(
        config: TroupeConfig,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        policy: ApprovalPolicy,
        gateway: Arc<dyn ProviderGateway>,
        memory: Arc<dyn MemoryStore>,
    ) -> Result<Self> {
        if !agents.contains(&config.default_agent) {
            return Err(TroupeError::UnknownAgent(config.default_agent.clone()));
        }
        let id = Uuid::new_v4();
        let gate = InvocationGate::new(tools.clone(), policy, config.tool_timeout);
        let gateway: Arc<dyn ProviderGateway> =
            Arc::new(RetryingGateway::new(gateway, config.retry.clone()));
        Ok(Self {
            id,
            memory_scope: id.to_string(),
            active_agent: StdMutex::new(config.default_agent.clone()),
            config,
            agents,
            tools,
            gate,
            gateway,
            memory,
            store: Arc::new(ConversationStore::new()),
            turn_guard: AsyncMutex::new(()),
            cancel_token: StdMutex::new(CancellationToken::new()),
        })
    }

    /// Use a shared memory scope instead of the per-session default, so
    /// facts survive across sessions.
    pub fn with_memory_scope(mut self, scope: impl Into<String>) -> Self {
        self.memory_scope = scope.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn memory_scope(&self) -> &str {
        &self.memory_scope
    }

    pub fn active_agent(&self) -> String {
        self.active_agent
            .lock()
            .expect("active agent poisoned")
            .clone()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Visible history, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.store.current_history()
    }

    /// Cooperatively cancel the in-flight turn, if any.
    ///
    /// Streamed output produced so far is kept and marked incomplete;
    /// executing tool calls are failed with reason `cancelled`.
    pub fn cancel(&self) {
        self.cancel_token
            .lock()
            .expect("cancel token poisoned")
            .cancel();
    }

    /// Run one user turn: append the user message, dispatch the active
    /// agent, follow handoffs, and return when a dispatch ends without one.
    ///
    /// # Errors
    ///
    /// [`TroupeError::InvalidState`] when a turn is already in flight,
    /// [`TroupeError::HandoffDepthExceeded`] when the handoff chain passes
    /// the configured depth, and transport errors once the gateway's retry
    /// budget is spent. Every failure is also recorded in the history.
    pub async fn send_user(&self, text: impl Into<String>) -> Result<TurnReport> {
        let text = text.into();
        let _turn = self.turn_guard.try_lock().map_err(|_| {
            TroupeError::InvalidState("a turn is already in flight for this session".into())
        })?;

        let token = CancellationToken::new();
        *self.cancel_token.lock().expect("cancel token poisoned") = token.clone();

        self.store.append(MessageDraft::user(text.clone()));

        let memory_context = recall_within(
            self.memory.clone(),
            &self.memory_scope,
            &text,
            self.config.memory_recall_k,
            self.config.memory_deadline,
        )
        .await
        .map(|items| {
            items
                .iter()
                .map(|item| format!("- {}", item.content))
                .collect::<Vec<_>>()
                .join("\n")
        });

        let mut handoffs = 0usize;
        let mut task_brief: Option<String> = None;
        let reply;

        loop {
            let agent_name = self.active_agent();
            let agent = self
                .agents
                .get(&agent_name)
                .ok_or_else(|| TroupeError::UnknownAgent(agent_name.clone()))?;

            let outcome = self
                .dispatch(&agent, memory_context.as_deref(), task_brief.take(), &token)
                .await?;

            if outcome.cancelled {
                tracing::info!(session = %self.id, agent = %agent_name, "turn cancelled");
                return Ok(TurnReport {
                    final_agent: agent_name,
                    reply: outcome.reply,
                    handoffs,
                    cancelled: true,
                });
            }

            let Some(directive) = outcome.handoff else {
                reply = outcome.reply;
                break;
            };

            if !self.agents.contains(&directive.target)
                || !agent.may_hand_off_to(&directive.target)
            {
                tracing::debug!(
                    from = %agent.name,
                    target = %directive.target,
                    "ignoring invalid handoff directive"
                );
                reply = outcome.reply;
                break;
            }

            handoffs += 1;
            if handoffs > self.config.max_handoff_depth {
                self.store.append(MessageDraft::system(format!(
                    "handoff chain stopped: {handoffs} chained handoffs exceed the limit of {}",
                    self.config.max_handoff_depth
                )));
                return Err(TroupeError::HandoffDepthExceeded {
                    depth: handoffs,
                    max: self.config.max_handoff_depth,
                });
            }

            tracing::info!(from = %agent.name, to = %directive.target, "handoff");
            // The task brief travels in the target's system prompt, never
            // the store.
            task_brief = Some(match &directive.task {
                Some(task) => format!("## Task from {}\n{task}", agent.name),
                None => format!("## Handoff from {}\nContinue the conversation.", agent.name),
            });
            *self.active_agent.lock().expect("active agent poisoned") = directive.target.clone();
        }

        let final_agent = self.active_agent();
        self.capture_memory(&text, &reply, &final_agent);
        Ok(TurnReport {
            final_agent,
            reply,
            handoffs,
            cancelled: false,
        })
    }

    /// Hide every message after `to_seq` and restore the active agent to
    /// the author of the last still-visible agent message (the default
    /// agent when none remains).
    pub fn rollback(&self, to_seq: u64) -> Result<()> {
        let _turn = self.turn_guard.try_lock().map_err(|_| {
            TroupeError::InvalidState("cannot roll back while a turn is in flight".into())
        })?;
        self.store.rollback(to_seq)?;

        let restored = self
            .store
            .current_history()
            .iter()
            .rev()
            .find(|m| m.role == Role::Agent)
            .and_then(|m| m.agent.clone())
            .unwrap_or_else(|| self.config.default_agent.clone());
        tracing::info!(to_seq, active_agent = %restored, "session rolled back");
        *self.active_agent.lock().expect("active agent poisoned") = restored;
        Ok(())
    }

    /// Replace all but the last `preserve_count` visible messages with a
    /// model-written summary. Returns the summary's sequence number.
    ///
    /// The summarization turn itself is never appended to the store.
    pub async fn consolidate(&self, preserve_count: usize) -> Result<u64> {
        let _turn = self.turn_guard.try_lock().map_err(|_| {
            TroupeError::InvalidState("cannot consolidate while a turn is in flight".into())
        })?;

        let visible = self.store.current_history();
        if preserve_count >= visible.len() {
            return Err(TroupeError::ConsolidatePreserveInvalid {
                preserve: preserve_count,
                visible: visible.len(),
            });
        }

        let to_summarize = visible[..visible.len() - preserve_count].to_vec();
        let summary = self.summarize(to_summarize).await?;
        self.store.consolidate(preserve_count, &summary)
    }

    /// One agent's dispatch: stream model turns, gate tool calls, append
    /// agent messages, until a turn ends without executable tool calls.
    async fn dispatch(
        &self,
        agent: &AgentDefinition,
        memory_context: Option<&str>,
        task_brief: Option<String>,
        token: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let peers = self.agents.peers_visible_to(agent);
        let mut system_prompt = agent.render_system_prompt(&peers);
        if let Some(context) = memory_context {
            system_prompt.push_str("\n\n## Relevant memory\n");
            system_prompt.push_str(context);
        }
        if let Some(brief) = &task_brief {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(brief);
        }

        let mut tools = self.tools.descriptors_for(&agent.tools);
        if !peers.is_empty() {
            tools.push(handoff_descriptor());
        }

        for _round in 0..self.config.max_tool_iterations {
            let request = TurnRequest::new(system_prompt.clone(), self.store.current_history())
                .with_tools(tools.clone())
                .with_thinking(self.config.thinking);
            let turn_id = request.turn_id;

            let mut stream = match self.gateway.start_turn(request).await {
                Ok(stream) => stream,
                Err(err) => {
                    self.append_failed(agent, "", &err.to_string());
                    return Err(err);
                }
            };

            // Accumulators for the current attempt. The gateway contract
            // says `seq` restarts at 1 when a turn is re-attempted, so a
            // restart invalidates everything gathered so far.
            let mut text = String::new();
            let mut proposals: Vec<ProposedToolCall> = Vec::new();
            let mut handoff: Option<HandoffDirective> = None;
            let mut saw_event = false;
            let mut terminal = false;

            loop {
                let cancelled = tokio::select! {
                    _ = token.cancelled() => true,
                    item = stream.next() => {
                        match item {
                            None => break,
                            Some(Ok(event)) => {
                                if saw_event && event.seq == 1 {
                                    tracing::debug!(%turn_id, "attempt restarted, discarding partial output");
                                    text.clear();
                                    proposals.clear();
                                    handoff = None;
                                }
                                saw_event = true;
                                match event.payload {
                                    StreamEventPayload::TextDelta { text: delta } => {
                                        text.push_str(&delta);
                                    }
                                    StreamEventPayload::Thinking { .. } => {}
                                    StreamEventPayload::ToolCallProposed { call } => {
                                        proposals.push(call);
                                    }
                                    StreamEventPayload::ToolCallResult { .. } => {
                                        // Results come from the gate, not the backend.
                                        tracing::debug!(%turn_id, "ignoring backend-supplied tool result");
                                    }
                                    StreamEventPayload::TurnComplete { handoff: directive } => {
                                        handoff = directive;
                                        terminal = true;
                                    }
                                    StreamEventPayload::Error { message } => {
                                        self.append_failed(agent, &text, &message);
                                        return Err(TroupeError::Transport(message));
                                    }
                                }
                                if terminal {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                self.append_failed(agent, &text, &err.to_string());
                                return Err(err);
                            }
                        }
                        false
                    }
                };
                if cancelled {
                    self.gateway.cancel(turn_id).await;
                    let reply = text.clone();
                    self.append_cancelled(agent, text, proposals);
                    return Ok(DispatchOutcome {
                        reply,
                        handoff: None,
                        cancelled: true,
                    });
                }
            }

            if !terminal {
                let message = "turn stream ended without completion".to_string();
                self.append_failed(agent, &text, &message);
                return Err(TroupeError::Transport(message));
            }

            let mut parts: Vec<ContentPart> = Vec::new();
            if !text.is_empty() {
                parts.push(ContentPart::Text { text: text.clone() });
            }

            // Handoff proposals are routing directives: recorded on the
            // message for audit, never gated or executed.
            let mut executable: Vec<ProposedToolCall> = Vec::new();
            for proposal in proposals {
                if proposal.tool_name == HANDOFF_TOOL {
                    let (directive, record) = interpret_handoff(agent, proposal);
                    if handoff.is_none() {
                        handoff = directive;
                    }
                    parts.push(ContentPart::ToolCall(record));
                } else {
                    executable.push(proposal);
                }
            }

            let had_executable = !executable.is_empty();
            let mut cancelled = false;
            for proposal in executable {
                let mut call = ToolCall::proposed(&agent.name, proposal);
                if cancelled {
                    abort_call(&mut call);
                } else {
                    let interrupted = tokio::select! {
                        _ = token.cancelled() => true,
                        _ = self.gate.run(&mut call, &agent.tools) => false,
                    };
                    if interrupted {
                        abort_call(&mut call);
                        cancelled = true;
                    }
                }
                parts.push(ContentPart::ToolCall(call));
            }

            if cancelled {
                self.store
                    .append(MessageDraft::agent(&agent.name, parts).incomplete());
                return Ok(DispatchOutcome {
                    reply: text,
                    handoff: None,
                    cancelled: true,
                });
            }

            self.store.append(MessageDraft::agent(&agent.name, parts));

            if handoff.is_some() || !had_executable {
                return Ok(DispatchOutcome {
                    reply: text,
                    handoff,
                    cancelled: false,
                });
            }
            // Tool results are embedded in the appended message; go around
            // so the model can read them.
        }

        let message = format!(
            "tool loop exceeded {} iterations for agent '{}'",
            self.config.max_tool_iterations, agent.name
        );
        self.store.append(MessageDraft::system(message.clone()));
        Err(TroupeError::InvalidState(message))
    }

    /// Append whatever a cancelled stream produced, marked incomplete.
    fn append_cancelled(
        &self,
        agent: &AgentDefinition,
        text: String,
        proposals: Vec<ProposedToolCall>,
    ) {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::Text { text });
        }
        for proposal in proposals {
            let mut call = ToolCall::proposed(&agent.name, proposal);
            abort_call(&mut call);
            parts.push(ContentPart::ToolCall(call));
        }
        if parts.is_empty() {
            return;
        }
        self.store
            .append(MessageDraft::agent(&agent.name, parts).incomplete());
    }

    /// Record a failed turn: the streamed prefix (incomplete) plus a system
    /// message naming the failure.
    fn append_failed(&self, agent: &AgentDefinition, partial: &str, message: &str) {
        if !partial.is_empty() {
            self.store
                .append(MessageDraft::agent_text(&agent.name, partial).incomplete());
        }
        self.store.append(MessageDraft::system(format!(
            "turn by '{}' failed: {message}",
            agent.name
        )));
    }

    /// Fire-and-forget capture of the exchange into long-term memory.
    fn capture_memory(&self, user_text: &str, reply: &str, agent: &str) {
        let memory = self.memory.clone();
        let scope = self.memory_scope.clone();
        let user_fact = format!("user said: {user_text}");
        let reply_fact = format!("{agent} replied: {reply}");
        let capture_reply = !reply.is_empty();
        tokio::spawn(async move {
            if let Err(err) = memory.upsert(&scope, &user_fact).await {
                tracing::debug!(error = %err, "memory capture failed");
            }
            if capture_reply {
                if let Err(err) = memory.upsert(&scope, &reply_fact).await {
                    tracing::debug!(error = %err, "memory capture failed");
                }
            }
        });
    }

    async fn summarize(&self, messages: Vec<Message>) -> Result<String> {
        let request = TurnRequest::new(
            "Summarize the conversation below into one compact brief. Keep facts, \
             decisions, names and open tasks; drop pleasantries.",
            messages,
        )
        .with_thinking(self.config.thinking);

        let mut stream = self.gateway.start_turn(request).await?;
        let mut summary = String::new();
        let mut saw_event = false;
        while let Some(item) = stream.next().await {
            let event = item?;
            if saw_event && event.seq == 1 {
                summary.clear();
            }
            saw_event = true;
            match event.payload {
                StreamEventPayload::TextDelta { text } => summary.push_str(&text),
                StreamEventPayload::TurnComplete { .. } => return Ok(summary),
                StreamEventPayload::Error { message } => {
                    return Err(TroupeError::Transport(message));
                }
                _ => {}
            }
        }
        Err(TroupeError::Transport(
            "summary stream ended without completion".into(),
        ))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("active_agent", &self.active_agent())
            .field("latest_seq", &self.store.latest_seq())
            .finish()
    }
}

/// Descriptor for the reserved handoff tool, offered whenever the active
/// agent has reachable peers.
fn handoff_descriptor() -> ToolDescriptor {
    let parameters = ToolParameters::object()
        .string("target", "Name of the agent to hand the conversation to", true)
        .string("task", "Precise task brief for the target agent", false)
        .build();
    ToolDescriptor {
        name: HANDOFF_TOOL.to_string(),
        description: "Transfer the active-agent role to another agent".to_string(),
        parameters: parameters.schema,
    }
}

/// Turn a `handoff` tool proposal into a directive plus its audit record.
fn interpret_handoff(
    agent: &AgentDefinition,
    proposal: ProposedToolCall,
) -> (Option<HandoffDirective>, ToolCall) {
    let target = proposal
        .arguments
        .get("target")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let task = proposal
        .arguments
        .get("task")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let mut record = ToolCall::proposed(&agent.name, proposal);
    let _ = record.approve();
    let _ = record.begin_execution();
    match target {
        Some(target) => {
            let ack = serde_json::json!({ "target": target, "task": task });
            let _ = record.complete(ToolResult::ok(record.id.clone(), ack));
            (Some(HandoffDirective { target, task }), record)
        }
        None => {
            let _ = record.fail("handoff missing required 'target' argument");
            (None, record)
        }
    }
}

/// Drive an interrupted call to a terminal state with reason `cancelled`.
fn abort_call(call: &mut ToolCall) {
    let outcome = match call.state() {
        ToolCallState::Proposed => call.deny("cancelled"),
        ToolCallState::Approved => call
            .begin_execution()
            .and_then(|_| call.fail("cancelled")),
        ToolCallState::Executing => call.fail("cancelled"),
        _ => Ok(()),
    };
    if let Err(err) = outcome {
        tracing::debug!(call_id = %call.id, error = %err, "abort transition rejected");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::memory::KeywordMemoryStore;
    use crate::provider::{ScriptedGateway, TurnScript};
    use crate::tools::FnTool;

    fn roster() -> Arc<AgentRegistry> {
        let mut agents = AgentRegistry::new();
        agents.register(
            AgentDefinition::new("writer", "You are a writer.").with_description("Writes prose"),
        );
        agents.register(
            AgentDefinition::new("researcher", "You are a researcher.")
                .with_description("Finds facts")
                .with_tools(vec!["web_search".into()]),
        );
        Arc::new(agents)
    }

    fn tool_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "web_search",
            "Search the web",
            ToolParameters::object()
                .string("query", "Search query", true)
                .build(),
            |args| async move { Ok(serde_json::json!({ "hits": [args["query"]] })) },
        )));
        Arc::new(registry)
    }

    fn session_with(gateway: Arc<ScriptedGateway>) -> Session {
        Session::new(
            TroupeConfig::new("writer").with_max_handoff_depth(2),
            roster(),
            tool_registry(),
            ApprovalPolicy::new().allow("web_search"),
            gateway,
            Arc::new(KeywordMemoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn simple_turn_appends_user_then_agent() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("Hello there.").complete());
        let session = session_with(gateway);

        let report = session.send_user("Hi").await.unwrap();
        assert_eq!(report.reply, "Hello there.");
        assert_eq!(report.final_agent, "writer");
        assert_eq!(report.handoffs, 0);
        assert!(!report.cancelled);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Agent);
        assert_eq!(history[1].agent.as_deref(), Some("writer"));
        assert_eq!(history[1].seq, 2);
    }

    #[tokio::test]
    async fn unknown_default_agent_is_rejected() {
        let err = Session::new(
            TroupeConfig::new("ghost"),
            roster(),
            tool_registry(),
            ApprovalPolicy::new(),
            Arc::new(ScriptedGateway::new()),
            Arc::new(KeywordMemoryStore::new()),
        )
        .unwrap_err();
        assert!(matches!(err, TroupeError::UnknownAgent(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn handoff_chain_produces_five_messages() {
        let gateway = Arc::new(ScriptedGateway::new());
        // writer -> researcher (tool round, then handoff back) -> writer
        gateway.push_turn(
            TurnScript::new()
                .text("Let me pull in research.")
                .handoff("researcher", "Find recent facts about X"),
        );
        gateway.push_turn(
            TurnScript::new()
                .tool_call("tc-1", "web_search", serde_json::json!({ "query": "X" }))
                .complete(),
        );
        gateway.push_turn(
            TurnScript::new()
                .text("Findings attached.")
                .handoff("writer", "Draft the answer from my findings"),
        );
        gateway.push_turn(TurnScript::new().text("Final answer.").complete());
        let session = session_with(gateway.clone());

        let report = session.send_user("Tell me about X").await.unwrap();
        assert_eq!(report.reply, "Final answer.");
        assert_eq!(report.final_agent, "writer");
        assert_eq!(report.handoffs, 2);

        let history = session.history();
        assert_eq!(history.len(), 5);
        let authors: Vec<Option<&str>> = history.iter().map(|m| m.agent.as_deref()).collect();
        assert_eq!(
            authors,
            [None, Some("writer"), Some("researcher"), Some("researcher"), Some("writer")]
        );
        // No standalone tool-result messages: results live on the call.
        assert!(history.iter().all(|m| m.role != Role::ToolResult));
        let calls = history[2].tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].state(), ToolCallState::Completed);
        assert_eq!(calls[0].result().unwrap().payload["hits"][0], "X");

        // The task brief rides in the target's system prompt, not the store.
        let requests = gateway.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[1].system_prompt.contains("Task from writer"));
        assert!(requests[1].system_prompt.contains("Find recent facts about X"));
        assert!(history.iter().all(|m| !m.text().contains("Task from writer")));
    }

    #[tokio::test]
    async fn handoff_depth_limit_fails_the_turn() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().handoff("researcher", "go"));
        gateway.push_turn(TurnScript::new().handoff("writer", "back"));
        gateway.push_turn(TurnScript::new().handoff("researcher", "again"));
        let session = session_with(gateway.clone());

        let err = session.send_user("ping-pong").await.unwrap_err();
        assert!(matches!(
            err,
            TroupeError::HandoffDepthExceeded { depth: 3, max: 2 }
        ));
        let last = session.history().pop().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.text().contains("handoff chain stopped"));

        // The session stays usable.
        gateway.push_turn(TurnScript::new().text("recovered").complete());
        let report = session.send_user("try again").await.unwrap();
        assert_eq!(report.reply, "recovered");
    }

    #[tokio::test]
    async fn handoff_to_unknown_target_is_ignored() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("Over to ghost.").handoff("ghost", "boo"));
        let session = session_with(gateway);

        let report = session.send_user("hello").await.unwrap();
        assert_eq!(report.final_agent, "writer");
        assert_eq!(report.handoffs, 0);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn handoff_tool_proposal_routes_and_is_recorded() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(
            TurnScript::new()
                .tool_call(
                    "tc-h",
                    HANDOFF_TOOL,
                    serde_json::json!({ "target": "researcher", "task": "dig" }),
                )
                .complete(),
        );
        gateway.push_turn(TurnScript::new().text("dug").complete());
        let session = session_with(gateway.clone());

        let report = session.send_user("go").await.unwrap();
        assert_eq!(report.final_agent, "researcher");
        assert_eq!(report.handoffs, 1);

        let history = session.history();
        let calls = history[1].tool_calls();
        assert_eq!(calls[0].tool_name, HANDOFF_TOOL);
        assert_eq!(calls[0].state(), ToolCallState::Completed);
        assert!(gateway.requests()[1].system_prompt.contains("dig"));
    }

    #[tokio::test]
    async fn second_turn_while_one_is_in_flight_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        let session = session_with(gateway);

        let _held = session.turn_guard.try_lock().unwrap();
        let err = session.send_user("busy").await.unwrap_err();
        assert!(matches!(err, TroupeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn rollback_and_consolidate_are_rejected_while_a_turn_is_in_flight() {
        let gateway = Arc::new(ScriptedGateway::new());
        let session = session_with(gateway);

        let _held = session.turn_guard.try_lock().unwrap();
        assert!(matches!(
            session.rollback(0),
            Err(TroupeError::InvalidState(_))
        ));
        assert!(matches!(
            session.consolidate(0).await,
            Err(TroupeError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_partial_output_marked_incomplete() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(
            TurnScript::new()
                .text("partial ")
                .delay(Duration::from_secs(300))
                .text("rest")
                .complete(),
        );
        let session = Arc::new(session_with(gateway));

        let handle = tokio::spawn({
            let session = session.clone();
            async move { session.send_user("go").await }
        });
        // Let the turn consume the first delta and park in the delay.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        session.cancel();

        let report = handle.await.unwrap().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.reply, "partial ");

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert!(history[1].incomplete);
        assert_eq!(history[1].text(), "partial ");
    }

    #[tokio::test]
    async fn backend_error_is_recorded_and_surfaced() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("so far ").fail_turn("model overloaded"));
        let session = session_with(gateway);

        let err = session.send_user("go").await.unwrap_err();
        assert!(matches!(err, TroupeError::Transport(_)));

        let history = session.history();
        // user, incomplete prefix, system failure record
        assert_eq!(history.len(), 3);
        assert!(history[1].incomplete);
        assert_eq!(history[1].text(), "so far ");
        assert_eq!(history[2].role, Role::System);
        assert!(history[2].text().contains("model overloaded"));
    }

    #[tokio::test]
    async fn rollback_restores_the_active_agent() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("handing off").handoff("researcher", "dig"));
        gateway.push_turn(TurnScript::new().text("done digging").complete());
        let session = session_with(gateway);

        session.send_user("go").await.unwrap();
        assert_eq!(session.active_agent(), "researcher");

        // Hide the researcher's message; the writer message is last again.
        session.rollback(2).unwrap();
        assert_eq!(session.active_agent(), "writer");

        // Hide everything; fall back to the default agent.
        session.rollback(0).unwrap();
        assert_eq!(session.active_agent(), "writer");
    }

    #[tokio::test]
    async fn consolidate_asks_the_model_and_rewrites_history() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("one").complete());
        gateway.push_turn(TurnScript::new().text("two").complete());
        let session = session_with(gateway.clone());
        session.send_user("first").await.unwrap();
        session.send_user("second").await.unwrap();
        assert_eq!(session.history().len(), 4);

        gateway.push_turn(TurnScript::new().text("compact summary").complete());
        let summary_seq = session.consolidate(1).await.unwrap();
        assert_eq!(summary_seq, 5);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), "two");
        assert_eq!(history[1].role, Role::System);
        assert_eq!(history[1].text(), "compact summary");

        // The summarization request saw only the messages being folded.
        let request = gateway.requests().last().unwrap().clone();
        assert!(request.system_prompt.contains("Summarize"));
        assert_eq!(request.history.len(), 3);
        // Nothing from that turn was appended.
        assert_eq!(session.store().all_messages().len(), 5);
    }

    #[tokio::test]
    async fn consolidate_rejects_preserve_covering_history_before_the_model_runs() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("hi").complete());
        let session = session_with(gateway.clone());
        session.send_user("hello").await.unwrap();

        let err = session.consolidate(2).await.unwrap_err();
        assert!(matches!(
            err,
            TroupeError::ConsolidatePreserveInvalid { preserve: 2, visible: 2 }
        ));
        assert_eq!(gateway.remaining_turns(), 0);
    }

    #[tokio::test]
    async fn memory_context_lands_in_the_system_prompt() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("Earl Grey, of course.").complete());
        let memory = Arc::new(KeywordMemoryStore::new());
        let session = Session::new(
            TroupeConfig::new("writer"),
            roster(),
            tool_registry(),
            ApprovalPolicy::new(),
            gateway.clone(),
            memory.clone(),
        )
        .unwrap();

        memory
            .upsert(session.memory_scope(), "user prefers tea over coffee")
            .await
            .unwrap();

        session.send_user("what do I drink: tea or coffee?").await.unwrap();
        let prompt = &gateway.requests()[0].system_prompt;
        assert!(prompt.contains("Relevant memory"));
        assert!(prompt.contains("user prefers tea over coffee"));
        // Memory context never becomes a stored message.
        assert!(session
            .history()
            .iter()
            .all(|m| !m.text().contains("prefers tea")));
    }

    #[tokio::test]
    async fn exchanges_are_captured_into_memory() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(TurnScript::new().text("Noted.").complete());
        let memory = Arc::new(KeywordMemoryStore::new());
        let session = Session::new(
            TroupeConfig::new("writer"),
            roster(),
            tool_registry(),
            ApprovalPolicy::new(),
            gateway,
            memory.clone(),
        )
        .unwrap();

        session.send_user("my cat is named Miso").await.unwrap();
        // Capture is fire-and-forget; give the spawned task a chance to run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let items = memory
            .retrieve(session.memory_scope(), "cat Miso", 5)
            .await
            .unwrap();
        assert!(!items.is_empty());
        assert!(items[0].content.contains("Miso"));
    }
}
