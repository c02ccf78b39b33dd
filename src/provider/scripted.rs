//! Deterministic scripted gateway for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{EventStream, ProviderGateway, TurnRequest};
use crate::error::{Result, TroupeError};
use crate::types::{
    HandoffDirective, ProposedToolCall, StreamEvent, StreamEventPayload, TurnId,
};

/// One scripted step of a turn.
#[derive(Debug, Clone)]
enum ScriptStep {
    Text(String),
    Thinking(String),
    ToolCall(ProposedToolCall),
    /// Pause before the next step; lets tests exercise cancellation and
    /// deadline paths with paused time.
    Delay(Duration),
    Complete(Option<HandoffDirective>),
    /// Backend-reported turn failure (terminal, not retryable).
    FailTurn(String),
    /// Transport failure (stream `Err`, retryable by the wrapper).
    FailTransport(String),
}

/// Builder for one scripted turn.
#[derive(Debug, Clone, Default)]
pub struct TurnScript {
    steps: Vec<ScriptStep>,
}

impl TurnScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Text(text.into()));
        self
    }

    pub fn thinking(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Thinking(text.into()));
        self
    }

    pub fn tool_call(
        mut self,
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        self.steps.push(ScriptStep::ToolCall(ProposedToolCall {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(duration));
        self
    }

    /// End the turn with a handoff directive.
    pub fn handoff(mut self, target: impl Into<String>, task: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Complete(Some(HandoffDirective {
            target: target.into(),
            task: Some(task.into()),
        })));
        self
    }

    /// End the turn normally.
    pub fn complete(mut self) -> Self {
        self.steps.push(ScriptStep::Complete(None));
        self
    }

    /// End the turn with a backend-reported error.
    pub fn fail_turn(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::FailTurn(message.into()));
        self
    }

    /// Abort the stream with a transport failure.
    pub fn fail_transport(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::FailTransport(message.into()));
        self
    }
}

/// In-process gateway that replays pre-scripted turns in FIFO order.
///
/// Grounded on the mock backend clients the surrounding ecosystem tests
/// with: fully deterministic, no network, and it records every
/// [`TurnRequest`] it receives so tests can assert on prompts and visible
/// history.
#[derive(Default)]
pub struct ScriptedGateway {
    turns: Mutex<VecDeque<TurnScript>>,
    requests: Mutex<Vec<TurnRequest>>,
    cancellations: Arc<Mutex<HashMap<TurnId, CancellationToken>>>,
}

/// Drops the turn's cancellation token when its stream is done, whether it
/// completed, failed, was cancelled, or was dropped by the consumer.
struct CancellationGuard {
    map: Arc<Mutex<HashMap<TurnId, CancellationToken>>>,
    turn_id: TurnId,
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.map
            .lock()
            .expect("cancellation map poisoned")
            .remove(&self.turn_id);
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next turn's script.
    pub fn push_turn(&self, script: TurnScript) {
        self.turns.lock().expect("script queue poisoned").push_back(script);
    }

    /// Number of scripted turns not yet consumed.
    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().expect("script queue poisoned").len()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    #[cfg(test)]
    fn tracked_turns(&self) -> usize {
        self.cancellations
            .lock()
            .expect("cancellation map poisoned")
            .len()
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn start_turn(&self, request: TurnRequest) -> Result<EventStream> {
        let script = self
            .turns
            .lock()
            .expect("script queue poisoned")
            .pop_front()
            .ok_or_else(|| {
                TroupeError::Configuration("scripted gateway: no turn scripted".into())
            })?;

        self.requests
            .lock()
            .expect("request log poisoned")
            .push(request.clone());

        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .expect("cancellation map poisoned")
            .insert(request.turn_id, token.clone());

        let turn_id = request.turn_id;
        let guard = CancellationGuard {
            map: self.cancellations.clone(),
            turn_id,
        };
        let stream = stream! {
            let _guard = guard;
            let mut seq: u64 = 0;
            for step in script.steps {
                if token.is_cancelled() {
                    return;
                }
                seq += 1;
                match step {
                    ScriptStep::Text(text) => {
                        yield Ok(StreamEvent {
                            turn_id,
                            seq,
                            payload: StreamEventPayload::TextDelta { text },
                        });
                    }
                    ScriptStep::Thinking(text) => {
                        yield Ok(StreamEvent {
                            turn_id,
                            seq,
                            payload: StreamEventPayload::Thinking { text },
                        });
                    }
                    ScriptStep::ToolCall(call) => {
                        yield Ok(StreamEvent {
                            turn_id,
                            seq,
                            payload: StreamEventPayload::ToolCallProposed { call },
                        });
                    }
                    ScriptStep::Delay(duration) => {
                        seq -= 1;
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = tokio::time::sleep(duration) => {}
                        }
                    }
                    ScriptStep::Complete(handoff) => {
                        yield Ok(StreamEvent {
                            turn_id,
                            seq,
                            payload: StreamEventPayload::TurnComplete { handoff },
                        });
                        return;
                    }
                    ScriptStep::FailTurn(message) => {
                        yield Ok(StreamEvent {
                            turn_id,
                            seq,
                            payload: StreamEventPayload::Error { message },
                        });
                        return;
                    }
                    ScriptStep::FailTransport(message) => {
                        yield Err(TroupeError::Transport(message));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn cancel(&self, turn_id: TurnId) {
        if let Some(token) = self
            .cancellations
            .lock()
            .expect("cancellation map poisoned")
            .get(&turn_id)
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn replays_steps_in_order_with_increasing_seq() {
        let gateway = ScriptedGateway::new();
        gateway.push_turn(
            TurnScript::new()
                .thinking("planning")
                .text("part one, ")
                .text("part two")
                .complete(),
        );

        let mut stream = gateway
            .start_turn(TurnRequest::new("prompt", Vec::new()))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2, 3, 4]);
        assert!(events.last().unwrap().payload.is_terminal());
    }

    #[tokio::test]
    async fn exhausted_script_is_a_configuration_error() {
        let gateway = ScriptedGateway::new();
        let err = gateway
            .start_turn(TurnRequest::new("prompt", Vec::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TroupeError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_delayed_stream() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_turn(
            TurnScript::new()
                .text("before")
                .delay(Duration::from_secs(60))
                .text("after")
                .complete(),
        );

        let request = TurnRequest::new("prompt", Vec::new());
        let turn_id = request.turn_id;
        let mut stream = gateway.start_turn(request).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first.payload, StreamEventPayload::TextDelta { .. }));

        gateway.cancel(turn_id).await;
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(gateway.tracked_turns(), 0);
    }

    #[tokio::test]
    async fn cancellation_tracking_is_released_after_terminal() {
        let gateway = ScriptedGateway::new();
        gateway.push_turn(TurnScript::new().text("done").complete());
        gateway.push_turn(TurnScript::new().fail_transport("reset"));

        for _ in 0..2 {
            let mut stream = gateway
                .start_turn(TurnRequest::new("prompt", Vec::new()))
                .await
                .unwrap();
            while stream.next().await.is_some() {}
        }
        assert_eq!(gateway.tracked_turns(), 0);
    }

    #[tokio::test]
    async fn records_requests_for_inspection() {
        let gateway = ScriptedGateway::new();
        gateway.push_turn(TurnScript::new().complete());
        let _ = gateway
            .start_turn(TurnRequest::new("you are writer", Vec::new()))
            .await
            .unwrap();
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt, "you are writer");
    }
}
