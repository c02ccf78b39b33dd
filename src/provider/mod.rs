//! Provider gateway: one internal streaming protocol over heterogeneous
//! model backends.
//!
//! Concrete backend clients live outside this crate; they implement
//! [`ProviderGateway`] and the engine never sees anything but
//! [`StreamEvent`]s. [`RetryingGateway`] layers transport-failure retry on
//! top of any gateway, and [`ScriptedGateway`] is the bundled deterministic
//! backend used by tests and offline runs.

pub mod retry;
pub mod scripted;

pub use retry::RetryingGateway;
pub use scripted::{ScriptedGateway, TurnScript};

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::tools::ToolDescriptor;
use crate::types::{Message, StreamEvent, ThinkingLevel, TurnId};

/// Everything a backend needs to render one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    /// The active agent's fully resolved system prompt.
    pub system_prompt: String,
    /// Visible (non-superseded) history, oldest first.
    pub history: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub thinking: ThinkingLevel,
}

impl TurnRequest {
    pub fn new(system_prompt: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            system_prompt: system_prompt.into(),
            history,
            tools: Vec::new(),
            thinking: ThinkingLevel::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_thinking(mut self, thinking: ThinkingLevel) -> Self {
        self.thinking = thinking;
        self
    }
}

/// Stream of events for one turn.
///
/// `Err` items are transport failures (the connection died, not the model);
/// a turn that the backend itself reports as failed ends with an
/// [`Error`](crate::types::StreamEventPayload::Error) payload instead.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Uniform streaming capability over any model backend.
///
/// Contract: the returned stream yields events in generation order and is
/// terminated by exactly one `TurnComplete` or `Error` payload. Event `seq`
/// starts at 1 for each attempt of a turn; a consumer that observes `seq`
/// restart at 1 mid-turn is seeing a retried attempt and must discard
/// everything it accumulated for that turn (partial attempts are never
/// merged).
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Begin streaming one turn.
    async fn start_turn(&self, request: TurnRequest) -> Result<EventStream>;

    /// Cooperatively cancel an in-flight turn. No-op for unknown ids.
    async fn cancel(&self, turn_id: TurnId);
}
