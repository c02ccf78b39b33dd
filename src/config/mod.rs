//! Engine configuration.
//!
//! One explicit value passed into session construction. Nothing in the core
//! reads ambient process state; credential and path resolution belong to
//! the embedding application.

use std::time::Duration;

use crate::types::ThinkingLevel;
use crate::util::RetryPolicy;

/// Configuration for sessions and the components they drive.
#[derive(Debug, Clone)]
pub struct TroupeConfig {
    /// Agent activated for the first turn of every new session.
    pub default_agent: String,
    /// Maximum chained handoffs per user turn before
    /// [`HandoffDepthExceeded`](crate::error::TroupeError::HandoffDepthExceeded).
    pub max_handoff_depth: usize,
    /// Maximum model round-trips per agent dispatch (tool loop bound).
    pub max_tool_iterations: usize,
    /// Per-execution timeout enforced by the invocation gate.
    pub tool_timeout: Duration,
    /// Hard deadline for memory recall; slower lookups are dropped.
    pub memory_deadline: Duration,
    /// How many memory items to request per recall.
    pub memory_recall_k: usize,
    /// Transport retry policy; the session wraps its gateway in a
    /// [`RetryingGateway`](crate::provider::RetryingGateway) driven by this.
    pub retry: RetryPolicy,
    /// Thinking level requested from backends.
    pub thinking: ThinkingLevel,
}

impl TroupeConfig {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            default_agent: default_agent.into(),
            max_handoff_depth: 4,
            max_tool_iterations: 8,
            tool_timeout: Duration::from_secs(30),
            memory_deadline: Duration::from_millis(250),
            memory_recall_k: 5,
            retry: RetryPolicy::default(),
            thinking: ThinkingLevel::Off,
        }
    }

    pub fn with_max_handoff_depth(mut self, depth: usize) -> Self {
        self.max_handoff_depth = depth;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_memory_deadline(mut self, deadline: Duration) -> Self {
        self.memory_deadline = deadline;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_thinking(mut self, thinking: ThinkingLevel) -> Self {
        self.thinking = thinking;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = TroupeConfig::new("writer");
        assert_eq!(config.default_agent, "writer");
        assert_eq!(config.max_handoff_depth, 4);
        assert!(config.max_tool_iterations > 0);
        assert!(config.memory_deadline < Duration::from_secs(1));
    }

    #[test]
    fn builders_override_fields() {
        let config = TroupeConfig::new("writer")
            .with_max_handoff_depth(2)
            .with_tool_timeout(Duration::from_secs(1))
            .with_thinking(ThinkingLevel::Brief);
        assert_eq!(config.max_handoff_depth, 2);
        assert_eq!(config.tool_timeout, Duration::from_secs(1));
        assert_eq!(config.thinking, ThinkingLevel::Brief);
    }
}
