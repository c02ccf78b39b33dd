//! Error types for Troupe.

use thiserror::Error;

/// Primary error type for all Troupe operations.
#[derive(Error, Debug)]
pub enum TroupeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Handoff depth exceeded: {depth} chained handoffs (max {max})")]
    HandoffDepthExceeded { depth: usize, max: usize },

    #[error("Rollback out of range: requested seq {requested}, latest is {latest}")]
    RollbackOutOfRange { requested: u64, latest: u64 },

    #[error("Invalid preserve count for consolidation: {preserve} (visible history has {visible} messages)")]
    ConsolidatePreserveInvalid { preserve: usize, visible: usize },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Timeout,
    ToolExecution,
    Validation,
    Configuration,
    Serialization,
    State,
    Unknown,
}

impl TroupeError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::RollbackOutOfRange { .. }
            | Self::ConsolidatePreserveInvalid { .. }
            | Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::Configuration(_) | Self::UnknownAgent(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidState(_) | Self::HandoffDepthExceeded { .. } => ErrorCategory::State,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Only transport-level failures qualify. Tool failures, denials and
    /// validation errors are terminal for the operation that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Timeout
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TroupeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(TroupeError::Transport("connection reset".into()).is_retryable());
        assert!(TroupeError::Timeout(5_000).is_retryable());
    }

    #[test]
    fn tool_and_validation_errors_are_not_retryable() {
        let tool = TroupeError::ToolExecution {
            tool_name: "web_search".into(),
            message: "boom".into(),
        };
        assert!(!tool.is_retryable());
        assert!(!TroupeError::RollbackOutOfRange { requested: 9, latest: 3 }.is_retryable());
        assert!(!TroupeError::HandoffDepthExceeded { depth: 5, max: 4 }.is_retryable());
    }

    #[test]
    fn categories_map_by_variant() {
        assert_eq!(
            TroupeError::UnknownAgent("writer".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            TroupeError::ConsolidatePreserveInvalid { preserve: 10, visible: 2 }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            TroupeError::InvalidState("turn in flight".into()).category(),
            ErrorCategory::State
        );
    }

    #[test]
    fn display_includes_context() {
        let err = TroupeError::HandoffDepthExceeded { depth: 5, max: 4 };
        let text = err.to_string();
        assert!(text.contains('5'));
        assert!(text.contains('4'));
    }
}
