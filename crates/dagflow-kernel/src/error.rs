//! Crate-level error type for the DAG planning-and-execution engine.

use thiserror::Error;

/// Unified error type shared by the planner, executor, store, and tool layer.
#[derive(Debug, Error)]
pub enum DagFlowError {
    /// Missing agent, invalid cron, oversize system prompt — surfaces synchronously
    /// at the API boundary.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// LLM output not parseable or not schema-conformant after all retries, or the
    /// hard response-size ceiling was exceeded.
    #[error("validation error: {0}")]
    Validation(String),

    /// An id lookup that found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The wave scheduler could not select any ready task while tasks remained.
    #[error("deadlock: plan has unsatisfiable dependencies among {0:?}")]
    Deadlock(Vec<String>),

    /// A tool invocation failed.
    #[error("tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// The LLM transport returned an error.
    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    /// A cooperative abort was observed; distinct from a genuine failure.
    #[error("operation aborted")]
    Abort,

    /// An execution suspended due to an unhandled error mid-run.
    #[error("execution suspended: {0}")]
    Suspended(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DagFlowError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a cooperative abort rather than a genuine
    /// failure — callers must not mark sub-steps `failed` for this case.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

pub type DagFlowResult<T> = Result<T, DagFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_distinguishable() {
        let err = DagFlowError::Abort;
        assert!(err.is_abort());
        let other = DagFlowError::tool("shell", "boom");
        assert!(!other.is_abort());
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: DagFlowError = io_err.into();
        assert!(matches!(err, DagFlowError::Io(_)));
    }
}
