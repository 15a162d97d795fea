//! Domain-level error types for the scheduler engine.

use thiserror::Error;

/// Errors produced by the scheduling engine itself.
///
/// Library code returns `Result<_, SchedulerError>`; the CLI composition
/// layer wraps these with `anyhow::Context` for user-facing messages.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The occurrence oracle was given an expression it could not parse.
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),

    /// A caller requested the full or last occurrence of a series with no
    /// upper bound.
    #[error("cannot enumerate occurrences of an unbounded series")]
    InvalidSeriesBounds,

    /// The handler registry could not resolve a `HandlerReference` to a
    /// constructible type. Recorded as `LastError`, never raised to a
    /// caller as a hard failure.
    #[error("missing or invalid handler: {0}")]
    HandlerUnresolved(String),

    /// A handler or one of its hooks panicked during an attempt.
    #[error("handler raised: {0}")]
    HandlerRaised(String),

    /// The attempt was cancelled cooperatively, either by `Stop(immediate)`
    /// or by its own deadline.
    #[error("cancelled")]
    Cancelled,

    /// A task's `MaximumRuntime` elapsed before the handler returned.
    #[error("timeout exceeded")]
    TimeoutExceeded,

    /// The store failed. Propagates; the engine never swallows this.
    #[error("store error: {0}")]
    StoreError(#[from] sqlx::Error),

    /// A task record failed validation before being persisted.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

/// Convenience alias used throughout the engine.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::ValidationFailed(err.to_string())
    }
}
