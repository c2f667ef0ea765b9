//! Error types for scheduler and breaker operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the priority scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Submission options were malformed.
    #[error("invalid request options: {0}")]
    InvalidOptions(String),
    /// No handler is registered for the request type.
    #[error("no handler registered for type: {0}")]
    NoHandler(String),
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(String),
    /// The handler did not finish within the request timeout.
    #[error("handler timed out after {0:?}")]
    HandlerTimeout(Duration),
    /// The pending queue is at its configured bound.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// No async runtime was available to drive dispatch.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Whether a request failing with this error may be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Handler(_) | Self::HandlerTimeout(_))
    }
}

/// Errors returned by [`CircuitBreaker::execute`](crate::core::CircuitBreaker::execute).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is not admitting calls; the operation was never invoked.
    #[error("circuit breaker `{name}` is open")]
    Open {
        /// Dependency name.
        name: String,
    },
    /// The operation exceeded the breaker timeout.
    #[error("call through `{name}` timed out after {timeout:?}")]
    Timeout {
        /// Dependency name.
        name: String,
        /// Configured timeout.
        timeout: Duration,
    },
    /// The operation itself failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker rejected the call without running it.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if that is what failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Application-facing result using anyhow for handler code.
pub type AppResult<T> = Result<T, anyhow::Error>;
