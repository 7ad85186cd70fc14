//! Queue error types.

use thiserror::Error;

use tickbatch_core::CoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("arrival queue closed, message {0} not enqueued")]
    Closed(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("queue not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Config(#[from] CoreError),
}

/// Failure to acknowledge a single message.
///
/// Never counts as a processing failure: the batch was already handled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AckError {
    #[error("receipt handle is stale: {0}")]
    Stale(String),

    #[error("transport connection closed: {0}")]
    Closed(String),

    #[error("provider error: {0}")]
    Provider(String),
}
