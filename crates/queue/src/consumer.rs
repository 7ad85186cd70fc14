//! Queue consumer trait and types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::message::{Message, MessageAcker};

/// One delivery as polled from the broker, before it joins the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    /// Identifies this delivery; acking with it removes the message.
    pub receipt_handle: String,
    /// Broker send time.
    pub timestamp: DateTime<Utc>,
    /// 1 on first delivery, higher on redelivery.
    pub attempt_count: u32,
}

impl QueueMessage {
    /// Attach an acknowledgment handle, producing a pipeline [`Message`].
    pub fn into_message(self, acker: Arc<dyn MessageAcker>) -> Message {
        Message::new(self.id, self.body, self.receipt_handle, acker)
            .with_timestamp(self.timestamp)
            .with_attempt_count(self.attempt_count)
    }
}

/// Result of a reachability probe against the source queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub connected: bool,
    /// Visible messages, if the provider reports it.
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} connected={}", self.provider, self.connected)?;
        if let Some(count) = self.approximate_message_count {
            write!(f, " backlog={count}")?;
        }
        Ok(())
    }
}

/// Polling side of a queue transport.
///
/// Acknowledgment comes from the [`MessageAcker`] supertrait, so a consumer
/// hands itself out as the ack handle of every message it polls. There is no
/// negative acknowledgment: an unacknowledged message comes back once the
/// provider's visibility timeout expires.
#[async_trait]
pub trait QueueConsumer: MessageAcker {
    /// Poll up to `max_messages`. May long-poll; an empty vec means nothing
    /// arrived within the wait.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    async fn health_check(&self) -> Result<QueueHealth, QueueError>;

    /// Dead-letter queue depth, `None` when no DLQ is configured.
    async fn dlq_depth(&self) -> Result<Option<u64>, QueueError> {
        Ok(None)
    }
}
