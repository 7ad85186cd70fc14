//! Inbound message with its single-use acknowledgment handle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::AckError;

/// Transport-side acknowledgment.
///
/// Acknowledging removes the message from the broker's redelivery queue.
/// Implementations report an expired or unknown handle as [`AckError::Stale`].
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn ack(&self, receipt_handle: &str) -> Result<(), AckError>;
}

/// Blanket implementation so `Arc<dyn MessageAcker>` can be used directly.
#[async_trait]
impl<T: MessageAcker + ?Sized> MessageAcker for Arc<T> {
    async fn ack(&self, receipt_handle: &str) -> Result<(), AckError> {
        (**self).ack(receipt_handle).await
    }
}

/// One unit of inbound data plus its acknowledgment handle.
///
/// [`Message::acknowledge`] consumes the message, so a handle can be used
/// at most once.
pub struct Message {
    id: String,
    payload: Bytes,
    receipt_handle: String,
    timestamp: DateTime<Utc>,
    attempt_count: u32,
    acker: Arc<dyn MessageAcker>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        payload: impl Into<Bytes>,
        receipt_handle: impl Into<String>,
        acker: Arc<dyn MessageAcker>,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            receipt_handle: receipt_handle.into(),
            timestamp: Utc::now(),
            attempt_count: 1,
            acker,
        }
    }

    /// When the broker accepted the message.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// How many times the broker has delivered this message.
    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Acknowledge this message to the transport.
    pub async fn acknowledge(self) -> Result<(), AckError> {
        self.acker.ack(&self.receipt_handle).await
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .field("receipt_handle", &self.receipt_handle)
            .field("timestamp", &self.timestamp)
            .field("attempt_count", &self.attempt_count)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;

    use tokio::sync::Mutex;

    use super::*;

    /// Records every ack; handles listed in `stale` fail.
    #[derive(Default)]
    pub struct RecordingAcker {
        pub acked: Mutex<Vec<String>>,
        pub stale: HashSet<String>,
    }

    impl RecordingAcker {
        pub fn with_stale(handles: &[&str]) -> Self {
            Self {
                acked: Mutex::new(Vec::new()),
                stale: handles.iter().map(|h| h.to_string()).collect(),
            }
        }

        pub async fn acked(&self) -> Vec<String> {
            self.acked.lock().await.clone()
        }
    }

    #[async_trait]
    impl MessageAcker for RecordingAcker {
        async fn ack(&self, receipt_handle: &str) -> Result<(), AckError> {
            if self.stale.contains(receipt_handle) {
                return Err(AckError::Stale(receipt_handle.to_string()));
            }
            self.acked.lock().await.push(receipt_handle.to_string());
            Ok(())
        }
    }

    pub fn make_message(body: &str, acker: &Arc<RecordingAcker>) -> Message {
        Message::new(
            format!("id-{body}"),
            body.to_string(),
            format!("handle-{body}"),
            acker.clone(),
        )
    }
}
