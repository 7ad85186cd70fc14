//! Publishing side of a queue, used to feed test traffic into a subscription.

use async_trait::async_trait;

use tickbatch_core::CoreError;

use crate::error::QueueError;

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish one message body, returning the provider's message id.
    async fn publish(&self, body: &str) -> Result<String, QueueError>;
}

/// Publish `count` numbered messages (`"{prefix} {i}"`), returning their ids.
///
/// Stops at the first failure. A range running past `u64::MAX` is rejected
/// before anything is published.
pub async fn publish_numbered(
    publisher: &dyn QueuePublisher,
    prefix: &str,
    start: u64,
    count: u64,
) -> Result<Vec<String>, QueueError> {
    let end = start.checked_add(count).ok_or_else(|| CoreError::InvalidValue {
        key: "count".to_string(),
        value: format!("{count} messages from {start} overflows u64"),
    })?;

    let mut ids = Vec::new();
    for i in start..end {
        let body = format!("{prefix} {i}");
        let id = publisher.publish(&body).await?;
        tracing::debug!(message_id = %id, body = %body, "Published message");
        ids.push(id);
    }
    Ok(ids)
}
