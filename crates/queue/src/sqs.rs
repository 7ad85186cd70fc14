//! AWS SQS transport: consumer (poll + ack) and publisher.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use tickbatch_core::{AwsConfig, QueueConfig};

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::{AckError, QueueError};
use crate::message::MessageAcker;
use crate::publisher::QueuePublisher;

/// Upper bound SQS accepts for `MaxNumberOfMessages`.
const SQS_MAX_RECEIVE: u32 = 10;

/// Message group used for FIFO queues; one group keeps publish order.
const FIFO_GROUP_ID: &str = "tickbatch";

/// Normalize an endpoint override; empty means "no override".
fn endpoint_override(endpoint: Option<&str>) -> Option<String> {
    let endpoint = endpoint?.trim();
    if endpoint.is_empty() {
        return None;
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Some(endpoint.to_string())
    } else {
        Some(format!("https://{endpoint}"))
    }
}

/// Build an SQS client from project config.
///
/// The client config is built directly rather than from `aws_config::defaults()`
/// alone, because the shared loader honours `AWS_ENDPOINT_URL`, which may point
/// at another service. Only the credential chain is borrowed from it.
async fn build_client(aws: &AwsConfig) -> Client {
    let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

    let mut sqs_config = aws_sdk_sqs::Config::builder()
        .region(region.clone())
        .behavior_version(BehaviorVersion::latest());

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "tickbatch-static",
        );
        sqs_config = sqs_config.credentials_provider(creds);
    } else {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        sqs_config.set_credentials_provider(shared.credentials_provider());
    }

    if let Some(url) = endpoint_override(aws.endpoint_url.as_deref()) {
        sqs_config = sqs_config.endpoint_url(&url);
    }

    Client::from_conf(sqs_config.build())
}

fn system_attribute<'a>(
    msg: &'a aws_sdk_sqs::types::Message,
    name: &MessageSystemAttributeName,
) -> Option<&'a str> {
    msg.attributes()
        .and_then(|attrs| attrs.get(name))
        .map(String::as_str)
}

/// Convert one received SQS message. A message without a receipt handle
/// cannot be acknowledged, so it is a parse error.
fn to_queue_message(msg: aws_sdk_sqs::types::Message) -> Result<QueueMessage, QueueError> {
    let id = msg.message_id().unwrap_or("unknown").to_string();
    let Some(receipt_handle) = msg.receipt_handle().map(str::to_string) else {
        return Err(QueueError::Parse(format!("message {id} has no receipt handle")));
    };

    // SentTimestamp is epoch millis.
    let timestamp = system_attribute(&msg, &MessageSystemAttributeName::SentTimestamp)
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    let attempt_count =
        system_attribute(&msg, &MessageSystemAttributeName::ApproximateReceiveCount)
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(1);

    Ok(QueueMessage {
        body: msg.body().unwrap_or_default().to_string(),
        id,
        receipt_handle,
        timestamp,
        attempt_count,
    })
}

/// Polls one SQS queue and deletes acknowledged messages from it.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    dlq_url: Option<String>,
    visibility_timeout_secs: i32,
    wait_time_secs: i32,
}

impl SqsConsumer {
    /// Fails with [`QueueError::NotFound`] when no queue URL is configured.
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        if !queue.is_configured() {
            return Err(QueueError::NotFound("QUEUE_URL is not set".into()));
        }

        let client = build_client(aws).await;

        info!(
            queue_url = %queue.queue_url,
            region = %aws.region,
            visibility_timeout_secs = queue.visibility_timeout_secs,
            wait_time_secs = queue.wait_time_secs,
            "Subscribed to SQS queue"
        );

        Ok(Self {
            client,
            queue_url: queue.queue_url.clone(),
            dlq_url: queue.dlq_url.clone(),
            visibility_timeout_secs: queue.visibility_timeout_secs as i32,
            // SQS caps long polling at 20 seconds.
            wait_time_secs: queue.wait_time_secs.min(20) as i32,
        })
    }

    async fn approximate_depth(&self, queue_url: &str) -> Result<Option<u64>, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS attribute lookup failed: {e:?}")))?;

        Ok(resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok()))
    }
}

#[async_trait]
impl MessageAcker for SqsConsumer {
    async fn ack(&self, receipt_handle: &str) -> Result<(), AckError> {
        debug!(receipt_handle, "Acking SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                let stale = e
                    .as_service_error()
                    .map(|se| se.is_receipt_handle_is_invalid())
                    .unwrap_or(false);
                if stale {
                    AckError::Stale(receipt_handle.to_string())
                } else if matches!(e, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
                    AckError::Closed(format!("SQS delete not sent: {e:?}"))
                } else {
                    AckError::Provider(format!("SQS delete failed: {e:?}"))
                }
            })?;

        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let capped = max_messages.clamp(1, SQS_MAX_RECEIVE) as i32;

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(self.wait_time_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let received = resp.messages.unwrap_or_default();
        debug!(count = received.len(), "Received SQS messages");
        received.into_iter().map(to_queue_message).collect()
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let count = self.approximate_depth(&self.queue_url).await?;
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }

    async fn dlq_depth(&self) -> Result<Option<u64>, QueueError> {
        match &self.dlq_url {
            Some(url) => self.approximate_depth(url).await,
            None => Ok(None),
        }
    }
}

/// SQS-backed publisher.
pub struct SqsPublisher {
    client: Client,
    queue_url: String,
    fifo: bool,
}

impl SqsPublisher {
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        if !queue.is_configured() {
            return Err(QueueError::NotFound("QUEUE_URL is not set".into()));
        }
        let client = build_client(aws).await;
        info!(queue_url = %queue.queue_url, fifo = queue.is_fifo(), "SQS publisher initialized");
        Ok(Self {
            client,
            queue_url: queue.queue_url.clone(),
            fifo: queue.is_fifo(),
        })
    }
}

#[async_trait]
impl QueuePublisher for SqsPublisher {
    async fn publish(&self, body: &str) -> Result<String, QueueError> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        if self.fifo {
            request = request
                .message_group_id(FIFO_GROUP_ID)
                .message_deduplication_id(Uuid::new_v4().to_string());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QueueError::Provider(format!("SQS send failed: {e:?}")))?;

        Ok(resp.message_id().unwrap_or("unknown").to_string())
    }
}
