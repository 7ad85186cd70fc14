//! Feed loop: polls a [`QueueConsumer`] and deposits messages into the
//! pipeline's arrival queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use tickbatch_core::QueueConfig;

use crate::arrival::ArrivalSender;
use crate::consumer::QueueConsumer;
use crate::error::QueueError;

/// Polls a consumer until stopped or the transport is lost.
pub struct QueueFeed<C> {
    consumer: Arc<C>,
    sender: ArrivalSender,
    max_messages: u32,
    poll_interval: Duration,
    retry_delay: Duration,
    max_poll_failures: u32,
}

impl<C: QueueConsumer + 'static> QueueFeed<C> {
    pub fn new(consumer: Arc<C>, sender: ArrivalSender, config: &QueueConfig) -> Self {
        Self {
            consumer,
            sender,
            max_messages: config.max_messages,
            poll_interval: config.poll_interval(),
            retry_delay: config.poll_interval().max(Duration::from_secs(1)),
            max_poll_failures: config.max_poll_failures.max(1),
        }
    }

    /// Delay between failed polls (default: poll interval, at least 1s).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run until `stop` is notified or the arrival queue closes.
    ///
    /// Returns the number of messages enqueued. After `max_poll_failures`
    /// consecutive poll errors the transport is considered gone and
    /// [`QueueError::Disconnected`] is returned.
    pub async fn run(self, stop: Arc<Notify>) -> Result<u64, QueueError> {
        let mut enqueued: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        info!(
            max_messages = self.max_messages,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Queue feed started"
        );

        loop {
            let polled = tokio::select! {
                _ = stop.notified() => {
                    info!(enqueued, "Queue feed stopped");
                    return Ok(enqueued);
                }
                polled = self.consumer.poll_batch(self.max_messages) => polled,
            };

            let pause = match polled {
                Ok(messages) => {
                    consecutive_failures = 0;
                    if !messages.is_empty() {
                        debug!(count = messages.len(), "Enqueueing polled messages");
                    }
                    for raw in messages {
                        let msg = raw.into_message(self.consumer.clone());
                        match self.sender.enqueue(msg).await {
                            Ok(()) => enqueued += 1,
                            Err(QueueError::Closed(message_id)) => {
                                info!(
                                    enqueued,
                                    message_id = %message_id,
                                    "Arrival queue closed; queue feed stopping"
                                );
                                return Ok(enqueued);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    self.poll_interval
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.max_poll_failures {
                        error!(
                            failures = consecutive_failures,
                            error = %e,
                            "Queue poll keeps failing; giving up"
                        );
                        return Err(QueueError::Disconnected(format!(
                            "{consecutive_failures} consecutive poll failures, last: {e}"
                        )));
                    }
                    warn!(
                        failures = consecutive_failures,
                        "Queue poll error: {}; retrying in {:?}", e, self.retry_delay
                    );
                    self.retry_delay
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = stop.notified() => {
                        info!(enqueued, "Queue feed stopped");
                        return Ok(enqueued);
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }
}
