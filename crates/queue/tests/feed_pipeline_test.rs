//! End-to-end: mock queue consumer → feed → pipeline → acks back to the consumer.
//!
//! The mock behaves like a visibility-timeout broker: a polled message is
//! hidden until acked; unacked messages become visible again on the next
//! redelivery round triggered by the test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use tickbatch_core::QueueConfig;
use tickbatch_queue::{
    AckError, BatchConfig, BatchPipeline, MessageAcker, Outcome, QueueConsumer, QueueError,
    QueueFeed, QueueHealth, QueueMessage, processor_fn,
};

/// In-memory broker with per-delivery receipt handles.
#[derive(Default)]
struct MemoryBroker {
    visible: Mutex<VecDeque<(String, String, u32)>>,
    /// receipt handle -> (message id, body, attempt)
    in_flight: Mutex<HashMap<String, (String, String, u32)>>,
    acked_ids: Mutex<Vec<String>>,
    deliveries: AtomicUsize,
}

impl MemoryBroker {
    async fn publish(&self, id: &str, body: &str) {
        self.visible
            .lock()
            .await
            .push_back((id.to_string(), body.to_string(), 0));
    }

    /// Simulate visibility timeout expiry: unacked messages reappear.
    async fn expire_in_flight(&self) {
        let mut in_flight = self.in_flight.lock().await;
        let mut visible = self.visible.lock().await;
        let mut expired: Vec<_> = in_flight.drain().map(|(_, v)| v).collect();
        expired.sort();
        visible.extend(expired);
    }

    async fn acked_ids(&self) -> Vec<String> {
        let mut ids = self.acked_ids.lock().await.clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl MessageAcker for MemoryBroker {
    async fn ack(&self, receipt_handle: &str) -> Result<(), AckError> {
        match self.in_flight.lock().await.remove(receipt_handle) {
            Some((id, _, _)) => {
                self.acked_ids.lock().await.push(id);
                Ok(())
            }
            None => Err(AckError::Stale(receipt_handle.to_string())),
        }
    }
}

#[async_trait]
impl QueueConsumer for MemoryBroker {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let batch: Vec<_> = {
            let mut visible = self.visible.lock().await;
            let n = visible.len().min(max_messages as usize);
            visible.drain(..n).collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Ok(Vec::new());
        }

        let mut in_flight = self.in_flight.lock().await;
        let mut out = Vec::with_capacity(batch.len());
        for (id, body, attempt) in batch {
            let delivery = self.deliveries.fetch_add(1, Ordering::SeqCst);
            let receipt_handle = format!("{id}#{delivery}");
            in_flight.insert(receipt_handle.clone(), (id.clone(), body.clone(), attempt + 1));
            out.push(QueueMessage {
                id,
                body,
                receipt_handle,
                timestamp: Utc::now(),
                attempt_count: attempt + 1,
            });
        }
        Ok(out)
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(self.visible.lock().await.len() as u64),
            provider: "memory".to_string(),
        })
    }
}

fn queue_config() -> QueueConfig {
    QueueConfig {
        queue_url: "memory://events".to_string(),
        dlq_url: None,
        visibility_timeout_secs: 30,
        poll_interval_ms: 0,
        max_messages: 4,
        wait_time_secs: 0,
        max_poll_failures: 3,
    }
}

#[tokio::test(start_paused = true)]
async fn broker_messages_are_batched_and_acked() {
    let broker = Arc::new(MemoryBroker::default());
    for i in 0..6 {
        broker.publish(&format!("m{i}"), &format!("message {i}")).await;
    }

    let seen = Arc::new(Mutex::new(Vec::<Vec<Bytes>>::new()));
    let sink = seen.clone();
    let processor = processor_fn(move |payloads| {
        let sink = sink.clone();
        async move {
            sink.lock().await.push(payloads);
            Outcome::Success
        }
    });

    let cfg = BatchConfig {
        flush_interval_ms: 100,
        ..BatchConfig::default()
    };
    let (sender, pipeline) = BatchPipeline::spawn(cfg, processor).unwrap();
    let stop = Arc::new(Notify::new());
    let feed = tokio::spawn(QueueFeed::new(broker.clone(), sender, &queue_config()).run(stop.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let batches = seen.lock().await.clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 6);
    assert_eq!(batches[0][0], "message 0");
    assert_eq!(broker.acked_ids().await, vec!["m0", "m1", "m2", "m3", "m4", "m5"]);
    assert!(broker.in_flight.lock().await.is_empty());

    pipeline.request_shutdown();
    stop.notify_one();
    assert_eq!(feed.await.unwrap().unwrap(), 6);
    let snapshot = pipeline.join().await.unwrap();
    assert_eq!(snapshot.messages_acked, 6);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_redelivered_by_broker_and_acked_once() {
    let broker = Arc::new(MemoryBroker::default());
    broker.publish("x", "payload-x").await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let processor = processor_fn(move |_payloads| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Outcome::failure("transient")
            } else {
                Outcome::Success
            }
        }
    });

    let cfg = BatchConfig {
        flush_interval_ms: 100,
        ..BatchConfig::default()
    };
    let (sender, pipeline) = BatchPipeline::spawn(cfg, processor).unwrap();
    let stop = Arc::new(Notify::new());
    let feed = tokio::spawn(QueueFeed::new(broker.clone(), sender, &queue_config()).run(stop.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(broker.acked_ids().await.is_empty());
    assert_eq!(broker.in_flight.lock().await.len(), 1);

    broker.expire_in_flight().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(broker.acked_ids().await, vec!["x"]);
    assert!(broker.in_flight.lock().await.is_empty());

    pipeline.request_shutdown();
    stop.notify_one();
    assert_eq!(feed.await.unwrap().unwrap(), 2);
    let snapshot = pipeline.join().await.unwrap();
    assert_eq!(snapshot.batches_failed, 1);
    assert_eq!(snapshot.batches_succeeded, 1);
    assert_eq!(snapshot.messages_acked, 1);
}
