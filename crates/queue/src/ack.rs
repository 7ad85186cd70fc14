//! Acknowledgment of processed batches.
//!
//! All-or-nothing: a successful batch has every message acknowledged, a
//! failed batch has none. A failed batch is dropped here and never
//! re-enqueued; redelivery is the broker's job.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batcher::SealedBatch;
use crate::processor::{BatchProcessor, Outcome};

/// What happened to one sealed batch.
#[derive(Debug, Clone)]
pub struct AckReport {
    pub batch_id: Uuid,
    pub batch_seq: u64,
    pub size: usize,
    pub outcome: Outcome,
    /// Messages acknowledged successfully.
    pub acked: usize,
    /// Acknowledgments the transport rejected.
    pub ack_failures: usize,
    /// Processing plus acknowledgment time.
    pub elapsed: Duration,
}

/// Run the processor on a sealed batch, then acknowledge per the outcome.
pub async fn process_batch(batch: SealedBatch, processor: &dyn BatchProcessor) -> AckReport {
    let batch_start = Instant::now();
    debug!(
        batch_id = %batch.id(),
        batch_seq = batch.seq(),
        size = batch.len(),
        age_ms = batch.age().as_millis() as u64,
        "Processing batch"
    );

    let outcome = processor.process(batch.payloads()).await;
    let mut report = acknowledge_batch(batch, outcome).await;
    report.elapsed = batch_start.elapsed();

    info!(
        batch_id = %report.batch_id,
        batch_seq = report.batch_seq,
        size = report.size,
        outcome = %report.outcome,
        acked = report.acked,
        ack_failures = report.ack_failures,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Batch processed"
    );
    report
}

/// Acknowledge a sealed batch according to its processing outcome.
///
/// A failed acknowledgment is logged and does not stop the remaining ones.
pub async fn acknowledge_batch(batch: SealedBatch, outcome: Outcome) -> AckReport {
    let batch_id = batch.id();
    let batch_seq = batch.seq();
    let size = batch.len();
    let mut acked = 0;
    let mut ack_failures = 0;

    match &outcome {
        Outcome::Success => {
            for msg in batch.into_messages() {
                let message_id = msg.id().to_string();
                let attempt_count = msg.attempt_count();
                match msg.acknowledge().await {
                    Ok(()) => acked += 1,
                    Err(e) => {
                        ack_failures += 1;
                        warn!(
                            batch_id = %batch_id,
                            message_id = %message_id,
                            attempt_count,
                            error = %e,
                            "Failed to ack message; broker may redeliver it"
                        );
                    }
                }
            }
        }
        Outcome::Failure { diagnostic } => {
            warn!(
                batch_id = %batch_id,
                batch_seq,
                size,
                diagnostic = %diagnostic,
                "Batch processing failed; leaving messages unacknowledged"
            );
        }
    }

    AckReport {
        batch_id,
        batch_seq,
        size,
        outcome,
        acked,
        ack_failures,
        elapsed: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::batcher::BatchAccumulator;
    use crate::message::testing::{make_message, RecordingAcker};
    use crate::processor::processor_fn;

    fn sealed(bodies: &[&str], acker: &Arc<RecordingAcker>) -> SealedBatch {
        let mut acc = BatchAccumulator::new(None);
        for body in bodies {
            acc.push(make_message(body, acker));
        }
        acc.seal().unwrap()
    }

    #[tokio::test]
    async fn test_success_acks_every_message() {
        let acker = Arc::new(RecordingAcker::default());
        let report = acknowledge_batch(sealed(&["a", "b", "c"], &acker), Outcome::Success).await;

        assert_eq!(report.acked, 3);
        assert_eq!(report.ack_failures, 0);
        assert_eq!(acker.acked().await, vec!["handle-a", "handle-b", "handle-c"]);
    }

    #[tokio::test]
    async fn test_failure_acks_nothing() {
        let acker = Arc::new(RecordingAcker::default());
        let report =
            acknowledge_batch(sealed(&["a", "b"], &acker), Outcome::failure("timeout")).await;

        assert_eq!(report.acked, 0);
        assert_eq!(report.size, 2);
        assert_eq!(report.outcome, Outcome::failure("timeout"));
        assert!(acker.acked().await.is_empty());
    }

    #[tokio::test]
    async fn test_ack_failure_does_not_stop_remaining() {
        let acker = Arc::new(RecordingAcker::with_stale(&["handle-b"]));
        let report = acknowledge_batch(sealed(&["a", "b", "c"], &acker), Outcome::Success).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.acked, 2);
        assert_eq!(report.ack_failures, 1);
        assert_eq!(acker.acked().await, vec!["handle-a", "handle-c"]);
    }

    #[tokio::test]
    async fn test_process_batch_passes_payloads_and_acks() {
        let acker = Arc::new(RecordingAcker::default());
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let processor = processor_fn(move |payloads| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(payloads);
                Outcome::Success
            }
        });

        let report = process_batch(sealed(&["x", "y"], &acker), &processor).await;
        assert_eq!(report.acked, 2);
        assert_eq!(seen.lock().await.len(), 1);
        assert_eq!(seen.lock().await[0], vec!["x", "y"]);
    }
}
