//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::ack::AckReport;

/// Lock-free counters shared between the control loop and its observers.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub messages_received: AtomicU64,
    pub batches_dispatched: AtomicU64,
    pub batches_succeeded: AtomicU64,
    pub batches_failed: AtomicU64,
    /// Timer ticks that found an empty batch.
    pub empty_ticks: AtomicU64,
    pub messages_acked: AtomicU64,
    pub ack_failures: AtomicU64,
    /// Messages dropped unacknowledged at shutdown (final flush disabled).
    pub messages_abandoned: AtomicU64,
    pub total_processing_time_us: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub batches_dispatched: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub empty_ticks: u64,
    pub messages_acked: u64,
    pub ack_failures: u64,
    pub messages_abandoned: u64,
    pub total_processing_time_us: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished batch into the counters.
    pub fn record_report(&self, report: &AckReport) {
        if report.outcome.is_success() {
            self.batches_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.messages_acked.fetch_add(report.acked as u64, Ordering::Relaxed);
        self.ack_failures.fetch_add(report.ack_failures as u64, Ordering::Relaxed);
        self.total_processing_time_us
            .fetch_add(report.elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_succeeded: self.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            empty_ticks: self.empty_ticks.load(Ordering::Relaxed),
            messages_acked: self.messages_acked.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            messages_abandoned: self.messages_abandoned.load(Ordering::Relaxed),
            total_processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::processor::Outcome;

    fn report(outcome: Outcome, acked: usize, ack_failures: usize) -> AckReport {
        AckReport {
            batch_id: Uuid::new_v4(),
            batch_seq: 0,
            size: acked + ack_failures,
            outcome,
            acked,
            ack_failures,
            elapsed: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_record_success_and_failure() {
        let metrics = PipelineMetrics::new();
        metrics.record_report(&report(Outcome::Success, 3, 1));
        metrics.record_report(&report(Outcome::failure("bad"), 0, 0));

        let snap = metrics.snapshot();
        assert_eq!(snap.batches_succeeded, 1);
        assert_eq!(snap.batches_failed, 1);
        assert_eq!(snap.messages_acked, 3);
        assert_eq!(snap.ack_failures, 1);
        assert_eq!(snap.total_processing_time_us, 4_000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = PipelineMetrics::new().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["messages_acked"], 0);
        assert_eq!(json["empty_ticks"], 0);
    }
}
