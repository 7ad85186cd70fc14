//! The batching control loop.
//!
//! One task owns the open batch and multiplexes every event that touches it
//! through a single `select!`: arrivals, flush ticks, the shutdown signal and
//! (in concurrent mode) completion of in-flight batches. The swap in
//! [`BatchAccumulator::seal`] is therefore the only batch boundary; a message
//! received after it lands in the next batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tickbatch_core::{BatchConfig, DispatchMode};

use crate::ack::{process_batch, AckReport};
use crate::arrival::{arrival_queue, ArrivalReceiver, ArrivalSender};
use crate::batcher::BatchAccumulator;
use crate::error::QueueError;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::processor::BatchProcessor;

/// Why a batch was sealed.
#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Tick,
    Full,
    Shutdown,
}

impl FlushReason {
    fn as_str(self) -> &'static str {
        match self {
            FlushReason::Tick => "tick",
            FlushReason::Full => "max_batch_size",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// How the control loop stopped.
enum Exit {
    Requested,
    ArrivalsClosed,
}

/// Entry point for starting a batching pipeline.
pub struct BatchPipeline;

impl BatchPipeline {
    /// Validate `config`, spawn the control loop, and return the sender the
    /// transport feeds plus a handle for shutdown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<P: BatchProcessor>(
        config: BatchConfig,
        processor: P,
    ) -> Result<(ArrivalSender, PipelineHandle), QueueError> {
        config.validate()?;

        let (sender, arrivals) = arrival_queue(config.arrival_capacity);
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = Arc::new(Notify::new());
        let shutdown_requested = Arc::new(AtomicBool::new(false));

        info!(
            flush_interval_ms = config.flush_interval_ms,
            flush_on_shutdown = config.flush_on_shutdown,
            max_batch_size = ?config.max_batch_size,
            arrival_capacity = ?config.arrival_capacity,
            dispatch = %config.dispatch,
            "Batch pipeline started"
        );

        let control = ControlLoop {
            arrivals,
            accumulator: BatchAccumulator::new(config.max_batch_size),
            processor: Arc::new(processor),
            metrics: metrics.clone(),
            dispatch: config.dispatch,
            flush_interval: config.flush_interval(),
            flush_on_shutdown: config.flush_on_shutdown,
            shutdown: shutdown.clone(),
            shutdown_requested: shutdown_requested.clone(),
            in_flight: JoinSet::new(),
        };
        let task = tokio::spawn(control.run());

        Ok((
            sender,
            PipelineHandle {
                task,
                metrics,
                shutdown,
                shutdown_requested,
            },
        ))
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    task: JoinHandle<Result<(), QueueError>>,
    metrics: Arc<PipelineMetrics>,
    shutdown: Arc<Notify>,
    shutdown_requested: Arc<AtomicBool>,
}

impl PipelineHandle {
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Ask the control loop to stop without waiting for it.
    ///
    /// After this, closing the arrival queue counts as a clean stop rather
    /// than a transport disconnect.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Stop the pipeline and wait until every dispatched batch has been
    /// processed and acknowledged.
    pub async fn shutdown(self) -> Result<MetricsSnapshot, QueueError> {
        self.request_shutdown();
        self.join().await
    }

    /// Wait for the control loop to finish on its own.
    ///
    /// Returns [`QueueError::Disconnected`] if every [`ArrivalSender`] was
    /// dropped before a shutdown was requested.
    pub async fn join(self) -> Result<MetricsSnapshot, QueueError> {
        let result = self
            .task
            .await
            .map_err(|e| QueueError::Pipeline(format!("control loop aborted: {e}")))?;
        let snapshot = self.metrics.snapshot();
        result.map(|()| snapshot)
    }
}

struct ControlLoop {
    arrivals: ArrivalReceiver,
    accumulator: BatchAccumulator,
    processor: Arc<dyn BatchProcessor>,
    metrics: Arc<PipelineMetrics>,
    dispatch: DispatchMode,
    flush_interval: Duration,
    flush_on_shutdown: bool,
    shutdown: Arc<Notify>,
    shutdown_requested: Arc<AtomicBool>,
    in_flight: JoinSet<AckReport>,
}

impl ControlLoop {
    async fn run(mut self) -> Result<(), QueueError> {
        // First tick one full interval after start, not immediately.
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                _ = self.shutdown.notified() => break Exit::Requested,
                arrival = self.arrivals.recv() => match arrival {
                    Some(msg) => {
                        self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if self.accumulator.push(msg) {
                            self.flush(FlushReason::Full).await;
                        }
                    }
                    None if self.shutdown_requested.load(Ordering::SeqCst) => break Exit::Requested,
                    None => break Exit::ArrivalsClosed,
                },
                _ = ticker.tick() => self.flush(FlushReason::Tick).await,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.reap(joined);
                }
            }
        };

        self.finish().await;

        match exit {
            Exit::Requested => {
                info!("Batch pipeline stopped");
                Ok(())
            }
            Exit::ArrivalsClosed => {
                error!("Arrival queue closed without shutdown request");
                Err(QueueError::Disconnected(
                    "all arrival senders dropped".to_string(),
                ))
            }
        }
    }

    /// Shutdown sequence: no more ticks, drain what already arrived, flush
    /// (or abandon) the final batch, then wait for in-flight batches.
    async fn finish(&mut self) {
        self.arrivals.close();
        while let Some(msg) = self.arrivals.recv().await {
            self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
            if self.accumulator.push(msg) {
                self.flush(FlushReason::Full).await;
            }
        }

        if self.flush_on_shutdown {
            self.flush(FlushReason::Shutdown).await;
        } else if let Some(batch) = self.accumulator.seal() {
            warn!(
                batch_seq = batch.seq(),
                size = batch.len(),
                "Final flush disabled; leaving partial batch unacknowledged"
            );
            self.metrics
                .messages_abandoned
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
        }

        if !self.in_flight.is_empty() {
            info!(in_flight = self.in_flight.len(), "Waiting for in-flight batches");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            self.reap(joined);
        }
    }

    async fn flush(&mut self, reason: FlushReason) {
        let Some(batch) = self.accumulator.seal() else {
            if matches!(reason, FlushReason::Tick) {
                self.metrics.empty_ticks.fetch_add(1, Ordering::Relaxed);
                debug!("Flush tick with empty batch; skipping");
            }
            return;
        };

        self.metrics.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            batch_seq = batch.seq(),
            size = batch.len(),
            reason = reason.as_str(),
            "Flushing batch"
        );

        match self.dispatch {
            DispatchMode::Inline => {
                let report = process_batch(batch, self.processor.as_ref()).await;
                self.metrics.record_report(&report);
            }
            DispatchMode::Concurrent => {
                let processor = self.processor.clone();
                self.in_flight
                    .spawn(async move { process_batch(batch, processor.as_ref()).await });
            }
        }
    }

    fn reap(&self, joined: Result<AckReport, JoinError>) {
        match joined {
            Ok(report) => self.metrics.record_report(&report),
            Err(e) => {
                // The batch's messages died with the task, unacknowledged.
                error!(error = %e, "Batch task failed; messages left for redelivery");
                self.metrics.batches_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
