//! tickbatch-worker: consume a queue through the time-bounded batching pipeline.
//!
//! Polls SQS, accumulates messages into batches flushed on a fixed interval,
//! logs each batch's payloads, and acknowledges only successful batches.
//!
//! # Usage
//!
//! ```bash
//! # Everything from the environment / .env
//! QUEUE_URL=https://sqs.ap-southeast-1.amazonaws.com/123456789/events tickbatch-worker
//!
//! # Override batching on the command line
//! tickbatch-worker --flush-interval-ms 2000 --max-batch-size 500 --dispatch concurrent
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use tickbatch_core::config::{load_dotenv, Config};
use tickbatch_core::DispatchMode;
use tickbatch_queue::{BatchPipeline, LoggingProcessor, QueueConsumer, QueueFeed, SqsConsumer};

/// Batch and acknowledge messages from a queue subscription.
#[derive(Parser, Debug)]
#[command(name = "tickbatch-worker", version, about)]
struct Cli {
    /// Config profile (prefix for env keys); defaults to TICKBATCH_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Queue URL; overrides QUEUE_URL.
    #[arg(long)]
    queue_url: Option<String>,

    /// Interval between flushes in milliseconds; overrides FLUSH_INTERVAL_MS.
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Flush early once a batch holds this many messages.
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Bound the arrival queue (applies backpressure to polling).
    #[arg(long)]
    arrival_capacity: Option<usize>,

    /// Batch dispatch mode: "inline" or "concurrent".
    #[arg(long)]
    dispatch: Option<DispatchMode>,

    /// Leave the final partial batch unacknowledged on shutdown.
    #[arg(long)]
    no_final_flush: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(url) = self.queue_url {
            config.queue.queue_url = url;
        }
        if let Some(ms) = self.flush_interval_ms {
            config.batch.flush_interval_ms = ms;
        }
        if self.max_batch_size.is_some() {
            config.batch.max_batch_size = self.max_batch_size;
        }
        if self.arrival_capacity.is_some() {
            config.batch.arrival_capacity = self.arrival_capacity;
        }
        if let Some(dispatch) = self.dispatch {
            config.batch.dispatch = dispatch;
        }
        if self.no_final_flush {
            config.batch.flush_on_shutdown = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!(?cli, "starting tickbatch-worker");

    let config = cli.into_config();
    config.log_summary();

    let consumer = Arc::new(SqsConsumer::new(&config.aws, &config.queue).await?);
    match consumer.health_check().await {
        Ok(health) => info!(%health, "Queue reachable"),
        Err(e) => warn!(error = %e, "Queue health check failed; polling anyway"),
    }
    match consumer.dlq_depth().await {
        Ok(Some(depth)) => info!(dlq_depth = depth, "Dead-letter queue depth"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Dead-letter queue check failed"),
    }

    let (sender, pipeline) = BatchPipeline::spawn(config.batch.clone(), LoggingProcessor)?;

    let stop_feed = Arc::new(Notify::new());
    let feed = QueueFeed::new(consumer.clone(), sender, &config.queue);
    let mut feed_task = tokio::spawn(feed.run(stop_feed.clone()));

    let finished_feed = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            None
        }
        joined = &mut feed_task => Some(joined),
    };

    // Mark the stop as intentional before the feed drops its sender.
    pipeline.request_shutdown();
    let feed_result = match finished_feed {
        Some(joined) => joined,
        None => {
            stop_feed.notify_one();
            feed_task.await
        }
    };

    // Waits for in-flight batches, so no ack happens after the client is gone.
    let pipeline_result = pipeline.join().await;
    drop(consumer);

    match &pipeline_result {
        Ok(snapshot) => info!(
            metrics = %serde_json::to_string(snapshot).unwrap_or_default(),
            "Pipeline drained"
        ),
        Err(e) => warn!(error = %e, "Pipeline stopped with error"),
    }

    let enqueued = feed_result??;
    pipeline_result?;
    info!(enqueued, "tickbatch-worker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
