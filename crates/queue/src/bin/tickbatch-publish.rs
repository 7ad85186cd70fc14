//! tickbatch-publish: publish numbered test messages to a queue.
//!
//! Without `--count` it publishes until interrupted.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use tickbatch_core::config::{load_dotenv, Config};
use tickbatch_queue::{publish_numbered, QueuePublisher, SqsPublisher};

#[derive(Parser, Debug)]
#[command(name = "tickbatch-publish", version, about)]
struct Cli {
    /// Config profile (prefix for env keys); defaults to TICKBATCH_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Queue URL; overrides QUEUE_URL.
    #[arg(long)]
    queue_url: Option<String>,

    /// Body prefix; each message is "<prefix> <n>".
    #[arg(long, default_value = "message")]
    prefix: String,

    /// First message number.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Number of messages to publish (omit to run until Ctrl+C).
    #[arg(long)]
    count: Option<u64>,

    /// Pause between messages when running until interrupted.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(url) = &cli.queue_url {
        config.queue.queue_url = url.clone();
    }

    let publisher = SqsPublisher::new(&config.aws, &config.queue).await?;

    if let Some(count) = cli.count {
        let ids = publish_numbered(&publisher, &cli.prefix, cli.start, count).await?;
        info!(published = ids.len(), "Done");
        return Ok(());
    }

    let delay = Duration::from_millis(cli.delay_ms);
    let mut next = cli.start;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let body = format!("{} {}", cli.prefix, next);
        tokio::select! {
            _ = &mut ctrl_c => break,
            published = publisher.publish(&body) => {
                let id = published?;
                info!(message_id = %id, body = %body, "Published message");
            }
        }
        next += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    info!(published = next - cli.start, "Interrupted");
    Ok(())
}
