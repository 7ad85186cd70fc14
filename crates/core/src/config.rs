use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize_opt(profile: &str, key: &str) -> Option<usize> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub batch: BatchConfig,
    pub queue: QueueConfig,
    pub aws: AwsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TICKBATCH_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TICKBATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            batch: BatchConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  batch:  flush_interval_ms={}, flush_on_shutdown={}, max_batch_size={:?}, arrival_capacity={:?}, dispatch={}",
            self.batch.flush_interval_ms,
            self.batch.flush_on_shutdown,
            self.batch.max_batch_size,
            self.batch.arrival_capacity,
            self.batch.dispatch,
        );
        tracing::info!(
            "  queue:  url={}, dlq={}",
            if self.queue.queue_url.is_empty() { "(none)" } else { &self.queue.queue_url },
            self.queue.dlq_url.as_deref().unwrap_or("(none)"),
        );
        tracing::info!(
            "  aws:    region={}, static_credentials={}",
            self.aws.region,
            self.aws.has_static_credentials(),
        );
    }

    /// Return a redacted view safe for logging as JSON (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "batch": self.batch,
            "queue": {
                "queue_url": self.queue.queue_url,
                "dlq_url": self.queue.dlq_url,
                "max_messages": self.queue.max_messages,
            },
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
        })
    }
}

// ── Batching ──────────────────────────────────────────────────

/// How sealed batches are handed to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Processor runs inside the control loop; the next flush waits for it.
    #[default]
    Inline,
    /// Each sealed batch is processed on its own task.
    Concurrent,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Inline => f.write_str("inline"),
            DispatchMode::Concurrent => f.write_str("concurrent"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(DispatchMode::Inline),
            "concurrent" | "async" => Ok(DispatchMode::Concurrent),
            other => Err(CoreError::InvalidValue {
                key: "DISPATCH_MODE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Interval between flush ticks.
    pub flush_interval_ms: u64,
    /// Flush the final partial batch when the pipeline shuts down.
    pub flush_on_shutdown: bool,
    /// Flush early once the open batch holds this many messages.
    pub max_batch_size: Option<usize>,
    /// Bound the arrival queue; `None` means unbounded.
    pub arrival_capacity: Option<usize>,
    pub dispatch: DispatchMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 10_000,
            flush_on_shutdown: true,
            max_batch_size: None,
            arrival_capacity: None,
            dispatch: DispatchMode::Inline,
        }
    }
}

impl BatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let dispatch = match profiled_env_opt(p, "DISPATCH_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}; falling back to {}", e, defaults.dispatch);
                defaults.dispatch
            }),
            None => defaults.dispatch,
        };
        Self {
            flush_interval_ms: profiled_env_u64(p, "FLUSH_INTERVAL_MS", defaults.flush_interval_ms),
            flush_on_shutdown: profiled_env_bool(p, "FLUSH_ON_SHUTDOWN", defaults.flush_on_shutdown),
            max_batch_size: profiled_env_usize_opt(p, "MAX_BATCH_SIZE"),
            arrival_capacity: profiled_env_usize_opt(p, "ARRIVAL_CAPACITY"),
            dispatch,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.flush_interval_ms == 0 {
            return Err(CoreError::Config("flush interval must be greater than zero".into()));
        }
        if self.max_batch_size == Some(0) {
            return Err(CoreError::Config("max batch size must be greater than zero".into()));
        }
        if self.arrival_capacity == Some(0) {
            return Err(CoreError::Config("arrival capacity must be greater than zero".into()));
        }
        Ok(())
    }
}

// ── Queue subscription ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: String,
    pub dlq_url: Option<String>,
    pub visibility_timeout_secs: u32,
    /// Pause between polls; long polling usually makes this zero.
    pub poll_interval_ms: u64,
    /// Messages requested per poll (SQS caps this at 10).
    pub max_messages: u32,
    pub wait_time_secs: u32,
    /// Consecutive poll failures tolerated before the feed gives up.
    pub max_poll_failures: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_or(p, "QUEUE_URL", ""),
            dlq_url: profiled_env_opt(p, "QUEUE_DLQ_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 30),
            poll_interval_ms: profiled_env_u64(p, "QUEUE_POLL_INTERVAL_MS", 0),
            max_messages: profiled_env_u32(p, "QUEUE_MAX_MESSAGES", 10),
            wait_time_secs: profiled_env_u32(p, "QUEUE_WAIT_TIME_SECS", 20),
            max_poll_failures: profiled_env_u32(p, "QUEUE_MAX_POLL_FAILURES", 5),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn is_configured(&self) -> bool {
        !self.queue_url.is_empty()
    }

    /// FIFO queues need a message group id on publish.
    pub fn is_fifo(&self) -> bool {
        self.queue_url.ends_with(".fifo")
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Endpoint override for the queue service only (e.g. LocalStack).
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "ap-southeast-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}
