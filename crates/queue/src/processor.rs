//! Processor contract: the caller-supplied work done on each sealed batch.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

/// Result of processing one batch. There is no partial success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { diagnostic: String },
}

impl Outcome {
    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Outcome::Failure { diagnostic: diagnostic.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure { diagnostic } => write!(f, "failure: {diagnostic}"),
        }
    }
}

impl<E: fmt::Display> From<Result<(), E>> for Outcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::failure(e.to_string()),
        }
    }
}

/// Work performed on the payloads of a sealed batch.
///
/// The pipeline neither retries nor times out a call. A failed batch is
/// redelivered in full by the broker later, so implementations must be
/// idempotent.
#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    async fn process(&self, payloads: &[Bytes]) -> Outcome;
}

#[async_trait]
impl<T: BatchProcessor + ?Sized> BatchProcessor for Arc<T> {
    async fn process(&self, payloads: &[Bytes]) -> Outcome {
        (**self).process(payloads).await
    }
}

/// Adapter returned by [`processor_fn`].
pub struct FnProcessor<F> {
    f: F,
}

/// Wrap an async closure as a [`BatchProcessor`].
///
/// ```ignore
/// let processor = processor_fn(|payloads| async move {
///     store.insert_many(&payloads).await.into()
/// });
/// ```
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(Vec<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    FnProcessor { f }
}

#[async_trait]
impl<F, Fut> BatchProcessor for FnProcessor<F>
where
    F: Fn(Vec<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn process(&self, payloads: &[Bytes]) -> Outcome {
        (self.f)(payloads.to_vec()).await
    }
}

/// Logs every payload and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl BatchProcessor for LoggingProcessor {
    async fn process(&self, payloads: &[Bytes]) -> Outcome {
        info!(batch_size = payloads.len(), "processing batch");
        for (index, payload) in payloads.iter().enumerate() {
            info!(index, payload = %String::from_utf8_lossy(payload), "payload");
        }
        Outcome::Success
    }
}
