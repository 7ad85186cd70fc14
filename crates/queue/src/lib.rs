pub mod ack;
pub mod arrival;
pub mod batcher;
pub mod consumer;
pub mod error;
pub mod feed;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod publisher;
pub mod sqs;

pub use ack::{acknowledge_batch, process_batch, AckReport};
pub use arrival::{arrival_queue, ArrivalReceiver, ArrivalSender};
pub use batcher::{BatchAccumulator, SealedBatch};
pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use error::{AckError, QueueError};
pub use feed::QueueFeed;
pub use message::{Message, MessageAcker};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{BatchPipeline, PipelineHandle};
pub use processor::{processor_fn, BatchProcessor, FnProcessor, LoggingProcessor, Outcome};
pub use publisher::{publish_numbered, QueuePublisher};
pub use sqs::{SqsConsumer, SqsPublisher};

pub use tickbatch_core::{BatchConfig, DispatchMode};
