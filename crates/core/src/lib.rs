pub mod config;
pub mod error;

pub use config::{AwsConfig, BatchConfig, Config, DispatchMode, QueueConfig};
pub use error::*;
