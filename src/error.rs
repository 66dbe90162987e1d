//! Error types for hook construction, formatting and delivery.

use crate::sink::SinkError;
use std::time::Duration;

/// Invalid hook configuration, reported by [`HookConfigBuilder::build`](crate::config::HookConfigBuilder::build)
/// and [`StreamHook::new`](crate::hook::StreamHook::new).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("batch size {value} is out of range, must be between 1 and {max}")]
    BatchSize { value: usize, max: usize },

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("flush interval must be non-zero")]
    ZeroFlushInterval,

    #[error("flush interval {value:?} exceeds the maximum of {max:?}")]
    FlushIntervalTooLarge { value: Duration, max: Duration },

    #[error("queued delivery requires a running tokio runtime")]
    NoRuntime,
}

/// Failure to turn a record into bytes.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("field `{field}` holds a non-finite number")]
    NonFiniteNumber { field: String },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by [`StreamHook`](crate::hook::StreamHook).
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("delivery failed: {0}")]
    Delivery(SinkError),

    #[error("hook is shut down")]
    Closed,

    #[error("failed to start runtime for synchronous delivery: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Errors from installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("failed to set global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
