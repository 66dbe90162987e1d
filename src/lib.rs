pub mod level;
pub mod record;
pub mod sink;
pub mod error;
pub mod config;
pub mod diagnostics;
pub mod formatter;
pub mod queue;
pub mod batch;
pub mod dispatch;
pub mod stats;
pub mod worker;
pub mod hook;
pub mod layer;

#[cfg(feature = "opensearch")]
pub mod opensearch;

pub mod init;
pub mod noop_sink;

pub use config::{AdmissionPolicy, DeliveryMode, HookConfig};
pub use hook::{ShutdownMode, StreamHook};
pub use level::Level;
pub use record::{FieldValue, LogRecord};
pub use sink::{BatchResponse, StreamSink};
