use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_stream_hook::{
    hook::ShutdownMode,
    init::init_tracing,
    sink::{SinkError, StreamSink},
};

/// Example of integrating a completely custom ingestion service by
/// implementing the `StreamSink` trait directly. Imagine this talks to
/// some proprietary stream for which this crate does not provide a
/// built-in sink. Batches fall back to the default one-by-one loop.
struct MyCustomStreamSink;

#[async_trait]
impl StreamSink for MyCustomStreamSink {
    async fn put_record(&self, destination: &str, data: &[u8]) -> Result<(), SinkError> {
        println!("[my-custom-stream:{}] {}", destination, String::from_utf8_lossy(data));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn StreamSink> = Arc::new(MyCustomStreamSink);

    let hook = init_tracing(sink, "custom-stream")?;

    info!("custom backend example started");
    error!(db = "my-custom-stream", "simulated error sent via custom backend");

    hook.shutdown(ShutdownMode::Drain).await;
    Ok(())
}
