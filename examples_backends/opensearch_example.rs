use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_stream_hook::{
    config::HookConfig,
    diagnostics::StderrDiagnostics,
    hook::ShutdownMode,
    init::init_tracing_with_config,
    opensearch::OpenSearchSink,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let url = std::env::var("OPENSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());

    let sink = Arc::new(OpenSearchSink::new(url)?);
    let config = HookConfig::builder("logs")
        .queued()
        .with_workers(2)
        .with_batch_size(100)
        .with_flush_interval(Duration::from_millis(500))
        .with_partial_retries(1)
        .with_diagnostics(Arc::new(StderrDiagnostics))
        .build()?;

    let hook = init_tracing_with_config(sink, config, true)?;

    info!("opensearch backend example started");
    error!(index = "logs", "simulated error sent via OpenSearch backend");
    error!(stream_name = "audit-logs", user_id = 7, "routed to a second index");

    hook.shutdown(ShutdownMode::Drain).await;
    println!("stats: {:?}", hook.stats());
    Ok(())
}
