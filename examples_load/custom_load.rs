use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_stream_hook::config::{AdmissionPolicy, HookConfig};
use tracing_stream_hook::hook::ShutdownMode;
use tracing_stream_hook::init::init_tracing_with_config;
use tracing_stream_hook::noop_sink::NoopSink;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink::default());

    let config = HookConfig::builder("load-test")
        .queued()
        .with_queue_capacity(50_000)
        .with_batch_size(500)
        .with_workers(4)
        .with_admission(AdmissionPolicy::Block)
        .with_flush_interval(Duration::from_millis(200))
        .build()?;

    let hook = init_tracing_with_config(sink, config, false)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    hook.shutdown(ShutdownMode::Drain).await;
    println!("stats: {:?}", hook.stats());
    Ok(())
}
