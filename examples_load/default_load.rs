use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_stream_hook::hook::ShutdownMode;
use tracing_stream_hook::init::init_tracing;
use tracing_stream_hook::noop_sink::NoopSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink::default());
    let hook = init_tracing(sink, "load-test")?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Let the workers drain what made it into the queue
    hook.shutdown(ShutdownMode::Drain).await;
    println!("stats: {:?}", hook.stats());
    Ok(())
}
