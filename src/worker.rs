//! Send loop: `workers` independent assembler + dispatcher pairs fed by
//! one intake queue and woken by one shared ticker.

use crate::batch::{BatchAssembler, CycleEnd};
use crate::config::HookConfig;
use crate::dispatch::Dispatcher;
use crate::queue::IntakeQueue;
use crate::sink::StreamSink;
use crate::stats::HookStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Running workers plus their ticker. Stopped by cancelling the token
/// they were spawned with, then [`join`](WorkerPool::join)ed.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    ticker: JoinHandle<()>,
    drain_on_stop: Arc<AtomicBool>,
}

struct Worker {
    id: usize,
    assembler: BatchAssembler,
    dispatcher: Dispatcher,
    queue: Arc<IntakeQueue>,
    tick: watch::Receiver<u64>,
    cancel: CancellationToken,
    drain_on_stop: Arc<AtomicBool>,
    stats: Arc<HookStats>,
}

impl WorkerPool {
    pub fn spawn(
        runtime: &Handle,
        config: Arc<HookConfig>,
        queue: Arc<IntakeQueue>,
        sink: Arc<dyn StreamSink>,
        stats: Arc<HookStats>,
        cancel: CancellationToken,
    ) -> Self {
        let (tick_tx, tick_rx) = watch::channel(0u64);
        let drain_on_stop = Arc::new(AtomicBool::new(false));

        let ticker = runtime.spawn(run_ticker(tick_tx, config.flush_interval, cancel.clone()));

        let workers = (0..config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    assembler: BatchAssembler::new(Arc::clone(&config), Arc::clone(&stats)),
                    dispatcher: Dispatcher::new(
                        Arc::clone(&sink),
                        Arc::clone(&config),
                        Arc::clone(&stats),
                    ),
                    queue: Arc::clone(&queue),
                    tick: tick_rx.clone(),
                    cancel: cancel.clone(),
                    drain_on_stop: Arc::clone(&drain_on_stop),
                    stats: Arc::clone(&stats),
                };
                runtime.spawn(worker.run())
            })
            .collect();

        debug!(workers = config.workers, batch_size = config.batch_size, "stream hook workers started");

        Self {
            workers,
            ticker,
            drain_on_stop,
        }
    }

    /// Whether workers empty the queue after cancellation instead of
    /// discarding what is left. Must be set before cancelling.
    pub fn set_drain_on_stop(&self, drain: bool) {
        self.drain_on_stop.store(drain, Ordering::SeqCst);
    }

    /// Wait for every worker and the ticker to exit.
    pub async fn join(self) {
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "stream hook worker panicked");
            }
        }
        let _ = self.ticker.await;
    }
}

impl Worker {
    async fn run(mut self) {
        loop {
            let (batch, end) = self
                .assembler
                .next_batch(&self.queue, &mut self.tick, &self.cancel)
                .await;

            if end == CycleEnd::Cancelled {
                if self.drain_on_stop.load(Ordering::SeqCst) {
                    if !batch.is_empty() {
                        self.dispatcher.submit(batch).await;
                    }
                    self.drain().await;
                } else {
                    HookStats::add(&self.stats.dropped, batch.len());
                }
                break;
            }

            if !batch.is_empty() {
                self.dispatcher.submit(batch).await;
            }
        }
        debug!(worker = self.id, "stream hook worker stopped");
    }

    async fn drain(&mut self) {
        loop {
            let batch = self.assembler.drain_ready(&self.queue).await;
            if batch.is_empty() {
                return;
            }
            self.dispatcher.submit(batch).await;
        }
    }
}

async fn run_ticker(tx: watch::Sender<u64>, period: Duration, cancel: CancellationToken) {
    // `interval` ticks immediately; the first flush is due one period out.
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(?period, "flush interval out of range, ticker not started");
        return;
    };
    let mut interval = interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => tx.send_modify(|n| *n = n.wrapping_add(1)),
        }
    }
}
