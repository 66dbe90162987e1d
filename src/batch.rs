use crate::config::HookConfig;
use crate::diagnostics::Diagnostic;
use crate::formatter::{FormattedRecord, RecordEncoder};
use crate::queue::IntakeQueue;
use crate::record::LogRecord;
use crate::stats::HookStats;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Ordered records headed for one dispatch. Never longer than the
/// configured batch size.
pub type Batch = Vec<FormattedRecord>;

/// Why a drain cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    Full,
    Tick,
    Cancelled,
}

/// Per-worker batch builder. Owns the worker's encoder, which is never
/// shared with other workers.
pub struct BatchAssembler {
    encoder: RecordEncoder,
    batch_size: usize,
    config: Arc<HookConfig>,
    stats: Arc<HookStats>,
    ticking: bool,
}

impl BatchAssembler {
    pub fn new(config: Arc<HookConfig>, stats: Arc<HookStats>) -> Self {
        Self {
            encoder: RecordEncoder::from_config(&config),
            batch_size: config.batch_size,
            config,
            stats,
            ticking: true,
        }
    }

    /// Pull records until the batch is full, the shared tick fires, or
    /// `cancel` is triggered.
    ///
    /// Waits on all three at once; an idle worker sleeps until one of
    /// them is ready. Only `cancel` ends the worker: once the tick sender
    /// is gone, batches are cut by size alone.
    pub async fn next_batch(
        &mut self,
        queue: &IntakeQueue,
        tick: &mut watch::Receiver<u64>,
        cancel: &CancellationToken,
    ) -> (Batch, CycleEnd) {
        let mut batch = Vec::with_capacity(self.batch_size);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (batch, CycleEnd::Cancelled),
                changed = tick.changed(), if self.ticking => match changed {
                    Ok(()) => return (batch, CycleEnd::Tick),
                    Err(_) => {
                        warn!("flush ticker stopped, batches are now flushed by size only");
                        self.ticking = false;
                    }
                },
                record = queue.pop() => match record {
                    Some(record) => {
                        self.append(&mut batch, &record);
                        if batch.len() >= self.batch_size {
                            return (batch, CycleEnd::Full);
                        }
                    }
                    None => return (batch, CycleEnd::Cancelled),
                },
            }
        }
    }

    /// Fill a batch from records already waiting, without waiting for
    /// more. Used to empty the queue on shutdown.
    pub async fn drain_ready(&mut self, queue: &IntakeQueue) -> Batch {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match queue.pop_ready().await {
                Some(record) => self.append(&mut batch, &record),
                None => break,
            }
        }
        batch
    }

    fn append(&mut self, batch: &mut Batch, record: &LogRecord) {
        match self.encoder.encode(record) {
            Ok(formatted) => batch.push(formatted),
            Err(err) => {
                HookStats::add(&self.stats.dropped, 1);
                self.config.report(Diagnostic::FormatFailed { error: err.to_string() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::queue::Admission;
    use std::time::Duration;
    use tokio::runtime::Handle;

    fn setup(batch_size: usize, capacity: usize) -> (BatchAssembler, IntakeQueue, CancellationToken) {
        let config = HookConfig::builder("logs")
            .with_batch_size(batch_size)
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let queue = IntakeQueue::new(capacity, cancel.clone(), Handle::current());
        let assembler = BatchAssembler::new(Arc::new(config), Arc::new(HookStats::default()));
        (assembler, queue, cancel)
    }

    fn fill(queue: &IntakeQueue, n: usize) {
        for i in 0..n {
            let admitted = queue.try_push(LogRecord::new(Level::Info, format!("record {}", i)));
            assert_eq!(admitted, Admission::Enqueued);
        }
    }

    #[tokio::test]
    async fn stops_at_batch_size() {
        let (mut assembler, queue, cancel) = setup(3, 10);
        let (_tx, mut tick) = watch::channel(0u64);
        fill(&queue, 7);

        let (first, end) = assembler.next_batch(&queue, &mut tick, &cancel).await;
        assert_eq!(end, CycleEnd::Full);
        assert_eq!(first.len(), 3);

        let (second, _) = assembler.next_batch(&queue, &mut tick, &cancel).await;
        assert_eq!(second.len(), 3);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn tick_flushes_partial_batch() {
        let (mut assembler, queue, cancel) = setup(500, 10);
        let (tx, mut tick) = watch::channel(0u64);
        fill(&queue, 1);

        let ticker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send_modify(|n| *n += 1);
            tx
        });

        let (batch, end) = assembler.next_batch(&queue, &mut tick, &cancel).await;
        assert_eq!(end, CycleEnd::Tick);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].destination, "logs");
        drop(ticker.await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_returns_in_progress_batch() {
        let (mut assembler, queue, cancel) = setup(10, 10);
        let (_tx, mut tick) = watch::channel(0u64);
        fill(&queue, 2);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cancel.cancel();
            })
        };

        let (batch, end) = assembler.next_batch(&queue, &mut tick, &cancel).await;
        canceller.await.unwrap();
        assert_eq!(end, CycleEnd::Cancelled);
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn closed_ticker_does_not_end_the_cycle() {
        let (mut assembler, queue, cancel) = setup(2, 10);
        let (tx, mut tick) = watch::channel(0u64);
        drop(tx);
        fill(&queue, 1);

        let late_push = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            queue.try_push(LogRecord::new(Level::Info, "late"))
        };
        let ((batch, end), pushed) =
            tokio::join!(assembler.next_batch(&queue, &mut tick, &cancel), late_push);

        assert_eq!(pushed, Admission::Enqueued);
        assert_eq!(end, CycleEnd::Full);
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn format_failures_are_skipped() {
        let (mut assembler, queue, _cancel) = setup(10, 10);
        queue.try_push(LogRecord::new(Level::Info, "ok"));
        queue.try_push(LogRecord::new(Level::Info, "bad").with_field("ratio", f64::INFINITY));
        queue.try_push(LogRecord::new(Level::Info, "ok again"));

        let batch = assembler.drain_ready(&queue).await;

        assert_eq!(batch.len(), 2);
        assert_eq!(assembler.stats.snapshot().dropped, 1);
        assert!(queue.is_empty());
    }
}
