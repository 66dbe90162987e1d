use crate::config::{AdmissionPolicy, DeliveryMode, HookConfig};
use crate::diagnostics::{Diagnostic, DropReason};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigError, HookError};
use crate::formatter::RecordEncoder;
use crate::level::Level;
use crate::queue::{Admission, IntakeQueue};
use crate::record::LogRecord;
use crate::sink::StreamSink;
use crate::stats::{HookStats, StatsSnapshot};
use crate::worker::WorkerPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// What to do with records still queued when the hook shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Dispatch everything already queued before returning.
    Drain,
    /// Drop whatever has not been dispatched yet.
    Discard,
}

/// Entry point for log records: formats and sends them inline, or hands
/// them to a pool of send workers, depending on [`DeliveryMode`].
///
/// Cheap to clone; clones share the same queue, workers and levels.
#[derive(Clone)]
pub struct StreamHook {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<HookConfig>,
    levels: RwLock<Option<Vec<Level>>>,
    dispatcher: Dispatcher,
    stats: Arc<HookStats>,
    closed: AtomicBool,
    /// Bounds deliveries spawned by `fire_blocking` on a current-thread runtime.
    in_flight: Arc<Semaphore>,
    queued: Option<Queued>,
}

struct Queued {
    queue: Arc<IntakeQueue>,
    cancel: CancellationToken,
    pool: tokio::sync::Mutex<Option<WorkerPool>>,
}

impl Drop for Queued {
    // Last clone gone without `shutdown`: let the workers drain and exit.
    fn drop(&mut self) {
        if let Some(pool) = self.pool.get_mut().as_ref() {
            pool.set_drain_on_stop(true);
        }
        self.cancel.cancel();
    }
}

impl StreamHook {
    /// Validate `config` and start the hook.
    ///
    /// In [`DeliveryMode::Queued`] this spawns the worker pool on the
    /// current tokio runtime, so it must be called from within one.
    pub fn new(sink: Arc<dyn StreamSink>, config: HookConfig) -> Result<Self, HookError> {
        config.validate()?;
        let config = Arc::new(config);
        let stats = Arc::new(HookStats::default());

        let queued = match config.delivery {
            DeliveryMode::Sync => None,
            DeliveryMode::Queued => {
                let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
                let cancel = CancellationToken::new();
                let queue = Arc::new(IntakeQueue::new(
                    config.queue_capacity,
                    cancel.clone(),
                    runtime.clone(),
                ));
                let pool = WorkerPool::spawn(
                    &runtime,
                    Arc::clone(&config),
                    Arc::clone(&queue),
                    Arc::clone(&sink),
                    Arc::clone(&stats),
                    cancel.clone(),
                );
                Some(Queued {
                    queue,
                    cancel,
                    pool: tokio::sync::Mutex::new(Some(pool)),
                })
            }
        };

        let inner = Inner {
            levels: RwLock::new(config.levels.clone()),
            dispatcher: Dispatcher::new(sink, Arc::clone(&config), Arc::clone(&stats)),
            in_flight: Arc::new(Semaphore::new(config.queue_capacity)),
            config,
            stats,
            closed: AtomicBool::new(false),
            queued,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn config(&self) -> &HookConfig {
        &self.inner.config
    }

    /// Levels this hook fires for. `None` means filtering is left to
    /// the caller.
    pub fn levels(&self) -> Option<Vec<Level>> {
        self.inner
            .levels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_levels(&self, levels: Option<Vec<Level>>) {
        *self
            .inner
            .levels
            .write()
            .unwrap_or_else(PoisonError::into_inner) = levels;
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        match &*self.inner.levels.read().unwrap_or_else(PoisonError::into_inner) {
            Some(levels) => levels.contains(&level),
            None => true,
        }
    }

    /// Deliver one record.
    ///
    /// Synchronous mode returns the formatting or sink error. Queued mode
    /// returns `Ok` whether the record was enqueued or dropped, and
    /// `Err(HookError::Closed)` only after [`shutdown`](Self::shutdown).
    pub async fn fire(&self, record: LogRecord) -> Result<(), HookError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(HookError::Closed);
        }
        match &self.inner.queued {
            None => self.deliver_now(record).await,
            Some(queued) => {
                let admission = match self.inner.config.admission {
                    AdmissionPolicy::Drop => queued.queue.try_push(record),
                    AdmissionPolicy::Block => queued.queue.push(record).await,
                };
                self.admitted(admission)
            }
        }
    }

    /// [`fire`](Self::fire) for call sites that cannot `.await`, such as
    /// a `tracing` layer.
    ///
    /// Synchronous delivery blocks on the send. On a current-thread
    /// runtime it is spawned instead and its error goes to the
    /// diagnostics sink; at most `queue_capacity` such deliveries run at
    /// once and further records are dropped.
    pub fn fire_blocking(&self, record: LogRecord) -> Result<(), HookError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(HookError::Closed);
        }
        match &self.inner.queued {
            Some(queued) => {
                let admission = match self.inner.config.admission {
                    AdmissionPolicy::Drop => queued.queue.try_push(record),
                    AdmissionPolicy::Block => queued.queue.push_blocking(record),
                };
                self.admitted(admission)
            }
            None => match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                    let Ok(permit) = Arc::clone(&self.inner.in_flight).try_acquire_owned() else {
                        return self.admitted(Admission::Dropped(DropReason::InFlightLimit));
                    };
                    let hook = self.clone();
                    handle.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = hook.deliver_now(record).await {
                            hook.inner.config.report(Diagnostic::SyncDeliveryFailed {
                                error: e.to_string(),
                            });
                        }
                    });
                    Ok(())
                }
                Ok(handle) => {
                    tokio::task::block_in_place(|| handle.block_on(self.deliver_now(record)))
                }
                Err(_) => tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?
                    .block_on(self.deliver_now(record)),
            },
        }
    }

    /// Stop accepting records and stop the workers.
    ///
    /// With [`ShutdownMode::Drain`] queued records are dispatched first.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let Some(queued) = &self.inner.queued else {
            return;
        };
        let pool = queued.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.set_drain_on_stop(mode == ShutdownMode::Drain);
            queued.cancel.cancel();
            pool.join().await;
            if mode == ShutdownMode::Discard {
                HookStats::add(&self.inner.stats.dropped, queued.queue.len());
            }
        }
    }

    /// Records waiting in the intake queue; `None` in synchronous mode.
    pub fn queued_len(&self) -> Option<usize> {
        self.inner.queued.as_ref().map(|q| q.queue.len())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.inner.config.report(diagnostic);
    }

    async fn deliver_now(&self, record: LogRecord) -> Result<(), HookError> {
        let mut encoder = RecordEncoder::from_config(&self.inner.config);
        let formatted = match encoder.encode(&record) {
            Ok(formatted) => formatted,
            Err(err) => {
                HookStats::add(&self.inner.stats.dropped, 1);
                self.report(Diagnostic::FormatFailed { error: err.to_string() });
                return Err(err.into());
            }
        };
        self.inner
            .dispatcher
            .submit_one(&formatted)
            .await
            .map_err(HookError::Delivery)
    }

    fn admitted(&self, admission: Admission) -> Result<(), HookError> {
        match admission {
            Admission::Enqueued => {
                HookStats::add(&self.inner.stats.enqueued, 1);
                Ok(())
            }
            Admission::Dropped(DropReason::Closed) => Err(HookError::Closed),
            Admission::Dropped(reason) => {
                HookStats::add(&self.inner.stats.dropped, 1);
                self.report(Diagnostic::RecordDropped { reason });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::DEFAULT_LEVELS;
    use crate::noop_sink::NoopSink;

    fn make_hook(levels: Option<Vec<Level>>) -> StreamHook {
        let config = HookConfig::builder("test_stream").with_levels(levels).build().unwrap();
        StreamHook::new(Arc::new(NoopSink), config).unwrap()
    }

    fn level_cases() -> Vec<Option<Vec<Level>>> {
        vec![
            None,
            Some(vec![Level::Warn]),
            Some(vec![Level::Error]),
            Some(vec![Level::Warn, Level::Debug]),
            Some(vec![Level::Warn, Level::Debug, Level::Error]),
        ]
    }

    #[test]
    fn levels_returns_configured_set() {
        for levels in level_cases() {
            let hook = make_hook(levels.clone());
            assert_eq!(hook.levels(), levels);
        }
        let default = StreamHook::new(
            Arc::new(NoopSink),
            HookConfig::builder("test_stream").build().unwrap(),
        )
        .unwrap();
        assert_eq!(default.levels(), Some(DEFAULT_LEVELS.to_vec()));
    }

    #[test]
    fn set_levels_round_trips_and_clears() {
        for levels in level_cases() {
            let hook = make_hook(None);
            let other = make_hook(None);

            hook.set_levels(levels.clone());
            assert_eq!(hook.levels(), levels);
            assert_eq!(other.levels(), None);

            hook.set_levels(None);
            assert_eq!(hook.levels(), None);
        }
    }

    #[test]
    fn unset_levels_enable_everything() {
        let hook = make_hook(None);
        assert!(hook.is_enabled(Level::Trace));

        hook.set_levels(Some(vec![Level::Error]));
        assert!(hook.is_enabled(Level::Error));
        assert!(!hook.is_enabled(Level::Info));

        hook.set_levels(Some(vec![]));
        assert!(!hook.is_enabled(Level::Panic));
    }

    #[test]
    fn queued_mode_requires_runtime() {
        let config = HookConfig::builder("logs").queued().build().unwrap();
        let err = StreamHook::new(Arc::new(NoopSink), config).err().unwrap();
        assert!(matches!(err, HookError::Config(ConfigError::NoRuntime)));
    }

    #[test]
    fn sync_fire_blocking_without_runtime() {
        let hook = make_hook(None);
        hook.fire_blocking(LogRecord::new(Level::Info, "hi")).unwrap();
        assert_eq!(hook.stats().delivered, 1);
        assert_eq!(hook.queued_len(), None);
    }

    #[tokio::test]
    async fn fire_after_shutdown_is_closed() {
        let config = HookConfig::builder("logs").queued().build().unwrap();
        let hook = StreamHook::new(Arc::new(NoopSink), config).unwrap();

        hook.shutdown(ShutdownMode::Discard).await;
        hook.shutdown(ShutdownMode::Discard).await;

        let err = hook.fire(LogRecord::new(Level::Info, "late")).await.unwrap_err();
        assert!(matches!(err, HookError::Closed));
    }

    #[tokio::test]
    async fn dropping_last_clone_stops_workers() {
        let sink = Arc::new(NoopSink);
        let config = HookConfig::builder("logs")
            .queued()
            .with_workers(3)
            .build()
            .unwrap();
        let hook = StreamHook::new(sink.clone(), config).unwrap();
        hook.fire(LogRecord::new(Level::Info, "pending")).await.unwrap();
        assert!(Arc::strong_count(&sink) > 1);

        drop(hook);

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while Arc::strong_count(&sink) > 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    struct StalledSink;

    #[async_trait::async_trait]
    impl StreamSink for StalledSink {
        async fn put_record(&self, _: &str, _: &[u8]) -> Result<(), crate::sink::SinkError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn sync_spawns_on_current_thread_are_bounded() {
        let config = HookConfig::builder("logs").with_queue_capacity(2).build().unwrap();
        let hook = StreamHook::new(Arc::new(StalledSink), config).unwrap();

        for i in 0..5 {
            hook.fire_blocking(LogRecord::new(Level::Info, format!("r{}", i))).unwrap();
        }
        tokio::task::yield_now().await;

        assert_eq!(hook.stats().dropped, 3);
        assert_eq!(hook.stats().delivered, 0);
    }
}
