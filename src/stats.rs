use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one hook, shared by the facade and its workers.
#[derive(Debug, Default)]
pub struct HookStats {
    /// Records accepted into the intake queue.
    pub enqueued: AtomicU64,
    /// Records lost before dispatch (queue full, formatting failure,
    /// discarded at shutdown).
    pub dropped: AtomicU64,
    /// Records the remote service accepted.
    pub delivered: AtomicU64,
    /// Records rejected by the service or lost to transport errors.
    pub failed: AtomicU64,
}

/// Point-in-time copy of [`HookStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl HookStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
