//! Bounded intake queue between logging call sites and send workers.
//!
//! Producers never take a lock: admission is a `try_send` or an awaited
//! `send` on a bounded `tokio::sync::mpsc` channel. Workers share the
//! single receiver behind an async mutex, so each record is handed to
//! exactly one worker.

use crate::diagnostics::DropReason;
use crate::record::LogRecord;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Result of trying to place a record on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Enqueued,
    Dropped(DropReason),
}

pub struct IntakeQueue {
    sender: mpsc::Sender<LogRecord>,
    receiver: Mutex<mpsc::Receiver<LogRecord>>,
    cancel: CancellationToken,
    runtime: Handle,
}

impl IntakeQueue {
    /// Create a queue holding at most `capacity` records. Blocking
    /// admission from threads outside any runtime is driven on `runtime`.
    pub fn new(capacity: usize, cancel: CancellationToken, runtime: Handle) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            cancel,
            runtime,
        }
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Records currently waiting for a worker.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Single non-blocking enqueue attempt.
    pub fn try_push(&self, record: LogRecord) -> Admission {
        if self.cancel.is_cancelled() {
            return Admission::Dropped(DropReason::Closed);
        }
        match self.sender.try_send(record) {
            Ok(()) => Admission::Enqueued,
            Err(TrySendError::Full(_)) => Admission::Dropped(DropReason::QueueFull),
            Err(TrySendError::Closed(_)) => Admission::Dropped(DropReason::Closed),
        }
    }

    /// Enqueue, waiting for space. Gives up once the hook is cancelled.
    pub async fn push(&self, record: LogRecord) -> Admission {
        if self.cancel.is_cancelled() {
            return Admission::Dropped(DropReason::Closed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Admission::Dropped(DropReason::Closed),
            sent = self.sender.send(record) => match sent {
                Ok(()) => Admission::Enqueued,
                Err(_) => Admission::Dropped(DropReason::Closed),
            },
        }
    }

    /// [`push`](Self::push) for synchronous call sites.
    ///
    /// Parks the calling thread. On a current-thread runtime that would
    /// starve the workers, so a full queue drops the record instead.
    pub fn push_blocking(&self, record: LogRecord) -> Admission {
        match Handle::try_current() {
            Err(_) => self.runtime.block_on(self.push(record)),
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                match self.try_push(record) {
                    Admission::Dropped(DropReason::QueueFull) => {
                        Admission::Dropped(DropReason::CannotBlock)
                    }
                    admission => admission,
                }
            }
            Ok(current) => tokio::task::block_in_place(|| current.block_on(self.push(record))),
        }
    }

    /// Wait for the next record. Cancel safe.
    pub async fn pop(&self) -> Option<LogRecord> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Take a record if one is waiting, without waiting for new ones.
    pub async fn pop_ready(&self) -> Option<LogRecord> {
        let mut receiver = self.receiver.lock().await;
        receiver.try_recv().ok()
    }
}
