//! Shared mocks for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing_stream_hook::diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticSink};
use tracing_stream_hook::sink::{BatchResponse, SinkError, StreamSink};

/// One call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub destination: String,
    pub records: Vec<Vec<u8>>,
}

/// Sink that records every call and replies with scripted responses
/// (success once the script runs out).
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<VecDeque<Result<BatchResponse, String>>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: Vec<Result<BatchResponse, String>>) -> Arc<Self> {
        let sink = Self::default();
        *sink.replies.lock().unwrap() = replies.into();
        Arc::new(sink)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Wait until at least `n` calls were made, or panic after `timeout`.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) -> Vec<Call> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.calls.lock().unwrap().len() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {} sink calls, got {:?}", n, self.calls());
        self.calls()
    }

    fn record(&self, destination: &str, records: Vec<Vec<u8>>) -> Result<BatchResponse, String> {
        self.calls.lock().unwrap().push(Call {
            destination: destination.to_string(),
            records,
        });
        self.notify.notify_waiters();
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BatchResponse::success()))
    }
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn put_record(&self, destination: &str, data: &[u8]) -> Result<(), SinkError> {
        self.record(destination, vec![data.to_vec()]).map(|_| ()).map_err(Into::into)
    }

    async fn put_record_batch(
        &self,
        destination: &str,
        records: &[Vec<u8>],
    ) -> Result<BatchResponse, SinkError> {
        self.record(destination, records.to_vec()).map_err(Into::into)
    }
}

/// Diagnostics sink keeping everything it is given.
#[derive(Default)]
pub struct CollectingDiagnostics(Mutex<Vec<Diagnostic>>);

impl CollectingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Diagnostic> {
        self.0.lock().unwrap().clone()
    }

    pub fn at(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        self.all().into_iter().filter(|d| d.level() == level).collect()
    }
}

impl DiagnosticSink for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.0.lock().unwrap().push(diagnostic);
    }
}
