use crate::sink::{BatchResponse, SinkError, StreamSink};
use async_trait::async_trait;

/// A sink that accepts and drops all records.
///
/// Useful for measuring the overhead of the hook itself without any
/// external I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl StreamSink for NoopSink {
    async fn put_record(&self, _destination: &str, _data: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn put_record_batch(
        &self,
        _destination: &str,
        _records: &[Vec<u8>],
    ) -> Result<BatchResponse, SinkError> {
        Ok(BatchResponse::success())
    }
}
