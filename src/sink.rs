use async_trait::async_trait;
use std::error::Error;

/// Error type returned by [`StreamSink`] implementations.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// Result of a batched submission that reached the remote service.
///
/// `failed_indices` is optional detail: sinks whose remote API only
/// reports an aggregate count leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub failed_put_count: usize,
    pub failed_indices: Vec<usize>,
}

impl BatchResponse {
    pub fn success() -> Self {
        Self::default()
    }

    /// Build a response from the indices the service rejected.
    pub fn from_failed_indices(failed_indices: Vec<usize>) -> Self {
        Self {
            failed_put_count: failed_indices.len(),
            failed_indices,
        }
    }
}

/// Remote ingestion stream that formatted records are delivered to.
///
/// Implementations own transport concerns (connections, authentication,
/// transport-level retries). The hook shares one sink across all of its
/// workers, so calls must be safe to issue concurrently.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Send a single record to `destination`.
    ///
    /// **Returns**
    /// - `Ok(())` if the service accepted the record.
    /// - `Err(..)` on any transport or service failure. In synchronous
    ///   delivery mode this error is handed back to the caller of
    ///   [`StreamHook::fire`](crate::hook::StreamHook::fire).
    async fn put_record(&self, destination: &str, data: &[u8]) -> Result<(), SinkError>;

    /// Send a batch of records to `destination` in one call.
    ///
    /// **Returns**
    /// - `Ok(response)` if the call reached the service; `response`
    ///   reports how many records (and, if known, which) were rejected.
    /// - `Err(..)` if the call itself failed. The whole batch is then
    ///   considered undelivered.
    ///
    /// The default implementation submits records one by one through
    /// [`put_record`](StreamSink::put_record) and collects failed indices.
    async fn put_record_batch(
        &self,
        destination: &str,
        records: &[Vec<u8>],
    ) -> Result<BatchResponse, SinkError> {
        let mut failed = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            if self.put_record(destination, record).await.is_err() {
                failed.push(idx);
            }
        }
        Ok(BatchResponse::from_failed_indices(failed))
    }
}
