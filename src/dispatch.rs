use crate::batch::Batch;
use crate::config::HookConfig;
use crate::diagnostics::Diagnostic;
use crate::formatter::FormattedRecord;
use crate::sink::{SinkError, StreamSink};
use crate::stats::HookStats;
use std::collections::HashSet;
use std::sync::Arc;

/// Counts for one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub accepted: usize,
    pub failed: usize,
}

/// Submits batches to the shared [`StreamSink`] and classifies the result.
///
/// Nothing here keeps a retry buffer: once `submit` returns, the batch
/// is gone whatever happened to it.
pub struct Dispatcher {
    sink: Arc<dyn StreamSink>,
    config: Arc<HookConfig>,
    stats: Arc<HookStats>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn StreamSink>, config: Arc<HookConfig>, stats: Arc<HookStats>) -> Self {
        Self { sink, config, stats }
    }

    /// Send `batch`, one call per destination it contains.
    pub async fn submit(&self, batch: Batch) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for (destination, records) in group_by_destination(batch) {
            let part = self.submit_to(&destination, records).await;
            outcome.accepted += part.accepted;
            outcome.failed += part.failed;
        }
        HookStats::add(&self.stats.delivered, outcome.accepted);
        HookStats::add(&self.stats.failed, outcome.failed);
        outcome
    }

    /// Single-record path used by synchronous delivery. Errors go
    /// straight back to the caller.
    pub async fn submit_one(&self, record: &FormattedRecord) -> Result<(), SinkError> {
        let result = self.sink.put_record(&record.destination, &record.data).await;
        match &result {
            Ok(()) => HookStats::add(&self.stats.delivered, 1),
            Err(_) => HookStats::add(&self.stats.failed, 1),
        }
        result
    }

    async fn submit_to(&self, destination: &str, records: Vec<Vec<u8>>) -> DispatchOutcome {
        let total = records.len();
        let mut pending = records;
        let mut retries_left = self.config.partial_retries;

        loop {
            let response = match self.sink.put_record_batch(destination, &pending).await {
                Ok(response) => response,
                Err(err) => {
                    self.config.report(Diagnostic::TransportFailed {
                        destination: destination.to_string(),
                        records: pending.len(),
                        error: err.to_string(),
                    });
                    return DispatchOutcome {
                        accepted: total - pending.len(),
                        failed: pending.len(),
                    };
                }
            };

            if response.failed_put_count == 0 {
                self.config.report(Diagnostic::Delivered {
                    destination: destination.to_string(),
                    count: total,
                });
                return DispatchOutcome { accepted: total, failed: 0 };
            }

            let failed = response.failed_put_count.min(pending.len());
            // Only a response naming every rejected record can be retried precisely.
            let retryable = retries_left > 0 && response.failed_indices.len() == failed;
            if !retryable {
                self.config.report(Diagnostic::PartialFailure {
                    destination: destination.to_string(),
                    failed,
                    total,
                });
                return DispatchOutcome {
                    accepted: total - failed,
                    failed,
                };
            }

            retries_left -= 1;
            pending = select_failed(pending, &response.failed_indices);
        }
    }
}

/// Split a batch per destination, keeping first-seen destination order
/// and record order within each destination.
fn group_by_destination(batch: Batch) -> Vec<(String, Vec<Vec<u8>>)> {
    let mut groups: Vec<(String, Vec<Vec<u8>>)> = Vec::new();
    for record in batch {
        match groups.iter_mut().find(|(dest, _)| *dest == record.destination) {
            Some((_, records)) => records.push(record.data),
            None => groups.push((record.destination, vec![record.data])),
        }
    }
    groups
}

fn select_failed(records: Vec<Vec<u8>>, failed_indices: &[usize]) -> Vec<Vec<u8>> {
    let failed: HashSet<usize> = failed_indices.iter().copied().collect();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| failed.contains(&idx).then_some(record))
        .collect()
}
