//! Side channel through which the hook reports dropped records and
//! delivery outcomes.
//!
//! Queued delivery never returns per-record errors to the logging call
//! site, so this is the only place those failures become visible. A hook
//! configured without a [`DiagnosticSink`] discards them.

use std::fmt;

/// `tracing` target used by [`TracingDiagnostics`]. Events with this
/// target are ignored by [`StreamLayer`](crate::layer::StreamLayer).
pub const DIAGNOSTICS_TARGET: &str = "tracing_stream_hook::diagnostics";

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warn,
    Debug,
}

/// Why a record never reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Queue full under the non-blocking admission policy.
    QueueFull,
    /// Blocking admission was requested on a current-thread runtime,
    /// where parking the caller would starve the workers.
    CannotBlock,
    /// The hook has been shut down.
    Closed,
    /// Synchronous delivery spawned on a current-thread runtime while
    /// `queue_capacity` deliveries were still in flight.
    InFlightLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    RecordDropped {
        reason: DropReason,
    },
    FormatFailed {
        error: String,
    },
    TransportFailed {
        destination: String,
        records: usize,
        error: String,
    },
    PartialFailure {
        destination: String,
        failed: usize,
        total: usize,
    },
    Delivered {
        destination: String,
        count: usize,
    },
    /// Synchronous delivery from a call site that cannot receive the error.
    SyncDeliveryFailed {
        error: String,
    },
}

impl Diagnostic {
    pub fn level(&self) -> DiagnosticLevel {
        match self {
            Diagnostic::Delivered { .. } => DiagnosticLevel::Debug,
            _ => DiagnosticLevel::Warn,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RecordDropped { reason: DropReason::QueueFull } => {
                f.write_str("queue is full and non-blocking mode specified, dropping record")
            }
            Diagnostic::RecordDropped { reason: DropReason::CannotBlock } => {
                f.write_str("queue is full and blocking is not possible on a current-thread runtime, dropping record")
            }
            Diagnostic::RecordDropped { reason: DropReason::Closed } => {
                f.write_str("hook is shut down, dropping record")
            }
            Diagnostic::RecordDropped { reason: DropReason::InFlightLimit } => {
                f.write_str("too many synchronous deliveries in flight, dropping record")
            }
            Diagnostic::FormatFailed { error } => {
                write!(f, "failed to format record, dropping it: {}", error)
            }
            Diagnostic::TransportFailed { destination, records, error } => write!(
                f,
                "failed to send batch of {} records to stream {}: {}",
                records, destination, error
            ),
            Diagnostic::PartialFailure { destination, failed, total } => write!(
                f,
                "stream {} rejected {} of {} records",
                destination, failed, total
            ),
            Diagnostic::Delivered { destination, count } => {
                write!(f, "emitted {} records to stream {}", count, destination)
            }
            Diagnostic::SyncDeliveryFailed { error } => {
                write!(f, "synchronous delivery failed: {}", error)
            }
        }
    }
}

/// Receiver of [`Diagnostic`]s. Shared by every worker, so it must
/// tolerate concurrent calls.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Reports diagnostics as `tracing` events under [`DIAGNOSTICS_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.level() {
            DiagnosticLevel::Warn => {
                tracing::warn!(target: DIAGNOSTICS_TARGET, "{}", diagnostic)
            }
            DiagnosticLevel::Debug => {
                tracing::debug!(target: DIAGNOSTICS_TARGET, "{}", diagnostic)
            }
        }
    }
}

/// Writes warnings to stderr and ignores debug diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrDiagnostics;

impl DiagnosticSink for StderrDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        if diagnostic.level() == DiagnosticLevel::Warn {
            eprintln!("stream hook: {}", diagnostic);
        }
    }
}
