use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ConfigError;
use crate::formatter::{FieldFilter, FieldRules, FormatterFactory, JsonFormatter};
use crate::level::{Level, DEFAULT_LEVELS};
use crate::record::FieldValue;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest batch the remote ingestion API accepts in one call.
pub const MAX_BATCH_SIZE: usize = 500;

/// Default number of concurrent send workers.
pub const DEFAULT_WORKERS: usize = 1;

/// Default interval after which a partial batch is flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted flush interval. Tick deadlines are computed as
/// `now + interval`, which must stay representable.
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// What happens when a record arrives and the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Discard the record and report a warning. Never stalls the caller.
    #[default]
    Drop,
    /// Suspend the caller until a worker frees space.
    Block,
}

/// How [`StreamHook::fire`](crate::hook::StreamHook::fire) delivers a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Format and send inline, returning the sink's error to the caller.
    #[default]
    Sync,
    /// Enqueue for the worker pool; failures only reach the diagnostics sink.
    Queued,
}

/// Immutable hook configuration. Build it with [`HookConfig::builder`].
#[derive(Clone)]
pub struct HookConfig {
    /// Enabled levels; `None` leaves filtering entirely to the caller.
    pub levels: Option<Vec<Level>>,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub workers: usize,
    pub admission: AdmissionPolicy,
    pub delivery: DeliveryMode,
    pub append_newline: bool,
    /// Default destination stream, overridable per record.
    pub destination: Arc<str>,
    pub flush_interval: Duration,
    /// Times the failed subset of a batch is re-submitted when the sink
    /// reports which records it rejected.
    pub partial_retries: u32,
    pub field_rules: Arc<FieldRules>,
    pub formatter: FormatterFactory,
    pub diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl HookConfig {
    pub fn builder(destination: impl Into<String>) -> HookConfigBuilder {
        HookConfigBuilder::new(destination)
    }

    /// Check the invariants [`HookConfigBuilder::build`] enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::BatchSize {
                value: self.batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.flush_interval > MAX_FLUSH_INTERVAL
            || Instant::now().checked_add(self.flush_interval * 2).is_none()
        {
            return Err(ConfigError::FlushIntervalTooLarge {
                value: self.flush_interval,
                max: MAX_FLUSH_INTERVAL,
            });
        }
        Ok(())
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        if let Some(sink) = &self.diagnostics {
            sink.report(diagnostic);
        }
    }
}

impl fmt::Debug for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookConfig")
            .field("levels", &self.levels)
            .field("batch_size", &self.batch_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("workers", &self.workers)
            .field("admission", &self.admission)
            .field("delivery", &self.delivery)
            .field("append_newline", &self.append_newline)
            .field("destination", &self.destination)
            .field("flush_interval", &self.flush_interval)
            .field("partial_retries", &self.partial_retries)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

/// Builder for [`HookConfig`]. Every setting has a default except the
/// destination stream name.
pub struct HookConfigBuilder {
    levels: Option<Vec<Level>>,
    batch_size: usize,
    queue_capacity: Option<usize>,
    workers: usize,
    admission: AdmissionPolicy,
    delivery: DeliveryMode,
    append_newline: bool,
    destination: String,
    flush_interval: Duration,
    partial_retries: u32,
    ignore: HashSet<String>,
    filters: HashMap<String, FieldFilter>,
    formatter: FormatterFactory,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl HookConfigBuilder {
    fn new(destination: impl Into<String>) -> Self {
        Self {
            levels: Some(DEFAULT_LEVELS.to_vec()),
            batch_size: MAX_BATCH_SIZE,
            queue_capacity: None,
            workers: DEFAULT_WORKERS,
            admission: AdmissionPolicy::default(),
            delivery: DeliveryMode::default(),
            append_newline: false,
            destination: destination.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            partial_retries: 0,
            ignore: HashSet::new(),
            filters: HashMap::new(),
            formatter: JsonFormatter::factory(),
            diagnostics: None,
        }
    }

    pub fn with_levels(mut self, levels: Option<Vec<Level>>) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Queue depth; defaults to the batch size.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Shorthand for queued delivery.
    pub fn queued(self) -> Self {
        self.with_delivery(DeliveryMode::Queued)
    }

    pub fn with_newline(mut self, append: bool) -> Self {
        self.append_newline = append;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_partial_retries(mut self, retries: u32) -> Self {
        self.partial_retries = retries;
        self
    }

    pub fn ignore_field(mut self, name: impl Into<String>) -> Self {
        self.ignore.insert(name.into());
        self
    }

    pub fn filter_field<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn with_formatter(mut self, factory: FormatterFactory) -> Self {
        self.formatter = factory;
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn build(self) -> Result<HookConfig, ConfigError> {
        let config = HookConfig {
            levels: self.levels,
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity.unwrap_or(self.batch_size),
            workers: self.workers,
            admission: self.admission,
            delivery: self.delivery,
            append_newline: self.append_newline,
            destination: Arc::from(self.destination),
            flush_interval: self.flush_interval,
            partial_retries: self.partial_retries,
            field_rules: Arc::new(FieldRules::new(self.ignore, self.filters)),
            formatter: self.formatter,
            diagnostics: self.diagnostics,
        };
        config.validate()?;
        Ok(config)
    }
}
