use crate::diagnostics::Diagnostic;
use crate::error::HookError;
use crate::hook::StreamHook;
use crate::level::Level;
use crate::record::{CapturedError, FieldValue, LogRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate (including its diagnostics) are never
/// captured, or a failing delivery would log about itself forever.
const OWN_TARGET_PREFIX: &str = "tracing_stream_hook";

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// fires them into a [`StreamHook`].
///
/// Level filtering follows [`StreamHook::is_enabled`], so
/// [`StreamHook::set_levels`] takes effect immediately.
pub struct StreamLayer {
    hook: StreamHook,
    capture_location: bool,
}

impl StreamLayer {
    pub fn new(hook: StreamHook) -> Self {
        Self {
            hook,
            capture_location: false,
        }
    }

    /// Also record `target`, `module_path`, `file` and `line` as fields.
    pub fn with_location(mut self, capture: bool) -> Self {
        self.capture_location = capture;
        self
    }

    pub fn hook(&self) -> &StreamHook {
        &self.hook
    }
}

impl<S> Layer<S> for StreamLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET_PREFIX) {
            return;
        }
        let level = Level::from(meta.level());
        if !self.hook.is_enabled(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        if self.capture_location {
            fields.insert("target".to_string(), FieldValue::from(meta.target()));
            if let Some(module_path) = meta.module_path() {
                fields.insert("module_path".to_string(), FieldValue::from(module_path));
            }
            if let Some(file) = meta.file() {
                fields.insert("file".to_string(), FieldValue::from(file));
            }
            if let Some(line) = meta.line() {
                fields.insert("line".to_string(), FieldValue::U64(line as u64));
            }
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.unwrap_or_default(),
            fields,
        };

        match self.hook.fire_blocking(record) {
            Ok(()) | Err(HookError::Closed) => {}
            Err(e) => self.hook.report(Diagnostic::SyncDeliveryFailed { error: e.to_string() }),
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), FieldValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), FieldValue::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), FieldValue::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), FieldValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields.insert(
            field.name().to_string(),
            FieldValue::error(CapturedError(value.to_string())),
        );
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Format-string messages arrive here as `fmt::Arguments`.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::Str(format!("{:?}", value)));
        }
    }
}
