use crate::level::Level;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Reserved field name carrying a per-record destination override.
pub const STREAM_NAME_FIELD: &str = "stream_name";

/// Immutable snapshot of one log event as seen by the hook.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    /// Create a record stamped with the current time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Value of a named field on a [`LogRecord`].
///
/// This is a closed set: anything a logging call site can attach maps
/// onto one of these variants. `Error` and `Describable` keep the
/// original object around so custom field filters can inspect it; the
/// default formatter reduces them to their text.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Error(Arc<dyn Error + Send + Sync>),
    Describable(Arc<dyn fmt::Display + Send + Sync>),
    Map(BTreeMap<String, FieldValue>),
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        FieldValue::Error(Arc::new(err))
    }

    pub fn describable<D>(value: D) -> Self
    where
        D: fmt::Display + Send + Sync + 'static,
    {
        FieldValue::Describable(Arc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::I64(v) => f.debug_tuple("I64").field(v).finish(),
            FieldValue::U64(v) => f.debug_tuple("U64").field(v).finish(),
            FieldValue::F64(v) => f.debug_tuple("F64").field(v).finish(),
            FieldValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            FieldValue::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
            FieldValue::Describable(d) => f.debug_tuple("Describable").field(&d.to_string()).finish(),
            FieldValue::Map(m) => f.debug_tuple("Map").field(m).finish(),
            FieldValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Error(a), Error(b)) => a.to_string() == b.to_string(),
            (Describable(a), Describable(b)) => a.to_string() == b.to_string(),
            (Map(a), Map(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I64(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(v: BTreeMap<String, FieldValue>) -> Self {
        FieldValue::Map(v)
    }
}

/// Error captured from a `tracing` event, which only lends the value
/// for the duration of the visit.
#[derive(Debug, Clone)]
pub struct CapturedError(pub String);

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for CapturedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_attaches_fields() {
        let record = LogRecord::new(Level::Error, "boom")
            .with_field("user_id", 42i64)
            .with_field(STREAM_NAME_FIELD, "audit");

        assert_eq!(record.message, "boom");
        assert_eq!(record.field("user_id"), Some(&FieldValue::I64(42)));
        assert_eq!(record.field(STREAM_NAME_FIELD).and_then(FieldValue::as_str), Some("audit"));
    }

    #[test]
    fn errors_compare_by_message() {
        let a = FieldValue::error(CapturedError("disk full".into()));
        let b = FieldValue::error(CapturedError("disk full".into()));
        assert_eq!(a, b);
        assert_ne!(a, FieldValue::Str("disk full".into()));
    }
}
