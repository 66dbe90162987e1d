//! Turning [`LogRecord`]s into delivery-ready bytes.

use crate::config::HookConfig;
use crate::error::FormatError;
use crate::record::{FieldValue, LogRecord, STREAM_NAME_FIELD};
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Custom transform applied to a named field before serialization.
pub type FieldFilter = Arc<dyn Fn(&FieldValue) -> FieldValue + Send + Sync>;

/// Creates one formatter per worker. Formatters are never shared.
pub type FormatterFactory = Arc<dyn Fn(Arc<FieldRules>) -> Box<dyn RecordFormatter> + Send + Sync>;

/// Strategy converting one record into bytes.
///
/// Takes `&mut self` so implementations may keep scratch buffers; each
/// worker owns its own instance.
pub trait RecordFormatter: Send {
    fn format(&mut self, record: &LogRecord) -> Result<Vec<u8>, FormatError>;
}

/// Per-field policy shared by all formatters of a hook: fields to omit
/// and fields with a custom transform.
#[derive(Clone, Default)]
pub struct FieldRules {
    ignore: HashSet<String>,
    filters: HashMap<String, FieldFilter>,
}

impl FieldRules {
    pub fn new(ignore: HashSet<String>, filters: HashMap<String, FieldFilter>) -> Self {
        Self { ignore, filters }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }

    pub fn filter(&self, name: &str) -> Option<&FieldFilter> {
        self.filters.get(name)
    }
}

/// Default formatter: a JSON object of the record's non-ignored fields.
///
/// Unless built with [`JsonFormatter::fields_only`], the object also gets
/// `level`, `message` and `time` keys, each only when the record carries
/// no field of that name and the name isn't ignored.
pub struct JsonFormatter {
    rules: Arc<FieldRules>,
    metadata: bool,
}

impl JsonFormatter {
    pub fn new(rules: Arc<FieldRules>) -> Self {
        Self { rules, metadata: true }
    }

    pub fn fields_only(rules: Arc<FieldRules>) -> Self {
        Self { rules, metadata: false }
    }

    pub fn factory() -> FormatterFactory {
        Arc::new(|rules| Box::new(JsonFormatter::new(rules)) as Box<dyn RecordFormatter>)
    }

    fn insert_metadata(&self, record: &LogRecord, out: &mut Map<String, Value>) {
        let entries = [
            ("level", Value::String(record.level.as_str().to_string())),
            ("message", Value::String(record.message.clone())),
            ("time", Value::String(record.timestamp.to_rfc3339())),
        ];
        for (key, value) in entries {
            if record.fields.contains_key(key) || self.rules.is_ignored(key) {
                continue;
            }
            out.insert(key.to_string(), value);
        }
    }
}

impl RecordFormatter for JsonFormatter {
    fn format(&mut self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let mut out = Map::new();
        for (name, value) in &record.fields {
            if self.rules.is_ignored(name) {
                continue;
            }
            let normalized = match self.rules.filter(name) {
                Some(filter) => normalize(name, &filter(value))?,
                None => normalize(name, value)?,
            };
            out.insert(name.clone(), normalized);
        }
        if self.metadata {
            self.insert_metadata(record, &mut out);
        }
        Ok(serde_json::to_vec(&Value::Object(out))?)
    }
}

/// Default value normalization: errors become their message,
/// describable values their description, everything else maps onto the
/// matching JSON value. Non-finite floats have no JSON form.
pub fn normalize(field: &str, value: &FieldValue) -> Result<Value, FormatError> {
    let json = match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(v) => Value::Bool(*v),
        FieldValue::I64(v) => Value::from(*v),
        FieldValue::U64(v) => Value::from(*v),
        FieldValue::F64(v) => Number::from_f64(*v)
            .map(Value::Number)
            .ok_or_else(|| FormatError::NonFiniteNumber { field: field.to_string() })?,
        FieldValue::Str(v) => Value::String(v.clone()),
        FieldValue::Error(err) => Value::String(err.to_string()),
        FieldValue::Describable(d) => Value::String(d.to_string()),
        FieldValue::Map(map) => {
            let mut obj = Map::new();
            for (key, nested) in map {
                obj.insert(key.clone(), normalize(&format!("{}.{}", field, key), nested)?);
            }
            Value::Object(obj)
        }
        FieldValue::Json(v) => v.clone(),
    };
    Ok(json)
}

/// Destination for `record`: a string `stream_name` field wins, even an
/// empty one; any other value or no field at all means `default`.
pub fn resolve_destination<'a>(record: &'a LogRecord, default: &'a str) -> &'a str {
    match record.field(STREAM_NAME_FIELD) {
        Some(FieldValue::Str(name)) => name,
        _ => default,
    }
}

/// Formatted payload plus the stream it is headed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRecord {
    pub data: Vec<u8>,
    pub destination: String,
}

/// Formatter plus the hook-level framing rules (newline, destination).
pub struct RecordEncoder {
    formatter: Box<dyn RecordFormatter>,
    append_newline: bool,
    default_destination: Arc<str>,
}

impl RecordEncoder {
    pub fn new(
        formatter: Box<dyn RecordFormatter>,
        append_newline: bool,
        default_destination: Arc<str>,
    ) -> Self {
        Self { formatter, append_newline, default_destination }
    }

    /// Fresh encoder with its own formatter instance built from `config`.
    pub fn from_config(config: &HookConfig) -> Self {
        let formatter = (config.formatter)(Arc::clone(&config.field_rules));
        Self::new(formatter, config.append_newline, Arc::clone(&config.destination))
    }

    pub fn encode(&mut self, record: &LogRecord) -> Result<FormattedRecord, FormatError> {
        let mut data = self.formatter.format(record)?;
        if self.append_newline {
            data.push(b'\n');
        }
        let destination = resolve_destination(record, &self.default_destination).to_string();
        Ok(FormattedRecord { data, destination })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::record::CapturedError;
    use std::collections::BTreeMap;
    use std::fmt;

    fn rules(ignore: &[&str], filters: Vec<(&str, FieldFilter)>) -> Arc<FieldRules> {
        Arc::new(FieldRules::new(
            ignore.iter().map(|s| s.to_string()).collect(),
            filters.into_iter().map(|(k, f)| (k.to_string(), f)).collect(),
        ))
    }

    fn parse(bytes: &[u8]) -> Map<String, Value> {
        match serde_json::from_slice(bytes).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    struct Version(u32, u32);

    impl fmt::Display for Version {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "v{}.{}", self.0, self.1)
        }
    }

    #[test]
    fn normalizes_errors_and_describables() {
        let record = LogRecord::new(Level::Error, "failed")
            .with_field("err", FieldValue::error(CapturedError("connection reset".into())))
            .with_field("version", FieldValue::describable(Version(1, 4)))
            .with_field("count", 3i64)
            .with_field("raw", serde_json::json!({"a": [1, 2]}));

        let out = parse(&JsonFormatter::fields_only(rules(&[], vec![])).format(&record).unwrap());

        assert_eq!(out["err"], "connection reset");
        assert_eq!(out["version"], "v1.4");
        assert_eq!(out["count"], 3);
        assert_eq!(out["raw"], serde_json::json!({"a": [1, 2]}));
        assert!(!out.contains_key("message"));
    }

    #[test]
    fn ignored_fields_never_appear() {
        let record = LogRecord::new(Level::Info, "hello")
            .with_field("password", "hunter2")
            .with_field("user", "alice");

        let out = parse(&JsonFormatter::new(rules(&["password", "time"], vec![])).format(&record).unwrap());

        assert!(!out.contains_key("password"));
        assert!(!out.contains_key("time"));
        assert_eq!(out["user"], "alice");
        assert_eq!(out["message"], "hello");
        assert_eq!(out["level"], "info");
    }

    #[test]
    fn filter_replaces_value() {
        let mask: FieldFilter = Arc::new(|value: &FieldValue| match value {
            FieldValue::Str(s) => FieldValue::Str(format!("{}***", &s[..2])),
            _ => FieldValue::Null,
        });
        let record = LogRecord::new(Level::Warn, "login")
            .with_field("email", "alice@example.com")
            .with_field("attempts", 2i64);

        let out = parse(&JsonFormatter::new(rules(&[], vec![("email", mask)])).format(&record).unwrap());

        assert_eq!(out["email"], "al***");
        assert_eq!(out["attempts"], 2);
    }

    #[test]
    fn user_field_shadows_metadata() {
        let record = LogRecord::new(Level::Info, "from record").with_field("message", "from field");
        let out = parse(&JsonFormatter::new(rules(&[], vec![])).format(&record).unwrap());
        assert_eq!(out["message"], "from field");
    }

    #[test]
    fn non_finite_number_is_a_format_error() {
        let mut nested = BTreeMap::new();
        nested.insert("ratio".to_string(), FieldValue::F64(f64::NAN));
        let record = LogRecord::new(Level::Error, "bad").with_field("stats", nested);

        let err = JsonFormatter::new(rules(&[], vec![])).format(&record).unwrap_err();
        match err {
            FormatError::NonFiniteNumber { field } => assert_eq!(field, "stats.ratio"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolves_destination() {
        let cases: Vec<(Option<FieldValue>, &str, &str)> = vec![
            (Some("entry_stream".into()), "default_stream", "entry_stream"),
            (Some("entry_stream".into()), "", "entry_stream"),
            (Some("".into()), "default_stream", ""),
            (Some("".into()), "", ""),
            (Some(FieldValue::I64(99999)), "default_stream", "default_stream"),
            (Some(FieldValue::Null), "default_stream", "default_stream"),
            (None, "default_stream", "default_stream"),
            (None, "", ""),
        ];

        for (field, default, expected) in cases {
            let mut record = LogRecord::new(Level::Info, "x");
            if let Some(value) = field.clone() {
                record.fields.insert(STREAM_NAME_FIELD.to_string(), value);
            }
            assert_eq!(resolve_destination(&record, default), expected, "{:?} / {:?}", field, default);
        }
    }

    #[test]
    fn encoder_appends_newline_and_resolves_destination() {
        let formatter = Box::new(JsonFormatter::fields_only(rules(&[STREAM_NAME_FIELD], vec![])));
        let mut encoder = RecordEncoder::new(formatter, true, Arc::from("default"));
        let record = LogRecord::new(Level::Info, "x")
            .with_field(STREAM_NAME_FIELD, "audit")
            .with_field("k", "v");

        let formatted = encoder.encode(&record).unwrap();

        assert_eq!(formatted.destination, "audit");
        assert_eq!(formatted.data, b"{\"k\":\"v\"}\n".to_vec());
    }
}
