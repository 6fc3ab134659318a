use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

/// Field name under which an entry's error is stored.
pub const ERROR_KEY: &str = "error";

/// User hook that renders a [`CallSite`] as `(function, "file:line")`.
///
/// An empty string in either position drops the corresponding output key.
pub type CallerFormatter = Arc<dyn Fn(&CallSite) -> (String, String) + Send + Sync>;

type LazyValue = Arc<dyn Fn() -> serde_json::Result<Value> + Send + Sync>;

/// Location in the source that issued a log call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl CallSite {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        CallSite {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// Value attached to a [`LogEntry`] field.
#[derive(Clone)]
pub enum FieldValue {
    /// Plain JSON data.
    Json(Value),
    /// An error, kept as its rendered `Display` message.
    Error(String),
    /// A value serialized only when the entry is formatted. Serialization
    /// may fail, in which case formatting fails.
    Lazy(LazyValue),
}

impl FieldValue {
    pub fn error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        FieldValue::Error(err.to_string())
    }

    pub fn lazy<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        FieldValue::Lazy(Arc::new(move || serde_json::to_value(&value)))
    }

    /// Resolve to JSON. Errors become their message string.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            FieldValue::Json(value) => Ok(value.clone()),
            FieldValue::Error(message) => Ok(Value::String(message.clone())),
            FieldValue::Lazy(serialize) => serialize(),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            FieldValue::Error(message) => f.debug_tuple("Error").field(message).finish(),
            FieldValue::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

/// A single log call, as handed to the formatter.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub call_site: Option<CallSite>,
}

impl LogEntry {
    /// Entry stamped with the current UTC time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: Utc::now().fixed_offset(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
            call_site: None,
        }
    }

    pub fn with_time<Tz: TimeZone>(mut self, timestamp: DateTime<Tz>) -> Self {
        self.timestamp = timestamp.fixed_offset();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach `err` under [`ERROR_KEY`].
    pub fn with_error<E: std::error::Error + ?Sized>(self, err: &E) -> Self {
        self.with_field(ERROR_KEY, FieldValue::error(err))
    }

    pub fn with_call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub fn has_call_site(&self) -> bool {
        self.call_site.is_some()
    }
}

/// Lowercase level name used in JSON output (`"info"`, `"warn"`, ...).
pub fn level_name(level: &Level) -> String {
    level.as_str().to_ascii_lowercase()
}
