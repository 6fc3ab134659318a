use crate::encoder::{FieldKey, FieldMap, JsonEncoder, TimestampFormat};
use crate::error::FormatError;
use crate::record::{CallSite, CallerFormatter, FieldValue, LogEntry, ERROR_KEY};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Version of ECS the output is compatible with.
pub const ECS_VERSION: &str = "1.6.0";

const ECS_VERSION_KEY: &str = "ecs.version";
const ORIGIN_FUNCTION_KEY: &str = "log.origin.function";
const ORIGIN_FILE_NAME_KEY: &str = "log.origin.file.name";
const ORIGIN_FILE_LINE_KEY: &str = "log.origin.file.line";

/// Formats [`LogEntry`] values as ECS-compliant JSON.
///
/// Output always carries `@timestamp`, `message`, `log.level` and
/// `ecs.version`. An error attached under the `error` key is written as
/// `error.message`; the call site, when present, as `log.origin.*`.
///
/// The formatter holds no state besides its configuration and can be
/// shared between threads.
#[derive(Clone, Default)]
pub struct EcsFormatter {
    /// Write `<`, `>` and `&` literally instead of escaping them.
    pub disable_html_escape: bool,

    /// Nest all user fields under this key.
    ///
    /// Ignored for well-known fields such as `error`, which always go to
    /// their ECS location.
    pub data_key: Option<String>,

    /// Overrides how the call site is rendered. The second value is split
    /// on its first `:` into `log.origin.file.name` and
    /// `log.origin.file.line`. Empty values drop the matching key.
    pub caller_formatter: Option<CallerFormatter>,

    /// Indent output.
    pub pretty_print: bool,
}

impl fmt::Debug for EcsFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcsFormatter")
            .field("disable_html_escape", &self.disable_html_escape)
            .field("data_key", &self.data_key)
            .field("caller_formatter", &self.caller_formatter.is_some())
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

#[derive(Serialize)]
struct ErrorObject {
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

impl EcsFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_key(mut self, key: impl Into<String>) -> Self {
        self.data_key = Some(key.into());
        self
    }

    pub fn with_caller_formatter<F>(mut self, caller_formatter: F) -> Self
    where
        F: Fn(&CallSite) -> (String, String) + Send + Sync + 'static,
    {
        self.caller_formatter = Some(Arc::new(caller_formatter));
        self
    }

    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    pub fn with_html_escape_disabled(mut self, disabled: bool) -> Self {
        self.disable_html_escape = disabled;
        self
    }

    /// Format `entry` as one newline-terminated ECS JSON document.
    ///
    /// `entry` is left untouched; the only failure is the JSON encoder
    /// rejecting a field value.
    pub fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let data_key = self.data_key.as_deref().filter(|key| !key.is_empty());

        let mut data: BTreeMap<String, FieldValue> = BTreeMap::new();
        let mut extra = Map::new();
        for (key, value) in &entry.fields {
            match (key.as_str(), value) {
                (ERROR_KEY, FieldValue::Error(message)) => {
                    let error = ErrorObject {
                        message: message.clone(),
                    };
                    data.insert(ERROR_KEY.to_string(), FieldValue::Json(serde_json::to_value(error)?));
                }
                // Anything else under `error` is kept as ordinary data.
                _ if data_key.is_some() => {
                    extra.insert(key.clone(), value.to_json()?);
                }
                _ => {
                    data.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(data_key) = data_key {
            if !extra.is_empty() {
                data.insert(data_key.to_string(), FieldValue::Json(Value::Object(extra)));
            }
        }

        if let Some(call_site) = &entry.call_site {
            let (function, file, line) = self.origin(call_site);
            if !function.is_empty() {
                data.insert(ORIGIN_FUNCTION_KEY.to_string(), function.into());
            }
            if !file.is_empty() {
                data.insert(ORIGIN_FILE_NAME_KEY.to_string(), file.into());
            }
            if line > 0 {
                data.insert(ORIGIN_FILE_LINE_KEY.to_string(), line.into());
            }
        }

        // Always wins over a user field of the same name.
        data.insert(ECS_VERSION_KEY.to_string(), ECS_VERSION.into());

        // The call site was consumed above and must not be rendered again
        // by the encoder.
        let entry = LogEntry {
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message.clone(),
            fields: data,
            call_site: None,
        };
        self.encoder().encode(&entry)
    }

    fn origin(&self, call_site: &CallSite) -> (String, String, i64) {
        match &self.caller_formatter {
            Some(caller_formatter) => {
                let (function, file_line) = caller_formatter(call_site);
                let (file, line) = split_file_line(&file_line);
                (function, file, line)
            }
            None => (
                call_site.function.clone(),
                call_site.file.clone(),
                i64::from(call_site.line),
            ),
        }
    }

    fn encoder(&self) -> JsonEncoder {
        JsonEncoder {
            timestamp_format: TimestampFormat::EcsMillis,
            disable_timestamp: false,
            disable_html_escape: self.disable_html_escape,
            field_map: ecs_field_map(),
            caller_formatter: self.caller_formatter.clone(),
            pretty_print: self.pretty_print,
        }
    }
}

fn ecs_field_map() -> FieldMap {
    FieldMap::new()
        .with(FieldKey::Time, "@timestamp")
        .with(FieldKey::Msg, "message")
        .with(FieldKey::Level, "log.level")
}

/// Split `"file:line"` on the first colon. A missing or non-numeric line
/// yields 0.
fn split_file_line(file_line: &str) -> (String, i64) {
    match file_line.split_once(':') {
        Some((file, line)) => (file.to_string(), line.parse().unwrap_or(0)),
        None => (file_line.to_string(), 0),
    }
}
