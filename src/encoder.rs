use crate::error::FormatError;
use crate::record::{level_name, CallerFormatter, LogEntry};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io;

/// Core keys written by [`JsonEncoder`] for every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldKey {
    Time,
    Msg,
    Level,
    Func,
    File,
}

impl FieldKey {
    pub fn default_name(self) -> &'static str {
        match self {
            FieldKey::Time => "time",
            FieldKey::Msg => "msg",
            FieldKey::Level => "level",
            FieldKey::Func => "func",
            FieldKey::File => "file",
        }
    }
}

/// Renames for the core keys. Keys without an entry keep their default name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(BTreeMap<FieldKey, String>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FieldKey, name: impl Into<String>) -> Self {
        self.0.insert(key, name.into());
        self
    }

    pub fn resolve(&self, key: FieldKey) -> &str {
        self.0
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_name())
    }
}

/// How the entry timestamp is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    /// RFC 3339 with second precision, e.g. `2021-03-04T05:06:07Z`.
    #[default]
    Rfc3339,
    /// Millisecond precision followed by `Z` for UTC or a `+hhmm` offset,
    /// e.g. `1970-01-01T00:00:00.000Z`.
    EcsMillis,
    /// A `chrono` strftime pattern.
    Strftime(String),
}

impl TimestampFormat {
    pub fn render(&self, timestamp: &DateTime<FixedOffset>) -> Result<String, FormatError> {
        match self {
            TimestampFormat::Rfc3339 => Ok(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            TimestampFormat::EcsMillis => {
                let mut out = timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
                if timestamp.offset().local_minus_utc() == 0 {
                    out.push('Z');
                } else {
                    out.push_str(&timestamp.format("%z").to_string());
                }
                Ok(out)
            }
            TimestampFormat::Strftime(pattern) => {
                // to_string() panics on an invalid pattern; write! surfaces fmt::Error.
                let mut out = String::new();
                write!(out, "{}", timestamp.format(pattern))
                    .map_err(|_| FormatError::TimestampFormat(pattern.clone()))?;
                Ok(out)
            }
        }
    }
}

/// Generic JSON serializer for [`LogEntry`] values.
///
/// Writes one JSON object per entry with sorted keys and a trailing newline.
/// User fields are written as-is next to the time, message and level keys;
/// a user field that would overwrite one of those is kept as
/// `fields.<key>` instead.
#[derive(Clone, Default)]
pub struct JsonEncoder {
    pub timestamp_format: TimestampFormat,
    pub disable_timestamp: bool,
    /// Write `<`, `>` and `&` literally instead of as `\u003c` etc.
    pub disable_html_escape: bool,
    pub field_map: FieldMap,
    /// Renders the `func` and `file` keys for entries carrying a call site.
    pub caller_formatter: Option<CallerFormatter>,
    pub pretty_print: bool,
}

impl fmt::Debug for JsonEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEncoder")
            .field("timestamp_format", &self.timestamp_format)
            .field("disable_timestamp", &self.disable_timestamp)
            .field("disable_html_escape", &self.disable_html_escape)
            .field("field_map", &self.field_map)
            .field("caller_formatter", &self.caller_formatter.is_some())
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

impl JsonEncoder {
    pub fn encode(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let mut data = BTreeMap::new();
        for (key, value) in &entry.fields {
            data.insert(key.clone(), value.to_json()?);
        }
        self.prefix_field_clashes(&mut data, entry.has_call_site());

        if !self.disable_timestamp {
            let timestamp = self.timestamp_format.render(&entry.timestamp)?;
            data.insert(self.key(FieldKey::Time), Value::String(timestamp));
        }
        data.insert(self.key(FieldKey::Msg), Value::String(entry.message.clone()));
        data.insert(self.key(FieldKey::Level), Value::String(level_name(&entry.level)));

        if let Some(call_site) = &entry.call_site {
            let (function, file) = match &self.caller_formatter {
                Some(caller_formatter) => caller_formatter(call_site),
                None => (
                    call_site.function.clone(),
                    format!("{}:{}", call_site.file, call_site.line),
                ),
            };
            if !function.is_empty() {
                data.insert(self.key(FieldKey::Func), Value::String(function));
            }
            if !file.is_empty() {
                data.insert(self.key(FieldKey::File), Value::String(file));
            }
        }

        let escape_html = !self.disable_html_escape;
        let mut buf = if self.pretty_print {
            write_json(&data, PrettyFormatter::new(), escape_html)?
        } else {
            write_json(&data, CompactFormatter, escape_html)?
        };
        buf.push(b'\n');
        Ok(buf)
    }

    fn key(&self, key: FieldKey) -> String {
        self.field_map.resolve(key).to_string()
    }

    fn prefix_field_clashes(&self, data: &mut BTreeMap<String, Value>, has_call_site: bool) {
        let mut keys = vec![FieldKey::Time, FieldKey::Msg, FieldKey::Level];
        if has_call_site {
            keys.extend([FieldKey::Func, FieldKey::File]);
        }
        for key in keys {
            let name = self.field_map.resolve(key);
            if let Some(value) = data.remove(name) {
                data.insert(format!("fields.{}", name), value);
            }
        }
    }
}

fn write_json<F: Formatter>(
    data: &BTreeMap<String, Value>,
    formatter: F,
    escape_html: bool,
) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::with_capacity(256);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, EscapingFormatter::new(formatter, escape_html));
    data.serialize(&mut serializer)?;
    Ok(buf)
}

/// Wraps a `serde_json` formatter to escape HTML-sensitive characters and
/// the JS line terminators U+2028 and U+2029 inside strings.
struct EscapingFormatter<F> {
    inner: F,
    escape_html: bool,
}

impl<F> EscapingFormatter<F> {
    fn new(inner: F, escape_html: bool) -> Self {
        EscapingFormatter { inner, escape_html }
    }
}

impl<F: Formatter> Formatter for EscapingFormatter<F> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' if self.escape_html => "\\u003c",
                '>' if self.escape_html => "\\u003e",
                '&' if self.escape_html => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            if start < i {
                writer.write_all(fragment[start..i].as_bytes())?;
            }
            writer.write_all(escaped.as_bytes())?;
            start = i + ch.len_utf8();
        }
        if start < fragment.len() {
            writer.write_all(fragment[start..].as_bytes())?;
        }
        Ok(())
    }

    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array(writer)
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object(writer)
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object_value(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CallSite;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tracing::Level;

    fn epoch_entry(level: Level, message: &str) -> LogEntry {
        let epoch = Utc.timestamp_opt(0, 0).single().unwrap();
        LogEntry::new(level, message).with_time(epoch)
    }

    fn encode_to_string(encoder: &JsonEncoder, entry: &LogEntry) -> String {
        String::from_utf8(encoder.encode(entry).unwrap()).unwrap()
    }

    #[test]
    fn default_keys_and_rfc3339_timestamp() {
        let entry = epoch_entry(Level::INFO, "hello").with_field("custom", "foo");

        assert_eq!(
            encode_to_string(&JsonEncoder::default(), &entry),
            "{\"custom\":\"foo\",\"level\":\"info\",\"msg\":\"hello\",\"time\":\"1970-01-01T00:00:00Z\"}\n"
        );
    }

    #[test]
    fn field_map_renames_core_keys() {
        let encoder = JsonEncoder {
            field_map: FieldMap::new()
                .with(FieldKey::Time, "@timestamp")
                .with(FieldKey::Msg, "message"),
            disable_timestamp: true,
            ..JsonEncoder::default()
        };
        let entry = epoch_entry(Level::DEBUG, "hi");

        assert_eq!(
            encode_to_string(&encoder, &entry),
            "{\"level\":\"debug\",\"message\":\"hi\"}\n"
        );
    }

    #[test]
    fn clashing_user_fields_are_prefixed() {
        let entry = epoch_entry(Level::INFO, "real")
            .with_field("msg", "user supplied")
            .with_field("level", "custom");

        let out: Value = serde_json::from_str(&encode_to_string(&JsonEncoder::default(), &entry)).unwrap();
        assert_eq!(out["msg"], "real");
        assert_eq!(out["level"], "info");
        assert_eq!(out["fields.msg"], "user supplied");
        assert_eq!(out["fields.level"], "custom");
    }

    #[test]
    fn caller_keys_only_protected_when_call_site_present() {
        let without = epoch_entry(Level::INFO, "x").with_field("file", "a.rs");
        let out: Value = serde_json::from_str(&encode_to_string(&JsonEncoder::default(), &without)).unwrap();
        assert_eq!(out["file"], "a.rs");

        let with = without.with_call_site(CallSite::new("main", "src/main.rs", 7));
        let out: Value = serde_json::from_str(&encode_to_string(&JsonEncoder::default(), &with)).unwrap();
        assert_eq!(out["fields.file"], "a.rs");
        assert_eq!(out["file"], "src/main.rs:7");
        assert_eq!(out["func"], "main");
    }

    #[test]
    fn caller_formatter_empty_strings_drop_keys() {
        let encoder = JsonEncoder {
            caller_formatter: Some(Arc::new(|_: &CallSite| (String::new(), "lib.rs:1".to_string()))),
            ..JsonEncoder::default()
        };
        let entry = epoch_entry(Level::INFO, "x").with_call_site(CallSite::new("f", "g.rs", 2));

        let out: Value = serde_json::from_str(&encode_to_string(&encoder, &entry)).unwrap();
        assert!(out.get("func").is_none());
        assert_eq!(out["file"], "lib.rs:1");
    }

    #[test]
    fn html_is_escaped_by_default() {
        let entry = epoch_entry(Level::INFO, "<b>&</b>");
        let out = encode_to_string(&JsonEncoder::default(), &entry);
        assert!(out.contains(r#""msg":"\u003cb\u003e\u0026\u003c/b\u003e""#), "{}", out);
    }

    #[test]
    fn html_escape_can_be_disabled() {
        let encoder = JsonEncoder {
            disable_html_escape: true,
            ..JsonEncoder::default()
        };
        let entry = epoch_entry(Level::INFO, "<b>&</b>");
        let out = encode_to_string(&encoder, &entry);
        assert!(out.contains(r#""msg":"<b>&</b>""#), "{}", out);
    }

    #[test]
    fn line_separators_are_always_escaped() {
        let encoder = JsonEncoder {
            disable_html_escape: true,
            ..JsonEncoder::default()
        };
        let entry = epoch_entry(Level::INFO, "a\u{2028}b\u{2029}c");
        let out = encode_to_string(&encoder, &entry);
        assert!(out.contains(r#""msg":"a\u2028b\u2029c""#), "{}", out);

        let decoded: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(decoded["msg"], "a\u{2028}b\u{2029}c");
    }

    #[test]
    fn pretty_print_indents_with_two_spaces() {
        let encoder = JsonEncoder {
            pretty_print: true,
            disable_timestamp: true,
            ..JsonEncoder::default()
        };
        let entry = epoch_entry(Level::WARN, "careful");

        assert_eq!(
            encode_to_string(&encoder, &entry),
            "{\n  \"level\": \"warn\",\n  \"msg\": \"careful\"\n}\n"
        );
    }

    #[test]
    fn ecs_millis_uses_numeric_offset_outside_utc() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let ts = tz.timestamp_opt(0, 5_000_000).single().unwrap();

        assert_eq!(
            TimestampFormat::EcsMillis.render(&ts).unwrap(),
            "1970-01-01T02:00:00.005+0200"
        );

        let west = FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap();
        let ts = west.timestamp_opt(0, 0).single().unwrap();
        assert_eq!(
            TimestampFormat::EcsMillis.render(&ts).unwrap(),
            "1969-12-31T18:30:00.000-0530"
        );
    }

    #[test]
    fn strftime_pattern_is_applied() {
        let ts = Utc.timestamp_opt(0, 0).single().unwrap().fixed_offset();
        let format = TimestampFormat::Strftime("%Y/%m/%d".to_string());
        assert_eq!(format.render(&ts).unwrap(), "1970/01/01");
    }

    #[test]
    fn invalid_strftime_pattern_is_an_error() {
        let ts = Utc.timestamp_opt(0, 0).single().unwrap().fixed_offset();
        let format = TimestampFormat::Strftime("%Q".to_string());
        assert!(matches!(format.render(&ts), Err(FormatError::TimestampFormat(_))));
    }

    #[test]
    fn lazy_failure_propagates_from_encode() {
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        let entry = epoch_entry(Level::INFO, "x").with_field("bad", crate::record::FieldValue::lazy(bad));

        assert!(matches!(
            JsonEncoder::default().encode(&entry),
            Err(FormatError::Serialization(_))
        ));
    }
}
