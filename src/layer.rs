use crate::formatter::EcsFormatter;
use crate::record::{CallSite, FieldValue, LogEntry};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that writes every event as one line of ECS
/// JSON.
///
/// Events are converted to [`LogEntry`] values, formatted with the
/// configured [`EcsFormatter`] and written to the layer's writer. Events
/// that fail to format produce no output; they are counted in
/// `failed_events` and reported on stderr.
pub struct EcsLayer<W = fn() -> io::Stdout> {
    formatter: EcsFormatter,
    make_writer: W,
    report_caller: bool,
    max_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events written to the writer.
    pub written_events: Arc<AtomicU64>,
    /// Events dropped because formatting or writing failed.
    pub failed_events: Arc<AtomicU64>,
}

impl EcsLayer {
    /// Layer writing to stdout, accepting every level, without call-site
    /// info.
    pub fn new(formatter: EcsFormatter) -> Self {
        Self {
            formatter,
            make_writer: io::stdout,
            report_caller: false,
            max_level: Level::TRACE,
            total_events: Arc::new(AtomicU64::new(0)),
            written_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<W> EcsLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn with_writer<W2>(self, make_writer: W2) -> EcsLayer<W2>
    where
        W2: for<'a> MakeWriter<'a> + 'static,
    {
        EcsLayer {
            formatter: self.formatter,
            make_writer,
            report_caller: self.report_caller,
            max_level: self.max_level,
            total_events: self.total_events,
            written_events: self.written_events,
            failed_events: self.failed_events,
        }
    }

    /// Attach the event's module path, file and line as `log.origin.*`.
    pub fn with_report_caller(mut self, report_caller: bool) -> Self {
        self.report_caller = report_caller;
        self
    }

    /// Most verbose level that is still written.
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    pub fn formatter(&self) -> &EcsFormatter {
        &self.formatter
    }

    fn entry_from_event(&self, event: &Event<'_>) -> LogEntry {
        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let meta = event.metadata();
        let call_site = self.report_caller.then(|| CallSite {
            function: meta.module_path().unwrap_or_else(|| meta.target()).to_string(),
            file: meta.file().unwrap_or_default().to_string(),
            line: meta.line().unwrap_or(0),
        });

        LogEntry {
            timestamp: Utc::now().fixed_offset(),
            level: *meta.level(),
            message: message.unwrap_or_default(),
            fields,
            call_site,
        }
    }
}

impl<S, W> Layer<S> for EcsLayer<W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if *event.metadata().level() > self.max_level {
            return;
        }

        let entry = self.entry_from_event(event);
        let buf = match self.formatter.format(&entry) {
            Ok(buf) => buf,
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to format log entry: {}", e);
                return;
            }
        };

        let mut writer = self.make_writer.make_writer_for(event.metadata());
        match writer.write_all(&buf) {
            Ok(()) => {
                self.written_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to write log entry: {}", e);
            }
        }
    }
}

/// Collects an event's fields into [`FieldValue`]s.
///
/// Values recorded through `record_error` keep their error type, so an
/// `error = &err as &dyn Error` field becomes `error.message`.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, FieldValue::error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, format!("{:?}", value).into());
        }
    }
}
