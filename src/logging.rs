//! Structured logging setup using the `tracing` ecosystem.
//!
//! Installs a `tracing-subscriber` registry with either JSON output (for
//! production) or pretty-printed output (for a terminal). Every log line the
//! pipeline emits is a `tracing` event with structured fields, so the JSON
//! format carries them as top-level keys. Field groups such as the access
//! log's `headers` are emitted as nested objects.
//!
//! Events are handed to a background writer thread through
//! `tracing-appender`, so a slow or blocked stdout never stalls a request.

use std::fmt;
use std::io::IsTerminal;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ConfigError;

/// Fields that carry a JSON object and are emitted nested rather than as a
/// string.
pub(crate) const GROUP_FIELDS: &[&str] = &["headers"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// `json` forces JSON; otherwise the format follows stdout: pretty on a
/// terminal, JSON when piped.
#[must_use]
pub fn resolve_format(json: bool) -> LogFormat {
    if json || !std::io::stdout().is_terminal() {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    }
}

/// Parses `trace`, `debug`, `info`, `warn` or `error` (any case).
pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    level
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("unknown log level `{level}`")))
}

/// Installs the global subscriber writing to stdout off the request path.
///
/// Keep the returned guard alive for the life of the process: dropping it
/// flushes buffered lines and stops the writer thread.
///
/// # Errors
///
/// Fails on an unknown level or when a global subscriber is already set.
pub fn init(level: &str, format: LogFormat) -> Result<WorkerGuard, ConfigError> {
    let filter = Targets::new().with_default(parse_level(level)?);
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(json_layer(writer, false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(subscriber_fmt::layer().pretty().with_writer(writer))
            .try_init(),
    };
    installed.map_err(|e| ConfigError::Invalid(format!("logging already initialized: {e}")))?;
    Ok(guard)
}

/// The JSON `fmt` layer: one object per line through [`JsonLines`].
pub(crate) fn json_layer<S, W>(
    writer: W,
    with_target: bool,
) -> subscriber_fmt::Layer<S, DefaultFields, JsonLines, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    subscriber_fmt::layer()
        .event_format(JsonLines { with_target })
        .with_writer(writer)
}

/// Formats an event as a flat JSON object with `timestamp`, `level`,
/// optionally `target`, then the event's fields. Fields named in
/// [`GROUP_FIELDS`] are parsed back into objects.
pub(crate) struct JsonLines {
    with_target: bool,
}

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut line = Map::new();

        let mut timestamp = String::new();
        SystemTime.format_time(&mut Writer::new(&mut timestamp))?;
        line.insert("timestamp".to_owned(), Value::String(timestamp));
        line.insert("level".to_owned(), Value::String(meta.level().to_string()));
        if self.with_target {
            line.insert("target".to_owned(), Value::String(meta.target().to_owned()));
        }
        event.record(&mut JsonVisitor(&mut line));

        let json = serde_json::to_string(&line).map_err(|_| fmt::Error)?;
        writeln!(writer, "{json}")
    }
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl JsonVisitor<'_> {
    fn insert_text(&mut self, field: &Field, text: String) {
        let value = if GROUP_FIELDS.contains(&field.name()) {
            serde_json::from_str::<Value>(&text)
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::String(text))
        } else {
            Value::String(text)
        };
        self.0.insert(field.name().to_owned(), value);
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert_text(field, value.to_owned());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert_text(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert_text(field, format!("{value:?}"));
    }
}
