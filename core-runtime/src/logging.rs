//! `tracing` setup shared by the sync client and the manifest server.
//!
//! Both binaries call [`init_logging`] once with a [`LoggingConfig`] built
//! from their flags:
//!
//! ```ignore
//! let config = LoggingConfig::default()
//!     .with_format("compact".parse()?)
//!     .with_level(parse_level("debug")?);
//! init_logging(config)?;
//! tracing::info!("Sync client started");
//! ```
//!
//! A host that wants log lines in its own pipeline (the tablet app's
//! diagnostics screen, a kiosk's system log) passes a `LoggerSink`; every
//! event is then also handed over as a
//! [`LogEntry`](bridge_traits::time::LogEntry) with its fields. Values of
//! path-like fields are cut down to the basename first.

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::collections::BTreeMap;
use std::fmt as std_fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events follow the configured level; everything else is held at `warn`.
const WORKSPACE_TARGETS: &[&str] = &[
    "museo_sync_workspace",
    "core_runtime",
    "core_library",
    "core_manifest",
    "core_sync",
    "core_service",
    "manifest_server",
    "bridge_desktop",
    "museo_sync",
];

/// How events are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; for a developer terminal
    Pretty,
    /// One JSON object per line; for kiosk log shippers
    Json,
    /// One short line per event
    Compact,
}

impl Default for LogFormat {
    /// `Pretty` in debug builds, `Json` in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Parse a level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(s: &str) -> Result<LogLevel> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" | "warning" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(Error::Config(format!("Unknown log level: {}", other))),
    }
}

/// Subscriber settings, usually filled from CLI flags.
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates; third-party crates stay at `warn`
    pub level: LogLevel,
    /// Raw `EnvFilter` directives, replacing the level-derived ones
    /// (e.g. `"core_sync=trace,manifest_server=debug"`)
    pub filter: Option<String>,
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Pretty format only: log span enter and exit
    pub span_events: bool,
    pub show_target: bool,
    pub show_threads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            sink: None,
            span_events: false,
            show_target: true,
            show_threads: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_filter(self, directives: impl Into<String>) -> Self {
        Self {
            filter: Some(directives.into()),
            ..self
        }
    }

    /// Mirror every event that passes the filter into `sink` as well.
    pub fn with_logger_sink(self, sink: Arc<dyn LoggerSink>) -> Self {
        Self {
            sink: Some(sink),
            ..self
        }
    }

    pub fn with_spans(self, span_events: bool) -> Self {
        Self {
            span_events,
            ..self
        }
    }

    pub fn with_target(self, show_target: bool) -> Self {
        Self {
            show_target,
            ..self
        }
    }

    pub fn with_thread_info(self, show_threads: bool) -> Self {
        Self {
            show_threads,
            ..self
        }
    }
}

/// Install the global subscriber.
///
/// Call once during startup. A second call returns [`Error::Config`] because
/// the global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    // Exactly one of the three is `Some`; `Option<Layer>` is itself a layer.
    let pretty = (config.format == LogFormat::Pretty).then(|| {
        let span_events = if config.span_events {
            FmtSpan::ACTIVE
        } else {
            FmtSpan::NONE
        };
        fmt::layer()
            .pretty()
            .with_target(config.show_target)
            .with_thread_ids(config.show_threads)
            .with_thread_names(config.show_threads)
            .with_span_events(span_events)
            .with_writer(io::stderr)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(config.show_target)
            .with_thread_ids(config.show_threads)
            .with_writer(io::stderr)
    });
    let compact = (config.format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_target(config.show_target)
            .with_thread_ids(config.show_threads)
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(LoggerSinkLayer::new(config.sink.clone()))
        .with(pretty)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

/// Directives for our crates at the configured level, everything else at `warn`.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => std::iter::once("warn".to_string())
            .chain(
                WORKSPACE_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, config.level)),
            )
            .collect::<Vec<_>>()
            .join(","),
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Field names whose values are local paths; only the basename reaches a sink.
const PATH_FIELDS: &[&str] = &["path", "file", "dest", "library_root"];

/// Mirrors events into the configured [`LoggerSink`].
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(*metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = visitor.fields;
        entry.span = ctx.lookup_current().map(|span| span.name().to_string());

        let sink = Arc::clone(sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl EntryVisitor {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name if PATH_FIELDS.contains(&name) => {
                self.fields
                    .insert(name.to_string(), strip_path(&value).to_string());
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std_fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Drop userinfo and query string from a URL before it is logged.
///
/// Values that do not parse as URLs are returned unchanged.
///
/// ```ignore
/// use core_runtime::logging::redact_url;
///
/// info!(url = %redact_url("http://admin:pw@archive.local/api/manifest?k=1"), "Fetching");
/// // Logs: url="http://archive.local/api/manifest"
/// ```
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Strip full file paths to basename only
///
/// Library paths on a tablet include the app sandbox id; only the asset
/// filename is useful in a log line.
///
/// ```ignore
/// use core_runtime::logging::strip_path;
///
/// info!(file = %strip_path("/data/user/0/museo/library/audio/t.mp3"), "Downloaded");
/// // Logs: file="t.mp3"
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .rsplit('\\')
        .next()
        .unwrap_or(path)
}
