//! Logging setup on top of `tracing`
//!
//! The analyzer itself only emits events and spans; embedding programs
//! choose a subscriber here. `RUST_LOG` directives are honored in addition
//! to the configured level.

use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated files `<directory>/<prefix>.YYYY-MM-DD`
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log span open/close (one span per analyzed unit)
    pub span_events: bool,
    /// Extra filter directives, e.g. `"phpflow::analysis=trace"`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered output when dropped; keep it alive
/// for as long as logging is needed. Returns `None` if a subscriber was
/// already installed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => tracing_appender::non_blocking(rolling::daily(directory, prefix)),
    };

    let layer = format_layer(config.format, BoxMakeWriter::new(writer), config.span_events);
    let installed = tracing_subscriber::registry()
        .with(layer.with_filter(build_filter(&config)))
        .try_init();

    match installed {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn format_layer(format: LogFormat, writer: BoxMakeWriter, span_events: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer().with_writer(writer).with_span_events(span_events_config(span_events));
    match format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::from_default_env().add_directive(config.level.into());
    let Some(extra) = &config.filter else {
        return base;
    };
    extra
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .fold(base, |filter, directive| match directive.parse() {
            Ok(d) => filter.add_directive(d),
            Err(_) => {
                tracing::warn!("ignoring invalid log directive: {}", directive);
                filter
            }
        })
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Verbose human-readable logging to stderr
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Pretty)
            .with_span_events(true)
            .with_filter("phpflow=debug"),
    )
}

/// JSON logs in daily files under `log_dir`
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_format(LogFormat::Json)
            .with_output(LogOutput::File {
                directory: log_dir.as_ref().to_string_lossy().to_string(),
                prefix: "phpflow".to_string(),
            })
            .with_filter("phpflow=info"),
    )
}
