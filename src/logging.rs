// Structured Logging Configuration
// "Every strike is written down"

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::KestrelError;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: String,
    pub include_thread_ids: bool,
    /// Whether to include target module names
    pub include_targets: bool,
    pub include_file_line: bool,
    /// Span events to include (new, enter, exit, close, active, full)
    pub span_events: String,
    /// Whether to enable ANSI colors in output
    pub enable_colors: bool,
    /// Log file path (logs to stderr if not specified)
    pub file_path: Option<String>,
    /// Environment filter override
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            include_thread_ids: false,
            include_targets: false,
            include_file_line: false,
            span_events: "none".to_string(),
            enable_colors: true,
            file_path: None,
            env_filter: None,
        }
    }
}

/// Logging format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = KestrelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => {
                crate::kestrel_bail!(crate::kestrel_error!(
                    configuration,
                    format!("Invalid log format: {s}. Valid options: json, pretty, compact")
                ));
            }
        }
    }
}

/// Span events configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
    pub active: bool,
    pub full: bool,
}

impl SpanEvents {
    pub fn from_string(s: &str) -> Self {
        let events: Vec<String> = s.split(',').map(|e| e.trim().to_lowercase()).collect();
        let has = |name: &str| events.iter().any(|e| e == name || e == "full");

        Self {
            new: has("new"),
            enter: has("enter"),
            exit: has("exit"),
            close: has("close"),
            active: has("active"),
            full: events.iter().any(|e| e == "full"),
        }
    }

    pub fn to_fmt_span(&self) -> FmtSpan {
        if self.full {
            return FmtSpan::FULL;
        }

        let mut span = FmtSpan::NONE;
        if self.new {
            span |= FmtSpan::NEW;
        }
        if self.enter {
            span |= FmtSpan::ENTER;
        }
        if self.exit {
            span |= FmtSpan::EXIT;
        }
        if self.close {
            span |= FmtSpan::CLOSE;
        }
        if self.active {
            span |= FmtSpan::ACTIVE;
        }
        span
    }
}

/// Initialize logging with the given configuration.
///
/// Fails instead of panicking when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), KestrelError> {
    let level = config.level.parse::<Level>().map_err(|_| {
        crate::kestrel_error!(
            configuration,
            format!("Invalid log level: {}", config.level)
        )
    })?;
    let format = config.format.parse::<LogFormat>()?;

    let env_filter = match config.env_filter {
        Some(ref filter) => EnvFilter::try_new(filter).map_err(|e| {
            crate::kestrel_error!(configuration, format!("Invalid env filter: {e}"))
        })?,
        None => EnvFilter::try_new(format!("kestrel={level},kestrelctl={level}")).map_err(
            |e| crate::kestrel_error!(configuration, format!("Invalid log directive: {e}")),
        )?,
    };

    let (writer, ansi) = match config.file_path {
        Some(ref file_path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|e| {
                    crate::kestrel_error!(configuration, format!("Failed to open log file: {e}"))
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(io::stderr), config.enable_colors),
    };

    let span_events = SpanEvents::from_string(&config.span_events);

    tracing_subscriber::registry()
        .with(fmt_layer(config, format, span_events.to_fmt_span(), writer, ansi))
        .with(env_filter)
        .try_init()
        .map_err(|e| crate::kestrel_error!(configuration, format!("Logging already initialized: {e}")))?;

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}

fn fmt_layer<S>(
    config: &LoggingConfig,
    format: LogFormat,
    span_events: FmtSpan,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events)
        .with_ansi(ansi)
        .with_writer(writer);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Performance measurement helper
pub struct PerformanceTimer {
    operation: String,
    start_time: std::time::Instant,
    metadata: HashMap<String, String>,
}

impl PerformanceTimer {
    /// Start a new performance timer
    pub fn start<S: Into<String>>(operation: S) -> Self {
        Self {
            operation: operation.into(),
            start_time: std::time::Instant::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the timer
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finish the timer and log the duration; returns the elapsed milliseconds.
    pub fn finish(self) -> u64 {
        let duration_ms = self.start_time.elapsed().as_millis() as u64;

        if self.metadata.is_empty() {
            tracing::debug!(
                operation = %self.operation,
                duration_ms,
                category = "performance"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms,
                category = "performance",
                metadata = ?self.metadata
            );
        }
        duration_ms
    }
}

/// Error logging helper
pub fn log_error_with_context(error: &KestrelError, context: &str) {
    match error.severity() {
        Level::ERROR => tracing::error!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::WARN => tracing::warn!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::INFO => tracing::info!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        _ => tracing::debug!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
    }
}

/// Configuration validation logging
pub fn log_config_validation(component: &str, valid: bool, warnings: &[String]) {
    if valid && warnings.is_empty() {
        tracing::info!(
            component = component,
            status = "valid",
            category = "config",
            "Configuration validation passed"
        );
    } else if valid {
        tracing::warn!(
            component = component,
            status = "valid_with_warnings",
            warnings = ?warnings,
            category = "config",
            "Configuration validation passed with warnings"
        );
    } else {
        tracing::error!(
            component = component,
            status = "invalid",
            warnings = ?warnings,
            category = "config",
            "Configuration validation failed"
        );
    }
}
