// Error Handling Module
// "A kestrel that misses its strike still knows where the prey went"

use std::fmt;
use thiserror::Error;

use crate::query::ValidationError;

/// Error types surfaced by the query-run workflow
#[derive(Error, Debug)]
pub enum KestrelError {
    // Preconditions checked before anything is sent to the backend
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // Campaign lifecycle errors
    #[error("Campaign conflict: {message}")]
    Conflict { message: String },

    #[error("No active campaign")]
    NoActiveCampaign,

    // Backend and transport errors
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// `duration_ms` is unknown when the timeout surfaced from a lower layer
    #[error(
        "Timeout occurred: {operation}{}",
        .duration_ms.map(|ms| format!(" after {ms}ms")).unwrap_or_default()
    )]
    Timeout {
        operation: String,
        duration_ms: Option<u64>,
    },

    #[error("Streaming channel error: {message}")]
    Channel { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // Data handling errors
    #[error("Data serialization failed: {message}")]
    DataSerialization { message: String },

    #[error("Export failed: {message}")]
    Export { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidConfigValue { key: String, value: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KestrelError {
    /// Create a validation error
    pub fn validation(error: ValidationError) -> Self {
        Self::Validation(error)
    }

    /// Create a campaign conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a no-active-campaign error
    pub fn no_active_campaign() -> Self {
        Self::NoActiveCampaign
    }

    /// Create a backend error for a non-success response
    pub fn backend<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Create an HTTP transport error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: Some(duration_ms),
        }
    }

    /// Timeout whose limit was set elsewhere and is not known here
    pub fn timed_out<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: None,
        }
    }

    /// Create a streaming channel error
    pub fn channel<S: Into<String>>(message: S) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a data serialization error
    pub fn data_serialization<S: Into<String>>(message: S) -> Self {
        Self::DataSerialization {
            message: message.into(),
        }
    }

    /// Create an export error
    pub fn export<S: Into<String>>(message: S) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_config_value<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict { .. } | Self::NoActiveCampaign => "campaign",
            Self::Backend { .. } => "backend",
            Self::Http { .. } | Self::Timeout { .. } => "network",
            Self::Channel { .. } => "channel",
            Self::Authentication { .. } => "security",
            Self::DataSerialization { .. } => "data",
            Self::Export { .. } => "export",
            Self::Configuration { .. } | Self::InvalidConfigValue { .. } => "configuration",
            Self::Internal { .. } => "general",
        }
    }

    /// Check if the failure is transient. Nothing retries automatically;
    /// this only tells the user whether re-running is worth a try.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } | Self::Channel { .. } => true,

            Self::Backend { status, .. } => *status >= 500,

            Self::Validation(_)
            | Self::Conflict { .. }
            | Self::NoActiveCampaign
            | Self::Authentication { .. }
            | Self::DataSerialization { .. }
            | Self::Export { .. }
            | Self::Configuration { .. }
            | Self::InvalidConfigValue { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Get severity level for logging
    pub fn severity(&self) -> tracing::Level {
        match self {
            Self::Authentication { .. } | Self::Internal { .. } => tracing::Level::ERROR,

            Self::Backend { .. }
            | Self::Http { .. }
            | Self::Timeout { .. }
            | Self::Channel { .. }
            | Self::DataSerialization { .. }
            | Self::Export { .. } => tracing::Level::WARN,

            Self::Conflict { .. } | Self::NoActiveCampaign => tracing::Level::INFO,

            Self::Validation(_)
            | Self::Configuration { .. }
            | Self::InvalidConfigValue { .. } => tracing::Level::DEBUG,
        }
    }
}

impl From<reqwest::Error> for KestrelError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            KestrelError::timed_out("HTTP request")
        } else if error.is_decode() {
            KestrelError::data_serialization(error.to_string())
        } else if let Some(status) = error.status() {
            KestrelError::backend(status.as_u16(), error.to_string())
        } else {
            KestrelError::http(error.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for KestrelError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        KestrelError::channel(error.to_string())
    }
}

impl From<serde_json::Error> for KestrelError {
    fn from(error: serde_json::Error) -> Self {
        KestrelError::data_serialization(error.to_string())
    }
}

impl From<csv::Error> for KestrelError {
    fn from(error: csv::Error) -> Self {
        KestrelError::export(error.to_string())
    }
}

impl From<config::ConfigError> for KestrelError {
    fn from(error: config::ConfigError) -> Self {
        KestrelError::configuration(error.to_string())
    }
}

impl From<std::io::Error> for KestrelError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => KestrelError::timed_out("IO operation"),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset => KestrelError::http(error.to_string()),
            _ => KestrelError::internal(error.to_string()),
        }
    }
}

impl From<anyhow::Error> for KestrelError {
    fn from(error: anyhow::Error) -> Self {
        KestrelError::internal(error.to_string())
    }
}

/// Result type alias for convenience
pub type KestrelResult<T> = Result<T, KestrelError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> KestrelResult<T>
    where
        F: FnOnce() -> String;

    fn with_channel_context(self) -> KestrelResult<T>;
    fn with_export_context(self) -> KestrelResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn with_context<F>(self, f: F) -> KestrelResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| KestrelError::internal(format!("{}: {}", f(), e)))
    }

    fn with_channel_context(self) -> KestrelResult<T> {
        self.map_err(|e| KestrelError::channel(e.to_string()))
    }

    fn with_export_context(self) -> KestrelResult<T> {
        self.map_err(|e| KestrelError::export(e.to_string()))
    }
}

/// Macro for creating errors through the constructor helpers
#[macro_export]
macro_rules! kestrel_error {
    ($variant:ident $(, $arg:expr)* $(,)?) => {
        $crate::error::KestrelError::$variant($($arg),*)
    };
}

/// Macro for early return with error logging
#[macro_export]
macro_rules! kestrel_bail {
    ($error:expr) => {{
        let error = $error;
        match error.severity() {
            tracing::Level::ERROR => tracing::error!(error = %error, "Operation failed"),
            tracing::Level::WARN => tracing::warn!(error = %error, "Operation failed"),
            tracing::Level::INFO => tracing::info!(error = %error, "Operation failed"),
            tracing::Level::DEBUG => tracing::debug!(error = %error, "Operation failed"),
            _ => tracing::trace!(error = %error, "Operation failed"),
        }
        return Err(error.into());
    }};
}

/// Macro for error logging with context fields
#[macro_export]
macro_rules! log_error {
    ($error:expr, $($field:tt)*) => {{
        let error = &$error;
        match error.severity() {
            tracing::Level::ERROR => tracing::error!(
                error = %error,
                category = error.category(),
                retryable = error.is_retryable(),
                $($field)*
            ),
            tracing::Level::WARN => tracing::warn!(
                error = %error,
                category = error.category(),
                retryable = error.is_retryable(),
                $($field)*
            ),
            _ => tracing::debug!(
                error = %error,
                category = error.category(),
                retryable = error.is_retryable(),
                $($field)*
            ),
        }
    }};
}
