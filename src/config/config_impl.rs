// Configuration Management
// "Know the wind before you leave the perch"

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::channel::results_url;
use crate::error::{KestrelError, KestrelResult};
use crate::logging::{LogFormat, LoggingConfig};

/// Prefix for environment overrides, e.g. `KESTREL_SERVER__URL`
pub const ENV_PREFIX: &str = "KESTREL";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the query-run client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub campaign: CampaignConfig,
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// REST base URL of the fleet server
    pub url: String,
    /// Results websocket URL; derived from `url` when unset
    pub websocket_url: Option<String>,
    /// Bearer token sent on REST calls and websocket auth
    pub token: Option<String>,
    pub request_timeout_seconds: u64,
    pub accept_invalid_certs: bool,
}

/// Campaign and export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub export_filename_base: String,
    pub export_directory: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            url: "https://localhost:8080".to_string(),
            websocket_url: None,
            token: None,
            request_timeout_seconds: 30,
            accept_invalid_certs: false,
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        CampaignConfig {
            export_filename_base: "Query Results".to_string(),
            export_directory: ".".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> KestrelResult<Url> {
        let url = Url::parse(&self.url)
            .map_err(|_| KestrelError::invalid_config_value("server.url", self.url.clone()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(KestrelError::invalid_config_value(
                "server.url",
                self.url.clone(),
            )),
        }
    }

    /// Explicit websocket URL, or the results endpoint derived from `url`.
    pub fn websocket_url(&self) -> KestrelResult<Url> {
        match self.websocket_url {
            Some(ref explicit) => {
                let url = Url::parse(explicit).map_err(|_| {
                    KestrelError::invalid_config_value("server.websocket_url", explicit.clone())
                })?;
                match url.scheme() {
                    "ws" | "wss" => Ok(url),
                    _ => Err(KestrelError::invalid_config_value(
                        "server.websocket_url",
                        explicit.clone(),
                    )),
                }
            }
            None => results_url(&self.base_url()?),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from environment variables and config files
    pub fn load() -> KestrelResult<Self> {
        Self::load_with_file(None)
    }

    /// Load configuration with an optional explicit config file
    pub fn load_with_file(config_file: Option<&str>) -> KestrelResult<Self> {
        Self::load_from_sources(
            config_file,
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
    }

    /// Layer defaults, then the config file, then `environment`, and validate.
    pub fn load_from_sources(
        config_file: Option<&str>,
        environment: Environment,
    ) -> KestrelResult<Self> {
        debug!("Loading configuration");

        let default_config = ConfigBuilder::try_from(&Config::default()).map_err(|e| {
            KestrelError::configuration(format!("Failed to load default configuration: {e}"))
        })?;

        let mut builder = ConfigBuilder::builder().add_source(default_config);

        if let Some(config_path) = config_file {
            info!("Using config file: {}", config_path);
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
            let config_file = format!("config/{env}");
            debug!("Looking for optional configuration at {}.toml", config_file);
            builder = builder.add_source(File::with_name(&config_file).required(false));
        }

        builder = builder.add_source(environment);

        let config = builder
            .build()
            .map_err(|e| {
                KestrelError::configuration(format!("Failed to build configuration: {e}"))
            })?
            .try_deserialize::<Config>()
            .map_err(|e| {
                KestrelError::configuration(format!("Failed to deserialize configuration: {e}"))
            })?;

        config.validate()?;

        debug!("Configuration loaded");
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> KestrelResult<()> {
        self.server.base_url()?;
        self.server.websocket_url()?;

        if self.server.request_timeout_seconds == 0 {
            return Err(KestrelError::invalid_config_value(
                "server.request_timeout_seconds",
                self.server.request_timeout_seconds.to_string(),
            ));
        }
        if self.server.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(KestrelError::invalid_config_value(
                "server.token",
                "<empty>".to_string(),
            ));
        }

        if self.campaign.export_filename_base.trim().is_empty() {
            return Err(KestrelError::invalid_config_value(
                "campaign.export_filename_base",
                "<empty>".to_string(),
            ));
        }
        if self.campaign.export_directory.is_empty() {
            return Err(KestrelError::invalid_config_value(
                "campaign.export_directory",
                "<empty>".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(KestrelError::invalid_config_value(
                "logging.level",
                self.logging.level.clone(),
            ));
        }
        if self.logging.format.parse::<LogFormat>().is_err() {
            return Err(KestrelError::invalid_config_value(
                "logging.format",
                self.logging.format.clone(),
            ));
        }

        Ok(())
    }

    /// Get configuration as environment variables map for debugging
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();

        vars.insert("KESTREL_SERVER__URL".to_string(), self.server.url.clone());
        if let Some(ref websocket_url) = self.server.websocket_url {
            vars.insert(
                "KESTREL_SERVER__WEBSOCKET_URL".to_string(),
                websocket_url.clone(),
            );
        }
        vars.insert(
            "KESTREL_SERVER__REQUEST_TIMEOUT_SECONDS".to_string(),
            self.server.request_timeout_seconds.to_string(),
        );
        vars.insert(
            "KESTREL_CAMPAIGN__EXPORT_FILENAME_BASE".to_string(),
            self.campaign.export_filename_base.clone(),
        );
        vars.insert(
            "KESTREL_CAMPAIGN__EXPORT_DIRECTORY".to_string(),
            self.campaign.export_directory.clone(),
        );
        vars.insert(
            "KESTREL_LOGGING__LEVEL".to_string(),
            self.logging.level.clone(),
        );

        vars
    }
}
