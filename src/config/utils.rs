// Configuration Utilities
// "Preen before the hunt"

use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

use super::Config;
use crate::error::KestrelResult;
use crate::logging::log_config_validation;

const REDACTED: &str = "********";

/// Configuration utilities for debugging and validation
pub struct ConfigUtils;

impl ConfigUtils {
    /// Print current configuration in a readable format
    pub fn print_config(config: &Config) {
        info!("Current configuration:");
        info!("  Server: {}", config.server.url);
        match config.server.websocket_url() {
            Ok(url) => info!("  Results websocket: {}", url),
            Err(e) => info!("  Results websocket: <invalid: {}>", e),
        }
        info!(
            "  Token: {}",
            config.server.token.as_ref().map_or("<none>", |_| REDACTED)
        );
        info!(
            "  Request timeout: {}s",
            config.server.request_timeout_seconds
        );
        info!(
            "  Export: {}/{} (<timestamp>).csv",
            config.campaign.export_directory, config.campaign.export_filename_base
        );
        info!("  Log Level: {}", config.logging.level);
    }

    /// Get configuration summary for health checks
    pub fn get_config_summary(config: &Config) -> HashMap<String, String> {
        let mut summary = HashMap::new();

        summary.insert("server_url".to_string(), config.server.url.clone());
        summary.insert(
            "websocket_url".to_string(),
            config
                .server
                .websocket_url()
                .map(|url| url.to_string())
                .unwrap_or_else(|e| format!("<invalid: {e}>")),
        );
        summary.insert(
            "token_configured".to_string(),
            config.server.token.is_some().to_string(),
        );
        summary.insert(
            "request_timeout_seconds".to_string(),
            config.server.request_timeout_seconds.to_string(),
        );
        summary.insert(
            "export_directory".to_string(),
            config.campaign.export_directory.clone(),
        );
        summary.insert("log_level".to_string(), config.logging.level.clone());

        summary
    }

    /// Export configuration as JSON with the token masked
    pub fn export_as_json(config: &Config) -> Result<String> {
        let mut redacted = config.clone();
        if redacted.server.token.is_some() {
            redacted.server.token = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&redacted)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config to JSON: {}", e))
    }

    /// Check for common configuration issues
    pub fn check_configuration_health(config: &Config) -> Vec<String> {
        let mut warnings = Vec::new();

        if config.server.url.starts_with("http://") {
            warnings.push(
                "Server URL uses plain http - query text and results travel unencrypted"
                    .to_string(),
            );
        }

        if config.server.token.is_none() {
            warnings.push(
                "No API token configured - campaign creation will be rejected by an authenticated server"
                    .to_string(),
            );
        }

        if config.server.accept_invalid_certs {
            warnings.push("TLS certificate verification is disabled".to_string());
        }

        if config.server.request_timeout_seconds > 300 {
            warnings.push("Request timeout > 300s may hide an unreachable server".to_string());
        }

        warnings
    }

    /// Validate `config` and log the outcome along with its health warnings.
    /// Returns the warnings when the configuration is valid.
    pub fn validate_and_report(config: &Config, component: &str) -> KestrelResult<Vec<String>> {
        let warnings = Self::check_configuration_health(config);
        let validation = config.validate();
        log_config_validation(component, validation.is_ok(), &warnings);
        validation.map(|()| warnings)
    }
}
