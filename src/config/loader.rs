//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::LogicalService;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply env overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Defaults plus env overrides, validated. Used when no file is given.
pub fn load_default_config() -> Result<GatewayConfig, ConfigError> {
    finish(GatewayConfig::default(), |key| std::env::var(key).ok())
}

/// Parse TOML, apply overrides from `lookup`, validate.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config: GatewayConfig = toml::from_str(content)?;
    finish(config, lookup)
}

fn finish<F>(mut config: GatewayConfig, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Replace service base URLs from `GATEWAY_<SERVICE>_URL` variables.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for service in LogicalService::ALL {
        let key = service.env_key();
        if let Some(url) = lookup(&key).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(service = service.name(), %url, "Service URL overridden from environment");
            *service.base_url_in_mut(&mut config.services) = url.trim().to_string();
        }
    }
}
