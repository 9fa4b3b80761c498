//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment,
//! command-line overrides. Validation runs once on the merged result.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{ServiceConfig, Variant};
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
pub const ENV_PORT: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {var}='{value}': {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

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

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub variant: Option<Variant>,
    pub bind_address: Option<String>,
}

/// Load, merge and validate configuration using the process environment.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<ServiceConfig, ConfigError> {
    load_config_with_env(path, overrides, |var| std::env::var(var).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(
    path: Option<&Path>,
    overrides: &Overrides,
    env: F,
) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env(&mut config, env)?;
    apply_overrides(&mut config, overrides);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn apply_env<F>(config: &mut ServiceConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |var: &str| env(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(endpoint) = lookup(ENV_ENDPOINT) {
        config.telemetry.endpoint = endpoint;
    }
    if let Some(name) = lookup(ENV_SERVICE_NAME) {
        config.service.name = name;
    }
    if let Some(value) = lookup(ENV_EXPORT_INTERVAL) {
        config.telemetry.export_interval_ms = value.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            var: ENV_EXPORT_INTERVAL,
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    if let Some(value) = lookup(ENV_PORT) {
        let port: u16 = value.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            var: ENV_PORT,
            value: value.clone(),
            reason: e.to_string(),
        })?;
        config.listener.bind_address = Some(format!("0.0.0.0:{}", port));
    }
    Ok(())
}

fn apply_overrides(config: &mut ServiceConfig, overrides: &Overrides) {
    if let Some(variant) = overrides.variant {
        config.service.variant = variant;
    }
    if let Some(bind) = &overrides.bind_address {
        config.listener.bind_address = Some(bind.clone());
    }
}
