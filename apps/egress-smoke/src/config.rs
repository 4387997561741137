//! Environment-backed runtime configuration for `egress-smoke`.

use std::{env, path::PathBuf, time::Duration};

use egress_core::{DEFAULT_RETRY_DELAY_MS, ReconnectPolicy};
use egress_runtime::{BACKEND_HOST, BACKEND_PORT, ControllerConfig};
use thiserror::Error;

const DEFAULT_RUN_SECS: u64 = 30;

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Client key presented to the backend.
    pub client_key: String,
    /// Fixed device identifier; wins over `device_id_file`.
    pub device_id: Option<String>,
    /// JSON file holding a persisted random device identifier.
    pub device_id_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// How long to keep the session up before stopping.
    pub run_for: Duration,
    pub retry_delay_ms: u64,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client_key = optional_trimmed_env("EGRESS_CLIENT_KEY", &mut lookup)
            .ok_or(ConfigError::Missing("EGRESS_CLIENT_KEY"))?;
        let device_id = optional_trimmed_env("EGRESS_DEVICE_ID", &mut lookup);
        let device_id_file =
            optional_trimmed_env("EGRESS_DEVICE_ID_FILE", &mut lookup).map(PathBuf::from);
        let host = optional_trimmed_env("EGRESS_SMOKE_HOST", &mut lookup)
            .unwrap_or_else(|| BACKEND_HOST.to_owned());
        let port = parse_with_default("EGRESS_SMOKE_PORT", BACKEND_PORT, &mut lookup)?;
        let run_secs = parse_with_default("EGRESS_SMOKE_RUN_SECS", DEFAULT_RUN_SECS, &mut lookup)?;
        let retry_delay_ms =
            parse_with_default("EGRESS_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS, &mut lookup)?;

        if port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EGRESS_SMOKE_PORT",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if retry_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EGRESS_RETRY_DELAY_MS",
                value: "0".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(Self {
            client_key,
            device_id,
            device_id_file,
            host,
            port,
            run_for: Duration::from_secs(run_secs),
            retry_delay_ms,
        })
    }

    /// Controller settings derived from this configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            host: self.host.clone(),
            port: self.port,
            retry_policy: ReconnectPolicy::new(self.retry_delay_ms),
            ..ControllerConfig::default()
        }
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required {0}")]
    Missing(&'static str),
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_with_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        key,
        reason: err.to_string(),
        value,
    })
}
