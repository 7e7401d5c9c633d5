// src/config/app.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::defaults::*;
use crate::consts::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH, LOG_ENV_VAR};
use crate::error::{CoreError, Result};
use crate::request::FailurePolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub policy: Policy,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Used when a request asks for concurrency 0
    pub default_concurrency: usize,
    /// Used when a request does not choose a policy itself
    pub failure_policy: FailurePolicy,
    pub verify_integrity: bool,
    /// Empty objects are listed here, one name per line
    pub skip_report: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total tries per network operation, first one included
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Per-operation network timeout
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            policy: default_policy(),
            retry: default_retry(),
            logging: default_logging(),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        default_policy()
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        default_retry()
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        default_logging()
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| CoreError::Configuration(format!("invalid settings TOML: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(CoreError::Configuration(
                "retry.attempts must be at least 1".into(),
            ));
        }
        if self.policy.default_concurrency == 0 {
            return Err(CoreError::Configuration(
                "policy.default_concurrency must be at least 1".into(),
            ));
        }
        if self.retry.timeout_secs == 0 {
            return Err(CoreError::Configuration(
                "retry.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `BATCH_DECRYPT_CONFIG` (or the default path); defaults if the file is missing
pub fn load() -> Result<Settings> {
    let config_path =
        std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut settings = load_from(&config_path)?;

    if let Ok(level) = std::env::var(LOG_ENV_VAR) {
        settings.logging.level = level;
    }

    Ok(settings)
}

pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    Settings::from_toml_str(&content)
}
