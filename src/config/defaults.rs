// src/config/defaults.rs
use std::time::Duration;

use crate::config::app::{LogFormat, LoggingSettings, Policy, RetrySettings};
use crate::consts::DEFAULT_CONCURRENCY;
use crate::request::FailurePolicy;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub fn default_policy() -> Policy {
    Policy {
        default_concurrency: DEFAULT_CONCURRENCY,
        failure_policy: FailurePolicy::BestEffort,
        verify_integrity: true,
        skip_report: None,
    }
}

pub fn default_retry() -> RetrySettings {
    RetrySettings {
        attempts: DEFAULT_RETRY_ATTEMPTS,
        base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
        max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
        timeout_secs: DEFAULT_NETWORK_TIMEOUT.as_secs(),
    }
}

pub fn default_logging() -> LoggingSettings {
    LoggingSettings {
        level: DEFAULT_LOG_LEVEL.into(),
        format: LogFormat::Pretty,
    }
}
