//! Scheduler configuration structures.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::JobStrategyKind;

/// Prefix of the environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "PROMETHEUS_JOBS_";

const DEFAULT_LOG_CAPACITY: usize = 1024;

/// Destination of job log entries for jobs scheduled without their own logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerBackendConfig {
    /// Forward entries to `tracing`.
    #[default]
    Tracing,
    /// Keep the most recent entries in memory.
    InMemory,
    /// Drop entries.
    None,
}

impl FromStr for LoggerBackendConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tracing" => Ok(Self::Tracing),
            "in_memory" | "memory" => Ok(Self::InMemory),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown logger backend `{other}`")),
        }
    }
}

const fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Strategy for jobs registered without one.
    #[serde(default)]
    pub default_strategy: JobStrategyKind,
    /// Logger backend selection.
    #[serde(default)]
    pub logger: LoggerBackendConfig,
    /// Number of entries kept by the in-memory logger.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Emit a `trace!` record for every job event.
    #[serde(default)]
    pub trace_events: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_strategy: JobStrategyKind::default(),
            logger: LoggerBackendConfig::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            trace_events: false,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.logger == LoggerBackendConfig::InMemory && self.log_capacity == 0 {
            return Err("log_capacity must be greater than 0 for the in_memory logger".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from `PROMETHEUS_JOBS_*` environment variables,
    /// loading a `.env` file first if one exists. Unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `lookup`, which maps full variable names
    /// (`PROMETHEUS_JOBS_DEFAULT_STRATEGY`, `..._LOGGER`, `..._LOG_CAPACITY`,
    /// `..._TRACE_EVENTS`) to values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();
        if let Some(value) = var("DEFAULT_STRATEGY") {
            cfg.default_strategy = value
                .parse::<JobStrategyKind>()
                .map_err(|e| format!("DEFAULT_STRATEGY: {e}"))?;
        }
        if let Some(value) = var("LOGGER") {
            cfg.logger = value.parse::<LoggerBackendConfig>().map_err(|e| format!("LOGGER: {e}"))?;
        }
        if let Some(value) = var("LOG_CAPACITY") {
            cfg.log_capacity = value
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("LOG_CAPACITY: {e}"))?;
        }
        if let Some(value) = var("TRACE_EVENTS") {
            cfg.trace_events = parse_flag(&value).ok_or_else(|| {
                format!("TRACE_EVENTS: expected a boolean, found `{value}`")
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
