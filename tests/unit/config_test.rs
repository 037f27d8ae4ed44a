//! Tests for configuration validation

use std::collections::HashMap;

use prometheus_jobs::config::{LoggerBackendConfig, SchedulerConfig};
use prometheus_jobs::core::JobStrategyKind;

#[test]
fn test_default_config_is_valid() {
    let config = SchedulerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.default_strategy, JobStrategyKind::Parallelize);
    assert_eq!(config.logger, LoggerBackendConfig::Tracing);
    assert!(!config.trace_events);
}

#[test]
fn test_in_memory_logger_needs_capacity() {
    let config = SchedulerConfig {
        logger: LoggerBackendConfig::InMemory,
        log_capacity: 0,
        ..SchedulerConfig::default()
    };
    assert!(config.validate().is_err());

    let config = SchedulerConfig {
        logger: LoggerBackendConfig::None,
        log_capacity: 0,
        ..SchedulerConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "default_strategy": "memoize",
        "logger": "in_memory",
        "log_capacity": 64,
        "trace_events": true
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.default_strategy, JobStrategyKind::Memoize);
    assert_eq!(config.logger, LoggerBackendConfig::InMemory);
    assert_eq!(config.log_capacity, 64);
    assert!(config.trace_events);
}

#[test]
fn test_scheduler_config_from_json_uses_defaults() {
    let config = SchedulerConfig::from_json_str("{}").unwrap();
    assert_eq!(config, SchedulerConfig::default());
}

#[test]
fn test_scheduler_config_from_json_rejects_unknown_strategy() {
    assert!(SchedulerConfig::from_json_str(r#"{"default_strategy": "eventually"}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_scheduler_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("PROMETHEUS_JOBS_DEFAULT_STRATEGY", "serial"),
        ("PROMETHEUS_JOBS_LOGGER", "none"),
        ("PROMETHEUS_JOBS_LOG_CAPACITY", "12"),
        ("PROMETHEUS_JOBS_TRACE_EVENTS", "yes"),
    ]
    .into_iter()
    .collect();

    let config =
        SchedulerConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
    assert_eq!(config.default_strategy, JobStrategyKind::Serialize);
    assert_eq!(config.logger, LoggerBackendConfig::None);
    assert_eq!(config.log_capacity, 12);
    assert!(config.trace_events);
}

#[test]
fn test_scheduler_config_from_lookup_rejects_bad_values() {
    let bad_flag = SchedulerConfig::from_lookup(|key| {
        (key == "PROMETHEUS_JOBS_TRACE_EVENTS").then(|| "maybe".to_string())
    });
    assert!(bad_flag.is_err());

    let bad_capacity = SchedulerConfig::from_lookup(|key| {
        (key == "PROMETHEUS_JOBS_LOG_CAPACITY").then(|| "-1".to_string())
    });
    assert!(bad_capacity.is_err());

    let empty = SchedulerConfig::from_lookup(|_| None).unwrap();
    assert_eq!(empty, SchedulerConfig::default());
}
