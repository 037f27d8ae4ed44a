//! Tests for builder modules

use prometheus_jobs::builders::{build_registry, build_scheduler, build_scheduler_with};
use prometheus_jobs::config::{LoggerBackendConfig, SchedulerConfig};
use prometheus_jobs::core::{
    create_value_handler, AppResult, JobContext, JobError, JobRegistry, JobStrategyKind,
    RegisterOptions, ScheduleOptions,
};
use prometheus_jobs::util::init_tracing;
use serde_json::{json, Value};

#[test]
fn test_registry_uses_configured_strategy() {
    let config = SchedulerConfig {
        default_strategy: JobStrategyKind::Once,
        ..SchedulerConfig::default()
    };
    let registry = build_registry(&config).unwrap();
    assert_eq!(registry.default_strategy(), JobStrategyKind::Once);
    assert!(registry.job_names().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SchedulerConfig {
        logger: LoggerBackendConfig::InMemory,
        log_capacity: 0,
        ..SchedulerConfig::default()
    };
    assert!(matches!(build_scheduler(&config), Err(JobError::Config(_))));
    assert!(matches!(
        build_scheduler_with(&config, JobRegistry::new()),
        Err(JobError::Config(_))
    ));
}

#[tokio::test]
async fn test_built_scheduler_runs_jobs() -> AppResult<()> {
    init_tracing();
    let config = SchedulerConfig {
        logger: LoggerBackendConfig::None,
        trace_events: true,
        ..SchedulerConfig::default()
    };
    let registry = JobRegistry::new();
    registry
        .register(
            "double",
            create_value_handler(|input: Value, ctx: JobContext| {
                ctx.logger().debug("doubling");
                Ok(json!(input.as_f64().unwrap_or_default() * 2.0))
            }),
            RegisterOptions::new().with_input(json!({"type": "number"})),
        )?;

    let scheduler = build_scheduler_with(&config, registry)?;
    assert!(scheduler.registry().has("double"));
    let job = scheduler.schedule("double", 21, ScheduleOptions::default())?;
    assert_eq!(job.result().await?.as_f64(), Some(42.0));
    Ok(())
}
