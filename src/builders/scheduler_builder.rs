//! Builders to construct registries and schedulers from configuration.

use std::sync::Arc;

use crate::config::{LoggerBackendConfig, SchedulerConfig};
use crate::core::{
    InMemoryJobLogger, JobError, JobLogger, JobRegistry, NullJobLogger, Scheduler,
    SchedulerSettings, TracingJobLogger,
};
use crate::schema::BasicSchemaCompiler;

fn validated(cfg: &SchedulerConfig) -> Result<(), JobError> {
    cfg.validate().map_err(JobError::Config)
}

/// Empty registry using the configured default strategy.
pub fn build_registry(cfg: &SchedulerConfig) -> Result<JobRegistry, JobError> {
    validated(cfg)?;
    Ok(JobRegistry::with_compiler(
        Arc::new(BasicSchemaCompiler::new()),
        cfg.default_strategy,
    ))
}

/// Logger selected by the configuration.
pub fn build_logger(cfg: &SchedulerConfig) -> Arc<dyn JobLogger> {
    match cfg.logger {
        LoggerBackendConfig::Tracing => Arc::new(TracingJobLogger),
        LoggerBackendConfig::InMemory => InMemoryJobLogger::shared(cfg.log_capacity),
        LoggerBackendConfig::None => Arc::new(NullJobLogger),
    }
}

/// Scheduler over a fresh registry.
pub fn build_scheduler(cfg: &SchedulerConfig) -> Result<Scheduler, JobError> {
    build_scheduler_with(cfg, build_registry(cfg)?)
}

/// Scheduler over an existing registry. The registry keeps its own default
/// strategy; `cfg.default_strategy` only applies to registries built by
/// [`build_registry`].
pub fn build_scheduler_with(
    cfg: &SchedulerConfig,
    registry: JobRegistry,
) -> Result<Scheduler, JobError> {
    validated(cfg)?;
    let settings = SchedulerSettings {
        default_logger: Some(build_logger(cfg)),
        trace_events: cfg.trace_events,
    };
    tracing::debug!(
        logger = ?cfg.logger,
        trace_events = cfg.trace_events,
        default_strategy = %registry.default_strategy(),
        "scheduler built"
    );
    Ok(Scheduler::with_settings(registry, settings))
}
