//! Configuration models for the scheduler and its logging backend.

pub mod scheduler;

pub use scheduler::{LoggerBackendConfig, SchedulerConfig};
