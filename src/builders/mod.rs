//! Builders to construct schedulers from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{build_logger, build_registry, build_scheduler, build_scheduler_with};
