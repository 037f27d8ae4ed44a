//! # Prometheus Jobs
//!
//! An in-process job scheduling core for agent workloads running on Tokio.
//!
//! Units of asynchronous work ("jobs") are registered by name together with
//! their input/output schemas and a concurrency strategy. Scheduling a job
//! returns a [`Job`](core::Job) handle whose execution is shared: every
//! subscriber observes the same ordered event stream, from `Create` to `End`,
//! and the handler runs at most once per scheduled job.
//!
//! ## Key Features
//!
//! - **Typed Registry**: jobs extend other jobs or belong to job types; inputs
//!   and outputs are validated along the whole chain, root first
//! - **Concurrency Strategies**: parallelize, serialize, reuse, once, memoize;
//!   strategy instances can be shared to form cross-job groups
//! - **Replayed Event Streams**: late subscribers see the complete history
//! - **Dependencies and Pausing**: jobs wait for other jobs or for a paused
//!   scheduler to resume
//! - **Handler Adapters**: plain functions, futures and streams become
//!   event-emitting handlers with progress, logging, channels and `Ping`/`Stop`
//!
//! ## Scheduling a job
//!
//! ```rust,ignore
//! use prometheus_jobs::core::{
//!     create_value_handler, JobRegistry, RegisterOptions, ScheduleOptions, Scheduler,
//! };
//! use serde_json::{json, Value};
//!
//! let registry = JobRegistry::new();
//! registry.register(
//!     "add",
//!     create_value_handler(|input: Value, _ctx| {
//!         Ok(json!(input.as_array().into_iter().flatten().filter_map(Value::as_f64).sum::<f64>()))
//!     }),
//!     RegisterOptions::new().with_input(json!({"type": "array", "items": {"type": "number"}})),
//! )?;
//!
//! let scheduler = Scheduler::new(registry);
//! let job = scheduler.schedule("add", json!([1, 2, 3, 4]), ScheduleOptions::default())?;
//! assert_eq!(job.result().await?, json!(10.0));
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - Scheduling scenarios end to end
//! - `tests/strategy_test.rs` - Concurrency strategies

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core job abstractions: registry, strategies, scheduler and running jobs.
pub mod core;
/// Configuration models for the scheduler.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Schema compilation and validation.
pub mod schema;
/// Shared utilities.
pub mod util;
