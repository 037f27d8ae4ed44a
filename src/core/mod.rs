//! Core job abstractions: registry, strategies, scheduler and running jobs.

pub mod adapter;
pub mod description;
pub mod error;
pub mod event;
pub mod handler;
pub mod job;
pub mod logger;
pub mod registry;
pub(crate) mod replay;
pub mod scheduler;
pub mod strategy;

pub use adapter::{
    clamp_progress, create_async_handler, create_job_handler, create_stream_handler,
    create_value_handler, from_async_job, AdaptedHandler, ChannelSink, ContextLogger,
    HandlerOutput, InputChannel, JobContext,
};
pub use description::{JobDescription, JobName};
pub use error::{AppResult, JobError};
pub use event::{JobEvent, JobEventKind, JobInput, JobState, LogEntry, LogLevel};
pub use handler::{AsyncJob, HandlerStream, JobHandler, JobHandlerContext, SharedHandler};
pub use job::{Job, JobId, JobInputChannel};
pub use logger::{InMemoryJobLogger, JobLogger, NullJobLogger, TracingJobLogger};
pub use registry::{JobRegistry, RegisterOptions};
pub use scheduler::{PauseHandle, ScheduleOptions, Scheduler, SchedulerSettings};
pub use strategy::{
    JobStrategy, JobStrategyKind, MemoizeStrategy, OnceStrategy, ParallelizeStrategy,
    ReuseStrategy, SerializeStrategy,
};
