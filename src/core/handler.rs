//! Handler abstraction invoked by the scheduler.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use super::adapter::JobContext;
use super::{Job, JobDescription, JobError, JobEvent, JobInput, Scheduler};

/// Event stream produced by a handler invocation.
pub type HandlerStream = BoxStream<'static, Result<JobEvent, JobError>>;

/// Everything a handler receives besides its validated input.
pub struct JobHandlerContext {
    /// Description of the job being run.
    pub description: Arc<JobDescription>,
    /// Jobs this run waited for.
    pub dependencies: Vec<Job>,
    /// Raw inputs sent to the job by callers.
    pub inbound: BoxStream<'static, JobInput>,
    /// Scheduler running the job, for scheduling sub-jobs.
    pub scheduler: Scheduler,
}

impl fmt::Debug for JobHandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandlerContext")
            .field("job", &self.description.name)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

/// The canonical handler shape: validated input in, event stream out.
///
/// Most jobs are written with the adapters in [`adapter`](super::adapter)
/// instead of implementing this trait directly.
pub trait JobHandler: Send + Sync + 'static {
    /// Start one run of the job.
    fn call(&self, input: Value, context: JobHandlerContext) -> HandlerStream;
}

impl<F> JobHandler for F
where
    F: Fn(Value, JobHandlerContext) -> HandlerStream + Send + Sync + 'static,
{
    fn call(&self, input: Value, context: JobHandlerContext) -> HandlerStream {
        self(input, context)
    }
}

/// Shared handler reference as stored by the registry.
pub type SharedHandler = Arc<dyn JobHandler>;

/// Job business logic written as an async method.
///
/// Wrap an implementor with [`from_async_job`](super::adapter::from_async_job)
/// to register it.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_jobs::core::{AsyncJob, JobContext, JobError};
/// use serde_json::{json, Value};
///
/// struct Sum;
///
/// #[async_trait]
/// impl AsyncJob for Sum {
///     async fn run(&self, input: Value, _ctx: JobContext) -> Result<Value, JobError> {
///         let total: f64 = input
///             .as_array()
///             .into_iter()
///             .flatten()
///             .filter_map(Value::as_f64)
///             .sum();
///         Ok(json!(total))
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncJob: Send + Sync + 'static {
    /// Run the job and return its single output value.
    async fn run(&self, input: Value, context: JobContext) -> Result<Value, JobError>;
}
