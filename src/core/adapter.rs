//! Adapters that turn plain functions into event-emitting job handlers.
//!
//! Business logic returns a [`HandlerOutput`]; the adapter takes care of the
//! surrounding protocol:
//!
//! ```text
//! Start -> Progress(0) -> [logs, progress, channel events] -> Output* -> Progress(1) -> End
//! ```
//!
//! It also answers `Ping` with `Pong`, honours `Stop`, and demultiplexes
//! channel inputs into the stream returned by [`JobContext::take_input_channel`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::handler::{AsyncJob, HandlerStream, JobHandler, JobHandlerContext};
use super::{
    Job, JobDescription, JobError, JobEvent, JobEventKind, JobInput, LogEntry, LogLevel,
    Scheduler,
};

/// What a job function produced.
pub enum HandlerOutput {
    /// A value available right away.
    Immediate(Value),
    /// A value produced later.
    Deferred(BoxFuture<'static, Result<Value, JobError>>),
    /// Zero or more values; each becomes an `Output` event.
    Streamed(BoxStream<'static, Result<Value, JobError>>),
}

impl HandlerOutput {
    /// Wrap a future.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, JobError>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }

    /// Wrap a stream.
    pub fn streamed<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Value, JobError>> + Send + 'static,
    {
        Self::Streamed(stream.boxed())
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

enum Emit {
    Event(JobEvent),
    Fail(JobError),
    Close,
}

#[derive(Clone)]
struct Emitter {
    description: Arc<JobDescription>,
    tx: mpsc::UnboundedSender<Emit>,
}

impl Emitter {
    fn emit(&self, kind: JobEventKind) {
        let _ = self
            .tx
            .send(Emit::Event(JobEvent::new(Arc::clone(&self.description), kind)));
    }

    fn fail(&self, err: JobError) {
        let _ = self.tx.send(Emit::Fail(err));
    }

    fn close(&self) {
        let _ = self.tx.send(Emit::Close);
    }
}

/// Logger handed to job functions; every call becomes a `Log` event.
#[derive(Clone)]
pub struct ContextLogger {
    emitter: Emitter,
}

impl ContextLogger {
    /// Emit an arbitrary entry.
    pub fn log(&self, entry: LogEntry) {
        self.emitter.emit(JobEventKind::Log { entry });
    }

    fn at(&self, level: LogLevel, message: impl Into<String>) {
        let name = self.emitter.description.name.to_string();
        self.log(LogEntry::new(level, name, message));
    }

    /// Debug-level message.
    pub fn debug(&self, message: impl Into<String>) {
        self.at(LogLevel::Debug, message);
    }

    /// Info-level message.
    pub fn info(&self, message: impl Into<String>) {
        self.at(LogLevel::Info, message);
    }

    /// Warn-level message.
    pub fn warn(&self, message: impl Into<String>) {
        self.at(LogLevel::Warn, message);
    }

    /// Error-level message.
    pub fn error(&self, message: impl Into<String>) {
        self.at(LogLevel::Error, message);
    }
}

/// Write side of a declared output channel.
///
/// Once completed or errored the channel is closed and further writes are
/// ignored.
#[derive(Clone)]
pub struct ChannelSink {
    name: String,
    emitter: Emitter,
    closed: Arc<AtomicBool>,
}

impl ChannelSink {
    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the channel completed or errored.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a value.
    pub fn message(&self, message: Value) {
        if !self.is_closed() {
            self.emitter.emit(JobEventKind::ChannelMessage {
                name: self.name.clone(),
                message,
            });
        }
    }

    /// Fail the channel.
    pub fn error(&self, error: Value) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.emitter.emit(JobEventKind::ChannelError {
                name: self.name.clone(),
                error,
            });
        }
    }

    /// Complete the channel.
    pub fn complete(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.emitter.emit(JobEventKind::ChannelComplete {
                name: self.name.clone(),
            });
        }
    }
}

/// Values arriving on the job's default input channel. Channel errors are
/// delivered as `Err` items and end the stream.
pub type InputChannel = BoxStream<'static, Result<Value, Value>>;

/// Context handed to job functions wrapped by the adapters.
pub struct JobContext {
    emitter: Emitter,
    logger: ContextLogger,
    channels: HashMap<String, ChannelSink>,
    input: Option<InputChannel>,
    dependencies: Vec<Job>,
    scheduler: Scheduler,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.emitter.description.name)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl JobContext {
    /// Description of the running job.
    pub fn description(&self) -> &JobDescription {
        &self.emitter.description
    }

    /// Logger mirrored as `Log` events.
    pub const fn logger(&self) -> &ContextLogger {
        &self.logger
    }

    /// Report progress; the value is clamped into `[0, 1]`.
    pub fn progress(&self, value: f64) {
        self.emitter.emit(JobEventKind::Progress {
            value: clamp_progress(value),
        });
    }

    /// Sink for a declared channel; `None` for undeclared names.
    pub fn channel(&self, name: &str) -> Option<&ChannelSink> {
        self.channels.get(name)
    }

    /// Take the default input channel. Returns `None` after the first call.
    pub fn take_input_channel(&mut self) -> Option<InputChannel> {
        self.input.take()
    }

    /// Jobs this run waited for.
    pub fn dependencies(&self) -> &[Job] {
        &self.dependencies
    }

    /// Scheduler running the job.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

/// Clamp a progress report into `[0, 1]`; NaN counts as 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Handler produced by [`create_job_handler`].
pub struct AdaptedHandler<F> {
    function: Arc<F>,
}

impl<F> fmt::Debug for AdaptedHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdaptedHandler")
    }
}

/// Wrap a job function into the canonical handler shape.
///
/// The function runs when the handler is invoked; it may return immediately
/// with a value or hand back a future or a stream.
pub fn create_job_handler<F>(function: F) -> AdaptedHandler<F>
where
    F: Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static,
{
    AdaptedHandler {
        function: Arc::new(function),
    }
}

/// Wrap a synchronous function returning a single value.
pub fn create_value_handler<F>(
    function: F,
) -> AdaptedHandler<impl Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static>
where
    F: Fn(Value, JobContext) -> Result<Value, JobError> + Send + Sync + 'static,
{
    create_job_handler(move |input, context| function(input, context).map(HandlerOutput::Immediate))
}

/// Wrap an async function returning a single value.
pub fn create_async_handler<F, Fut>(
    function: F,
) -> AdaptedHandler<impl Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static>
where
    F: Fn(Value, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    create_job_handler(move |input, context| Ok(HandlerOutput::deferred(function(input, context))))
}

/// Wrap a function returning a stream of values.
pub fn create_stream_handler<F, S>(
    function: F,
) -> AdaptedHandler<impl Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static>
where
    F: Fn(Value, JobContext) -> S + Send + Sync + 'static,
    S: Stream<Item = Result<Value, JobError>> + Send + 'static,
{
    create_job_handler(move |input, context| Ok(HandlerOutput::streamed(function(input, context))))
}

/// Wrap an [`AsyncJob`] implementor.
pub fn from_async_job<J: AsyncJob>(
    job: J,
) -> AdaptedHandler<impl Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static>
{
    let job = Arc::new(job);
    create_job_handler(move |input, context| {
        let job = Arc::clone(&job);
        Ok(HandlerOutput::deferred(async move { job.run(input, context).await }))
    })
}

impl<F> JobHandler for AdaptedHandler<F>
where
    F: Fn(Value, JobContext) -> Result<HandlerOutput, JobError> + Send + Sync + 'static,
{
    fn call(&self, input: Value, context: JobHandlerContext) -> HandlerStream {
        let JobHandlerContext {
            description,
            dependencies,
            inbound,
            scheduler,
        } = context;
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter { description, tx };
        let (input_tx, input_rx) = mpsc::unbounded_channel::<Result<Value, Value>>();

        let channels = emitter
            .description
            .channels
            .keys()
            .map(|name| {
                let sink = ChannelSink {
                    name: name.clone(),
                    emitter: emitter.clone(),
                    closed: Arc::new(AtomicBool::new(false)),
                };
                (name.clone(), sink)
            })
            .collect();
        let context = JobContext {
            emitter: emitter.clone(),
            logger: ContextLogger {
                emitter: emitter.clone(),
            },
            channels,
            input: Some(input_channel_stream(input_rx)),
            dependencies,
            scheduler,
        };

        let function = Arc::clone(&self.function);
        let task = tokio::spawn(async move {
            emitter.emit(JobEventKind::Start);
            emitter.emit(JobEventKind::Progress { value: 0.0 });
            let outcome = function(input, context);
            drive(outcome, &emitter, inbound, input_tx).await;
            emitter.close();
        });

        AdaptedStream {
            events: UnboundedReceiverStream::new(rx),
            abort: task.abort_handle(),
            done: false,
        }
        .boxed()
    }
}

fn input_channel_stream(rx: mpsc::UnboundedReceiver<Result<Value, Value>>) -> InputChannel {
    futures::stream::unfold((rx, false), |(mut rx, failed)| async move {
        if failed {
            return None;
        }
        let item = rx.recv().await?;
        let failed = item.is_err();
        Some((item, (rx, failed)))
    })
    .boxed()
}

async fn drive(
    outcome: Result<HandlerOutput, JobError>,
    emitter: &Emitter,
    mut inbound: BoxStream<'static, JobInput>,
    input_tx: mpsc::UnboundedSender<Result<Value, Value>>,
) {
    let work = async move {
        match outcome? {
            HandlerOutput::Immediate(value) => emitter.emit(JobEventKind::Output { value }),
            HandlerOutput::Deferred(future) => {
                let value = future.await?;
                emitter.emit(JobEventKind::Output { value });
            }
            HandlerOutput::Streamed(mut values) => {
                while let Some(value) = values.next().await {
                    emitter.emit(JobEventKind::Output { value: value? });
                }
            }
        }
        Ok::<(), JobError>(())
    };
    tokio::pin!(work);

    let mut input_tx = Some(input_tx);
    let mut inbound_open = true;
    let finished = loop {
        tokio::select! {
            result = &mut work => break Some(result),
            input = inbound.next(), if inbound_open => match input {
                None => inbound_open = false,
                Some(JobInput::Ping) => emitter.emit(JobEventKind::Pong),
                Some(JobInput::Stop) => break None,
                Some(JobInput::ChannelMessage { message }) => {
                    if let Some(tx) = &input_tx {
                        let _ = tx.send(Ok(message));
                    }
                }
                Some(JobInput::ChannelError { error }) => {
                    if let Some(tx) = input_tx.take() {
                        let _ = tx.send(Err(error));
                    }
                }
                Some(JobInput::ChannelComplete) => input_tx = None,
            },
        }
    };

    match finished {
        Some(Ok(())) => {
            emitter.emit(JobEventKind::Progress { value: 1.0 });
            emitter.emit(JobEventKind::End);
        }
        Some(Err(err)) => emitter.fail(err),
        None => tracing::debug!(job = %emitter.description.name, "job stopped"),
    }
}

/// Event stream of an adapted handler. Dropping it aborts the computation.
struct AdaptedStream {
    events: UnboundedReceiverStream<Emit>,
    abort: AbortHandle,
    done: bool,
}

impl Stream for AdaptedStream {
    type Item = Result<JobEvent, JobError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.events.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Emit::Close)) => {
                self.done = true;
                Poll::Ready(None)
            }
            // Every sender dropped without a close: the task panicked.
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(JobError::handler(anyhow!(
                    "job handler terminated unexpectedly"
                )))))
            }
            Poll::Ready(Some(Emit::Fail(err))) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(Some(Emit::Event(event))) => {
                if matches!(event.kind, JobEventKind::End) {
                    self.done = true;
                }
                Poll::Ready(Some(Ok(event)))
            }
        }
    }
}

impl Drop for AdaptedStream {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-1.0), 0.0);
        assert_eq!(clamp_progress(0.25), 0.25);
        assert_eq!(clamp_progress(7.0), 1.0);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
    }
}
