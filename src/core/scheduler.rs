//! Scheduler turning registered jobs into running [`Job`]s.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

use super::handler::JobHandlerContext;
use super::job::{ChannelReplay, JobId, JobStatus};
use super::logger::JobLogger;
use super::registry::{JobRegistry, ResolvedJob};
use super::replay::{Replay, ReplaySink};
use super::{Job, JobError, JobEvent, JobEventKind, JobInput, JobState};
use crate::schema::validate_chain;
use crate::util::json::to_owned_value;

/// Per-call scheduling options.
#[derive(Default, Clone)]
pub struct ScheduleOptions {
    /// Jobs that must terminate before this one runs.
    pub dependencies: Vec<Job>,
    /// Sink for this job's log events; overrides the scheduler default.
    pub logger: Option<Arc<dyn JobLogger>>,
}

impl fmt::Debug for ScheduleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleOptions")
            .field("dependencies", &self.dependencies.len())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl ScheduleOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `job` before running.
    #[must_use]
    pub fn after(mut self, job: &Job) -> Self {
        self.dependencies.push(job.clone());
        self
    }

    /// Wait for every job in `jobs` before running.
    #[must_use]
    pub fn with_dependencies(mut self, jobs: impl IntoIterator<Item = Job>) -> Self {
        self.dependencies.extend(jobs);
        self
    }

    /// Route log events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn JobLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Scheduler-wide settings.
#[derive(Default, Clone)]
pub struct SchedulerSettings {
    /// Sink for log events of jobs scheduled without their own logger.
    pub default_logger: Option<Arc<dyn JobLogger>>,
    /// Emit a `trace!` record for every job event.
    pub trace_events: bool,
}

impl fmt::Debug for SchedulerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerSettings")
            .field("default_logger", &self.default_logger.is_some())
            .field("trace_events", &self.trace_events)
            .finish()
    }
}

#[derive(Default)]
struct PauseState {
    count: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

/// Holds the scheduler paused until [`PauseHandle::resume`] is called.
///
/// Dropping the handle without resuming keeps the scheduler paused.
pub struct PauseHandle {
    state: Arc<Mutex<PauseState>>,
    resumed: AtomicBool,
}

impl fmt::Debug for PauseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PauseHandle")
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

impl PauseHandle {
    /// Release this pause. Only the first call has an effect. When no pause
    /// remains, jobs scheduled in the meantime are released in the order they
    /// were scheduled.
    pub fn resume(&self) {
        if self.resumed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = {
            let mut state = self.state.lock();
            state.count = state.count.saturating_sub(1);
            if state.count == 0 {
                std::mem::take(&mut state.waiting)
            } else {
                VecDeque::new()
            }
        };
        if !released.is_empty() {
            debug!(jobs = released.len(), "scheduler resumed");
        }
        for gate in released {
            let _ = gate.send(());
        }
    }

    /// True once [`resume`](Self::resume) was called.
    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Acquire)
    }
}

struct SchedulerInner {
    registry: JobRegistry,
    pause: Arc<Mutex<PauseState>>,
    settings: SchedulerSettings,
}

/// Schedules registered jobs.
///
/// Cheap to clone; clones share the registry and the pause state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.inner.registry)
            .field("paused", &self.is_paused())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Scheduler {
    /// Scheduler over `registry` with default settings.
    pub fn new(registry: JobRegistry) -> Self {
        Self::with_settings(registry, SchedulerSettings::default())
    }

    /// Scheduler over `registry`.
    pub fn with_settings(registry: JobRegistry, settings: SchedulerSettings) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                pause: Arc::new(Mutex::new(PauseState::default())),
                settings,
            }),
        }
    }

    /// Registry the scheduler resolves names against.
    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Schedule the job registered as `name`.
    ///
    /// Fails right away only if the name is unknown or `input` cannot be
    /// converted to JSON. Every other failure, input validation included, is
    /// reported on the job's event stream.
    pub fn schedule<I>(
        &self,
        name: &str,
        input: I,
        options: ScheduleOptions,
    ) -> Result<Job, JobError>
    where
        I: Serialize,
    {
        let resolved = self.inner.registry.resolve(name)?;
        let input = to_owned_value(&input)?;
        Ok(self.spawn_job(resolved, input, options))
    }

    /// Schedule the default job of `job_type`.
    pub fn schedule_by_type<I>(
        &self,
        job_type: &str,
        input: I,
        options: ScheduleOptions,
    ) -> Result<Job, JobError>
    where
        I: Serialize,
    {
        let name = self.inner.registry.default_job_for_type(job_type)?;
        self.schedule(name.as_str(), input, options)
    }

    /// Hold back jobs scheduled from now on until every outstanding pause is
    /// resumed. Jobs already running are not affected.
    pub fn pause(&self) -> PauseHandle {
        let mut state = self.inner.pause.lock();
        state.count += 1;
        debug!(pauses = state.count, "scheduler paused");
        PauseHandle {
            state: Arc::clone(&self.inner.pause),
            resumed: AtomicBool::new(false),
        }
    }

    /// True while at least one pause is outstanding.
    pub fn is_paused(&self) -> bool {
        self.inner.pause.lock().count > 0
    }

    fn gate(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.inner.pause.lock();
        if state.count == 0 {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.waiting.push_back(tx);
        Some(rx)
    }

    fn spawn_job(&self, resolved: Arc<ResolvedJob>, input: Value, options: ScheduleOptions) -> Job {
        let id = JobId::new();
        let description = Arc::clone(&resolved.description);
        let channels: BTreeMap<String, ChannelReplay> = description
            .channels
            .keys()
            .map(|name| (name.clone(), Replay::subject()))
            .collect();
        let status = Arc::new(JobStatus::new());
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let logger = options
            .logger
            .or_else(|| self.inner.settings.default_logger.clone());

        let run = JobRun {
            start: RunStart {
                gate: self.gate(),
                dependencies: options.dependencies,
                inbound: inbound_rx,
                input: input.clone(),
                scheduler: self.clone(),
            },
            observer: RunObserver {
                id,
                resolved,
                status: Arc::clone(&status),
                channels: channels.clone(),
                logger,
                trace_events: self.inner.settings.trace_events,
            },
        };
        let events = Replay::deferred(true, move |sink| Box::pin(run.execute(sink)));
        debug!(job = %description.name, id = %id, "job scheduled");
        Job::new(id, description, input, events, status, channels, inbound_tx)
    }
}

struct RunStart {
    gate: Option<oneshot::Receiver<()>>,
    dependencies: Vec<Job>,
    inbound: mpsc::UnboundedReceiver<JobInput>,
    input: Value,
    scheduler: Scheduler,
}

struct RunObserver {
    id: JobId,
    resolved: Arc<ResolvedJob>,
    status: Arc<JobStatus>,
    channels: BTreeMap<String, ChannelReplay>,
    logger: Option<Arc<dyn JobLogger>>,
    trace_events: bool,
}

struct JobRun {
    start: RunStart,
    observer: RunObserver,
}

impl JobRun {
    async fn execute(self, sink: ReplaySink<JobEvent, JobError>) {
        let Self { start, observer } = self;
        let description = Arc::clone(&observer.resolved.description);

        if let Some(gate) = start.gate {
            // A dropped sender means the scheduler is gone; run anyway.
            let _ = gate.await;
        }
        for dependency in &start.dependencies {
            dependency.terminated().await;
        }

        observer.status.advance(JobState::Created);
        if !sink.push(JobEvent::new(Arc::clone(&description), JobEventKind::Create)) {
            return;
        }

        let input = match validate_chain(
            &observer.resolved.input_chain,
            start.input,
            JobError::JobInputSchemaValidationError,
        ) {
            Ok(input) => input,
            Err(err) => {
                warn!(job = %description.name, id = %observer.id, error = %err, "job input rejected");
                observer.finish(&sink, Err(err));
                return;
            }
        };

        let context = JobHandlerContext {
            description,
            dependencies: start.dependencies,
            inbound: UnboundedReceiverStream::new(start.inbound).boxed(),
            scheduler: start.scheduler,
        };
        let mut events = observer.resolved.handler.call(input, context);
        while let Some(next) = events.next().await {
            match next.and_then(|event| observer.observe(event)) {
                Ok(event) => {
                    if !sink.push(event) {
                        return;
                    }
                }
                Err(err) => {
                    warn!(
                        job = %observer.resolved.description.name,
                        id = %observer.id,
                        error = %err,
                        "job failed"
                    );
                    observer.finish(&sink, Err(err));
                    return;
                }
            }
        }
        debug!(job = %observer.resolved.description.name, id = %observer.id, "job finished");
        observer.finish(&sink, Ok(()));
    }
}

impl RunObserver {
    /// Apply the side effects of `event` and return it, with output values
    /// replaced by their validated form.
    fn observe(&self, event: JobEvent) -> Result<JobEvent, JobError> {
        let JobEvent { description, kind } = event;
        if self.trace_events {
            trace!(job = %description.name, id = %self.id, event = ?kind, "job event");
        }
        let kind = match kind {
            JobEventKind::Create => JobEventKind::Create,
            JobEventKind::Pong => JobEventKind::Pong,
            JobEventKind::Start => {
                self.status.advance(JobState::Started);
                JobEventKind::Start
            }
            JobEventKind::End => {
                self.status.advance(JobState::Ended);
                self.status.report_progress(1.0);
                JobEventKind::End
            }
            JobEventKind::Progress { value } => {
                self.status.report_progress(value);
                JobEventKind::Progress { value }
            }
            JobEventKind::Log { entry } => {
                if let Some(logger) = &self.logger {
                    logger.log(&entry);
                }
                JobEventKind::Log { entry }
            }
            JobEventKind::Output { value } => JobEventKind::Output {
                value: validate_chain(
                    &self.resolved.output_chain,
                    value,
                    JobError::JobOutputSchemaValidationError,
                )?,
            },
            JobEventKind::ChannelMessage { name, message } => {
                match self.channels.get(&name) {
                    Some(channel) => {
                        channel.push(message.clone());
                    }
                    None => trace!(job = %description.name, channel = %name, "message on undeclared channel dropped"),
                }
                JobEventKind::ChannelMessage { name, message }
            }
            JobEventKind::ChannelError { name, error } => {
                match self.channels.get(&name) {
                    Some(channel) => {
                        channel.fail(error.clone());
                    }
                    None => trace!(job = %description.name, channel = %name, "error on undeclared channel dropped"),
                }
                JobEventKind::ChannelError { name, error }
            }
            JobEventKind::ChannelComplete { name } => {
                match self.channels.get(&name) {
                    Some(channel) => {
                        channel.complete();
                    }
                    None => trace!(job = %description.name, channel = %name, "completion of undeclared channel dropped"),
                }
                JobEventKind::ChannelComplete { name }
            }
        };
        Ok(JobEvent::new(description, kind))
    }

    /// Close every channel still open, then terminate the job's stream.
    fn finish(&self, sink: &ReplaySink<JobEvent, JobError>, outcome: Result<(), JobError>) {
        for channel in self.channels.values() {
            channel.complete();
        }
        match outcome {
            Ok(()) => sink.complete(),
            Err(err) => sink.fail(err),
        }
    }
}

