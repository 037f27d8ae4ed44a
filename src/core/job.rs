//! Handle to one scheduled run of a job.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::adapter::clamp_progress;
use super::replay::Replay;
use super::{JobDescription, JobError, JobEvent, JobEventKind, JobInput, JobState};

/// Unique identifier of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State and progress of a job, written by its run and read through [`Job`].
#[derive(Debug)]
pub(crate) struct JobStatus {
    inner: Mutex<(JobState, f64)>,
}

impl JobStatus {
    pub(crate) const fn new() -> Self {
        Self {
            inner: Mutex::new((JobState::Queued, 0.0)),
        }
    }

    /// Move to `state` unless the job is already at or past it.
    pub(crate) fn advance(&self, state: JobState) {
        let mut inner = self.inner.lock();
        if state > inner.0 {
            inner.0 = state;
        }
    }

    /// Record a progress report. The stored value is clamped and never
    /// decreases.
    pub(crate) fn report_progress(&self, value: f64) {
        let value = clamp_progress(value);
        let mut inner = self.inner.lock();
        if value > inner.1 {
            inner.1 = value;
        }
    }

    fn state(&self) -> JobState {
        self.inner.lock().0
    }

    fn progress(&self) -> f64 {
        self.inner.lock().1
    }
}

pub(crate) type ChannelReplay = Replay<Value, Value>;

struct JobInner {
    id: JobId,
    description: Arc<JobDescription>,
    input: Value,
    events: Replay<JobEvent, JobError>,
    status: Arc<JobStatus>,
    channels: BTreeMap<String, ChannelReplay>,
    inbound: mpsc::UnboundedSender<JobInput>,
}

/// A scheduled job.
///
/// The handle is cheap to clone; clones observe the same run. Nothing happens
/// until the job is started, either explicitly with [`Job::start`] or by
/// polling any of its streams or futures. Every subscriber sees the complete
/// event sequence and the handler runs once. Dropping the last subscriber of a
/// running job cancels it.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("name", &self.inner.description.name)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        description: Arc<JobDescription>,
        input: Value,
        events: Replay<JobEvent, JobError>,
        status: Arc<JobStatus>,
        channels: BTreeMap<String, ChannelReplay>,
        inbound: mpsc::UnboundedSender<JobInput>,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id,
                description,
                input,
                events,
                status,
                channels,
                inbound,
            }),
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Description of the scheduled job.
    pub fn description(&self) -> &Arc<JobDescription> {
        &self.inner.description
    }

    /// Owned copy of the input the job was scheduled with.
    pub fn input(&self) -> &Value {
        &self.inner.input
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.inner.status.state()
    }

    /// Current progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.inner.status.progress()
    }

    /// Start the run without subscribing. Idempotent. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        self.inner.events.start();
    }

    /// All events of the run, ending with the run's error if it failed.
    pub fn events(&self) -> BoxStream<'static, Result<JobEvent, JobError>> {
        self.inner.events.subscribe()
    }

    /// Output values only.
    pub fn output(&self) -> BoxStream<'static, Result<Value, JobError>> {
        self.events()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(JobEvent {
                        kind: JobEventKind::Output { value },
                        ..
                    }) => Some(Ok(value)),
                    Ok(_) => None,
                    Err(err) => Some(Err(err)),
                })
            })
            .boxed()
    }

    /// Last output value once the run finished; `Value::Null` when the job
    /// produced no output.
    pub async fn result(&self) -> Result<Value, JobError> {
        let mut output = self.output();
        let mut last = Value::Null;
        while let Some(value) = output.next().await {
            last = value?;
        }
        Ok(last)
    }

    /// Resolve when the run terminated, with its error if it failed.
    pub async fn wait(&self) -> Result<(), JobError> {
        let mut events = self.events();
        while let Some(event) = events.next().await {
            event?;
        }
        Ok(())
    }

    /// Resolve when the run terminated, ignoring how.
    pub(crate) async fn terminated(&self) {
        self.inner.events.terminated().await;
    }

    /// Names of the job's declared channels.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.inner.channels.keys().map(String::as_str)
    }

    /// Values written by the job to channel `name`; errors carry the channel's
    /// error payload. `None` if the channel is not declared.
    ///
    /// Subscribing to a channel does not start the job.
    pub fn channel(&self, name: &str) -> Option<BoxStream<'static, Result<Value, Value>>> {
        self.inner.channels.get(name).map(Replay::subscribe)
    }

    /// Send a raw input event. Returns false once the job can no longer
    /// receive inputs.
    pub fn send(&self, input: JobInput) -> bool {
        self.inner.inbound.send(input).is_ok()
    }

    /// Sink for the job's default input channel.
    pub fn input_channel(&self) -> JobInputChannel {
        JobInputChannel {
            inbound: self.inner.inbound.clone(),
        }
    }

    /// Ask the job to stop.
    pub fn stop(&self) -> bool {
        self.send(JobInput::Stop)
    }

    /// Ask the job to answer with a `Pong` event.
    pub fn ping(&self) -> bool {
        self.send(JobInput::Ping)
    }
}

/// Write side of a job's default input channel.
#[derive(Debug, Clone)]
pub struct JobInputChannel {
    inbound: mpsc::UnboundedSender<JobInput>,
}

impl JobInputChannel {
    /// Send a value.
    pub fn send(&self, message: Value) -> bool {
        self.inbound
            .send(JobInput::ChannelMessage { message })
            .is_ok()
    }

    /// Fail the channel.
    pub fn error(&self, error: Value) -> bool {
        self.inbound.send(JobInput::ChannelError { error }).is_ok()
    }

    /// Complete the channel.
    pub fn complete(&self) -> bool {
        self.inbound.send(JobInput::ChannelComplete).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_never_rewinds() {
        let status = JobStatus::new();
        status.advance(JobState::Started);
        status.advance(JobState::Created);
        assert_eq!(status.state(), JobState::Started);

        status.report_progress(0.6);
        status.report_progress(0.2);
        status.report_progress(4.0);
        assert!((status.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
