//! Replaying broadcast of a single execution.
//!
//! A [`Replay`] records every item produced by one execution and hands the full
//! sequence, terminal notification included, to any number of subscribers, no
//! matter when they subscribe. The execution itself is a future that receives a
//! [`ReplaySink`]; it is started at most once, either explicitly through
//! [`Replay::start`] or by the first subscriber that polls.
//!
//! Replays created without a source are push-driven subjects; jobs use them for
//! their named channels.

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;

type Runner<T, E> = Box<dyn FnOnce(ReplaySink<T, E>) -> BoxFuture<'static, ()> + Send>;

struct ReplayState<T, E> {
    items: Vec<T>,
    terminal: Option<Result<(), E>>,
    subscribers: usize,
}

struct Shared<T, E> {
    state: Mutex<ReplayState<T, E>>,
    version: watch::Sender<u64>,
    runner: Mutex<Option<Runner<T, E>>>,
    driver: Mutex<Option<AbortHandle>>,
    cancel_when_idle: bool,
}

impl<T, E> Shared<T, E> {
    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn push(&self, item: T) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.items.push(item);
        }
        self.notify();
        true
    }

    fn finish(&self, outcome: Result<(), E>) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(outcome);
        }
        self.notify();
        true
    }
}

/// Write side handed to a replay's execution.
pub(crate) struct ReplaySink<T, E> {
    shared: Weak<Shared<T, E>>,
}

impl<T, E> Clone for ReplaySink<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T, E> ReplaySink<T, E> {
    /// Record an item. Returns false once the replay is terminated or gone.
    pub(crate) fn push(&self, item: T) -> bool {
        self.shared.upgrade().is_some_and(|shared| shared.push(item))
    }

    /// Terminate successfully.
    pub(crate) fn complete(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.finish(Ok(()));
        }
    }

    /// Terminate with an error.
    pub(crate) fn fail(&self, err: E) {
        if let Some(shared) = self.shared.upgrade() {
            shared.finish(Err(err));
        }
    }
}

/// Shared, replaying view of one execution.
pub(crate) struct Replay<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Replay<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Replay<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn with_runner(runner: Option<Runner<T, E>>, cancel_when_idle: bool) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ReplayState {
                    items: Vec::new(),
                    terminal: None,
                    subscribers: 0,
                }),
                version,
                runner: Mutex::new(runner),
                driver: Mutex::new(None),
                cancel_when_idle,
            }),
        }
    }

    /// Push-driven replay with no execution of its own.
    pub(crate) fn subject() -> Self {
        Self::with_runner(None, false)
    }

    /// Replay whose execution is `runner`, started lazily.
    ///
    /// With `cancel_when_idle`, the execution is aborted (and the replay
    /// completed) when its last subscriber goes away before it terminates.
    pub(crate) fn deferred<F>(cancel_when_idle: bool, runner: F) -> Self
    where
        F: FnOnce(ReplaySink<T, E>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        Self::with_runner(Some(Box::new(runner)), cancel_when_idle)
    }

    /// Replay that drains `source`, stopping at the first error.
    pub(crate) fn from_stream(
        cancel_when_idle: bool,
        source: BoxStream<'static, Result<T, E>>,
    ) -> Self {
        Self::deferred(cancel_when_idle, move |sink| {
            Box::pin(async move {
                let mut source = source;
                while let Some(next) = source.next().await {
                    match next {
                        Ok(item) => {
                            if !sink.push(item) {
                                return;
                            }
                        }
                        Err(err) => {
                            sink.fail(err);
                            return;
                        }
                    }
                }
                sink.complete();
            })
        })
    }

    /// Start the execution if it has not started yet. Must be called from
    /// within a Tokio runtime.
    pub(crate) fn start(&self) {
        let Some(runner) = self.shared.runner.lock().take() else {
            return;
        };
        let sink = ReplaySink {
            shared: Arc::downgrade(&self.shared),
        };
        let handle = tokio::spawn(runner(sink));
        *self.shared.driver.lock() = Some(handle.abort_handle());
    }

    /// Record an item on a push-driven replay.
    pub(crate) fn push(&self, item: T) -> bool {
        self.shared.push(item)
    }

    /// Complete a push-driven replay. Returns false if it already terminated.
    pub(crate) fn complete(&self) -> bool {
        self.shared.finish(Ok(()))
    }

    /// Fail a push-driven replay. Returns false if it already terminated.
    pub(crate) fn fail(&self, err: E) -> bool {
        self.shared.finish(Err(err))
    }

    /// True once a terminal notification was recorded.
    pub(crate) fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminal.is_some()
    }

    /// Stream of every item followed by the terminal notification. Polling it
    /// starts the execution.
    pub(crate) fn subscribe(&self) -> BoxStream<'static, Result<T, E>> {
        self.shared.state.lock().subscribers += 1;
        let cursor = Cursor {
            shared: Arc::clone(&self.shared),
            rx: self.shared.version.subscribe(),
            index: 0,
            started: false,
            finished: false,
        };
        stream::unfold(cursor, |mut cursor| async move {
            let next = cursor.next().await?;
            Some((next, cursor))
        })
        .boxed()
    }

    /// Resolve once the execution terminated, however it terminated. Starts the
    /// execution.
    pub(crate) async fn terminated(&self) {
        let mut events = self.subscribe();
        while events.next().await.is_some() {}
    }
}

struct Cursor<T, E> {
    shared: Arc<Shared<T, E>>,
    rx: watch::Receiver<u64>,
    index: usize,
    started: bool,
    finished: bool,
}

impl<T, E> Cursor<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Option<Result<T, E>> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            Replay {
                shared: Arc::clone(&self.shared),
            }
            .start();
        }
        loop {
            self.rx.borrow_and_update();
            {
                let state = self.shared.state.lock();
                if let Some(item) = state.items.get(self.index) {
                    self.index += 1;
                    return Some(Ok(item.clone()));
                }
                match &state.terminal {
                    Some(Ok(())) => {
                        self.finished = true;
                        return None;
                    }
                    Some(Err(err)) => {
                        self.finished = true;
                        return Some(Err(err.clone()));
                    }
                    None => {}
                }
            }
            if self.rx.changed().await.is_err() {
                self.finished = true;
                return None;
            }
        }
    }
}

impl<T, E> Drop for Cursor<T, E> {
    fn drop(&mut self) {
        let idle = {
            let mut state = self.shared.state.lock();
            state.subscribers = state.subscribers.saturating_sub(1);
            state.subscribers == 0 && state.terminal.is_none()
        };
        if idle && self.shared.cancel_when_idle {
            if let Some(driver) = self.shared.driver.lock().take() {
                driver.abort();
                self.shared.finish(Ok(()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_everything() {
        let replay: Replay<u32, String> =
            Replay::from_stream(false, stream::iter(vec![Ok(1), Ok(2), Ok(3)]).boxed());
        let first: Vec<_> = replay.subscribe().collect().await;
        let second: Vec<_> = replay.subscribe().collect().await;
        assert_eq!(first, vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(first, second);
        assert!(replay.is_terminated());
    }

    #[tokio::test]
    async fn test_execution_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let replay: Replay<u32, String> = Replay::deferred(false, move |sink| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                sink.push(7);
                sink.complete();
            })
        });
        let (a, b) = tokio::join!(
            replay.subscribe().collect::<Vec<_>>(),
            replay.subscribe().collect::<Vec<_>>()
        );
        assert_eq!(a, vec![Ok(7)]);
        assert_eq!(b, vec![Ok(7)]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_replayed() {
        let replay: Replay<u32, String> = Replay::from_stream(
            false,
            stream::iter(vec![Ok(1), Err("boom".to_string()), Ok(2)]).boxed(),
        );
        let items: Vec<_> = replay.subscribe().collect().await;
        assert_eq!(items, vec![Ok(1), Err("boom".to_string())]);
    }

    #[tokio::test]
    async fn test_subject_ignores_items_after_terminal() {
        let subject: Replay<u32, String> = Replay::subject();
        assert!(subject.push(1));
        assert!(subject.complete());
        assert!(!subject.push(2));
        assert!(!subject.fail("late".into()));
        let items: Vec<_> = subject.subscribe().collect().await;
        assert_eq!(items, vec![Ok(1)]);
    }

    #[tokio::test]
    async fn test_idle_replay_is_cancelled() {
        let replay: Replay<u32, String> = Replay::from_stream(
            true,
            stream::pending::<Result<u32, String>>().boxed(),
        );
        let mut events = replay.subscribe();
        let polled = tokio::time::timeout(Duration::from_millis(20), events.next()).await;
        assert!(polled.is_err());
        drop(events);
        assert!(replay.is_terminated());
    }
}
