//! Concurrency strategies controlling how repeated runs of one handler interact.
//!
//! A strategy instance wraps a handler into another handler with the same
//! signature. The wrapper owns the strategy's bookkeeping, so two jobs only
//! share state when they were registered with the same instance, which is how
//! cross-job serialization groups are formed:
//!
//! ```rust,ignore
//! let group = JobStrategyKind::Serialize.instantiate();
//! registry.register("compile", compile, RegisterOptions::new().with_shared_strategy(group.clone()))?;
//! registry.register("link", link, RegisterOptions::new().with_shared_strategy(group))?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::handler::{HandlerStream, JobHandlerContext, SharedHandler};
use super::replay::Replay;
use super::{JobError, JobEvent};
use crate::util::json::canonical_json;

type SharedRun = Replay<JobEvent, JobError>;

/// Available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStrategyKind {
    /// Every call runs the handler immediately.
    #[default]
    Parallelize,
    /// Calls run one after another.
    Serialize,
    /// Calls made while a run is in flight share that run.
    Reuse,
    /// The first run is shared by every call, forever.
    Once,
    /// Runs are shared by calls with canonically equal input.
    Memoize,
}

impl JobStrategyKind {
    /// Create a fresh strategy instance of this kind.
    pub fn instantiate(self) -> Arc<dyn JobStrategy> {
        match self {
            Self::Parallelize => Arc::new(ParallelizeStrategy),
            Self::Serialize => Arc::new(SerializeStrategy::default()),
            Self::Reuse => Arc::new(ReuseStrategy::default()),
            Self::Once => Arc::new(OnceStrategy::default()),
            Self::Memoize => Arc::new(MemoizeStrategy::default()),
        }
    }

    /// Snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parallelize => "parallelize",
            Self::Serialize => "serialize",
            Self::Reuse => "reuse",
            Self::Once => "once",
            Self::Memoize => "memoize",
        }
    }
}

impl fmt::Display for JobStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStrategyKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallelize" | "parallel" => Ok(Self::Parallelize),
            "serialize" | "serial" => Ok(Self::Serialize),
            "reuse" => Ok(Self::Reuse),
            "once" => Ok(Self::Once),
            "memoize" => Ok(Self::Memoize),
            other => Err(JobError::Config(format!("unknown strategy `{other}`"))),
        }
    }
}

/// A stateful concurrency policy.
pub trait JobStrategy: Send + Sync + 'static {
    /// Strategy kind, for diagnostics.
    fn kind(&self) -> JobStrategyKind;

    /// Wrap `handler` so that its runs follow this strategy.
    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler;
}

/// Unrestricted concurrency.
#[derive(Debug, Default)]
pub struct ParallelizeStrategy;

impl JobStrategy for ParallelizeStrategy {
    fn kind(&self) -> JobStrategyKind {
        JobStrategyKind::Parallelize
    }

    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler {
        handler
    }
}

/// One run at a time, in call order.
#[derive(Default)]
pub struct SerializeStrategy {
    latest: Mutex<Option<SharedRun>>,
}

impl JobStrategy for SerializeStrategy {
    fn kind(&self) -> JobStrategyKind {
        JobStrategyKind::Serialize
    }

    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler {
        Arc::new(move |input: Value, context: JobHandlerContext| -> HandlerStream {
            let handler = Arc::clone(&handler);
            let mut latest = self.latest.lock();
            let previous = latest.take();
            let gated = stream::once(async move {
                if let Some(previous) = previous {
                    previous.terminated().await;
                }
                handler.call(input, context)
            })
            .flatten()
            .boxed();
            let run = Replay::from_stream(false, gated);
            *latest = Some(run.clone());
            run.subscribe()
        })
    }
}

/// Share the in-flight run; start a new one once it terminated.
#[derive(Default)]
pub struct ReuseStrategy {
    in_flight: Mutex<Option<SharedRun>>,
}

impl JobStrategy for ReuseStrategy {
    fn kind(&self) -> JobStrategyKind {
        JobStrategyKind::Reuse
    }

    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler {
        Arc::new(move |input: Value, context: JobHandlerContext| -> HandlerStream {
            let mut in_flight = self.in_flight.lock();
            if let Some(run) = in_flight.as_ref().filter(|run| !run.is_terminated()) {
                tracing::debug!(job = %context.description.name, "reusing in-flight run");
                return run.subscribe();
            }
            let run = Replay::from_stream(false, handler.call(input, context));
            *in_flight = Some(run.clone());
            run.subscribe()
        })
    }
}

/// Run the handler once; every later call gets that run.
#[derive(Default)]
pub struct OnceStrategy {
    run: Mutex<Option<SharedRun>>,
}

impl JobStrategy for OnceStrategy {
    fn kind(&self) -> JobStrategyKind {
        JobStrategyKind::Once
    }

    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler {
        Arc::new(move |input: Value, context: JobHandlerContext| -> HandlerStream {
            let mut slot = self.run.lock();
            let run = slot
                .get_or_insert_with(|| Replay::from_stream(false, handler.call(input, context)));
            run.subscribe()
        })
    }
}

/// Cache runs by canonical input.
#[derive(Default)]
pub struct MemoizeStrategy {
    runs: Mutex<HashMap<String, SharedRun>>,
}

impl MemoizeStrategy {
    /// Number of distinct inputs seen so far.
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    /// True if no run was cached yet.
    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

impl JobStrategy for MemoizeStrategy {
    fn kind(&self) -> JobStrategyKind {
        JobStrategyKind::Memoize
    }

    fn wrap(self: Arc<Self>, handler: SharedHandler) -> SharedHandler {
        Arc::new(move |input: Value, context: JobHandlerContext| -> HandlerStream {
            let key = canonical_json(&input);
            let mut runs = self.runs.lock();
            if let Some(run) = runs.get(&key) {
                tracing::debug!(job = %context.description.name, "memoized run hit");
                return run.subscribe();
            }
            let run = Replay::from_stream(false, handler.call(input, context));
            runs.insert(key, run.clone());
            run.subscribe()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Serialize".parse::<JobStrategyKind>().unwrap(), JobStrategyKind::Serialize);
        assert_eq!("parallel".parse::<JobStrategyKind>().unwrap(), JobStrategyKind::Parallelize);
        assert!("eventually".parse::<JobStrategyKind>().is_err());
        assert_eq!(JobStrategyKind::default(), JobStrategyKind::Parallelize);
    }

    #[test]
    fn test_instances_report_their_kind() {
        for kind in [
            JobStrategyKind::Parallelize,
            JobStrategyKind::Serialize,
            JobStrategyKind::Reuse,
            JobStrategyKind::Once,
            JobStrategyKind::Memoize,
        ] {
            assert_eq!(kind.instantiate().kind(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
