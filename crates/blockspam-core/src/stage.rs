//! Per-task deadline, cancellation and stage timing.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{BoxError, TaskError};
use crate::task::TaskResult;

/// Name of the connection stage.
pub const CONNECT: &str = "connect";

/// Name of the decode stage.
pub const DECODE: &str = "decode";

/// Deadlines this far out are treated as "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Ordered stage name → elapsed duration.
///
/// Every configured stage has an entry from the start; entries stay at zero
/// until the stage completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTimings {
    entries: Vec<(&'static str, Duration)>,
}

impl StageTimings {
    /// Create timings with a zero entry for each stage.
    pub fn new(stages: &[&'static str]) -> Self {
        Self {
            entries: stages.iter().map(|name| (*name, Duration::ZERO)).collect(),
        }
    }

    /// Record the duration of a stage. Unknown stages are appended.
    pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
        match self.entries.iter_mut().find(|(name, _)| *name == stage) {
            Some(entry) => entry.1 = elapsed,
            None => self.entries.push((stage, elapsed)),
        }
    }

    /// Duration of a stage, if it is configured.
    pub fn get(&self, stage: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, d)| *d)
    }

    /// Iterate over stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.entries.iter().copied()
    }

    /// Sum of all recorded durations.
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    /// Number of configured stages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no stage is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, elapsed)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", name, elapsed)?;
        }
        Ok(())
    }
}

/// Deadline and cancellation scope of one task.
///
/// The token is a child of the run's root token: cancelling the root reaches
/// every task, cancelling this one reaches nobody else.
#[derive(Debug, Clone)]
pub struct TaskContext {
    cancel: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl TaskContext {
    /// Derive a task scope from the root token, expiring `timeout` from now.
    pub fn new(root: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            cancel: root.child_token(),
            deadline,
            timeout,
        }
    }

    /// Instant after which in-flight stages fail with a timeout.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Timeout the deadline was derived from.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Token observed by every stage of this task.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true if the task (or the whole run) was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this task only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start timing the given stages.
    pub fn stages(&self, names: &[&'static str]) -> StageTracker<'_> {
        StageTracker {
            ctx: self,
            timings: StageTimings::new(names),
        }
    }

    /// Drive `fut` until it resolves, the deadline passes or the task is
    /// cancelled. The future is dropped in the latter two cases.
    pub async fn guard<F, T, E>(&self, stage: &'static str, fut: F) -> Result<Result<T, E>, TaskError>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TaskError::Cancelled { stage }),
            res = tokio::time::timeout_at(self.deadline, fut) => res.map_err(|_| TaskError::Timeout {
                stage,
                after: self.timeout,
            }),
        }
    }
}

/// Runs the stages of one task in order and records how long each took.
///
/// The first error returned by any method is the task's terminal error; the
/// caller is expected to stop and hand it to [`StageTracker::finish`].
pub struct StageTracker<'a> {
    ctx: &'a TaskContext,
    timings: StageTimings,
}

impl<'a> StageTracker<'a> {
    /// Run the connection stage.
    pub async fn connect<F, T, E>(&mut self, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        self.timed(CONNECT, fut, |source| TaskError::Connection { source })
            .await
    }

    /// Run a named remote-call stage.
    pub async fn stage<F, T, E>(&mut self, stage: &'static str, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        self.timed(stage, fut, |source| TaskError::Stage { stage, source })
            .await
    }

    /// Run the synchronous decode stage.
    pub fn decode<T, E>(&mut self, f: impl FnOnce() -> Result<T, E>) -> Result<T, TaskError>
    where
        E: Into<BoxError>,
    {
        if self.ctx.is_cancelled() {
            return Err(TaskError::Cancelled { stage: DECODE });
        }

        let started = std::time::Instant::now();
        let value = f().map_err(|e| TaskError::Decode { source: e.into() })?;
        self.timings.record(DECODE, started.elapsed());
        Ok(value)
    }

    /// Timings recorded so far.
    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    /// Build the task result from the pipeline outcome.
    pub fn finish<P>(self, id: P, outcome: Result<String, TaskError>) -> TaskResult<P> {
        match outcome {
            Ok(message) => TaskResult::success(id, message, self.timings),
            Err(error) => TaskResult::failure(id, error, self.timings),
        }
    }

    async fn timed<F, T, E>(
        &mut self,
        stage: &'static str,
        fut: F,
        wrap: impl FnOnce(BoxError) -> TaskError,
    ) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        trace!(stage, "stage started");
        let started = std::time::Instant::now();

        match self.ctx.guard(stage, fut).await? {
            Ok(value) => {
                let elapsed = started.elapsed();
                trace!(stage, ?elapsed, "stage finished");
                self.timings.record(stage, elapsed);
                Ok(value)
            }
            Err(e) => Err(wrap(e.into())),
        }
    }
}
