//! Task results and the pipeline capability.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TaskError;
use crate::stage::{StageTimings, TaskContext};

/// Bounds every task parameter satisfies.
pub trait TaskParam:
    Clone + fmt::Debug + fmt::Display + Serialize + Send + Sync + 'static
{
}

impl<T> TaskParam for T where
    T: Clone + fmt::Debug + fmt::Display + Serialize + Send + Sync + 'static
{
}

/// Outcome of one task, reported exactly once.
#[derive(Debug)]
pub struct TaskResult<P> {
    /// Parameter the task ran with.
    pub id: P,

    /// Set iff a stage failed, timed out or was cancelled.
    pub error: Option<TaskError>,

    /// One-line summary; empty unless every stage succeeded.
    pub message: String,

    /// Duration of each configured stage, zero for stages not completed.
    pub timings: StageTimings,
}

impl<P> TaskResult<P> {
    /// Successful result carrying a summary.
    pub fn success(id: P, message: impl Into<String>, timings: StageTimings) -> Self {
        Self {
            id,
            error: None,
            message: message.into(),
            timings,
        }
    }

    /// Failed result; the message stays empty.
    pub fn failure(id: P, error: TaskError, timings: StageTimings) -> Self {
        Self {
            id,
            error: Some(error),
            message: String::new(),
            timings,
        }
    }

    /// Returns true if the task produced a summary.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The staged work executed by every task.
///
/// Implementations must observe `ctx`: each blocking call is expected to go
/// through a [`StageTracker`](crate::stage::StageTracker) obtained from
/// [`TaskContext::stages`], which enforces the deadline and cancellation.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Parameter type this pipeline runs with.
    type Param: TaskParam;

    /// Stage names in execution order, decode last.
    fn stage_names(&self) -> &'static [&'static str];

    /// Run all stages for one parameter.
    async fn run(&self, ctx: &TaskContext, param: Self::Param) -> TaskResult<Self::Param>;
}
