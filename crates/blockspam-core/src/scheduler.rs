//! Task launcher: paced fan-out, join, then aggregation.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::TaskError;
use crate::params::ParamSource;
use crate::report::{Aggregator, Reporter, RunStats};
use crate::stage::{StageTimings, TaskContext};
use crate::task::{Pipeline, TaskResult};

/// Launches one task per request and collects their results.
///
/// Tasks are spawned one after another, `delay` apart, without waiting for
/// any of them. Each task owns a deadline derived from the root token. The
/// scheduler joins every task before draining, so no task outlives
/// [`Scheduler::launch`].
pub struct Scheduler<S, P> {
    config: Arc<RunConfig>,
    params: Arc<S>,
    pipeline: Arc<P>,
    root: CancellationToken,
}

impl<S, P> Scheduler<S, P>
where
    S: ParamSource,
    P: Pipeline<Param = S::Param>,
{
    /// Create a scheduler with its own root token.
    pub fn new(config: RunConfig, params: S, pipeline: P) -> Self {
        Self {
            config: Arc::new(config),
            params: Arc::new(params),
            pipeline: Arc::new(pipeline),
            root: CancellationToken::new(),
        }
    }

    /// Use an externally owned root token (e.g. cancelled on Ctrl-C).
    pub fn with_root(mut self, root: CancellationToken) -> Self {
        self.root = root;
        self
    }

    /// Run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Root token every task scope derives from.
    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// Launch all tasks, wait for them, report each result and return the
    /// number of failed tasks.
    pub async fn launch<R>(&self, reporter: &mut R) -> usize
    where
        R: Reporter<S::Param> + ?Sized,
    {
        let total = self.config.concurrency;
        let (tx, rx) = mpsc::channel(total.max(1));

        let handles = self.spawn_all(&tx).await;
        self.join_all(handles, &tx).await;
        drop(tx);

        Aggregator::new(total).drain(rx, reporter).await
    }

    /// Launch the run, report every result and the summary, and return the
    /// summary.
    pub async fn run<R>(&self, reporter: &mut R) -> RunStats
    where
        R: Reporter<S::Param> + ?Sized,
    {
        info!(
            endpoint = %self.config.endpoint,
            concurrency = self.config.concurrency,
            delay = ?self.config.delay,
            timeout = ?self.config.timeout,
            "Starting run"
        );

        let start = Instant::now();
        let errors = self.launch(reporter).await;
        let stats = RunStats::new(start.elapsed(), errors, self.config.concurrency);

        if let Err(e) = reporter.summary(&stats) {
            warn!(error = %e, "Failed to report run summary");
        }

        info!(
            errors = stats.errors,
            total = stats.total,
            elapsed = ?stats.elapsed,
            "Run finished"
        );
        stats
    }

    async fn spawn_all(
        &self,
        tx: &mpsc::Sender<TaskResult<S::Param>>,
    ) -> Vec<(S::Param, JoinHandle<()>)> {
        let total = self.config.concurrency;
        let mut handles = Vec::with_capacity(total);

        for i in 0..total {
            let param = self.params.next();
            let ctx = TaskContext::new(&self.root, self.config.timeout);
            let pipeline = self.pipeline.clone();
            let tx = tx.clone();

            debug!(task = i, param = %param, "Launching task");
            let id = param.clone();
            let handle = tokio::spawn(async move {
                // Releases anything still bound to this task's token once it reports.
                let _scope = ctx.cancellation_token().clone().drop_guard();
                let result = pipeline.run(&ctx, param).await;
                debug!(
                    param = %result.id,
                    ok = result.is_success(),
                    "Task finished"
                );
                if tx.send(result).await.is_err() {
                    warn!("Result channel closed before task reported");
                }
            });
            handles.push((id, handle));

            if i + 1 < total {
                self.pause().await;
            }
        }

        handles
    }

    async fn pause(&self) {
        if self.config.delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.delay) => {}
            _ = self.root.cancelled() => {}
        }
    }

    async fn join_all(
        &self,
        handles: Vec<(S::Param, JoinHandle<()>)>,
        tx: &mpsc::Sender<TaskResult<S::Param>>,
    ) {
        for (id, handle) in handles {
            let Err(e) = handle.await else {
                continue;
            };

            let reason = if e.is_panic() {
                "task panicked".to_string()
            } else {
                e.to_string()
            };
            warn!(param = %id, reason = %reason, "Task did not report");

            let result = TaskResult::failure(
                id,
                TaskError::Aborted { reason },
                StageTimings::new(self.pipeline.stage_names()),
            );
            if tx.send(result).await.is_err() {
                warn!("Result channel closed before aborted task was reported");
            }
        }
    }
}
