//! Result aggregation and reporting.

use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::task::{TaskParam, TaskResult};

/// Summary of a finished run. Derived from the aggregation pass, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    /// Wall time from the first launch to the end of aggregation.
    pub elapsed: Duration,

    /// Number of tasks that reported an error.
    pub errors: usize,

    /// Number of tasks launched.
    pub total: usize,
}

impl RunStats {
    /// Create stats for a finished run.
    pub fn new(elapsed: Duration, errors: usize, total: usize) -> Self {
        Self {
            elapsed,
            errors,
            total,
        }
    }

    /// Completed tasks per second of wall time.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total as f64 / secs
        } else {
            0.0
        }
    }

    /// Number of tasks that produced a summary.
    pub fn successes(&self) -> usize {
        self.total.saturating_sub(self.errors)
    }
}

/// Sink for per-task diagnostics and the final summary.
pub trait Reporter<P> {
    /// Report one task result, in completion order.
    fn task(&mut self, result: &TaskResult<P>) -> io::Result<()>;

    /// Report the run summary after every task was drained.
    fn summary(&mut self, stats: &RunStats) -> io::Result<()>;
}

/// Drains exactly one result per launched task.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    expected: usize,
}

impl Aggregator {
    /// Create an aggregator for `expected` tasks.
    pub fn new(expected: usize) -> Self {
        Self { expected }
    }

    /// Hand every result to `reporter` and return how many carried an error.
    ///
    /// A failing reporter is logged and never stops the drain.
    pub async fn drain<P, R>(&self, mut rx: mpsc::Receiver<TaskResult<P>>, reporter: &mut R) -> usize
    where
        R: Reporter<P> + ?Sized,
    {
        let mut errors = 0;
        let mut received = 0;

        while received < self.expected {
            let Some(result) = rx.recv().await else {
                warn!(received, expected = self.expected, "Result channel closed early");
                break;
            };
            received += 1;

            if result.error.is_some() {
                errors += 1;
            }
            if let Err(e) = reporter.task(&result) {
                warn!(error = %e, "Failed to report task result");
            }
        }

        debug!(received, errors, "Aggregation finished");
        errors
    }
}

/// Plain text output: a timing line per task, then its message or error.
pub struct TextReporter<W> {
    out: W,
}

impl TextReporter<io::Stdout> {
    /// Text reporter writing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TextReporter<W> {
    /// Text reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the reporter and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<P: TaskParam, W: Write> Reporter<P> for TextReporter<W> {
    fn task(&mut self, result: &TaskResult<P>) -> io::Result<()> {
        writeln!(self.out, "{}", result.timings)?;
        match &result.error {
            None => writeln!(self.out, "{}", result.message)?,
            Some(e) => writeln!(self.out, "task {}: {}", result.id, e)?,
        }
        self.out.flush()
    }

    fn summary(&mut self, stats: &RunStats) -> io::Result<()> {
        writeln!(self.out, "Total time: {:?}", stats.elapsed)?;
        writeln!(self.out, "Errors: {} / {}", stats.errors, stats.total)?;
        writeln!(self.out, "Rate: {:.2} /s", stats.rate())?;
        self.out.flush()
    }
}

/// One JSON object per line: a `task` event per result, then a `summary`.
pub struct JsonReporter<W> {
    out: W,
}

#[derive(Serialize)]
struct StageRecord {
    stage: &'static str,
    ms: f64,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonRecord<'a, P: Serialize> {
    Task {
        id: &'a P,
        ok: bool,
        failed_stage: Option<&'static str>,
        timed_out: bool,
        error: Option<String>,
        message: &'a str,
        timings: Vec<StageRecord>,
    },
    Summary {
        elapsed_ms: f64,
        errors: usize,
        total: usize,
        rate: f64,
    },
}

impl JsonReporter<io::Stdout> {
    /// JSON reporter writing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    /// JSON reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the reporter and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit<P: Serialize>(&mut self, record: &JsonRecord<'_, P>) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl<P: TaskParam, W: Write> Reporter<P> for JsonReporter<W> {
    fn task(&mut self, result: &TaskResult<P>) -> io::Result<()> {
        let record = JsonRecord::Task {
            id: &result.id,
            ok: result.is_success(),
            failed_stage: result.error.as_ref().and_then(|e| e.stage()),
            timed_out: result.error.as_ref().is_some_and(|e| e.is_timeout()),
            error: result.error.as_ref().map(|e| e.to_string()),
            message: &result.message,
            timings: result
                .timings
                .iter()
                .map(|(stage, d)| StageRecord { stage, ms: millis(d) })
                .collect(),
        };
        self.emit(&record)
    }

    fn summary(&mut self, stats: &RunStats) -> io::Result<()> {
        self.emit::<()>(&JsonRecord::Summary {
            elapsed_ms: millis(stats.elapsed),
            errors: stats.errors,
            total: stats.total,
            rate: stats.rate(),
        })
    }
}
