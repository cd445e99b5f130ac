//! End-to-end runs of the scheduler against an in-process pipeline.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use blockspam_core::{
    Pipeline, Reporter, RunConfig, RunStats, Scheduler, Sequence, StageTimings, StageTracker,
    TaskContext, TaskError, TaskResult,
};

const STAGES: &[&str] = &[
    "connect",
    "fetch-primary",
    "fetch-secondary",
    "fetch-tertiary",
    "decode",
];

/// Counts live connections so tests can check every one is released.
#[derive(Default)]
struct Pool {
    opened: AtomicUsize,
    released: AtomicUsize,
}

struct Connection(Arc<Pool>);

impl Drop for Connection {
    fn drop(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakePipeline {
    latency: fn(u64) -> Duration,
    fail: fn(&'static str, u64) -> bool,
    panic_on: Option<u64>,
    pool: Arc<Pool>,
}

impl FakePipeline {
    fn new() -> Self {
        Self {
            latency: |_| Duration::from_millis(1),
            fail: |_, _| false,
            panic_on: None,
            pool: Arc::new(Pool::default()),
        }
    }

    async fn step(&self, stage: &'static str, param: u64) -> Result<(), &'static str> {
        tokio::time::sleep((self.latency)(param)).await;
        if (self.fail)(stage, param) {
            Err("injected failure")
        } else {
            Ok(())
        }
    }

    async fn body(&self, stages: &mut StageTracker<'_>, param: u64) -> Result<String, TaskError> {
        if self.panic_on == Some(param) {
            panic!("pipeline blew up on {param}");
        }

        let _conn = stages
            .connect(async {
                self.step("connect", param).await?;
                self.pool.opened.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(Connection(self.pool.clone()))
            })
            .await?;

        for stage in ["fetch-primary", "fetch-secondary", "fetch-tertiary"] {
            stages.stage(stage, self.step(stage, param)).await?;
        }

        stages.decode(|| {
            if (self.fail)("decode", param) {
                Err("undecodable payload")
            } else {
                Ok(format!("param {param} ok"))
            }
        })
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    type Param = u64;

    fn stage_names(&self) -> &'static [&'static str] {
        STAGES
    }

    async fn run(&self, ctx: &TaskContext, param: u64) -> TaskResult<u64> {
        let mut stages = ctx.stages(STAGES);
        let outcome = self.body(&mut stages, param).await;
        stages.finish(param, outcome)
    }
}

struct Record {
    id: u64,
    error: Option<String>,
    failed_stage: Option<&'static str>,
    timed_out: bool,
    cancelled: bool,
    aborted: bool,
    message: String,
    timings: StageTimings,
}

#[derive(Default)]
struct Collect {
    records: Vec<Record>,
    summary: Option<RunStats>,
}

impl Reporter<u64> for Collect {
    fn task(&mut self, result: &TaskResult<u64>) -> io::Result<()> {
        self.records.push(Record {
            id: result.id,
            error: result.error.as_ref().map(|e| e.to_string()),
            failed_stage: result.error.as_ref().and_then(|e| e.stage()),
            timed_out: result.error.as_ref().is_some_and(|e| e.is_timeout()),
            cancelled: result.error.as_ref().is_some_and(|e| e.is_cancelled()),
            aborted: matches!(result.error, Some(TaskError::Aborted { .. })),
            message: result.message.clone(),
            timings: result.timings.clone(),
        });
        Ok(())
    }

    fn summary(&mut self, stats: &RunStats) -> io::Result<()> {
        self.summary = Some(*stats);
        Ok(())
    }
}

fn config(n: usize) -> RunConfig {
    RunConfig::new("in-process")
        .with_concurrency(n)
        .with_timeout(Duration::from_secs(1))
}

fn sequence(n: u64) -> Sequence<u64> {
    Sequence::new((1..=n).collect()).unwrap()
}

#[tokio::test]
async fn scenario_all_stages_succeed() {
    let scheduler = Scheduler::new(config(3), sequence(3), FakePipeline::new());
    let mut out = Collect::default();

    let errors = scheduler.launch(&mut out).await;

    assert_eq!(errors, 0);
    assert_eq!(out.records.len(), 3);
    let mut ids: Vec<u64> = out.records.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
    for r in &out.records {
        assert!(r.error.is_none());
        assert_eq!(r.message, format!("param {} ok", r.id));
        assert_eq!(r.timings.len(), STAGES.len());
    }
}

#[tokio::test]
async fn scenario_secondary_stage_fails() {
    let mut pipeline = FakePipeline::new();
    pipeline.fail = |stage, _| stage == "fetch-secondary";
    let scheduler = Scheduler::new(config(3), sequence(3), pipeline);
    let mut out = Collect::default();

    let errors = scheduler.launch(&mut out).await;

    assert_eq!(errors, 3);
    assert_eq!(out.records.len(), 3);
    for r in &out.records {
        assert!(r.error.is_some());
        assert_eq!(r.failed_stage, Some("fetch-secondary"));
        assert!(r.message.is_empty());
        assert!(r.timings.get("connect").unwrap() > Duration::ZERO);
        assert!(r.timings.get("fetch-primary").unwrap() > Duration::ZERO);
        for stage in ["fetch-secondary", "fetch-tertiary", "decode"] {
            assert_eq!(r.timings.get(stage), Some(Duration::ZERO));
        }
    }
}

#[tokio::test]
async fn scenario_stage_slower_than_timeout() {
    let mut pipeline = FakePipeline::new();
    pipeline.latency = |_| Duration::from_secs(5);
    let config = config(3).with_timeout(Duration::from_millis(100));
    let scheduler = Scheduler::new(config, sequence(3), pipeline);
    let mut out = Collect::default();

    let start = Instant::now();
    let errors = scheduler.launch(&mut out).await;
    let elapsed = start.elapsed();

    assert_eq!(errors, 3);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    for r in &out.records {
        assert!(r.timed_out);
        assert_eq!(r.failed_stage, Some("connect"));
        assert_eq!(r.error.as_deref(), Some("connect timed out after 100ms"));
    }
}

#[tokio::test]
async fn launches_are_paced_by_delay() {
    let config = config(5).with_delay(Duration::from_millis(30));
    let min = config.min_launch_time();
    let scheduler = Scheduler::new(config, sequence(5), FakePipeline::new());
    let mut out = Collect::default();

    let start = Instant::now();
    scheduler.launch(&mut out).await;

    assert!(start.elapsed() >= min);
    assert_eq!(out.records.len(), 5);
}

#[tokio::test]
async fn launches_do_not_wait_for_running_tasks() {
    // 20 tasks of 4 stages x 100ms each: 8s if run one after another.
    let mut pipeline = FakePipeline::new();
    pipeline.latency = |_| Duration::from_millis(100);
    let config = config(20).with_timeout(Duration::from_secs(5));
    let scheduler = Scheduler::new(config, sequence(20), pipeline);
    let mut out = Collect::default();

    let start = Instant::now();
    let errors = scheduler.launch(&mut out).await;
    let elapsed = start.elapsed();

    assert_eq!(errors, 0);
    assert_eq!(out.records.len(), 20);
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn every_task_reports_once_for_mixed_outcomes() {
    let mut pipeline = FakePipeline::new();
    pipeline.fail = |stage, p| match p % 4 {
        1 => stage == "connect",
        2 => stage == "fetch-tertiary",
        3 => stage == "decode",
        _ => false,
    };
    let scheduler = Scheduler::new(config(20), sequence(20), pipeline);
    let mut out = Collect::default();

    let stats = scheduler.run(&mut out).await;

    assert_eq!(out.records.len(), 20);
    let with_error = out.records.iter().filter(|r| r.error.is_some()).count();
    assert_eq!(with_error, 15);
    assert_eq!(stats.errors, with_error);
    assert_eq!(stats.total, 20);
    assert_eq!(out.summary, Some(stats));

    for r in &out.records {
        assert_eq!(r.error.is_none(), !r.message.is_empty());
        if r.id % 4 == 3 {
            assert_eq!(r.failed_stage, Some("decode"));
            assert!(r.timings.get("fetch-tertiary").unwrap() > Duration::ZERO);
        }
    }
}

#[tokio::test]
async fn timeout_of_one_task_leaves_siblings_alone() {
    let mut pipeline = FakePipeline::new();
    pipeline.latency = |p| {
        if p == 2 {
            Duration::from_secs(5)
        } else {
            Duration::from_millis(1)
        }
    };
    let config = config(3).with_timeout(Duration::from_millis(200));
    let scheduler = Scheduler::new(config, sequence(3), pipeline);
    let mut out = Collect::default();

    let errors = scheduler.launch(&mut out).await;

    assert_eq!(errors, 1);
    let slow = out.records.iter().find(|r| r.id == 2).unwrap();
    assert!(slow.timed_out);
    assert!(out
        .records
        .iter()
        .filter(|r| r.id != 2)
        .all(|r| r.error.is_none()));
}

#[tokio::test]
async fn root_cancellation_reaches_every_task() {
    let mut pipeline = FakePipeline::new();
    pipeline.latency = |_| Duration::from_secs(5);
    let root = CancellationToken::new();
    let config = config(4)
        .with_timeout(Duration::from_secs(30))
        .with_delay(Duration::from_millis(10));
    let scheduler = Scheduler::new(config, sequence(4), pipeline).with_root(root.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        root.cancel();
    });

    let mut out = Collect::default();
    let start = Instant::now();
    let errors = scheduler.launch(&mut out).await;
    canceller.await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(errors, 4);
    assert!(out.records.iter().all(|r| r.cancelled));
}

#[tokio::test]
async fn panicking_task_is_reported_as_aborted() {
    let mut pipeline = FakePipeline::new();
    pipeline.panic_on = Some(2);
    let scheduler = Scheduler::new(config(3), sequence(3), pipeline);
    let mut out = Collect::default();

    let errors = scheduler.launch(&mut out).await;

    assert_eq!(errors, 1);
    assert_eq!(out.records.len(), 3);
    let aborted = out.records.iter().find(|r| r.id == 2).unwrap();
    assert!(aborted.aborted);
    assert!(aborted.failed_stage.is_none());
    assert_eq!(aborted.timings.len(), STAGES.len());
}

#[tokio::test]
async fn connections_are_released_on_every_path() {
    // success
    let pipeline = FakePipeline::new();
    let pool = pipeline.pool.clone();
    Scheduler::new(config(3), sequence(3), pipeline)
        .launch(&mut Collect::default())
        .await;
    assert_eq!(pool.opened.load(Ordering::SeqCst), 3);
    assert_eq!(pool.released.load(Ordering::SeqCst), 3);

    // stage failure
    let mut pipeline = FakePipeline::new();
    pipeline.fail = |stage, _| stage == "fetch-primary";
    let pool = pipeline.pool.clone();
    Scheduler::new(config(3), sequence(3), pipeline)
        .launch(&mut Collect::default())
        .await;
    assert_eq!(pool.opened.load(Ordering::SeqCst), 3);
    assert_eq!(pool.released.load(Ordering::SeqCst), 3);

    // timeout after the connection was opened
    let mut pipeline = FakePipeline::new();
    pipeline.fail = |_, _| false;
    pipeline.latency = |_| Duration::from_millis(60);
    let pool = pipeline.pool.clone();
    let config = config(3).with_timeout(Duration::from_millis(100));
    let mut out = Collect::default();
    Scheduler::new(config, sequence(3), pipeline)
        .launch(&mut out)
        .await;
    assert!(out.records.iter().all(|r| r.timed_out));
    assert!(out
        .records
        .iter()
        .all(|r| r.failed_stage == Some("fetch-primary")));
    assert_eq!(pool.opened.load(Ordering::SeqCst), 3);
    assert_eq!(pool.released.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn zero_concurrency_is_an_empty_run() {
    let scheduler = Scheduler::new(config(0), sequence(1), FakePipeline::new());
    let mut out = Collect::default();

    let stats = scheduler.run(&mut out).await;

    assert_eq!(stats.errors, 0);
    assert_eq!(stats.total, 0);
    assert!(out.records.is_empty());
}
