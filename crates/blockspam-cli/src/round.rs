//! The "get round" pipeline run by every blockspam task.

use async_trait::async_trait;
use tonic::Request;
use tracing::debug;

use blockspam_core::stage::{CONNECT, DECODE};
use blockspam_core::{
    ParamSource, Pipeline, RandomRange, RuntimeId, SeededRange, StageTracker, TaskContext,
    TaskError, TaskResult,
};
use blockspam_proto::decode_round;
use blockspam_proto::pb::{GetBlockRequest, GetEventsRequest, GetTransactionsRequest};

use crate::dial::{DialConfig, NodeConnection};

pub const GET_BLOCK: &str = "get-block";
pub const GET_TRANSACTIONS: &str = "get-transactions";
pub const GET_EVENTS: &str = "get-events";

/// Stages of a round fetch, in execution order.
pub const ROUND_STAGES: &[&str] = &[CONNECT, GET_BLOCK, GET_TRANSACTIONS, GET_EVENTS, DECODE];

/// Fetches one runtime round over a dedicated connection and summarizes it.
#[derive(Debug, Clone)]
pub struct RoundPipeline {
    dial: DialConfig,
    runtime_id: RuntimeId,
}

impl RoundPipeline {
    pub fn new(dial: DialConfig, runtime_id: RuntimeId) -> Self {
        Self { dial, runtime_id }
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime_id
    }

    async fn fetch(
        &self,
        ctx: &TaskContext,
        stages: &mut StageTracker<'_>,
        round: u64,
    ) -> Result<String, TaskError> {
        // Dropped on every return path, which closes the transport.
        let conn = stages.connect(NodeConnection::dial(&self.dial)).await?;
        let mut client = conn.runtime();
        let runtime_id = self.runtime_id.as_bytes().to_vec();

        let block = stages
            .stage(
                GET_BLOCK,
                client.get_block(with_deadline(
                    ctx,
                    GetBlockRequest {
                        runtime_id: runtime_id.clone(),
                        round,
                    },
                )),
            )
            .await?
            .into_inner();

        let transactions = stages
            .stage(
                GET_TRANSACTIONS,
                client.get_transactions_with_results(with_deadline(
                    ctx,
                    GetTransactionsRequest {
                        runtime_id: runtime_id.clone(),
                        round,
                    },
                )),
            )
            .await?
            .into_inner();

        let events = stages
            .stage(
                GET_EVENTS,
                client.get_events(with_deadline(ctx, GetEventsRequest { runtime_id, round })),
            )
            .await?
            .into_inner();

        let summary = stages.decode(|| decode_round(block, transactions, events))?;
        Ok(summary.to_string())
    }
}

/// Propagate what is left of the task deadline to the node as `grpc-timeout`.
fn with_deadline<T>(ctx: &TaskContext, message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(ctx.remaining());
    request
}

#[async_trait]
impl Pipeline for RoundPipeline {
    type Param = u64;

    fn stage_names(&self) -> &'static [&'static str] {
        ROUND_STAGES
    }

    async fn run(&self, ctx: &TaskContext, round: u64) -> TaskResult<u64> {
        let mut stages = ctx.stages(ROUND_STAGES);
        let outcome = self.fetch(ctx, &mut stages, round).await;
        if let Err(e) = &outcome {
            debug!(round, error = %e, "Round fetch failed");
        }
        stages.finish(round, outcome)
    }
}

/// Where round numbers come from: a fresh random draw per task, or a seeded
/// generator for reproducible runs.
#[derive(Debug)]
pub enum RoundSource {
    Random(RandomRange),
    Seeded(SeededRange),
}

impl RoundSource {
    pub fn new(lo: u64, hi: u64, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::Seeded(SeededRange::new(lo, hi, seed)),
            None => Self::Random(RandomRange::new(lo, hi)),
        }
    }
}

impl ParamSource for RoundSource {
    type Param = u64;

    fn next(&self) -> u64 {
        match self {
            Self::Random(range) => range.next(),
            Self::Seeded(range) => range.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dial::TlsMode;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn unreachable_pipeline() -> RoundPipeline {
        RoundPipeline::new(
            DialConfig::new("127.0.0.1:1", TlsMode::Plaintext),
            RuntimeId::SAPPHIRE,
        )
    }

    #[test]
    fn test_stage_names() {
        let pipeline = unreachable_pipeline();
        assert_eq!(
            pipeline.stage_names(),
            &["connect", "get-block", "get-transactions", "get-events", "decode"]
        );
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let a = RoundSource::new(500_000, 899_999, Some(42));
        let b = RoundSource::new(500_000, 899_999, Some(42));
        let first: Vec<u64> = (0..5).map(|_| a.next()).collect();
        let second: Vec<u64> = (0..5).map(|_| b.next()).collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|r| (500_000..=899_999).contains(r)));
    }

    #[test]
    fn test_random_source_stays_in_range() {
        let source = RoundSource::new(10, 12, None);
        for _ in 0..50 {
            assert!((10..=12).contains(&source.next()));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_short_circuits() {
        let root = CancellationToken::new();
        let ctx = TaskContext::new(&root, Duration::from_secs(5));

        let result = unreachable_pipeline().run(&ctx, 600_000).await;

        assert_eq!(result.id, 600_000);
        assert!(result.message.is_empty());
        let err = result.error.expect("connect should fail");
        assert!(matches!(err, TaskError::Connection { .. }));
        assert!(result.timings.iter().all(|(_, d)| d.is_zero()));
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let root = CancellationToken::new();
        let ctx = TaskContext::new(&root, Duration::from_secs(5));
        root.cancel();

        let result = unreachable_pipeline().run(&ctx, 1).await;

        assert!(matches!(
            result.error,
            Some(TaskError::Cancelled { stage: "connect" })
        ));
    }
}
