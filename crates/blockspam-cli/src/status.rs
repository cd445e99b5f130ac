//! One-shot node health probe backing the `node-status` binary.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tonic::{Response, Status};
use tracing::{debug, warn};

use blockspam_core::{BlockHeader, DecodeError, RuntimeId};
use blockspam_proto::pb::{
    Empty, GetConsensusBlockRequest, GetRuntimesRequest, RuntimeRequest, HEIGHT_LATEST,
};

use crate::dial::{DialConfig, DialError, NodeConnection};

/// Errors from the status probe.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("dial error: {0}")]
    Dial(#[from] DialError),

    #[error("{call} error: {source}")]
    Call {
        call: &'static str,
        #[source]
        source: Status,
    },

    #[error("{call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("{call} returned malformed data: {source}")]
    Decode {
        call: &'static str,
        #[source]
        source: DecodeError,
    },
}

/// Latest block of one registered runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBlock {
    pub round: u64,
    pub timestamp: DateTime<Utc>,
}

/// Probe outcome for one registered runtime.
#[derive(Debug)]
pub struct RuntimeStatus {
    pub id: RuntimeId,
    pub latest: Result<RuntimeBlock, StatusError>,
}

/// Snapshot of a node's consensus and runtime state.
#[derive(Debug)]
pub struct NodeStatus {
    pub base_epoch: u64,
    pub height: i64,
    pub runtimes: Vec<RuntimeStatus>,
    pub chain_context: Result<String, StatusError>,
}

impl NodeStatus {
    /// Write the human-readable report.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "BaseEpoch: {}", self.base_epoch)?;
        writeln!(out, "LatestHeight: {}", self.height)?;
        writeln!(out, "Runtimes:")?;
        for runtime in &self.runtimes {
            match &runtime.latest {
                Ok(block) => writeln!(
                    out,
                    "\t{}\t{} (round {})",
                    runtime.id,
                    block.timestamp.format("%Y-%m-%d %H:%M:%S %Z"),
                    block.round
                )?,
                Err(e) => writeln!(out, "\t{}\n\t{e}", runtime.id)?,
            }
        }
        match &self.chain_context {
            Ok(context) => writeln!(out, "ChainContext: {context}"),
            Err(e) => writeln!(out, "{e}"),
        }
    }
}

/// Query a node once over a single connection.
///
/// Base epoch, latest height and the runtime registry are required; a failing
/// runtime or chain-context query is recorded in the result instead. Dialing
/// and every call are bounded by `timeout`.
pub async fn probe(dial: &DialConfig, timeout: Duration) -> Result<NodeStatus, StatusError> {
    let conn = tokio::time::timeout(timeout, NodeConnection::dial(dial))
        .await
        .map_err(|_| StatusError::Timeout {
            call: "connect",
            after: timeout,
        })??;

    let base_epoch = call("GetBaseEpoch", timeout, conn.beacon().get_base_epoch(Empty {}))
        .await?
        .epoch;

    let height = call(
        "GetBlock",
        timeout,
        conn.consensus().get_block(GetConsensusBlockRequest {
            height: HEIGHT_LATEST,
        }),
    )
    .await?
    .height;
    debug!(base_epoch, height, "Consensus state");

    let registered = call(
        "GetRuntimes",
        timeout,
        conn.registry().get_runtimes(GetRuntimesRequest {
            height,
            include_suspended: false,
        }),
    )
    .await?
    .runtimes;

    let mut runtimes = Vec::with_capacity(registered.len());
    for runtime in registered {
        let id = match RuntimeId::from_slice(&runtime.id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Skipping runtime with malformed id");
                continue;
            }
        };
        let latest = runtime_block(&conn, id, height, timeout).await;
        if let Err(e) = &latest {
            debug!(runtime = %id, error = %e, "Runtime state unavailable");
        }
        runtimes.push(RuntimeStatus { id, latest });
    }

    let chain_context = call(
        "GetChainContext",
        timeout,
        conn.consensus().get_chain_context(Empty {}),
    )
    .await
    .map(|c| c.context);

    Ok(NodeStatus {
        base_epoch,
        height,
        runtimes,
        chain_context,
    })
}

async fn runtime_block(
    conn: &NodeConnection,
    id: RuntimeId,
    height: i64,
    timeout: Duration,
) -> Result<RuntimeBlock, StatusError> {
    const CALL: &str = "GetRuntimeState";

    let state = call(
        CALL,
        timeout,
        conn.roothash().get_runtime_state(RuntimeRequest {
            runtime_id: id.as_bytes().to_vec(),
            height,
        }),
    )
    .await?;

    let decode = |source| StatusError::Decode { call: CALL, source };
    let block = state
        .current_block
        .ok_or(DecodeError::MissingField("current_block"))
        .map_err(decode)?;
    let header = BlockHeader::try_from(block).map_err(decode)?;
    let timestamp = i64::try_from(header.timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or(DecodeError::OutOfRange {
            field: "timestamp",
            value: header.timestamp,
        })
        .map_err(decode)?;

    Ok(RuntimeBlock {
        round: header.round,
        timestamp,
    })
}

async fn call<T, F>(name: &'static str, timeout: Duration, fut: F) -> Result<T, StatusError>
where
    F: Future<Output = Result<Response<T>, Status>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(response)) => Ok(response.into_inner()),
        Ok(Err(source)) => Err(StatusError::Call { call: name, source }),
        Err(_) => Err(StatusError::Timeout {
            call: name,
            after: timeout,
        }),
    }
}
