//! Command-line arguments for both binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

use blockspam_core::{RunConfig, RuntimeId};

use crate::dial::{DialConfig, DialError, TlsMode};
use crate::round::RoundSource;

/// Where the node lives and how to reach it.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Node gRPC endpoint (`host:port` or a full URI)
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    pub url: String,

    /// Connect without TLS (implied by an `http://` endpoint)
    #[arg(long, conflicts_with = "ca_cert")]
    pub plaintext: bool,

    /// PEM bundle to verify the node against instead of the system roots
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,
}

impl ConnectArgs {
    pub fn dial_config(&self) -> Result<DialConfig, DialError> {
        let tls = if self.plaintext || self.url.trim_start().starts_with("http://") {
            TlsMode::Plaintext
        } else if let Some(path) = &self.ca_cert {
            TlsMode::from_ca_file(path)?
        } else {
            TlsMode::NativeRoots
        };
        Ok(DialConfig::new(self.url.clone(), tls))
    }
}

/// How task results are printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// blockspam - fetch random runtime rounds concurrently and time each call
#[derive(Parser, Debug)]
#[command(name = "blockspam", version)]
#[command(about = "Concurrent round-fetch load generator for node gRPC endpoints", long_about = None)]
pub struct SpamArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Number of concurrent tasks
    #[arg(short = 'n', long = "concurrency", default_value_t = 1)]
    pub concurrency: usize,

    /// Pause between task launches (e.g. 10ms, 1s)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0ms")]
    pub delay: Duration,

    /// Deadline for each task, measured from its launch
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub timeout: Duration,

    /// Runtime to query, as hex
    #[arg(long, default_value_t = RuntimeId::SAPPHIRE)]
    pub runtime_id: RuntimeId,

    /// Lowest round to draw
    #[arg(long, default_value_t = 500_000)]
    pub min_round: u64,

    /// Highest round to draw
    #[arg(long, default_value_t = 899_999)]
    pub max_round: u64,

    /// Seed the round generator for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl SpamArgs {
    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(self.connect.url.clone())
            .with_concurrency(self.concurrency)
            .with_delay(self.delay)
            .with_timeout(self.timeout)
    }

    pub fn round_source(&self) -> RoundSource {
        RoundSource::new(self.min_round, self.max_round, self.seed)
    }
}

/// node-status - print a node's consensus and runtime state
#[derive(Parser, Debug)]
#[command(name = "node-status", version)]
#[command(about = "One-shot health probe for a node gRPC endpoint", long_about = None)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Deadline for each call
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub timeout: Duration,
}
