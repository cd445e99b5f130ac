//! blockspam CLI support
//!
//! Shared by the `blockspam` and `node-status` binaries:
//! - [`dial`]: endpoint normalization, TLS setup and per-task connections
//! - [`round`]: the round-fetch pipeline and round number sources
//! - [`status`]: the one-shot node health probe
//! - [`args`]: command-line arguments

pub mod args;
pub mod dial;
pub mod round;
pub mod status;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use dial::{DialConfig, DialError, NodeConnection, TlsMode};
pub use round::{RoundPipeline, RoundSource};
pub use status::{NodeStatus, StatusError};

/// Install the global subscriber: `RUST_LOG` plus `blockspam=info`, on stderr.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive("blockspam=info".parse()?);
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
