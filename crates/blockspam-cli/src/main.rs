//! blockspam - concurrent round-fetch load generator

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use blockspam_cli::args::{OutputFormat, SpamArgs};
use blockspam_cli::{init_tracing, RoundPipeline};
use blockspam_core::{JsonReporter, Scheduler, TextReporter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = SpamArgs::parse();
    init_tracing()?;

    let dial = args.connect.dial_config()?;
    let config = args.run_config();

    info!(
        endpoint = %dial.uri(),
        concurrency = config.concurrency,
        delay = ?config.delay,
        timeout = ?config.timeout,
        runtime_id = %args.runtime_id,
        "Starting blockspam"
    );

    let root = CancellationToken::new();
    tokio::spawn({
        let root = root.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling outstanding tasks");
                root.cancel();
            }
        }
    });

    let scheduler = Scheduler::new(
        config,
        args.round_source(),
        RoundPipeline::new(dial, args.runtime_id),
    )
    .with_root(root);

    // Task failures are reported, never turned into an exit code.
    match args.format {
        OutputFormat::Text => scheduler.run(&mut TextReporter::stdout()).await,
        OutputFormat::Json => scheduler.run(&mut JsonReporter::stdout()).await,
    };

    Ok(())
}
