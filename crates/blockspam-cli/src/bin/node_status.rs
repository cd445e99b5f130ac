//! node-status - print a node's consensus and runtime state

use clap::Parser;
use tracing::error;

use blockspam_cli::args::StatusArgs;
use blockspam_cli::init_tracing;
use blockspam_cli::status::probe;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = StatusArgs::parse();
    init_tracing()?;

    let dial = args.connect.dial_config()?;
    match probe(&dial, args.timeout).await {
        Ok(status) => status.render(&mut std::io::stdout().lock())?,
        Err(e) => {
            error!(endpoint = %dial.uri(), error = %e, "Status probe failed");
            println!("{e}");
        }
    }

    Ok(())
}
