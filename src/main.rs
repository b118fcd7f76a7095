mod admission;
mod cli;
mod extract;
mod histogram;
mod locator;
mod method;
mod metrics;
mod model;
mod options;
mod orchestrator;
mod publish;
mod regions;
mod render;
mod rundb;
mod series;
mod text_summary;

use anyhow::Result;
use clap::Parser;

/// Logs go to stderr so stdout carries only the summary.
fn init_tracing(quiet: bool) -> Result<()> {
    let default = if quiet { "warn" } else { "info,run_trends=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.quiet)?;

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::exit(1);
        }
    }
}
