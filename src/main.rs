use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ppi_gnn::{config::RunConfig, train::run};

// cargo run --release -- --model BGM --epochs 250
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = RunConfig::parse();
    info!(?config, "starting");
    let score = run(&config)?;
    info!(score, "finished");
    Ok(())
}
