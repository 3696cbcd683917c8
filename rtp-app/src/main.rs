mod app;
mod cli;
mod export;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    if let Err(e) = app::dispatch(cli) {
        tracing::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
