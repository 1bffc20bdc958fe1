mod cli;
mod config;
mod dataset;
mod error;
mod labels;
mod pdf_labels;
mod pipeline;
mod saved;
mod templates;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::load_or_default(config::DEFAULT_CONFIG_PATH)?,
    };

    // init tracing; RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(cli, &cfg) {
        error!(error = %e, "Run failed");
        return Err(e);
    }
    Ok(())
}
