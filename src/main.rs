//! Sonic Rack CLI
//!
//! Offline front end: list modules, render and analyze files.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sonic_rack::cli::{commands, Cli, Commands};
use sonic_rack::EngineConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Sonic Rack v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    debug!(?config, "engine config");

    match cli.command {
        Commands::Modules => commands::list_modules(),
        Commands::Render {
            input,
            output,
            rack,
            bit_depth,
        } => commands::render_file(&config, &input, &output, rack.as_deref(), bit_depth),
        Commands::Analyze { input, json } => commands::analyze_file(&input, json),
        Commands::Batch {
            input_dir,
            output_dir,
            rack,
        } => commands::batch(&config, &input_dir, &output_dir, &rack),
    }
}
