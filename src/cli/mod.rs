//! CLI Module
//!
//! Command-line surface over the rack engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sonic Rack - mastering effects rack
#[derive(Parser, Debug)]
#[command(name = "sonic-rack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the module descriptor table as JSON
    #[command(name = "modules")]
    Modules,

    /// Render a WAV file through a rack and write the result
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Rack JSON (list of modules); an empty rack if omitted
        #[arg(short, long)]
        rack: Option<PathBuf>,

        /// Output bit depth (16, 24 or 32); defaults to the config value
        #[arg(short, long)]
        bit_depth: Option<u16>,
    },

    /// Report loudness and platform compliance for a WAV file
    #[command(name = "analyze")]
    Analyze {
        /// Input WAV file
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Render every WAV file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory searched recursively for .wav files
        input_dir: PathBuf,

        /// Directory for rendered files (relative layout is kept)
        output_dir: PathBuf,

        /// Rack JSON (list of modules)
        #[arg(short, long)]
        rack: PathBuf,
    },
}
