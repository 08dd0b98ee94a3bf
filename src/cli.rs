//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Preprocesses SIPs before preservation: format validation, bagging and
/// PREMIS metadata.
#[derive(Debug, Parser)]
#[command(name = "preprocessing", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./preprocessing.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of the coloured summary.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Preprocess the SIP at RELATIVE_PATH under the shared directory.
    Run {
        relative_path: String,
    },

    /// Summarise an existing PREMIS document.
    Inspect {
        premis_file: PathBuf,
    },
}
