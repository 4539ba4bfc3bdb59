use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "seedscan",
    version,
    about = "Measure seed dimensions from millimeter-grid photographs"
)]
pub struct Cli {
    /// Path to a TOML processing configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis pipeline and print the result as JSON
    Analyze {
        /// Image of seeds on millimeter grid paper
        image: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Check grid detection only and print the calibration as JSON
    Calibrate {
        /// Image of millimeter grid paper
        image: PathBuf,
    },
    /// Print the default processing configuration as TOML
    DefaultConfig,
}
