//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Jobflow - run pipelines of external programs
#[derive(Debug, Parser)]
#[command(name = "jobflow", author, version, about = "Run pipelines of external programs and inspect their history", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the jobs of a pipeline file, in order
    Run {
        /// Pipeline definition (YAML)
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,

        /// Output directory (created if absent)
        #[arg(value_name = "OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Spawn each program, then stop without running it
        #[arg(long)]
        dry_run: bool,

        /// Do not show the live progress line
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the job history saved in an output directory
    Show {
        /// Output directory or state file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Job numbers (1-based) to show in detail
        #[arg(value_name = "N")]
        jobs: Vec<usize>,
    },
}
