//! # Cutflow CLI Module
//!
//! This module implements the CLI interface for the cutflow driver.
//!
//! ## Available Commands
//!
//! - `run` - Run a configured selection over a JSON batch
//! - `show` - Print the cutflow and snapshots of a run output
//! - `merge` - Sum the cutflows of several run outputs
//! - `hash` - Print snapshot fingerprints of a run output

mod commands;

use clap::{Parser, Subcommand};
use cutflow_core::CutflowError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Cutflow - event selection driver
///
/// Applies an ordered, branching set of named cuts to a batch of events,
/// captures snapshots and records weighted cutflows.
#[derive(Parser, Debug)]
#[command(name = "cutflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (debug-level engine logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a selection over a batch
    Run {
        /// Path to the JSON event batch
        #[arg(short, long)]
        batch: PathBuf,

        /// Path to the TOML selection config
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for the binary run output
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the cutflow of a run output
    Show {
        /// Run output file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Merge the cutflows of several run outputs
    Merge {
        /// Run output files (repeat the flag)
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,
    },

    /// Print snapshot fingerprints (checksum and BLAKE3)
    Hash {
        /// Run output file
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), CutflowError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Run {
            batch,
            config,
            output,
        } => cmd_run(&batch, &config, &output, json_mode),
        Commands::Show { input } => cmd_show(&input, json_mode),
        Commands::Merge { input } => cmd_merge(&input, json_mode),
        Commands::Hash { input } => cmd_hash(&input, json_mode),
    }
}
