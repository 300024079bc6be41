//! # cutflow
//!
//! Driver library for the cutflow engine: CLI commands, TOML selection
//! configuration and the config-driven selection hooks.

pub mod cli;
pub mod config;
pub mod pipeline;

pub use config::SelectionConfig;
pub use pipeline::{ConfiguredSelection, LinearScale, run_selection};
