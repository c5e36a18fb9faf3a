//! CLI command handlers

use clap::Subcommand;

pub mod configure;
pub mod diagnostics;
pub mod root;

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a configuration file, then exit
    CheckConfig,
    /// Run diagnostics and display system/runtime information
    Diagnostics,
}
