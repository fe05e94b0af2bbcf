//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// updraft - over-the-air application update client
#[derive(Parser)]
#[command(name = "updraft")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Over-the-air application update client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH", env = "UPDRAFT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Ask the deployment server whether an update is available
    Check,

    /// Check, download, verify and install the latest update
    Sync {
        /// Apply the update right away instead of on the next launch
        #[arg(long, conflicts_with = "on_resume")]
        immediate: bool,

        /// Apply the update when the app next returns to the foreground
        #[arg(long = "on-resume")]
        on_resume: bool,

        /// Override the configured deployment key for this sync
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
    },

    /// Confirm the current package booted correctly
    Ready,

    /// Roll back to the previous package
    Rollback,

    /// Remove all installed packages and durable flags
    Clear,

    /// Build a release bundle archive from a directory and print its hash
    Pack {
        /// Directory with the bundle contents
        dir: PathBuf,

        /// Archive file to write (default: bundle.tar)
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}
