//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the vault diagnostics tool
#[derive(Debug, Parser)]
#[command(name = "torrent-vault")]
#[command(about = "Storage diagnostics for the persistent piece vault", long_about = None)]
pub struct CliArgs {
    /// Storage root directory
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Show a storage usage estimate
    #[arg(long)]
    pub usage: bool,

    /// List every stored entry with its size
    #[arg(long)]
    pub list: bool,

    /// Show persisted transfer descriptors
    #[arg(long)]
    pub transfers: bool,

    /// Delete all descriptors and chunk data
    #[arg(long)]
    pub clear: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
