//! CLI configuration module
//!
//! Manages configuration for the diagnostics tool.

use crate::cli::args::CliArgs;
use anyhow::Result;
use std::path::PathBuf;

/// Configuration for a diagnostics run
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage root directory
    pub root: PathBuf,
    /// Show a usage estimate
    pub show_usage: bool,
    /// List stored entries
    pub show_list: bool,
    /// Show persisted descriptors
    pub show_transfers: bool,
    /// Clear all stored data
    pub clear: bool,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let root = args
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("./vault"));

        Self {
            root,
            show_usage: args.usage,
            show_list: args.list,
            show_transfers: args.transfers,
            clear: args.clear,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("root cannot be empty"));
        }

        if !self.has_action() {
            return Err(anyhow::anyhow!(
                "nothing to do: pass --usage, --list, --transfers or --clear"
            ));
        }

        Ok(())
    }

    /// Whether any action was requested
    pub fn has_action(&self) -> bool {
        self.show_usage || self.show_list || self.show_transfers || self.clear
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
