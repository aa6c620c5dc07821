//! Status display module
//!
//! Handles formatting and printing diagnostics reports in the CLI.

use std::io;

use crate::store::descriptor::TransferDescriptor;
use crate::store::driver::{EntryKind, StoredEntry, UsageEstimate};

/// Console display for diagnostics output
pub struct StatusDisplay {
    /// Quiet mode (no output except errors)
    quiet: bool,
}

impl StatusDisplay {
    /// Create a new status display
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Print a storage usage report
    pub fn print_usage(&self, usage: Option<UsageEstimate>) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("Storage Usage:");
        match usage {
            Some(usage) => {
                println!("  Used: {}", Self::format_bytes(usage.used_bytes));
                match usage.quota_bytes {
                    Some(quota) => println!("  Quota: {}", Self::format_bytes(quota)),
                    None => println!("  Quota: not reported"),
                }
            }
            None => {
                println!("  Not available");
            }
        }
        println!();

        Ok(())
    }

    /// Print the recursive entry listing
    pub fn print_entries(&self, entries: &[StoredEntry]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("Stored Entries:");
        if entries.is_empty() {
            println!("  (empty)");
        }
        for entry in entries {
            match entry.kind {
                EntryKind::Directory => println!("  {}/", entry.path),
                EntryKind::File => {
                    println!("  {} ({})", entry.path, Self::format_bytes(entry.size))
                }
            }
        }
        println!();

        Ok(())
    }

    /// Print persisted transfer descriptors
    pub fn print_transfers(&self, descriptors: &[TransferDescriptor]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("Persisted Transfers:");
        if descriptors.is_empty() {
            println!("  (none)");
        }
        for descriptor in descriptors {
            println!(
                "  {} \"{}\" {} files={} {}{}",
                descriptor.identity,
                descriptor.display_name,
                Self::format_bytes(descriptor.total_length),
                descriptor.file_manifest.len(),
                if descriptor.is_locally_originated {
                    "seeded"
                } else {
                    "downloaded"
                },
                if descriptor.is_verified {
                    " verified"
                } else {
                    ""
                },
            );
        }
        println!();

        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("Error: {}", message);
        Ok(())
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
