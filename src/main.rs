//! torrent-vault - Main entry point
//!
//! Diagnostics tool for the persistent piece vault: inspect usage, list
//! stored entries, show persisted transfers, or clear everything.

use anyhow::{Context, Result};
use torrent_vault::{CliArgs, Config, StatusDisplay, Vault};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse_args();

    // Initialize logging
    init_logging(&args);
    info!("torrent-vault starting");
    debug!("CLI arguments: {:?}", args);

    // Create configuration
    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let display = StatusDisplay::new(config.is_quiet());

    // Open the vault; an unusable root degrades to volatile mode
    let vault = Vault::open(config.root.clone()).await;
    if !vault.is_persistent() {
        display.print_status(&format!(
            "Storage root '{}' is not usable; reporting volatile state",
            config.root.display()
        ))?;
    }

    if config.show_usage {
        let usage = vault.usage().await;
        display.print_usage(usage)?;
    }

    if config.show_transfers {
        let descriptors = match vault.descriptors() {
            Some(store) => store
                .get_all()
                .await
                .context("Failed to load transfer descriptors")?,
            None => Vec::new(),
        };
        display.print_transfers(&descriptors)?;
    }

    if config.show_list {
        let entries = vault.list_entries().await;
        display.print_entries(&entries)?;
    }

    if config.clear {
        vault.clear_all().await.context("Failed to clear storage")?;
        display.print_status("Storage cleared")?;
    }

    info!("torrent-vault finished");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}
