//! Vault module
//!
//! The subsystem root. Owns the storage driver, descriptor store, and
//! piece store registry, and exposes the diagnostics surface. When the
//! host offers no usable persistent store the vault opens in volatile
//! mode: every persistence operation becomes a no-op, registrations carry
//! no backing store (the engine falls back to its own in-memory default),
//! and diagnostics report an empty store. That fallback is advertised via
//! `is_persistent`, never a partial failure.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::PieceStoreProvider;
use crate::error::StoreError;
use crate::store::adapter::StoreManager;
use crate::store::descriptor::DescriptorStore;
use crate::store::driver::{StorageDriver, StoredEntry, UsageEstimate};

/// Fully-initialized persistent component stack
#[derive(Debug)]
struct PersistentStack {
    driver: Arc<StorageDriver>,
    descriptors: Arc<DescriptorStore>,
    stores: Arc<StoreManager>,
}

/// Persistent piece vault, or its volatile fallback
#[derive(Debug)]
pub struct Vault {
    stack: Option<PersistentStack>,
}

impl Vault {
    /// Open the vault at the given storage root
    ///
    /// Never fails: an unusable root degrades to volatile mode.
    pub async fn open(root: PathBuf) -> Self {
        match StorageDriver::initialize(root).await {
            Ok(driver) => {
                let driver = Arc::new(driver);
                let descriptors = Arc::new(DescriptorStore::new(driver.clone()));
                let stores = Arc::new(StoreManager::new(driver.clone()));
                info!("Vault opened with persistent storage");
                Self {
                    stack: Some(PersistentStack {
                        driver,
                        descriptors,
                        stores,
                    }),
                }
            }
            Err(e) => {
                warn!("Persistent storage unavailable, running volatile: {}", e);
                Self { stack: None }
            }
        }
    }

    /// Whether durable storage is available
    pub fn is_persistent(&self) -> bool {
        self.stack.is_some()
    }

    /// Descriptor store, when persistent
    pub fn descriptors(&self) -> Option<Arc<DescriptorStore>> {
        self.stack.as_ref().map(|s| s.descriptors.clone())
    }

    /// Piece store registry, when persistent
    pub fn stores(&self) -> Option<Arc<StoreManager>> {
        self.stack.as_ref().map(|s| s.stores.clone())
    }

    /// Store factory handed to the engine; None lets the engine use its
    /// own default storage
    pub fn store_provider(&self) -> Option<Arc<dyn PieceStoreProvider>> {
        self.stack
            .as_ref()
            .map(|s| s.stores.clone() as Arc<dyn PieceStoreProvider>)
    }

    /// Storage usage estimate
    pub async fn usage(&self) -> Option<UsageEstimate> {
        match &self.stack {
            Some(stack) => stack.driver.usage_estimate().await,
            None => None,
        }
    }

    /// Recursive listing of every stored entry
    pub async fn list_entries(&self) -> Vec<StoredEntry> {
        match &self.stack {
            Some(stack) => stack.driver.list_all().await,
            None => Vec::new(),
        }
    }

    /// Delete all descriptors and all chunk namespaces
    ///
    /// Live piece store instances are retired first so the engine cannot
    /// write into namespaces being removed; afterwards the store is
    /// re-initialized and ready for new writes.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let stack = match &self.stack {
            Some(stack) => stack,
            None => return Ok(()),
        };
        stack.stores.clear().await;
        stack.driver.clear_all().await
    }
}
