//! Piece store adapter module
//!
//! Bridges the engine's per-file storage contract to the durable directory
//! driver. A process-wide registry guarantees at most one live adapter per
//! (transfer identity, file index) pair, and a memoized initialization task
//! guarantees no operation ever observes a partially-initialized namespace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, trace, warn};

use crate::engine::{PieceStore, PieceStoreProvider, StoreRequest};
use crate::error::StoreError;
use crate::store::chunk::{chunk_entry_name, file_chunk_prefix, ChunkRange};
use crate::store::driver::{NamespaceHandle, StorageDriver};

/// Registry key: (transfer identity, file index)
pub type StoreKey = (String, u32);

/// Shared registry map
type Registry = Arc<Mutex<HashMap<StoreKey, Arc<PieceStoreAdapter>>>>;

/// Piece store for one (transfer, file) pair
///
/// Lifecycle: Constructed -> Initializing -> Ready -> Destroyed. Operations
/// issued while initializing await the one in-flight initialization;
/// operations issued after destroy fail with `StoreDestroyed`.
pub struct PieceStoreAdapter {
    /// Configuration the engine opened this store with
    request: StoreRequest,
    /// Durable store driver
    driver: Arc<StorageDriver>,
    /// Registry this instance lives in, for removal on destroy
    registry: Registry,
    /// Memoized namespace acquisition
    namespace: OnceCell<NamespaceHandle>,
    /// Set once destroy() has run
    destroyed: AtomicBool,
}

impl std::fmt::Debug for PieceStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceStoreAdapter")
            .field("request", &self.request)
            .field("ready", &self.namespace.initialized())
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PieceStoreAdapter {
    fn new(request: StoreRequest, driver: Arc<StorageDriver>, registry: Registry) -> Self {
        Self {
            request,
            driver,
            registry,
            namespace: OnceCell::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The request this store was opened with
    pub fn request(&self) -> &StoreRequest {
        &self.request
    }

    /// Registry key of this instance
    fn key(&self) -> StoreKey {
        (
            self.request.transfer_identity.clone(),
            self.request.file_index,
        )
    }

    /// Whether destroy() has run
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Await the memoized namespace initialization
    ///
    /// Every operation funnels through here; concurrent callers share the
    /// single in-flight acquisition. A failed acquisition is not cached,
    /// so a later call may retry.
    async fn namespace(&self) -> Result<&NamespaceHandle, StoreError> {
        self.namespace
            .get_or_try_init(|| async {
                debug!(
                    "Initializing piece store for transfer {} file {}",
                    self.request.transfer_identity, self.request.file_index
                );
                self.driver
                    .create_namespace(&self.request.transfer_identity)
                    .await
            })
            .await
    }

    fn guard_destroyed(&self) -> Result<(), StoreError> {
        if self.is_destroyed() {
            return Err(StoreError::store_destroyed(
                self.request.transfer_identity.clone(),
                self.request.file_index,
            ));
        }
        Ok(())
    }

    /// Retire this instance: drop it from the registry, then sweep its
    /// chunk entries out of the transfer namespace.
    async fn destroy_inner(&self) -> Result<(), StoreError> {
        {
            let mut stores = self.registry.lock().await;
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            stores.remove(&self.key());
        }
        info!(
            "Destroying piece store for transfer {} file {}",
            self.request.transfer_identity, self.request.file_index
        );

        // Chunks may predate this instance, so the namespace is acquired
        // even if no operation ran yet.
        let namespace = match self.namespace().await {
            Ok(namespace) => namespace,
            Err(e) => {
                warn!(
                    "Skipping chunk sweep for transfer {} file {}: {}",
                    self.request.transfer_identity, self.request.file_index, e
                );
                return Ok(());
            }
        };

        let names = match self.driver.list_namespace(namespace).await {
            Ok(names) => names,
            Err(e) => {
                warn!(
                    "Cannot enumerate chunks for transfer {} file {}: {}",
                    self.request.transfer_identity, self.request.file_index, e
                );
                return Ok(());
            }
        };

        // Only this file's chunks; other files and non-chunk entries in the
        // transfer namespace are left alone.
        let prefix = file_chunk_prefix(self.request.file_index);
        let mut removed = 0usize;
        for name in names {
            if name.starts_with(&prefix) {
                self.driver.delete(namespace, &name).await;
                removed += 1;
            }
        }
        debug!(
            "Swept {} chunk entries for transfer {} file {}",
            removed, self.request.transfer_identity, self.request.file_index
        );
        Ok(())
    }
}

#[async_trait]
impl PieceStore for PieceStoreAdapter {
    async fn put(&self, index: u32, data: Bytes) -> Result<(), StoreError> {
        self.guard_destroyed()?;
        let namespace = self.namespace().await?;
        let name = chunk_entry_name(self.request.file_index, index);
        trace!(
            "Putting chunk {} ({} bytes) for transfer {}",
            name,
            data.len(),
            self.request.transfer_identity
        );
        self.driver
            .write(namespace, &name, &data)
            .await
            .map_err(|e| StoreError::chunk_write_failed_with_source(index, e.to_string()))
    }

    async fn get(
        &self,
        index: u32,
        range: Option<ChunkRange>,
    ) -> Result<Option<Bytes>, StoreError> {
        self.guard_destroyed()?;
        let namespace = self.namespace().await?;
        let name = chunk_entry_name(self.request.file_index, index);

        // Unreadable chunks are reported as absent so the engine's retry
        // logic stays on a single "no usable data" path.
        let data = match self.driver.read(namespace, &name).await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Treating unreadable chunk {} as absent: {}", name, e);
                return Ok(None);
            }
        };
        if data.is_empty() {
            debug!("Treating zero-length chunk {} as absent", name);
            return Ok(None);
        }

        match range {
            None => Ok(Some(data)),
            Some(range) => {
                if !range.fits(data.len() as u64) {
                    warn!(
                        "Range {}..{} exceeds chunk {} length {}",
                        range.offset,
                        range.end(),
                        name,
                        data.len()
                    );
                    return Ok(None);
                }
                let start = range.offset as usize;
                let end = range.end() as usize;
                Ok(Some(data.slice(start..end)))
            }
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        trace!(
            "Closing piece store for transfer {} file {}",
            self.request.transfer_identity,
            self.request.file_index
        );
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        self.destroy_inner().await
    }
}

/// Process-wide piece store registry
///
/// The one piece of shared mutable state in the subsystem. Lookups and
/// mutations go through a single lock, so no two concurrent opens for the
/// same key can both believe they are the first.
#[derive(Debug)]
pub struct StoreManager {
    driver: Arc<StorageDriver>,
    stores: Registry,
}

impl StoreManager {
    /// Create a store manager over the given driver
    pub fn new(driver: Arc<StorageDriver>) -> Self {
        Self {
            driver,
            stores: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the piece store for a (transfer, file) pair
    ///
    /// Returns the existing instance unchanged when one is registered for
    /// the key; otherwise constructs one and triggers its initialization.
    /// Concurrent opens for the same key observe a single instance and a
    /// single initialization.
    pub async fn open(&self, request: StoreRequest) -> Result<Arc<PieceStoreAdapter>, StoreError> {
        request.validate()?;
        let key = (request.transfer_identity.clone(), request.file_index);

        let adapter = {
            let mut stores = self.stores.lock().await;
            if let Some(existing) = stores.get(&key) {
                trace!(
                    "Reusing piece store for transfer {} file {}",
                    key.0,
                    key.1
                );
                existing.clone()
            } else {
                let adapter = Arc::new(PieceStoreAdapter::new(
                    request,
                    self.driver.clone(),
                    self.stores.clone(),
                ));
                stores.insert(key, adapter.clone());
                adapter
            }
        };

        adapter.namespace().await?;
        Ok(adapter)
    }

    /// Number of live adapters in the registry
    pub async fn open_count(&self) -> usize {
        self.stores.lock().await.len()
    }

    /// Drop every adapter belonging to a transfer and remove its chunk
    /// namespace
    ///
    /// This is the transfer-level deletion; per-file `destroy()` sweeps
    /// only its own chunks.
    pub async fn destroy_transfer(&self, identity: &str) {
        let removed: Vec<Arc<PieceStoreAdapter>> = {
            let mut stores = self.stores.lock().await;
            let keys: Vec<StoreKey> = stores
                .keys()
                .filter(|(id, _)| id.as_str() == identity)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| stores.remove(k)).collect()
        };
        for adapter in &removed {
            adapter.destroyed.store(true, Ordering::SeqCst);
        }
        debug!(
            "Retired {} piece stores for transfer {}",
            removed.len(),
            identity
        );
        self.driver.delete_namespace(identity).await;
    }

    /// Retire every adapter in the registry
    pub async fn clear(&self) {
        let mut stores = self.stores.lock().await;
        for adapter in stores.values() {
            adapter.destroyed.store(true, Ordering::SeqCst);
        }
        let count = stores.len();
        stores.clear();
        info!("Cleared piece store registry ({} instances)", count);
    }
}

#[async_trait]
impl PieceStoreProvider for StoreManager {
    async fn open_store(&self, request: StoreRequest) -> Result<Arc<dyn PieceStore>, StoreError> {
        let adapter = self.open(request).await?;
        Ok(adapter as Arc<dyn PieceStore>)
    }
}
