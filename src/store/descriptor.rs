//! Descriptor store module
//!
//! Persists one JSON descriptor per transfer under the `descriptors/`
//! namespace, independent from chunk data. Re-putting a descriptor is how
//! verification-state transitions are made durable.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::StoreError;
use crate::store::driver::{validate_identity, StorageDriver};

/// One file within a transfer's manifest
///
/// Order is significant and must match the engine's own file ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File name
    pub name: String,
    /// File length in bytes
    pub length: u64,
    /// Path relative to the transfer root
    pub relative_path: String,
}

impl FileEntry {
    /// Create a new manifest entry
    pub fn new(
        name: impl Into<String>,
        length: u64,
        relative_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            length,
            relative_path: relative_path.into(),
        }
    }
}

/// Durable metadata record describing one transfer
///
/// The identity is immutable and is the sole join key between the
/// descriptor store, the piece store registry, and the transfer engine.
/// Unknown JSON fields are tolerated on read and carried through rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDescriptor {
    /// Opaque stable identity, unique per transfer
    pub identity: String,
    /// Human-readable name
    pub display_name: String,
    /// URI sufficient to re-add the transfer to the engine
    pub origin_uri: String,
    /// Total content length in bytes
    pub total_length: u64,
    /// Ordered file manifest
    pub file_manifest: Vec<FileEntry>,
    /// Creation timestamp, unix milliseconds
    pub created_at: u64,
    /// True when the content was supplied locally rather than downloaded
    pub is_locally_originated: bool,
    /// True once the engine confirmed on-disk pieces match the manifest
    pub is_verified: bool,
    /// Fields written by other versions, preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Current time in unix milliseconds
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl TransferDescriptor {
    /// Create a new descriptor
    ///
    /// Validates the identity (it becomes a namespace name) and the origin
    /// URI (it must be parseable to be re-added to the engine later).
    pub fn new(
        identity: impl Into<String>,
        display_name: impl Into<String>,
        origin_uri: impl Into<String>,
        total_length: u64,
        file_manifest: Vec<FileEntry>,
        is_locally_originated: bool,
    ) -> Result<Self, StoreError> {
        let identity = identity.into();
        validate_identity(&identity)?;

        let origin_uri = origin_uri.into();
        Url::parse(&origin_uri).map_err(|e| {
            StoreError::invalid_request_with_field(
                format!("origin URI is not parseable: {}", e),
                "origin_uri",
            )
        })?;

        Ok(Self {
            identity,
            display_name: display_name.into(),
            origin_uri,
            total_length,
            file_manifest,
            created_at: now_millis(),
            is_locally_originated,
            is_verified: false,
            extra: serde_json::Map::new(),
        })
    }

    /// Whether the engine must re-verify this transfer's pieces on restart
    ///
    /// Downloaded transfers are trusted once recorded; locally-originated
    /// content is only trusted after a completed verification pass.
    pub fn needs_verification(&self) -> bool {
        self.is_locally_originated && !self.is_verified
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| {
            StoreError::malformed_descriptor_with_source(self.identity.clone(), e.to_string())
        })
    }

    /// Deserialize from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(data)
            .map_err(|e| StoreError::malformed_descriptor_with_source("unknown", e.to_string()))
    }
}

/// Store for transfer descriptors
#[derive(Debug)]
pub struct DescriptorStore {
    driver: Arc<StorageDriver>,
}

impl DescriptorStore {
    /// Create a descriptor store backed by the given driver
    pub fn new(driver: Arc<StorageDriver>) -> Self {
        Self { driver }
    }

    /// Entry name for a transfer's descriptor
    fn entry_name(identity: &str) -> String {
        format!("{}.json", identity)
    }

    /// Persist a descriptor, overwriting any prior record for the identity
    pub async fn put(&self, descriptor: &TransferDescriptor) -> Result<(), StoreError> {
        validate_identity(&descriptor.identity)?;
        let data = descriptor.serialize()?;
        let namespace = self.driver.descriptor_namespace();
        self.driver
            .write(&namespace, &Self::entry_name(&descriptor.identity), &data)
            .await?;
        debug!("Persisted descriptor for transfer {}", descriptor.identity);
        Ok(())
    }

    /// Load one descriptor, treating malformed records as absent
    pub async fn get(&self, identity: &str) -> Result<Option<TransferDescriptor>, StoreError> {
        let namespace = self.driver.descriptor_namespace();
        let data = match self
            .driver
            .read(&namespace, &Self::entry_name(identity))
            .await?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        match TransferDescriptor::deserialize(&data) {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(e) => {
                warn!("Ignoring malformed descriptor for '{}': {}", identity, e);
                Ok(None)
            }
        }
    }

    /// Load all valid descriptors, newest first
    ///
    /// Malformed entries are skipped individually so one bad record never
    /// hides the rest.
    pub async fn get_all(&self) -> Result<Vec<TransferDescriptor>, StoreError> {
        let namespace = self.driver.descriptor_namespace();
        let names = self.driver.list_namespace(&namespace).await?;

        let mut descriptors = Vec::new();
        for name in names {
            if !name.ends_with(".json") {
                continue;
            }
            let data = match self.driver.read(&namespace, &name).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable descriptor '{}': {}", name, e);
                    continue;
                }
            };
            match TransferDescriptor::deserialize(&data) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    warn!("Skipping malformed descriptor '{}': {}", name, e);
                }
            }
        }

        descriptors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!("Loaded {} descriptors", descriptors.len());
        Ok(descriptors)
    }

    /// Best-effort removal of a descriptor
    pub async fn delete(&self, identity: &str) {
        let namespace = self.driver.descriptor_namespace();
        self.driver
            .delete(&namespace, &Self::entry_name(identity))
            .await;
        info!("Deleted descriptor for transfer {}", identity);
    }
}
