//! Transfer engine boundary
//!
//! This module defines the interface between the vault and the opaque
//! transfer engine: the storage contract the engine drives for each file,
//! the registration call the rehydrator issues, and the events and stats
//! the engine reports back. The engine itself (peer wire protocol, piece
//! selection, hashing) lives outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::chunk::ChunkRange;
use crate::store::descriptor::FileEntry;
use crate::store::driver::validate_identity;

/// Per-file store configuration passed by the engine
///
/// Explicit, typed fields; a missing identity is a construction-time
/// failure, not a later null dereference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    /// Identity of the owning transfer
    pub transfer_identity: String,
    /// Index of the file within the transfer's manifest
    pub file_index: u32,
    /// Name of the file, for diagnostics
    pub file_name: String,
    /// Fixed chunk length chosen by the engine
    pub chunk_length: u64,
}

impl StoreRequest {
    /// Create a new store request
    pub fn new(
        transfer_identity: impl Into<String>,
        file_index: u32,
        file_name: impl Into<String>,
        chunk_length: u64,
    ) -> Self {
        Self {
            transfer_identity: transfer_identity.into(),
            file_index,
            file_name: file_name.into(),
            chunk_length,
        }
    }

    /// Validate the request
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_identity(&self.transfer_identity)?;
        if self.file_name.is_empty() {
            return Err(StoreError::invalid_request_with_field(
                "file name must not be empty",
                "file_name",
            ));
        }
        if self.chunk_length == 0 {
            return Err(StoreError::invalid_request_with_field(
                "chunk length must be positive",
                "chunk_length",
            ));
        }
        Ok(())
    }
}

/// Storage contract the engine drives for one (transfer, file) pair
///
/// The engine issues put/get concurrently for many piece indices during
/// download, and sequentially or concurrently during verification. Absent
/// pieces are expected and reported as None, never as errors.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Durably store the chunk for a piece index
    async fn put(&self, index: u32, data: Bytes) -> Result<(), StoreError>;

    /// Read a chunk, or a sub-range of it
    ///
    /// Returns None when the chunk is absent. The default range is the
    /// whole chunk.
    async fn get(&self, index: u32, range: Option<ChunkRange>)
        -> Result<Option<Bytes>, StoreError>;

    /// Signal that the engine is done with this store for now
    ///
    /// The underlying namespace stays valid for reuse.
    async fn close(&self) -> Result<(), StoreError>;

    /// Discard this file's chunks and retire the instance
    async fn destroy(&self) -> Result<(), StoreError>;
}

/// Factory the engine uses to obtain a store per file
///
/// Implemented by the store manager; requesting the same key twice yields
/// the same underlying store.
#[async_trait]
pub trait PieceStoreProvider: Send + Sync {
    /// Open (or reattach to) the store for the requested file
    async fn open_store(&self, request: StoreRequest) -> Result<Arc<dyn PieceStore>, StoreError>;
}

/// Registration handed to the engine for a new or rehydrated transfer
#[derive(Clone)]
pub struct TransferRegistration {
    /// Transfer identity, the join key with descriptors and stores
    pub identity: String,
    /// URI the engine re-adds the transfer from
    pub origin_uri: String,
    /// Human-readable name
    pub display_name: String,
    /// Ordered file manifest
    pub file_manifest: Vec<FileEntry>,
    /// When true the engine trusts stored pieces without a hash pass
    pub skip_verification: bool,
    /// Backing store; None lets the engine fall back to its own default
    pub store: Option<Arc<dyn PieceStoreProvider>>,
}

impl std::fmt::Debug for TransferRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferRegistration")
            .field("identity", &self.identity)
            .field("origin_uri", &self.origin_uri)
            .field("display_name", &self.display_name)
            .field("file_manifest", &self.file_manifest)
            .field("skip_verification", &self.skip_verification)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Native per-transfer statistics reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Engine-native progress (0.0 to 1.0)
    pub progress: f64,
    /// Connected peer count
    pub peers: usize,
    /// Download speed in bytes per second
    pub download_speed: f64,
    /// Upload speed in bytes per second
    pub upload_speed: f64,
}

/// Lifecycle event emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Verification progressed for a transfer (0.0 to 1.0)
    VerifyProgress { identity: String, progress: f64 },
    /// All pieces of a transfer verified
    VerifyComplete { identity: String },
    /// Download progress changed
    DownloadProgress { identity: String, progress: f64 },
    /// Connected peer set changed
    PeersChanged { identity: String, connected: usize },
    /// The engine dropped a transfer
    TransferRemoved { identity: String },
}

impl EngineEvent {
    /// Identity of the transfer the event concerns
    pub fn identity(&self) -> &str {
        match self {
            EngineEvent::VerifyProgress { identity, .. }
            | EngineEvent::VerifyComplete { identity }
            | EngineEvent::DownloadProgress { identity, .. }
            | EngineEvent::PeersChanged { identity, .. }
            | EngineEvent::TransferRemoved { identity } => identity,
        }
    }
}

/// The opaque transfer engine, as seen by this subsystem
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Register a transfer with the engine
    async fn register_transfer(&self, registration: TransferRegistration)
        -> Result<(), StoreError>;

    /// Native stats snapshot for a registered transfer
    async fn transfer_stats(&self, identity: &str) -> Option<TransferStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_request_valid() {
        let request = StoreRequest::new("abc123", 0, "a.bin", 16384);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_store_request_missing_identity() {
        let request = StoreRequest::new("", 0, "a.bin", 16384);
        assert!(matches!(
            request.validate(),
            Err(StoreError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_store_request_missing_file_name() {
        let request = StoreRequest::new("abc123", 0, "", 16384);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_store_request_zero_chunk_length() {
        let request = StoreRequest::new("abc123", 0, "a.bin", 0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_engine_event_identity() {
        let event = EngineEvent::VerifyProgress {
            identity: "abc123".to_string(),
            progress: 0.5,
        };
        assert_eq!(event.identity(), "abc123");

        let event = EngineEvent::TransferRemoved {
            identity: "def456".to_string(),
        };
        assert_eq!(event.identity(), "def456");
    }
}
