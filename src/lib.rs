//! torrent-vault
//!
//! Persistent piece storage and session rehydration for sandboxed
//! BitTorrent clients: durable chunk storage behind the engine's store
//! contract, JSON transfer descriptors, and startup rehydration that
//! reconciles engine re-verification with recorded status.

pub mod cli;
pub mod engine;
pub mod error;
pub mod session;
pub mod store;
pub mod vault;

pub use error::StoreError;

pub use engine::{
    EngineEvent, PieceStore, PieceStoreProvider, StoreRequest, TransferEngine,
    TransferRegistration, TransferStats,
};

pub use store::{
    ChunkRange, DescriptorStore, EntryKind, FileEntry, PieceStoreAdapter, StorageDriver,
    StoreManager, StoredEntry, TransferDescriptor, UsageEstimate,
};

pub use session::{ProgressOverrides, RehydrationReport, SessionRehydrator, TransferSnapshot};

pub use vault::Vault;

pub use cli::{CliArgs, Config, StatusDisplay};
