//! Storage module
//!
//! Durable directory driver, descriptor persistence, and the per-file
//! piece store adapters with their process-wide registry.

pub mod adapter;
pub mod chunk;
pub mod descriptor;
pub mod driver;

// Re-export adapter types
pub use adapter::{PieceStoreAdapter, StoreKey, StoreManager};

// Re-export chunk naming types
pub use chunk::{chunk_entry_name, file_chunk_prefix, parse_chunk_name, ChunkRange};

// Re-export descriptor types
pub use descriptor::{DescriptorStore, FileEntry, TransferDescriptor};

// Re-export driver types
pub use driver::{EntryKind, NamespaceHandle, StorageDriver, StoredEntry, UsageEstimate};
