//! Error types for the piece vault
//!
//! This module defines the error taxonomy for the persistent piece store
//! and session rehydration subsystem.

use std::fmt;

/// Comprehensive error type for vault operations
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The host environment offers no usable persistent store
    UnsupportedStorage {
        message: String,
        path: Option<String>,
    },

    /// Writing an entry to the durable store failed
    WriteFailed {
        entry: String,
        source: Option<String>,
    },

    /// Reading an entry from the durable store failed
    ReadFailed {
        entry: String,
        source: Option<String>,
    },

    /// Writing a chunk for a specific piece index failed
    ChunkWriteFailed {
        index: u32,
        source: Option<String>,
    },

    /// An operation was issued against a destroyed piece store
    StoreDestroyed {
        identity: String,
        file_index: u32,
    },

    /// A stored descriptor could not be decoded
    MalformedDescriptor {
        identity: String,
        source: Option<String>,
    },

    /// A request or descriptor failed construction-time validation
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    /// The transfer engine rejected an operation
    EngineRejected {
        message: String,
        identity: Option<String>,
    },
}

impl StoreError {
    /// Create a new UnsupportedStorage error
    pub fn unsupported_storage(message: impl Into<String>) -> Self {
        StoreError::UnsupportedStorage {
            message: message.into(),
            path: None,
        }
    }

    /// Create a new UnsupportedStorage error with the probed path
    pub fn unsupported_storage_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        StoreError::UnsupportedStorage {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a new WriteFailed error
    pub fn write_failed(entry: impl Into<String>) -> Self {
        StoreError::WriteFailed {
            entry: entry.into(),
            source: None,
        }
    }

    /// Create a new WriteFailed error with source
    pub fn write_failed_with_source(entry: impl Into<String>, source: impl Into<String>) -> Self {
        StoreError::WriteFailed {
            entry: entry.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ReadFailed error
    pub fn read_failed(entry: impl Into<String>) -> Self {
        StoreError::ReadFailed {
            entry: entry.into(),
            source: None,
        }
    }

    /// Create a new ReadFailed error with source
    pub fn read_failed_with_source(entry: impl Into<String>, source: impl Into<String>) -> Self {
        StoreError::ReadFailed {
            entry: entry.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ChunkWriteFailed error
    pub fn chunk_write_failed(index: u32) -> Self {
        StoreError::ChunkWriteFailed {
            index,
            source: None,
        }
    }

    /// Create a new ChunkWriteFailed error with source
    pub fn chunk_write_failed_with_source(index: u32, source: impl Into<String>) -> Self {
        StoreError::ChunkWriteFailed {
            index,
            source: Some(source.into()),
        }
    }

    /// Create a new StoreDestroyed error
    pub fn store_destroyed(identity: impl Into<String>, file_index: u32) -> Self {
        StoreError::StoreDestroyed {
            identity: identity.into(),
            file_index,
        }
    }

    /// Create a new MalformedDescriptor error
    pub fn malformed_descriptor(identity: impl Into<String>) -> Self {
        StoreError::MalformedDescriptor {
            identity: identity.into(),
            source: None,
        }
    }

    /// Create a new MalformedDescriptor error with source
    pub fn malformed_descriptor_with_source(
        identity: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        StoreError::MalformedDescriptor {
            identity: identity.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        StoreError::InvalidRequest {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new InvalidRequest error with field
    pub fn invalid_request_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        StoreError::InvalidRequest {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new EngineRejected error
    pub fn engine_rejected(message: impl Into<String>) -> Self {
        StoreError::EngineRejected {
            message: message.into(),
            identity: None,
        }
    }

    /// Create a new EngineRejected error with the transfer identity
    pub fn engine_rejected_for(message: impl Into<String>, identity: impl Into<String>) -> Self {
        StoreError::EngineRejected {
            message: message.into(),
            identity: Some(identity.into()),
        }
    }

    /// Whether this error indicates the host cannot persist at all
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::UnsupportedStorage { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnsupportedStorage { message, path } => {
                if let Some(p) = path {
                    write!(f, "Unsupported storage: {} (path: {})", message, p)
                } else {
                    write!(f, "Unsupported storage: {}", message)
                }
            }
            StoreError::WriteFailed { entry, source } => {
                if let Some(src) = source {
                    write!(f, "Write failed: {} (source: {})", entry, src)
                } else {
                    write!(f, "Write failed: {}", entry)
                }
            }
            StoreError::ReadFailed { entry, source } => {
                if let Some(src) = source {
                    write!(f, "Read failed: {} (source: {})", entry, src)
                } else {
                    write!(f, "Read failed: {}", entry)
                }
            }
            StoreError::ChunkWriteFailed { index, source } => {
                if let Some(src) = source {
                    write!(f, "Chunk write failed: piece {} (source: {})", index, src)
                } else {
                    write!(f, "Chunk write failed: piece {}", index)
                }
            }
            StoreError::StoreDestroyed {
                identity,
                file_index,
            } => {
                write!(
                    f,
                    "Store destroyed: transfer {} file {}",
                    identity, file_index
                )
            }
            StoreError::MalformedDescriptor { identity, source } => {
                if let Some(src) = source {
                    write!(
                        f,
                        "Malformed descriptor: {} (source: {})",
                        identity, src
                    )
                } else {
                    write!(f, "Malformed descriptor: {}", identity)
                }
            }
            StoreError::InvalidRequest { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Invalid request: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Invalid request: {}", message)
                }
            }
            StoreError::EngineRejected { message, identity } => {
                if let Some(id) = identity {
                    write!(f, "Engine rejected: {} (transfer: {})", message, id)
                } else {
                    write!(f, "Engine rejected: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::malformed_descriptor_with_source("unknown", err.to_string())
    }
}
