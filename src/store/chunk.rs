//! Chunk naming module
//!
//! Owns the deterministic mapping from piece index to entry name and the
//! validated byte range used when reading a stored chunk. Every component
//! that touches chunk entries goes through these helpers so the naming
//! convention stays stable across the crate.

use serde::{Deserialize, Serialize};

/// Prefix shared by every chunk entry
const CHUNK_PREFIX: &str = "chunk-";

/// Build the entry name for a chunk
///
/// Chunks of all files in a transfer share one namespace, so the file
/// index is part of the name.
pub fn chunk_entry_name(file_index: u32, piece_index: u32) -> String {
    format!("{}{}-{}", CHUNK_PREFIX, file_index, piece_index)
}

/// Prefix matching every chunk entry of one file within the namespace
pub fn file_chunk_prefix(file_index: u32) -> String {
    format!("{}{}-", CHUNK_PREFIX, file_index)
}

/// Parse an entry name back into (file_index, piece_index)
///
/// Returns None for entries that do not follow the chunk convention,
/// which is how non-chunk entries are skipped during purges.
pub fn parse_chunk_name(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix(CHUNK_PREFIX)?;
    let (file_part, piece_part) = rest.split_once('-')?;
    let file_index = file_part.parse().ok()?;
    let piece_index = piece_part.parse().ok()?;
    Some((file_index, piece_index))
}

/// Byte range within a stored chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// Offset from the start of the chunk
    pub offset: u64,
    /// Number of bytes to read
    pub length: u64,
}

impl ChunkRange {
    /// Create a new chunk range
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Check whether the range fits inside a chunk of the given length
    pub fn fits(&self, chunk_len: u64) -> bool {
        self.offset
            .checked_add(self.length)
            .map(|end| end <= chunk_len)
            .unwrap_or(false)
    }

    /// End offset of the range (exclusive), saturating on overflow
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}
