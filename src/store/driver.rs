//! Storage driver module
//!
//! Thin facade over the sandboxed hierarchical file store. The driver owns
//! the storage root and its two top-level namespaces (`chunks/` for piece
//! data, `descriptors/` for transfer metadata) and performs all durable
//! I/O on behalf of the higher layers.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, error, info, trace, warn};

use crate::error::StoreError;

/// Top-level namespace holding chunk data, one subdirectory per transfer
const CHUNKS_DIR: &str = "chunks";

/// Top-level namespace holding transfer descriptors
const DESCRIPTORS_DIR: &str = "descriptors";

/// Entry written and removed during initialization to prove the root is usable
const PROBE_ENTRY: &str = ".probe";

/// Handle to one namespace within the store
///
/// Handles are created by the driver and owned by exactly one consumer;
/// they are never shared across piece store instances.
#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    /// Namespace name (transfer identity, or a top-level namespace name)
    name: String,
    /// Absolute directory backing the namespace
    path: PathBuf,
}

impl NamespaceHandle {
    /// Namespace name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing directory path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Kind of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry in a recursive listing of the store
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Path relative to the storage root, `/`-separated
    pub path: String,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// Storage usage report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEstimate {
    /// Bytes currently stored under the root
    pub used_bytes: u64,
    /// Quota granted by the host, if it reports one
    pub quota_bytes: Option<u64>,
}

/// Driver for the sandboxed directory store
#[derive(Debug)]
pub struct StorageDriver {
    /// Storage root
    root: PathBuf,
    /// `chunks/` directory
    chunks_dir: PathBuf,
    /// `descriptors/` directory
    descriptors_dir: PathBuf,
}

/// Validate a transfer identity for use as a namespace name
///
/// Identities are opaque strings, but they become directory names, so
/// anything that would escape the namespace is rejected up front.
pub(crate) fn validate_identity(identity: &str) -> Result<(), StoreError> {
    if identity.is_empty() {
        return Err(StoreError::invalid_request_with_field(
            "identity must not be empty",
            "identity",
        ));
    }
    if identity == "." || identity == ".." {
        return Err(StoreError::invalid_request_with_field(
            "identity must not be a directory reference",
            "identity",
        ));
    }
    if identity
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0')
    {
        return Err(StoreError::invalid_request_with_field(
            "identity must not contain path separators",
            "identity",
        ));
    }
    Ok(())
}

impl StorageDriver {
    /// Initialize the driver at the given storage root
    ///
    /// Probes the root for writability and creates the two top-level
    /// namespaces. A host that cannot provide a writable hierarchical
    /// store surfaces as `UnsupportedStorage`.
    pub async fn initialize(root: PathBuf) -> Result<Self, StoreError> {
        info!("Initializing storage driver at {}", root.display());

        fs::create_dir_all(&root).await.map_err(|e| {
            error!("Storage root '{}' unavailable: {}", root.display(), e);
            StoreError::unsupported_storage_at(
                "cannot create storage root",
                root.display().to_string(),
            )
        })?;

        // Prove the root accepts writes before reporting the store usable
        let probe = root.join(PROBE_ENTRY);
        fs::write(&probe, b"").await.map_err(|e| {
            error!("Storage root '{}' rejects writes: {}", root.display(), e);
            StoreError::unsupported_storage_at(
                "storage root is not writable",
                root.display().to_string(),
            )
        })?;
        if let Err(e) = fs::remove_file(&probe).await {
            warn!("Failed to remove probe entry '{}': {}", probe.display(), e);
        }

        let chunks_dir = root.join(CHUNKS_DIR);
        let descriptors_dir = root.join(DESCRIPTORS_DIR);
        for dir in [&chunks_dir, &descriptors_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                error!("Failed to create namespace '{}': {}", dir.display(), e);
                StoreError::unsupported_storage_at(
                    "cannot create top-level namespace",
                    dir.display().to_string(),
                )
            })?;
        }

        debug!("Storage driver ready at {}", root.display());
        Ok(Self {
            root,
            chunks_dir,
            descriptors_dir,
        })
    }

    /// Storage root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Idempotently create the chunk namespace for a transfer
    pub async fn create_namespace(&self, identity: &str) -> Result<NamespaceHandle, StoreError> {
        validate_identity(identity)?;
        let path = self.chunks_dir.join(identity);
        debug!("Opening chunk namespace {}", path.display());
        fs::create_dir_all(&path).await.map_err(|e| {
            error!("Failed to create namespace '{}': {}", path.display(), e);
            StoreError::write_failed_with_source(
                format!("{}/{}", CHUNKS_DIR, identity),
                e.to_string(),
            )
        })?;
        Ok(NamespaceHandle {
            name: identity.to_string(),
            path,
        })
    }

    /// Handle for the descriptor namespace
    pub fn descriptor_namespace(&self) -> NamespaceHandle {
        NamespaceHandle {
            name: DESCRIPTORS_DIR.to_string(),
            path: self.descriptors_dir.clone(),
        }
    }

    /// Fully overwrite an entry within a namespace
    pub async fn write(
        &self,
        handle: &NamespaceHandle,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let path = handle.path.join(name);
        trace!("Writing entry {} ({} bytes)", path.display(), bytes.len());
        fs::write(&path, bytes).await.map_err(|e| {
            error!("Failed to write entry '{}': {}", path.display(), e);
            StoreError::write_failed_with_source(name, e.to_string())
        })?;
        Ok(())
    }

    /// Read an entry, returning None when it does not exist
    pub async fn read(
        &self,
        handle: &NamespaceHandle,
        name: &str,
    ) -> Result<Option<Bytes>, StoreError> {
        let path = handle.path.join(name);
        trace!("Reading entry {}", path.display());
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Failed to read entry '{}': {}", path.display(), e);
                Err(StoreError::read_failed_with_source(name, e.to_string()))
            }
        }
    }

    /// Best-effort delete of an entry
    ///
    /// Absence is not an error; other failures are logged and swallowed so
    /// deletion never blocks the caller's forward progress.
    pub async fn delete(&self, handle: &NamespaceHandle, name: &str) {
        let path = handle.path.join(name);
        trace!("Deleting entry {}", path.display());
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to delete entry '{}': {}", path.display(), e);
            }
        }
    }

    /// List entry names within a namespace
    ///
    /// A missing namespace yields an empty list.
    pub async fn list_namespace(&self, handle: &NamespaceHandle) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&handle.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                error!(
                    "Failed to list namespace '{}': {}",
                    handle.path.display(),
                    e
                );
                return Err(StoreError::read_failed_with_source(
                    handle.name.clone(),
                    e.to_string(),
                ));
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StoreError::read_failed_with_source(handle.name.clone(), e.to_string())
        })? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Best-effort recursive removal of a transfer's chunk namespace
    pub async fn delete_namespace(&self, identity: &str) {
        if let Err(e) = validate_identity(identity) {
            warn!("Refusing to delete namespace: {}", e);
            return;
        }
        let path = self.chunks_dir.join(identity);
        debug!("Deleting chunk namespace {}", path.display());
        match fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to delete namespace '{}': {}", path.display(), e);
            }
        }
    }

    /// Eagerly walk the whole store and list every entry with its size
    ///
    /// Failures within a subtree are logged and that subtree is omitted;
    /// a diagnostic listing prefers partial results over a hard failure.
    pub async fn list_all(&self) -> Vec<StoredEntry> {
        let mut results = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping unreadable subtree '{}': {}", dir.display(), e);
                    continue;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Listing aborted in '{}': {}", dir.display(), e);
                        break;
                    }
                };
                let path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Skipping unreadable entry '{}': {}", path.display(), e);
                        continue;
                    }
                };
                let relative = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if metadata.is_dir() {
                    results.push(StoredEntry {
                        path: relative,
                        kind: EntryKind::Directory,
                        size: 0,
                    });
                    pending.push(path);
                } else {
                    results.push(StoredEntry {
                        path: relative,
                        kind: EntryKind::File,
                        size: metadata.len(),
                    });
                }
            }
        }

        trace!("Listed {} stored entries", results.len());
        results
    }

    /// Estimate storage usage
    ///
    /// Used bytes are computed by walking the root. Plain filesystems do
    /// not report an origin quota, so the quota is absent; None is
    /// returned only when the root itself cannot be inspected.
    pub async fn usage_estimate(&self) -> Option<UsageEstimate> {
        if fs::metadata(&self.root).await.is_err() {
            return None;
        }
        let used_bytes = self
            .list_all()
            .await
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.size)
            .sum();
        Some(UsageEstimate {
            used_bytes,
            quota_bytes: None,
        })
    }

    /// Remove everything and re-create the empty top-level namespaces
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        info!("Clearing all stored data under {}", self.root.display());
        for dir in [&self.chunks_dir, &self.descriptors_dir] {
            match fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to clear '{}': {}", dir.display(), e);
                }
            }
            fs::create_dir_all(dir).await.map_err(|e| {
                error!("Failed to re-create '{}': {}", dir.display(), e);
                StoreError::write_failed_with_source(
                    dir.display().to_string(),
                    e.to_string(),
                )
            })?;
        }
        info!("Storage cleared and re-initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("torrent_vault_driver_{}", name))
    }

    #[tokio::test]
    async fn test_initialize_creates_namespaces() {
        let root = test_root("init");
        let _ = fs::remove_dir_all(&root).await;

        let driver = StorageDriver::initialize(root.clone()).await.unwrap();
        assert!(root.join(CHUNKS_DIR).is_dir());
        assert!(root.join(DESCRIPTORS_DIR).is_dir());
        assert_eq!(driver.root(), root.as_path());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_initialize_unsupported_root() {
        // A file where the root should be makes the root unusable
        let root = test_root("unsupported");
        let _ = fs::remove_dir_all(&root).await;
        let _ = fs::remove_file(&root).await;
        fs::write(&root, b"occupied").await.unwrap();

        let err = StorageDriver::initialize(root.clone()).await.unwrap_err();
        assert!(err.is_unsupported());

        let _ = fs::remove_file(&root).await;
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let root = test_root("round_trip");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"hello pieces").await.unwrap();

        let data = driver.read(&ns, "chunk-0-0").await.unwrap().unwrap();
        assert_eq!(data.as_ref(), b"hello pieces");

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_read_absent_returns_none() {
        let root = test_root("read_absent");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        assert!(driver.read(&ns, "chunk-0-9").await.unwrap().is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let root = test_root("overwrite");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"first").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"second write").await.unwrap();

        let data = driver.read(&ns, "chunk-0-0").await.unwrap().unwrap();
        assert_eq!(data.as_ref(), b"second write");

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let root = test_root("delete_absent");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        // Must not panic or error
        driver.delete(&ns, "chunk-0-7").await;

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_create_namespace_idempotent() {
        let root = test_root("idempotent");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns1 = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns1, "chunk-0-0", b"data").await.unwrap();
        let ns2 = driver.create_namespace("abc123").await.unwrap();
        assert_eq!(ns1.path(), ns2.path());
        assert!(driver.read(&ns2, "chunk-0-0").await.unwrap().is_some());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected() {
        let root = test_root("invalid_identity");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        assert!(driver.create_namespace("").await.is_err());
        assert!(driver.create_namespace("..").await.is_err());
        assert!(driver.create_namespace("a/b").await.is_err());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_delete_namespace_removes_contents() {
        let root = test_root("delete_ns");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"data").await.unwrap();
        driver.delete_namespace("abc123").await;
        assert!(!ns.path().exists());

        // Deleting again is fine
        driver.delete_namespace("abc123").await;

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_list_namespace() {
        let root = test_root("list_ns");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"a").await.unwrap();
        driver.write(&ns, "chunk-0-1", b"b").await.unwrap();

        let mut names = driver.list_namespace(&ns).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["chunk-0-0", "chunk-0-1"]);

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_list_all_and_usage() {
        let root = test_root("list_all");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"12345").await.unwrap();

        let entries = driver.list_all().await;
        assert!(entries
            .iter()
            .any(|e| e.path == "chunks/abc123/chunk-0-0" && e.size == 5));
        assert!(entries
            .iter()
            .any(|e| e.path == "descriptors" && e.kind == EntryKind::Directory));

        let usage = driver.usage_estimate().await.unwrap();
        assert_eq!(usage.used_bytes, 5);
        assert!(usage.quota_bytes.is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_clear_all_leaves_empty_namespaces() {
        let root = test_root("clear_all");
        let _ = fs::remove_dir_all(&root).await;
        let driver = StorageDriver::initialize(root.clone()).await.unwrap();

        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"data").await.unwrap();
        driver
            .write(&driver.descriptor_namespace(), "abc123.json", b"{}")
            .await
            .unwrap();

        driver.clear_all().await.unwrap();

        let entries = driver.list_all().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == EntryKind::Directory));

        // New writes still succeed after clearing
        let ns = driver.create_namespace("abc123").await.unwrap();
        driver.write(&ns, "chunk-0-0", b"fresh").await.unwrap();

        let _ = fs::remove_dir_all(&root).await;
    }
}
