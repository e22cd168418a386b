//! Blob stores hold property values too large to keep inside a bundle.
//!
//! Blobs are addressed by a string id derived from the owning property and
//! the value's position, so every value slot of a multi-valued property gets
//! its own blob.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use arbor_index::{node_folder_path, StoragePaths};
use arbor_types::PropertyId;

use crate::error::{StorageError, StorageResult};

/// Storage for externalized binary values.
pub trait BlobStore: Send + Sync {
    /// Derive the blob id for value `index` of property `id`.
    fn create_id(&self, id: &PropertyId, index: usize) -> StorageResult<String>;

    /// Store `data` under `blob_id`, replacing any previous content.
    fn put(&self, blob_id: &str, data: &[u8]) -> StorageResult<()>;

    /// Read a blob. Fails with [`StorageError::BlobNotFound`] if absent.
    fn get(&self, blob_id: &str) -> StorageResult<Vec<u8>>;

    /// Delete a blob. Returns `true` if it existed.
    fn remove(&self, blob_id: &str) -> StorageResult<bool>;
}

/// `HashMap`-backed blob store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, blob_id: &str) -> bool {
        self.blobs.read().contains_key(blob_id)
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs.read().values().map(|b| b.len() as u64).sum()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create_id(&self, id: &PropertyId, index: usize) -> StorageResult<String> {
        Ok(format!(
            "{}/{}.{index}",
            node_folder_path(&id.parent_id()),
            id.name()
        ))
    }

    fn put(&self, blob_id: &str, data: &[u8]) -> StorageResult<()> {
        self.blobs.write().insert(blob_id.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, blob_id: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .get(blob_id)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound(blob_id.to_string()))
    }

    fn remove(&self, blob_id: &str) -> StorageResult<bool> {
        Ok(self.blobs.write().remove(blob_id).is_some())
    }
}

/// Blob store keeping one file per blob under a root directory.
///
/// Blob ids are the interned blob paths from [`StoragePaths`], so a blob of
/// node `abcd…` lives at `<root>/ab/cd/…/<ns>.<name>.<index>`.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
    paths: StoragePaths,
}

impl FileBlobStore {
    pub fn new(root: &Path, paths: StoragePaths) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            paths,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, blob_id: &str) -> StorageResult<PathBuf> {
        if blob_id.is_empty() || blob_id.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(StorageError::Backend(format!("invalid blob id: {blob_id:?}")));
        }
        Ok(self.root.join(blob_id))
    }
}

impl BlobStore for FileBlobStore {
    fn create_id(&self, id: &PropertyId, index: usize) -> StorageResult<String> {
        Ok(self.paths.blob_path(id, index)?)
    }

    fn put(&self, blob_id: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.file_path(blob_id)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        debug!(blob = blob_id, len = data.len(), "blob written");
        Ok(())
    }

    fn get(&self, blob_id: &str) -> StorageResult<Vec<u8>> {
        let path = self.file_path(blob_id)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::BlobNotFound(blob_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, blob_id: &str) -> StorageResult<bool> {
        let path = self.file_path(blob_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(blob = blob_id, "blob removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
