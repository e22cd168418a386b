//! File-system backend.
//!
//! ```text
//! <root>/names.json                  local-name index
//! <root>/namespaces.json             optional namespace index override
//! <root>/bundles/ab/cd/<rest>/n      bundle record
//! <root>/bundles/ab/cd/<rest>/r      reference list record
//! <root>/blobs/ab/cd/<rest>/<ns>.<name>.<i>
//! ```
//!
//! Records are written to a sibling temp file, synced, and renamed into
//! place, so a crash never leaves a half-written record behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use arbor_bundle::{codec, BlobStore, FileBlobStore, NodePropBundle, StorageError, StorageResult};
use arbor_index::paths::{node_file_path, references_file_path, NODE_FILE_NAME};
use arbor_index::{StoragePaths, StringIndex};
use arbor_types::{NodeId, NodeReferences};

use crate::backend::BundleBackend;
use crate::error::Result;

const BUNDLES_DIR: &str = "bundles";
const BLOBS_DIR: &str = "blobs";

/// Backend storing one file per bundle and per reference list.
#[derive(Debug)]
pub struct FileSystemBackend {
    root: PathBuf,
    bundles: PathBuf,
    paths: StoragePaths,
    blobs: FileBlobStore,
}

impl FileSystemBackend {
    /// Open (or create) a repository rooted at `root`. `registry` is the
    /// namespace index used unless `<root>/namespaces.json` overrides it.
    pub fn open(root: &Path, registry: Arc<dyn StringIndex>) -> Result<Self> {
        fs::create_dir_all(root).map_err(StorageError::from)?;
        let paths = StoragePaths::open(root, registry)?;
        let bundles = root.join(BUNDLES_DIR);
        fs::create_dir_all(&bundles).map_err(StorageError::from)?;
        let blobs = FileBlobStore::new(&root.join(BLOBS_DIR), paths.clone())?;
        info!(root = %root.display(), "file system backend opened");
        Ok(Self {
            root: root.to_path_buf(),
            bundles,
            paths,
            blobs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Ids of every bundle on disk, sorted.
    pub fn all_ids(&self) -> StorageResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.bundles).min_depth(4).max_depth(4) {
            let entry = entry.map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
            if entry.file_name() != NODE_FILE_NAME {
                continue;
            }
            match id_from_record_path(&self.bundles, entry.path()) {
                Some(id) => ids.push(id),
                None => warn!(path = %entry.path().display(), "stray bundle file"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn bundle_path(&self, id: &NodeId) -> PathBuf {
        self.bundles.join(node_file_path(id))
    }

    fn references_path(&self, id: &NodeId) -> PathBuf {
        self.bundles.join(references_file_path(id))
    }
}

impl BundleBackend for FileSystemBackend {
    fn load_bundle(&self, id: &NodeId) -> StorageResult<Option<NodePropBundle>> {
        let path = self.bundle_path(id);
        let Some(bytes) = read_record(&path)? else {
            return Ok(None);
        };
        let bundle = codec::decode_bundle(&bytes, &format!("bundle {id}"))?;
        debug!(node = %id, len = bytes.len(), "bundle loaded");
        Ok(Some(bundle))
    }

    fn store_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
        let bytes = codec::encode_bundle(bundle)?;
        write_record(&self.bundle_path(&bundle.id()), &bytes)?;
        debug!(node = %bundle.id(), len = bytes.len(), "bundle stored");
        Ok(())
    }

    fn destroy_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
        remove_record(&self.bundle_path(&bundle.id()))?;
        debug!(node = %bundle.id(), "bundle destroyed");
        Ok(())
    }

    fn load_references(&self, id: &NodeId) -> StorageResult<Option<NodeReferences>> {
        let path = self.references_path(id);
        match read_record(&path)? {
            Some(bytes) => Ok(Some(codec::decode(&bytes, &format!("references {id}"))?)),
            None => Ok(None),
        }
    }

    fn store_references(&self, refs: &NodeReferences) -> StorageResult<()> {
        let bytes = codec::encode(refs)?;
        write_record(&self.references_path(&refs.target_id()), &bytes)?;
        debug!(target = %refs.target_id(), count = refs.len(), "references stored");
        Ok(())
    }

    fn destroy_references(&self, refs: &NodeReferences) -> StorageResult<()> {
        remove_record(&self.references_path(&refs.target_id()))
    }

    fn blob_store(&self) -> &dyn BlobStore {
        &self.blobs
    }

    fn check_consistency(
        &self,
        ids: &[NodeId],
        recursive: bool,
        fix: bool,
    ) -> StorageResult<Vec<String>> {
        let mut pending = if ids.is_empty() { self.all_ids()? } else { ids.to_vec() };
        let mut seen = std::collections::BTreeSet::new();
        let mut problems = Vec::new();

        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let bundle = match self.load_bundle(&id) {
                Ok(Some(bundle)) => bundle,
                Ok(None) => {
                    problems.push(format!("{id}: bundle missing"));
                    continue;
                }
                Err(e) => {
                    problems.push(format!("{id}: unreadable bundle: {e}"));
                    continue;
                }
            };

            let mut repaired = bundle.clone();
            let mut dirty = false;
            for child in bundle.child_node_entries() {
                if self.bundle_path(&child.id).exists() {
                    if recursive {
                        pending.push(child.id);
                    }
                    continue;
                }
                problems.push(format!("{id}: child {} ({}) missing", child.name, child.id));
                if fix {
                    dirty |= repaired.remove_child_entry(&child.id);
                }
            }
            for blob_id in bundle.blob_ids() {
                if let Err(e) = self.blobs.get(&blob_id) {
                    problems.push(format!("{id}: blob {blob_id}: {e}"));
                }
            }
            if dirty {
                self.store_bundle(&repaired)?;
                info!(node = %id, "removed dangling child entries");
            }
        }
        Ok(problems)
    }
}

fn read_record(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_record(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

fn remove_record(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Recover a node id from `<bundles>/ab/cd/<28 hex>/n`.
fn id_from_record_path(bundles: &Path, path: &Path) -> Option<NodeId> {
    let folder = path.parent()?.strip_prefix(bundles).ok()?;
    let hex: String = folder
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if hex.len() != 32 {
        return None;
    }
    u128::from_str_radix(&hex, 16).ok().map(NodeId::from_u128)
}
