//! Storage path derivation.
//!
//! Node ids are spread over a three-level folder hierarchy so that file-like
//! backends never hold millions of entries in one directory: the first two
//! hex digits of the id name the top folder, the next two a subfolder, and
//! the remaining 28 the leaf. Property and blob paths hang off the owning
//! node's folder and spell the property name through the string indices.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use arbor_types::{NodeId, PropertyId};

use crate::error::IndexResult;
use crate::file::FileBasedIndex;
use crate::traits::StringIndex;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// File name of a node's bundle record inside its folder.
pub const NODE_FILE_NAME: &str = "n";

/// File name of a node's reference list inside its folder.
pub const REFERENCES_FILE_NAME: &str = "r";

/// Resource holding the local-name index, relative to the storage root.
pub const NAME_INDEX_RESOURCE: &str = "names.json";

/// Resource holding the namespace override index, relative to the storage root.
pub const NS_INDEX_RESOURCE: &str = "namespaces.json";

/// Fan-out folder path of a node: `ab/cd/ef0123…`.
pub fn node_folder_path(id: &NodeId) -> String {
    let mut buf = String::with_capacity(34);
    append_node_folder_path(&mut buf, id);
    buf
}

fn append_node_folder_path(buf: &mut String, id: &NodeId) {
    let text = id.to_string();
    for (count, c) in text.chars().filter(|c| *c != '-').enumerate() {
        if count == 2 || count == 4 {
            buf.push(SEPARATOR);
        }
        buf.push(c);
    }
}

/// Path of a node's bundle record: `<folder>/n`.
pub fn node_file_path(id: &NodeId) -> String {
    let mut buf = node_folder_path(id);
    buf.push(SEPARATOR);
    buf.push_str(NODE_FILE_NAME);
    buf
}

/// Path of a node's reference list: `<folder>/r`.
pub fn references_file_path(id: &NodeId) -> String {
    let mut buf = node_folder_path(id);
    buf.push(SEPARATOR);
    buf.push_str(REFERENCES_FILE_NAME);
    buf
}

/// Path builder that interns property names through the namespace and
/// local-name indices.
#[derive(Clone)]
pub struct StoragePaths {
    ns_index: Arc<dyn StringIndex>,
    name_index: Arc<dyn StringIndex>,
}

impl std::fmt::Debug for StoragePaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePaths")
            .field("namespaces", &self.ns_index.len())
            .field("names", &self.name_index.len())
            .finish()
    }
}

impl StoragePaths {
    pub fn new(ns_index: Arc<dyn StringIndex>, name_index: Arc<dyn StringIndex>) -> Self {
        Self {
            ns_index,
            name_index,
        }
    }

    /// Load both indices relative to a storage root.
    ///
    /// The namespace index uses `<root>/namespaces.json` when that file
    /// exists and otherwise delegates to `registry`. The local-name index is
    /// always `<root>/names.json`, created on first use.
    pub fn open(root: &Path, registry: Arc<dyn StringIndex>) -> IndexResult<Self> {
        let ns_path = root.join(NS_INDEX_RESOURCE);
        let ns_index: Arc<dyn StringIndex> = if ns_path.exists() {
            Arc::new(FileBasedIndex::open(&ns_path)?)
        } else {
            registry
        };
        let name_index = Arc::new(FileBasedIndex::open(&root.join(NAME_INDEX_RESOURCE))?);
        info!(
            root = %root.display(),
            namespaces = ns_index.len(),
            names = name_index.len(),
            "storage paths ready"
        );
        Ok(Self::new(ns_index, name_index))
    }

    pub fn ns_index(&self) -> &dyn StringIndex {
        self.ns_index.as_ref()
    }

    pub fn name_index(&self) -> &dyn StringIndex {
        self.name_index.as_ref()
    }

    /// `<parent folder>/<ns index>.<name index>`.
    pub fn property_path(&self, id: &PropertyId) -> IndexResult<String> {
        let mut buf = String::with_capacity(48);
        self.append_property_path(&mut buf, id)?;
        Ok(buf)
    }

    /// `<property path>.<value index>`; one path per value slot.
    pub fn blob_path(&self, id: &PropertyId, index: usize) -> IndexResult<String> {
        let mut buf = String::with_capacity(52);
        self.append_property_path(&mut buf, id)?;
        buf.push('.');
        buf.push_str(&index.to_string());
        Ok(buf)
    }

    fn append_property_path(&self, buf: &mut String, id: &PropertyId) -> IndexResult<()> {
        append_node_folder_path(buf, &id.parent_id());
        buf.push(SEPARATOR);
        let ns = self.ns_index.string_to_index(id.name().namespace_uri())?;
        let local = self.name_index.string_to_index(id.name().local_name())?;
        buf.push_str(&ns.to_string());
        buf.push('.');
        buf.push_str(&local.to_string());
        Ok(())
    }
}
