use arbor_bundle::{BlobStore, NodePropBundle, StorageResult};
use arbor_types::{NodeId, NodeReferences};

/// Durable storage of bundles and reference lists.
///
/// Implementations own their storage handles and must be safe to call from
/// several threads at once. Absence is reported as `Ok(None)`, never as an
/// error; every other failure is an `Err`.
pub trait BundleBackend: Send + Sync {
    /// Load the bundle of `id`, or `None` if no bundle is stored.
    fn load_bundle(&self, id: &NodeId) -> StorageResult<Option<NodePropBundle>>;

    /// Write a bundle, replacing any previous version.
    fn store_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()>;

    /// Remove a bundle's record. Blob payloads are released by the caller.
    fn destroy_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()>;

    /// Load the reference list targeting `id`, or `None` if none is stored.
    fn load_references(&self, id: &NodeId) -> StorageResult<Option<NodeReferences>>;

    /// Write a reference list, replacing any previous version.
    fn store_references(&self, refs: &NodeReferences) -> StorageResult<()>;

    /// Remove a reference list.
    fn destroy_references(&self, refs: &NodeReferences) -> StorageResult<()>;

    /// Store holding externalized binary values.
    fn blob_store(&self) -> &dyn BlobStore;

    /// Check (and optionally repair) the bundles of `ids`, or of the whole
    /// store when `ids` is empty. Returns a description of each problem
    /// found. The default implementation checks nothing.
    fn check_consistency(
        &self,
        _ids: &[NodeId],
        _recursive: bool,
        _fix: bool,
    ) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}
