use crate::config::OpenMode;
use crate::error::Result;
use crate::types::{Dataset, NodeInfo, Region};

/// A hierarchical store of named groups and datasets
///
/// Paths are slash-joined segments; the empty path names the root group.
/// Implementations hold at most one open handle to their backing medium and
/// release it in `close` (and on drop).
///
/// Mutating methods on a store opened in read mode fail with
/// `ModeViolation`.
pub trait HierarchicalStore: Send {
    /// Mode the store was opened in
    fn mode(&self) -> OpenMode;

    /// What lives at `path`, or `None` if nothing does
    fn info(&self, path: &str) -> Result<Option<NodeInfo>>;

    /// Read a dataset
    ///
    /// Fails with `KeyNotFound` if nothing lives at `path` and with
    /// `InvalidState` if `path` names a group.
    fn get(&self, path: &str) -> Result<Dataset>;

    /// Write a dataset, replacing whatever lives at `path`
    ///
    /// Missing parent groups are created.
    fn put(&mut self, path: &str, dataset: Dataset) -> Result<()>;

    /// Create an empty group at `path` (no-op if the group exists)
    ///
    /// Replaces a dataset at `path`. Missing parent groups are created.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Overwrite the elements of `region` of an existing numeric dataset
    ///
    /// `bytes` holds exactly the little-endian encoding of those elements.
    /// Returns `Unpatchable` when the dataset cannot be patched in place
    /// (missing, text-typed, or region out of range); callers fall back to a
    /// full `put`.
    fn put_region(&mut self, path: &str, region: Region, bytes: &[u8]) -> Result<()>;

    /// Remove a group or dataset and everything below it
    ///
    /// Returns whether anything was removed.
    fn delete(&mut self, path: &str) -> Result<bool>;

    /// Names of the direct children of a group, in creation order
    fn list_children(&self, path: &str) -> Result<Vec<String>>;

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.info(path)?.is_some())
    }

    /// Make every write so far durable
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the backing handle
    ///
    /// Any further call may fail with `Closed`.
    fn close(&mut self) -> Result<()>;
}
