//! In-memory hierarchical store.
//!
//! The tree lives behind an `Arc<Mutex<..>>` so the same content can be
//! reopened in a different mode, the way a file is reopened by path. Every
//! mutating call is recorded so callers can observe exactly what a save
//! wrote.

use crate::config::OpenMode;
use crate::error::{HdictError, Result};
use crate::traits::HierarchicalStore;
use crate::types::{key, Dataset, NodeInfo, Region};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// A mutating call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { path: String },
    PutRegion { path: String, region: Region },
    CreateGroup { path: String },
    Delete { path: String },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Put { path }
            | WriteOp::PutRegion { path, .. }
            | WriteOp::CreateGroup { path }
            | WriteOp::Delete { path } => path,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Group(Vec<(String, Node)>),
    Dataset(Dataset),
}

#[derive(Debug, Default)]
struct MemoryState {
    root: Vec<(String, Node)>,
    ops: Vec<WriteOp>,
    flushes: usize,
    failing: Vec<String>,
}

pub struct MemoryStore {
    shared: Arc<Mutex<MemoryState>>,
    mode: OpenMode,
    closed: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store opened for writing.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(MemoryState::default())),
            mode: OpenMode::Write,
            closed: false,
        }
    }

    /// Open another handle on the same content.
    ///
    /// `Write` refuses non-empty content and `Overwrite` clears it, matching
    /// what the file store does with an existing file.
    pub fn reopen(&self, mode: OpenMode) -> Result<Self> {
        {
            let mut state = self.shared.lock();
            match mode {
                OpenMode::Write if !state.root.is_empty() => {
                    return Err(HdictError::FileExists("<memory>".into()));
                }
                OpenMode::Overwrite => {
                    debug!("Truncating in-memory store");
                    state.root.clear();
                }
                _ => {}
            }
        }
        Ok(Self {
            shared: Arc::clone(&self.shared),
            mode,
            closed: false,
        })
    }

    /// Every mutating call received so far, across all handles.
    pub fn ops(&self) -> Vec<WriteOp> {
        self.shared.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.shared.lock().ops.clear();
    }

    pub fn flush_count(&self) -> usize {
        self.shared.lock().flushes
    }

    /// Make every write to `path` (or below it) fail with an I/O error.
    pub fn fail_on(&self, path: &str) {
        self.shared.lock().failing.push(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.shared.lock().failing.clear();
    }

    fn check_writable(&self, path: &str) -> Result<()> {
        if self.closed {
            return Err(HdictError::Closed);
        }
        if !self.mode.is_writable() {
            return Err(HdictError::ModeViolation(format!("write '{path}'")));
        }
        let state = self.shared.lock();
        if state.failing.iter().any(|f| key::is_within(path, f)) {
            return Err(HdictError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure writing '{path}'"),
            )));
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(HdictError::Closed)
        } else {
            Ok(())
        }
    }
}

fn segments(path: &str) -> Result<Vec<&str>> {
    if path.trim_matches(key::SEPARATOR).is_empty() {
        Ok(Vec::new())
    } else {
        key::split(path)
    }
}

fn find<'a>(mut children: &'a [(String, Node)], segs: &[&str]) -> Option<&'a Node> {
    let (last, parents) = segs.split_last()?;
    for seg in parents {
        match children.iter().find(|(name, _)| name == seg) {
            Some((_, Node::Group(inner))) => children = inner,
            _ => return None,
        }
    }
    children
        .iter()
        .find(|(name, _)| name == last)
        .map(|(_, node)| node)
}

/// Walk to the group at `segs`, creating missing groups when `create` is set.
/// `None` if a segment is missing (without `create`) or names a dataset.
fn group_mut<'a>(
    children: &'a mut Vec<(String, Node)>,
    segs: &[&str],
    create: bool,
) -> Option<&'a mut Vec<(String, Node)>> {
    let Some((first, rest)) = segs.split_first() else {
        return Some(children);
    };
    let pos = match children.iter().position(|(name, _)| name == first) {
        Some(pos) => pos,
        None if create => {
            children.push((first.to_string(), Node::Group(Vec::new())));
            children.len() - 1
        }
        None => return None,
    };
    match &mut children[pos].1 {
        Node::Group(inner) => group_mut(inner, rest, create),
        Node::Dataset(_) => None,
    }
}

fn insert(children: &mut Vec<(String, Node)>, name: &str, node: Node) {
    match children.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = node,
        None => children.push((name.to_string(), node)),
    }
}

fn parent_conflict(path: &str) -> HdictError {
    HdictError::InvalidState(format!("a parent of '{path}' is a dataset"))
}

impl HierarchicalStore for MemoryStore {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn info(&self, path: &str) -> Result<Option<NodeInfo>> {
        self.check_open()?;
        let segs = segments(path)?;
        if segs.is_empty() {
            return Ok(Some(NodeInfo::Group));
        }
        let state = self.shared.lock();
        Ok(find(&state.root, &segs).map(|node| match node {
            Node::Group(_) => NodeInfo::Group,
            Node::Dataset(ds) => NodeInfo::Dataset(ds.info()),
        }))
    }

    fn get(&self, path: &str) -> Result<Dataset> {
        self.check_open()?;
        let segs = segments(path)?;
        let state = self.shared.lock();
        match find(&state.root, &segs) {
            Some(Node::Dataset(ds)) => Ok(ds.clone()),
            Some(Node::Group(_)) => Err(HdictError::InvalidState(format!(
                "'{path}' is a group, not a dataset"
            ))),
            None => Err(HdictError::KeyNotFound(path.to_string())),
        }
    }

    fn put(&mut self, path: &str, dataset: Dataset) -> Result<()> {
        self.check_writable(path)?;
        dataset.validate()?;
        let segs = key::split(path)?;
        let (last, parents) = segs.split_last().ok_or_else(|| {
            HdictError::InvalidKey("cannot put a dataset at the root".into())
        })?;
        let mut state = self.shared.lock();
        let group = group_mut(&mut state.root, parents, true).ok_or_else(|| parent_conflict(path))?;
        insert(group, last, Node::Dataset(dataset));
        state.ops.push(WriteOp::Put {
            path: path.to_string(),
        });
        Ok(())
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        self.check_writable(path)?;
        let segs = key::split(path)?;
        let (last, parents) = segs.split_last().ok_or_else(|| {
            HdictError::InvalidKey("the root group always exists".into())
        })?;
        let mut state = self.shared.lock();
        let group = group_mut(&mut state.root, parents, true).ok_or_else(|| parent_conflict(path))?;
        let is_group = matches!(
            group.iter().find(|(n, _)| n == last),
            Some((_, Node::Group(_)))
        );
        if !is_group {
            insert(group, last, Node::Group(Vec::new()));
        }
        state.ops.push(WriteOp::CreateGroup {
            path: path.to_string(),
        });
        Ok(())
    }

    fn put_region(&mut self, path: &str, region: Region, bytes: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let unpatchable = |reason: &str| HdictError::Unpatchable {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let segs = key::split(path)?;
        let (last, parents) = segs
            .split_last()
            .ok_or_else(|| unpatchable("root is a group"))?;
        let mut state = self.shared.lock();
        let group =
            group_mut(&mut state.root, parents, false).ok_or_else(|| unpatchable("no such dataset"))?;
        let dataset = match group.iter_mut().find(|(n, _)| n == last) {
            Some((_, Node::Dataset(ds))) => ds,
            _ => return Err(unpatchable("no such dataset")),
        };
        let size = dataset
            .dtype
            .element_size()
            .ok_or_else(|| unpatchable("text datasets cannot be patched"))?;
        if region.end > dataset.element_count() {
            return Err(unpatchable("region exceeds the stored shape"));
        }
        if bytes.len() != region.len() * size {
            return Err(unpatchable("byte length does not match the region"));
        }
        dataset.data[region.start * size..region.end * size].copy_from_slice(bytes);
        state.ops.push(WriteOp::PutRegion {
            path: path.to_string(),
            region,
        });
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<bool> {
        self.check_writable(path)?;
        let segs = key::split(path)?;
        let Some((last, parents)) = segs.split_last() else {
            return Ok(false);
        };
        let mut state = self.shared.lock();
        let removed = match group_mut(&mut state.root, parents, false) {
            Some(group) => match group.iter().position(|(n, _)| n == last) {
                Some(pos) => {
                    group.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        state.ops.push(WriteOp::Delete {
            path: path.to_string(),
        });
        Ok(removed)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_open()?;
        let segs = segments(path)?;
        let state = self.shared.lock();
        let children = if segs.is_empty() {
            &state.root
        } else {
            match find(&state.root, &segs) {
                Some(Node::Group(inner)) => inner,
                Some(Node::Dataset(_)) => {
                    return Err(HdictError::InvalidState(format!("'{path}' is not a group")))
                }
                None => return Err(HdictError::KeyNotFound(path.to_string())),
            }
        };
        Ok(children.iter().map(|(name, _)| name.clone()).collect())
    }

    fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.shared.lock().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DType;

    fn scalar(n: i64) -> Dataset {
        Dataset::new(DType::I64, vec![], n.to_le_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_put_creates_parent_groups() {
        let mut store = MemoryStore::new();
        store.put("a/b/c", scalar(1)).unwrap();
        assert_eq!(store.info("a").unwrap(), Some(NodeInfo::Group));
        assert_eq!(store.list_children("a/b").unwrap(), vec!["c"]);
        assert_eq!(store.get("a/b/c").unwrap(), scalar(1));
        assert!(matches!(store.get("a"), Err(HdictError::InvalidState(_))));
        assert!(matches!(store.get("zz"), Err(HdictError::KeyNotFound(_))));
    }

    #[test]
    fn test_children_keep_creation_order() {
        let mut store = MemoryStore::new();
        store.put("z", scalar(1)).unwrap();
        store.put("a", scalar(2)).unwrap();
        store.put("z", scalar(3)).unwrap();
        assert_eq!(store.list_children("").unwrap(), vec!["z", "a"]);
    }

    #[test]
    fn test_put_region_patches_bytes() {
        let mut store = MemoryStore::new();
        let data: Vec<u8> = [1i64, 2, 3].iter().flat_map(|n| n.to_le_bytes()).collect();
        store
            .put("arr", Dataset::new(DType::I64, vec![3], data).unwrap())
            .unwrap();
        store
            .put_region("arr", Region::single(1), &20i64.to_le_bytes())
            .unwrap();
        let ds = store.get("arr").unwrap();
        assert_eq!(&ds.data[8..16], &20i64.to_le_bytes());
        assert_eq!(&ds.data[0..8], &1i64.to_le_bytes());

        let err = store.put_region("arr", Region::new(2, 4), &[0; 16]);
        assert!(matches!(err, Err(HdictError::Unpatchable { .. })));
        let err = store.put_region("missing", Region::single(0), &[0; 8]);
        assert!(matches!(err, Err(HdictError::Unpatchable { .. })));
    }

    #[test]
    fn test_reopen_modes() {
        let mut store = MemoryStore::new();
        store.put("a", scalar(1)).unwrap();

        let mut reader = store.reopen(OpenMode::Read).unwrap();
        assert_eq!(reader.get("a").unwrap(), scalar(1));
        assert!(matches!(
            reader.put("b", scalar(2)),
            Err(HdictError::ModeViolation(_))
        ));

        assert!(matches!(
            store.reopen(OpenMode::Write),
            Err(HdictError::FileExists(_))
        ));
        let fresh = store.reopen(OpenMode::Overwrite).unwrap();
        assert!(fresh.list_children("").unwrap().is_empty());
    }

    #[test]
    fn test_ops_log_and_injected_failure() {
        let mut store = MemoryStore::new();
        store.put("a", scalar(1)).unwrap();
        store.fail_on("b");
        assert!(matches!(store.put("b/x", scalar(2)), Err(HdictError::Io(_))));
        store.delete("a").unwrap();
        assert_eq!(
            store.ops(),
            vec![
                WriteOp::Put { path: "a".into() },
                WriteOp::Delete { path: "a".into() },
            ]
        );
        store.close().unwrap();
        assert!(matches!(store.get("a"), Err(HdictError::Closed)));
    }
}
