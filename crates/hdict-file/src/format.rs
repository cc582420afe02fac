//! On-disk layout of an hdict file.
//!
//! ```text
//! [header: "HDCT" | version u32 LE]
//! [data block]*                      append-only, one per dataset write
//! [index: JSON FileIndex]
//! [footer: index offset u64 LE | index length u32 LE | "HDCT"]
//! ```
//!
//! Every flush that changes the tree appends a fresh index and footer; the
//! file is read from its last footer. Superseded blocks and indexes are
//! garbage until the file is compacted.

use hdict_core::error::{HdictError, Result};
use hdict_core::types::{DType, DatasetInfo, NodeInfo, StoreMeta, FORMAT_VERSION};
use serde::{Deserialize, Serialize};

pub const MAGIC: &[u8; 4] = b"HDCT";
pub const HEADER_LEN: u64 = 8;
pub const FOOTER_LEN: u64 = 16;

pub fn encode_header() -> [u8; HEADER_LEN as usize] {
    let mut buf = [0u8; HEADER_LEN as usize];
    buf[..4].copy_from_slice(MAGIC);
    buf[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf
}

/// Validate a header and return its format version.
pub fn decode_header(buf: &[u8]) -> Result<u32> {
    if buf.len() < HEADER_LEN as usize || &buf[..4] != MAGIC {
        return Err(HdictError::Corrupt("missing hdict header".into()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&buf[4..8]);
    let version = u32::from_le_bytes(version);
    if version > FORMAT_VERSION {
        return Err(HdictError::Corrupt(format!(
            "format version {version} is newer than supported version {FORMAT_VERSION}"
        )));
    }
    Ok(version)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub index_len: u32,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_LEN as usize] {
        let mut buf = [0u8; FOOTER_LEN as usize];
        buf[..8].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.index_len.to_le_bytes());
        buf[12..].copy_from_slice(MAGIC);
        buf
    }

    /// `None` unless `buf` is a footer whose index lies inside the first
    /// `footer_at` bytes of the file.
    pub fn decode(buf: &[u8], footer_at: u64) -> Option<Footer> {
        if buf.len() != FOOTER_LEN as usize || &buf[12..] != MAGIC {
            return None;
        }
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[8..12]);
        let footer = Footer {
            index_offset: u64::from_le_bytes(offset),
            index_len: u32::from_le_bytes(len),
        };
        let index_end = footer.index_offset.checked_add(footer.index_len as u64)?;
        (footer.index_offset >= HEADER_LEN && index_end == footer_at).then_some(footer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexNode {
    Group {
        children: Vec<IndexEntry>,
    },
    Dataset {
        dtype: DType,
        shape: Vec<usize>,
        offset: u64,
        len: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    #[serde(flatten)]
    pub node: IndexNode,
}

impl IndexNode {
    pub fn info(&self) -> NodeInfo {
        match self {
            IndexNode::Group { .. } => NodeInfo::Group,
            IndexNode::Dataset {
                dtype, shape, len, ..
            } => NodeInfo::Dataset(DatasetInfo {
                dtype: *dtype,
                shape: shape.clone(),
                byte_len: *len,
            }),
        }
    }
}

/// The tree of a file, persisted as JSON before the footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileIndex {
    pub meta: StoreMeta,
    pub root: Vec<IndexEntry>,
}

impl FileIndex {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| HdictError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| HdictError::Corrupt(format!("unreadable index: {e}")))
    }

    pub fn find(&self, segs: &[&str]) -> Option<&IndexNode> {
        let (last, parents) = segs.split_last()?;
        let mut children = &self.root;
        for seg in parents {
            match children.iter().find(|e| e.name == *seg) {
                Some(IndexEntry {
                    node: IndexNode::Group { children: inner },
                    ..
                }) => children = inner,
                _ => return None,
            }
        }
        children.iter().find(|e| e.name == *last).map(|e| &e.node)
    }

    /// Children of the group at `segs` (the root for an empty path), or
    /// `None` if there is no group there.
    pub fn children(&self, segs: &[&str]) -> Option<&[IndexEntry]> {
        if segs.is_empty() {
            return Some(&self.root);
        }
        match self.find(segs)? {
            IndexNode::Group { children } => Some(children),
            IndexNode::Dataset { .. } => None,
        }
    }

    /// Walk to the group at `segs`, creating missing groups when `create` is
    /// set. `None` if a segment is missing (without `create`) or names a
    /// dataset.
    pub fn group_mut(&mut self, segs: &[&str], create: bool) -> Option<&mut Vec<IndexEntry>> {
        walk_mut(&mut self.root, segs, create)
    }

    /// Every dataset node, depth first, in creation order.
    pub fn datasets_mut(&mut self) -> Vec<&mut IndexNode> {
        let mut out = Vec::new();
        collect_datasets(&mut self.root, &mut out);
        out
    }

    /// Total bytes of data blocks still referenced by the tree.
    pub fn live_bytes(&self) -> u64 {
        fn sum(children: &[IndexEntry]) -> u64 {
            children
                .iter()
                .map(|e| match &e.node {
                    IndexNode::Group { children } => sum(children),
                    IndexNode::Dataset { len, .. } => *len,
                })
                .sum()
        }
        sum(&self.root)
    }
}

fn walk_mut<'a>(
    children: &'a mut Vec<IndexEntry>,
    segs: &[&str],
    create: bool,
) -> Option<&'a mut Vec<IndexEntry>> {
    let Some((first, rest)) = segs.split_first() else {
        return Some(children);
    };
    let pos = match children.iter().position(|e| e.name == *first) {
        Some(pos) => pos,
        None if create => {
            children.push(IndexEntry {
                name: first.to_string(),
                node: IndexNode::Group {
                    children: Vec::new(),
                },
            });
            children.len() - 1
        }
        None => return None,
    };
    match &mut children[pos].node {
        IndexNode::Group { children: inner } => walk_mut(inner, rest, create),
        IndexNode::Dataset { .. } => None,
    }
}

fn collect_datasets<'a>(children: &'a mut [IndexEntry], out: &mut Vec<&'a mut IndexNode>) {
    for entry in children {
        match entry.node {
            IndexNode::Group {
                ref mut children, ..
            } => collect_datasets(children, out),
            IndexNode::Dataset { .. } => out.push(&mut entry.node),
        }
    }
}

/// Replace or append the child `name` of a group.
pub fn upsert(children: &mut Vec<IndexEntry>, name: &str, node: IndexNode) {
    match children.iter_mut().find(|e| e.name == name) {
        Some(entry) => entry.node = node,
        None => children.push(IndexEntry {
            name: name.to_string(),
            node,
        }),
    }
}
