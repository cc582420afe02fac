//! In-memory registry of keys and their load state.
//!
//! Every key known to a container has an [`Entry`]. Keys listed in the file
//! but never read hold [`Slot::Unloaded`]; reading one asks the
//! [`LazyLoader`] for its content. Groups load as a table of unloaded
//! children, so a parent can be opened without touching what lies below it.

use hdict_core::{
    error::{HdictError, Result},
    observe,
    traits::{HierarchicalStore, ValueCodec},
    types::{key, NodeInfo, Value, ValueKind},
};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum Slot {
    /// Present in the file, not read yet.
    Unloaded,
    Value(Value),
    /// A group whose listing has been read. Children track their own state.
    Group(EntryTable),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub slot: Slot,
    /// The key was listed in the file when it was first seen this session.
    pub from_file: bool,
    /// A `SyncArray` handle has been handed out for this key.
    pub bound: bool,
}

impl Entry {
    pub fn unloaded() -> Self {
        Self {
            slot: Slot::Unloaded,
            from_file: true,
            bound: false,
        }
    }

    /// Entry for a value assigned in this session. Mappings become groups.
    pub fn from_value(value: Value) -> Self {
        let slot = match value {
            Value::Map(pairs) => {
                let mut table = EntryTable::new();
                for (name, child) in pairs {
                    table.insert(name, Entry::from_value(child));
                }
                Slot::Group(table)
            }
            other => Slot::Value(other),
        };
        Self {
            slot,
            from_file: false,
            bound: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.slot, Slot::Unloaded)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.slot, Slot::Group(_))
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match &self.slot {
            Slot::Unloaded => None,
            Slot::Value(Value::Array(_)) if self.bound => Some(ValueKind::SyncArrayRef),
            Slot::Value(v) => Some(v.kind()),
            Slot::Group(_) => Some(ValueKind::NestedMapping),
        }
    }
}

/// Ordered key → entry map for one level of the hierarchy.
#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    entries: Vec<(String, Entry)>,
    positions: HashMap<String, usize>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.positions.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entry> {
        let i = *self.positions.get(name)?;
        Some(&mut self.entries[i].1)
    }

    /// Insert or replace. A replaced key keeps its position.
    pub fn insert(&mut self, name: String, entry: Entry) -> Option<Entry> {
        match self.positions.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, entry)),
            None => {
                self.positions.insert(name.clone(), self.entries.len());
                self.entries.push((name, entry));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        let i = self.positions.remove(name)?;
        let (_, entry) = self.entries.remove(i);
        for (_, pos) in self.positions.iter_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Entry)> {
        self.entries.iter_mut().map(|(k, e)| (k.as_str(), e))
    }

    /// Full paths of unloaded entries, walking into loaded groups only.
    pub fn unloaded_paths(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        for (name, entry) in self.iter() {
            let path = key::join(prefix, name);
            match &entry.slot {
                Slot::Unloaded => out.push(path),
                Slot::Group(table) => out.extend(table.unloaded_paths(&path)),
                Slot::Value(_) => {}
            }
        }
        out
    }

    /// Entry at a path without loading anything. `None` if the path is
    /// unknown or passes through an unloaded group.
    pub fn peek(&self, segs: &[&str]) -> Option<&Entry> {
        let (first, rest) = segs.split_first()?;
        let entry = self.get(first)?;
        if rest.is_empty() {
            return Some(entry);
        }
        match &entry.slot {
            Slot::Group(table) => table.peek(rest),
            _ => None,
        }
    }
}

/// Reads entries from the store on first access
pub struct LazyLoader<'a> {
    store: &'a dyn HierarchicalStore,
    codec: &'a dyn ValueCodec,
    /// Paths created this session; listings do not mark them as from the file.
    created: &'a HashSet<String>,
}

impl<'a> LazyLoader<'a> {
    pub fn new(
        store: &'a dyn HierarchicalStore,
        codec: &'a dyn ValueCodec,
        created: &'a HashSet<String>,
    ) -> Self {
        Self {
            store,
            codec,
            created,
        }
    }

    pub fn store(&self) -> &'a dyn HierarchicalStore {
        self.store
    }

    pub fn codec(&self) -> &'a dyn ValueCodec {
        self.codec
    }

    /// Unloaded entries for every child of the group at `path`.
    pub fn listing(&self, path: &str) -> Result<EntryTable> {
        let mut table = EntryTable::new();
        for name in self.store.list_children(path)? {
            let child = key::join(path, &name);
            let mut entry = Entry::unloaded();
            entry.from_file = !self.created.contains(&child);
            table.insert(name, entry);
        }
        Ok(table)
    }

    /// Read one level: a dataset is decoded, a group is listed.
    pub fn load(&self, path: &str) -> Result<Slot> {
        let start = Instant::now();
        let slot = match self.store.info(path)? {
            Some(NodeInfo::Group) => Slot::Group(self.listing(path)?),
            Some(NodeInfo::Dataset(_)) => {
                let dataset = self.store.get(path)?;
                Slot::Value(self.codec.decode(&dataset)?)
            }
            None => return Err(HdictError::KeyNotFound(path.to_string())),
        };
        debug!("Loaded '{}'", path);
        observe::record_load(start.elapsed());
        Ok(slot)
    }

    pub fn ensure_loaded(&self, entry: &mut Entry, path: &str) -> Result<()> {
        if let Slot::Unloaded = entry.slot {
            entry.slot = self.load(path)?;
        }
        Ok(())
    }

    /// Load an entry and everything below it.
    pub fn load_deep(&self, entry: &mut Entry, path: &str) -> Result<()> {
        self.ensure_loaded(entry, path)?;
        if let Slot::Group(table) = &mut entry.slot {
            for (name, child) in table.iter_mut() {
                self.load_deep(child, &key::join(path, name))?;
            }
        }
        Ok(())
    }

    /// Fully load an entry and return its value; groups become mappings.
    pub fn materialize(&self, entry: &mut Entry, path: &str) -> Result<Value> {
        self.load_deep(entry, path)?;
        Ok(snapshot(entry))
    }
}

/// Value of a fully loaded entry. Unloaded children are skipped.
pub fn snapshot(entry: &Entry) -> Value {
    match &entry.slot {
        Slot::Value(v) => v.clone(),
        Slot::Group(table) => Value::Map(
            table
                .iter()
                .filter(|(_, e)| e.is_loaded())
                .map(|(k, e)| (k.to_string(), snapshot(e)))
                .collect(),
        ),
        Slot::Unloaded => Value::Map(Vec::new()),
    }
}

/// Walk `segs` down from `table`, loading groups on the way.
///
/// Returns the entry at the end of the path; the entry itself is not loaded.
pub fn resolve<'t>(
    table: &'t mut EntryTable,
    loader: &LazyLoader<'_>,
    prefix: &str,
    segs: &[&str],
) -> Result<&'t mut Entry> {
    let (first, rest) = segs
        .split_first()
        .ok_or_else(|| HdictError::InvalidKey("empty key".into()))?;
    let path = key::join(prefix, first);
    let entry = table.get_mut(first).ok_or_else(|| {
        let mut missing = path.clone();
        for seg in rest {
            missing = key::join(&missing, seg);
        }
        HdictError::KeyNotFound(missing)
    })?;
    if rest.is_empty() {
        return Ok(entry);
    }
    loader.ensure_loaded(entry, &path)?;
    match &mut entry.slot {
        Slot::Group(inner) => resolve(inner, loader, &path, rest),
        _ => Err(HdictError::KeyNotFound(format!("{}/{}", path, rest.join("/")))),
    }
}

/// Walk to the group at `segs`, loading on the way.
///
/// With `create`, missing groups are added and their paths appended to
/// `created`; without it a missing segment yields `Ok(None)`. A dataset in
/// the way is an `InvalidState` error either way.
pub fn group_table<'t>(
    table: &'t mut EntryTable,
    loader: &LazyLoader<'_>,
    prefix: &str,
    segs: &[&str],
    create: bool,
    created: &mut Vec<String>,
) -> Result<Option<&'t mut EntryTable>> {
    let Some((first, rest)) = segs.split_first() else {
        return Ok(Some(table));
    };
    let path = key::join(prefix, first);
    if !table.contains(first) {
        if !create {
            return Ok(None);
        }
        table.insert(
            first.to_string(),
            Entry {
                slot: Slot::Group(EntryTable::new()),
                from_file: false,
                bound: false,
            },
        );
        created.push(path.clone());
    }
    let Some(entry) = table.get_mut(first) else {
        return Ok(None);
    };
    loader.ensure_loaded(entry, &path)?;
    match &mut entry.slot {
        Slot::Group(inner) => group_table(inner, loader, &path, rest, create, created),
        _ => Err(HdictError::InvalidState(format!("'{path}' is not a group"))),
    }
}
