use crate::dirty::{DirtyMark, DirtyTracker};
use crate::entry::{group_table, resolve, snapshot, Entry, EntryTable, LazyLoader, Slot};
use crate::lock::KeyLock;
use crate::summary;
use crate::sync_array::{ArrayChange, SyncArray};
use hdict_core::{
    config::{AppendPolicy, ClosePolicy, ContainerConfig, OpenMode},
    error::{HdictError, Result, SaveFailure},
    observe,
    store::MemoryStore,
    traits::{HierarchicalStore, ValueCodec},
    types::{key, Dataset, NdArray, NodeInfo, Region, Value, ValueKind},
    DefaultCodec,
};
use hdict_file::FileStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Load, dirty and lock state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryState {
    pub loaded: bool,
    /// The key or something below it has unsaved changes.
    pub dirty: bool,
    pub locked: bool,
    /// `None` while the key is unloaded.
    pub kind: Option<ValueKind>,
}

/// One node of [`Container::keys_tree`].
///
/// `children` is `None` for leaves and for groups that have not been loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyNode {
    pub name: String,
    pub children: Option<Vec<KeyNode>>,
}

enum WriteStep {
    Delete(String),
    CreateGroup(String),
    Put(String, Dataset),
}

/// State shared between a [`Container`] and its bound [`SyncArray`] handles.
pub(crate) struct ContainerInner {
    pub(crate) config: ContainerConfig,
    store: Option<Box<dyn HierarchicalStore>>,
    codec: Box<dyn ValueCodec>,
    pub(crate) table: EntryTable,
    pub(crate) dirty: DirtyTracker,
    pub(crate) locks: KeyLock,
    /// Paths added this session. Their listings never count as from the file.
    created: HashSet<String>,
    closed: bool,
}

impl ContainerInner {
    fn new(
        config: ContainerConfig,
        store: Box<dyn HierarchicalStore>,
        codec: Box<dyn ValueCodec>,
    ) -> Self {
        let dirty = DirtyTracker::new(config.max_regions_per_key);
        Self {
            config,
            store: Some(store),
            codec,
            table: EntryTable::new(),
            dirty,
            locks: KeyLock::new(),
            created: HashSet::new(),
            closed: false,
        }
    }

    fn populate(&mut self) -> Result<()> {
        let eager = self.config.open_on_init;
        let (loader, table) = self.parts()?;
        *table = loader.listing("")?;
        if eager {
            for (name, entry) in table.iter_mut() {
                loader.load_deep(entry, name)?;
            }
        }
        Ok(())
    }

    pub(crate) fn describe(&self) -> String {
        match &self.config.path {
            Some(path) => path.display().to_string(),
            None => "<memory>".to_string(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    fn parts(&mut self) -> Result<(LazyLoader<'_>, &mut EntryTable)> {
        let store = self.store.as_deref().ok_or(HdictError::Closed)?;
        Ok((
            LazyLoader::new(store, self.codec.as_ref(), &self.created),
            &mut self.table,
        ))
    }

    fn store_mut(&mut self) -> Result<&mut Box<dyn HierarchicalStore>> {
        self.store.as_mut().ok_or(HdictError::Closed)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(HdictError::Closed);
        }
        Ok(())
    }

    fn check_writable(&self, action: impl FnOnce() -> String) -> Result<()> {
        self.check_open()?;
        if !self.config.mode.is_writable() {
            return Err(HdictError::ModeViolation(action()));
        }
        Ok(())
    }

    fn rejects_existing(&self) -> bool {
        self.config.mode == OpenMode::Append && self.config.append_policy == AppendPolicy::Reject
    }

    /// True if the key at `segs` was listed in the file when it was opened.
    fn is_from_file(&mut self, segs: &[&str]) -> Result<bool> {
        let Some((name, parents)) = segs.split_last() else {
            return Ok(false);
        };
        let (loader, table) = self.parts()?;
        let mut scratch = Vec::new();
        Ok(
            match group_table(table, &loader, "", parents, false, &mut scratch)? {
                Some(group) => group.get(name).map_or(false, |e| e.from_file),
                None => false,
            },
        )
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Map(pairs) => {
                for (name, child) in pairs {
                    key::validate_segment(name)?;
                    self.check_value(child)?;
                }
                Ok(())
            }
            leaf => self.codec.check(leaf),
        }
    }

    pub(crate) fn get(&mut self, key: &str) -> Result<Value> {
        self.check_open()?;
        let path = key::normalize(key)?;
        let segs = key::split(&path)?;
        let (loader, table) = self.parts()?;
        let entry = resolve(table, &loader, "", &segs)?;
        loader.materialize(entry, &path)
    }

    pub(crate) fn contains(&mut self, key: &str) -> Result<bool> {
        self.check_open()?;
        let path = key::normalize(key)?;
        let segs = key::split(&path)?;
        let Some((name, parents)) = segs.split_last() else {
            return Ok(false);
        };
        let (loader, table) = self.parts()?;
        let mut scratch = Vec::new();
        match group_table(table, &loader, "", parents, false, &mut scratch) {
            Ok(group) => Ok(group.map_or(false, |g| g.contains(name))),
            // a dataset in the way
            Err(HdictError::InvalidState(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path = key::normalize(key)?;
        self.check_writable(|| format!("set '{path}'"))?;
        self.locks.check(&path, "set")?;
        self.check_value(&value)?;
        let segs = key::split(&path)?;
        if self.rejects_existing() && self.is_from_file(&segs)? {
            return Err(HdictError::AppendConflict(path.clone()));
        }
        let Some((name, parents)) = segs.split_last() else {
            return Err(HdictError::InvalidKey("empty key".into()));
        };

        let mut nested = Vec::new();
        collect_map_paths(&value, &path, &mut nested);
        let mut new_groups = Vec::new();
        let replaced = {
            let (loader, table) = self.parts()?;
            let group = group_table(table, &loader, "", parents, true, &mut new_groups)?
                .ok_or_else(|| HdictError::InvalidState(format!("no parent group for '{path}'")))?;
            let mut entry = Entry::from_value(value);
            if let Some(old) = group.get(name) {
                entry.from_file = old.from_file;
                entry.bound = old.bound;
            }
            group.insert(name.to_string(), entry).is_some()
        };

        if !replaced {
            self.created.insert(path.clone());
        }
        let mark = new_groups.first().cloned().unwrap_or_else(|| path.clone());
        self.created.extend(new_groups);
        self.created.extend(nested);
        self.dirty.mark_full(&mark);
        debug!("Set '{}'", path);
        self.after_edit(&path)
    }

    fn remove_entry(&mut self, key: &str, action: &'static str) -> Result<Entry> {
        let path = key::normalize(key)?;
        self.check_writable(|| format!("{action} '{path}'"))?;
        self.locks.check(&path, action)?;
        let segs = key::split(&path)?;
        if self.rejects_existing() && self.is_from_file(&segs)? {
            return Err(HdictError::AppendConflict(path.clone()));
        }
        let Some((name, parents)) = segs.split_last() else {
            return Err(HdictError::InvalidKey("empty key".into()));
        };
        let removed = {
            let (loader, table) = self.parts()?;
            let mut scratch = Vec::new();
            group_table(table, &loader, "", parents, false, &mut scratch)?
                .and_then(|group| group.remove(name))
        };
        let Some(entry) = removed else {
            return Err(HdictError::KeyNotFound(path.clone()));
        };
        self.created.retain(|c| !key::is_within(c, &path));
        self.dirty.mark_deleted(&path);
        debug!("Removed '{}'", path);
        self.after_edit(&path)?;
        Ok(entry)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Result<()> {
        self.remove_entry(key, "delete").map(|_| ())
    }

    pub(crate) fn pop(&mut self, key: &str) -> Result<Value> {
        let path = key::normalize(key)?;
        self.check_writable(|| format!("pop '{path}'"))?;
        self.locks.check(&path, "pop")?;
        // load before the entry leaves the table
        self.get(&path)?;
        let entry = self.remove_entry(&path, "pop")?;
        Ok(snapshot(&entry))
    }

    /// Fail with `InvalidState` if a dataset sits where `segs` needs a group.
    fn check_parents(&mut self, segs: &[&str]) -> Result<()> {
        let Some((_, parents)) = segs.split_last() else {
            return Err(HdictError::InvalidKey("empty key".into()));
        };
        let (loader, table) = self.parts()?;
        let mut scratch = Vec::new();
        group_table(table, &loader, "", parents, false, &mut scratch).map(|_| ())
    }

    /// Assign several keys. Locks, values, parent groups and append
    /// conflicts are checked for every key before any is applied.
    pub(crate) fn update(&mut self, pairs: Vec<(String, Value)>) -> Result<()> {
        self.check_writable(|| "update".to_string())?;
        let mut normalized = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            normalized.push((key::normalize(&k)?, v));
        }
        for (i, (path, value)) in normalized.iter().enumerate() {
            self.locks.check(path, "update")?;
            self.check_value(value)?;
            self.check_parents(&key::split(path)?)?;
            // an earlier pair may turn a parent of this one into a dataset
            let shadowed = normalized[..i].iter().find(|(earlier, v)| {
                earlier != path && key::is_within(path, earlier) && !matches!(v, Value::Map(_))
            });
            if let Some((earlier, _)) = shadowed {
                return Err(HdictError::InvalidState(format!("'{earlier}' is not a group")));
            }
        }
        if self.rejects_existing() {
            for (path, _) in &normalized {
                let segs = key::split(path)?;
                if self.is_from_file(&segs)? {
                    return Err(HdictError::AppendConflict(path.clone()));
                }
            }
        }
        for (path, value) in normalized {
            self.set(&path, value)?;
        }
        Ok(())
    }

    /// Every top-level key with its fully loaded value.
    pub(crate) fn items(&mut self) -> Result<Vec<(String, Value)>> {
        self.check_open()?;
        let (loader, table) = self.parts()?;
        table
            .iter_mut()
            .map(|(name, entry)| Ok((name.to_string(), loader.materialize(entry, name)?)))
            .collect()
    }

    pub(crate) fn with_array<R>(&mut self, path: &str, f: impl FnOnce(&NdArray) -> R) -> Result<R> {
        self.check_open()?;
        let segs = key::split(path)?;
        let (loader, table) = self.parts()?;
        let entry = resolve(table, &loader, "", &segs)?;
        loader.ensure_loaded(entry, path)?;
        match &entry.slot {
            Slot::Value(Value::Array(arr)) => Ok(f(arr)),
            _ => Err(not_an_array(path)),
        }
    }

    /// Record that a handle refers to the array at `path`.
    fn attach_handle(&mut self, path: &str) -> Result<()> {
        self.check_open()?;
        let segs = key::split(path)?;
        let (loader, table) = self.parts()?;
        let entry = resolve(table, &loader, "", &segs)?;
        loader.ensure_loaded(entry, path)?;
        if !matches!(entry.slot, Slot::Value(Value::Array(_))) {
            return Err(not_an_array(path));
        }
        entry.bound = true;
        Ok(())
    }

    pub(crate) fn mutate_array(
        &mut self,
        path: &str,
        action: &'static str,
        f: impl FnOnce(&mut NdArray) -> Result<ArrayChange>,
    ) -> Result<()> {
        self.check_writable(|| format!("{action} '{path}'"))?;
        self.locks.check(path, action)?;
        let reject = self.rejects_existing();
        let segs = key::split(path)?;
        let change = {
            let (loader, table) = self.parts()?;
            let entry = resolve(table, &loader, "", &segs)?;
            if reject && entry.from_file {
                return Err(HdictError::AppendConflict(path.to_string()));
            }
            loader.ensure_loaded(entry, path)?;
            match &mut entry.slot {
                Slot::Value(Value::Array(arr)) => f(arr)?,
                _ => return Err(not_an_array(path)),
            }
        };
        match change {
            ArrayChange::Region(region) => self.dirty.mark_region(path, region),
            ArrayChange::Structural => self.dirty.mark_full(path),
        }
        self.after_edit(path)
    }

    fn after_edit(&mut self, path: &str) -> Result<()> {
        observe::set_dirty_keys(self.dirty.len());
        if !self.config.save_on_edit {
            return Ok(());
        }
        let Some(mark_key) = self.dirty.covering(path).map(str::to_string) else {
            return Ok(());
        };
        let Some(mark) = self.dirty.get(&mark_key).cloned() else {
            return Ok(());
        };
        self.write_mark(&mark_key, &mark)?;
        self.dirty.clear(&mark_key);
        self.store_mut()?.flush()?;
        observe::set_dirty_keys(self.dirty.len());
        Ok(())
    }

    /// Write pending marks, optionally only those overlapping `filter`.
    ///
    /// Keys written successfully are cleared even when others fail; the
    /// failures are returned together as `SaveFailed`.
    pub(crate) fn save_marks(&mut self, filter: Option<&[String]>) -> Result<()> {
        self.check_open()?;
        let marks: Vec<(String, DirtyMark)> = self
            .dirty
            .snapshot()
            .into_iter()
            .filter(|(k, _)| {
                filter.map_or(true, |keys| {
                    keys.iter()
                        .any(|f| key::is_within(k, f) || key::is_within(f, k))
                })
            })
            .collect();
        if marks.is_empty() {
            return Ok(());
        }
        self.check_writable(|| "save".to_string())?;

        let start = Instant::now();
        let mut written = 0;
        let mut failures = Vec::new();
        for (k, mark) in &marks {
            match self.write_mark(k, mark) {
                Ok(()) => {
                    self.dirty.clear(k);
                    written += 1;
                }
                Err(e) => {
                    warn!("Failed to save '{}': {}", k, e);
                    failures.push(SaveFailure {
                        key: k.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        let flushed = if written > 0 {
            self.store_mut()?.flush()
        } else {
            Ok(())
        };
        observe::record_save(
            start.elapsed(),
            written,
            failures.is_empty() && flushed.is_ok(),
        );
        observe::set_dirty_keys(self.dirty.len());
        flushed?;
        if !failures.is_empty() {
            return Err(HdictError::SaveFailed(failures));
        }
        debug!(
            "Saved {} key(s) to {} in {:?}",
            written,
            self.describe(),
            start.elapsed()
        );
        Ok(())
    }

    fn write_mark(&mut self, path: &str, mark: &DirtyMark) -> Result<()> {
        match mark {
            DirtyMark::Deleted => {
                let existed = self.store_mut()?.delete(path)?;
                debug!("Deleted '{}' from store (present: {})", path, existed);
                Ok(())
            }
            DirtyMark::Full => {
                let steps = self.plan_full(path)?;
                self.apply(steps)
            }
            DirtyMark::Regions(regions) => self.write_regions(path, regions),
        }
    }

    /// Writes that replace whatever the store holds at `path` with the
    /// in-memory entry.
    fn plan_full(&mut self, path: &str) -> Result<Vec<WriteStep>> {
        let segs = key::split(path)?;
        let (loader, table) = self.parts()?;
        let entry = resolve(table, &loader, "", &segs)?;
        loader.load_deep(entry, path)?;

        let mut steps = Vec::new();
        match (loader.store().info(path)?, entry.is_group()) {
            (Some(NodeInfo::Group), _) | (Some(_), true) => {
                steps.push(WriteStep::Delete(path.to_string()))
            }
            _ => {}
        }
        plan_entry(entry, path, loader.codec(), &mut steps)?;
        Ok(steps)
    }

    fn apply(&mut self, steps: Vec<WriteStep>) -> Result<()> {
        let store = self.store_mut()?;
        for step in steps {
            match step {
                WriteStep::Delete(path) => {
                    store.delete(&path)?;
                }
                WriteStep::CreateGroup(path) => store.create_group(&path)?,
                WriteStep::Put(path, dataset) => {
                    debug!("Writing '{}' ({} bytes)", path, dataset.data.len());
                    store.put(&path, dataset)?;
                    observe::record_full_write();
                }
            }
        }
        Ok(())
    }

    fn write_regions(&mut self, path: &str, regions: &[Region]) -> Result<()> {
        let patches = self.region_patches(path, regions)?;
        let mut unpatchable = None;
        {
            let store = self.store_mut()?;
            for (region, bytes) in &patches {
                match store.put_region(path, *region, bytes) {
                    Ok(()) => {
                        debug!("Patched '{}' at {:?}", path, region);
                        observe::record_region_write(bytes.len());
                    }
                    Err(HdictError::Unpatchable { reason, .. }) => {
                        unpatchable = Some(reason);
                        break;
                    }
                    Err(HdictError::KeyNotFound(_)) => {
                        unpatchable = Some("not in the store".to_string());
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        if let Some(reason) = unpatchable {
            warn!(
                "Cannot patch '{}' in place ({}), rewriting the whole value",
                path, reason
            );
            observe::record_widened();
            self.dirty.widen(path);
            let steps = self.plan_full(path)?;
            self.apply(steps)?;
        }
        Ok(())
    }

    fn region_patches(&mut self, path: &str, regions: &[Region]) -> Result<Vec<(Region, Vec<u8>)>> {
        let segs = key::split(path)?;
        let (loader, table) = self.parts()?;
        let entry = resolve(table, &loader, "", &segs)?;
        loader.ensure_loaded(entry, path)?;
        let Slot::Value(Value::Array(arr)) = &entry.slot else {
            return Err(not_an_array(path));
        };
        regions
            .iter()
            .map(|region| Ok((*region, arr.region_bytes(*region)?)))
            .collect()
    }

    fn key_list(&self, keys: Option<&[&str]>) -> Result<Vec<String>> {
        match keys {
            None => Ok(self.table.keys().map(String::from).collect()),
            Some(keys) => keys.iter().map(|k| key::normalize(k)).collect(),
        }
    }

    pub(crate) fn lock_data(&mut self, keys: Option<&[&str]>) -> Result<()> {
        self.check_writable(|| "lock keys".to_string())?;
        let keys = self.key_list(keys)?;
        debug!("Locking {:?}", keys);
        self.locks.lock(keys);
        Ok(())
    }

    pub(crate) fn unlock_data(&mut self, keys: Option<&[&str]>) -> Result<()> {
        self.check_writable(|| "unlock keys".to_string())?;
        match keys {
            None => self.locks.unlock_all(),
            Some(_) => {
                let keys = self.key_list(keys)?;
                debug!("Unlocking {:?}", keys);
                self.locks.unlock(keys);
            }
        }
        Ok(())
    }

    pub(crate) fn load(&mut self, keys: Option<&[&str]>) -> Result<()> {
        self.check_open()?;
        for path in self.key_list(keys)? {
            let segs = key::split(&path)?;
            let (loader, table) = self.parts()?;
            let entry = resolve(table, &loader, "", &segs)?;
            loader.load_deep(entry, &path)?;
        }
        Ok(())
    }

    /// Drop loaded values back to the unloaded state. Keys with unsaved
    /// changes are refused when named and skipped when unloading everything.
    pub(crate) fn unload(&mut self, keys: Option<&[&str]>) -> Result<()> {
        self.check_open()?;
        let targets: Vec<String> = match keys {
            None => self
                .key_list(None)?
                .into_iter()
                .filter(|k| !self.dirty.touches(k))
                .collect(),
            Some(_) => {
                let targets = self.key_list(keys)?;
                if let Some(dirty) = targets.iter().find(|k| self.dirty.touches(k)) {
                    return Err(HdictError::InvalidState(format!(
                        "'{dirty}' has unsaved changes and cannot be unloaded"
                    )));
                }
                targets
            }
        };
        for path in targets {
            let segs = key::split(&path)?;
            let (loader, table) = self.parts()?;
            if !loader.store().exists(&path)? {
                return Err(HdictError::InvalidState(format!(
                    "'{path}' is not in the store and cannot be unloaded"
                )));
            }
            let entry = resolve(table, &loader, "", &segs)?;
            entry.slot = Slot::Unloaded;
            debug!("Unloaded '{}'", path);
        }
        Ok(())
    }

    pub(crate) fn keys_unloaded(&self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.table.unloaded_paths(""))
    }

    pub(crate) fn entry_state(&self, key: &str) -> Result<Option<EntryState>> {
        self.check_open()?;
        let path = key::normalize(key)?;
        let segs = key::split(&path)?;
        let locked = self.locks.is_locked(&path);
        for depth in 1..=segs.len() {
            match self.table.peek(&segs[..depth]) {
                None => return Ok(None),
                Some(entry) if depth == segs.len() => {
                    return Ok(Some(EntryState {
                        loaded: entry.is_loaded(),
                        dirty: self.dirty.touches(&path),
                        locked,
                        kind: entry.kind(),
                    }));
                }
                Some(entry) if !entry.is_loaded() => {
                    // below an unloaded group: ask the store
                    let store = self.store.as_deref().ok_or(HdictError::Closed)?;
                    return Ok(store.exists(&path)?.then_some(EntryState {
                        loaded: false,
                        dirty: false,
                        locked,
                        kind: None,
                    }));
                }
                Some(_) => {}
            }
        }
        Ok(None)
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut result = Ok(());
        if !self.dirty.is_empty() {
            match self.config.close_policy {
                ClosePolicy::Flush => result = self.save_marks(None),
                ClosePolicy::Warn => {
                    let keys: Vec<&str> = self.dirty.dirty_keys().collect();
                    warn!(
                        "Closing {} with {} unsaved key(s), discarding: {:?}",
                        self.describe(),
                        keys.len(),
                        keys
                    );
                }
            }
        }
        if let Some(mut store) = self.store.take() {
            let released = store.close();
            if result.is_ok() {
                result = released;
            }
        }
        self.closed = true;
        self.table.clear();
        self.dirty.clear_all();
        self.locks.unlock_all();
        observe::set_dirty_keys(0);
        info!("Closed container {}", self.describe());
        result
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing container {}: {}", self.describe(), e);
        }
    }
}

fn plan_entry(
    entry: &Entry,
    path: &str,
    codec: &dyn ValueCodec,
    steps: &mut Vec<WriteStep>,
) -> Result<()> {
    match &entry.slot {
        Slot::Value(value) => steps.push(WriteStep::Put(path.to_string(), codec.encode(value)?)),
        Slot::Group(table) => {
            steps.push(WriteStep::CreateGroup(path.to_string()));
            for (name, child) in table.iter() {
                plan_entry(child, &key::join(path, name), codec, steps)?;
            }
        }
        Slot::Unloaded => {
            return Err(HdictError::InvalidState(format!(
                "'{path}' must be loaded before it is written"
            )))
        }
    }
    Ok(())
}

fn collect_map_paths(value: &Value, path: &str, out: &mut Vec<String>) {
    if let Value::Map(pairs) = value {
        for (name, child) in pairs {
            let child_path = key::join(path, name);
            collect_map_paths(child, &child_path, out);
            out.push(child_path);
        }
    }
}

fn not_an_array(path: &str) -> HdictError {
    HdictError::InvalidState(format!("'{path}' is not an array"))
}

fn key_tree(table: &EntryTable) -> Vec<KeyNode> {
    table
        .iter()
        .map(|(name, entry)| KeyNode {
            name: name.to_string(),
            children: match &entry.slot {
                Slot::Group(inner) => Some(key_tree(inner)),
                _ => None,
            },
        })
        .collect()
}

/// A dictionary of named values kept in sync with a hierarchical file.
///
/// Keys are slash-joined paths; nested mappings are stored as groups. With a
/// lazy open only the key listing is read and each value is loaded on first
/// access. Changes are tracked per key (per element region for arrays) and
/// written by [`save`](Self::save), or immediately under save-on-edit.
///
/// Dropping an open container closes it, applying the configured
/// [`ClosePolicy`] to unsaved changes.
pub struct Container {
    inner: Arc<Mutex<ContainerInner>>,
}

impl Container {
    /// Open the store described by `config`.
    ///
    /// Without a path the container lives in memory.
    pub fn open(config: ContainerConfig) -> Result<Self> {
        config.validate()?;
        let store: Box<dyn HierarchicalStore> = match &config.path {
            Some(path) => Box::new(FileStore::open(path, config.mode, config.store.clone())?),
            None if config.mode == OpenMode::Read => {
                return Err(HdictError::Config("read mode requires a file path".into()));
            }
            None => Box::new(MemoryStore::new().reopen(config.mode)?),
        };
        Self::open_with_store(config, store)
    }

    /// Open over an already opened store. The store's mode wins over
    /// `config.mode`.
    pub fn open_with_store(config: ContainerConfig, store: Box<dyn HierarchicalStore>) -> Result<Self> {
        Self::open_with_codec(config, store, Box::new(DefaultCodec))
    }

    pub fn open_with_codec(
        mut config: ContainerConfig,
        store: Box<dyn HierarchicalStore>,
        codec: Box<dyn ValueCodec>,
    ) -> Result<Self> {
        config.mode = store.mode();
        config.validate()?;
        let start = Instant::now();
        let mut inner = ContainerInner::new(config, store, codec);
        inner.populate()?;
        info!(
            "Opened container {} in mode '{}' ({} keys, {} unloaded) in {:?}",
            inner.describe(),
            inner.config.mode,
            inner.table.len(),
            inner.table.unloaded_paths("").len(),
            start.elapsed()
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Empty container with no backing file.
    pub fn in_memory() -> Result<Self> {
        Self::open(ContainerConfig::in_memory())
    }

    /// Create a new file; fails if it exists.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ContainerConfig::new(path, OpenMode::Write))
    }

    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ContainerConfig::new(path, OpenMode::Read))
    }

    pub fn append(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ContainerConfig::new(path, OpenMode::Append))
    }

    /// Create a file, truncating any existing one.
    pub fn overwrite(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ContainerConfig::new(path, OpenMode::Overwrite))
    }

    /// Open with a mode string: `r`, `w`, `a` or `o`, with a trailing `=`
    /// for save-on-edit.
    pub fn open_str(path: impl Into<PathBuf>, mode: &str) -> Result<Self> {
        Self::open(ContainerConfig::from_mode_str(path, mode)?)
    }

    pub fn mode(&self) -> OpenMode {
        self.inner.lock().config.mode
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().config.path.clone()
    }

    pub fn config(&self) -> ContainerConfig {
        self.inner.lock().config.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }

    /// Value at `key`, loading it on first access. Groups are returned as
    /// [`Value::Map`].
    pub fn get(&self, key: &str) -> Result<Value> {
        self.inner.lock().get(key)
    }

    /// Assign `key`, creating missing parent groups.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.inner.lock().set(key, value.into())
    }

    /// True if the key exists, loaded or not.
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.inner.lock().contains(key)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.contains(key)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.inner.lock().remove(key)
    }

    /// Remove `key` and return its value.
    pub fn pop(&self, key: &str) -> Result<Value> {
        self.inner.lock().pop(key)
    }

    pub fn update<K, V, I>(&self, pairs: I) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.inner.lock().update(pairs)
    }

    /// Value at `key`, or `default` when there is no such key.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        match self.get(key) {
            Err(HdictError::KeyNotFound(_)) => Ok(default.into()),
            other => other,
        }
    }

    /// Top-level keys and their values. Loads everything.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.inner.lock().items()
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner.table.keys().map(String::from).collect())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full paths of keys known from the file but not loaded yet.
    pub fn keys_unloaded(&self) -> Result<Vec<String>> {
        self.inner.lock().keys_unloaded()
    }

    /// Key structure, without loading anything.
    pub fn keys_tree(&self) -> Result<Vec<KeyNode>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(key_tree(&inner.table))
    }

    pub fn entry_state(&self, key: &str) -> Result<Option<EntryState>> {
        self.inner.lock().entry_state(key)
    }

    /// Bound handle on the array at `key`.
    pub fn array(&self, key: &str) -> Result<SyncArray> {
        let path = key::normalize(key)?;
        self.inner.lock().attach_handle(&path)?;
        Ok(SyncArray::bound(Arc::downgrade(&self.inner), path))
    }

    /// Store the current contents of `array` at `key` and return a handle
    /// bound to it.
    pub fn bind(&self, key: &str, array: SyncArray) -> Result<SyncArray> {
        let data = array.to_array()?;
        self.set(key, data)?;
        self.array(key)
    }

    pub fn load(&self, keys: &[&str]) -> Result<()> {
        self.inner.lock().load(Some(keys))
    }

    pub fn load_all(&self) -> Result<()> {
        self.inner.lock().load(None)
    }

    /// Release the loaded values of clean keys; they are read again on next
    /// access.
    pub fn unload(&self, keys: &[&str]) -> Result<()> {
        self.inner.lock().unload(Some(keys))
    }

    pub fn unload_all(&self) -> Result<()> {
        self.inner.lock().unload(None)
    }

    /// Write every pending change.
    pub fn save(&self) -> Result<()> {
        self.inner.lock().save_marks(None)
    }

    /// Write pending changes at or below `keys` only.
    pub fn save_keys(&self, keys: &[&str]) -> Result<()> {
        let keys = keys
            .iter()
            .map(|k| key::normalize(k))
            .collect::<Result<Vec<_>>>()?;
        self.inner.lock().save_marks(Some(&keys))
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.inner.lock().dirty.is_empty()
    }

    /// Keys with pending writes, in the order they were first changed.
    pub fn dirty_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .dirty
            .dirty_keys()
            .map(String::from)
            .collect()
    }

    /// Make `keys` read-only.
    pub fn lock_data(&self, keys: &[&str]) -> Result<()> {
        self.inner.lock().lock_data(Some(keys))
    }

    /// Make every current top-level key read-only.
    pub fn lock_all(&self) -> Result<()> {
        self.inner.lock().lock_data(None)
    }

    pub fn unlock_data(&self, keys: &[&str]) -> Result<()> {
        self.inner.lock().unlock_data(Some(keys))
    }

    pub fn unlock_all(&self) -> Result<()> {
        self.inner.lock().unlock_data(None)
    }

    pub fn is_locked(&self, key: &str) -> Result<bool> {
        let path = key::normalize(key)?;
        Ok(self.inner.lock().locks.is_locked(&path))
    }

    pub fn locked_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .locks
            .locked_keys()
            .map(String::from)
            .collect()
    }

    /// Human-readable description of the loaded content.
    pub fn summary(&self) -> String {
        summary::render(&self.inner.lock())
    }

    /// Release the store. Unsaved changes follow the close policy; bound
    /// array handles fail with `Closed` afterwards.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Container")
            .field("path", &inner.config.path)
            .field("mode", &inner.config.mode)
            .field("keys", &inner.table.len())
            .field("dirty", &inner.dirty.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        // handles may still hold the state alive for the length of a call
        let mut inner = self.inner.lock();
        if let Err(e) = inner.close() {
            warn!("Error closing container {}: {}", inner.describe(), e);
        }
    }
}
