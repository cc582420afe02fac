//! Tracking of unsaved changes.
//!
//! Marks are kept per full key path in the order they were first made.
//! Array element writes record the touched flat regions so a save can patch
//! only those bytes.

use hdict_core::types::{key, merge_region, Region};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyMark {
    /// Rewrite the whole value (and, for a group, everything below it).
    Full,
    /// Patch these sorted, disjoint regions of an array.
    Regions(Vec<Region>),
    /// Remove the key from the file.
    Deleted,
}

#[derive(Debug, Clone)]
pub struct DirtyTracker {
    marks: Vec<(String, DirtyMark)>,
    max_regions: usize,
}

impl DirtyTracker {
    pub fn new(max_regions: usize) -> Self {
        Self {
            marks: Vec::new(),
            max_regions: max_regions.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn get(&self, key: &str) -> Option<&DirtyMark> {
        self.position(key).map(|i| &self.marks[i].1)
    }

    /// Keys with a pending write, in first-marked order.
    ///
    /// Each call returns a fresh iterator over the current marks.
    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.marks.iter().map(|(k, _)| k.as_str())
    }

    /// Copy of the pending marks, in order.
    pub fn snapshot(&self) -> Vec<(String, DirtyMark)> {
        self.marks.clone()
    }

    pub fn mark_full(&mut self, key: &str) {
        if self.covered_by_ancestor(key) {
            return;
        }
        self.drop_descendants(key);
        self.upsert(key, DirtyMark::Full);
    }

    pub fn mark_region(&mut self, key: &str, region: Region) {
        if region.is_empty() || self.covered_by_ancestor(key) {
            return;
        }
        let max_regions = self.max_regions;
        match self.position(key) {
            Some(i) => match &mut self.marks[i].1 {
                DirtyMark::Full => {}
                mark @ DirtyMark::Deleted => *mark = DirtyMark::Full,
                DirtyMark::Regions(regions) => {
                    merge_region(regions, region);
                    if regions.len() > max_regions {
                        if let Some(bounding) = Region::bounding(regions) {
                            debug!(
                                "'{}' has {} dirty regions, collapsing to {:?}",
                                key,
                                regions.len(),
                                bounding
                            );
                            *regions = vec![bounding];
                        }
                    }
                }
            },
            None => self
                .marks
                .push((key.to_string(), DirtyMark::Regions(vec![region]))),
        }
    }

    pub fn mark_deleted(&mut self, key: &str) {
        // a full rewrite of an ancestor already drops whatever is gone
        if self.covered_by_ancestor(key) {
            return;
        }
        self.drop_descendants(key);
        self.upsert(key, DirtyMark::Deleted);
    }

    /// Turn a region mark into a full rewrite.
    pub fn widen(&mut self, key: &str) {
        if let Some(i) = self.position(key) {
            if let DirtyMark::Regions(_) = self.marks[i].1 {
                self.marks[i].1 = DirtyMark::Full;
            }
        }
    }

    pub fn clear(&mut self, key: &str) {
        if let Some(i) = self.position(key) {
            self.marks.remove(i);
        }
    }

    pub fn clear_all(&mut self) {
        self.marks.clear();
    }

    /// The mark key that covers `key`: `key` itself or an ancestor with a
    /// full mark.
    pub fn covering(&self, key: &str) -> Option<&str> {
        self.marks
            .iter()
            .find(|(k, mark)| {
                k == key || (*mark == DirtyMark::Full && key::is_within(key, k))
            })
            .map(|(k, _)| k.as_str())
    }

    /// True if `key`, anything below it, or a fully rewritten ancestor has a
    /// pending write.
    pub fn touches(&self, key: &str) -> bool {
        self.marks.iter().any(|(k, mark)| {
            key::is_within(k, key) || (*mark == DirtyMark::Full && key::is_within(key, k))
        })
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.marks.iter().position(|(k, _)| k == key)
    }

    fn covered_by_ancestor(&self, key: &str) -> bool {
        self.marks
            .iter()
            .any(|(k, mark)| *mark == DirtyMark::Full && k != key && key::is_within(key, k))
    }

    fn drop_descendants(&mut self, key: &str) {
        self.marks
            .retain(|(k, _)| k == key || !key::is_within(k, key));
    }

    fn upsert(&mut self, key: &str, mark: DirtyMark) {
        match self.position(key) {
            Some(i) => self.marks[i].1 = mark,
            None => self.marks.push((key.to_string(), mark)),
        }
    }
}
