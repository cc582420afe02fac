use serde::{Deserialize, Serialize};

/// A half-open range of flat (row-major) element offsets inside an array.
///
/// Regions are the unit of a patch write: the store receives the bytes of
/// `start..end` and writes them over the persisted array in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "region start must not exceed end");
        Self { start, end }
    }

    /// Region covering a single element.
    pub fn single(offset: usize) -> Self {
        Self::new(offset, offset + 1)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the two ranges overlap or are directly adjacent.
    pub fn touches(&self, other: &Region) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn union(&self, other: &Region) -> Region {
        Region::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Smallest region containing every region in `regions`.
    pub fn bounding(regions: &[Region]) -> Option<Region> {
        let first = regions.first()?;
        Some(regions.iter().skip(1).fold(*first, |acc, r| acc.union(r)))
    }
}

/// Insert `region` into a sorted list of disjoint regions, coalescing any
/// neighbours it overlaps or touches.
pub fn merge_region(regions: &mut Vec<Region>, region: Region) {
    if region.is_empty() {
        return;
    }
    let mut merged = region;
    regions.retain(|r| {
        if r.touches(&merged) {
            merged = merged.union(r);
            false
        } else {
            true
        }
    });
    let pos = regions
        .iter()
        .position(|r| r.start > merged.start)
        .unwrap_or(regions.len());
    regions.insert(pos, merged);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_coalesces_adjacent() {
        let mut regions = Vec::new();
        merge_region(&mut regions, Region::single(3));
        merge_region(&mut regions, Region::single(4));
        merge_region(&mut regions, Region::single(10));
        assert_eq!(regions, vec![Region::new(3, 5), Region::new(10, 11)]);

        merge_region(&mut regions, Region::new(5, 10));
        assert_eq!(regions, vec![Region::new(3, 11)]);
    }

    #[test]
    fn test_merge_keeps_sorted_order() {
        let mut regions = Vec::new();
        merge_region(&mut regions, Region::single(20));
        merge_region(&mut regions, Region::single(0));
        merge_region(&mut regions, Region::single(7));
        assert_eq!(
            regions,
            vec![Region::single(0), Region::single(7), Region::single(20)]
        );
    }

    #[test]
    fn test_bounding() {
        let regions = [Region::new(4, 6), Region::new(1, 2), Region::new(9, 12)];
        assert_eq!(Region::bounding(&regions), Some(Region::new(1, 12)));
        assert_eq!(Region::bounding(&[]), None);
    }
}
