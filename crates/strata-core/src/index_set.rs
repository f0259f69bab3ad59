//! Run-length encoded sets of object ids.
//!
//! An [`IndexSet`] stores sorted, non-overlapping, non-adjacent half-open
//! ranges. Adjacent inserts are coalesced so that large contiguous selections
//! cost a single range regardless of how many objects they cover.

use std::ops::Range;

use crate::handle::ObjectId;

/// A set of object ids stored as coalesced ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    ranges: Vec<Range<ObjectId>>,
}

impl IndexSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding every id in `range`.
    pub fn from_range(range: Range<ObjectId>) -> Self {
        let mut set = Self::new();
        set.insert_range(range);
        set
    }

    /// Inserts a single id.
    pub fn insert(&mut self, id: ObjectId) {
        self.insert_range(id..id + 1);
    }

    /// Inserts every id in `range`, merging with neighbouring ranges.
    pub fn insert_range(&mut self, range: Range<ObjectId>) {
        if range.is_empty() {
            return;
        }
        // Fast path for sorted construction.
        if let Some(last) = self.ranges.last_mut() {
            if range.start > last.end {
                self.ranges.push(range);
                return;
            }
            if range.start >= last.start {
                last.end = last.end.max(range.end);
                return;
            }
        } else {
            self.ranges.push(range);
            return;
        }

        let first = self.ranges.partition_point(|r| r.end < range.start);
        let last = self.ranges.partition_point(|r| r.start <= range.end);
        let merged = if first < last {
            self.ranges[first].start.min(range.start)..self.ranges[last - 1].end.max(range.end)
        } else {
            range
        };
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Removes every id in `range`, splitting ranges where needed.
    pub fn remove_range(&mut self, range: Range<ObjectId>) {
        if range.is_empty() {
            return;
        }
        let first = self.ranges.partition_point(|r| r.end <= range.start);
        let last = self.ranges.partition_point(|r| r.start < range.end);
        if first >= last {
            return;
        }
        let mut pieces = Vec::with_capacity(2);
        let head = &self.ranges[first];
        if head.start < range.start {
            pieces.push(head.start..range.start);
        }
        let tail = &self.ranges[last - 1];
        if tail.end > range.end {
            pieces.push(range.end..tail.end);
        }
        self.ranges.splice(first..last, pieces);
    }

    /// Removes a single id.
    pub fn remove(&mut self, id: ObjectId) {
        self.remove_range(id..id + 1);
    }

    /// Returns true if `id` is in the set.
    pub fn contains(&self, id: ObjectId) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= id);
        self.ranges.get(idx).is_some_and(|r| r.start <= id)
    }

    /// Returns the number of ids in the set.
    pub fn count(&self) -> usize {
        self.ranges.iter().map(|r| (r.end - r.start) as usize).sum()
    }

    /// Returns true if the set holds no ids.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the coalesced ranges in ascending order.
    pub fn ranges(&self) -> &[Range<ObjectId>] {
        &self.ranges
    }

    /// Iterates every id in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.ranges.iter().flat_map(Clone::clone)
    }

    /// Adds every id of `other` to this set.
    pub fn union_with(&mut self, other: &IndexSet) {
        for range in &other.ranges {
            self.insert_range(range.clone());
        }
    }

    /// Returns true if any of `ids` is in the set.
    pub fn intersects_any<I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = ObjectId>,
    {
        !self.is_empty() && ids.into_iter().any(|id| self.contains(id))
    }

    /// Returns true if the two sets share at least one id.
    pub fn intersects(&self, other: &IndexSet) -> bool {
        let (mut a, mut b) = (self.ranges.iter().peekable(), other.ranges.iter().peekable());
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            if x.start < y.end && y.start < x.end {
                return true;
            }
            if x.end <= y.end {
                a.next();
            } else {
                b.next();
            }
        }
        false
    }

    /// Removes all ids.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

impl FromIterator<ObjectId> for IndexSet {
    fn from_iter<T: IntoIterator<Item = ObjectId>>(iter: T) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl From<Range<ObjectId>> for IndexSet {
    fn from(range: Range<ObjectId>) -> Self {
        Self::from_range(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_inserts_coalesce() {
        let mut set = IndexSet::new();
        set.insert(3);
        set.insert(4);
        set.insert(2);
        assert_eq!(set.ranges(), &[2..5]);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_insert_bridges_ranges() {
        let mut set = IndexSet::new();
        set.insert_range(0..2);
        set.insert_range(5..8);
        set.insert_range(10..12);
        set.insert_range(1..6);
        assert_eq!(set.ranges(), &[0..8, 10..12]);
    }

    #[test]
    fn test_insert_before_existing() {
        let mut set = IndexSet::from_range(10..20);
        set.insert_range(0..5);
        assert_eq!(set.ranges(), &[0..5, 10..20]);
    }

    #[test]
    fn test_remove_splits_range() {
        let mut set = IndexSet::from_range(0..10);
        set.remove_range(3..5);
        assert_eq!(set.ranges(), &[0..3, 5..10]);
        assert!(!set.contains(4));
        assert!(set.contains(5));
        assert_eq!(set.count(), 8);
    }

    #[test]
    fn test_remove_across_ranges() {
        let mut set: IndexSet = [0, 1, 2, 5, 6, 9].into_iter().collect();
        set.remove_range(1..6);
        assert_eq!(set.ranges(), &[0..1, 6..7, 9..10]);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut set = IndexSet::from_range(0..3);
        set.remove_range(5..9);
        assert_eq!(set.ranges(), &[0..3]);
    }

    #[test]
    fn test_intersections() {
        let a = IndexSet::from_range(0..5);
        let b = IndexSet::from_range(5..9);
        let c = IndexSet::from_range(4..6);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(b.intersects(&c));
        assert!(a.intersects_any([7, 3]));
        assert!(!a.intersects_any([7, 8]));
    }

    #[test]
    fn test_union_merges_touching_ranges() {
        let mut set = IndexSet::from_range(0..3);
        let other: IndexSet = [3, 4, 9].into_iter().collect();
        set.union_with(&other);
        assert_eq!(set.ranges(), &[0..5, 9..10]);
    }

    #[test]
    fn test_iter_yields_ids_in_order() {
        let set: IndexSet = [7, 1, 2].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2, 7]);
    }
}
