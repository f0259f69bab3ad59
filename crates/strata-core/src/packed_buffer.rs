//! Growable byte arena that keeps live records densely packed.
//!
//! Records are variable sized and opaque. Every record gets a [`SlotId`] that
//! stays valid until the record is removed, even though the record's byte
//! offset moves when earlier records are removed and the arena compacts.
//! When an insert does not fit, capacity doubles and the content is copied
//! into the new backing store; dependents are told through the
//! `reallocated` flag and the optional reallocation listener.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::ops::Range;

use crate::handle::SlotId;

/// Outcome of [`PackedOverrideBuffer::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    /// Slot assigned to the new record.
    pub slot: SlotId,
    /// Whether the backing store was replaced to make room.
    pub reallocated: bool,
    /// Bytes written by this insert.
    pub update_range: Range<usize>,
}

type ReallocationListener = Box<dyn FnMut(usize) + Send>;

/// A defragmenting byte arena backing a GPU buffer or lookup texture.
pub struct PackedOverrideBuffer {
    /// Backing store; its length is the capacity.
    data: Vec<u8>,
    /// Bytes in use. Live records occupy `[0, used)` without gaps.
    used: usize,
    /// Current byte range of every slot id; `None` for free ids.
    slots: Vec<Option<Range<usize>>>,
    /// Live slots sorted by byte offset.
    order: Vec<SlotId>,
    free_ids: BinaryHeap<Reverse<u32>>,
    on_reallocate: Option<ReallocationListener>,
}

impl PackedOverrideBuffer {
    /// Creates an arena with `initial_capacity` bytes of backing store.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            data: vec![0; initial_capacity.max(1)],
            used: 0,
            slots: Vec::new(),
            order: Vec::new(),
            free_ids: BinaryHeap::new(),
            on_reallocate: None,
        }
    }

    /// Registers a listener that is called with the new capacity whenever the
    /// backing store is reallocated.
    pub fn set_reallocation_listener(&mut self, listener: impl FnMut(usize) + Send + 'static) {
        self.on_reallocate = Some(Box::new(listener));
    }

    /// Appends a record and returns its slot.
    pub fn add(&mut self, bytes: &[u8]) -> AddResult {
        let required = self.used + bytes.len();
        let reallocated = required > self.data.len();
        if reallocated {
            self.grow_to_fit(required);
        }

        let start = self.used;
        let end = start + bytes.len();
        self.data[start..end].copy_from_slice(bytes);
        self.used = end;

        let slot = match self.free_ids.pop() {
            Some(Reverse(id)) => SlotId(id),
            None => {
                self.slots.push(None);
                SlotId((self.slots.len() - 1) as u32)
            }
        };
        self.slots[slot.0 as usize] = Some(start..end);
        self.order.push(slot);

        AddResult {
            slot,
            reallocated,
            update_range: start..end,
        }
    }

    /// Removes a record, compacting the records stored after it.
    ///
    /// Returns the byte range whose content changed, or `None` when `slot` is
    /// unknown or already removed. Removing such a slot is a no-op.
    pub fn remove(&mut self, slot: SlotId) -> Option<Range<usize>> {
        let range = self.slots.get_mut(slot.0 as usize)?.take()?;
        let len = range.len();
        let old_used = self.used;

        self.data.copy_within(range.end..old_used, range.start);
        self.used -= len;
        self.data[self.used..old_used].fill(0);

        let position = self
            .order
            .iter()
            .position(|s| *s == slot)
            .unwrap_or(self.order.len());
        if position < self.order.len() {
            self.order.remove(position);
        }
        for moved in &self.order[position..] {
            if let Some(Some(r)) = self.slots.get_mut(moved.0 as usize) {
                *r = r.start - len..r.end - len;
            }
        }

        self.free_ids.push(Reverse(slot.0));
        Some(range.start..old_used)
    }

    /// Returns the current byte range of a live slot.
    pub fn range(&self, slot: SlotId) -> Option<Range<usize>> {
        self.slots.get(slot.0 as usize).cloned().flatten()
    }

    /// Returns the content of a live slot.
    pub fn record(&self, slot: SlotId) -> Option<&[u8]> {
        self.range(slot).map(|r| &self.data[r])
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.order.len()
    }

    /// Packed live bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// The whole backing store, including unused capacity.
    pub fn backing(&self) -> &[u8] {
        &self.data
    }

    /// Bytes in use.
    pub fn len(&self) -> usize {
        self.used
    }

    /// Returns true if no bytes are in use.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Size of the backing store in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn grow_to_fit(&mut self, required: usize) {
        let mut capacity = self.data.len().max(1);
        while capacity < required {
            capacity *= 2;
        }
        let mut data = vec![0; capacity];
        data[..self.used].copy_from_slice(&self.data[..self.used]);
        self.data = data;
        log::debug!("packed buffer reallocated to {capacity} bytes");
        if let Some(listener) = self.on_reallocate.as_mut() {
            listener(capacity);
        }
    }
}

impl Default for PackedOverrideBuffer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for PackedOverrideBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedOverrideBuffer")
            .field("capacity", &self.data.len())
            .field("used", &self.used)
            .field("live", &self.order.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_add_and_read_back() {
        let mut buffer = PackedOverrideBuffer::new(16);
        let a = buffer.add(&[1, 2, 3, 4]);
        let b = buffer.add(&[5, 6]);
        assert_eq!(a.update_range, 0..4);
        assert_eq!(b.update_range, 4..6);
        assert!(!a.reallocated && !b.reallocated);
        assert_eq!(buffer.record(a.slot), Some(&[1, 2, 3, 4][..]));
        assert_eq!(buffer.record(b.slot), Some(&[5, 6][..]));
        assert_eq!(buffer.bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_remove_compacts_and_keeps_slot_ids() {
        let mut buffer = PackedOverrideBuffer::new(16);
        let a = buffer.add(&[1, 1]);
        let b = buffer.add(&[2, 2, 2]);
        let c = buffer.add(&[3]);

        let dirty = buffer.remove(b.slot);
        assert_eq!(dirty, Some(2..6));
        assert_eq!(buffer.bytes(), &[1, 1, 3]);
        assert_eq!(buffer.range(c.slot), Some(2..3));
        assert_eq!(buffer.record(a.slot), Some(&[1, 1][..]));
        assert_eq!(buffer.record(b.slot), None);
    }

    #[test]
    fn test_remove_unknown_or_twice_is_noop() {
        let mut buffer = PackedOverrideBuffer::new(8);
        let a = buffer.add(&[9]);
        assert!(buffer.remove(SlotId(77)).is_none());
        assert!(buffer.remove(a.slot).is_some());
        assert!(buffer.remove(a.slot).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_freed_ids_are_reused_lowest_first() {
        let mut buffer = PackedOverrideBuffer::new(8);
        let a = buffer.add(&[1]);
        let b = buffer.add(&[2]);
        let _c = buffer.add(&[3]);
        buffer.remove(b.slot);
        buffer.remove(a.slot);
        assert_eq!(buffer.add(&[4]).slot, a.slot);
        assert_eq!(buffer.add(&[5]).slot, b.slot);
    }

    #[test]
    fn test_growth_doubles_and_copies_content() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut buffer = PackedOverrideBuffer::new(4);
        buffer.set_reallocation_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let a = buffer.add(&[1, 2, 3]);
        let b = buffer.add(&[4, 5, 6]);
        assert!(!a.reallocated);
        assert!(b.reallocated);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let big = buffer.add(&[0; 20]);
        assert!(big.reallocated);
        assert_eq!(buffer.capacity(), 32);
    }

    #[test]
    fn test_add_remove_cycles_never_reallocate() {
        let mut buffer = PackedOverrideBuffer::new(64);
        for _ in 0..1000 {
            let added = buffer.add(&[7; 48]);
            assert!(!added.reallocated);
            buffer.remove(added.slot);
        }
        assert_eq!(buffer.capacity(), 64);
    }

    proptest! {
        #[test]
        fn prop_live_records_stay_packed(ops in proptest::collection::vec((any::<bool>(), 1usize..12, any::<u8>()), 1..80)) {
            let mut buffer = PackedOverrideBuffer::new(8);
            let mut live: Vec<(SlotId, Vec<u8>)> = Vec::new();
            for (is_add, len, fill) in ops {
                if is_add || live.is_empty() {
                    let record = vec![fill; len];
                    let added = buffer.add(&record);
                    live.push((added.slot, record));
                } else {
                    let (slot, _) = live.remove(len % live.len());
                    prop_assert!(buffer.remove(slot).is_some());
                }

                let total: usize = live.iter().map(|(_, r)| r.len()).sum();
                prop_assert_eq!(buffer.len(), total);
                let mut cursor = 0;
                for slot in &buffer.order {
                    let range = buffer.range(*slot).unwrap();
                    prop_assert_eq!(range.start, cursor);
                    cursor = range.end;
                }
                for (slot, record) in &live {
                    prop_assert_eq!(buffer.record(*slot).unwrap(), record.as_slice());
                }
            }
        }
    }
}
