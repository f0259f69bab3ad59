//! Per-object rigid transform overrides.
//!
//! Matrices live in a [`PackedOverrideBuffer`] of 64-byte records. Each object
//! refers to its matrix through a 1-based index so that zero means identity.

use std::collections::HashMap;
use std::ops::Range;

use glam::Mat4;

use crate::error::{Result, StrataError};
use crate::handle::{ObjectId, SlotId};
use crate::packed_buffer::PackedOverrideBuffer;

/// Bytes per matrix record.
pub const TRANSFORM_RECORD_SIZE: usize = std::mem::size_of::<[f32; 16]>();

const INITIAL_MATRIX_CAPACITY: usize = 16;

/// Transform overrides for one model.
#[derive(Debug)]
pub struct TransformOverrideIndex {
    object_count: u32,
    matrices: PackedOverrideBuffer,
    /// `slot + 1` per object, 0 for no override.
    object_slots: Vec<u32>,
    range_slots: HashMap<Range<ObjectId>, SlotId>,
    /// GPU lookup: matrix position + 1 per object, 0 for identity.
    lookup: Vec<u32>,
    reallocated: bool,
    dirty: bool,
    generation: u64,
}

impl TransformOverrideIndex {
    pub fn new(object_count: u32) -> Self {
        Self {
            object_count,
            matrices: PackedOverrideBuffer::new(INITIAL_MATRIX_CAPACITY * TRANSFORM_RECORD_SIZE),
            object_slots: vec![0; object_count as usize],
            range_slots: HashMap::new(),
            lookup: vec![0; object_count as usize],
            reallocated: false,
            dirty: false,
            generation: 0,
        }
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Applies `transform` to every object in `range`.
    ///
    /// Setting the same range again replaces its matrix. Where ranges overlap,
    /// the most recent call wins per object.
    pub fn set_transform(&mut self, range: Range<ObjectId>, transform: Mat4) -> Result<()> {
        self.check_bounds(&range)?;
        if range.is_empty() {
            return Ok(());
        }
        if let Some(previous) = self.range_slots.remove(&range) {
            self.matrices.remove(previous);
        }

        let columns = transform.to_cols_array();
        let added = self.matrices.add(bytemuck::cast_slice(&columns));
        self.reallocated |= added.reallocated;
        self.object_slots[range.start as usize..range.end as usize].fill(added.slot.0 + 1);
        self.range_slots.insert(range, added.slot);
        self.mark_dirty();
        Ok(())
    }

    /// Removes the transform set for exactly `range`.
    ///
    /// Objects that a later overlapping range has claimed keep that range's
    /// transform. Returns whether a transform was registered for `range`.
    pub fn reset_transform(&mut self, range: Range<ObjectId>) -> bool {
        let Some(slot) = self.range_slots.remove(&range) else {
            return false;
        };
        self.matrices.remove(slot);
        let marker = slot.0 + 1;
        for entry in &mut self.object_slots[range.start as usize..range.end as usize] {
            if *entry == marker {
                *entry = 0;
            }
        }
        self.mark_dirty();
        true
    }

    /// Removes every transform.
    pub fn clear(&mut self) {
        let ranges: Vec<_> = self.range_slots.keys().cloned().collect();
        for range in ranges {
            self.reset_transform(range);
        }
    }

    /// The transform currently applied to `object`.
    pub fn transform_of(&self, object: ObjectId) -> Option<Mat4> {
        let marker = *self.object_slots.get(object as usize)?;
        let slot = SlotId(marker.checked_sub(1)?);
        let bytes = self.matrices.record(slot)?;
        let columns: [f32; 16] = bytemuck::try_pod_read_unaligned(bytes).ok()?;
        Some(Mat4::from_cols_array(&columns))
    }

    /// Recomputes the per-object lookup if dirty. Returns `true` if rebuilt.
    pub fn build(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        for (entry, marker) in self.lookup.iter_mut().zip(&self.object_slots) {
            *entry = match marker.checked_sub(1) {
                Some(slot) => self
                    .matrices
                    .range(SlotId(slot))
                    .map_or(0, |range| (range.start / TRANSFORM_RECORD_SIZE) as u32 + 1),
                None => 0,
            };
        }
        self.dirty = false;
        true
    }

    /// Per-object 1-based matrix index as of the last build.
    pub fn lookup(&self) -> &[u32] {
        &self.lookup
    }

    /// Packed column-major matrices.
    pub fn matrices(&self) -> &[u8] {
        self.matrices.bytes()
    }

    /// Number of live matrices.
    pub fn matrix_count(&self) -> usize {
        self.matrices.live_count()
    }

    /// Returns and clears whether the matrix store was reallocated.
    pub fn take_reallocated(&mut self) -> bool {
        std::mem::take(&mut self.reallocated)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);
    }

    fn check_bounds(&self, range: &Range<ObjectId>) -> Result<()> {
        if range.end > self.object_count {
            return Err(StrataError::ObjectOutOfRange {
                object: range.end - 1,
                count: self.object_count,
            });
        }
        Ok(())
    }
}
