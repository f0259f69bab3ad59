//! Per-object style overrides compressed into a dense lookup.
//!
//! Assignments are kept ordered by importance, then registration order.
//! [`StyleOverrideIndex::build`] flattens them into one
//! 4-byte record per object and partitions the objects into the invisible,
//! in-front, ghosted and regular sets.

use glam::Vec3;

use crate::appearance::{NodeAppearance, ObjectSet, ObjectSetId};
use crate::error::{Result, StrataError};
use crate::handle::ObjectId;
use crate::index_set::IndexSet;

/// Bytes per object in the packed style lookup.
pub const STYLE_RECORD_SIZE: usize = 4;

const FLAG_VISIBLE: u8 = 1;
const FLAG_IN_FRONT: u8 = 1 << 1;
const FLAG_GHOSTED: u8 = 1 << 2;
const OUTLINE_SHIFT: u8 = 3;
const OUTLINE_MASK: u8 = 0b111 << OUTLINE_SHIFT;

/// How an object is drawn after all overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleClass {
    Invisible,
    InFront,
    Ghosted,
    Regular,
}

impl StyleClass {
    fn from_flags(flags: u8) -> Self {
        if flags & FLAG_VISIBLE == 0 {
            StyleClass::Invisible
        } else if flags & FLAG_IN_FRONT != 0 {
            StyleClass::InFront
        } else if flags & FLAG_GHOSTED != 0 {
            StyleClass::Ghosted
        } else {
            StyleClass::Regular
        }
    }
}

/// Quantizes a `[0, 1]` color channel to 8 bits, rounding to nearest.
pub fn encode_channel(value: f32) -> u8 {
    // Clamped to [0, 255] so the cast cannot truncate.
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn encode_color(color: Vec3) -> [u8; 3] {
    [
        encode_channel(color.x),
        encode_channel(color.y),
        encode_channel(color.z),
    ]
}

fn set_flag(flags: &mut u8, flag: u8, on: bool) {
    if on {
        *flags |= flag;
    } else {
        *flags &= !flag;
    }
}

/// Writes the fields specified by `style` over an existing record.
fn apply_to_record(record: &mut [u8], style: &NodeAppearance) {
    if let Some(color) = style.color {
        record[..3].copy_from_slice(&encode_color(color));
    }
    let flags = &mut record[3];
    if let Some(visible) = style.visible {
        set_flag(flags, FLAG_VISIBLE, visible);
    }
    if let Some(in_front) = style.render_in_front {
        set_flag(flags, FLAG_IN_FRONT, in_front);
    }
    if let Some(ghosted) = style.render_ghosted {
        set_flag(flags, FLAG_GHOSTED, ghosted);
    }
    if let Some(outline) = style.outline_color {
        *flags = (*flags & !OUTLINE_MASK) | ((outline as u8) << OUTLINE_SHIFT);
    }
}

/// Packs the default style. Fields it leaves unset take their
/// [`NodeAppearance::DEFAULT`] values.
fn default_record(style: &NodeAppearance) -> [u8; STYLE_RECORD_SIZE] {
    let mut record = [0u8; STYLE_RECORD_SIZE];
    apply_to_record(&mut record, &NodeAppearance::merge(&NodeAppearance::DEFAULT, style));
    record
}

#[derive(Debug, Clone)]
struct StyleAssignment {
    set: ObjectSet,
    style: NodeAppearance,
    importance: i32,
}

/// Style overrides for one model.
#[derive(Debug, Clone)]
pub struct StyleOverrideIndex {
    object_count: u32,
    default_style: NodeAppearance,
    assignments: Vec<StyleAssignment>,
    records: Vec<u8>,
    visible: IndexSet,
    regular: IndexSet,
    ghosted: IndexSet,
    in_front: IndexSet,
    invisible: IndexSet,
    dirty: bool,
    generation: u64,
}

impl StyleOverrideIndex {
    /// Creates an index for `object_count` objects with the default style.
    ///
    /// The index starts dirty; call [`build`](Self::build) before reading.
    pub fn new(object_count: u32) -> Self {
        Self {
            object_count,
            default_style: NodeAppearance::DEFAULT,
            assignments: Vec::new(),
            records: vec![0; object_count as usize * STYLE_RECORD_SIZE],
            visible: IndexSet::new(),
            regular: IndexSet::new(),
            ghosted: IndexSet::new(),
            in_front: IndexSet::new(),
            invisible: IndexSet::new(),
            dirty: true,
            generation: 0,
        }
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Assigns `style` to `set` with importance 0.
    ///
    /// Re-assigning a set with the same identity replaces the earlier style
    /// and keeps its importance and position in the application order.
    pub fn assign(&mut self, set: &ObjectSet, style: NodeAppearance) -> Result<()> {
        let importance = self
            .assignments
            .iter()
            .find(|existing| existing.set.id() == set.id())
            .map_or(0, |existing| existing.importance);
        self.assign_with_importance(set, style, importance)
    }

    /// Assigns `style` to `set`, applied after every assignment of lower
    /// importance. Equal importance falls back to registration order.
    pub fn assign_with_importance(
        &mut self,
        set: &ObjectSet,
        style: NodeAppearance,
        importance: i32,
    ) -> Result<()> {
        self.check_bounds(set.objects())?;
        let assignment = StyleAssignment {
            set: set.clone(),
            style,
            importance,
        };
        match self
            .assignments
            .iter_mut()
            .find(|existing| existing.set.id() == set.id())
        {
            Some(entry) => *entry = assignment,
            None => self.assignments.push(assignment),
        }
        // Stable, so registration order breaks ties.
        self.assignments.sort_by_key(|assignment| assignment.importance);
        self.mark_dirty();
        Ok(())
    }

    /// Removes the assignment for `set`. Returns whether one existed.
    pub fn unassign(&mut self, set: &ObjectSet) -> bool {
        self.unassign_id(set.id())
    }

    /// Removes the assignment keyed by `id`.
    pub fn unassign_id(&mut self, id: ObjectSetId) -> bool {
        let before = self.assignments.len();
        self.assignments.retain(|existing| existing.set.id() != id);
        let removed = self.assignments.len() != before;
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Drops every assignment.
    pub fn clear(&mut self) {
        if !self.assignments.is_empty() {
            self.assignments.clear();
            self.mark_dirty();
        }
    }

    /// Replaces the style applied to unassigned objects.
    ///
    /// Setting a style equal to the current one does not dirty the index.
    pub fn set_default_style(&mut self, style: NodeAppearance) {
        if self.default_style != style {
            self.default_style = style;
            self.mark_dirty();
        }
    }

    pub fn default_style(&self) -> &NodeAppearance {
        &self.default_style
    }

    /// Current assignments in application order.
    pub fn assignments(&self) -> impl Iterator<Item = (&ObjectSet, &NodeAppearance)> {
        self.assignments
            .iter()
            .map(|assignment| (&assignment.set, &assignment.style))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Counter bumped on every mutation; consumers compare it to detect changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Recomputes the packed records and derived sets if dirty.
    ///
    /// Returns `true` when a rebuild happened.
    pub fn build(&mut self) -> bool {
        if !self.dirty {
            return false;
        }

        let fill = default_record(&self.default_style);
        for record in self.records.chunks_exact_mut(STYLE_RECORD_SIZE) {
            record.copy_from_slice(&fill);
        }

        for StyleAssignment { set, style, .. } in &self.assignments {
            for range in set.objects().ranges() {
                let start = range.start as usize * STYLE_RECORD_SIZE;
                let end = range.end as usize * STYLE_RECORD_SIZE;
                for record in self.records[start..end].chunks_exact_mut(STYLE_RECORD_SIZE) {
                    apply_to_record(record, style);
                }
            }
        }

        self.partition();
        self.dirty = false;
        log::debug!(
            "rebuilt style index: {} objects, {} assignments",
            self.object_count,
            self.assignments.len()
        );
        true
    }

    /// Packed `[r, g, b, flags]` records, one per object.
    pub fn records(&self) -> &[u8] {
        &self.records
    }

    /// The packed record for `object`.
    pub fn record(&self, object: ObjectId) -> Option<[u8; STYLE_RECORD_SIZE]> {
        let start = object as usize * STYLE_RECORD_SIZE;
        let bytes = self.records.get(start..start + STYLE_RECORD_SIZE)?;
        let mut record = [0u8; STYLE_RECORD_SIZE];
        record.copy_from_slice(bytes);
        Some(record)
    }

    /// Classification of `object` as of the last build.
    pub fn class_of(&self, object: ObjectId) -> Option<StyleClass> {
        self.record(object).map(|record| StyleClass::from_flags(record[3]))
    }

    pub fn visible(&self) -> &IndexSet {
        &self.visible
    }

    pub fn regular(&self) -> &IndexSet {
        &self.regular
    }

    pub fn ghosted(&self) -> &IndexSet {
        &self.ghosted
    }

    pub fn in_front(&self) -> &IndexSet {
        &self.in_front
    }

    pub fn invisible(&self) -> &IndexSet {
        &self.invisible
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);
    }

    fn check_bounds(&self, objects: &IndexSet) -> Result<()> {
        match objects.ranges().last() {
            Some(last) if last.end > self.object_count => Err(StrataError::ObjectOutOfRange {
                object: last.end - 1,
                count: self.object_count,
            }),
            _ => Ok(()),
        }
    }

    /// Single linear scan that emits one range per run of equal class.
    fn partition(&mut self) {
        self.visible.clear();
        self.regular.clear();
        self.ghosted.clear();
        self.in_front.clear();
        self.invisible.clear();

        let mut run: Option<(StyleClass, ObjectId)> = None;
        for object in 0..self.object_count {
            let flags = self.records[object as usize * STYLE_RECORD_SIZE + 3];
            let class = StyleClass::from_flags(flags);
            match run {
                Some((current, _)) if current == class => {}
                Some((current, start)) => {
                    self.push_run(current, start..object);
                    run = Some((class, object));
                }
                None => run = Some((class, object)),
            }
        }
        if let Some((current, start)) = run {
            self.push_run(current, start..self.object_count);
        }
    }

    fn push_run(&mut self, class: StyleClass, range: std::ops::Range<ObjectId>) {
        if class != StyleClass::Invisible {
            self.visible.insert_range(range.clone());
        }
        let target = match class {
            StyleClass::Invisible => &mut self.invisible,
            StyleClass::InFront => &mut self.in_front,
            StyleClass::Ghosted => &mut self.ghosted,
            StyleClass::Regular => &mut self.regular,
        };
        target.insert_range(range);
    }
}
