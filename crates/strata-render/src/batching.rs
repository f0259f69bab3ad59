//! Merges streamed sector geometry into shared instanced draw objects.
//!
//! One draw object exists per `(category, batch key)` of a model. Each sector
//! contributes one record run per draw object, stored in the draw object's
//! [`PackedOverrideBuffer`] and remembered per sector for exact removal.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use strata_core::{IndexSet, ModelHandle, ObjectId, PackedOverrideBuffer, SectorId, SlotId};

use crate::category::{record_object_id, GeometryCategory};
use crate::device::{BufferKey, GraphicsDevice};
use crate::error::{RenderError, RenderResult};

/// Initial backing size of a draw object's instance buffer.
const INITIAL_INSTANCE_CAPACITY: usize = 64;

/// One sector's contribution to a draw object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorGeometry {
    pub category: GeometryCategory,
    /// Distinguishes draw objects of the same category, such as different
    /// instanced meshes or textured sectors.
    pub batch_key: u64,
    /// Bytes per record.
    pub stride: usize,
    /// Packed records, each starting with its object id.
    pub bytes: Vec<u8>,
}

impl SectorGeometry {
    /// Geometry of a fixed-layout primitive category.
    pub fn primitive(category: GeometryCategory, bytes: Vec<u8>) -> Self {
        Self {
            category,
            batch_key: 0,
            stride: category.instance_stride().unwrap_or(0),
            bytes,
        }
    }

    fn validate(&self, existing_stride: Option<usize>) -> RenderResult<()> {
        if self.stride < 4 || self.bytes.len() % self.stride != 0 {
            return Err(RenderError::PayloadLayout {
                category: self.category,
                len: self.bytes.len(),
                stride: self.stride,
            });
        }
        if let Some(expected) = self.category.instance_stride().or(existing_stride) {
            if expected != self.stride {
                return Err(RenderError::StrideMismatch {
                    category: self.category,
                    expected,
                    actual: self.stride,
                });
            }
        }
        Ok(())
    }
}

/// Identity of a draw object within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawObjectKey {
    pub category: GeometryCategory,
    pub batch_key: u64,
}

/// Pending device work for a draw object.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncState {
    Clean,
    Upload(Range<usize>),
    /// The device buffer must be recreated from the whole backing store.
    Rebuild,
}

/// All loaded instances of one category, drawn with a single call.
#[derive(Debug)]
pub struct DrawObject {
    key: DrawObjectKey,
    stride: usize,
    instances: PackedOverrideBuffer,
    instance_count: u32,
    /// Object id to number of instances of that object.
    objects: BTreeMap<ObjectId, u32>,
    sync: SyncState,
}

impl DrawObject {
    fn new(key: DrawObjectKey, stride: usize) -> Self {
        Self {
            key,
            stride,
            instances: PackedOverrideBuffer::new(INITIAL_INSTANCE_CAPACITY),
            instance_count: 0,
            objects: BTreeMap::new(),
            sync: SyncState::Rebuild,
        }
    }

    pub fn key(&self) -> DrawObjectKey {
        self.key
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Visible instances; the sum over all contributing sectors.
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn instances_of(&self, object: ObjectId) -> u32 {
        self.objects.get(&object).copied().unwrap_or(0)
    }

    /// Whether any instance belongs to an object in `set`.
    pub fn contains_any(&self, set: &IndexSet) -> bool {
        set.intersects_any(self.objects.keys().copied())
    }

    fn append(&mut self, bytes: &[u8]) -> (SlotId, u32) {
        let added = self.instances.add(bytes);
        self.sync = match (added.reallocated, std::mem::replace(&mut self.sync, SyncState::Clean)) {
            (true, _) | (_, SyncState::Rebuild) => SyncState::Rebuild,
            (false, SyncState::Upload(pending)) => SyncState::Upload(union(&pending, &added.update_range)),
            (false, SyncState::Clean) => SyncState::Upload(added.update_range),
        };

        let count = (bytes.len() / self.stride) as u32;
        for record in bytes.chunks_exact(self.stride) {
            *self.objects.entry(record_object_id(record)).or_insert(0) += 1;
        }
        self.instance_count += count;
        (added.slot, count)
    }

    fn release(&mut self, slot: SlotId, count: u32) {
        if let Some(record) = self.instances.record(slot) {
            for instance in record.chunks_exact(self.stride) {
                let id = record_object_id(instance);
                if let Some(n) = self.objects.get_mut(&id) {
                    *n -= 1;
                    if *n == 0 {
                        self.objects.remove(&id);
                    }
                }
            }
        }
        if let Some(changed) = self.instances.remove(slot) {
            self.instance_count = self.instance_count.saturating_sub(count);
            self.sync = match std::mem::replace(&mut self.sync, SyncState::Clean) {
                SyncState::Rebuild => SyncState::Rebuild,
                SyncState::Upload(pending) => SyncState::Upload(union(&pending, &changed)),
                SyncState::Clean => SyncState::Upload(changed),
            };
        }
    }

    fn sync(&mut self, device: &mut dyn GraphicsDevice, buffer: BufferKey) -> RenderResult<()> {
        match std::mem::replace(&mut self.sync, SyncState::Clean) {
            SyncState::Clean => Ok(()),
            SyncState::Rebuild => {
                device.release_buffer(buffer);
                device.upload_buffer(buffer, self.instances.backing(), None)
            }
            SyncState::Upload(range) => {
                device.upload_buffer(buffer, self.instances.backing(), Some(range))
            }
        }
    }
}

fn union(a: &Range<usize>, b: &Range<usize>) -> Range<usize> {
    a.start.min(b.start)..a.end.max(b.end)
}

/// Where one sector's records live: a `SectorBatchRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectorBatchRecord {
    draw_object: DrawObjectKey,
    slot: SlotId,
    instance_count: u32,
}

/// Draw-call consolidation for one CAD model.
#[derive(Debug)]
pub struct GeometryBatcher {
    model: ModelHandle,
    draw_objects: BTreeMap<DrawObjectKey, DrawObject>,
    sectors: HashMap<SectorId, Vec<SectorBatchRecord>>,
}

impl GeometryBatcher {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            draw_objects: BTreeMap::new(),
            sectors: HashMap::new(),
        }
    }

    pub fn model(&self) -> ModelHandle {
        self.model
    }

    /// Adds a sector's geometry.
    ///
    /// Returns `false` without changes if the sector is already batched. All
    /// payloads are validated before any is applied.
    pub fn submit(&mut self, sector: SectorId, geometry: &[SectorGeometry]) -> RenderResult<bool> {
        if self.sectors.contains_key(&sector) {
            log::debug!("sector {sector} of model {} is already batched", self.model);
            return Ok(false);
        }
        // Strides of draw objects this call would create, checked like existing ones.
        let mut strides: HashMap<DrawObjectKey, usize> = HashMap::new();
        for item in geometry {
            let key = DrawObjectKey {
                category: item.category,
                batch_key: item.batch_key,
            };
            let existing = strides
                .get(&key)
                .copied()
                .or_else(|| self.draw_objects.get(&key).map(DrawObject::stride));
            item.validate(existing)?;
            if !item.bytes.is_empty() {
                strides.insert(key, item.stride);
            }
        }

        let mut records = Vec::with_capacity(geometry.len());
        for item in geometry.iter().filter(|item| !item.bytes.is_empty()) {
            let key = DrawObjectKey {
                category: item.category,
                batch_key: item.batch_key,
            };
            let draw_object = self
                .draw_objects
                .entry(key)
                .or_insert_with(|| DrawObject::new(key, item.stride));
            let (slot, instance_count) = draw_object.append(&item.bytes);
            records.push(SectorBatchRecord {
                draw_object: key,
                slot,
                instance_count,
            });
        }
        self.sectors.insert(sector, records);
        Ok(true)
    }

    /// Removes a sector's geometry. Unknown sectors are ignored.
    ///
    /// Draw objects stay alive when their instance count drops to zero.
    pub fn remove(&mut self, sector: SectorId) -> bool {
        let Some(records) = self.sectors.remove(&sector) else {
            return false;
        };
        for record in records {
            if let Some(draw_object) = self.draw_objects.get_mut(&record.draw_object) {
                draw_object.release(record.slot, record.instance_count);
            }
        }
        true
    }

    pub fn contains_sector(&self, sector: SectorId) -> bool {
        self.sectors.contains_key(&sector)
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn draw_objects(&self) -> impl Iterator<Item = &DrawObject> {
        self.draw_objects.values()
    }

    pub fn draw_object(&self, category: GeometryCategory, batch_key: u64) -> Option<&DrawObject> {
        self.draw_objects.get(&DrawObjectKey {
            category,
            batch_key,
        })
    }

    pub fn draw_object_count(&self) -> usize {
        self.draw_objects.len()
    }

    /// Device buffer holding a draw object's instances.
    pub fn buffer_key(&self, key: DrawObjectKey) -> BufferKey {
        BufferKey::Instances {
            model: self.model,
            category: key.category,
            batch_key: key.batch_key,
        }
    }

    /// Pushes pending instance changes to the device.
    ///
    /// Reallocated draw objects are recreated, others upload only the byte
    /// range that changed.
    pub fn sync(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let model = self.model;
        for (key, draw_object) in &mut self.draw_objects {
            let buffer = BufferKey::Instances {
                model,
                category: key.category,
                batch_key: key.batch_key,
            };
            draw_object.sync(device, buffer)?;
        }
        Ok(())
    }

    /// Releases every device buffer and forgets all sectors.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for key in self.draw_objects.keys() {
            device.release_buffer(self.buffer_key(*key));
        }
        self.draw_objects.clear();
        self.sectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{DeviceCommand, TraceDevice};

    fn boxes(objects: impl IntoIterator<Item = ObjectId>) -> SectorGeometry {
        let stride = GeometryCategory::Box.instance_stride().unwrap();
        let mut bytes = Vec::new();
        for object in objects {
            let mut record = vec![0u8; stride];
            record[..4].copy_from_slice(&object.to_le_bytes());
            bytes.extend_from_slice(&record);
        }
        SectorGeometry::primitive(GeometryCategory::Box, bytes)
    }

    #[test]
    fn test_instance_counts_follow_sectors() {
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        assert!(batcher.submit(1, &[boxes(0..10)]).unwrap());
        assert!(batcher.submit(2, &[boxes(10..30)]).unwrap());
        assert_eq!(batcher.draw_object_count(), 1);
        let draw_object = batcher.draw_object(GeometryCategory::Box, 0).unwrap();
        assert_eq!(draw_object.instance_count(), 30);

        assert!(batcher.remove(1));
        assert_eq!(batcher.draw_object_count(), 1);
        let draw_object = batcher.draw_object(GeometryCategory::Box, 0).unwrap();
        assert_eq!(draw_object.instance_count(), 20);
        assert_eq!(draw_object.instances_of(9), 0);
        assert_eq!(draw_object.instances_of(10), 1);
    }

    #[test]
    fn test_resubmit_is_noop() {
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        assert!(batcher.submit(1, &[boxes(0..4)]).unwrap());
        assert!(!batcher.submit(1, &[boxes(0..4)]).unwrap());
        let draw_object = batcher.draw_object(GeometryCategory::Box, 0).unwrap();
        assert_eq!(draw_object.instance_count(), 4);
    }

    #[test]
    fn test_remove_unknown_sector_is_noop() {
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        assert!(!batcher.remove(5));
        batcher.submit(5, &[boxes(0..2)]).unwrap();
        assert!(batcher.remove(5));
        assert!(!batcher.remove(5));
        assert_eq!(batcher.draw_object(GeometryCategory::Box, 0).unwrap().instance_count(), 0);
    }

    #[test]
    fn test_invalid_payload_applies_nothing() {
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        let mut bad = boxes(0..1);
        bad.bytes.pop();
        let err = batcher.submit(1, &[boxes(0..3), bad]).unwrap_err();
        assert!(matches!(err, RenderError::PayloadLayout { .. }));
        assert_eq!(batcher.draw_object_count(), 0);
        assert!(!batcher.contains_sector(1));

        let mesh = SectorGeometry {
            category: GeometryCategory::TriangleMesh,
            batch_key: 0,
            stride: 16,
            bytes: vec![0; 32],
        };
        batcher.submit(2, &[mesh.clone()]).unwrap();
        let wider = SectorGeometry {
            stride: 32,
            bytes: vec![0; 64],
            ..mesh.clone()
        };
        assert!(matches!(
            batcher.submit(3, &[wider.clone()]),
            Err(RenderError::StrideMismatch { expected: 16, actual: 32, .. })
        ));

        // Mixed strides within one submit never reach a fresh draw object.
        let mut fresh = GeometryBatcher::new(ModelHandle::next());
        assert!(matches!(
            fresh.submit(4, &[mesh, wider]),
            Err(RenderError::StrideMismatch { expected: 16, actual: 32, .. })
        ));
        assert_eq!(fresh.draw_object_count(), 0);
        assert!(!fresh.contains_sector(4));
    }

    #[test]
    fn test_object_multiset_tracks_instances() {
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        batcher.submit(1, &[boxes([3, 3, 4])]).unwrap();
        batcher.submit(2, &[boxes([3])]).unwrap();
        let draw_object = batcher.draw_object(GeometryCategory::Box, 0).unwrap();
        assert_eq!(draw_object.instances_of(3), 3);
        assert!(draw_object.contains_any(&IndexSet::from_range(4..5)));

        batcher.remove(1);
        let draw_object = batcher.draw_object(GeometryCategory::Box, 0).unwrap();
        assert_eq!(draw_object.instances_of(3), 1);
        assert!(!draw_object.contains_any(&IndexSet::from_range(4..5)));
    }

    #[test]
    fn test_sync_uploads_changed_range_only() {
        let model = ModelHandle::next();
        let mut device = TraceDevice::new(8, 8);
        let mut batcher = GeometryBatcher::new(model);
        // 72-byte boxes: the first sector reallocates the 64-byte arena.
        batcher.submit(1, &[boxes(0..1)]).unwrap();
        batcher.sync(&mut device).unwrap();
        let key = batcher.buffer_key(DrawObjectKey {
            category: GeometryCategory::Box,
            batch_key: 0,
        });
        assert_eq!(device.buffer_len(key), Some(128));
        assert_eq!(batcher.draw_object(GeometryCategory::Box, 0).unwrap().sync, SyncState::Clean);

        device.take_commands();
        batcher.remove(1);
        batcher.sync(&mut device).unwrap();
        assert_eq!(
            device.commands(),
            &[DeviceCommand::UploadBuffer {
                key,
                len: 128,
                range: Some(0..72),
            }]
        );
    }

    #[test]
    fn test_release_frees_buffers() {
        let mut device = TraceDevice::new(8, 8);
        let mut batcher = GeometryBatcher::new(ModelHandle::next());
        batcher.submit(1, &[boxes(0..2)]).unwrap();
        batcher.sync(&mut device).unwrap();
        batcher.release(&mut device);
        assert_eq!(device.buffer_count(), 0);
        assert_eq!(batcher.sector_count(), 0);
    }
}
