//! Per-model point cloud shading parameters and streamed point nodes.

use std::collections::BTreeMap;

use strata_core::{ClipPlane, ClipPlaneUniforms, ModelHandle, Result, StrataError};

use crate::device::{BufferKey, GraphicsDevice};
use crate::error::RenderResult;

/// How point size reacts to distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointSizeType {
    Fixed,
    Attenuated,
    #[default]
    Adaptive,
}

/// Shape each point is rasterized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointShape {
    Square,
    #[default]
    Circle,
    Paraboloid,
}

/// Which attribute drives point color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointColorType {
    #[default]
    Rgb,
    Depth,
    Height,
    Intensity,
    Classification,
    LevelOfDetail,
    PointIndex,
}

/// Shading parameters of one point cloud model.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudMaterial {
    pub point_size: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub size_type: PointSizeType,
    pub shape: PointShape,
    pub color_type: PointColorType,
    pub opacity: f32,
    clip_planes: ClipPlaneUniforms,
}

impl Default for PointCloudMaterial {
    fn default() -> Self {
        Self {
            point_size: 2.0,
            min_size: 2.0,
            max_size: 50.0,
            size_type: PointSizeType::default(),
            shape: PointShape::default(),
            color_type: PointColorType::default(),
            opacity: 1.0,
            clip_planes: ClipPlaneUniforms::default(),
        }
    }
}

/// GPU layout of [`PointCloudMaterial`].
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointCloudUniforms {
    pub point_size: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub opacity: f32,
    pub size_type: u32,
    pub shape: u32,
    pub color_type: u32,
    /// 1 when drawing the depth-only blending pre-pass.
    pub depth_only: u32,
    pub clip_planes: ClipPlaneUniforms,
}

impl PointCloudMaterial {
    pub fn clip_planes(&self) -> &ClipPlaneUniforms {
        &self.clip_planes
    }

    pub fn uniforms(&self, depth_only: bool) -> PointCloudUniforms {
        PointCloudUniforms {
            point_size: self.point_size,
            min_size: self.min_size,
            max_size: self.max_size,
            opacity: self.opacity,
            size_type: self.size_type as u32,
            shape: self.shape as u32,
            color_type: self.color_type as u32,
            depth_only: u32::from(depth_only),
            clip_planes: self.clip_planes,
        }
    }
}

/// A streamed node of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointNode {
    pub id: u64,
    pub point_count: u32,
}

#[derive(Debug, Default)]
struct PointCloudModel {
    material: PointCloudMaterial,
    nodes: BTreeMap<u64, PointNode>,
}

/// Shading state of every loaded point cloud model.
#[derive(Debug, Default)]
pub struct PointCloudMaterialRegistry {
    models: BTreeMap<ModelHandle, PointCloudModel>,
    clip_planes: Vec<ClipPlane>,
}

impl PointCloudMaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_model(&mut self, handle: ModelHandle) -> Result<()> {
        if self.models.contains_key(&handle) {
            return Err(StrataError::ModelAlreadyRegistered(handle));
        }
        let mut model = PointCloudModel::default();
        model.material.clip_planes = ClipPlaneUniforms::from_planes(&self.clip_planes);
        self.models.insert(handle, model);
        log::info!("registered point cloud model {handle}");
        Ok(())
    }

    /// Removes a model and releases its node buffers.
    pub fn deregister_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
    ) -> RenderResult<()> {
        let model = self
            .models
            .remove(&handle)
            .ok_or(StrataError::UnknownModel(handle))?;
        for node in model.nodes.keys() {
            device.release_buffer(BufferKey::PointNode {
                model: handle,
                node: *node,
            });
        }
        log::info!("deregistered point cloud model {handle}");
        Ok(())
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.models.contains_key(&handle)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = ModelHandle> + '_ {
        self.models.keys().copied()
    }

    pub fn material(&self, handle: ModelHandle) -> Result<&PointCloudMaterial> {
        Ok(&self.model(handle)?.material)
    }

    pub fn material_mut(&mut self, handle: ModelHandle) -> Result<&mut PointCloudMaterial> {
        Ok(&mut self.model_mut(handle)?.material)
    }

    /// Uploads a node's packed points, replacing any earlier upload.
    pub fn add_node(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        node: u64,
        points: &[u8],
        point_count: u32,
    ) -> RenderResult<()> {
        let model = self.model_mut(handle)?;
        device.upload_buffer(BufferKey::PointNode { model: handle, node }, points, None)?;
        model.nodes.insert(
            node,
            PointNode {
                id: node,
                point_count,
            },
        );
        Ok(())
    }

    /// Drops a node. Returns whether it was loaded.
    pub fn remove_node(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        node: u64,
    ) -> RenderResult<bool> {
        let model = self.model_mut(handle)?;
        if model.nodes.remove(&node).is_none() {
            return Ok(false);
        }
        device.release_buffer(BufferKey::PointNode { model: handle, node });
        Ok(true)
    }

    /// Loaded nodes of a model in id order.
    pub fn nodes(&self, handle: ModelHandle) -> Result<impl Iterator<Item = &PointNode>> {
        Ok(self.model(handle)?.nodes.values())
    }

    /// Replaces the clip planes applied to every point cloud.
    pub fn set_clip_planes(&mut self, planes: Vec<ClipPlane>) {
        let uniforms = ClipPlaneUniforms::from_planes(&planes);
        for model in self.models.values_mut() {
            model.material.clip_planes = uniforms;
        }
        self.clip_planes = planes;
    }

    pub fn clip_planes(&self) -> &[ClipPlane] {
        &self.clip_planes
    }

    fn model(&self, handle: ModelHandle) -> Result<&PointCloudModel> {
        self.models.get(&handle).ok_or(StrataError::UnknownModel(handle))
    }

    fn model_mut(&mut self, handle: ModelHandle) -> Result<&mut PointCloudModel> {
        self.models
            .get_mut(&handle)
            .ok_or(StrataError::UnknownModel(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceDevice;
    use glam::Vec3;

    #[test]
    fn test_nodes_are_uploaded_and_released() {
        let mut device = TraceDevice::new(8, 8);
        let mut registry = PointCloudMaterialRegistry::new();
        let handle = ModelHandle::next();
        registry.register_model(handle).unwrap();
        registry.add_node(&mut device, handle, 7, &[0; 48], 3).unwrap();
        registry.add_node(&mut device, handle, 8, &[0; 32], 2).unwrap();
        assert_eq!(registry.nodes(handle).unwrap().count(), 2);

        assert!(registry.remove_node(&mut device, handle, 7).unwrap());
        assert!(!registry.remove_node(&mut device, handle, 7).unwrap());
        registry.deregister_model(&mut device, handle).unwrap();
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_unknown_model_is_reported() {
        let mut device = TraceDevice::new(8, 8);
        let mut registry = PointCloudMaterialRegistry::new();
        let handle = ModelHandle::from_raw(9999);
        let err = registry.deregister_model(&mut device, handle).unwrap_err();
        assert!(err.to_string().contains("#9999"));
        assert!(registry.material(handle).is_err());
    }

    #[test]
    fn test_clip_planes_apply_to_new_and_existing_models() {
        let mut registry = PointCloudMaterialRegistry::new();
        let first = ModelHandle::next();
        registry.register_model(first).unwrap();
        registry.set_clip_planes(vec![ClipPlane::new(Vec3::ZERO, Vec3::Z)]);
        let second = ModelHandle::next();
        registry.register_model(second).unwrap();
        assert_eq!(registry.material(first).unwrap().clip_planes().count, 1);
        assert_eq!(registry.material(second).unwrap().clip_planes().count, 1);
    }
}
