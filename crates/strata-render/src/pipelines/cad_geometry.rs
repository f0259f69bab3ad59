//! CAD geometry passes.
//!
//! Styled objects are split into three layers, each rendered into its own
//! target: regular ("back") objects, ghosted objects and objects drawn in
//! front of everything else. A layer's pass is only generated when some model
//! has objects in it.

use glam::Vec4;
use strata_core::{IndexSet, StyleOverrideIndex};

use crate::batching::GeometryBatcher;
use crate::camera::Camera;
use crate::device::{BlendMode, DrawCall, DrawState, GraphicsDevice, Program, TargetFormat, TargetId};
use crate::error::RenderResult;
use crate::materials::{ModelMaterialRegistry, RenderMode};
use crate::pass::{FrameContext, Pipeline, PipelineProvider, RenderPass};
use crate::pipelines::targets::ManagedTarget;

/// One of the CAD geometry layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CadLayer {
    Back,
    Ghost,
    InFront,
}

impl CadLayer {
    pub const ALL: [CadLayer; 3] = [CadLayer::Back, CadLayer::Ghost, CadLayer::InFront];

    pub fn pass_name(self) -> &'static str {
        match self {
            CadLayer::Back => "cad-back",
            CadLayer::Ghost => "cad-ghost",
            CadLayer::InFront => "cad-in-front",
        }
    }

    /// Objects of a model that belong to this layer.
    pub fn objects(self, styles: &StyleOverrideIndex) -> &IndexSet {
        match self {
            CadLayer::Back => styles.regular(),
            CadLayer::Ghost => styles.ghosted(),
            CadLayer::InFront => styles.in_front(),
        }
    }

    fn render_mode(self, material_mode: RenderMode) -> RenderMode {
        match self {
            CadLayer::Back => material_mode,
            CadLayer::Ghost => RenderMode::Ghost,
            CadLayer::InFront => RenderMode::Effects,
        }
    }

    fn draw_state(self, mode: RenderMode) -> DrawState {
        match self {
            CadLayer::Ghost => DrawState {
                depth_write: false,
                blend: BlendMode::Alpha,
                ..DrawState::opaque(mode)
            },
            CadLayer::Back | CadLayer::InFront => DrawState::opaque(mode),
        }
    }
}

/// Which layers have objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerPresence {
    pub back: bool,
    pub ghost: bool,
    pub in_front: bool,
}

impl LayerPresence {
    /// Collects presence over every registered model's built style sets.
    pub fn of(materials: &ModelMaterialRegistry) -> RenderResult<Self> {
        let mut presence = Self::default();
        for handle in materials.handles() {
            let styles = materials.style_index(handle)?;
            presence.back |= !styles.regular().is_empty();
            presence.ghost |= !styles.ghosted().is_empty();
            presence.in_front |= !styles.in_front().is_empty();
        }
        Ok(presence)
    }

    pub fn has(&self, layer: CadLayer) -> bool {
        match layer {
            CadLayer::Back => self.back,
            CadLayer::Ghost => self.ghost,
            CadLayer::InFront => self.in_front,
        }
    }

    /// Whether objects must be filtered per layer.
    pub fn is_split(&self) -> bool {
        self.ghost || self.in_front
    }
}

/// Device ids of the layer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadTargets {
    pub back: TargetId,
    pub ghost: TargetId,
    pub in_front: TargetId,
}

impl CadTargets {
    pub fn of(&self, layer: CadLayer) -> TargetId {
        match layer {
            CadLayer::Back => self.back,
            CadLayer::Ghost => self.ghost,
            CadLayer::InFront => self.in_front,
        }
    }
}

/// Output of [`CadGeometryPipeline::generate`].
pub struct CadFrame<'a> {
    pub passes: Vec<Box<dyn RenderPass + 'a>>,
    pub targets: CadTargets,
    pub presence: LayerPresence,
}

/// Draws one layer of every CAD model.
struct CadLayerPass<'a> {
    layer: CadLayer,
    target: TargetId,
    filter: bool,
    materials: &'a ModelMaterialRegistry,
    batchers: &'a [GeometryBatcher],
}

impl RenderPass for CadLayerPass<'_> {
    fn name(&self) -> &'static str {
        self.layer.pass_name()
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, camera: &Camera) -> RenderResult<()> {
        // Alpha 0 marks pixels without geometry for the composite pass.
        device.set_clear_color(Vec4::ZERO);
        device.set_auto_clear(true);
        device.set_render_target(Some(self.target))?;

        let camera_uniforms = camera.uniforms();
        for batcher in self.batchers {
            let model = batcher.model();
            let objects = self.layer.objects(self.materials.style_index(model)?);
            if objects.is_empty() {
                continue;
            }
            let material_set = self.materials.material_set(model)?;
            for draw_object in batcher.draw_objects() {
                if draw_object.instance_count() == 0
                    || (self.filter && !draw_object.contains_any(objects))
                {
                    continue;
                }
                let key = draw_object.key();
                let material = material_set.material_for(key.category, key.batch_key);
                let mode = self.layer.render_mode(material.render_mode());
                let mut uniforms = material.uniform_bytes_as(mode);
                uniforms.extend_from_slice(bytemuck::bytes_of(&camera_uniforms));
                device.draw(&DrawCall {
                    label: format!("{} {} of model {model}", self.name(), key.category),
                    program: Program::Primitive(key.category),
                    instances: Some(batcher.buffer_key(key)),
                    instance_count: draw_object.instance_count(),
                    bindings: material.bindings(),
                    uniforms,
                    state: self.layer.draw_state(mode),
                })?;
            }
        }
        Ok(())
    }
}

/// Generates the CAD layer passes and owns their targets.
#[derive(Debug)]
pub struct CadGeometryPipeline {
    back: ManagedTarget,
    ghost: ManagedTarget,
    in_front: ManagedTarget,
    presence: LayerPresence,
}

impl CadGeometryPipeline {
    pub fn new() -> Self {
        Self {
            back: ManagedTarget::new("cad-back", TargetFormat::Rgba8, true),
            ghost: ManagedTarget::new("cad-ghost", TargetFormat::Rgba8, true),
            in_front: ManagedTarget::new("cad-in-front", TargetFormat::Rgba8, true),
            presence: LayerPresence::default(),
        }
    }

    /// Layers present in the most recently generated frame.
    pub fn presence(&self) -> LayerPresence {
        self.presence
    }

    /// Layer targets, once created.
    pub fn targets(&self) -> Option<CadTargets> {
        Some(CadTargets {
            back: self.back.id()?,
            ghost: self.ghost.id()?,
            in_front: self.in_front.id()?,
        })
    }

    fn ensure_targets(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<CadTargets> {
        let size = device.viewport_size();
        Ok(CadTargets {
            back: self.back.ensure(device, size)?,
            ghost: self.ghost.ensure(device, size)?,
            in_front: self.in_front.ensure(device, size)?,
        })
    }

    /// This frame's layer passes and the targets they draw into.
    ///
    /// Targets of layers that disappeared since the previous frame are cleared
    /// here so they hold no stale geometry.
    pub fn generate<'a>(
        &mut self,
        frame: &FrameContext<'a>,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<CadFrame<'a>> {
        let targets = self.ensure_targets(device)?;
        let presence = LayerPresence::of(frame.materials)?;
        let previous = std::mem::replace(&mut self.presence, presence);

        for layer in CadLayer::ALL {
            if previous.has(layer) && !presence.has(layer) {
                log::debug!("clearing stale '{}' target", layer.pass_name());
                device.set_clear_color(Vec4::ZERO);
                device.set_auto_clear(false);
                device.set_render_target(Some(targets.of(layer)))?;
                device.clear()?;
            }
        }

        let filter = presence.is_split();
        let mut passes: Vec<Box<dyn RenderPass + 'a>> = Vec::new();
        for layer in CadLayer::ALL {
            if presence.has(layer) {
                passes.push(Box::new(CadLayerPass {
                    layer,
                    target: targets.of(layer),
                    filter,
                    materials: frame.materials,
                    batchers: frame.batchers,
                }));
            }
        }
        Ok(CadFrame {
            passes,
            targets,
            presence,
        })
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.back.release(device);
        self.ghost.release(device);
        self.in_front.release(device);
        self.presence = LayerPresence::default();
    }
}

impl Default for CadGeometryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineProvider for CadGeometryPipeline {
    fn pipeline<'a>(
        &mut self,
        frame: &FrameContext<'a>,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<Pipeline<'a>> {
        Ok(Pipeline::new(self.generate(frame, device)?.passes))
    }

    fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        self.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::SectorGeometry;
    use crate::category::GeometryCategory;
    use crate::executor::{BasicPipelineExecutor, PipelineExecutor};
    use crate::point_cloud_materials::PointCloudMaterialRegistry;
    use crate::trace::TraceDevice;
    use std::time::Instant;
    use strata_core::{ModelHandle, NodeAppearance, ObjectSet, ObjectId, RenderOptions};

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

    fn scene(device: &mut TraceDevice) -> (ModelMaterialRegistry, Vec<GeometryBatcher>, ModelHandle) {
        let handle = ModelHandle::from_raw(1);
        let mut materials = ModelMaterialRegistry::default();
        materials.register_model(device, handle, 4).unwrap();
        let mut batcher = GeometryBatcher::new(handle);
        batcher.submit(0, &[boxes([0, 1])]).unwrap();
        batcher
            .submit(1, &[SectorGeometry::primitive(GeometryCategory::Quad, boxes([2, 3]).bytes)])
            .unwrap();
        batcher.sync(device).unwrap();
        (materials, vec![batcher], handle)
    }

    #[test]
    fn test_layers_follow_styles() {
        let mut device = TraceDevice::new(16, 16);
        let (mut materials, batchers, handle) = scene(&mut device);
        let points = PointCloudMaterialRegistry::new();
        let options = RenderOptions::default();
        let mut pipeline = CadGeometryPipeline::new();

        let frame = FrameContext {
            materials: &materials,
            batchers: &batchers,
            point_clouds: &points,
            options: &options,
        };
        let names = pipeline.pipeline(&frame, &mut device).unwrap().names();
        assert_eq!(names, vec!["cad-back"]);

        materials
            .style_index_mut(handle)
            .unwrap()
            .assign(&ObjectSet::from_range(2..4), NodeAppearance::GHOSTED)
            .unwrap();
        materials.flush(&mut device, Instant::now()).unwrap();
        let frame = FrameContext {
            materials: &materials,
            batchers: &batchers,
            point_clouds: &points,
            options: &options,
        };
        let names = pipeline.pipeline(&frame, &mut device).unwrap().names();
        assert_eq!(names, vec!["cad-back", "cad-ghost"]);
        assert!(pipeline.presence().ghost);
    }

    #[test]
    fn test_split_layers_draw_only_their_objects() {
        let mut device = TraceDevice::new(16, 16);
        let (mut materials, batchers, handle) = scene(&mut device);
        materials
            .style_index_mut(handle)
            .unwrap()
            .assign(&ObjectSet::from_range(2..4), NodeAppearance::GHOSTED)
            .unwrap();
        materials.flush(&mut device, Instant::now()).unwrap();
        let points = PointCloudMaterialRegistry::new();
        let options = RenderOptions::default();
        let frame = FrameContext {
            materials: &materials,
            batchers: &batchers,
            point_clouds: &points,
            options: &options,
        };
        let mut pipeline = CadGeometryPipeline::new();
        device.take_commands();

        let run = BasicPipelineExecutor::new()
            .render(&mut pipeline, &frame, &mut device, &Camera::default())
            .unwrap();
        assert_eq!(run, 2);
        assert_eq!(
            device.draw_labels(),
            vec!["cad-back Box of model #1", "cad-ghost Quad of model #1"]
        );
        // The host target is bound again without being cleared.
        assert_eq!(device.render_target(), None);
        assert_eq!(device.clears_of(None), 0);
    }

    #[test]
    fn test_stale_layer_cleared_once() {
        let mut device = TraceDevice::new(16, 16);
        let (mut materials, batchers, handle) = scene(&mut device);
        let ghosts = ObjectSet::from_range(0..1);
        materials
            .style_index_mut(handle)
            .unwrap()
            .assign(&ghosts, NodeAppearance::GHOSTED)
            .unwrap();
        materials.flush(&mut device, Instant::now()).unwrap();
        let points = PointCloudMaterialRegistry::new();
        let options = RenderOptions::default();
        let mut pipeline = CadGeometryPipeline::new();
        {
            let frame = FrameContext {
                materials: &materials,
                batchers: &batchers,
                point_clouds: &points,
                options: &options,
            };
            pipeline.generate(&frame, &mut device).unwrap();
        }
        let ghost_target = pipeline.targets().unwrap().ghost;

        materials.style_index_mut(handle).unwrap().unassign(&ghosts);
        materials.flush(&mut device, Instant::now()).unwrap();
        let frame = FrameContext {
            materials: &materials,
            batchers: &batchers,
            point_clouds: &points,
            options: &options,
        };
        let before = device.clears_of(Some(ghost_target));
        pipeline.generate(&frame, &mut device).unwrap();
        pipeline.generate(&frame, &mut device).unwrap();
        assert_eq!(device.clears_of(Some(ghost_target)), before + 1);
    }
}
