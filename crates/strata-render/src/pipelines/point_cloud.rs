//! Point cloud passes.

use glam::Vec4;

use crate::camera::Camera;
use crate::device::{
    BlendMode, BufferKey, DrawCall, DrawState, GraphicsDevice, Program, TargetFormat, TargetId,
};
use crate::error::RenderResult;
use crate::materials::RenderMode;
use crate::pass::{FrameContext, RenderPass};
use crate::pipelines::targets::ManagedTarget;
use crate::point_cloud_materials::PointCloudMaterialRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointPassKind {
    /// Depth pre-pass for point blending.
    Depth,
    /// Colors blended over the depth of the pre-pass.
    Blended,
    Standard,
}

struct PointCloudPass<'a> {
    kind: PointPassKind,
    target: TargetId,
    point_clouds: &'a PointCloudMaterialRegistry,
}

impl PointCloudPass<'_> {
    fn program(&self) -> Program {
        match self.kind {
            PointPassKind::Depth => Program::PointsDepth,
            PointPassKind::Blended | PointPassKind::Standard => Program::Points,
        }
    }

    fn draw_state(&self) -> DrawState {
        match self.kind {
            PointPassKind::Depth => DrawState::opaque(RenderMode::DepthBufferOnly),
            PointPassKind::Blended => DrawState {
                depth_write: false,
                blend: BlendMode::Alpha,
                ..DrawState::opaque(RenderMode::Color)
            },
            PointPassKind::Standard => DrawState::opaque(RenderMode::Color),
        }
    }
}

impl RenderPass for PointCloudPass<'_> {
    fn name(&self) -> &'static str {
        match self.kind {
            PointPassKind::Depth => "point-cloud-depth",
            PointPassKind::Blended | PointPassKind::Standard => "point-cloud",
        }
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, camera: &Camera) -> RenderResult<()> {
        device.set_clear_color(Vec4::ZERO);
        // The blended pass reuses the depth written by the pre-pass.
        device.set_auto_clear(self.kind != PointPassKind::Blended);
        device.set_render_target(Some(self.target))?;

        let depth_only = self.kind == PointPassKind::Depth;
        let camera_uniforms = camera.uniforms();
        for model in self.point_clouds.handles() {
            let material = self.point_clouds.material(model)?;
            let mut uniforms = bytemuck::bytes_of(&material.uniforms(depth_only)).to_vec();
            uniforms.extend_from_slice(bytemuck::bytes_of(&camera_uniforms));
            for node in self.point_clouds.nodes(model)? {
                if node.point_count == 0 {
                    continue;
                }
                device.draw(&DrawCall {
                    label: format!("{} node {} of model {model}", self.name(), node.id),
                    program: self.program(),
                    instances: Some(BufferKey::PointNode {
                        model,
                        node: node.id,
                    }),
                    instance_count: node.point_count,
                    bindings: Vec::new(),
                    uniforms: uniforms.clone(),
                    state: self.draw_state(),
                })?;
            }
        }
        Ok(())
    }
}

/// Generates the point cloud passes and owns their target.
#[derive(Debug)]
pub struct PointCloudPipeline {
    target: ManagedTarget,
}

impl PointCloudPipeline {
    pub fn new() -> Self {
        Self {
            target: ManagedTarget::new("point-cloud", TargetFormat::Rgba8, true),
        }
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target.id()
    }

    /// Nothing without point clouds; otherwise a depth pre-pass and a blended
    /// pass when point blending is on, or a single standard pass.
    pub fn passes<'a>(
        &mut self,
        frame: &FrameContext<'a>,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<Vec<Box<dyn RenderPass + 'a>>> {
        if frame.point_clouds.is_empty() {
            return Ok(Vec::new());
        }
        let size = device.viewport_size();
        let target = self.target.ensure(device, size)?;
        let pass = |kind| -> Box<dyn RenderPass + 'a> {
            Box::new(PointCloudPass {
                kind,
                target,
                point_clouds: frame.point_clouds,
            })
        };
        Ok(if frame.options.point_cloud.point_blending {
            vec![pass(PointPassKind::Depth), pass(PointPassKind::Blended)]
        } else {
            vec![pass(PointPassKind::Standard)]
        })
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.target.release(device);
    }
}

impl Default for PointCloudPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::ModelMaterialRegistry;
    use crate::trace::{DeviceCommand, TraceDevice};
    use strata_core::{ModelHandle, RenderOptions};

    fn run(
        pipeline: &mut PointCloudPipeline,
        device: &mut TraceDevice,
        points: &PointCloudMaterialRegistry,
        options: &RenderOptions,
    ) -> Vec<&'static str> {
        let materials = ModelMaterialRegistry::default();
        let frame = FrameContext {
            materials: &materials,
            batchers: &[],
            point_clouds: points,
            options,
        };
        let camera = Camera::default();
        let mut names = Vec::new();
        for mut pass in pipeline.passes(&frame, device).unwrap() {
            names.push(pass.name());
            pass.render(device, &camera).unwrap();
        }
        names
    }

    #[test]
    fn test_no_passes_without_point_clouds() {
        let mut device = TraceDevice::new(8, 8);
        let names = run(
            &mut PointCloudPipeline::new(),
            &mut device,
            &PointCloudMaterialRegistry::new(),
            &RenderOptions::default(),
        );
        assert!(names.is_empty());
        assert_eq!(device.target_count(), 0);
    }

    #[test]
    fn test_blending_adds_depth_prepass() {
        let mut device = TraceDevice::new(8, 8);
        let handle = ModelHandle::from_raw(3);
        let mut points = PointCloudMaterialRegistry::new();
        points.register_model(handle).unwrap();
        points.add_node(&mut device, handle, 0, &[0; 48], 3).unwrap();
        points.add_node(&mut device, handle, 1, &[], 0).unwrap();

        let mut pipeline = PointCloudPipeline::new();
        let mut options = RenderOptions::default();
        assert_eq!(run(&mut pipeline, &mut device, &points, &options), vec!["point-cloud"]);

        options.point_cloud.point_blending = true;
        device.take_commands();
        let names = run(&mut pipeline, &mut device, &points, &options);
        assert_eq!(names, vec!["point-cloud-depth", "point-cloud"]);
        assert_eq!(device.draws_of(Program::PointsDepth), 1);
        assert_eq!(device.draws_of(Program::Points), 1);

        // Only the pre-pass clears.
        let target = pipeline.target().unwrap();
        assert_eq!(device.clears_of(Some(target)), 1);
        let blended = device.commands().iter().find_map(|command| match command {
            DeviceCommand::Draw {
                program: Program::Points,
                state,
                ..
            } => Some(*state),
            _ => None,
        });
        assert_eq!(blended.map(|state| state.blend), Some(BlendMode::Alpha));
    }
}
