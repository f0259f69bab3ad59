//! Composition of the layer targets and the final blit.
//!
//! The composite pass draws, in order: in-front depth priming, back geometry
//! with outlines and occlusion, transparent ghosts, and in-front geometry with
//! half-opacity outlines. Stages whose layer is absent are skipped.

use glam::Vec4;
use image::RgbaImage;
use strata_core::{AntiAliasingMode, OutlineColor, RenderOptions};

use crate::camera::Camera;
use crate::device::{
    Binding, BlendMode, CompositeStage, DeviceState, DrawCall, DrawState, GraphicsDevice,
    Program, TargetFormat, TargetId, TextureKey,
};
use crate::error::RenderResult;
use crate::pass::RenderPass;
use crate::pipelines::cad_geometry::{CadTargets, LayerPresence};
use crate::pipelines::targets::ManagedTarget;

/// Uniforms of the composite stages.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[allow(clippy::pub_underscore_fields)]
pub struct CompositeUniforms {
    pub texel_size: [f32; 2],
    pub resolution: [f32; 2],
    pub camera_near: f32,
    pub camera_far: f32,
    pub outline_opacity: f32,
    pub edge_detection: u32,
    pub ssao: u32,
    pub point_cloud: u32,
    pub edl: u32,
    pub edl_strength: f32,
    pub edl_radius: f32,
    pub _padding: [u32; 3],
}

/// Uniforms of the final blit.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlitUniforms {
    pub resolution: [f32; 2],
    pub inverse_resolution: [f32; 2],
}

/// Targets read by the composite pass this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeInputs {
    pub cad: CadTargets,
    pub presence: LayerPresence,
    /// Occlusion target, when the occlusion pass runs.
    pub ssao: Option<TargetId>,
    /// Point cloud target, when point clouds are drawn.
    pub point_cloud: Option<TargetId>,
}

struct CompositePass {
    target: TargetId,
    inputs: CompositeInputs,
    options: RenderOptions,
}

impl CompositePass {
    fn uniforms(&self, camera: &Camera, size: (u32, u32), outline_opacity: f32) -> CompositeUniforms {
        let (width, height) = (size.0.max(1) as f32, size.1.max(1) as f32);
        let texel = self.options.outline_texel_size as f32;
        let edl = &self.options.point_cloud.edl;
        CompositeUniforms {
            texel_size: [texel / width, texel / height],
            resolution: [width, height],
            camera_near: camera.near,
            camera_far: camera.far,
            outline_opacity,
            edge_detection: u32::from(self.options.edge_detection.enabled),
            ssao: u32::from(self.inputs.ssao.is_some()),
            point_cloud: u32::from(self.inputs.point_cloud.is_some()),
            edl: u32::from(edl.enabled),
            edl_strength: edl.strength,
            edl_radius: edl.radius,
            _padding: [0; 3],
        }
    }

    fn stages(&self) -> Vec<(CompositeStage, Vec<Binding>)> {
        let cad = &self.inputs.cad;
        let presence = self.inputs.presence;
        let mut stages = Vec::with_capacity(4);
        if presence.in_front {
            stages.push((CompositeStage::InFrontDepth, vec![Binding::Target(cad.in_front)]));
        }
        if presence.back || self.inputs.point_cloud.is_some() {
            let mut bindings = vec![
                Binding::Target(cad.back),
                Binding::Texture(TextureKey::OutlinePalette),
            ];
            bindings.extend(self.inputs.ssao.map(Binding::Target));
            bindings.extend(self.inputs.point_cloud.map(Binding::Target));
            stages.push((CompositeStage::Back, bindings));
        }
        if presence.ghost {
            stages.push((CompositeStage::Ghost, vec![Binding::Target(cad.ghost)]));
        }
        if presence.in_front {
            stages.push((
                CompositeStage::InFront,
                vec![
                    Binding::Target(cad.in_front),
                    Binding::Texture(TextureKey::OutlinePalette),
                ],
            ));
        }
        stages
    }
}

fn stage_state(stage: CompositeStage) -> DrawState {
    match stage {
        CompositeStage::InFrontDepth => DrawState {
            color_write: false,
            depth_test: true,
            depth_write: true,
            ..DrawState::fullscreen(BlendMode::Replace)
        },
        CompositeStage::Back => DrawState {
            depth_test: true,
            depth_write: true,
            ..DrawState::fullscreen(BlendMode::Replace)
        },
        CompositeStage::Ghost | CompositeStage::InFront => DrawState::fullscreen(BlendMode::Alpha),
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, camera: &Camera) -> RenderResult<()> {
        device.set_clear_color(Vec4::ZERO);
        device.set_auto_clear(true);
        device.set_render_target(Some(self.target))?;

        let size = device.viewport_size();
        for (stage, bindings) in self.stages() {
            let outline_opacity = if stage == CompositeStage::InFront { 0.5 } else { 1.0 };
            let uniforms = self.uniforms(camera, size, outline_opacity);
            device.draw(&DrawCall {
                label: format!("composite {stage:?}"),
                program: Program::Composite(stage),
                instances: None,
                instance_count: 1,
                bindings,
                uniforms: bytemuck::bytes_of(&uniforms).to_vec(),
                state: stage_state(stage),
            })?;
        }
        Ok(())
    }
}

/// Resamples the composite into the output target.
struct BlitPass {
    source: TargetId,
    output: DeviceState,
    anti_aliasing: AntiAliasingMode,
}

impl RenderPass for BlitPass {
    fn name(&self) -> &'static str {
        "blit"
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, _camera: &Camera) -> RenderResult<()> {
        device.set_clear_color(self.output.clear_color);
        device.set_auto_clear(self.output.auto_clear);
        device.set_render_target(self.output.render_target)?;

        let (width, height) = device.viewport_size();
        let (width, height) = (width.max(1) as f32, height.max(1) as f32);
        let uniforms = BlitUniforms {
            resolution: [width, height],
            inverse_resolution: [1.0 / width, 1.0 / height],
        };
        let program = match self.anti_aliasing {
            AntiAliasingMode::Fxaa => Program::Fxaa,
            AntiAliasingMode::NoAa => Program::Blit,
        };
        device.draw(&DrawCall {
            label: "blit".into(),
            program,
            instances: None,
            instance_count: 1,
            bindings: vec![Binding::Target(self.source)],
            uniforms: bytemuck::bytes_of(&uniforms).to_vec(),
            state: DrawState::fullscreen(BlendMode::Replace),
        })
    }
}

/// Owns the composite target and the outline palette.
#[derive(Debug)]
pub struct PostProcessingPipeline {
    composite: ManagedTarget,
    palette_uploaded: bool,
}

impl PostProcessingPipeline {
    pub fn new() -> Self {
        Self {
            composite: ManagedTarget::new("composite", TargetFormat::Rgba8, true),
            palette_uploaded: false,
        }
    }

    pub fn target(&self) -> Option<TargetId> {
        self.composite.id()
    }

    fn upload_palette(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        if self.palette_uploaded {
            return Ok(());
        }
        let palette = OutlineColor::palette_rgba8();
        let image = RgbaImage::from_fn(palette.len() as u32, 1, |x, _| {
            image::Rgba(palette[x as usize])
        });
        device.upload_texture(TextureKey::OutlinePalette, &image)?;
        self.palette_uploaded = true;
        Ok(())
    }

    /// The composite and blit passes.
    ///
    /// `output` is the device state the host had when the frame started; the
    /// blit draws into its render target with its clear settings.
    pub fn passes<'a>(
        &mut self,
        options: &RenderOptions,
        device: &mut dyn GraphicsDevice,
        inputs: CompositeInputs,
        output: DeviceState,
    ) -> RenderResult<[Box<dyn RenderPass + 'a>; 2]> {
        self.upload_palette(device)?;
        let size = device.viewport_size();
        let target = self.composite.ensure(device, size)?;
        let composite: Box<dyn RenderPass + 'a> = Box::new(CompositePass {
            target,
            inputs,
            options: options.clone(),
        });
        let blit: Box<dyn RenderPass + 'a> = Box::new(BlitPass {
            source: target,
            output,
            anti_aliasing: options.anti_aliasing,
        });
        Ok([composite, blit])
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.composite.release(device);
        device.release_texture(TextureKey::OutlinePalette);
        self.palette_uploaded = false;
    }
}

impl Default for PostProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}
