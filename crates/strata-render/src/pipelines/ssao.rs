//! Screen space ambient occlusion pass.

use glam::{Vec3, Vec4};
use rand::Rng;
use strata_core::SsaoParameters;

use crate::camera::Camera;
use crate::device::{
    Binding, BlendMode, BufferKey, DrawCall, DrawState, GraphicsDevice, Program, TargetFormat,
    TargetId,
};
use crate::error::RenderResult;
use crate::pass::RenderPass;
use crate::pipelines::targets::ManagedTarget;

/// GPU representation of SSAO uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[allow(clippy::pub_underscore_fields)]
pub struct SsaoUniforms {
    pub sample_radius: f32,
    pub depth_check_bias: f32,
    pub sample_count: u32,
    pub _padding: u32,
    pub resolution: [f32; 2],
    pub camera_near: f32,
    pub camera_far: f32,
}

/// Hemisphere kernel of `sample_count` offsets around +Z.
///
/// Samples are at least half a unit long before normalizing, then scaled so
/// that they cluster towards the origin.
pub fn generate_kernel(sample_count: u32, rng: &mut impl Rng) -> Vec<Vec3> {
    let n = sample_count as f32;
    (0..sample_count)
        .map(|i| {
            let mut sample = Vec3::ZERO;
            while sample.length() < 0.5 {
                sample = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(0.0..1.0),
                );
            }
            let t = i as f32 / n;
            sample.normalize() * (0.1 + 0.9 * t * t)
        })
        .collect()
}

struct SsaoPass {
    target: TargetId,
    source: TargetId,
    parameters: SsaoParameters,
}

impl RenderPass for SsaoPass {
    fn name(&self) -> &'static str {
        "ssao"
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, camera: &Camera) -> RenderResult<()> {
        // White is unoccluded.
        device.set_clear_color(Vec4::ONE);
        device.set_auto_clear(true);
        device.set_render_target(Some(self.target))?;

        let (width, height) = device.viewport_size();
        let uniforms = SsaoUniforms {
            sample_radius: self.parameters.sample_radius,
            depth_check_bias: self.parameters.depth_check_bias,
            sample_count: self.parameters.sample_count,
            _padding: 0,
            resolution: [width as f32, height as f32],
            camera_near: camera.near,
            camera_far: camera.far,
        };
        let mut bytes = bytemuck::bytes_of(&uniforms).to_vec();
        bytes.extend_from_slice(bytemuck::bytes_of(&camera.uniforms()));
        device.draw(&DrawCall {
            label: "ssao".into(),
            program: Program::Ssao,
            instances: None,
            instance_count: 1,
            bindings: vec![
                Binding::Target(self.source),
                Binding::Buffer(BufferKey::SsaoKernel),
            ],
            uniforms: bytes,
            state: DrawState::fullscreen(BlendMode::Replace),
        })
    }
}

/// Owns the occlusion target and sample kernel.
#[derive(Debug)]
pub struct SsaoPipeline {
    target: ManagedTarget,
    kernel: Vec<Vec3>,
}

impl SsaoPipeline {
    pub fn new() -> Self {
        Self {
            target: ManagedTarget::new("ssao", TargetFormat::R8, false),
            kernel: Vec::new(),
        }
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target.id()
    }

    /// The uploaded sample kernel.
    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    /// Regenerates and uploads the kernel when the sample count changed.
    fn sync_kernel(&mut self, device: &mut dyn GraphicsDevice, sample_count: u32) -> RenderResult<()> {
        if self.kernel.len() == sample_count as usize {
            return Ok(());
        }
        self.kernel = generate_kernel(sample_count, &mut rand::thread_rng());
        let packed: Vec<[f32; 4]> = self
            .kernel
            .iter()
            .map(|sample| sample.extend(0.0).to_array())
            .collect();
        device.upload_buffer(BufferKey::SsaoKernel, bytemuck::cast_slice(&packed), None)?;
        log::debug!("uploaded ssao kernel with {sample_count} samples");
        Ok(())
    }

    /// The occlusion pass, if sampling is enabled and `source` (the back
    /// geometry target) has content this frame.
    pub fn pass<'a>(
        &mut self,
        parameters: &SsaoParameters,
        device: &mut dyn GraphicsDevice,
        source: Option<TargetId>,
    ) -> RenderResult<Option<Box<dyn RenderPass + 'a>>> {
        let Some(source) = source.filter(|_| parameters.is_enabled()) else {
            return Ok(None);
        };
        self.sync_kernel(device, parameters.sample_count)?;
        let size = device.viewport_size();
        let target = self.target.ensure(device, size)?;
        Ok(Some(Box::new(SsaoPass {
            target,
            source,
            parameters: parameters.clone(),
        })))
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.target.release(device);
        device.release_buffer(BufferKey::SsaoKernel);
        self.kernel.clear();
    }
}

impl Default for SsaoPipeline {
    fn default() -> Self {
        Self::new()
    }
}
