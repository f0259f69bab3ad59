//! [`GraphicsDevice`] backed by wgpu.
//!
//! The device owns render targets, buffers and textures and performs clears.
//! Draws are forwarded to host-registered [`DrawProgram`]s, which build their
//! own wgpu pipelines against the resources exposed by [`WgpuResources`].

use std::collections::HashMap;
use std::ops::Range;

use glam::Vec4;

use crate::device::{
    BufferKey, DeviceState, DrawCall, GraphicsDevice, Program, TargetDescriptor, TargetFormat,
    TargetId, TextureKey,
};
use crate::error::{RenderError, RenderResult};

const COPY_ALIGNMENT: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TargetFormat::R8 => wgpu::TextureFormat::R8Unorm,
        TargetFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
    }
}

fn align_down(value: usize) -> usize {
    value - value % COPY_ALIGNMENT
}

fn align_up(value: usize) -> usize {
    value.div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT
}

/// A color image with an optional depth attachment.
pub struct GpuTarget {
    pub descriptor: TargetDescriptor,
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl GpuTarget {
    fn new(device: &wgpu::Device, descriptor: &TargetDescriptor) -> Self {
        let size = wgpu::Extent3d {
            width: descriptor.width.max(1),
            height: descriptor.height.max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(descriptor.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(descriptor.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = descriptor.depth.then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(descriptor.label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        Self {
            descriptor: descriptor.clone(),
            color,
            color_view,
            depth,
        }
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|(_, view)| view)
    }

    fn destroy(&self) {
        self.color.destroy();
        if let Some((texture, _)) = &self.depth {
            texture.destroy();
        }
    }
}

/// An uploaded texture.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Device resources by key, as seen by draw programs.
#[derive(Default)]
pub struct WgpuResources {
    targets: HashMap<TargetId, GpuTarget>,
    buffers: HashMap<BufferKey, wgpu::Buffer>,
    textures: HashMap<TextureKey, GpuTexture>,
}

impl WgpuResources {
    pub fn target(&self, target: TargetId) -> RenderResult<&GpuTarget> {
        self.targets
            .get(&target)
            .ok_or(RenderError::UnknownTarget(target))
    }

    pub fn buffer(&self, key: BufferKey) -> RenderResult<&wgpu::Buffer> {
        self.buffers.get(&key).ok_or(RenderError::UnknownBuffer(key))
    }

    pub fn texture(&self, key: TextureKey) -> RenderResult<&GpuTexture> {
        self.textures.get(&key).ok_or(RenderError::UnknownTexture(key))
    }
}

/// Everything a draw program needs to record one draw.
pub struct WgpuDrawContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// The bound render target.
    pub target: &'a GpuTarget,
    pub resources: &'a WgpuResources,
}

/// Host-provided implementation of a [`Program`].
pub trait DrawProgram {
    fn draw(&mut self, context: &mut WgpuDrawContext<'_>, call: &DrawCall) -> RenderResult<()>;
}

/// wgpu implementation of [`GraphicsDevice`].
///
/// The host surface is an offscreen target of the viewport size; read it back
/// with [`WgpuDevice::output`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    output: GpuTarget,
    resources: WgpuResources,
    programs: HashMap<Program, Box<dyn DrawProgram>>,
    state: DeviceState,
    next_target: u32,
}

impl WgpuDevice {
    /// Creates a device without a window.
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("strata device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        log::info!("created headless device on {}", adapter.get_info().name);
        Ok(Self::from_device(device, queue, width, height))
    }

    /// Wraps an existing wgpu device.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let output = GpuTarget::new(
            &device,
            &TargetDescriptor {
                label: "strata output",
                width,
                height,
                format: TargetFormat::Rgba8,
                depth: true,
            },
        );
        Self {
            device,
            queue,
            output,
            resources: WgpuResources::default(),
            programs: HashMap::new(),
            state: DeviceState::default(),
            next_target: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The host surface.
    pub fn output(&self) -> &GpuTarget {
        &self.output
    }

    pub fn resources(&self) -> &WgpuResources {
        &self.resources
    }

    /// Registers the implementation of `program`, replacing any earlier one.
    pub fn register_program(&mut self, program: Program, implementation: Box<dyn DrawProgram>) {
        self.programs.insert(program, implementation);
    }

    /// Resizes the host surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (self.output.descriptor.width, self.output.descriptor.height) == (width, height) {
            return;
        }
        let mut descriptor = self.output.descriptor.clone();
        descriptor.width = width;
        descriptor.height = height;
        self.output.destroy();
        self.output = GpuTarget::new(&self.device, &descriptor);
    }

    fn bound_target(&self) -> RenderResult<&GpuTarget> {
        match self.state.render_target {
            None => Ok(&self.output),
            Some(id) => self.resources.target(id),
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn viewport_size(&self) -> (u32, u32) {
        (self.output.descriptor.width, self.output.descriptor.height)
    }

    fn render_target(&self) -> Option<TargetId> {
        self.state.render_target
    }

    fn set_render_target(&mut self, target: Option<TargetId>) -> RenderResult<()> {
        if let Some(id) = target {
            self.resources.target(id)?;
        }
        self.state.render_target = target;
        if self.state.auto_clear {
            self.clear()?;
        }
        Ok(())
    }

    fn clear_color(&self) -> Vec4 {
        self.state.clear_color
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.state.clear_color = color;
    }

    fn auto_clear(&self) -> bool {
        self.state.auto_clear
    }

    fn set_auto_clear(&mut self, enabled: bool) {
        self.state.auto_clear = enabled;
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> RenderResult<TargetId> {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        self.resources
            .targets
            .insert(id, GpuTarget::new(&self.device, descriptor));
        Ok(id)
    }

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) -> RenderResult<()> {
        let existing = self.resources.target(target)?;
        let mut descriptor = existing.descriptor.clone();
        descriptor.width = width;
        descriptor.height = height;
        existing.destroy();
        self.resources
            .targets
            .insert(target, GpuTarget::new(&self.device, &descriptor));
        Ok(())
    }

    fn release_target(&mut self, target: TargetId) {
        if let Some(removed) = self.resources.targets.remove(&target) {
            removed.destroy();
        }
    }

    fn clear(&mut self) -> RenderResult<()> {
        let target = self.bound_target()?;
        let color = self.state.clear_color.as_dvec4();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color.x,
                            g: color.y,
                            b: color.z,
                            a: color.w,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: target.depth_view().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                ..Default::default()
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn upload_buffer(
        &mut self,
        key: BufferKey,
        bytes: &[u8],
        range: Option<Range<usize>>,
    ) -> RenderResult<()> {
        match range {
            None => {
                let size = align_up(bytes.len()).max(COPY_ALIGNMENT);
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("strata buffer"),
                    size: size as u64,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let mut padded = bytes.to_vec();
                padded.resize(size, 0);
                self.queue.write_buffer(&buffer, 0, &padded);
                if let Some(old) = self.resources.buffers.insert(key, buffer) {
                    old.destroy();
                }
            }
            Some(range) => {
                let buffer = self.resources.buffer(key)?;
                let start = align_down(range.start);
                let end = align_up(range.end.min(bytes.len()));
                if end as u64 > buffer.size() || start >= end {
                    return Err(RenderError::UnknownBuffer(key));
                }
                let mut data = bytes[start..end.min(bytes.len())].to_vec();
                data.resize(end - start, 0);
                self.queue.write_buffer(buffer, start as u64, &data);
            }
        }
        Ok(())
    }

    fn release_buffer(&mut self, key: BufferKey) {
        if let Some(buffer) = self.resources.buffers.remove(&key) {
            buffer.destroy();
        }
    }

    fn upload_texture(&mut self, key: TextureKey, image: &image::RgbaImage) -> RenderResult<()> {
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("strata texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Some(old) = self.resources.textures.insert(key, GpuTexture { texture, view }) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn release_texture(&mut self, key: TextureKey) {
        if let Some(texture) = self.resources.textures.remove(&key) {
            texture.texture.destroy();
        }
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        if let Some(key) = call.instances {
            self.resources.buffer(key)?;
        }
        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(RenderError::MissingProgram(call.program))?;
        let target = match self.state.render_target {
            None => &self.output,
            Some(id) => self.resources.target(id)?,
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(call.label.as_str()),
            });
        let mut context = WgpuDrawContext {
            device: &self.device,
            queue: &self.queue,
            encoder: &mut encoder,
            target,
            resources: &self.resources,
        };
        program.draw(&mut context, call)?;
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
