//! The graphics device seam.
//!
//! Everything above this module issues work through [`GraphicsDevice`]; the
//! wgpu adapter and the recording [`TraceDevice`](crate::TraceDevice) sit
//! below it.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};

use glam::Vec4;
use strata_core::{ModelHandle, SectorId};

use crate::category::GeometryCategory;
use crate::error::RenderResult;
use crate::materials::RenderMode;

/// Identifier of a device-owned render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target {}", self.0)
    }
}

/// Pixel formats used by render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8,
    Rgba16Float,
    R8,
    Depth32,
}

/// Description of a render target; the size follows the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
    /// Attach a depth buffer alongside the color image.
    pub depth: bool,
}

/// Names of device buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKey {
    /// Packed per-object style records of a model.
    StyleLookup(ModelHandle),
    /// Per-object 1-based matrix index of a model.
    TransformLookup(ModelHandle),
    /// Packed override matrices of a model.
    TransformMatrices(ModelHandle),
    /// Instance attributes of one draw object.
    Instances {
        model: ModelHandle,
        category: GeometryCategory,
        batch_key: u64,
    },
    /// Points of one streamed point cloud node.
    PointNode { model: ModelHandle, node: u64 },
    /// Ambient occlusion sample kernel.
    SsaoKernel,
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKey::StyleLookup(model) => write!(f, "style lookup of model {model}"),
            BufferKey::TransformLookup(model) => write!(f, "transform lookup of model {model}"),
            BufferKey::TransformMatrices(model) => write!(f, "transforms of model {model}"),
            BufferKey::Instances {
                model,
                category,
                batch_key,
            } => write!(f, "{category} instances {batch_key} of model {model}"),
            BufferKey::PointNode { model, node } => write!(f, "point node {node} of model {model}"),
            BufferKey::SsaoKernel => f.write_str("ssao kernel"),
        }
    }
}

/// Names of device textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureKey {
    /// Diffuse texture of a textured sector.
    Sector { model: ModelHandle, sector: SectorId },
    /// Outline color table.
    OutlinePalette,
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureKey::Sector { model, sector } => {
                write!(f, "texture of sector {sector} in model {model}")
            }
            TextureKey::OutlinePalette => f.write_str("outline palette"),
        }
    }
}

/// Draws issued by the composite pass, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeStage {
    InFrontDepth,
    Back,
    Ghost,
    InFront,
}

/// Shader program a draw call needs. Programs are provided by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Primitive(GeometryCategory),
    Points,
    PointsDepth,
    Ssao,
    Composite(CompositeStage),
    Blit,
    Fxaa,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Primitive(category) => write!(f, "{category} primitive program"),
            other => write!(f, "{other:?} program"),
        }
    }
}

/// Color blending of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Alpha,
}

/// Fixed-function state of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawState {
    pub render_mode: RenderMode,
    pub color_write: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

impl DrawState {
    /// Opaque geometry in `mode`; color writes follow the mode.
    pub fn opaque(render_mode: RenderMode) -> Self {
        Self {
            render_mode,
            color_write: render_mode.writes_color(),
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Replace,
        }
    }

    /// Full screen pass without depth.
    pub fn fullscreen(blend: BlendMode) -> Self {
        Self {
            render_mode: RenderMode::Color,
            color_write: true,
            depth_test: false,
            depth_write: false,
            blend,
        }
    }
}

/// A resource bound to a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Target(TargetId),
    Buffer(BufferKey),
    Texture(TextureKey),
}

/// One draw issued to the current render target.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub label: String,
    pub program: Program,
    /// Per-instance attributes, if instanced.
    pub instances: Option<BufferKey>,
    pub instance_count: u32,
    pub bindings: Vec<Binding>,
    /// Packed uniform block.
    pub uniforms: Vec<u8>,
    pub state: DrawState,
}

/// Device-global state that passes may change temporarily.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub render_target: Option<TargetId>,
    pub clear_color: Vec4,
    pub auto_clear: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            render_target: None,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            auto_clear: true,
        }
    }
}

/// Sink for render target binds, uploads and draws.
///
/// A render target of `None` is the host's output surface.
pub trait GraphicsDevice {
    /// Current output size in pixels.
    fn viewport_size(&self) -> (u32, u32);

    fn render_target(&self) -> Option<TargetId>;

    /// Binds a target. With auto-clear enabled the target is cleared.
    fn set_render_target(&mut self, target: Option<TargetId>) -> RenderResult<()>;

    fn clear_color(&self) -> Vec4;

    fn set_clear_color(&mut self, color: Vec4);

    fn auto_clear(&self) -> bool;

    fn set_auto_clear(&mut self, enabled: bool);

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> RenderResult<TargetId>;

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) -> RenderResult<()>;

    fn release_target(&mut self, target: TargetId);

    /// Clears the bound target with the clear color.
    fn clear(&mut self) -> RenderResult<()>;

    /// Uploads buffer content.
    ///
    /// With `range == None` the buffer is (re)created from all of `bytes`.
    /// Otherwise `bytes[range]` is written at offset `range.start` of the
    /// existing buffer.
    fn upload_buffer(
        &mut self,
        key: BufferKey,
        bytes: &[u8],
        range: Option<Range<usize>>,
    ) -> RenderResult<()>;

    fn release_buffer(&mut self, key: BufferKey);

    fn upload_texture(&mut self, key: TextureKey, image: &image::RgbaImage) -> RenderResult<()>;

    fn release_texture(&mut self, key: TextureKey);

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()>;

    /// Snapshot of the state restored by [`DeviceStateScope`].
    fn state(&self) -> DeviceState {
        DeviceState {
            render_target: self.render_target(),
            clear_color: self.clear_color(),
            auto_clear: self.auto_clear(),
        }
    }
}

/// Restores clear color, auto-clear and render target when dropped.
///
/// Dereferences to the wrapped device, so passes run against the scope and the
/// state they leave behind is undone on every exit path, including errors and
/// panics.
pub struct DeviceStateScope<'d> {
    device: &'d mut dyn GraphicsDevice,
    saved: DeviceState,
}

impl<'d> DeviceStateScope<'d> {
    pub fn new(device: &'d mut dyn GraphicsDevice) -> Self {
        let saved = device.state();
        Self { device, saved }
    }

    /// The state that will be restored.
    pub fn saved(&self) -> DeviceState {
        self.saved
    }

    /// Restores the saved state now. The scope stays active.
    pub fn reset(&mut self) -> RenderResult<()> {
        self.device.set_clear_color(self.saved.clear_color);
        // Rebinding must not clear the host's target.
        self.device.set_auto_clear(false);
        let rebound = self.device.set_render_target(self.saved.render_target);
        self.device.set_auto_clear(self.saved.auto_clear);
        rebound
    }
}

impl<'d> Deref for DeviceStateScope<'d> {
    type Target = dyn GraphicsDevice + 'd;

    fn deref(&self) -> &Self::Target {
        &*self.device
    }
}

impl DerefMut for DeviceStateScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.device
    }
}

impl Drop for DeviceStateScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.reset() {
            log::warn!("failed to restore device state: {err}");
        }
    }
}
