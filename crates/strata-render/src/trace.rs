//! A graphics device that records commands instead of executing them.
//!
//! Used for frame capture and for exercising passes without a GPU.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use glam::Vec4;

use crate::device::{
    BufferKey, DeviceState, DrawCall, DrawState, GraphicsDevice, Program, TargetDescriptor,
    TargetId, TextureKey,
};
use crate::error::{RenderError, RenderResult};

/// A recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTarget { target: TargetId, label: &'static str },
    ResizeTarget { target: TargetId, width: u32, height: u32 },
    ReleaseTarget(TargetId),
    BindTarget(Option<TargetId>),
    Clear { target: Option<TargetId>, color: Vec4 },
    UploadBuffer { key: BufferKey, len: usize, range: Option<Range<usize>> },
    ReleaseBuffer(BufferKey),
    UploadTexture { key: TextureKey, width: u32, height: u32 },
    ReleaseTexture(TextureKey),
    Draw {
        label: String,
        program: Program,
        target: Option<TargetId>,
        instance_count: u32,
        state: DrawState,
    },
}

/// How a program configured to fail reports the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Reported as [`RenderError::SourceNotReady`].
    Transient,
    /// Reported as [`RenderError::DrawFailed`].
    Fatal,
}

/// Command-recording implementation of [`GraphicsDevice`].
#[derive(Debug, Default)]
pub struct TraceDevice {
    size: (u32, u32),
    state: DeviceState,
    targets: HashMap<TargetId, TargetDescriptor>,
    next_target: u32,
    buffers: HashMap<BufferKey, usize>,
    textures: HashSet<TextureKey>,
    failures: HashMap<Program, InjectedFailure>,
    commands: Vec<DeviceCommand>,
}

impl TraceDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }

    /// Changes the output size, as a window resize would.
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    /// Makes every draw with `program` fail.
    pub fn fail_program(&mut self, program: Program, failure: InjectedFailure) {
        self.failures.insert(program, failure);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Labels of recorded draws, in order.
    pub fn draw_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Draw { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Recorded draws with `program`.
    pub fn draws_of(&self, program: Program) -> usize {
        self.count(|command| matches!(command, DeviceCommand::Draw { program: p, .. } if *p == program))
    }

    pub fn creations_of(&self, label: &str) -> usize {
        self.count(|command| matches!(command, DeviceCommand::CreateTarget { label: l, .. } if *l == label))
    }

    pub fn resizes_of(&self, target: TargetId) -> usize {
        self.count(|command| matches!(command, DeviceCommand::ResizeTarget { target: t, .. } if *t == target))
    }

    pub fn resize_count(&self) -> usize {
        self.count(|command| matches!(command, DeviceCommand::ResizeTarget { .. }))
    }

    pub fn clears_of(&self, target: Option<TargetId>) -> usize {
        self.count(|command| matches!(command, DeviceCommand::Clear { target: t, .. } if *t == target))
    }

    pub fn uploads_of(&self, key: BufferKey) -> usize {
        self.count(|command| matches!(command, DeviceCommand::UploadBuffer { key: k, .. } if *k == key))
    }

    pub fn texture_releases_of(&self, key: TextureKey) -> usize {
        self.count(|command| matches!(command, DeviceCommand::ReleaseTexture(k) if *k == key))
    }

    pub fn texture_uploads_of(&self, key: TextureKey) -> usize {
        self.count(|command| matches!(command, DeviceCommand::UploadTexture { key: k, .. } if *k == key))
    }

    pub fn has_buffer(&self, key: BufferKey) -> bool {
        self.buffers.contains_key(&key)
    }

    pub fn buffer_len(&self, key: BufferKey) -> Option<usize> {
        self.buffers.get(&key).copied()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn has_texture(&self, key: TextureKey) -> bool {
        self.textures.contains(&key)
    }

    pub fn target(&self, target: TargetId) -> Option<&TargetDescriptor> {
        self.targets.get(&target)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn count(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }
}

impl GraphicsDevice for TraceDevice {
    fn viewport_size(&self) -> (u32, u32) {
        self.size
    }

    fn render_target(&self) -> Option<TargetId> {
        self.state.render_target
    }

    fn set_render_target(&mut self, target: Option<TargetId>) -> RenderResult<()> {
        if let Some(id) = target {
            if !self.targets.contains_key(&id) {
                return Err(RenderError::UnknownTarget(id));
            }
        }
        self.state.render_target = target;
        self.commands.push(DeviceCommand::BindTarget(target));
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
        let target = TargetId(self.next_target);
        self.next_target += 1;
        self.targets.insert(target, descriptor.clone());
        self.commands.push(DeviceCommand::CreateTarget {
            target,
            label: descriptor.label,
        });
        Ok(target)
    }

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) -> RenderResult<()> {
        let descriptor = self
            .targets
            .get_mut(&target)
            .ok_or(RenderError::UnknownTarget(target))?;
        descriptor.width = width;
        descriptor.height = height;
        self.commands.push(DeviceCommand::ResizeTarget {
            target,
            width,
            height,
        });
        Ok(())
    }

    fn release_target(&mut self, target: TargetId) {
        if self.targets.remove(&target).is_some() {
            self.commands.push(DeviceCommand::ReleaseTarget(target));
        }
    }

    fn clear(&mut self) -> RenderResult<()> {
        self.commands.push(DeviceCommand::Clear {
            target: self.state.render_target,
            color: self.state.clear_color,
        });
        Ok(())
    }

    fn upload_buffer(
        &mut self,
        key: BufferKey,
        bytes: &[u8],
        range: Option<Range<usize>>,
    ) -> RenderResult<()> {
        match &range {
            None => {
                self.buffers.insert(key, bytes.len());
            }
            Some(range) => {
                let len = *self.buffers.get(&key).ok_or(RenderError::UnknownBuffer(key))?;
                if range.end > len || range.end > bytes.len() {
                    return Err(RenderError::UnknownBuffer(key));
                }
            }
        }
        self.commands.push(DeviceCommand::UploadBuffer {
            key,
            len: bytes.len(),
            range,
        });
        Ok(())
    }

    fn release_buffer(&mut self, key: BufferKey) {
        if self.buffers.remove(&key).is_some() {
            self.commands.push(DeviceCommand::ReleaseBuffer(key));
        }
    }

    fn upload_texture(&mut self, key: TextureKey, image: &image::RgbaImage) -> RenderResult<()> {
        self.textures.insert(key);
        self.commands.push(DeviceCommand::UploadTexture {
            key,
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    fn release_texture(&mut self, key: TextureKey) {
        if self.textures.remove(&key) {
            self.commands.push(DeviceCommand::ReleaseTexture(key));
        }
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        match self.failures.get(&call.program) {
            Some(InjectedFailure::Transient) => {
                return Err(RenderError::SourceNotReady(call.label.clone()))
            }
            Some(InjectedFailure::Fatal) => return Err(RenderError::DrawFailed(call.label.clone())),
            None => {}
        }
        if let Some(key) = call.instances {
            if !self.buffers.contains_key(&key) {
                return Err(RenderError::UnknownBuffer(key));
            }
        }
        self.commands.push(DeviceCommand::Draw {
            label: call.label.clone(),
            program: call.program,
            target: self.state.render_target,
            instance_count: call.instance_count,
            state: call.state,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TargetFormat;
    use crate::materials::RenderMode;

    #[test]
    fn test_auto_clear_on_bind() {
        let mut device = TraceDevice::new(8, 8);
        let target = device
            .create_target(&TargetDescriptor {
                label: "color",
                width: 8,
                height: 8,
                format: TargetFormat::Rgba8,
                depth: true,
            })
            .unwrap();
        device.set_render_target(Some(target)).unwrap();
        device.set_auto_clear(false);
        device.set_render_target(None).unwrap();
        assert_eq!(device.clears_of(Some(target)), 1);
        assert_eq!(device.clears_of(None), 0);
    }

    #[test]
    fn test_ranged_upload_requires_buffer() {
        let mut device = TraceDevice::new(8, 8);
        let key = BufferKey::SsaoKernel;
        assert!(matches!(
            device.upload_buffer(key, &[0; 16], Some(0..4)),
            Err(RenderError::UnknownBuffer(_))
        ));
        device.upload_buffer(key, &[0; 16], None).unwrap();
        device.upload_buffer(key, &[1; 16], Some(4..8)).unwrap();
        assert_eq!(device.uploads_of(key), 2);
    }

    #[test]
    fn test_injected_failures() {
        let mut device = TraceDevice::new(8, 8);
        device.fail_program(Program::Ssao, InjectedFailure::Transient);
        let call = DrawCall {
            label: "ssao".into(),
            program: Program::Ssao,
            instances: None,
            instance_count: 1,
            bindings: Vec::new(),
            uniforms: Vec::new(),
            state: DrawState::opaque(RenderMode::Color),
        };
        assert!(device.draw(&call).unwrap_err().is_transient());
        device.clear_failures();
        device.draw(&call).unwrap();
        assert_eq!(device.draw_labels(), vec!["ssao"]);
    }
}
