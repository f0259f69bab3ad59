//! Render targets that follow the viewport size.

use crate::device::{GraphicsDevice, TargetDescriptor, TargetFormat, TargetId};
use crate::error::RenderResult;

/// A lazily created render target, resized only when the viewport changes.
#[derive(Debug, Clone)]
pub struct ManagedTarget {
    descriptor: TargetDescriptor,
    id: Option<TargetId>,
}

impl ManagedTarget {
    pub fn new(label: &'static str, format: TargetFormat, depth: bool) -> Self {
        Self {
            descriptor: TargetDescriptor {
                label,
                width: 0,
                height: 0,
                format,
                depth,
            },
            id: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.descriptor.label
    }

    /// Device id, once created.
    pub fn id(&self) -> Option<TargetId> {
        self.id
    }

    /// Last size the target was created or resized to.
    pub fn size(&self) -> (u32, u32) {
        (self.descriptor.width, self.descriptor.height)
    }

    /// Returns the target, creating it on first use and resizing it when
    /// `size` differs from its last known size.
    pub fn ensure(
        &mut self,
        device: &mut dyn GraphicsDevice,
        size: (u32, u32),
    ) -> RenderResult<TargetId> {
        let (width, height) = (size.0.max(1), size.1.max(1));
        match self.id {
            Some(id) if self.size() == (width, height) => Ok(id),
            Some(id) => {
                device.resize_target(id, width, height)?;
                self.descriptor.width = width;
                self.descriptor.height = height;
                log::debug!("resized target '{}' to {width}x{height}", self.label());
                Ok(id)
            }
            None => {
                self.descriptor.width = width;
                self.descriptor.height = height;
                let id = device.create_target(&self.descriptor)?;
                self.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(id) = self.id.take() {
            device.release_target(id);
        }
        self.descriptor.width = 0;
        self.descriptor.height = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceDevice;

    #[test]
    fn test_resize_only_on_change() {
        let mut device = TraceDevice::new(32, 16);
        let mut target = ManagedTarget::new("color", TargetFormat::Rgba8, true);

        let id = target.ensure(&mut device, (32, 16)).unwrap();
        assert_eq!(target.ensure(&mut device, (32, 16)).unwrap(), id);
        assert_eq!(device.creations_of("color"), 1);
        assert_eq!(device.resize_count(), 0);

        target.ensure(&mut device, (64, 16)).unwrap();
        target.ensure(&mut device, (64, 16)).unwrap();
        assert_eq!(device.resizes_of(id), 1);
        assert_eq!(target.size(), (64, 16));
    }

    #[test]
    fn test_release_recreates() {
        let mut device = TraceDevice::new(8, 8);
        let mut target = ManagedTarget::new("ssao", TargetFormat::R8, false);
        target.ensure(&mut device, (8, 8)).unwrap();
        target.release(&mut device);
        target.release(&mut device);
        assert_eq!(target.id(), None);
        assert_eq!(device.target_count(), 0);

        target.ensure(&mut device, (8, 8)).unwrap();
        assert_eq!(device.creations_of("ssao"), 2);
    }

    #[test]
    fn test_zero_size_clamped() {
        let mut device = TraceDevice::new(0, 0);
        let mut target = ManagedTarget::new("color", TargetFormat::Rgba8, false);
        let id = target.ensure(&mut device, (0, 0)).unwrap();
        assert_eq!(device.target(id).map(|d| (d.width, d.height)), Some((1, 1)));
    }
}
