//! Render passes and the providers that sequence them.

use strata_core::RenderOptions;

use crate::batching::GeometryBatcher;
use crate::camera::Camera;
use crate::device::GraphicsDevice;
use crate::error::RenderResult;
use crate::materials::ModelMaterialRegistry;
use crate::point_cloud_materials::PointCloudMaterialRegistry;

/// One unit of GPU work.
pub trait RenderPass {
    /// Stable name used for logging and tests.
    fn name(&self) -> &'static str;

    /// Issues the pass. May bind and draw into render targets.
    fn render(&mut self, device: &mut dyn GraphicsDevice, camera: &Camera) -> RenderResult<()>;
}

/// Scene state a provider reads to decide which passes a frame needs.
///
/// Built after all mutations of the frame and after the registries have
/// uploaded their lookups.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub materials: &'a ModelMaterialRegistry,
    pub batchers: &'a [GeometryBatcher],
    pub point_clouds: &'a PointCloudMaterialRegistry,
    pub options: &'a RenderOptions,
}

/// The ordered passes of one frame.
///
/// Generated fresh every frame and consumed once.
pub struct Pipeline<'a> {
    passes: std::vec::IntoIter<Box<dyn RenderPass + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(passes: Vec<Box<dyn RenderPass + 'a>>) -> Self {
        Self {
            passes: passes.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Remaining passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.len() == 0
    }

    /// Names of the remaining passes without consuming them.
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.as_slice().iter().map(|pass| pass.name()).collect()
    }
}

impl<'a> Iterator for Pipeline<'a> {
    type Item = Box<dyn RenderPass + 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.passes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.passes.size_hint()
    }
}

impl ExactSizeIterator for Pipeline<'_> {}

/// Produces the pass sequence of a frame.
pub trait PipelineProvider {
    /// Generates this frame's passes.
    ///
    /// Implementations may create or resize their render targets here.
    fn pipeline<'a>(
        &mut self,
        frame: &FrameContext<'a>,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<Pipeline<'a>>;

    /// Releases device resources owned by the provider.
    fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        let _ = device;
    }
}
