//! The full per-frame pipeline.

use crate::device::GraphicsDevice;
use crate::error::RenderResult;
use crate::pass::{FrameContext, Pipeline, PipelineProvider};
use crate::pipelines::cad_geometry::CadGeometryPipeline;
use crate::pipelines::point_cloud::PointCloudPipeline;
use crate::pipelines::post_processing::{CompositeInputs, PostProcessingPipeline};
use crate::pipelines::ssao::SsaoPipeline;

/// Chains the CAD geometry, point cloud, occlusion and post processing
/// pipelines.
///
/// A frame is generated as:
/// 1. the CAD layer passes that have objects,
/// 2. the point cloud passes, if any point cloud is loaded,
/// 3. ambient occlusion, if enabled and the back layer has objects,
/// 4. the composite pass,
/// 5. the blit to whatever target was bound when the frame began.
#[derive(Debug, Default)]
pub struct CompositePipelineProvider {
    cad: CadGeometryPipeline,
    point_cloud: PointCloudPipeline,
    ssao: SsaoPipeline,
    post: PostProcessingPipeline,
}

impl CompositePipelineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cad_geometry(&self) -> &CadGeometryPipeline {
        &self.cad
    }

    pub fn point_cloud(&self) -> &PointCloudPipeline {
        &self.point_cloud
    }

    pub fn ssao(&self) -> &SsaoPipeline {
        &self.ssao
    }

    pub fn post_processing(&self) -> &PostProcessingPipeline {
        &self.post
    }
}

impl PipelineProvider for CompositePipelineProvider {
    fn pipeline<'a>(
        &mut self,
        frame: &FrameContext<'a>,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<Pipeline<'a>> {
        // Generation below rebinds targets; the blit needs the host's state.
        let output = device.state();

        let cad = self.cad.generate(frame, device)?;
        let mut passes = cad.passes;

        let point_passes = self.point_cloud.passes(frame, device)?;
        let point_cloud = if point_passes.is_empty() {
            None
        } else {
            self.point_cloud.target()
        };
        passes.extend(point_passes);

        let back = cad.presence.back.then_some(cad.targets.back);
        let ssao = self.ssao.pass(&frame.options.ssao, device, back)?;
        let ssao_target = if ssao.is_some() { self.ssao.target() } else { None };
        passes.extend(ssao);

        let inputs = CompositeInputs {
            cad: cad.targets,
            presence: cad.presence,
            ssao: ssao_target,
            point_cloud,
        };
        passes.extend(self.post.passes(frame.options, device, inputs, output)?);
        Ok(Pipeline::new(passes))
    }

    fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        self.cad.release(device);
        self.point_cloud.release(device);
        self.ssao.release(device);
        self.post.release(device);
    }
}
