//! The per-frame driver.
//!
//! A [`Viewer`] owns every registry, one [`GeometryBatcher`] per CAD model and
//! the composite pipeline. Each frame follows one contract: mutate styles,
//! transforms and sectors, then call [`Viewer::render`], which uploads pending
//! lookups and instance data before generating and running the pipeline.

use std::time::Instant;

use strata_core::{
    ClipPlane, ModelHandle, RenderOptions, Result, SectorId, StrataError, StyleOverrideIndex,
    TransformOverrideIndex,
};
use strata_render::{
    BasicPipelineExecutor, Camera, CompositePipelineProvider, FrameContext, GeometryBatcher,
    GraphicsDevice, ModelMaterialRegistry, PipelineExecutor, PipelineProvider,
    PointCloudMaterialRegistry, RenderResult, SectorGeometry, StepPipelineExecutor,
};

/// Streaming CAD and point cloud renderer.
pub struct Viewer {
    materials: ModelMaterialRegistry,
    point_clouds: PointCloudMaterialRegistry,
    batchers: Vec<GeometryBatcher>,
    provider: CompositePipelineProvider,
    executor: BasicPipelineExecutor,
    options: RenderOptions,
}

impl Viewer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            materials: ModelMaterialRegistry::new(options.style_rebuild_interval()),
            point_clouds: PointCloudMaterialRegistry::new(),
            batchers: Vec::new(),
            provider: CompositePipelineProvider::new(),
            executor: BasicPipelineExecutor::new().with_debug_timings(options.debug_render_timings),
            options,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Replaces the render options; takes effect on the next frame.
    pub fn set_options(&mut self, options: RenderOptions) {
        self.materials
            .set_rebuild_interval(options.style_rebuild_interval());
        self.executor.set_debug_timings(options.debug_render_timings);
        self.options = options;
    }

    pub fn materials(&self) -> &ModelMaterialRegistry {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut ModelMaterialRegistry {
        &mut self.materials
    }

    pub fn point_clouds(&self) -> &PointCloudMaterialRegistry {
        &self.point_clouds
    }

    pub fn point_clouds_mut(&mut self) -> &mut PointCloudMaterialRegistry {
        &mut self.point_clouds
    }

    pub fn provider(&self) -> &CompositePipelineProvider {
        &self.provider
    }

    /// Registers a CAD model with `object_count` styleable objects.
    pub fn add_cad_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        object_count: u32,
    ) -> RenderResult<()> {
        self.materials.register_model(device, handle, object_count)?;
        self.batchers.push(GeometryBatcher::new(handle));
        Ok(())
    }

    /// Removes a CAD model with all its sectors and device resources.
    pub fn remove_cad_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
    ) -> RenderResult<()> {
        self.materials.deregister_model(device, handle)?;
        if let Some(index) = self.batchers.iter().position(|b| b.model() == handle) {
            let mut batcher = self.batchers.remove(index);
            batcher.release(device);
        }
        Ok(())
    }

    pub fn batcher(&self, handle: ModelHandle) -> Result<&GeometryBatcher> {
        self.batchers
            .iter()
            .find(|batcher| batcher.model() == handle)
            .ok_or(StrataError::UnknownModel(handle))
    }

    fn batcher_mut(&mut self, handle: ModelHandle) -> Result<&mut GeometryBatcher> {
        self.batchers
            .iter_mut()
            .find(|batcher| batcher.model() == handle)
            .ok_or(StrataError::UnknownModel(handle))
    }

    /// Adds a streamed sector. Returns `false` if it was already loaded.
    pub fn submit_sector(
        &mut self,
        handle: ModelHandle,
        sector: SectorId,
        geometry: &[SectorGeometry],
    ) -> RenderResult<bool> {
        self.batcher_mut(handle)?.submit(sector, geometry)
    }

    /// Drops a sector. Returns `false` if it was not loaded.
    pub fn remove_sector(&mut self, handle: ModelHandle, sector: SectorId) -> Result<bool> {
        Ok(self.batcher_mut(handle)?.remove(sector))
    }

    pub fn style_index_mut(&mut self, handle: ModelHandle) -> Result<&mut StyleOverrideIndex> {
        self.materials.style_index_mut(handle)
    }

    pub fn transform_index_mut(
        &mut self,
        handle: ModelHandle,
    ) -> Result<&mut TransformOverrideIndex> {
        self.materials.transform_index_mut(handle)
    }

    pub fn add_point_cloud_model(&mut self, handle: ModelHandle) -> Result<()> {
        self.point_clouds.register_model(handle)
    }

    pub fn remove_point_cloud_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
    ) -> RenderResult<()> {
        self.point_clouds.deregister_model(device, handle)
    }

    /// Clip planes applied to every CAD model and point cloud.
    pub fn set_clip_planes(&mut self, planes: Vec<ClipPlane>) {
        self.point_clouds.set_clip_planes(planes.clone());
        self.materials.set_global_clip_planes(planes);
    }

    /// Uploads pending style, transform and instance changes.
    fn prepare(&mut self, device: &mut dyn GraphicsDevice, now: Instant) -> RenderResult<()> {
        self.materials.prepare_frame(device, now)?;
        for batcher in &mut self.batchers {
            batcher.sync(device)?;
        }
        Ok(())
    }

    /// Renders a frame. Returns how many passes ran.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
        now: Instant,
    ) -> RenderResult<usize> {
        self.prepare(device, now)?;
        let frame = FrameContext {
            materials: &self.materials,
            batchers: &self.batchers,
            point_clouds: &self.point_clouds,
            options: &self.options,
        };
        self.executor
            .render(&mut self.provider, &frame, device, camera)
    }

    /// Renders only the first `steps` passes of a frame.
    pub fn render_steps(
        &mut self,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
        now: Instant,
        steps: usize,
    ) -> RenderResult<usize> {
        self.prepare(device, now)?;
        let frame = FrameContext {
            materials: &self.materials,
            batchers: &self.batchers,
            point_clouds: &self.point_clouds,
            options: &self.options,
        };
        StepPipelineExecutor::new(steps)
            .with_debug_timings(self.options.debug_render_timings)
            .render(&mut self.provider, &frame, device, camera)
    }

    /// Releases every device resource and forgets all models.
    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.provider.dispose(device);
        for mut batcher in self.batchers.drain(..) {
            batcher.release(device);
        }
        let cad: Vec<ModelHandle> = self.materials.handles().collect();
        for handle in cad {
            self.materials.deregister_model(device, handle)?;
        }
        let points: Vec<ModelHandle> = self.point_clouds.handles().collect();
        for handle in points {
            self.point_clouds.deregister_model(device, handle)?;
        }
        Ok(())
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}
