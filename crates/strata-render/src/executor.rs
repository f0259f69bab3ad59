//! Drives a provider's passes against a device.

use std::time::Instant;

use crate::camera::Camera;
use crate::device::{DeviceStateScope, GraphicsDevice};
use crate::error::RenderResult;
use crate::pass::{FrameContext, PipelineProvider, RenderPass};

/// Runs a frame's passes.
pub trait PipelineExecutor {
    /// Generates and runs the pipeline. Returns how many passes were run.
    ///
    /// Device state changed by the provider or any pass is restored before
    /// returning, including when an error is returned.
    fn render(
        &mut self,
        provider: &mut dyn PipelineProvider,
        frame: &FrameContext<'_>,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
    ) -> RenderResult<usize>;
}

/// Runs a single pass, skipping it on transient errors.
fn run_pass(
    pass: &mut dyn RenderPass,
    device: &mut dyn GraphicsDevice,
    camera: &Camera,
    debug_timings: bool,
) -> RenderResult<()> {
    let started = Instant::now();
    match pass.render(device, camera) {
        Ok(()) => {
            if debug_timings {
                log::debug!("pass '{}' took {:?}", pass.name(), started.elapsed());
            }
            Ok(())
        }
        Err(err) if err.is_transient() => {
            log::warn!("skipping pass '{}' this frame: {err}", pass.name());
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn execute(
    provider: &mut dyn PipelineProvider,
    frame: &FrameContext<'_>,
    device: &mut dyn GraphicsDevice,
    camera: &Camera,
    limit: Option<usize>,
    debug_timings: bool,
) -> RenderResult<usize> {
    let mut scope = DeviceStateScope::new(device);
    let pipeline = provider.pipeline(frame, &mut *scope)?;
    let mut executed = 0;
    for mut pass in pipeline.take(limit.unwrap_or(usize::MAX)) {
        run_pass(pass.as_mut(), &mut *scope, camera, debug_timings)?;
        executed += 1;
    }
    scope.reset()?;
    Ok(executed)
}

/// Runs every pass of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct BasicPipelineExecutor {
    debug_timings: bool,
}

impl BasicPipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs each pass with its CPU time at debug level.
    pub fn with_debug_timings(mut self, enabled: bool) -> Self {
        self.debug_timings = enabled;
        self
    }

    pub fn set_debug_timings(&mut self, enabled: bool) {
        self.debug_timings = enabled;
    }
}

impl PipelineExecutor for BasicPipelineExecutor {
    fn render(
        &mut self,
        provider: &mut dyn PipelineProvider,
        frame: &FrameContext<'_>,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
    ) -> RenderResult<usize> {
        execute(provider, frame, device, camera, None, self.debug_timings)
    }
}

/// Runs only the first `steps` passes; for profiling and progressive display.
#[derive(Debug, Clone)]
pub struct StepPipelineExecutor {
    steps: usize,
    debug_timings: bool,
}

impl StepPipelineExecutor {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            debug_timings: false,
        }
    }

    pub fn with_debug_timings(mut self, enabled: bool) -> Self {
        self.debug_timings = enabled;
        self
    }
}

impl PipelineExecutor for StepPipelineExecutor {
    fn render(
        &mut self,
        provider: &mut dyn PipelineProvider,
        frame: &FrameContext<'_>,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
    ) -> RenderResult<usize> {
        execute(provider, frame, device, camera, Some(self.steps), self.debug_timings)
    }
}
