//! strata: a streaming CAD and point cloud renderer with per-object styling.
//!
//! CAD models arrive as sectors of primitive instances. The renderer merges
//! them into a handful of draw calls per model, recolors, hides, ghosts or
//! moves any object through compact lookups, and composites the result with
//! point clouds, ambient occlusion and outlines.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Instant;
//! use strata::*;
//!
//! fn main() -> RenderResult<()> {
//!     init_logging();
//!     let mut device = create_headless_device(800, 600)?;
//!     let mut viewer = Viewer::default();
//!
//!     let model = ModelHandle::from_raw(1);
//!     viewer.add_cad_model(&mut device, model, 128)?;
//!     viewer
//!         .style_index_mut(model)?
//!         .assign(&ObjectSet::from_range(3..4), NodeAppearance::HIDDEN)?;
//!
//!     let mut camera = Camera::default();
//!     camera.fit_viewport(800, 600);
//!     viewer.render(&mut device, &camera, Instant::now())?;
//!     Ok(())
//! }
//! ```
//!
//! # Frame contract
//!
//! Mutate styles, transforms and sectors freely between frames, then call
//! [`Viewer::render`]. Transform changes upload on the next frame; style
//! rebuilds are throttled by [`RenderOptions::style_rebuild_interval_ms`].

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

mod headless;
mod init;
mod viewer;

pub use headless::create_headless_device;
pub use init::init_logging;
pub use viewer::Viewer;

pub use strata_core::{
    AntiAliasingMode, ClipPlane, EdgeDetectionParameters, EyeDomeLighting, IndexSet, Mat4,
    ModelHandle, NodeAppearance, ObjectId, ObjectSet, ObjectSetId, OutlineColor,
    PointCloudEffectsParameters, RenderOptions, Result, SectorId, SsaoParameters,
    SsaoSampleQuality, StrataError, StyleClass, StyleOverrideIndex, TransformOverrideIndex, Vec2,
    Vec3, Vec4, MAX_CLIP_PLANES,
};
pub use strata_render::{
    BasicPipelineExecutor, Camera, CompositePipelineProvider, DeviceCommand, DrawObjectKey,
    FrameContext, GeometryBatcher, GeometryCategory, GraphicsDevice, ModelMaterialRegistry,
    Pipeline, PipelineExecutor, PipelineProvider, PointCloudMaterial, PointCloudMaterialRegistry,
    PointColorType, PointNode, PointShape, PointSizeType, ProjectionMode, RenderError,
    RenderMode, RenderPass, RenderResult, SectorGeometry, StepPipelineExecutor, TraceDevice,
    UniformValue, WgpuDevice,
};

pub use wgpu;
