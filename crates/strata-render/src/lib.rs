//! Rendering backend for strata.
//!
//! This crate issues all GPU work, through the [`GraphicsDevice`] seam:
//! - material and point cloud registries that keep per-model lookups uploaded
//! - the [`GeometryBatcher`] that merges streamed sectors into few draw calls
//! - render passes, pipeline providers and executors
//! - the wgpu adapter and a recording device for capture and tests

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::module_name_repetitions)]
// Pixel sizes and instance counts are cast between u32, usize and f32
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod batching;
pub mod camera;
pub mod category;
pub mod device;
pub mod error;
pub mod executor;
pub mod materials;
pub mod pass;
pub mod pipelines;
pub mod point_cloud_materials;
pub mod trace;
pub mod wgpu_device;

pub use batching::{DrawObject, DrawObjectKey, GeometryBatcher, SectorGeometry};
pub use camera::{Camera, CameraUniforms, ProjectionMode};
pub use category::{record_object_id, GeometryCategory};
pub use device::{
    Binding, BlendMode, BufferKey, CompositeStage, DeviceState, DeviceStateScope, DrawCall,
    DrawState, GraphicsDevice, Program, TargetDescriptor, TargetFormat, TargetId, TextureKey,
};
pub use error::{RenderError, RenderResult};
pub use executor::{BasicPipelineExecutor, PipelineExecutor, StepPipelineExecutor};
pub use materials::{Material, MaterialSet, ModelMaterialRegistry, RenderMode, UniformValue};
pub use pass::{FrameContext, Pipeline, PipelineProvider, RenderPass};
pub use pipelines::{
    CadGeometryPipeline, CadLayer, CompositePipelineProvider, LayerPresence, ManagedTarget,
    PointCloudPipeline, PostProcessingPipeline, SsaoPipeline,
};
pub use point_cloud_materials::{
    PointCloudMaterial, PointCloudMaterialRegistry, PointCloudUniforms, PointColorType, PointNode,
    PointShape, PointSizeType,
};
pub use trace::{DeviceCommand, InjectedFailure, TraceDevice};
pub use wgpu_device::{DrawProgram, GpuTarget, GpuTexture, WgpuDevice, WgpuDrawContext, WgpuResources};
