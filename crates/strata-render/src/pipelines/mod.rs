//! Concrete pipelines and the composite provider that chains them.

pub mod cad_geometry;
pub mod composite;
pub mod point_cloud;
pub mod post_processing;
pub mod ssao;
pub mod targets;

pub use cad_geometry::{CadFrame, CadGeometryPipeline, CadLayer, CadTargets, LayerPresence};
pub use composite::CompositePipelineProvider;
pub use point_cloud::PointCloudPipeline;
pub use post_processing::{BlitUniforms, CompositeInputs, CompositeUniforms, PostProcessingPipeline};
pub use ssao::{generate_kernel, SsaoPipeline, SsaoUniforms};
pub use targets::ManagedTarget;
