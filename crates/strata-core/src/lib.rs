//! Core data structures for strata.
//!
//! This crate holds the GPU-agnostic state behind the renderer:
//! - [`StyleOverrideIndex`] and [`TransformOverrideIndex`] compress sparse
//!   per-object overrides into dense lookups
//! - [`PackedOverrideBuffer`] is the defragmenting arena backing them
//! - [`RenderOptions`] is the serializable render configuration

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// GPU lookups index with u32; object counts never exceed it
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod appearance;
pub mod clip_plane;
pub mod error;
pub mod handle;
pub mod index_set;
pub mod options;
pub mod packed_buffer;
pub mod style_index;
pub mod throttle;
pub mod transform_index;

pub use appearance::{NodeAppearance, ObjectSet, ObjectSetId, OutlineColor};
pub use clip_plane::{merge_clip_planes, ClipPlane, ClipPlaneUniforms, MAX_CLIP_PLANES};
pub use error::{Result, StrataError};
pub use handle::{ModelHandle, ObjectId, SectorId, SlotId};
pub use index_set::IndexSet;
pub use options::{
    AntiAliasingMode, EdgeDetectionParameters, EyeDomeLighting, PointCloudEffectsParameters,
    RenderOptions, SsaoParameters, SsaoSampleQuality,
};
pub use packed_buffer::{AddResult, PackedOverrideBuffer};
pub use style_index::{StyleClass, StyleOverrideIndex, STYLE_RECORD_SIZE};
pub use throttle::Throttle;
pub use transform_index::{TransformOverrideIndex, TRANSFORM_RECORD_SIZE};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
