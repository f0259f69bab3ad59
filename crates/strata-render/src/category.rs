//! Geometry categories and their per-instance record layouts.
//!
//! Every record starts with the owning object id as a little-endian `u32`,
//! followed by an RGBA8 color. The remaining fields are category specific and
//! opaque to the batcher.

use std::fmt;

use strata_core::ObjectId;

/// Primitive and mesh categories streamed in sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryCategory {
    Box,
    Circle,
    Cone,
    EccentricCone,
    EllipsoidSegment,
    GeneralCylinder,
    GeneralRing,
    Quad,
    TorusSegment,
    Trapezium,
    Nut,
    TriangleMesh,
    InstancedMesh,
    TexturedMesh,
}

const HEADER: usize = 8;
const VEC3: usize = 12;
const PLANE: usize = 16;
const MAT4: usize = 64;
const SCALAR: usize = 4;

impl GeometryCategory {
    pub const ALL: [GeometryCategory; 14] = [
        GeometryCategory::Box,
        GeometryCategory::Circle,
        GeometryCategory::Cone,
        GeometryCategory::EccentricCone,
        GeometryCategory::EllipsoidSegment,
        GeometryCategory::GeneralCylinder,
        GeometryCategory::GeneralRing,
        GeometryCategory::Quad,
        GeometryCategory::TorusSegment,
        GeometryCategory::Trapezium,
        GeometryCategory::Nut,
        GeometryCategory::TriangleMesh,
        GeometryCategory::InstancedMesh,
        GeometryCategory::TexturedMesh,
    ];

    /// Fixed record size, or `None` for mesh categories whose vertex layout is
    /// chosen by the decoder.
    pub fn instance_stride(self) -> Option<usize> {
        let stride = match self {
            // header, instance matrix
            GeometryCategory::Box | GeometryCategory::Quad | GeometryCategory::Nut => HEADER + MAT4,
            // header, instance matrix, normal
            GeometryCategory::Circle => HEADER + MAT4 + VEC3,
            // header, center a/b, radius a/b, angle, arc angle, local x axis
            GeometryCategory::Cone => HEADER + 2 * VEC3 + 4 * SCALAR + VEC3,
            // header, center a/b, radius a/b, normal
            GeometryCategory::EccentricCone => HEADER + 2 * VEC3 + 2 * SCALAR + VEC3,
            // header, center, normal, horizontal/vertical radius, height
            GeometryCategory::EllipsoidSegment => HEADER + 2 * VEC3 + 3 * SCALAR,
            // header, center a/b, radius, angle, cap planes a/b, arc angle, local x axis
            GeometryCategory::GeneralCylinder => {
                HEADER + 2 * VEC3 + 2 * SCALAR + 2 * PLANE + SCALAR + VEC3
            }
            // header, instance matrix, normal, thickness, angle, arc angle
            GeometryCategory::GeneralRing => HEADER + MAT4 + VEC3 + 3 * SCALAR,
            // header, instance matrix, size, radius, angle, arc angle
            GeometryCategory::TorusSegment => HEADER + MAT4 + 4 * SCALAR,
            // header, four vertices
            GeometryCategory::Trapezium => HEADER + 4 * VEC3,
            GeometryCategory::TriangleMesh
            | GeometryCategory::InstancedMesh
            | GeometryCategory::TexturedMesh => return None,
        };
        Some(stride)
    }

    /// Whether draw objects of this category are keyed per sector and use a
    /// per-sector material variant.
    pub fn is_textured(self) -> bool {
        self == GeometryCategory::TexturedMesh
    }
}

impl fmt::Display for GeometryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Reads the object id that prefixes a record.
///
/// Records shorter than four bytes map to object 0.
pub fn record_object_id(record: &[u8]) -> ObjectId {
    let mut id = [0u8; 4];
    if let Some(prefix) = record.get(..4) {
        id.copy_from_slice(prefix);
    }
    ObjectId::from_le_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_strides_hold_header_and_align() {
        for category in GeometryCategory::ALL {
            if let Some(stride) = category.instance_stride() {
                assert!(stride > HEADER, "{category}");
                assert_eq!(stride % 4, 0, "{category}");
            }
        }
        assert_eq!(GeometryCategory::Box.instance_stride(), Some(72));
        assert_eq!(GeometryCategory::TriangleMesh.instance_stride(), None);
    }

    #[test]
    fn test_record_object_id() {
        let mut record = vec![0u8; 72];
        record[..4].copy_from_slice(&77u32.to_le_bytes());
        assert_eq!(record_object_id(&record), 77);
        assert_eq!(record_object_id(&[1, 2]), 0);
    }
}
