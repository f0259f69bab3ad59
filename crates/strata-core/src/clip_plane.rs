//! Clip planes that cut away geometry.

use glam::{Vec3, Vec4};

/// Maximum number of clip planes a material can carry.
pub const MAX_CLIP_PLANES: usize = 8;

/// A plane through `origin` with `normal` pointing toward kept geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    origin: Vec3,
    normal: Vec3,
}

impl ClipPlane {
    /// Creates a clip plane; the normal is normalized.
    pub fn new(origin: Vec3, normal: Vec3) -> Self {
        Self {
            origin,
            normal: normal.normalize(),
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Returns the signed distance from a point to the plane.
    ///
    /// Positive values are on the normal side (kept), negative on the opposite (discarded).
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.origin).dot(self.normal)
    }

    /// Returns whether a point is on the kept side of the plane.
    pub fn is_kept(&self, point: Vec3) -> bool {
        self.signed_distance(point) >= 0.0
    }

    /// Plane equation `(n, -n·o)` as consumed by shaders.
    pub fn equation(&self) -> Vec4 {
        self.normal.extend(-self.normal.dot(self.origin))
    }
}

/// GPU-compatible clip plane block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[allow(clippy::pub_underscore_fields)]
pub struct ClipPlaneUniforms {
    /// Plane equations; only the first `count` are meaningful.
    pub planes: [[f32; 4]; MAX_CLIP_PLANES],
    pub count: u32,
    pub _padding: [u32; 3],
}

impl ClipPlaneUniforms {
    /// Packs up to [`MAX_CLIP_PLANES`] planes; extra planes are ignored.
    pub fn from_planes(planes: &[ClipPlane]) -> Self {
        let mut uniforms = Self::default();
        for (slot, plane) in uniforms.planes.iter_mut().zip(planes) {
            *slot = plane.equation().to_array();
        }
        uniforms.count = planes.len().min(MAX_CLIP_PLANES) as u32;
        uniforms
    }
}

impl Default for ClipPlaneUniforms {
    fn default() -> Self {
        Self {
            planes: [[0.0; 4]; MAX_CLIP_PLANES],
            count: 0,
            _padding: [0; 3],
        }
    }
}

/// Concatenates global and model planes, truncating to [`MAX_CLIP_PLANES`].
pub fn merge_clip_planes(global: &[ClipPlane], local: &[ClipPlane]) -> Vec<ClipPlane> {
    let total = global.len() + local.len();
    if total > MAX_CLIP_PLANES {
        log::warn!("{total} clip planes requested, only the first {MAX_CLIP_PLANES} are used");
    }
    global
        .iter()
        .chain(local)
        .take(MAX_CLIP_PLANES)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_distance() {
        let plane = ClipPlane::new(Vec3::ZERO, Vec3::Y);
        assert!(plane.signed_distance(Vec3::new(0.0, 1.0, 0.0)) > 0.0);
        assert!(plane.signed_distance(Vec3::new(0.0, -1.0, 0.0)) < 0.0);
        assert!(!plane.is_kept(Vec3::new(0.0, -1.0, 0.0)));
    }

    #[test]
    fn test_equation_matches_signed_distance() {
        let plane = ClipPlane::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 3.0, 0.0));
        let point = Vec3::new(5.0, 4.0, 1.0);
        let eq = plane.equation();
        assert!((eq.truncate().dot(point) + eq.w - plane.signed_distance(point)).abs() < 1e-6);
    }

    #[test]
    fn test_merge_truncates() {
        let plane = ClipPlane::new(Vec3::ZERO, Vec3::X);
        let global = vec![plane; 5];
        let local = vec![ClipPlane::new(Vec3::ZERO, Vec3::Z); 5];
        let merged = merge_clip_planes(&global, &local);
        assert_eq!(merged.len(), MAX_CLIP_PLANES);
        assert_eq!(merged[0], plane);
        assert_eq!(merged[7].normal(), Vec3::Z);
    }

    #[test]
    fn test_uniforms_count() {
        let planes = [ClipPlane::new(Vec3::ZERO, Vec3::Y); 2];
        let uniforms = ClipPlaneUniforms::from_planes(&planes);
        assert_eq!(uniforms.count, 2);
        assert_eq!(uniforms.planes[0], [0.0, 1.0, 0.0, 0.0]);
    }
}
