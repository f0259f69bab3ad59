//! Rendering configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Anti-aliasing applied by the final blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AntiAliasingMode {
    /// Plain resample.
    NoAa,
    /// Fast approximate anti-aliasing.
    #[default]
    Fxaa,
}

/// Sample count presets for ambient occlusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SsaoSampleQuality {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SsaoSampleQuality {
    pub fn sample_count(self) -> u32 {
        match self {
            SsaoSampleQuality::None => 0,
            SsaoSampleQuality::Low => 16,
            SsaoSampleQuality::Medium => 32,
            SsaoSampleQuality::High => 64,
            SsaoSampleQuality::VeryHigh => 128,
        }
    }
}

/// Screen space ambient occlusion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoParameters {
    /// Samples per pixel; 0 disables the pass.
    pub sample_count: u32,
    /// Sample radius in world units.
    pub sample_radius: f32,
    /// Bias to prevent self-occlusion artifacts.
    pub depth_check_bias: f32,
}

impl SsaoParameters {
    pub fn with_quality(quality: SsaoSampleQuality) -> Self {
        Self {
            sample_count: quality.sample_count(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sample_count > 0
    }
}

impl Default for SsaoParameters {
    fn default() -> Self {
        Self {
            sample_count: SsaoSampleQuality::Medium.sample_count(),
            sample_radius: 1.0,
            depth_check_bias: 0.0125,
        }
    }
}

/// Outline extraction from the depth and object id buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeDetectionParameters {
    pub enabled: bool,
}

impl Default for EdgeDetectionParameters {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Eye dome lighting for point clouds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeDomeLighting {
    pub enabled: bool,
    pub strength: f32,
    pub radius: f32,
}

impl Default for EyeDomeLighting {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.5,
            radius: 2.2,
        }
    }
}

/// Point cloud post effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PointCloudEffectsParameters {
    /// Blend overlapping points; adds a depth-only pre-pass.
    pub point_blending: bool,
    pub edl: EyeDomeLighting,
}

/// Top-level render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub anti_aliasing: AntiAliasingMode,
    pub ssao: SsaoParameters,
    pub edge_detection: EdgeDetectionParameters,
    pub point_cloud: PointCloudEffectsParameters,
    /// Minimum time between style lookup rebuilds, in milliseconds.
    pub style_rebuild_interval_ms: u64,
    /// Log each pass with its CPU time.
    pub debug_render_timings: bool,
    /// Outline thickness in texels.
    pub outline_texel_size: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            anti_aliasing: AntiAliasingMode::default(),
            ssao: SsaoParameters::default(),
            edge_detection: EdgeDetectionParameters::default(),
            point_cloud: PointCloudEffectsParameters::default(),
            style_rebuild_interval_ms: 16,
            debug_render_timings: false,
            outline_texel_size: 2,
        }
    }
}

impl RenderOptions {
    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn style_rebuild_interval(&self) -> Duration {
        Duration::from_millis(self.style_rebuild_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();
        assert_eq!(options.anti_aliasing, AntiAliasingMode::Fxaa);
        assert_eq!(options.ssao.sample_count, 32);
        assert_eq!(options.style_rebuild_interval(), Duration::from_millis(16));
        assert!(options.edge_detection.enabled);
        assert!(!options.point_cloud.point_blending);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options =
            RenderOptions::from_json_str(r#"{ "ssao": { "sample_count": 0 }, "anti_aliasing": "NoAa" }"#)
                .unwrap();
        assert!(!options.ssao.is_enabled());
        assert_eq!(options.ssao.sample_radius, 1.0);
        assert_eq!(options.anti_aliasing, AntiAliasingMode::NoAa);
        assert_eq!(options.outline_texel_size, 2);
    }

    #[test]
    fn test_json_round_trip() {
        let mut options = RenderOptions::default();
        options.ssao = SsaoParameters::with_quality(SsaoSampleQuality::High);
        options.point_cloud.point_blending = true;
        let json = options.to_json_string().unwrap();
        assert_eq!(RenderOptions::from_json_str(&json).unwrap(), options);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(RenderOptions::from_json_str("{ not json").is_err());
    }
}
