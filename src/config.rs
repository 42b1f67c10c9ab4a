//! Culling and recording configuration (Section 6).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightCullingMode {
    None,
    Tiled,
    TiledDepthRange,
    Clustered,
}

impl Default for LightCullingMode {
    fn default() -> Self {
        LightCullingMode::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderPathPreset {
    ShadedLit,
    Wireframe,
    DepthOnly,
    OcclusionDebug,
}

impl RenderPathPreset {
    /// Cycle to the next preset, matching the CLI's "cycling render path preset" toggle.
    pub fn next(self) -> Self {
        match self {
            RenderPathPreset::ShadedLit => RenderPathPreset::Wireframe,
            RenderPathPreset::Wireframe => RenderPathPreset::DepthOnly,
            RenderPathPreset::DepthOnly => RenderPathPreset::OcclusionDebug,
            RenderPathPreset::OcclusionDebug => RenderPathPreset::ShadedLit,
        }
    }
}

impl Default for RenderPathPreset {
    fn default() -> Self {
        RenderPathPreset::ShadedLit
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub hide_confirm_frames: u8,
    pub show_confirm_frames: u8,
    pub min_visible_samples: u32,
    pub occlusion_warmup_after_camera_move: u32,
    pub max_recording_workers: usize,
    pub frame_ring: usize,
    pub light_culling_mode: LightCullingMode,
    pub tile_size: u32,
    pub cluster_depth_slices: u32,

    pub shadows_enabled: bool,
    pub occlusion_enabled: bool,
    pub has_depth_attachment: bool,
    pub aabb_overlay: bool,
    pub mt_recording: bool,
    pub render_path: RenderPathPreset,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            hide_confirm_frames: 3,
            show_confirm_frames: 2,
            min_visible_samples: 1,
            occlusion_warmup_after_camera_move: 2,
            max_recording_workers: 8,
            frame_ring: 1,
            light_culling_mode: LightCullingMode::None,
            tile_size: 16,
            cluster_depth_slices: 16,
            shadows_enabled: true,
            occlusion_enabled: true,
            has_depth_attachment: true,
            aabb_overlay: false,
            mt_recording: true,
            render_path: RenderPathPreset::ShadedLit,
        }
    }
}

impl CullingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tile_size == 0 {
            return Err(CoreError::ConfigurationError(
                "tile_size must be > 0".into(),
            ));
        }
        if self.cluster_depth_slices == 0 {
            return Err(CoreError::ConfigurationError(
                "cluster_depth_slices must be > 0".into(),
            ));
        }
        if self.max_recording_workers == 0 {
            return Err(CoreError::ConfigurationError(
                "max_recording_workers must be > 0".into(),
            ));
        }
        if self.frame_ring == 0 {
            return Err(CoreError::ConfigurationError(
                "frame_ring must be > 0".into(),
            ));
        }
        if self.occlusion_enabled && !self.has_depth_attachment {
            return Err(CoreError::ConfigurationError(
                "occlusion_enabled requires has_depth_attachment".into(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        toml::from_str(s).map_err(|e| CoreError::ConfigurationError(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::ConfigurationError(e.to_string()))
    }

    /// `N = clamp(hardware - 1, 1, max_recording_workers)` (Section 4.J).
    pub fn worker_count(&self, hardware_threads: usize) -> usize {
        hardware_threads
            .saturating_sub(1)
            .max(1)
            .min(self.max_recording_workers.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CullingConfig::default();
        assert_eq!(cfg.hide_confirm_frames, 3);
        assert_eq!(cfg.show_confirm_frames, 2);
        assert_eq!(cfg.min_visible_samples, 1);
        assert_eq!(cfg.tile_size, 16);
        assert_eq!(cfg.cluster_depth_slices, 16);
        assert_eq!(cfg.frame_ring, 1);
        assert_eq!(cfg.light_culling_mode, LightCullingMode::None);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_tile_size() {
        let mut cfg = CullingConfig::default();
        cfg.tile_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_occlusion_without_depth_attachment() {
        let mut cfg = CullingConfig::default();
        cfg.has_depth_attachment = false;
        assert!(cfg.validate().is_err());
        cfg.occlusion_enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_round_trips() {
        let cfg = CullingConfig::default();
        let s = cfg.to_toml_string().unwrap();
        let back = CullingConfig::from_toml_str(&s).unwrap();
        assert_eq!(back.tile_size, cfg.tile_size);
        assert_eq!(back.hide_confirm_frames, cfg.hide_confirm_frames);
    }

    #[test]
    fn worker_count_clamps() {
        let mut cfg = CullingConfig::default();
        cfg.max_recording_workers = 8;
        assert_eq!(cfg.worker_count(1), 1);
        assert_eq!(cfg.worker_count(5), 4);
        assert_eq!(cfg.worker_count(100), 8);
    }

    #[test]
    fn render_path_cycles() {
        let p = RenderPathPreset::ShadedLit;
        let p = p.next();
        assert_eq!(p, RenderPathPreset::Wireframe);
        let p = p.next().next().next();
        assert_eq!(p, RenderPathPreset::ShadedLit);
    }
}
