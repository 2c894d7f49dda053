//! Wrapper configuration.
//!
//! The JSON file reader and the settings UI live outside the library; this
//! module only defines the configuration type they exchange (and therefore
//! derives serde both ways).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPreset {
    UltraLow,
    Low,
    Medium,
    High,
    Ultra,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Gles3,
    AngleVulkan,
    Zink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShaderCacheMode {
    Disabled,
    MemoryOnly,
    Disk,
    /// Disk cache plus eager compilation of the built-in preload set.
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VelocityConfig {
    pub quality: QualityPreset,
    pub backend: Backend,

    pub shader_cache: ShaderCacheMode,
    /// Directory for `shader_cache.bin`; `None` keeps the cache in memory.
    pub shader_cache_path: Option<PathBuf>,
    pub shader_cache_max_bytes: usize,
    pub shader_cache_max_entries: usize,

    pub dynamic_resolution: bool,
    pub min_resolution_scale: f32,
    pub max_resolution_scale: f32,
    pub target_fps: u32,

    pub draw_batching: bool,
    pub instancing: bool,
    pub max_batch_size: usize,

    pub texture_pool_mb: usize,
    pub max_texture_size: u32,

    pub buffer_pool_mb: usize,
    pub persistent_mapping: bool,

    pub gpu_specific_tweaks: bool,
    /// Reserved: accepted but deliberately unwired.
    pub force_compatibility_mode: bool,

    /// Hint for the host's tracing subscriber (the library itself always
    /// emits through `tracing`).
    pub debug_output: bool,
    pub profiling: bool,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,
            backend: Backend::Gles3,
            shader_cache: ShaderCacheMode::Disk,
            shader_cache_path: None,
            shader_cache_max_bytes: 64 * 1024 * 1024,
            shader_cache_max_entries: 256,
            dynamic_resolution: true,
            min_resolution_scale: 0.5,
            max_resolution_scale: 1.0,
            target_fps: 60,
            draw_batching: true,
            instancing: true,
            max_batch_size: 128,
            texture_pool_mb: 128,
            max_texture_size: 4096,
            buffer_pool_mb: 32,
            persistent_mapping: true,
            gpu_specific_tweaks: true,
            force_compatibility_mode: false,
            debug_output: false,
            profiling: true,
        }
    }
}

impl VelocityConfig {
    /// Configuration with the tunables a preset implies; `Custom` returns
    /// the defaults untouched.
    pub fn preset(quality: QualityPreset) -> Self {
        let mut cfg = Self {
            quality,
            ..Self::default()
        };
        match quality {
            QualityPreset::UltraLow => {
                cfg.min_resolution_scale = 0.3;
                cfg.max_resolution_scale = 0.5;
                cfg.target_fps = 30;
                cfg.max_batch_size = 16;
                cfg.texture_pool_mb = 32;
                cfg.instancing = false;
            }
            QualityPreset::Low => {
                cfg.min_resolution_scale = 0.4;
                cfg.max_resolution_scale = 0.7;
                cfg.target_fps = 30;
                cfg.max_batch_size = 32;
                cfg.texture_pool_mb = 64;
                cfg.instancing = false;
            }
            QualityPreset::Medium => {
                cfg.min_resolution_scale = 0.5;
                cfg.max_resolution_scale = 0.85;
                cfg.target_fps = 45;
                cfg.max_batch_size = 64;
                cfg.texture_pool_mb = 128;
            }
            QualityPreset::High => {
                cfg.min_resolution_scale = 0.6;
                cfg.max_resolution_scale = 1.0;
                cfg.target_fps = 60;
                cfg.max_batch_size = 128;
                cfg.texture_pool_mb = 192;
            }
            QualityPreset::Ultra => {
                cfg.min_resolution_scale = 0.75;
                cfg.max_resolution_scale = 1.0;
                cfg.target_fps = 60;
                cfg.max_batch_size = 256;
                cfg.texture_pool_mb = 256;
            }
            QualityPreset::Custom => {}
        }
        cfg
    }

    pub fn buffer_pool_bytes(&self) -> usize {
        self.buffer_pool_mb * 1024 * 1024
    }

    /// Queue capacity handed to the draw batcher.
    pub fn batch_queue_capacity(&self) -> usize {
        self.max_batch_size.max(1) * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_medium_shape() {
        let cfg = VelocityConfig::default();
        assert_eq!(cfg.quality, QualityPreset::Medium);
        assert_eq!(cfg.shader_cache, ShaderCacheMode::Disk);
        assert!(cfg.dynamic_resolution);
        assert_eq!(cfg.batch_queue_capacity(), 1024);
    }

    #[test]
    fn ultra_low_trades_quality_for_fps() {
        let cfg = VelocityConfig::preset(QualityPreset::UltraLow);
        assert!(cfg.max_resolution_scale <= 0.5);
        assert!(!cfg.instancing);
        assert_eq!(cfg.target_fps, 30);
    }
}
