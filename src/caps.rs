//! GPU identity database.
//!
//! Classifies the device once at context creation and publishes tunable
//! defaults for the other subsystems. After construction every decision is a
//! pure function of the identity record; no GL calls are issued from here.

use bitflags::bitflags;
use tracing::info;

use crate::config::{QualityPreset, ShaderCacheMode, VelocityConfig};
use crate::gles::{consts, GlesContext};
use crate::hash::fnv1a_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Unknown,
    Adreno,
    Mali,
    PowerVr,
    Xclipse,
    Nvidia,
    Intel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdrenoGeneration {
    Unknown,
    Gen5xx,
    Gen6xx,
    Gen7xx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaliGeneration {
    Unknown,
    Midgard,
    Bifrost,
    Valhall,
    FifthGen,
}

/// Per-vendor architecture generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuGeneration {
    Adreno(AdrenoGeneration),
    Mali(MaliGeneration),
    Other,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GpuFeatures: u32 {
        const COMPUTE = 1 << 0;
        const GEOMETRY = 1 << 1;
        const TESSELLATION = 1 << 2;
        const ASTC = 1 << 3;
        const ANISOTROPIC = 1 << 4;
        const PROGRAM_BINARY = 1 << 5;
        const PERSISTENT_MAPPED_BUFFER = 1 << 6;
        const MULTI_DRAW = 1 << 7;
        const FRAMEBUFFER_FETCH = 1 << 8;
    }
}

/// Immutable device identity, fixed at context creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuCaps {
    pub vendor: GpuVendor,
    pub generation: GpuGeneration,
    pub model: u32,
    /// 1 (weakest) ..= 5 (flagship).
    pub tier: u8,

    pub vendor_string: String,
    pub renderer_string: String,
    pub version_string: String,

    pub gles_major: u32,
    pub gles_minor: u32,
    /// Masqueraded desktop GL version derived from the ES level.
    pub gl_major: u32,
    pub gl_minor: u32,

    pub features: GpuFeatures,
    pub max_texture_size: i32,
    pub max_texture_units: i32,
    pub max_vertex_attribs: i32,
    pub max_uniform_buffer_bindings: i32,
    pub max_anisotropy: f32,

    pub vendor_hash: u32,
    pub driver_hash: u32,
}

fn detect_vendor(vendor: &str, renderer: &str) -> GpuVendor {
    let vendor = vendor.to_lowercase();
    let renderer = renderer.to_lowercase();

    // Substring match, first hit wins.
    if vendor.contains("qualcomm") || renderer.contains("adreno") {
        GpuVendor::Adreno
    } else if vendor.contains("arm") || renderer.contains("mali") {
        GpuVendor::Mali
    } else if vendor.contains("imagination") || renderer.contains("powervr") {
        GpuVendor::PowerVr
    } else if renderer.contains("xclipse") || renderer.contains("samsung") {
        GpuVendor::Xclipse
    } else if vendor.contains("nvidia") {
        GpuVendor::Nvidia
    } else if vendor.contains("intel") {
        GpuVendor::Intel
    } else {
        GpuVendor::Unknown
    }
}

/// First decimal digit sequence in the renderer string.
fn extract_model(renderer: &str) -> u32 {
    let digits: String = renderer
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn adreno_generation(model: u32) -> AdrenoGeneration {
    match model {
        700.. => AdrenoGeneration::Gen7xx,
        600..=699 => AdrenoGeneration::Gen6xx,
        500..=599 => AdrenoGeneration::Gen5xx,
        _ => AdrenoGeneration::Unknown,
    }
}

fn mali_generation(renderer: &str) -> MaliGeneration {
    if renderer.contains("Immortalis") || (renderer.contains("G7") && renderer.contains("20")) {
        MaliGeneration::FifthGen
    } else if ["G77", "G78", "G710"].iter().any(|m| renderer.contains(m)) {
        MaliGeneration::Valhall
    } else if ["G71", "G72", "G76"].iter().any(|m| renderer.contains(m)) {
        MaliGeneration::Bifrost
    } else if renderer.contains("Mali-T") {
        MaliGeneration::Midgard
    } else {
        MaliGeneration::Unknown
    }
}

fn performance_tier(vendor: GpuVendor, model: u32) -> u8 {
    match vendor {
        GpuVendor::Adreno => match model {
            730.. => 5,
            660.. => 4,
            650.. => 3,
            600.. => 2,
            _ => 1,
        },
        GpuVendor::Mali => {
            // Immortalis-G720 and up, then Valhall, then Bifrost.
            if model >= 720 {
                5
            } else if model >= 78 {
                4
            } else if model >= 76 {
                3
            } else {
                2
            }
        }
        _ => 2,
    }
}

fn has_extension(extensions: &str, name: &str) -> bool {
    extensions.split_whitespace().any(|ext| ext == name)
}

impl GpuCaps {
    /// Query the device once and classify it.
    pub fn detect(gl: &mut dyn GlesContext) -> Self {
        let vendor_string = gl.get_string(consts::VENDOR);
        let renderer_string = gl.get_string(consts::RENDERER);
        let version_string = gl.get_string(consts::VERSION);
        let extensions = gl.get_string(consts::EXTENSIONS);

        let vendor = detect_vendor(&vendor_string, &renderer_string);
        let model = extract_model(&renderer_string);
        let generation = match vendor {
            GpuVendor::Adreno => GpuGeneration::Adreno(adreno_generation(model)),
            GpuVendor::Mali => GpuGeneration::Mali(mali_generation(&renderer_string)),
            _ => GpuGeneration::Other,
        };
        let tier = performance_tier(vendor, model);

        let (gles_major, gles_minor) = parse_gles_version(&version_string);
        let (gl_major, gl_minor) = masquerade_version(gles_major, gles_minor);

        let mut features = GpuFeatures::empty();
        if (gles_major, gles_minor) >= (3, 1) {
            features |= GpuFeatures::COMPUTE;
        }
        if (gles_major, gles_minor) >= (3, 2) || has_extension(&extensions, "GL_EXT_geometry_shader")
        {
            features |= GpuFeatures::GEOMETRY;
        }
        if has_extension(&extensions, "GL_EXT_tessellation_shader") {
            features |= GpuFeatures::TESSELLATION;
        }
        if has_extension(&extensions, "GL_KHR_texture_compression_astc_ldr") {
            features |= GpuFeatures::ASTC;
        }
        if has_extension(&extensions, "GL_EXT_texture_filter_anisotropic") {
            features |= GpuFeatures::ANISOTROPIC;
        }
        if has_extension(&extensions, "GL_EXT_buffer_storage") {
            features |= GpuFeatures::PERSISTENT_MAPPED_BUFFER;
        }
        if has_extension(&extensions, "GL_EXT_multi_draw_arrays") {
            features |= GpuFeatures::MULTI_DRAW;
        }
        if has_extension(&extensions, "GL_EXT_shader_framebuffer_fetch") {
            features |= GpuFeatures::FRAMEBUFFER_FETCH;
        }
        if gl.get_integer(consts::NUM_PROGRAM_BINARY_FORMATS) > 0 {
            features |= GpuFeatures::PROGRAM_BINARY;
        }

        let max_anisotropy = if features.contains(GpuFeatures::ANISOTROPIC) {
            gl.get_float(consts::MAX_TEXTURE_MAX_ANISOTROPY_EXT)
        } else {
            1.0
        };

        let caps = Self {
            vendor,
            generation,
            model,
            tier,
            gles_major,
            gles_minor,
            gl_major,
            gl_minor,
            features,
            max_texture_size: gl.get_integer(consts::MAX_TEXTURE_SIZE),
            max_texture_units: gl.get_integer(consts::MAX_COMBINED_TEXTURE_IMAGE_UNITS),
            max_vertex_attribs: gl.get_integer(consts::MAX_VERTEX_ATTRIBS),
            max_uniform_buffer_bindings: gl.get_integer(consts::MAX_UNIFORM_BUFFER_BINDINGS),
            max_anisotropy,
            vendor_hash: fnv1a_str(&renderer_string) as u32,
            driver_hash: fnv1a_str(&version_string) as u32,
            vendor_string,
            renderer_string,
            version_string,
        };

        info!(
            renderer = %caps.renderer_string,
            tier = caps.tier,
            features = ?caps.features,
            "GPU detected: GLES {}.{}, reporting GL {}.{}",
            caps.gles_major,
            caps.gles_minor,
            caps.gl_major,
            caps.gl_minor,
        );

        caps
    }

    /// 64-bit key binding cached shader binaries to this GPU + driver.
    pub fn cache_key(&self) -> u64 {
        (u64::from(self.vendor_hash) << 32) | u64::from(self.driver_hash)
    }

    /// Tunable defaults for this device tier, starting from the stock
    /// configuration.
    pub fn recommended_config(&self) -> VelocityConfig {
        let mut cfg = VelocityConfig::default();
        match self.tier {
            5 => {
                cfg.quality = QualityPreset::High;
                cfg.min_resolution_scale = 0.75;
                cfg.max_resolution_scale = 1.0;
                cfg.target_fps = 60;
                cfg.max_batch_size = 256;
                cfg.texture_pool_mb = 256;
                cfg.instancing = true;
            }
            4 => {
                cfg.quality = QualityPreset::Medium;
                cfg.min_resolution_scale = 0.6;
                cfg.max_resolution_scale = 1.0;
                cfg.target_fps = 60;
                cfg.max_batch_size = 128;
                cfg.texture_pool_mb = 192;
                cfg.instancing = true;
            }
            3 => {
                cfg.quality = QualityPreset::Medium;
                cfg.min_resolution_scale = 0.5;
                cfg.max_resolution_scale = 0.85;
                cfg.target_fps = 45;
                cfg.max_batch_size = 64;
                cfg.texture_pool_mb = 128;
                cfg.instancing = true;
            }
            2 => {
                cfg.quality = QualityPreset::Low;
                cfg.min_resolution_scale = 0.4;
                cfg.max_resolution_scale = 0.7;
                cfg.target_fps = 30;
                cfg.max_batch_size = 32;
                cfg.texture_pool_mb = 64;
                cfg.instancing = false;
            }
            _ => {
                cfg.quality = QualityPreset::UltraLow;
                cfg.min_resolution_scale = 0.3;
                cfg.max_resolution_scale = 0.5;
                cfg.target_fps = 30;
                cfg.max_batch_size = 16;
                cfg.texture_pool_mb = 32;
                cfg.instancing = false;
            }
        }
        cfg.shader_cache = ShaderCacheMode::Disk;
        cfg.gpu_specific_tweaks = true;
        cfg
    }
}

fn parse_gles_version(version: &str) -> (u32, u32) {
    // "OpenGL ES 3.2 V@0676.32" and friends.
    let rest = version.strip_prefix("OpenGL ES ").unwrap_or(version);
    let mut parts = rest.split(|c: char| !c.is_ascii_digit());
    let major = parts.next().and_then(|p| p.parse().ok());
    let minor = parts.next().and_then(|p| p.parse().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => (major, minor),
        _ => (3, 0),
    }
}

/// Desktop GL version reported to the host for a given ES level.
pub fn masquerade_version(gles_major: u32, gles_minor: u32) -> (u32, u32) {
    if (gles_major, gles_minor) >= (3, 2) {
        (4, 6)
    } else if (gles_major, gles_minor) >= (3, 1) {
        (4, 3)
    } else {
        (3, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    #[test]
    fn detects_adreno_740_as_tier_five() {
        let mut gl = SimulatedGles::new();
        let caps = GpuCaps::detect(&mut gl);
        assert_eq!(caps.vendor, GpuVendor::Adreno);
        assert_eq!(caps.model, 740);
        assert_eq!(caps.generation, GpuGeneration::Adreno(AdrenoGeneration::Gen7xx));
        assert_eq!(caps.tier, 5);
        assert_eq!((caps.gl_major, caps.gl_minor), (4, 6));
        assert!(caps.features.contains(GpuFeatures::PERSISTENT_MAPPED_BUFFER));
        assert!(caps.features.contains(GpuFeatures::MULTI_DRAW));
    }

    #[test]
    fn vendor_match_order_prefers_adreno_over_samsung_renderer() {
        assert_eq!(detect_vendor("Qualcomm", "Adreno (TM) 650"), GpuVendor::Adreno);
        assert_eq!(
            detect_vendor("Samsung Electronics", "Samsung Xclipse 940"),
            GpuVendor::Xclipse
        );
        assert_eq!(detect_vendor("ARM", "Mali-G710"), GpuVendor::Mali);
        assert_eq!(detect_vendor("weird", "unheard-of"), GpuVendor::Unknown);
    }

    #[test]
    fn mali_generations_from_renderer_names() {
        assert_eq!(mali_generation("Mali-G710"), MaliGeneration::Valhall);
        assert_eq!(mali_generation("Mali-G76"), MaliGeneration::Bifrost);
        assert_eq!(mali_generation("Mali-T880"), MaliGeneration::Midgard);
        assert_eq!(mali_generation("Immortalis-G720"), MaliGeneration::FifthGen);
    }

    #[test]
    fn tier_table_boundaries() {
        assert_eq!(performance_tier(GpuVendor::Adreno, 730), 5);
        assert_eq!(performance_tier(GpuVendor::Adreno, 660), 4);
        assert_eq!(performance_tier(GpuVendor::Adreno, 650), 3);
        assert_eq!(performance_tier(GpuVendor::Adreno, 610), 2);
        assert_eq!(performance_tier(GpuVendor::Adreno, 540), 1);
        assert_eq!(performance_tier(GpuVendor::Mali, 710), 4);
        assert_eq!(performance_tier(GpuVendor::Unknown, 0), 2);
    }

    #[test]
    fn masquerade_rule_is_one_rule() {
        assert_eq!(masquerade_version(3, 2), (4, 6));
        assert_eq!(masquerade_version(3, 1), (4, 3));
        assert_eq!(masquerade_version(3, 0), (3, 3));
        assert_eq!(masquerade_version(2, 0), (3, 3));
    }

    #[test]
    fn older_device_loses_feature_bits() {
        let mut gl = SimulatedGles::new()
            .with_identity("ARM", "Mali-G52", "OpenGL ES 3.0")
            .with_extensions("GL_KHR_debug");
        let caps = GpuCaps::detect(&mut gl);
        assert_eq!(caps.tier, 2);
        assert_eq!((caps.gl_major, caps.gl_minor), (3, 3));
        assert!(!caps.features.contains(GpuFeatures::COMPUTE));
        assert!(!caps.features.contains(GpuFeatures::PERSISTENT_MAPPED_BUFFER));
    }

    #[test]
    fn cache_key_changes_with_driver() {
        let mut a = SimulatedGles::new();
        let mut b = SimulatedGles::new().with_identity(
            "Qualcomm",
            "Adreno (TM) 740",
            "OpenGL ES 3.2 V@0700.1",
        );
        assert_ne!(
            GpuCaps::detect(&mut a).cache_key(),
            GpuCaps::detect(&mut b).cache_key()
        );
    }
}
