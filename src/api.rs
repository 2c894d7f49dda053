//! Public library surface.
//!
//! The subsystems all take an explicit [`VelocityContext`]; this module
//! keeps the one "current context" slot behind a mutex so the nullary
//! public API (and the C ABI in [`crate::dispatch`]) can stay shaped like
//! the original loader contract. Errors never escape: every operation has
//! a neutral return and reports through the logging sink.

use std::os::raw::c_void;
use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::{error, info, warn};

use crate::caps::GpuCaps;
use crate::config::VelocityConfig;
use crate::context::VelocityContext;
use crate::error::{Result, VglError};
use crate::gles::GlesContext;
use crate::stats::VelocityStats;

/// Window-system integration point. The EGL-like layer lives with the
/// host; the library only asks it to produce a current GLES device for a
/// native window.
pub trait Platform: Send {
    /// Create a context current on the calling thread and return the
    /// device plus the drawable size in pixels.
    fn create_device(
        &mut self,
        native_window: *mut c_void,
        display: *mut c_void,
        config: &VelocityConfig,
    ) -> Result<(Box<dyn GlesContext>, (i32, i32))>;
}

#[derive(Default)]
struct Runtime {
    initialized: bool,
    config: VelocityConfig,
    context: Option<VelocityContext>,
    platform: Option<Box<dyn Platform>>,
}

fn runtime() -> MutexGuard<'static, Runtime> {
    static RUNTIME: OnceLock<Mutex<Runtime>> = OnceLock::new();
    let lock = RUNTIME.get_or_init(|| Mutex::new(Runtime::default()));
    match lock.lock() {
        Ok(guard) => guard,
        // A panicked holder leaves plain data; carry on with it.
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn with_context<T>(neutral: T, f: impl FnOnce(&mut VelocityContext) -> T) -> T {
    let mut rt = runtime();
    if !rt.initialized {
        error!("{}", VglError::NotInitialized);
        return neutral;
    }
    match rt.context.as_mut() {
        Some(context) => f(context),
        None => {
            error!("{}", VglError::ContextMissing);
            neutral
        }
    }
}

// ---- init surface ----

/// Initialise the wrapper. Idempotent; a second call keeps the first
/// configuration.
pub fn init(config: VelocityConfig) -> bool {
    let mut rt = runtime();
    if rt.initialized {
        warn!("already initialized");
        return true;
    }
    info!(
        quality = ?config.quality,
        shader_cache = ?config.shader_cache,
        dynamic_resolution = config.dynamic_resolution,
        draw_batching = config.draw_batching,
        "VelocityGL initializing"
    );
    rt.config = config;
    rt.initialized = true;
    true
}

pub fn init_default() -> bool {
    init(VelocityConfig::default())
}

/// Tear everything down. Safe to call repeatedly and after partial
/// failures; leaves the library in the clean "not initialized" state.
pub fn shutdown() {
    let mut rt = runtime();
    if let Some(mut context) = rt.context.take() {
        context.destroy();
    }
    if rt.initialized {
        info!("VelocityGL shut down");
    }
    rt.initialized = false;
    rt.config = VelocityConfig::default();
}

/// Replace the runtime configuration. With GPU tweaks enabled and a live
/// context, the identity database's recommended tunables win.
pub fn update_config(config: VelocityConfig) -> bool {
    let mut rt = runtime();
    if !rt.initialized {
        error!("{}", VglError::NotInitialized);
        return false;
    }
    let mut config = config;
    if config.gpu_specific_tweaks {
        if let Some(context) = rt.context.as_ref() {
            let recommended = context.caps.recommended_config();
            config.quality = recommended.quality;
            config.min_resolution_scale = recommended.min_resolution_scale;
            config.max_resolution_scale = recommended.max_resolution_scale;
            config.target_fps = recommended.target_fps;
            config.max_batch_size = recommended.max_batch_size;
            config.texture_pool_mb = recommended.texture_pool_mb;
            config.instancing = recommended.instancing;
        }
    }
    rt.config = config.clone();
    if let Some(context) = rt.context.as_mut() {
        context.update_config(config);
    }
    true
}

pub fn get_config() -> VelocityConfig {
    let rt = runtime();
    if rt.initialized {
        rt.config.clone()
    } else {
        VelocityConfig::default()
    }
}

/// Register the window-system shim used by [`create_context`]. Survives
/// `shutdown` so relaunches keep working.
pub fn set_platform(platform: Box<dyn Platform>) {
    runtime().platform = Some(platform);
}

// ---- context surface ----

/// Create the rendering context for a native window through the
/// registered platform shim.
pub fn create_context(native_window: *mut c_void, display: *mut c_void) -> bool {
    let mut rt = runtime();
    if !rt.initialized {
        error!("{}", VglError::NotInitialized);
        return false;
    }
    if rt.context.is_some() {
        warn!("context already created");
        return true;
    }
    let config = rt.config.clone();
    let Some(platform) = rt.platform.as_mut() else {
        error!("no platform registered; cannot create a context from a native window");
        return false;
    };
    let (device, (width, height)) = match platform.create_device(native_window, display, &config) {
        Ok(created) => created,
        Err(err) => {
            error!(%err, "platform context creation failed");
            return false;
        }
    };
    install_context(&mut rt, device, config, width, height)
}

/// Create the rendering context over a device the host already owns (the
/// Rust-facing path; also what the test harness uses).
pub fn create_context_with_device(device: Box<dyn GlesContext>, width: i32, height: i32) -> bool {
    let mut rt = runtime();
    if !rt.initialized {
        error!("{}", VglError::NotInitialized);
        return false;
    }
    if rt.context.is_some() {
        warn!("context already created");
        return true;
    }
    let config = rt.config.clone();
    install_context(&mut rt, device, config, width, height)
}

fn install_context(
    rt: &mut Runtime,
    device: Box<dyn GlesContext>,
    config: VelocityConfig,
    width: i32,
    height: i32,
) -> bool {
    match VelocityContext::new(device, config, width, height) {
        Ok(context) => {
            rt.context = Some(context);
            true
        }
        Err(err) => {
            error!(%err, "context creation failed");
            false
        }
    }
}

pub fn destroy_context() {
    let mut rt = runtime();
    if let Some(mut context) = rt.context.take() {
        context.destroy();
    }
}

pub fn make_current() -> bool {
    with_context(false, |cx| cx.make_current())
}

pub fn swap_buffers() {
    with_context((), |cx| cx.swap_buffers());
}

pub fn begin_frame() {
    with_context((), |cx| cx.begin_frame());
}

pub fn end_frame() {
    with_context((), |cx| cx.end_frame());
}

// ---- queries ----

pub fn get_stats() -> VelocityStats {
    with_context(VelocityStats::default(), |cx| cx.stats())
}

pub fn reset_stats() {
    with_context((), |cx| cx.reset_stats());
}

pub fn get_gpu_caps() -> Option<GpuCaps> {
    with_context(None, |cx| Some(cx.caps.clone()))
}

pub fn get_resolution_scale() -> f32 {
    with_context(1.0, |cx| cx.resolution_scale())
}

pub fn set_resolution_scale(scale: f32) {
    with_context((), |cx| cx.set_resolution_scale(scale));
}

pub fn set_dynamic_resolution(enabled: bool) {
    with_context((), |cx| cx.set_dynamic_resolution(enabled));
}

pub fn trim_memory(level: u32) {
    with_context((), |cx| cx.trim_memory(level));
}

pub fn get_memory_usage() -> usize {
    with_context(0, |cx| cx.memory_usage())
}

pub fn preload_shaders() -> usize {
    with_context(0, |cx| cx.preload_shaders())
}

pub fn clear_shader_cache() {
    with_context((), |cx| cx.clear_shader_cache());
}

pub fn get_shader_cache_size() -> usize {
    with_context(0, |cx| cx.shader_cache_size())
}

pub fn flush_shader_cache() {
    with_context((), |cx| cx.flush_shader_cache());
}
