//! The nullary public surface and the dispatch table, driven end to end
//! over the simulated device.
//!
//! Everything here shares the one current-context slot, so the tests
//! serialise on a local lock (the process-global state is the point of
//! these tests).

use std::ffi::CString;
use std::sync::{Mutex, MutexGuard, OnceLock};

use velocity_gl::gles::{consts, SimulatedGles};
use velocity_gl::{api, dispatch, ShaderCacheMode, VelocityConfig};

fn slot_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    match LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn fresh_runtime(config: VelocityConfig) {
    api::shutdown();
    assert!(api::init(config));
}

#[test]
fn lifecycle_and_disk_cache_survival() {
    let _lock = slot_lock();
    let dir = tempfile::tempdir().unwrap();

    let config = VelocityConfig {
        shader_cache: ShaderCacheMode::Disk,
        shader_cache_path: Some(dir.path().to_path_buf()),
        gpu_specific_tweaks: false,
        ..VelocityConfig::default()
    };
    fresh_runtime(config.clone());
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new()),
        1280,
        720
    ));

    for _ in 0..3 {
        api::begin_frame();
        api::end_frame();
        api::swap_buffers();
    }

    let warmed = api::preload_shaders();
    assert!(warmed > 0);
    assert!(api::get_shader_cache_size() > 0);
    api::flush_shader_cache();

    // Tear down and come back on the same GPU: entries reload from disk.
    api::shutdown();
    fresh_runtime(config.clone());
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new()),
        1280,
        720
    ));
    assert!(api::get_shader_cache_size() > 0);

    // A different GPU renderer invalidates the file wholesale.
    api::shutdown();
    fresh_runtime(config);
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new().with_identity(
            "ARM",
            "Mali-G710",
            "OpenGL ES 3.2",
        )),
        1280,
        720
    ));
    assert_eq!(api::get_shader_cache_size(), 0);

    api::shutdown();
}

#[test]
fn uninitialized_surface_returns_neutral_values() {
    let _lock = slot_lock();
    api::shutdown();

    assert_eq!(api::get_stats(), velocity_gl::VelocityStats::default());
    assert!(!api::make_current());
    assert_eq!(api::get_resolution_scale(), 1.0);
    assert_eq!(api::get_memory_usage(), 0);
    assert!(api::get_gpu_caps().is_none());
    // No context, no panic.
    api::begin_frame();
    api::end_frame();
    api::trim_memory(3);

    // Creating a context from a native window without a platform shim is a
    // clean failure.
    assert!(api::init_default());
    assert!(!api::create_context(std::ptr::null_mut(), std::ptr::null_mut()));
    api::shutdown();
}

#[test]
fn init_and_shutdown_are_idempotent() {
    let _lock = slot_lock();
    api::shutdown();

    assert!(api::init_default());
    assert!(api::init_default());
    api::shutdown();
    api::shutdown();
}

#[test]
fn proc_table_calls_reach_the_tracker() {
    let _lock = slot_lock();
    fresh_runtime(VelocityConfig {
        gpu_specific_tweaks: false,
        ..VelocityConfig::default()
    });
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new()),
        800,
        600
    ));
    api::reset_stats();

    let enable_ptr = dispatch::resolve("glEnable");
    assert!(!enable_ptr.is_null());
    let gl_enable: unsafe extern "C" fn(u32) = unsafe { std::mem::transmute(enable_ptr) };
    unsafe {
        gl_enable(consts::BLEND);
        gl_enable(consts::BLEND);
        gl_enable(consts::BLEND);
    }
    let stats = api::get_stats();
    assert_eq!(stats.state_changes_applied, 1);
    assert_eq!(stats.state_changes_avoided, 2);

    let get_string_ptr = dispatch::resolve("glGetString");
    let gl_get_string: unsafe extern "C" fn(u32) -> *const std::os::raw::c_char =
        unsafe { std::mem::transmute(get_string_ptr) };
    let version = unsafe { std::ffi::CStr::from_ptr(gl_get_string(consts::VERSION)) };
    assert_eq!(version.to_str().unwrap(), "4.6 VelocityGL");

    api::shutdown();
}

#[test]
fn alias_exports_forward_to_the_same_resolver() {
    let _lock = slot_lock();
    let name = CString::new("glDrawElements").unwrap();
    let a = unsafe { dispatch::velocityGetProcAddress(name.as_ptr()) };
    let b = unsafe { dispatch::glXGetProcAddressARB(name.as_ptr()) };
    assert!(!a.is_null());
    assert_eq!(a, b);
}

#[test]
fn gpu_tweaks_rewrite_the_tunables_on_update() {
    let _lock = slot_lock();
    fresh_runtime(VelocityConfig::default());
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new()), // tier-5 Adreno
        1920,
        1080
    ));

    let mut config = api::get_config();
    config.gpu_specific_tweaks = true;
    assert!(api::update_config(config));

    let applied = api::get_config();
    assert_eq!(applied.max_batch_size, 256);
    assert_eq!(applied.texture_pool_mb, 256);
    assert_eq!(applied.quality, velocity_gl::QualityPreset::High);
    assert!(applied.instancing);

    api::shutdown();
}

#[test]
fn trim_level_two_clears_the_shader_cache() {
    let _lock = slot_lock();
    fresh_runtime(VelocityConfig {
        shader_cache: ShaderCacheMode::MemoryOnly,
        gpu_specific_tweaks: false,
        ..VelocityConfig::default()
    });
    assert!(api::create_context_with_device(
        Box::new(SimulatedGles::new()),
        1280,
        720
    ));

    api::preload_shaders();
    assert!(api::get_shader_cache_size() > 0);
    api::trim_memory(2);
    assert_eq!(api::get_shader_cache_size(), 0);

    api::shutdown();
}
