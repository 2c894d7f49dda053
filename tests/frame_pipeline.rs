//! Whole-frame behaviour over the simulated device: the state filter,
//! the batcher and the scaler cooperating inside one context.

use pretty_assertions::assert_eq;

use velocity_gl::gles::{consts, SimulatedGles};
use velocity_gl::{VelocityConfig, VelocityContext};

fn context_with(config: VelocityConfig) -> (VelocityContext, velocity_gl::gles::CallLog) {
    let device = SimulatedGles::new();
    let log = device.log_handle();
    let context = VelocityContext::new(Box::new(device), config, 1920, 1080).expect("context");
    (context, log)
}

#[test]
fn redundant_state_filter_across_a_frame() {
    let (mut cx, log) = context_with(VelocityConfig::default());

    cx.begin_frame();
    log.clear();
    for _ in 0..1000 {
        cx.gl_enable(consts::BLEND);
    }
    cx.end_frame();

    // Exactly one forwarded enable(BLEND) among the recorded calls.
    let blend_enables = log
        .snapshot()
        .iter()
        .filter(|c| c.as_str() == "enable(0x0be2)")
        .count();
    assert_eq!(blend_enables, 1);

    let stats = cx.stats();
    assert_eq!(stats.state_changes_avoided, 999);
}

#[test]
fn eight_draw_coalesce_with_multi_draw_device() {
    let (mut cx, log) = context_with(VelocityConfig::default());

    cx.begin_frame();
    cx.gl_use_program(5);
    cx.gl_bind_vertex_array(7);
    cx.gl_active_texture(consts::TEXTURE0);
    cx.gl_bind_texture(consts::TEXTURE_2D, 11);
    log.clear();
    for _ in 0..8 {
        cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    }
    cx.end_frame();

    let stats = cx.stats();
    assert_eq!(stats.draw_calls_submitted, 8);
    assert_eq!(stats.batches_created, 1);
    assert_eq!(stats.draw_calls_saved, 7);
    assert_eq!(
        stats.draw_calls_executed + stats.draw_calls_saved,
        stats.draw_calls_submitted
    );
    assert_eq!(log.count("multi_draw_arrays"), 1);
}

#[test]
fn eight_draw_coalesce_without_multi_draw_device() {
    let device = SimulatedGles::new().without_extension("GL_EXT_multi_draw_arrays");
    let log = device.log_handle();
    let config = VelocityConfig {
        dynamic_resolution: false,
        ..VelocityConfig::default()
    };
    let mut cx = VelocityContext::new(Box::new(device), config, 1920, 1080).expect("context");

    cx.begin_frame();
    cx.gl_use_program(5);
    log.clear();
    for _ in 0..8 {
        cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    }
    cx.end_frame();

    let stats = cx.stats();
    assert_eq!(stats.draw_calls_submitted, 8);
    assert_eq!(stats.draw_calls_saved, 0);
    assert_eq!(stats.draw_calls_executed, 8);
    assert_eq!(log.count("multi_draw_arrays"), 0);
    assert_eq!(log.count("draw_arrays"), 8);
}

#[test]
fn interleaved_state_splits_batches() {
    let (mut cx, _log) = context_with(VelocityConfig::default());

    cx.begin_frame();
    cx.gl_use_program(1);
    for _ in 0..3 {
        cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    }
    cx.gl_use_program(2);
    for _ in 0..3 {
        cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    }
    cx.end_frame();

    let stats = cx.stats();
    assert_eq!(stats.draw_calls_submitted, 6);
    assert_eq!(stats.batches_created, 2);
    assert_eq!(stats.draw_calls_saved, 4);
}

#[test]
fn batching_disabled_emits_immediately() {
    let config = VelocityConfig {
        draw_batching: false,
        ..VelocityConfig::default()
    };
    let (mut cx, log) = context_with(config);

    cx.begin_frame();
    log.clear();
    cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    // Visible on the device before end_frame.
    assert_eq!(log.count("draw_arrays"), 1);
    cx.end_frame();

    let stats = cx.stats();
    assert_eq!(stats.draw_calls_submitted, 1);
    assert_eq!(stats.draw_calls_executed, 1);
    assert_eq!(stats.draw_calls_saved, 0);
}

#[test]
fn fast_frames_never_push_scale_past_the_band() {
    let (mut cx, _log) = context_with(VelocityConfig::default());
    assert_eq!(cx.resolution_scale(), 1.0);

    // Simulated frames complete far faster than the 60 FPS target; the
    // scale is already at the configured maximum and must stay there.
    for _ in 0..80 {
        cx.begin_frame();
        cx.end_frame();
    }
    assert_eq!(cx.resolution_scale(), 1.0);
    assert_eq!(cx.stats().scale_changes, 0);
}

#[test]
fn upscale_pass_runs_after_scene_draws_and_before_swap() {
    let (mut cx, log) = context_with(VelocityConfig::default());

    cx.begin_frame();
    cx.gl_use_program(1);
    cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
    log.clear();
    cx.end_frame();
    cx.swap_buffers();

    let calls = log.snapshot();
    let scene_draw = calls
        .iter()
        .position(|c| c.starts_with("draw_arrays("))
        .expect("scene draw flushed in end_frame");
    let upscale_bind = calls
        .iter()
        .position(|c| c == "bind_framebuffer(0x8d40, 0)")
        .expect("default framebuffer rebound for upscale");
    let fence = calls
        .iter()
        .position(|c| c.starts_with("fence_sync"))
        .expect("ring fence inserted");
    let swap = calls
        .iter()
        .position(|c| c == "swap_buffers()")
        .expect("swap recorded");

    assert!(scene_draw < upscale_bind, "scene draws precede the upscale pass");
    assert!(upscale_bind < swap, "upscale precedes swap");
    assert!(scene_draw < fence, "queued draws execute before the frame fence");
}

#[test]
fn masquerade_strings_and_versions() {
    let (mut cx, _log) = context_with(VelocityConfig::default());

    assert_eq!(cx.gl_get_string(consts::VERSION), "4.6 VelocityGL");
    assert_eq!(
        cx.gl_get_string(consts::RENDERER),
        "VelocityGL (Adreno (TM) 740)"
    );
    // Vendor passes through untouched.
    assert_eq!(cx.gl_get_string(consts::VENDOR), "Qualcomm");

    let mut out = [0i32; 4];
    cx.gl_get_integerv(consts::MAJOR_VERSION, &mut out);
    assert_eq!(out[0], 4);
    cx.gl_get_integerv(consts::MINOR_VERSION, &mut out);
    assert_eq!(out[0], 6);
}

#[test]
fn state_readback_matches_last_set() {
    let (mut cx, _log) = context_with(VelocityConfig::default());

    cx.gl_viewport(10, 20, 300, 400);
    cx.gl_use_program(77);

    let mut out = [0i32; 4];
    assert_eq!(cx.gl_get_integerv(0x0BA2, &mut out), 4); // GL_VIEWPORT
    assert_eq!(out, [10, 20, 300, 400]);
    cx.gl_get_integerv(0x8B8D, &mut out); // GL_CURRENT_PROGRAM
    assert_eq!(out[0], 77);
}

#[test]
fn device_errors_surface_through_the_drain() {
    let mut device = SimulatedGles::new();
    device.inject_error(consts::INVALID_OPERATION);
    let mut cx = VelocityContext::new(
        Box::new(device),
        VelocityConfig::default(),
        640,
        480,
    )
    .expect("context");

    assert_eq!(cx.gl_get_error(), consts::INVALID_OPERATION);
    assert_eq!(cx.gl_get_error(), consts::NO_ERROR);
}

#[test]
fn tex_image_reshapes_legacy_internal_formats() {
    let (mut cx, log) = context_with(VelocityConfig::default());
    log.clear();

    cx.gl_tex_image_2d(
        consts::TEXTURE_2D,
        0,
        consts::RGBA,
        32,
        32,
        consts::RGBA,
        consts::UNSIGNED_BYTE,
        std::ptr::null(),
    );
    let calls = log.snapshot();
    // GL_RGBA internal format was promoted to GL_RGBA8 (0x8058).
    assert!(calls.iter().any(|c| c.starts_with("tex_image_2d(") && c.contains("0x8058")));
}
