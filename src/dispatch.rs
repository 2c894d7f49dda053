//! Entry-point dispatch and the C ABI.
//!
//! Hosts resolve desktop-GL names once through `velocityGetProcAddress`
//! (or the `glXGetProcAddress` / `OSMesaGetProcAddress` aliases) and then
//! call straight into the wrapped entry points below. Names the wrapper
//! does not intercept fall through to the platform's native lookup so
//! unwrapped extension entry points keep working.

// The exported symbols keep the C-side spelling launchers look up.
#![allow(non_snake_case)]

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::sync::OnceLock;

use crate::api::with_context;
use crate::gles::consts;

// ---- wrapped GL entry points ----
//
// Every shim goes through the current-context slot; with no context the
// call is dropped after an error log (neutral behaviour, never a crash).

extern "C" fn vgl_enable(cap: u32) {
    with_context((), |cx| cx.gl_enable(cap));
}

extern "C" fn vgl_disable(cap: u32) {
    with_context((), |cx| cx.gl_disable(cap));
}

extern "C" fn vgl_is_enabled(cap: u32) -> u8 {
    with_context(0, |cx| cx.gl_is_enabled(cap) as u8)
}

extern "C" fn vgl_blend_func(src: u32, dst: u32) {
    with_context((), |cx| cx.gl_blend_func(src, dst));
}

extern "C" fn vgl_blend_func_separate(sr: u32, dr: u32, sa: u32, da: u32) {
    with_context((), |cx| cx.gl_blend_func_separate(sr, dr, sa, da));
}

extern "C" fn vgl_blend_equation(mode: u32) {
    with_context((), |cx| cx.gl_blend_equation(mode));
}

extern "C" fn vgl_blend_equation_separate(rgb: u32, alpha: u32) {
    with_context((), |cx| cx.gl_blend_equation_separate(rgb, alpha));
}

extern "C" fn vgl_blend_color(r: f32, g: f32, b: f32, a: f32) {
    with_context((), |cx| cx.gl_blend_color(r, g, b, a));
}

extern "C" fn vgl_depth_func(func: u32) {
    with_context((), |cx| cx.gl_depth_func(func));
}

extern "C" fn vgl_depth_mask(flag: u8) {
    with_context((), |cx| cx.gl_depth_mask(flag != 0));
}

extern "C" fn vgl_depth_rangef(near: f32, far: f32) {
    with_context((), |cx| cx.gl_depth_range(near, far));
}

extern "C" fn vgl_stencil_func(func: u32, reference: i32, mask: u32) {
    with_context((), |cx| cx.gl_stencil_func(func, reference, mask));
}

extern "C" fn vgl_stencil_func_separate(face: u32, func: u32, reference: i32, mask: u32) {
    with_context((), |cx| cx.gl_stencil_func_separate(face, func, reference, mask));
}

extern "C" fn vgl_stencil_op(sfail: u32, dpfail: u32, dppass: u32) {
    with_context((), |cx| cx.gl_stencil_op(sfail, dpfail, dppass));
}

extern "C" fn vgl_stencil_op_separate(face: u32, sfail: u32, dpfail: u32, dppass: u32) {
    with_context((), |cx| cx.gl_stencil_op_separate(face, sfail, dpfail, dppass));
}

extern "C" fn vgl_stencil_mask(mask: u32) {
    with_context((), |cx| cx.gl_stencil_mask(mask));
}

extern "C" fn vgl_stencil_mask_separate(face: u32, mask: u32) {
    with_context((), |cx| cx.gl_stencil_mask_separate(face, mask));
}

extern "C" fn vgl_cull_face(mode: u32) {
    with_context((), |cx| cx.gl_cull_face(mode));
}

extern "C" fn vgl_front_face(mode: u32) {
    with_context((), |cx| cx.gl_front_face(mode));
}

extern "C" fn vgl_line_width(width: f32) {
    with_context((), |cx| cx.gl_line_width(width));
}

extern "C" fn vgl_polygon_offset(factor: f32, units: f32) {
    with_context((), |cx| cx.gl_polygon_offset(factor, units));
}

extern "C" fn vgl_viewport(x: i32, y: i32, w: i32, h: i32) {
    with_context((), |cx| cx.gl_viewport(x, y, w, h));
}

extern "C" fn vgl_scissor(x: i32, y: i32, w: i32, h: i32) {
    with_context((), |cx| cx.gl_scissor(x, y, w, h));
}

extern "C" fn vgl_color_mask(r: u8, g: u8, b: u8, a: u8) {
    with_context((), |cx| cx.gl_color_mask(r != 0, g != 0, b != 0, a != 0));
}

extern "C" fn vgl_clear(mask: u32) {
    with_context((), |cx| cx.gl_clear(mask));
}

extern "C" fn vgl_clear_color(r: f32, g: f32, b: f32, a: f32) {
    with_context((), |cx| cx.gl_clear_color(r, g, b, a));
}

extern "C" fn vgl_clear_depthf(depth: f32) {
    with_context((), |cx| cx.gl_clear_depth(depth));
}

extern "C" fn vgl_clear_stencil(stencil: i32) {
    with_context((), |cx| cx.gl_clear_stencil(stencil));
}

extern "C" fn vgl_active_texture(unit: u32) {
    with_context((), |cx| cx.gl_active_texture(unit));
}

extern "C" fn vgl_bind_texture(target: u32, texture: u32) {
    with_context((), |cx| cx.gl_bind_texture(target, texture));
}

extern "C" fn vgl_bind_sampler(unit: u32, sampler: u32) {
    with_context((), |cx| cx.gl_bind_sampler(unit, sampler));
}

extern "C" fn vgl_bind_buffer(target: u32, buffer: u32) {
    with_context((), |cx| cx.gl_bind_buffer(target, buffer));
}

extern "C" fn vgl_bind_vertex_array(vao: u32) {
    with_context((), |cx| cx.gl_bind_vertex_array(vao));
}

extern "C" fn vgl_bind_framebuffer(target: u32, framebuffer: u32) {
    with_context((), |cx| cx.gl_bind_framebuffer(target, framebuffer));
}

extern "C" fn vgl_use_program(program: u32) {
    with_context((), |cx| cx.gl_use_program(program));
}

extern "C" fn vgl_draw_arrays(mode: u32, first: i32, count: i32) {
    with_context((), |cx| cx.gl_draw_arrays(mode, first, count));
}

extern "C" fn vgl_draw_elements(mode: u32, count: i32, index_type: u32, indices: *const c_void) {
    with_context((), |cx| cx.gl_draw_elements(mode, count, index_type, indices as usize));
}

extern "C" fn vgl_draw_arrays_instanced(mode: u32, first: i32, count: i32, instances: i32) {
    with_context((), |cx| cx.gl_draw_arrays_instanced(mode, first, count, instances));
}

extern "C" fn vgl_draw_elements_instanced(
    mode: u32,
    count: i32,
    index_type: u32,
    indices: *const c_void,
    instances: i32,
) {
    with_context((), |cx| {
        cx.gl_draw_elements_instanced(mode, count, index_type, indices as usize, instances)
    });
}

extern "C" fn vgl_multi_draw_arrays(
    mode: u32,
    firsts: *const i32,
    counts: *const i32,
    drawcount: i32,
) {
    if firsts.is_null() || counts.is_null() || drawcount <= 0 {
        return;
    }
    let n = drawcount as usize;
    let (firsts, counts) = unsafe {
        (
            std::slice::from_raw_parts(firsts, n),
            std::slice::from_raw_parts(counts, n),
        )
    };
    with_context((), |cx| cx.gl_multi_draw_arrays(mode, firsts, counts));
}

extern "C" fn vgl_multi_draw_elements(
    mode: u32,
    counts: *const i32,
    index_type: u32,
    indices: *const *const c_void,
    drawcount: i32,
) {
    if counts.is_null() || indices.is_null() || drawcount <= 0 {
        return;
    }
    let n = drawcount as usize;
    let counts = unsafe { std::slice::from_raw_parts(counts, n) };
    let offsets: Vec<usize> = unsafe { std::slice::from_raw_parts(indices, n) }
        .iter()
        .map(|&p| p as usize)
        .collect();
    with_context((), |cx| cx.gl_multi_draw_elements(mode, counts, index_type, &offsets));
}

extern "C" fn vgl_tex_image_2d(
    target: u32,
    level: i32,
    internal_format: i32,
    w: i32,
    h: i32,
    _border: i32,
    format: u32,
    ty: u32,
    pixels: *const c_void,
) {
    with_context((), |cx| {
        cx.gl_tex_image_2d(target, level, internal_format as u32, w, h, format, ty, pixels)
    });
}

extern "C" fn vgl_get_error() -> u32 {
    with_context(consts::NO_ERROR, |cx| cx.gl_get_error())
}

extern "C" fn vgl_get_string(name: u32) -> *const u8 {
    with_context(std::ptr::null(), |cx| cx.gl_get_string_ptr(name).cast())
}

extern "C" fn vgl_get_integerv(pname: u32, data: *mut i32) {
    if data.is_null() {
        return;
    }
    let mut values = [0i32; 4];
    let written = with_context(0, |cx| cx.gl_get_integerv(pname, &mut values));
    // Only as many values as the query produces touch caller storage.
    unsafe { std::ptr::copy_nonoverlapping(values.as_ptr(), data, written) };
}

extern "C" fn vgl_flush() {
    with_context((), |cx| cx.gl_flush());
}

extern "C" fn vgl_finish() {
    with_context((), |cx| cx.gl_finish());
}

// ---- dispatch table ----

macro_rules! proc_table {
    ($( $name:literal => $func:expr ),* $(,)?) => {{
        let mut table: HashMap<&'static str, usize> = HashMap::new();
        $( table.insert($name, $func as usize); )*
        table
    }};
}

fn table() -> &'static HashMap<&'static str, usize> {
    static TABLE: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    TABLE.get_or_init(|| {
        proc_table! {
            "glEnable" => vgl_enable,
            "glDisable" => vgl_disable,
            "glIsEnabled" => vgl_is_enabled,
            "glBlendFunc" => vgl_blend_func,
            "glBlendFuncSeparate" => vgl_blend_func_separate,
            "glBlendEquation" => vgl_blend_equation,
            "glBlendEquationSeparate" => vgl_blend_equation_separate,
            "glBlendColor" => vgl_blend_color,
            "glDepthFunc" => vgl_depth_func,
            "glDepthMask" => vgl_depth_mask,
            "glDepthRangef" => vgl_depth_rangef,
            "glStencilFunc" => vgl_stencil_func,
            "glStencilFuncSeparate" => vgl_stencil_func_separate,
            "glStencilOp" => vgl_stencil_op,
            "glStencilOpSeparate" => vgl_stencil_op_separate,
            "glStencilMask" => vgl_stencil_mask,
            "glStencilMaskSeparate" => vgl_stencil_mask_separate,
            "glCullFace" => vgl_cull_face,
            "glFrontFace" => vgl_front_face,
            "glLineWidth" => vgl_line_width,
            "glPolygonOffset" => vgl_polygon_offset,
            "glViewport" => vgl_viewport,
            "glScissor" => vgl_scissor,
            "glColorMask" => vgl_color_mask,
            "glClear" => vgl_clear,
            "glClearColor" => vgl_clear_color,
            "glClearDepthf" => vgl_clear_depthf,
            "glClearStencil" => vgl_clear_stencil,
            "glActiveTexture" => vgl_active_texture,
            "glBindTexture" => vgl_bind_texture,
            "glBindSampler" => vgl_bind_sampler,
            "glBindBuffer" => vgl_bind_buffer,
            "glBindVertexArray" => vgl_bind_vertex_array,
            "glBindFramebuffer" => vgl_bind_framebuffer,
            "glUseProgram" => vgl_use_program,
            "glDrawArrays" => vgl_draw_arrays,
            "glDrawElements" => vgl_draw_elements,
            "glDrawArraysInstanced" => vgl_draw_arrays_instanced,
            "glDrawElementsInstanced" => vgl_draw_elements_instanced,
            "glMultiDrawArrays" => vgl_multi_draw_arrays,
            "glMultiDrawElements" => vgl_multi_draw_elements,
            "glTexImage2D" => vgl_tex_image_2d,
            "glGetError" => vgl_get_error,
            "glGetString" => vgl_get_string,
            "glGetIntegerv" => vgl_get_integerv,
            "glFlush" => vgl_flush,
            "glFinish" => vgl_finish,
        }
    })
}

/// Resolve an entry-point name: wrapped table first, then the platform's
/// native lookup.
pub fn resolve(name: &str) -> *const c_void {
    if let Some(&proc_addr) = table().get(name) {
        return proc_addr as *const c_void;
    }
    with_context(std::ptr::null(), |cx| cx.native_proc_address(name))
}

fn resolve_c(name: *const c_char) -> *const c_void {
    if name.is_null() {
        return std::ptr::null();
    }
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return std::ptr::null();
    };
    resolve(name)
}

// ---- host-visible exports ----

/// Main entry point used by launchers.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn velocityGetProcAddress(name: *const c_char) -> *const c_void {
    resolve_c(name)
}

/// Desktop-style alias resolving through the same table.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn glXGetProcAddress(name: *const c_char) -> *const c_void {
    resolve_c(name)
}

/// SGI-style alias resolving through the same table.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn glXGetProcAddressARB(name: *const c_char) -> *const c_void {
    resolve_c(name)
}

/// OSMesa-style alias; some launchers probe for it.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn OSMesaGetProcAddress(name: *const c_char) -> *const c_void {
    resolve_c(name)
}

#[no_mangle]
pub extern "C" fn velocityInitDefault() -> u8 {
    crate::api::init_default() as u8
}

#[no_mangle]
pub extern "C" fn velocityShutdown() {
    crate::api::shutdown();
}

#[no_mangle]
pub extern "C" fn velocityCreateContext(native_window: *mut c_void, display: *mut c_void) -> u8 {
    crate::api::create_context(native_window, display) as u8
}

#[no_mangle]
pub extern "C" fn velocityDestroyContext() {
    crate::api::destroy_context();
}

#[no_mangle]
pub extern "C" fn velocityMakeCurrent() -> u8 {
    crate::api::make_current() as u8
}

#[no_mangle]
pub extern "C" fn velocitySwapBuffers() {
    crate::api::swap_buffers();
}

#[no_mangle]
pub extern "C" fn velocityBeginFrame() {
    crate::api::begin_frame();
}

#[no_mangle]
pub extern "C" fn velocityEndFrame() {
    crate::api::end_frame();
}

#[no_mangle]
pub extern "C" fn velocityGetStats(out: *mut crate::stats::VelocityStats) -> u8 {
    if out.is_null() {
        return 0;
    }
    let stats = crate::api::get_stats();
    unsafe { out.write(stats) };
    1
}

#[no_mangle]
pub extern "C" fn velocityResetStats() {
    crate::api::reset_stats();
}

#[no_mangle]
pub extern "C" fn velocitySetResolutionScale(scale: f32) {
    crate::api::set_resolution_scale(scale);
}

#[no_mangle]
pub extern "C" fn velocityGetResolutionScale() -> f32 {
    crate::api::get_resolution_scale()
}

#[no_mangle]
pub extern "C" fn velocitySetDynamicResolution(enabled: u8) {
    crate::api::set_dynamic_resolution(enabled != 0);
}

#[no_mangle]
pub extern "C" fn velocityTrimMemory(level: i32) {
    crate::api::trim_memory(level.max(0) as u32);
}

#[no_mangle]
pub extern "C" fn velocityGetMemoryUsage() -> usize {
    crate::api::get_memory_usage()
}

#[no_mangle]
pub extern "C" fn velocityPreloadShaders() {
    crate::api::preload_shaders();
}

#[no_mangle]
pub extern "C" fn velocityClearShaderCache() {
    crate::api::clear_shader_cache();
}

#[no_mangle]
pub extern "C" fn velocityGetShaderCacheSize() -> usize {
    crate::api::get_shader_cache_size()
}

#[no_mangle]
pub extern "C" fn velocityFlushShaderCache() {
    crate::api::flush_shader_cache();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_names_resolve_to_distinct_procs() {
        let draw = resolve("glDrawArrays");
        let enable = resolve("glEnable");
        assert!(!draw.is_null());
        assert!(!enable.is_null());
        assert_ne!(draw, enable);
    }

    #[test]
    fn aliases_share_the_resolver() {
        let name = std::ffi::CString::new("glViewport").unwrap();
        let a = unsafe { velocityGetProcAddress(name.as_ptr()) };
        let b = unsafe { glXGetProcAddress(name.as_ptr()) };
        let c = unsafe { glXGetProcAddressARB(name.as_ptr()) };
        let d = unsafe { OSMesaGetProcAddress(name.as_ptr()) };
        assert!(!a.is_null());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
    }

    #[test]
    fn null_and_invalid_names_resolve_to_null() {
        assert!(unsafe { velocityGetProcAddress(std::ptr::null()) }.is_null());
    }
}
