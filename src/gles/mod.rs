//! Abstraction over the consumed OpenGL ES 3.x surface.
//!
//! Every subsystem talks to the device through [`GlesContext`] and never
//! touches the platform directly. Two implementations ship with the crate:
//!
//! - [`NativeGles`] resolves raw GLES entry points through a loader supplied
//!   by the platform layer (the EGL `GetProcAddress` shape).
//! - [`SimulatedGles`] is a software device that allocates handles, stores
//!   buffer bytes and fabricates program binaries. It records every call so
//!   tests can count exactly what was forwarded.

pub mod consts;
mod native;
mod sim;

pub use native::{NativeGles, ProcLoader};
pub use sim::{CallLog, SimulatedGles};

use std::os::raw::c_void;

/// Opaque fence handle. `0` means "no fence".
pub type GlFence = u64;

/// The OpenGL ES 3.x call subset consumed by the wrapper.
///
/// Handles are raw `u32` names exactly as the device hands them out; the
/// wrapper forwards host-visible names unmodified. All methods require the
/// context to be current on the calling thread; that invariant is
/// established at construction and by `make_current`, not checked per call.
#[allow(clippy::too_many_arguments)]
pub trait GlesContext: Send {
    /// Short human-readable description of the implementation.
    fn description(&self) -> &'static str;

    // ---- context / presentation ----
    fn make_current(&mut self) -> bool;
    fn swap_buffers(&mut self);

    /// Platform-native lookup for entry points the wrapper does not
    /// intercept. Returns null when the platform has no such symbol.
    fn native_proc_address(&self, name: &str) -> *const c_void {
        let _ = name;
        std::ptr::null()
    }

    // ---- queries ----
    fn get_error(&mut self) -> u32;
    fn get_string(&mut self, name: u32) -> String;
    fn get_integer(&mut self, pname: u32) -> i32;
    fn get_float(&mut self, pname: u32) -> f32;
    fn is_enabled(&mut self, cap: u32) -> bool;

    // ---- global state ----
    fn enable(&mut self, cap: u32);
    fn disable(&mut self, cap: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32);
    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn depth_func(&mut self, func: u32);
    fn depth_mask(&mut self, flag: bool);
    fn depth_range(&mut self, near: f32, far: f32);
    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op_separate(&mut self, face: u32, sfail: u32, dpfail: u32, dppass: u32);
    fn stencil_mask_separate(&mut self, face: u32, mask: u32);
    fn cull_face(&mut self, mode: u32);
    fn front_face(&mut self, mode: u32);
    fn line_width(&mut self, width: f32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn scissor(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);
    fn clear(&mut self, mask: u32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&mut self, depth: f32);
    fn clear_stencil(&mut self, stencil: i32);

    // ---- bindings ----
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: u32, texture: u32);
    fn bind_sampler(&mut self, unit: u32, sampler: u32);
    fn bind_buffer(&mut self, target: u32, buffer: u32);
    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: u32);
    fn bind_buffer_range(&mut self, target: u32, index: u32, buffer: u32, offset: usize, size: usize);
    fn bind_vertex_array(&mut self, vao: u32);
    fn bind_framebuffer(&mut self, target: u32, framebuffer: u32);
    fn use_program(&mut self, program: u32);

    // ---- object lifetime ----
    fn gen_buffer(&mut self) -> u32;
    fn delete_buffer(&mut self, buffer: u32);
    fn gen_texture(&mut self) -> u32;
    fn delete_texture(&mut self, texture: u32);
    fn gen_framebuffer(&mut self) -> u32;
    fn delete_framebuffer(&mut self, framebuffer: u32);
    fn gen_vertex_array(&mut self) -> u32;
    fn delete_vertex_array(&mut self, vao: u32);

    // ---- buffer storage ----
    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32);
    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]);
    /// `glBufferStorageEXT`. Returns false when the device lacks
    /// `GL_EXT_buffer_storage`.
    fn buffer_storage(&mut self, target: u32, size: usize, flags: u32) -> bool;
    fn map_buffer_range(&mut self, target: u32, offset: usize, length: usize, access: u32)
        -> *mut u8;
    fn unmap_buffer(&mut self, target: u32) -> bool;
    fn flush_mapped_buffer_range(&mut self, target: u32, offset: usize, length: usize);

    // ---- vertex attributes ----
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    );

    // ---- textures ----
    fn tex_storage_2d(&mut self, target: u32, levels: i32, internal_format: u32, w: i32, h: i32);
    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: u32,
        w: i32,
        h: i32,
        format: u32,
        ty: u32,
        pixels: *const c_void,
    );
    fn tex_parameter_i(&mut self, target: u32, pname: u32, param: i32);

    // ---- framebuffer attachments ----
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: u32,
        level: i32,
    );
    fn check_framebuffer_status(&mut self, target: u32) -> u32;

    // ---- shaders and programs ----
    fn create_shader(&mut self, ty: u32) -> u32;
    fn shader_source(&mut self, shader: u32, source: &str);
    fn compile_shader(&mut self, shader: u32);
    fn get_shader_compile_status(&mut self, shader: u32) -> bool;
    fn get_shader_info_log(&mut self, shader: u32) -> String;
    fn delete_shader(&mut self, shader: u32);
    fn create_program(&mut self) -> u32;
    fn attach_shader(&mut self, program: u32, shader: u32);
    fn link_program(&mut self, program: u32);
    fn get_program_link_status(&mut self, program: u32) -> bool;
    fn get_program_info_log(&mut self, program: u32) -> String;
    fn delete_program(&mut self, program: u32);
    /// `(binary_format, blob)` for a linked program, or `None` when the
    /// driver cannot produce one.
    fn get_program_binary(&mut self, program: u32) -> Option<(u32, Vec<u8>)>;
    fn program_binary(&mut self, program: u32, format: u32, binary: &[u8]);
    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32;
    fn uniform_1i(&mut self, location: i32, v: i32);
    fn uniform_1f(&mut self, location: i32, v: f32);
    fn uniform_2f(&mut self, location: i32, v0: f32, v1: f32);

    // ---- draws ----
    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32);
    /// `offset` is a byte offset into the bound element array buffer.
    fn draw_elements(&mut self, mode: u32, count: i32, index_type: u32, offset: usize);
    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instances: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: usize,
        instances: i32,
    );
    /// `GL_EXT_multi_draw_arrays`. Implementations without the extension
    /// must not be asked for this; the batcher checks the capability bit.
    fn multi_draw_arrays(&mut self, mode: u32, firsts: &[i32], counts: &[i32]);
    fn multi_draw_elements(&mut self, mode: u32, counts: &[i32], index_type: u32, offsets: &[usize]);

    // ---- sync ----
    fn fence_sync(&mut self) -> GlFence;
    fn client_wait_sync(&mut self, fence: GlFence, flags: u32, timeout_ns: u64) -> u32;
    fn delete_sync(&mut self, fence: GlFence);
    fn flush(&mut self);
    fn finish(&mut self);
}
