//! Software GLES device for tests and host harnesses.
//!
//! Handles are allocated from a counter, buffer contents live in host
//! memory, program binaries are fabricated deterministically from the
//! attached shader sources. Every forwarded call is recorded so tests can
//! assert exactly what reached the device.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::sync::{Arc, Mutex};

use crate::gles::{consts, GlFence, GlesContext};
use crate::hash::fnv1a;

/// Shared view of a [`SimulatedGles`] call log.
///
/// Cloning before boxing the device lets a test keep counting forwarded
/// calls after ownership moves into a context.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.lock().expect("call log poisoned").push(call);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().expect("call log poisoned").clone()
    }

    /// Number of recorded calls whose name matches `name` exactly.
    pub fn count(&self, name: &str) -> usize {
        self.0
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|c| c.split('(').next() == Some(name))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().expect("call log poisoned").clear();
    }
}

const DEFAULT_EXTENSIONS: &str = "GL_EXT_buffer_storage GL_EXT_multi_draw_arrays \
     GL_KHR_texture_compression_astc_ldr GL_EXT_texture_filter_anisotropic \
     GL_EXT_geometry_shader GL_KHR_debug";

#[derive(Default)]
struct ShaderObject {
    ty: u32,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramObject {
    shaders: Vec<u32>,
    linked: bool,
    binary: Option<(u32, Vec<u8>)>,
}

/// Recording software device.
///
/// The default identity is a tier-5 Adreno on ES 3.2; tests that need other
/// identities or failure modes use the builder-style setters.
pub struct SimulatedGles {
    vendor: String,
    renderer: String,
    version: String,
    extensions: String,

    next_name: u32,
    buffers: HashMap<u32, Box<[u8]>>,
    buffer_bindings: HashMap<u32, u32>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    live_textures: u32,
    live_framebuffers: u32,
    live_vertex_arrays: u32,

    next_fence: GlFence,
    live_fences: u32,
    pending_error: u32,

    // Failure knobs.
    pub force_fence_timeout: bool,
    pub fail_link: bool,
    pub reject_binaries: bool,
    pub framebuffer_status: u32,
    pub deny_program_binaries: bool,

    log: CallLog,
}

impl SimulatedGles {
    /// Binary format fabricated by this device.
    pub const BINARY_FORMAT: u32 = 0x5649_4E01;

    pub fn new() -> Self {
        Self {
            vendor: "Qualcomm".to_owned(),
            renderer: "Adreno (TM) 740".to_owned(),
            version: "OpenGL ES 3.2 V@0676.32".to_owned(),
            extensions: DEFAULT_EXTENSIONS.to_owned(),
            next_name: 1,
            buffers: HashMap::new(),
            buffer_bindings: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            live_textures: 0,
            live_framebuffers: 0,
            live_vertex_arrays: 0,
            next_fence: 1,
            live_fences: 0,
            pending_error: consts::NO_ERROR,
            force_fence_timeout: false,
            fail_link: false,
            reject_binaries: false,
            framebuffer_status: consts::FRAMEBUFFER_COMPLETE,
            deny_program_binaries: false,
            log: CallLog::default(),
        }
    }

    pub fn with_identity(mut self, vendor: &str, renderer: &str, version: &str) -> Self {
        self.vendor = vendor.to_owned();
        self.renderer = renderer.to_owned();
        self.version = version.to_owned();
        self
    }

    pub fn with_extensions(mut self, extensions: &str) -> Self {
        self.extensions = extensions.to_owned();
        self
    }

    /// Remove one extension from the advertised set.
    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions = self
            .extensions
            .split_whitespace()
            .filter(|ext| *ext != name)
            .collect::<Vec<_>>()
            .join(" ");
        self
    }

    /// Queue a device error for the next `get_error` drain.
    pub fn inject_error(&mut self, code: u32) {
        self.pending_error = code;
    }

    // ---- call log ----

    /// Shared handle to the call log; clone before boxing the device.
    pub fn log_handle(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.snapshot()
    }

    pub fn clear_calls(&mut self) {
        self.log.clear();
    }

    /// Number of recorded calls whose name matches `name` exactly.
    pub fn call_count(&self, name: &str) -> usize {
        self.log.count(name)
    }

    pub fn live_fences(&self) -> u32 {
        self.live_fences
    }

    pub fn live_textures(&self) -> u32 {
        self.live_textures
    }

    pub fn live_framebuffers(&self) -> u32 {
        self.live_framebuffers
    }

    pub fn live_vertex_arrays(&self) -> u32 {
        self.live_vertex_arrays
    }

    /// Raw contents of a device buffer, for sentinel-pattern checks.
    pub fn buffer_contents(&self, buffer: u32) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| &**b)
    }

    fn record(&mut self, call: String) {
        self.log.push(call);
    }

    fn alloc_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn bound(&self, target: u32) -> u32 {
        self.buffer_bindings.get(&target).copied().unwrap_or(0)
    }
}

impl Default for SimulatedGles {
    fn default() -> Self {
        Self::new()
    }
}

impl GlesContext for SimulatedGles {
    fn description(&self) -> &'static str {
        "simulated GLES device"
    }

    fn make_current(&mut self) -> bool {
        self.record("make_current()".to_owned());
        true
    }

    fn swap_buffers(&mut self) {
        self.record("swap_buffers()".to_owned());
    }

    fn get_error(&mut self) -> u32 {
        std::mem::replace(&mut self.pending_error, consts::NO_ERROR)
    }

    fn get_string(&mut self, name: u32) -> String {
        match name {
            consts::VENDOR => self.vendor.clone(),
            consts::RENDERER => self.renderer.clone(),
            consts::VERSION => self.version.clone(),
            consts::EXTENSIONS => self.extensions.clone(),
            _ => String::new(),
        }
    }

    fn get_integer(&mut self, pname: u32) -> i32 {
        match pname {
            consts::MAX_TEXTURE_SIZE => 8192,
            consts::MAX_COMBINED_TEXTURE_IMAGE_UNITS => 64,
            consts::MAX_VERTEX_ATTRIBS => 16,
            consts::MAX_UNIFORM_BUFFER_BINDINGS => 24,
            consts::MAX_SHADER_STORAGE_BUFFER_BINDINGS => 8,
            consts::NUM_PROGRAM_BINARY_FORMATS => {
                if self.deny_program_binaries {
                    0
                } else {
                    1
                }
            }
            consts::MAJOR_VERSION => 3,
            consts::MINOR_VERSION => 2,
            _ => 0,
        }
    }

    fn get_float(&mut self, pname: u32) -> f32 {
        match pname {
            consts::MAX_TEXTURE_MAX_ANISOTROPY_EXT => 16.0,
            _ => 0.0,
        }
    }

    fn is_enabled(&mut self, _cap: u32) -> bool {
        false
    }

    fn enable(&mut self, cap: u32) {
        self.record(format!("enable(0x{cap:04x})"));
    }

    fn disable(&mut self, cap: u32) {
        self.record(format!("disable(0x{cap:04x})"));
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(format!(
            "blend_func_separate(0x{src_rgb:x}, 0x{dst_rgb:x}, 0x{src_alpha:x}, 0x{dst_alpha:x})"
        ));
    }

    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        self.record(format!(
            "blend_equation_separate(0x{mode_rgb:x}, 0x{mode_alpha:x})"
        ));
    }

    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record(format!("blend_color({r}, {g}, {b}, {a})"));
    }

    fn depth_func(&mut self, func: u32) {
        self.record(format!("depth_func(0x{func:x})"));
    }

    fn depth_mask(&mut self, flag: bool) {
        self.record(format!("depth_mask({flag})"));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.record(format!("depth_range({near}, {far})"));
    }

    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        self.record(format!(
            "stencil_func_separate(0x{face:x}, 0x{func:x}, {reference}, 0x{mask:x})"
        ));
    }

    fn stencil_op_separate(&mut self, face: u32, sfail: u32, dpfail: u32, dppass: u32) {
        self.record(format!(
            "stencil_op_separate(0x{face:x}, 0x{sfail:x}, 0x{dpfail:x}, 0x{dppass:x})"
        ));
    }

    fn stencil_mask_separate(&mut self, face: u32, mask: u32) {
        self.record(format!("stencil_mask_separate(0x{face:x}, 0x{mask:x})"));
    }

    fn cull_face(&mut self, mode: u32) {
        self.record(format!("cull_face(0x{mode:x})"));
    }

    fn front_face(&mut self, mode: u32) {
        self.record(format!("front_face(0x{mode:x})"));
    }

    fn line_width(&mut self, width: f32) {
        self.record(format!("line_width({width})"));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(format!("polygon_offset({factor}, {units})"));
    }

    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.record(format!("viewport({x}, {y}, {w}, {h})"));
    }

    fn scissor(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.record(format!("scissor({x}, {y}, {w}, {h})"));
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.record(format!("color_mask({r}, {g}, {b}, {a})"));
    }

    fn clear(&mut self, mask: u32) {
        self.record(format!("clear(0x{mask:x})"));
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record(format!("clear_color({r}, {g}, {b}, {a})"));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record(format!("clear_depth({depth})"));
    }

    fn clear_stencil(&mut self, stencil: i32) {
        self.record(format!("clear_stencil({stencil})"));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(format!("active_texture(0x{unit:x})"));
    }

    fn bind_texture(&mut self, target: u32, texture: u32) {
        self.record(format!("bind_texture(0x{target:x}, {texture})"));
    }

    fn bind_sampler(&mut self, unit: u32, sampler: u32) {
        self.record(format!("bind_sampler({unit}, {sampler})"));
    }

    fn bind_buffer(&mut self, target: u32, buffer: u32) {
        self.buffer_bindings.insert(target, buffer);
        self.record(format!("bind_buffer(0x{target:x}, {buffer})"));
    }

    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: u32) {
        self.record(format!("bind_buffer_base(0x{target:x}, {index}, {buffer})"));
    }

    fn bind_buffer_range(&mut self, target: u32, index: u32, buffer: u32, offset: usize, size: usize) {
        self.record(format!(
            "bind_buffer_range(0x{target:x}, {index}, {buffer}, {offset}, {size})"
        ));
    }

    fn bind_vertex_array(&mut self, vao: u32) {
        self.record(format!("bind_vertex_array({vao})"));
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: u32) {
        self.record(format!("bind_framebuffer(0x{target:x}, {framebuffer})"));
    }

    fn use_program(&mut self, program: u32) {
        self.record(format!("use_program({program})"));
    }

    fn gen_buffer(&mut self) -> u32 {
        let name = self.alloc_name();
        self.buffers.insert(name, Box::from(&[] as &[u8]));
        self.record(format!("gen_buffer() -> {name}"));
        name
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.buffers.remove(&buffer);
        self.record(format!("delete_buffer({buffer})"));
    }

    fn gen_texture(&mut self) -> u32 {
        let name = self.alloc_name();
        self.live_textures += 1;
        self.record(format!("gen_texture() -> {name}"));
        name
    }

    fn delete_texture(&mut self, texture: u32) {
        self.live_textures = self.live_textures.saturating_sub(1);
        self.record(format!("delete_texture({texture})"));
    }

    fn gen_framebuffer(&mut self) -> u32 {
        let name = self.alloc_name();
        self.live_framebuffers += 1;
        self.record(format!("gen_framebuffer() -> {name}"));
        name
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        self.live_framebuffers = self.live_framebuffers.saturating_sub(1);
        self.record(format!("delete_framebuffer({framebuffer})"));
    }

    fn gen_vertex_array(&mut self) -> u32 {
        let name = self.alloc_name();
        self.live_vertex_arrays += 1;
        self.record(format!("gen_vertex_array() -> {name}"));
        name
    }

    fn delete_vertex_array(&mut self, vao: u32) {
        self.live_vertex_arrays = self.live_vertex_arrays.saturating_sub(1);
        self.record(format!("delete_vertex_array({vao})"));
    }

    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32) {
        let bound = self.bound(target);
        if bound != 0 {
            let mut bytes = vec![0u8; size];
            if let Some(data) = data {
                bytes[..data.len()].copy_from_slice(data);
            }
            self.buffers.insert(bound, bytes.into_boxed_slice());
        }
        self.record(format!("buffer_data(0x{target:x}, {size}, 0x{usage:x})"));
    }

    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]) {
        let bound = self.bound(target);
        if let Some(bytes) = self.buffers.get_mut(&bound) {
            if offset + data.len() <= bytes.len() {
                bytes[offset..offset + data.len()].copy_from_slice(data);
            }
        }
        self.record(format!(
            "buffer_sub_data(0x{target:x}, {offset}, {})",
            data.len()
        ));
    }

    fn buffer_storage(&mut self, target: u32, size: usize, flags: u32) -> bool {
        if !self.extensions.contains("GL_EXT_buffer_storage") {
            return false;
        }
        let bound = self.bound(target);
        if bound != 0 {
            self.buffers
                .insert(bound, vec![0u8; size].into_boxed_slice());
        }
        self.record(format!("buffer_storage(0x{target:x}, {size}, 0x{flags:x})"));
        true
    }

    fn map_buffer_range(&mut self, target: u32, offset: usize, length: usize, _access: u32) -> *mut u8 {
        let bound = self.bound(target);
        self.record(format!("map_buffer_range(0x{target:x}, {offset}, {length})"));
        match self.buffers.get_mut(&bound) {
            Some(bytes) if offset + length <= bytes.len() => {
                // The box is never reallocated while mapped, matching the GL
                // contract that the mapping stays valid until unmap.
                unsafe { bytes.as_mut_ptr().add(offset) }
            }
            _ => std::ptr::null_mut(),
        }
    }

    fn unmap_buffer(&mut self, target: u32) -> bool {
        self.record(format!("unmap_buffer(0x{target:x})"));
        true
    }

    fn flush_mapped_buffer_range(&mut self, target: u32, offset: usize, length: usize) {
        self.record(format!(
            "flush_mapped_buffer_range(0x{target:x}, {offset}, {length})"
        ));
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record(format!("enable_vertex_attrib_array({index})"));
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        self.record(format!(
            "vertex_attrib_pointer({index}, {size}, 0x{ty:x}, {normalized}, {stride}, {offset})"
        ));
    }

    fn tex_storage_2d(&mut self, target: u32, levels: i32, internal_format: u32, w: i32, h: i32) {
        self.record(format!(
            "tex_storage_2d(0x{target:x}, {levels}, 0x{internal_format:x}, {w}, {h})"
        ));
    }

    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: u32,
        w: i32,
        h: i32,
        format: u32,
        ty: u32,
        _pixels: *const c_void,
    ) {
        self.record(format!(
            "tex_image_2d(0x{target:x}, {level}, 0x{internal_format:x}, {w}, {h}, 0x{format:x}, 0x{ty:x})"
        ));
    }

    fn tex_parameter_i(&mut self, target: u32, pname: u32, param: i32) {
        self.record(format!("tex_parameter_i(0x{target:x}, 0x{pname:x}, {param})"));
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: u32,
        level: i32,
    ) {
        self.record(format!(
            "framebuffer_texture_2d(0x{target:x}, 0x{attachment:x}, 0x{textarget:x}, {texture}, {level})"
        ));
    }

    fn check_framebuffer_status(&mut self, _target: u32) -> u32 {
        self.framebuffer_status
    }

    fn create_shader(&mut self, ty: u32) -> u32 {
        let name = self.alloc_name();
        self.shaders.insert(
            name,
            ShaderObject {
                ty,
                ..Default::default()
            },
        );
        self.record(format!("create_shader(0x{ty:x}) -> {name}"));
        name
    }

    fn shader_source(&mut self, shader: u32, source: &str) {
        if let Some(obj) = self.shaders.get_mut(&shader) {
            obj.source = source.to_owned();
        }
        self.record(format!("shader_source({shader})"));
    }

    fn compile_shader(&mut self, shader: u32) {
        if let Some(obj) = self.shaders.get_mut(&shader) {
            obj.compiled = !obj.source.is_empty();
        }
        self.record(format!("compile_shader({shader})"));
    }

    fn get_shader_compile_status(&mut self, shader: u32) -> bool {
        self.shaders.get(&shader).is_some_and(|s| s.compiled)
    }

    fn get_shader_info_log(&mut self, shader: u32) -> String {
        match self.shaders.get(&shader) {
            Some(obj) if !obj.compiled => {
                format!("simulated compile failure for stage 0x{:x}", obj.ty)
            }
            _ => String::new(),
        }
    }

    fn delete_shader(&mut self, shader: u32) {
        self.shaders.remove(&shader);
        self.record(format!("delete_shader({shader})"));
    }

    fn create_program(&mut self) -> u32 {
        let name = self.alloc_name();
        self.programs.insert(name, ProgramObject::default());
        self.record(format!("create_program() -> {name}"));
        name
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        if let Some(obj) = self.programs.get_mut(&program) {
            obj.shaders.push(shader);
        }
        self.record(format!("attach_shader({program}, {shader})"));
    }

    fn link_program(&mut self, program: u32) {
        self.record(format!("link_program({program})"));
        if self.fail_link {
            if let Some(obj) = self.programs.get_mut(&program) {
                obj.linked = false;
            }
            return;
        }
        let combined: Option<String> = self.programs.get(&program).map(|obj| {
            obj.shaders
                .iter()
                .filter_map(|s| self.shaders.get(s))
                .map(|s| s.source.as_str())
                .collect::<Vec<_>>()
                .join("\n--\n")
        });
        if let (Some(obj), Some(combined)) = (self.programs.get_mut(&program), combined) {
            obj.linked = true;
            let mut blob = b"SIMBIN".to_vec();
            blob.extend_from_slice(&fnv1a(combined.as_bytes()).to_le_bytes());
            obj.binary = Some((Self::BINARY_FORMAT, blob));
        }
    }

    fn get_program_link_status(&mut self, program: u32) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn get_program_info_log(&mut self, program: u32) -> String {
        if self.get_program_link_status(program) {
            String::new()
        } else {
            "simulated link failure".to_owned()
        }
    }

    fn delete_program(&mut self, program: u32) {
        self.programs.remove(&program);
        self.record(format!("delete_program({program})"));
    }

    fn get_program_binary(&mut self, program: u32) -> Option<(u32, Vec<u8>)> {
        if self.deny_program_binaries {
            return None;
        }
        self.programs.get(&program).and_then(|p| p.binary.clone())
    }

    fn program_binary(&mut self, program: u32, format: u32, binary: &[u8]) {
        self.record(format!("program_binary({program}, 0x{format:x}, {})", binary.len()));
        let accept =
            !self.reject_binaries && format == Self::BINARY_FORMAT && binary.starts_with(b"SIMBIN");
        if let Some(obj) = self.programs.get_mut(&program) {
            obj.linked = accept;
            if accept {
                obj.binary = Some((format, binary.to_vec()));
            }
        }
    }

    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32 {
        // Stable per-name location; good enough for uniform plumbing.
        let _ = program;
        (fnv1a(name.as_bytes()) % 1024) as i32
    }

    fn uniform_1i(&mut self, location: i32, v: i32) {
        self.record(format!("uniform_1i({location}, {v})"));
    }

    fn uniform_1f(&mut self, location: i32, v: f32) {
        self.record(format!("uniform_1f({location}, {v})"));
    }

    fn uniform_2f(&mut self, location: i32, v0: f32, v1: f32) {
        self.record(format!("uniform_2f({location}, {v0}, {v1})"));
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.record(format!("draw_arrays(0x{mode:x}, {first}, {count})"));
    }

    fn draw_elements(&mut self, mode: u32, count: i32, index_type: u32, offset: usize) {
        self.record(format!(
            "draw_elements(0x{mode:x}, {count}, 0x{index_type:x}, {offset})"
        ));
    }

    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instances: i32) {
        self.record(format!(
            "draw_arrays_instanced(0x{mode:x}, {first}, {count}, {instances})"
        ));
    }

    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: usize,
        instances: i32,
    ) {
        self.record(format!(
            "draw_elements_instanced(0x{mode:x}, {count}, 0x{index_type:x}, {offset}, {instances})"
        ));
    }

    fn multi_draw_arrays(&mut self, mode: u32, firsts: &[i32], counts: &[i32]) {
        self.record(format!(
            "multi_draw_arrays(0x{mode:x}, {} draws)",
            firsts.len().min(counts.len())
        ));
    }

    fn multi_draw_elements(&mut self, mode: u32, counts: &[i32], index_type: u32, offsets: &[usize]) {
        self.record(format!(
            "multi_draw_elements(0x{mode:x}, {} draws, 0x{index_type:x})",
            counts.len().min(offsets.len())
        ));
    }

    fn fence_sync(&mut self) -> GlFence {
        let fence = self.next_fence;
        self.next_fence += 1;
        self.live_fences += 1;
        self.record(format!("fence_sync() -> {fence}"));
        fence
    }

    fn client_wait_sync(&mut self, fence: GlFence, _flags: u32, _timeout_ns: u64) -> u32 {
        self.record(format!("client_wait_sync({fence})"));
        if self.force_fence_timeout {
            consts::TIMEOUT_EXPIRED
        } else {
            consts::ALREADY_SIGNALED
        }
    }

    fn delete_sync(&mut self, fence: GlFence) {
        self.live_fences = self.live_fences.saturating_sub(1);
        self.record(format!("delete_sync({fence})"));
    }

    fn flush(&mut self) {
        self.record("flush()".to_owned());
    }

    fn finish(&mut self) {
        self.record("finish()".to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_contents_round_trip() {
        let mut gl = SimulatedGles::new();
        let buf = gl.gen_buffer();
        gl.bind_buffer(consts::ARRAY_BUFFER, buf);
        gl.buffer_data(consts::ARRAY_BUFFER, 8, None, consts::DYNAMIC_DRAW);
        gl.buffer_sub_data(consts::ARRAY_BUFFER, 2, &[1, 2, 3]);
        assert_eq!(gl.buffer_contents(buf).unwrap(), &[0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn fabricated_binaries_round_trip_through_program_binary() {
        let mut gl = SimulatedGles::new();
        let vs = gl.create_shader(consts::VERTEX_SHADER);
        gl.shader_source(vs, "void main() {}");
        gl.compile_shader(vs);
        let prog = gl.create_program();
        gl.attach_shader(prog, vs);
        gl.link_program(prog);
        let (format, blob) = gl.get_program_binary(prog).unwrap();

        let restored = gl.create_program();
        gl.program_binary(restored, format, &blob);
        assert!(gl.get_program_link_status(restored));
    }

    #[test]
    fn rejecting_binaries_fails_the_link_check() {
        let mut gl = SimulatedGles::new();
        gl.reject_binaries = true;
        let prog = gl.create_program();
        gl.program_binary(prog, SimulatedGles::BINARY_FORMAT, b"SIMBIN1234");
        assert!(!gl.get_program_link_status(prog));
    }

    #[test]
    fn call_count_matches_names_exactly() {
        let mut gl = SimulatedGles::new();
        gl.enable(consts::BLEND);
        gl.enable_vertex_attrib_array(0);
        assert_eq!(gl.call_count("enable"), 1);
        assert_eq!(gl.call_count("enable_vertex_attrib_array"), 1);
    }
}
