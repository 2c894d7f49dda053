//! Loader-backed GLES implementation.
//!
//! The platform layer owns the EGL display/surface/context; this type only
//! resolves and calls raw GLES entry points through the loader the platform
//! hands over. Surface operations (make-current, swap) are delegated back to
//! the platform through hooks.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use crate::error::VglError;
use crate::gles::{GlFence, GlesContext};

/// Platform entry-point lookup, the `eglGetProcAddress` shape.
pub type ProcLoader = dyn Fn(&str) -> *const c_void + Send;

type PresentHook = dyn FnMut() -> bool + Send;

macro_rules! gles_fns {
    ($( $field:ident : fn($($arg:ty),*) $(-> $ret:ty)? = $name:literal ;)*) => {
        struct Fns {
            $( $field: unsafe extern "C" fn($($arg),*) $(-> $ret)?, )*
        }

        impl Fns {
            fn load(loader: &ProcLoader) -> Result<Self, VglError> {
                $(
                    let ptr = loader($name);
                    if ptr.is_null() {
                        return Err(VglError::Unsupported($name));
                    }
                    // A non-null pointer from the platform loader is the
                    // declared entry point; the signature comes from the
                    // GLES 3.x headers.
                    let $field = unsafe {
                        std::mem::transmute::<
                            *const c_void,
                            unsafe extern "C" fn($($arg),*) $(-> $ret)?,
                        >(ptr)
                    };
                )*
                Ok(Self { $( $field, )* })
            }
        }
    };
}

gles_fns! {
    get_error: fn() -> u32 = "glGetError";
    get_string: fn(u32) -> *const u8 = "glGetString";
    get_integerv: fn(u32, *mut i32) = "glGetIntegerv";
    get_floatv: fn(u32, *mut f32) = "glGetFloatv";
    is_enabled: fn(u32) -> u8 = "glIsEnabled";

    enable: fn(u32) = "glEnable";
    disable: fn(u32) = "glDisable";
    blend_func_separate: fn(u32, u32, u32, u32) = "glBlendFuncSeparate";
    blend_equation_separate: fn(u32, u32) = "glBlendEquationSeparate";
    blend_color: fn(f32, f32, f32, f32) = "glBlendColor";
    depth_func: fn(u32) = "glDepthFunc";
    depth_mask: fn(u8) = "glDepthMask";
    depth_rangef: fn(f32, f32) = "glDepthRangef";
    stencil_func_separate: fn(u32, u32, i32, u32) = "glStencilFuncSeparate";
    stencil_op_separate: fn(u32, u32, u32, u32) = "glStencilOpSeparate";
    stencil_mask_separate: fn(u32, u32) = "glStencilMaskSeparate";
    cull_face: fn(u32) = "glCullFace";
    front_face: fn(u32) = "glFrontFace";
    line_width: fn(f32) = "glLineWidth";
    polygon_offset: fn(f32, f32) = "glPolygonOffset";
    viewport: fn(i32, i32, i32, i32) = "glViewport";
    scissor: fn(i32, i32, i32, i32) = "glScissor";
    color_mask: fn(u8, u8, u8, u8) = "glColorMask";
    clear: fn(u32) = "glClear";
    clear_color: fn(f32, f32, f32, f32) = "glClearColor";
    clear_depthf: fn(f32) = "glClearDepthf";
    clear_stencil: fn(i32) = "glClearStencil";

    active_texture: fn(u32) = "glActiveTexture";
    bind_texture: fn(u32, u32) = "glBindTexture";
    bind_sampler: fn(u32, u32) = "glBindSampler";
    bind_buffer: fn(u32, u32) = "glBindBuffer";
    bind_buffer_base: fn(u32, u32, u32) = "glBindBufferBase";
    bind_buffer_range: fn(u32, u32, u32, isize, isize) = "glBindBufferRange";
    bind_vertex_array: fn(u32) = "glBindVertexArray";
    bind_framebuffer: fn(u32, u32) = "glBindFramebuffer";
    use_program: fn(u32) = "glUseProgram";

    gen_buffers: fn(i32, *mut u32) = "glGenBuffers";
    delete_buffers: fn(i32, *const u32) = "glDeleteBuffers";
    gen_textures: fn(i32, *mut u32) = "glGenTextures";
    delete_textures: fn(i32, *const u32) = "glDeleteTextures";
    gen_framebuffers: fn(i32, *mut u32) = "glGenFramebuffers";
    delete_framebuffers: fn(i32, *const u32) = "glDeleteFramebuffers";
    gen_vertex_arrays: fn(i32, *mut u32) = "glGenVertexArrays";
    delete_vertex_arrays: fn(i32, *const u32) = "glDeleteVertexArrays";

    buffer_data: fn(u32, isize, *const c_void, u32) = "glBufferData";
    buffer_sub_data: fn(u32, isize, isize, *const c_void) = "glBufferSubData";
    map_buffer_range: fn(u32, isize, isize, u32) -> *mut c_void = "glMapBufferRange";
    unmap_buffer: fn(u32) -> u8 = "glUnmapBuffer";
    flush_mapped_buffer_range: fn(u32, isize, isize) = "glFlushMappedBufferRange";

    enable_vertex_attrib_array: fn(u32) = "glEnableVertexAttribArray";
    vertex_attrib_pointer: fn(u32, i32, u32, u8, i32, *const c_void) = "glVertexAttribPointer";

    tex_storage_2d: fn(u32, i32, u32, i32, i32) = "glTexStorage2D";
    tex_image_2d: fn(u32, i32, i32, i32, i32, i32, u32, u32, *const c_void) = "glTexImage2D";
    tex_parameteri: fn(u32, u32, i32) = "glTexParameteri";

    framebuffer_texture_2d: fn(u32, u32, u32, u32, i32) = "glFramebufferTexture2D";
    check_framebuffer_status: fn(u32) -> u32 = "glCheckFramebufferStatus";

    create_shader: fn(u32) -> u32 = "glCreateShader";
    shader_source: fn(u32, i32, *const *const c_char, *const i32) = "glShaderSource";
    compile_shader: fn(u32) = "glCompileShader";
    get_shaderiv: fn(u32, u32, *mut i32) = "glGetShaderiv";
    get_shader_info_log: fn(u32, i32, *mut i32, *mut c_char) = "glGetShaderInfoLog";
    delete_shader: fn(u32) = "glDeleteShader";
    create_program: fn() -> u32 = "glCreateProgram";
    attach_shader: fn(u32, u32) = "glAttachShader";
    link_program: fn(u32) = "glLinkProgram";
    get_programiv: fn(u32, u32, *mut i32) = "glGetProgramiv";
    get_program_info_log: fn(u32, i32, *mut i32, *mut c_char) = "glGetProgramInfoLog";
    delete_program: fn(u32) = "glDeleteProgram";
    get_program_binary: fn(u32, i32, *mut i32, *mut u32, *mut c_void) = "glGetProgramBinary";
    program_binary: fn(u32, u32, *const c_void, i32) = "glProgramBinary";
    get_uniform_location: fn(u32, *const c_char) -> i32 = "glGetUniformLocation";
    uniform_1i: fn(i32, i32) = "glUniform1i";
    uniform_1f: fn(i32, f32) = "glUniform1f";
    uniform_2f: fn(i32, f32, f32) = "glUniform2f";

    draw_arrays: fn(u32, i32, i32) = "glDrawArrays";
    draw_elements: fn(u32, i32, u32, *const c_void) = "glDrawElements";
    draw_arrays_instanced: fn(u32, i32, i32, i32) = "glDrawArraysInstanced";
    draw_elements_instanced: fn(u32, i32, u32, *const c_void, i32) = "glDrawElementsInstanced";

    fence_sync: fn(u32, u32) -> *const c_void = "glFenceSync";
    client_wait_sync: fn(*const c_void, u32, u64) -> u32 = "glClientWaitSync";
    delete_sync: fn(*const c_void) = "glDeleteSync";
    flush: fn() = "glFlush";
    finish: fn() = "glFinish";
}

/// Optional extension entry points, resolved best-effort.
struct ExtFns {
    buffer_storage: Option<unsafe extern "C" fn(u32, isize, *const c_void, u32)>,
    multi_draw_arrays: Option<unsafe extern "C" fn(u32, *const i32, *const i32, i32)>,
    multi_draw_elements:
        Option<unsafe extern "C" fn(u32, *const i32, u32, *const *const c_void, i32)>,
}

impl ExtFns {
    fn load(loader: &ProcLoader) -> Self {
        fn opt<T: Copy>(ptr: *const c_void) -> Option<T> {
            if ptr.is_null() {
                None
            } else {
                // Fn-pointer sized by construction; the name selects the type.
                Some(unsafe { std::mem::transmute_copy::<*const c_void, T>(&ptr) })
            }
        }

        let load_either = |a: &str, b: &str| {
            let ptr = loader(a);
            if ptr.is_null() {
                loader(b)
            } else {
                ptr
            }
        };

        Self {
            buffer_storage: opt(load_either("glBufferStorageEXT", "glBufferStorage")),
            multi_draw_arrays: opt(load_either("glMultiDrawArraysEXT", "glMultiDrawArrays")),
            multi_draw_elements: opt(load_either(
                "glMultiDrawElementsEXT",
                "glMultiDrawElements",
            )),
        }
    }
}

/// GLES implementation backed by loader-resolved entry points.
pub struct NativeGles {
    fns: Fns,
    ext: ExtFns,
    loader: Box<ProcLoader>,
    make_current_hook: Option<Box<PresentHook>>,
    swap_hook: Option<Box<PresentHook>>,
}

impl NativeGles {
    /// Resolve every required GLES 3.x entry point through `loader`.
    ///
    /// # Safety
    /// The loader must return pointers to entry points of a live GLES 3.x
    /// context that is current on the calling thread, and every later call
    /// through the returned value must happen on the thread the context is
    /// current on.
    pub unsafe fn from_loader(loader: Box<ProcLoader>) -> Result<Self, VglError> {
        let fns = Fns::load(&*loader)?;
        let ext = ExtFns::load(&*loader);
        Ok(Self {
            fns,
            ext,
            loader,
            make_current_hook: None,
            swap_hook: None,
        })
    }

    /// Install platform hooks for make-current and buffer-swap (the
    /// EGL surface operations stay with the platform layer).
    pub fn with_present_hooks(
        mut self,
        make_current: impl FnMut() -> bool + Send + 'static,
        swap: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        self.make_current_hook = Some(Box::new(make_current));
        self.swap_hook = Some(Box::new(swap));
        self
    }

    pub fn supports_multi_draw(&self) -> bool {
        self.ext.multi_draw_arrays.is_some() && self.ext.multi_draw_elements.is_some()
    }

    pub fn supports_buffer_storage(&self) -> bool {
        self.ext.buffer_storage.is_some()
    }

    fn read_log(
        &mut self,
        object: u32,
        len_query: impl FnOnce(&Fns, u32, *mut i32),
        log_query: impl FnOnce(&Fns, u32, i32, *mut i32, *mut c_char),
    ) -> String {
        let mut len = 0i32;
        len_query(&self.fns, object, &mut len);
        if len <= 1 {
            return String::new();
        }
        let mut buf = vec![0u8; len as usize];
        let mut written = 0i32;
        log_query(&self.fns, object, len, &mut written, buf.as_mut_ptr().cast());
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl GlesContext for NativeGles {
    fn description(&self) -> &'static str {
        "native GLES 3.x"
    }

    fn make_current(&mut self) -> bool {
        match &mut self.make_current_hook {
            Some(hook) => hook(),
            None => true,
        }
    }

    fn swap_buffers(&mut self) {
        if let Some(hook) = &mut self.swap_hook {
            hook();
        }
    }

    fn native_proc_address(&self, name: &str) -> *const c_void {
        (self.loader)(name)
    }

    fn get_error(&mut self) -> u32 {
        unsafe { (self.fns.get_error)() }
    }

    fn get_string(&mut self, name: u32) -> String {
        let ptr = unsafe { (self.fns.get_string)(name) };
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr.cast()) }
            .to_string_lossy()
            .into_owned()
    }

    fn get_integer(&mut self, pname: u32) -> i32 {
        let mut v = 0i32;
        unsafe { (self.fns.get_integerv)(pname, &mut v) };
        v
    }

    fn get_float(&mut self, pname: u32) -> f32 {
        let mut v = 0f32;
        unsafe { (self.fns.get_floatv)(pname, &mut v) };
        v
    }

    fn is_enabled(&mut self, cap: u32) -> bool {
        unsafe { (self.fns.is_enabled)(cap) != 0 }
    }

    fn enable(&mut self, cap: u32) {
        unsafe { (self.fns.enable)(cap) }
    }

    fn disable(&mut self, cap: u32) {
        unsafe { (self.fns.disable)(cap) }
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe { (self.fns.blend_func_separate)(src_rgb, dst_rgb, src_alpha, dst_alpha) }
    }

    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        unsafe { (self.fns.blend_equation_separate)(mode_rgb, mode_alpha) }
    }

    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { (self.fns.blend_color)(r, g, b, a) }
    }

    fn depth_func(&mut self, func: u32) {
        unsafe { (self.fns.depth_func)(func) }
    }

    fn depth_mask(&mut self, flag: bool) {
        unsafe { (self.fns.depth_mask)(flag as u8) }
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        unsafe { (self.fns.depth_rangef)(near, far) }
    }

    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        unsafe { (self.fns.stencil_func_separate)(face, func, reference, mask) }
    }

    fn stencil_op_separate(&mut self, face: u32, sfail: u32, dpfail: u32, dppass: u32) {
        unsafe { (self.fns.stencil_op_separate)(face, sfail, dpfail, dppass) }
    }

    fn stencil_mask_separate(&mut self, face: u32, mask: u32) {
        unsafe { (self.fns.stencil_mask_separate)(face, mask) }
    }

    fn cull_face(&mut self, mode: u32) {
        unsafe { (self.fns.cull_face)(mode) }
    }

    fn front_face(&mut self, mode: u32) {
        unsafe { (self.fns.front_face)(mode) }
    }

    fn line_width(&mut self, width: f32) {
        unsafe { (self.fns.line_width)(width) }
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        unsafe { (self.fns.polygon_offset)(factor, units) }
    }

    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        unsafe { (self.fns.viewport)(x, y, w, h) }
    }

    fn scissor(&mut self, x: i32, y: i32, w: i32, h: i32) {
        unsafe { (self.fns.scissor)(x, y, w, h) }
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { (self.fns.color_mask)(r as u8, g as u8, b as u8, a as u8) }
    }

    fn clear(&mut self, mask: u32) {
        unsafe { (self.fns.clear)(mask) }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { (self.fns.clear_color)(r, g, b, a) }
    }

    fn clear_depth(&mut self, depth: f32) {
        unsafe { (self.fns.clear_depthf)(depth) }
    }

    fn clear_stencil(&mut self, stencil: i32) {
        unsafe { (self.fns.clear_stencil)(stencil) }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { (self.fns.active_texture)(unit) }
    }

    fn bind_texture(&mut self, target: u32, texture: u32) {
        unsafe { (self.fns.bind_texture)(target, texture) }
    }

    fn bind_sampler(&mut self, unit: u32, sampler: u32) {
        unsafe { (self.fns.bind_sampler)(unit, sampler) }
    }

    fn bind_buffer(&mut self, target: u32, buffer: u32) {
        unsafe { (self.fns.bind_buffer)(target, buffer) }
    }

    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: u32) {
        unsafe { (self.fns.bind_buffer_base)(target, index, buffer) }
    }

    fn bind_buffer_range(&mut self, target: u32, index: u32, buffer: u32, offset: usize, size: usize) {
        unsafe { (self.fns.bind_buffer_range)(target, index, buffer, offset as isize, size as isize) }
    }

    fn bind_vertex_array(&mut self, vao: u32) {
        unsafe { (self.fns.bind_vertex_array)(vao) }
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: u32) {
        unsafe { (self.fns.bind_framebuffer)(target, framebuffer) }
    }

    fn use_program(&mut self, program: u32) {
        unsafe { (self.fns.use_program)(program) }
    }

    fn gen_buffer(&mut self) -> u32 {
        let mut name = 0u32;
        unsafe { (self.fns.gen_buffers)(1, &mut name) };
        name
    }

    fn delete_buffer(&mut self, buffer: u32) {
        unsafe { (self.fns.delete_buffers)(1, &buffer) }
    }

    fn gen_texture(&mut self) -> u32 {
        let mut name = 0u32;
        unsafe { (self.fns.gen_textures)(1, &mut name) };
        name
    }

    fn delete_texture(&mut self, texture: u32) {
        unsafe { (self.fns.delete_textures)(1, &texture) }
    }

    fn gen_framebuffer(&mut self) -> u32 {
        let mut name = 0u32;
        unsafe { (self.fns.gen_framebuffers)(1, &mut name) };
        name
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        unsafe { (self.fns.delete_framebuffers)(1, &framebuffer) }
    }

    fn gen_vertex_array(&mut self) -> u32 {
        let mut name = 0u32;
        unsafe { (self.fns.gen_vertex_arrays)(1, &mut name) };
        name
    }

    fn delete_vertex_array(&mut self, vao: u32) {
        unsafe { (self.fns.delete_vertex_arrays)(1, &vao) }
    }

    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32) {
        let ptr = data.map_or(std::ptr::null(), |d| d.as_ptr().cast());
        unsafe { (self.fns.buffer_data)(target, size as isize, ptr, usage) }
    }

    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]) {
        unsafe {
            (self.fns.buffer_sub_data)(
                target,
                offset as isize,
                data.len() as isize,
                data.as_ptr().cast(),
            )
        }
    }

    fn buffer_storage(&mut self, target: u32, size: usize, flags: u32) -> bool {
        match self.ext.buffer_storage {
            Some(f) => {
                unsafe { f(target, size as isize, std::ptr::null(), flags) };
                true
            }
            None => false,
        }
    }

    fn map_buffer_range(&mut self, target: u32, offset: usize, length: usize, access: u32) -> *mut u8 {
        unsafe {
            (self.fns.map_buffer_range)(target, offset as isize, length as isize, access).cast()
        }
    }

    fn unmap_buffer(&mut self, target: u32) -> bool {
        unsafe { (self.fns.unmap_buffer)(target) != 0 }
    }

    fn flush_mapped_buffer_range(&mut self, target: u32, offset: usize, length: usize) {
        unsafe { (self.fns.flush_mapped_buffer_range)(target, offset as isize, length as isize) }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { (self.fns.enable_vertex_attrib_array)(index) }
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
        unsafe {
            (self.fns.vertex_attrib_pointer)(
                index,
                size,
                ty,
                normalized as u8,
                stride,
                offset as *const c_void,
            )
        }
    }

    fn tex_storage_2d(&mut self, target: u32, levels: i32, internal_format: u32, w: i32, h: i32) {
        unsafe { (self.fns.tex_storage_2d)(target, levels, internal_format, w, h) }
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
        pixels: *const c_void,
    ) {
        unsafe {
            (self.fns.tex_image_2d)(
                target,
                level,
                internal_format as i32,
                w,
                h,
                0,
                format,
                ty,
                pixels,
            )
        }
    }

    fn tex_parameter_i(&mut self, target: u32, pname: u32, param: i32) {
        unsafe { (self.fns.tex_parameteri)(target, pname, param) }
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: u32,
        level: i32,
    ) {
        unsafe { (self.fns.framebuffer_texture_2d)(target, attachment, textarget, texture, level) }
    }

    fn check_framebuffer_status(&mut self, target: u32) -> u32 {
        unsafe { (self.fns.check_framebuffer_status)(target) }
    }

    fn create_shader(&mut self, ty: u32) -> u32 {
        unsafe { (self.fns.create_shader)(ty) }
    }

    fn shader_source(&mut self, shader: u32, source: &str) {
        let source = CString::new(source.replace('\0', " ")).expect("nul bytes stripped");
        let ptr = source.as_ptr();
        let len = source.as_bytes().len() as i32;
        unsafe { (self.fns.shader_source)(shader, 1, &ptr, &len) }
    }

    fn compile_shader(&mut self, shader: u32) {
        unsafe { (self.fns.compile_shader)(shader) }
    }

    fn get_shader_compile_status(&mut self, shader: u32) -> bool {
        let mut status = 0i32;
        unsafe { (self.fns.get_shaderiv)(shader, super::consts::COMPILE_STATUS, &mut status) };
        status != 0
    }

    fn get_shader_info_log(&mut self, shader: u32) -> String {
        const INFO_LOG_LENGTH: u32 = 0x8B84;
        self.read_log(
            shader,
            |fns, s, out| unsafe { (fns.get_shaderiv)(s, INFO_LOG_LENGTH, out) },
            |fns, s, cap, written, buf| unsafe { (fns.get_shader_info_log)(s, cap, written, buf) },
        )
    }

    fn delete_shader(&mut self, shader: u32) {
        unsafe { (self.fns.delete_shader)(shader) }
    }

    fn create_program(&mut self) -> u32 {
        unsafe { (self.fns.create_program)() }
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        unsafe { (self.fns.attach_shader)(program, shader) }
    }

    fn link_program(&mut self, program: u32) {
        unsafe { (self.fns.link_program)(program) }
    }

    fn get_program_link_status(&mut self, program: u32) -> bool {
        let mut status = 0i32;
        unsafe { (self.fns.get_programiv)(program, super::consts::LINK_STATUS, &mut status) };
        status != 0
    }

    fn get_program_info_log(&mut self, program: u32) -> String {
        const INFO_LOG_LENGTH: u32 = 0x8B84;
        self.read_log(
            program,
            |fns, p, out| unsafe { (fns.get_programiv)(p, INFO_LOG_LENGTH, out) },
            |fns, p, cap, written, buf| unsafe { (fns.get_program_info_log)(p, cap, written, buf) },
        )
    }

    fn delete_program(&mut self, program: u32) {
        unsafe { (self.fns.delete_program)(program) }
    }

    fn get_program_binary(&mut self, program: u32) -> Option<(u32, Vec<u8>)> {
        let mut len = 0i32;
        unsafe {
            (self.fns.get_programiv)(program, super::consts::PROGRAM_BINARY_LENGTH, &mut len)
        };
        if len <= 0 {
            return None;
        }
        let mut blob = vec![0u8; len as usize];
        let mut written = 0i32;
        let mut format = 0u32;
        unsafe {
            (self.fns.get_program_binary)(
                program,
                len,
                &mut written,
                &mut format,
                blob.as_mut_ptr().cast(),
            )
        };
        if written <= 0 || unsafe { (self.fns.get_error)() } != super::consts::NO_ERROR {
            return None;
        }
        blob.truncate(written as usize);
        Some((format, blob))
    }

    fn program_binary(&mut self, program: u32, format: u32, binary: &[u8]) {
        unsafe {
            (self.fns.program_binary)(program, format, binary.as_ptr().cast(), binary.len() as i32)
        }
    }

    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32 {
        let name = CString::new(name).unwrap_or_default();
        unsafe { (self.fns.get_uniform_location)(program, name.as_ptr()) }
    }

    fn uniform_1i(&mut self, location: i32, v: i32) {
        unsafe { (self.fns.uniform_1i)(location, v) }
    }

    fn uniform_1f(&mut self, location: i32, v: f32) {
        unsafe { (self.fns.uniform_1f)(location, v) }
    }

    fn uniform_2f(&mut self, location: i32, v0: f32, v1: f32) {
        unsafe { (self.fns.uniform_2f)(location, v0, v1) }
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        unsafe { (self.fns.draw_arrays)(mode, first, count) }
    }

    fn draw_elements(&mut self, mode: u32, count: i32, index_type: u32, offset: usize) {
        unsafe { (self.fns.draw_elements)(mode, count, index_type, offset as *const c_void) }
    }

    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instances: i32) {
        unsafe { (self.fns.draw_arrays_instanced)(mode, first, count, instances) }
    }

    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: usize,
        instances: i32,
    ) {
        unsafe {
            (self.fns.draw_elements_instanced)(
                mode,
                count,
                index_type,
                offset as *const c_void,
                instances,
            )
        }
    }

    fn multi_draw_arrays(&mut self, mode: u32, firsts: &[i32], counts: &[i32]) {
        debug_assert_eq!(firsts.len(), counts.len());
        match self.ext.multi_draw_arrays {
            Some(f) => unsafe {
                f(mode, firsts.as_ptr(), counts.as_ptr(), firsts.len() as i32)
            },
            None => {
                for (&first, &count) in firsts.iter().zip(counts) {
                    unsafe { (self.fns.draw_arrays)(mode, first, count) };
                }
            }
        }
    }

    fn multi_draw_elements(&mut self, mode: u32, counts: &[i32], index_type: u32, offsets: &[usize]) {
        debug_assert_eq!(counts.len(), offsets.len());
        match self.ext.multi_draw_elements {
            Some(f) => {
                let ptrs: Vec<*const c_void> =
                    offsets.iter().map(|&o| o as *const c_void).collect();
                unsafe { f(mode, counts.as_ptr(), index_type, ptrs.as_ptr(), counts.len() as i32) }
            }
            None => {
                for (&count, &offset) in counts.iter().zip(offsets) {
                    unsafe {
                        (self.fns.draw_elements)(mode, count, index_type, offset as *const c_void)
                    };
                }
            }
        }
    }

    fn fence_sync(&mut self) -> GlFence {
        let sync = unsafe { (self.fns.fence_sync)(super::consts::SYNC_GPU_COMMANDS_COMPLETE, 0) };
        sync as GlFence
    }

    fn client_wait_sync(&mut self, fence: GlFence, flags: u32, timeout_ns: u64) -> u32 {
        unsafe { (self.fns.client_wait_sync)(fence as *const c_void, flags, timeout_ns) }
    }

    fn delete_sync(&mut self, fence: GlFence) {
        unsafe { (self.fns.delete_sync)(fence as *const c_void) }
    }

    fn flush(&mut self) {
        unsafe { (self.fns.flush)() }
    }

    fn finish(&mut self) {
        unsafe { (self.fns.finish)() }
    }
}
