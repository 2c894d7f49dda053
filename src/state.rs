//! Pipeline state mirror and redundant-call filter.
//!
//! One interceptor per tracked entry point: the incoming value is compared
//! against the mirror and only forwarded when it differs (or when the slot
//! has been invalidated). Between two consecutive entry-point calls on the
//! rendering thread, every known slot equals the device's view.

use tracing::{debug, error, warn};

use crate::error::gl_error_name;
use crate::gles::{consts, GlesContext};

pub const MAX_TEXTURE_UNITS: usize = 32;
const MAX_STATE_STACK: usize = 16;

const TRACKED_BUFFER_TARGETS: [u32; 10] = [
    consts::ARRAY_BUFFER,
    consts::ELEMENT_ARRAY_BUFFER,
    consts::UNIFORM_BUFFER,
    consts::SHADER_STORAGE_BUFFER,
    consts::COPY_READ_BUFFER,
    consts::COPY_WRITE_BUFFER,
    consts::PIXEL_PACK_BUFFER,
    consts::PIXEL_UNPACK_BUFFER,
    consts::TRANSFORM_FEEDBACK_BUFFER,
    consts::DRAW_INDIRECT_BUFFER,
];

/// One tracked value plus a validity flag.
///
/// An unknown slot never compares equal, so the next set after an
/// invalidation forwards unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot<T> {
    value: T,
    known: bool,
}

impl<T: Copy + PartialEq> Slot<T> {
    fn new(default: T) -> Self {
        Slot {
            value: default,
            known: false,
        }
    }

    fn get(&self) -> T {
        self.value
    }

    fn invalidate(&mut self) {
        self.known = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BlendState {
    enabled: Slot<bool>,
    func: Slot<(u32, u32, u32, u32)>,
    equation: Slot<(u32, u32)>,
    color: Slot<[f32; 4]>,
}

impl BlendState {
    fn defaults() -> Self {
        Self {
            enabled: Slot::new(false),
            func: Slot::new((consts::ONE, consts::ZERO, consts::ONE, consts::ZERO)),
            equation: Slot::new((consts::FUNC_ADD, consts::FUNC_ADD)),
            color: Slot::new([0.0; 4]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DepthState {
    test_enabled: Slot<bool>,
    write_enabled: Slot<bool>,
    func: Slot<u32>,
    range: Slot<(f32, f32)>,
}

impl DepthState {
    fn defaults() -> Self {
        Self {
            test_enabled: Slot::new(false),
            write_enabled: Slot::new(true),
            func: Slot::new(consts::LESS),
            range: Slot::new((0.0, 1.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StencilSide {
    func: Slot<(u32, i32, u32)>,
    ops: Slot<(u32, u32, u32)>,
    write_mask: Slot<u32>,
}

impl StencilSide {
    fn defaults() -> Self {
        Self {
            func: Slot::new((consts::ALWAYS, 0, u32::MAX)),
            ops: Slot::new((consts::KEEP, consts::KEEP, consts::KEEP)),
            write_mask: Slot::new(u32::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RasterizerState {
    cull_enabled: Slot<bool>,
    cull_mode: Slot<u32>,
    front_face: Slot<u32>,
    scissor_enabled: Slot<bool>,
    scissor: Slot<[i32; 4]>,
    viewport: Slot<[i32; 4]>,
    line_width: Slot<f32>,
    polygon_offset: Slot<(f32, f32)>,
    color_mask: Slot<(bool, bool, bool, bool)>,
}

impl RasterizerState {
    fn defaults() -> Self {
        Self {
            cull_enabled: Slot::new(false),
            cull_mode: Slot::new(consts::BACK),
            front_face: Slot::new(consts::CCW),
            scissor_enabled: Slot::new(false),
            scissor: Slot::new([0; 4]),
            viewport: Slot::new([0; 4]),
            line_width: Slot::new(1.0),
            polygon_offset: Slot::new((0.0, 0.0)),
            color_mask: Slot::new((true, true, true, true)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TextureUnit {
    tex_2d: Slot<u32>,
    tex_3d: Slot<u32>,
    tex_cube: Slot<u32>,
    tex_2d_array: Slot<u32>,
    sampler: Slot<u32>,
}

impl TextureUnit {
    fn defaults() -> Self {
        Self {
            tex_2d: Slot::new(0),
            tex_3d: Slot::new(0),
            tex_cube: Slot::new(0),
            tex_2d_array: Slot::new(0),
            sampler: Slot::new(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BufferBindings {
    array: Slot<u32>,
    element: Slot<u32>,
    uniform: Slot<u32>,
    shader_storage: Slot<u32>,
    copy_read: Slot<u32>,
    copy_write: Slot<u32>,
    pixel_pack: Slot<u32>,
    pixel_unpack: Slot<u32>,
    transform_feedback: Slot<u32>,
    draw_indirect: Slot<u32>,
}

impl BufferBindings {
    fn defaults() -> Self {
        Self {
            array: Slot::new(0),
            element: Slot::new(0),
            uniform: Slot::new(0),
            shader_storage: Slot::new(0),
            copy_read: Slot::new(0),
            copy_write: Slot::new(0),
            pixel_pack: Slot::new(0),
            pixel_unpack: Slot::new(0),
            transform_feedback: Slot::new(0),
            draw_indirect: Slot::new(0),
        }
    }

    fn slot(&mut self, target: u32) -> Option<&mut Slot<u32>> {
        Some(match target {
            consts::ARRAY_BUFFER => &mut self.array,
            consts::ELEMENT_ARRAY_BUFFER => &mut self.element,
            consts::UNIFORM_BUFFER => &mut self.uniform,
            consts::SHADER_STORAGE_BUFFER => &mut self.shader_storage,
            consts::COPY_READ_BUFFER => &mut self.copy_read,
            consts::COPY_WRITE_BUFFER => &mut self.copy_write,
            consts::PIXEL_PACK_BUFFER => &mut self.pixel_pack,
            consts::PIXEL_UNPACK_BUFFER => &mut self.pixel_unpack,
            consts::TRANSFORM_FEEDBACK_BUFFER => &mut self.transform_feedback,
            consts::DRAW_INDIRECT_BUFFER => &mut self.draw_indirect,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PipelineMirror {
    blend: BlendState,
    depth: DepthState,
    stencil_enabled: Slot<bool>,
    stencil_front: StencilSide,
    stencil_back: StencilSide,
    raster: RasterizerState,
    clear_color: Slot<[f32; 4]>,
    clear_depth: Slot<f32>,
    clear_stencil: Slot<i32>,
    active_unit: Slot<u32>,
    units: [TextureUnit; MAX_TEXTURE_UNITS],
    buffers: BufferBindings,
    draw_framebuffer: Slot<u32>,
    read_framebuffer: Slot<u32>,
    program: Slot<u32>,
    vertex_array: Slot<u32>,
}

impl PipelineMirror {
    fn defaults() -> Self {
        Self {
            blend: BlendState::defaults(),
            depth: DepthState::defaults(),
            stencil_enabled: Slot::new(false),
            stencil_front: StencilSide::defaults(),
            stencil_back: StencilSide::defaults(),
            raster: RasterizerState::defaults(),
            clear_color: Slot::new([0.0; 4]),
            clear_depth: Slot::new(1.0),
            clear_stencil: Slot::new(0),
            active_unit: Slot::new(0),
            units: [TextureUnit::defaults(); MAX_TEXTURE_UNITS],
            buffers: BufferBindings::defaults(),
            draw_framebuffer: Slot::new(0),
            read_framebuffer: Slot::new(0),
            program: Slot::new(0),
            vertex_array: Slot::new(0),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    changed: u32,
    avoided: u32,
}

/// Decide whether a set must be forwarded, updating mirror and counters.
fn set<T: Copy + PartialEq>(counters: &mut Counters, slot: &mut Slot<T>, value: T) -> bool {
    if slot.known && slot.value == value {
        counters.avoided += 1;
        false
    } else {
        slot.value = value;
        slot.known = true;
        counters.changed += 1;
        true
    }
}

/// Redundant-call filter in front of every tracked GL entry point.
pub struct StateTracker {
    mirror: PipelineMirror,
    stack: Vec<PipelineMirror>,
    counters: Counters,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            mirror: PipelineMirror::defaults(),
            stack: Vec::with_capacity(MAX_STATE_STACK),
            counters: Counters::default(),
        }
    }

    pub fn changed(&self) -> u32 {
        self.counters.changed
    }

    pub fn avoided(&self) -> u32 {
        self.counters.avoided
    }

    pub fn reset_counters(&mut self) {
        self.counters = Counters::default();
    }

    /// Forget everything: the next set of any slot forwards unconditionally.
    ///
    /// Mandatory after make-current, after any internal subsystem issued GL
    /// directly (batcher flush, scaler passes) and after any call the
    /// tracker cannot model.
    pub fn invalidate_all(&mut self) {
        let m = &mut self.mirror;
        m.blend.enabled.invalidate();
        m.blend.func.invalidate();
        m.blend.equation.invalidate();
        m.blend.color.invalidate();
        m.depth.test_enabled.invalidate();
        m.depth.write_enabled.invalidate();
        m.depth.func.invalidate();
        m.depth.range.invalidate();
        m.stencil_enabled.invalidate();
        for side in [&mut m.stencil_front, &mut m.stencil_back] {
            side.func.invalidate();
            side.ops.invalidate();
            side.write_mask.invalidate();
        }
        m.raster.cull_enabled.invalidate();
        m.raster.cull_mode.invalidate();
        m.raster.front_face.invalidate();
        m.raster.scissor_enabled.invalidate();
        m.raster.scissor.invalidate();
        m.raster.viewport.invalidate();
        m.raster.line_width.invalidate();
        m.raster.polygon_offset.invalidate();
        m.raster.color_mask.invalidate();
        m.clear_color.invalidate();
        m.clear_depth.invalidate();
        m.clear_stencil.invalidate();
        m.active_unit.invalidate();
        for unit in &mut m.units {
            unit.tex_2d.invalidate();
            unit.tex_3d.invalidate();
            unit.tex_cube.invalidate();
            unit.tex_2d_array.invalidate();
            unit.sampler.invalidate();
        }
        for target in TRACKED_BUFFER_TARGETS {
            if let Some(slot) = m.buffers.slot(target) {
                slot.invalidate();
            }
        }
        m.draw_framebuffer.invalidate();
        m.read_framebuffer.invalidate();
        m.program.invalidate();
        m.vertex_array.invalidate();
        debug!("state mirror invalidated");
    }

    /// Forget only the buffer bindings and the VAO (used after pool and
    /// ring traffic rebinds buffer targets underneath the interceptors).
    pub fn invalidate_buffer_bindings(&mut self) {
        for target in TRACKED_BUFFER_TARGETS {
            if let Some(slot) = self.mirror.buffers.slot(target) {
                slot.invalidate();
            }
        }
        self.mirror.vertex_array.invalidate();
    }

    /// Forget texture-unit bindings only.
    pub fn invalidate_texture_bindings(&mut self) {
        self.mirror.active_unit.invalidate();
        for unit in &mut self.mirror.units {
            unit.tex_2d.invalidate();
            unit.tex_3d.invalidate();
            unit.tex_cube.invalidate();
            unit.tex_2d_array.invalidate();
            unit.sampler.invalidate();
        }
    }

    /// Restore GL default values and forget validity, so every subsequent
    /// setter forwards once.
    pub fn reset(&mut self) {
        self.mirror = PipelineMirror::defaults();
    }

    // ---- enable / disable ----

    fn cap_slot(&mut self, cap: u32) -> Option<&mut Slot<bool>> {
        Some(match cap {
            consts::BLEND => &mut self.mirror.blend.enabled,
            consts::DEPTH_TEST => &mut self.mirror.depth.test_enabled,
            consts::STENCIL_TEST => &mut self.mirror.stencil_enabled,
            consts::CULL_FACE => &mut self.mirror.raster.cull_enabled,
            consts::SCISSOR_TEST => &mut self.mirror.raster.scissor_enabled,
            _ => return None,
        })
    }

    fn set_cap(&mut self, gl: &mut dyn GlesContext, cap: u32, on: bool) {
        let counters = &mut self.counters;
        let forward = match cap {
            consts::BLEND => set(counters, &mut self.mirror.blend.enabled, on),
            consts::DEPTH_TEST => set(counters, &mut self.mirror.depth.test_enabled, on),
            consts::STENCIL_TEST => set(counters, &mut self.mirror.stencil_enabled, on),
            consts::CULL_FACE => set(counters, &mut self.mirror.raster.cull_enabled, on),
            consts::SCISSOR_TEST => set(counters, &mut self.mirror.raster.scissor_enabled, on),
            // Untracked capability: always forward.
            _ => {
                counters.changed += 1;
                true
            }
        };
        if forward {
            if on {
                gl.enable(cap);
            } else {
                gl.disable(cap);
            }
        }
    }

    pub fn enable(&mut self, gl: &mut dyn GlesContext, cap: u32) {
        self.set_cap(gl, cap, true);
    }

    pub fn disable(&mut self, gl: &mut dyn GlesContext, cap: u32) {
        self.set_cap(gl, cap, false);
    }

    pub fn is_enabled(&mut self, gl: &mut dyn GlesContext, cap: u32) -> bool {
        match self.cap_slot(cap) {
            Some(slot) if slot.known => slot.get(),
            _ => gl.is_enabled(cap),
        }
    }

    // ---- blend ----

    pub fn blend_func(&mut self, gl: &mut dyn GlesContext, src: u32, dst: u32) {
        self.blend_func_separate(gl, src, dst, src, dst);
    }

    pub fn blend_func_separate(
        &mut self,
        gl: &mut dyn GlesContext,
        src_rgb: u32,
        dst_rgb: u32,
        src_alpha: u32,
        dst_alpha: u32,
    ) {
        let tuple = (src_rgb, dst_rgb, src_alpha, dst_alpha);
        if set(&mut self.counters, &mut self.mirror.blend.func, tuple) {
            gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        }
    }

    pub fn blend_equation(&mut self, gl: &mut dyn GlesContext, mode: u32) {
        self.blend_equation_separate(gl, mode, mode);
    }

    pub fn blend_equation_separate(&mut self, gl: &mut dyn GlesContext, rgb: u32, alpha: u32) {
        if set(&mut self.counters, &mut self.mirror.blend.equation, (rgb, alpha)) {
            gl.blend_equation_separate(rgb, alpha);
        }
    }

    pub fn blend_color(&mut self, gl: &mut dyn GlesContext, r: f32, g: f32, b: f32, a: f32) {
        if set(&mut self.counters, &mut self.mirror.blend.color, [r, g, b, a]) {
            gl.blend_color(r, g, b, a);
        }
    }

    // ---- depth ----

    pub fn depth_func(&mut self, gl: &mut dyn GlesContext, func: u32) {
        if set(&mut self.counters, &mut self.mirror.depth.func, func) {
            gl.depth_func(func);
        }
    }

    pub fn depth_mask(&mut self, gl: &mut dyn GlesContext, flag: bool) {
        if set(&mut self.counters, &mut self.mirror.depth.write_enabled, flag) {
            gl.depth_mask(flag);
        }
    }

    pub fn depth_range(&mut self, gl: &mut dyn GlesContext, near: f32, far: f32) {
        if set(&mut self.counters, &mut self.mirror.depth.range, (near, far)) {
            gl.depth_range(near, far);
        }
    }

    // ---- stencil ----

    fn stencil_sides(&mut self, face: u32) -> (bool, bool) {
        match face {
            consts::FRONT => (true, false),
            consts::BACK => (false, true),
            _ => (true, true),
        }
    }

    pub fn stencil_func_separate(
        &mut self,
        gl: &mut dyn GlesContext,
        face: u32,
        func: u32,
        reference: i32,
        mask: u32,
    ) {
        let (front, back) = self.stencil_sides(face);
        let tuple = (func, reference, mask);
        let mut forward = false;
        if front {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_front.func, tuple);
        }
        if back {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_back.func, tuple);
        }
        if forward {
            gl.stencil_func_separate(face, func, reference, mask);
        }
    }

    pub fn stencil_func(&mut self, gl: &mut dyn GlesContext, func: u32, reference: i32, mask: u32) {
        self.stencil_func_separate(gl, consts::FRONT_AND_BACK, func, reference, mask);
    }

    pub fn stencil_op_separate(
        &mut self,
        gl: &mut dyn GlesContext,
        face: u32,
        sfail: u32,
        dpfail: u32,
        dppass: u32,
    ) {
        let (front, back) = self.stencil_sides(face);
        let tuple = (sfail, dpfail, dppass);
        let mut forward = false;
        if front {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_front.ops, tuple);
        }
        if back {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_back.ops, tuple);
        }
        if forward {
            gl.stencil_op_separate(face, sfail, dpfail, dppass);
        }
    }

    pub fn stencil_op(&mut self, gl: &mut dyn GlesContext, sfail: u32, dpfail: u32, dppass: u32) {
        self.stencil_op_separate(gl, consts::FRONT_AND_BACK, sfail, dpfail, dppass);
    }

    pub fn stencil_mask_separate(&mut self, gl: &mut dyn GlesContext, face: u32, mask: u32) {
        let (front, back) = self.stencil_sides(face);
        let mut forward = false;
        if front {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_front.write_mask, mask);
        }
        if back {
            forward |= set(&mut self.counters, &mut self.mirror.stencil_back.write_mask, mask);
        }
        if forward {
            gl.stencil_mask_separate(face, mask);
        }
    }

    pub fn stencil_mask(&mut self, gl: &mut dyn GlesContext, mask: u32) {
        self.stencil_mask_separate(gl, consts::FRONT_AND_BACK, mask);
    }

    // ---- rasterizer ----

    pub fn cull_face(&mut self, gl: &mut dyn GlesContext, mode: u32) {
        if set(&mut self.counters, &mut self.mirror.raster.cull_mode, mode) {
            gl.cull_face(mode);
        }
    }

    pub fn front_face(&mut self, gl: &mut dyn GlesContext, mode: u32) {
        if set(&mut self.counters, &mut self.mirror.raster.front_face, mode) {
            gl.front_face(mode);
        }
    }

    pub fn line_width(&mut self, gl: &mut dyn GlesContext, width: f32) {
        if set(&mut self.counters, &mut self.mirror.raster.line_width, width) {
            gl.line_width(width);
        }
    }

    pub fn polygon_offset(&mut self, gl: &mut dyn GlesContext, factor: f32, units: f32) {
        if set(&mut self.counters, &mut self.mirror.raster.polygon_offset, (factor, units)) {
            gl.polygon_offset(factor, units);
        }
    }

    pub fn viewport(&mut self, gl: &mut dyn GlesContext, x: i32, y: i32, w: i32, h: i32) {
        if set(&mut self.counters, &mut self.mirror.raster.viewport, [x, y, w, h]) {
            gl.viewport(x, y, w, h);
        }
    }

    pub fn scissor(&mut self, gl: &mut dyn GlesContext, x: i32, y: i32, w: i32, h: i32) {
        if set(&mut self.counters, &mut self.mirror.raster.scissor, [x, y, w, h]) {
            gl.scissor(x, y, w, h);
        }
    }

    pub fn color_mask(&mut self, gl: &mut dyn GlesContext, r: bool, g: bool, b: bool, a: bool) {
        if set(&mut self.counters, &mut self.mirror.raster.color_mask, (r, g, b, a)) {
            gl.color_mask(r, g, b, a);
        }
    }

    // ---- clear values ----

    pub fn clear_color(&mut self, gl: &mut dyn GlesContext, r: f32, g: f32, b: f32, a: f32) {
        if set(&mut self.counters, &mut self.mirror.clear_color, [r, g, b, a]) {
            gl.clear_color(r, g, b, a);
        }
    }

    pub fn clear_depth(&mut self, gl: &mut dyn GlesContext, depth: f32) {
        if set(&mut self.counters, &mut self.mirror.clear_depth, depth) {
            gl.clear_depth(depth);
        }
    }

    pub fn clear_stencil(&mut self, gl: &mut dyn GlesContext, stencil: i32) {
        if set(&mut self.counters, &mut self.mirror.clear_stencil, stencil) {
            gl.clear_stencil(stencil);
        }
    }

    // ---- bindings ----

    pub fn active_texture(&mut self, gl: &mut dyn GlesContext, unit: u32) {
        let index = unit.wrapping_sub(consts::TEXTURE0);
        if set(&mut self.counters, &mut self.mirror.active_unit, index) {
            gl.active_texture(unit);
        }
    }

    pub fn bind_texture(&mut self, gl: &mut dyn GlesContext, target: u32, texture: u32) {
        let unit = self.mirror.active_unit.get() as usize;
        let counters = &mut self.counters;
        let forward = match self.mirror.units.get_mut(unit) {
            Some(slots) => match target {
                consts::TEXTURE_2D => set(counters, &mut slots.tex_2d, texture),
                consts::TEXTURE_3D => set(counters, &mut slots.tex_3d, texture),
                consts::TEXTURE_CUBE_MAP => set(counters, &mut slots.tex_cube, texture),
                consts::TEXTURE_2D_ARRAY => set(counters, &mut slots.tex_2d_array, texture),
                _ => {
                    counters.changed += 1;
                    true
                }
            },
            None => {
                counters.changed += 1;
                true
            }
        };
        if forward {
            gl.bind_texture(target, texture);
        }
    }

    pub fn bind_sampler(&mut self, gl: &mut dyn GlesContext, unit: u32, sampler: u32) {
        let counters = &mut self.counters;
        let forward = match self.mirror.units.get_mut(unit as usize) {
            Some(slots) => set(counters, &mut slots.sampler, sampler),
            None => {
                counters.changed += 1;
                true
            }
        };
        if forward {
            gl.bind_sampler(unit, sampler);
        }
    }

    pub fn bind_buffer(&mut self, gl: &mut dyn GlesContext, target: u32, buffer: u32) {
        let counters = &mut self.counters;
        let forward = match self.mirror.buffers.slot(target) {
            Some(slot) => set(counters, slot, buffer),
            None => {
                counters.changed += 1;
                true
            }
        };
        if forward {
            gl.bind_buffer(target, buffer);
        }
    }

    pub fn bind_vertex_array(&mut self, gl: &mut dyn GlesContext, vao: u32) {
        if set(&mut self.counters, &mut self.mirror.vertex_array, vao) {
            // Binding a VAO swaps the element-array binding with it.
            self.mirror.buffers.element.invalidate();
            gl.bind_vertex_array(vao);
        }
    }

    pub fn bind_framebuffer(&mut self, gl: &mut dyn GlesContext, target: u32, framebuffer: u32) {
        let counters = &mut self.counters;
        let forward = match target {
            consts::FRAMEBUFFER => {
                let draw = set(counters, &mut self.mirror.draw_framebuffer, framebuffer);
                let read = set(counters, &mut self.mirror.read_framebuffer, framebuffer);
                draw || read
            }
            consts::DRAW_FRAMEBUFFER => set(counters, &mut self.mirror.draw_framebuffer, framebuffer),
            consts::READ_FRAMEBUFFER => set(counters, &mut self.mirror.read_framebuffer, framebuffer),
            _ => {
                counters.changed += 1;
                true
            }
        };
        if forward {
            gl.bind_framebuffer(target, framebuffer);
        }
    }

    pub fn use_program(&mut self, gl: &mut dyn GlesContext, program: u32) {
        if set(&mut self.counters, &mut self.mirror.program, program) {
            gl.use_program(program);
        }
    }

    // ---- getters (mirror readback) ----

    pub fn blend_enabled(&self) -> bool {
        self.mirror.blend.enabled.get()
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.mirror.depth.test_enabled.get()
    }

    pub fn depth_write_enabled(&self) -> bool {
        self.mirror.depth.write_enabled.get()
    }

    pub fn current_program(&self) -> u32 {
        self.mirror.program.get()
    }

    pub fn current_vertex_array(&self) -> u32 {
        self.mirror.vertex_array.get()
    }

    pub fn viewport_rect(&self) -> [i32; 4] {
        self.mirror.raster.viewport.get()
    }

    pub fn scissor_rect(&self) -> [i32; 4] {
        self.mirror.raster.scissor.get()
    }

    pub fn active_texture_unit(&self) -> u32 {
        self.mirror.active_unit.get()
    }

    pub fn bound_texture(&self, target: u32, unit: usize) -> u32 {
        let Some(slots) = self.mirror.units.get(unit) else {
            return 0;
        };
        match target {
            consts::TEXTURE_2D => slots.tex_2d.get(),
            consts::TEXTURE_3D => slots.tex_3d.get(),
            consts::TEXTURE_CUBE_MAP => slots.tex_cube.get(),
            consts::TEXTURE_2D_ARRAY => slots.tex_2d_array.get(),
            _ => 0,
        }
    }

    pub fn bound_buffer(&self, target: u32) -> u32 {
        let mut buffers = self.mirror.buffers;
        buffers.slot(target).map_or(0, |slot| slot.get())
    }

    pub fn draw_framebuffer(&self) -> u32 {
        self.mirror.draw_framebuffer.get()
    }

    // ---- state stack ----

    pub fn push(&mut self) {
        if self.stack.len() >= MAX_STATE_STACK {
            warn!("state stack overflow, push ignored");
            return;
        }
        self.stack.push(self.mirror.clone());
    }

    pub fn pop(&mut self, gl: &mut dyn GlesContext) {
        let Some(saved) = self.stack.pop() else {
            warn!("state stack underflow, pop ignored");
            return;
        };
        self.apply(gl, &saved);
        // Unknown saved slots cannot be reapplied; adopting the snapshot
        // wholesale restores bit-equality with the pre-push mirror.
        self.mirror = saved;
    }

    /// Drive the delta between the mirror and `saved` back through the
    /// setters, so redundant values are skipped and counters stay honest.
    fn apply(&mut self, gl: &mut dyn GlesContext, saved: &PipelineMirror) {
        macro_rules! reapply {
            ($slot:expr, |$v:ident| $call:expr) => {
                if $slot.known {
                    let $v = $slot.get();
                    $call;
                }
            };
        }

        reapply!(saved.blend.enabled, |v| self.set_cap(gl, consts::BLEND, v));
        reapply!(saved.blend.func, |v| self
            .blend_func_separate(gl, v.0, v.1, v.2, v.3));
        reapply!(saved.blend.equation, |v| self
            .blend_equation_separate(gl, v.0, v.1));
        reapply!(saved.blend.color, |v| self
            .blend_color(gl, v[0], v[1], v[2], v[3]));
        reapply!(saved.depth.test_enabled, |v| self
            .set_cap(gl, consts::DEPTH_TEST, v));
        reapply!(saved.depth.write_enabled, |v| self.depth_mask(gl, v));
        reapply!(saved.depth.func, |v| self.depth_func(gl, v));
        reapply!(saved.depth.range, |v| self.depth_range(gl, v.0, v.1));
        reapply!(saved.stencil_enabled, |v| self
            .set_cap(gl, consts::STENCIL_TEST, v));
        reapply!(saved.stencil_front.func, |v| self
            .stencil_func_separate(gl, consts::FRONT, v.0, v.1, v.2));
        reapply!(saved.stencil_front.ops, |v| self
            .stencil_op_separate(gl, consts::FRONT, v.0, v.1, v.2));
        reapply!(saved.stencil_front.write_mask, |v| self
            .stencil_mask_separate(gl, consts::FRONT, v));
        reapply!(saved.stencil_back.func, |v| self
            .stencil_func_separate(gl, consts::BACK, v.0, v.1, v.2));
        reapply!(saved.stencil_back.ops, |v| self
            .stencil_op_separate(gl, consts::BACK, v.0, v.1, v.2));
        reapply!(saved.stencil_back.write_mask, |v| self
            .stencil_mask_separate(gl, consts::BACK, v));
        reapply!(saved.raster.cull_enabled, |v| self
            .set_cap(gl, consts::CULL_FACE, v));
        reapply!(saved.raster.cull_mode, |v| self.cull_face(gl, v));
        reapply!(saved.raster.front_face, |v| self.front_face(gl, v));
        reapply!(saved.raster.scissor_enabled, |v| self
            .set_cap(gl, consts::SCISSOR_TEST, v));
        reapply!(saved.raster.scissor, |v| self
            .scissor(gl, v[0], v[1], v[2], v[3]));
        reapply!(saved.raster.viewport, |v| self
            .viewport(gl, v[0], v[1], v[2], v[3]));
        reapply!(saved.raster.line_width, |v| self.line_width(gl, v));
        reapply!(saved.raster.polygon_offset, |v| self
            .polygon_offset(gl, v.0, v.1));
        reapply!(saved.raster.color_mask, |v| self
            .color_mask(gl, v.0, v.1, v.2, v.3));
        reapply!(saved.clear_color, |v| self
            .clear_color(gl, v[0], v[1], v[2], v[3]));
        reapply!(saved.clear_depth, |v| self.clear_depth(gl, v));
        reapply!(saved.clear_stencil, |v| self.clear_stencil(gl, v));
        reapply!(saved.program, |v| self.use_program(gl, v));
        reapply!(saved.vertex_array, |v| self.bind_vertex_array(gl, v));
        reapply!(saved.draw_framebuffer, |v| self
            .bind_framebuffer(gl, consts::DRAW_FRAMEBUFFER, v));
        reapply!(saved.read_framebuffer, |v| self
            .bind_framebuffer(gl, consts::READ_FRAMEBUFFER, v));

        let mut buffers = saved.buffers;
        for target in TRACKED_BUFFER_TARGETS {
            if let Some(slot) = buffers.slot(target) {
                reapply!(slot, |v| self.bind_buffer(gl, target, v));
            }
        }

        // Texture units last: rebinding walks the active unit.
        for (index, unit) in saved.units.iter().enumerate() {
            let targets = [
                (consts::TEXTURE_2D, unit.tex_2d),
                (consts::TEXTURE_3D, unit.tex_3d),
                (consts::TEXTURE_CUBE_MAP, unit.tex_cube),
                (consts::TEXTURE_2D_ARRAY, unit.tex_2d_array),
            ];
            for (target, slot) in targets {
                if slot.known && self.bound_texture(target, index) != slot.get() {
                    self.active_texture(gl, consts::TEXTURE0 + index as u32);
                    self.bind_texture(gl, target, slot.get());
                }
            }
            reapply!(unit.sampler, |v| self.bind_sampler(gl, index as u32, v));
        }
        reapply!(saved.active_unit, |v| self
            .active_texture(gl, consts::TEXTURE0 + v));
    }

    /// Digest of the fixed-function state relevant to draw batching: two
    /// draws with equal hashes can share one state application.
    pub fn state_hash(&self) -> u64 {
        let m = &self.mirror;
        let mut words: Vec<u64> = Vec::with_capacity(16);
        let mut push_slot = |known: bool, value: u64| {
            words.push(if known { value } else { u64::MAX });
        };
        push_slot(m.blend.enabled.known, m.blend.enabled.value as u64);
        {
            let f = m.blend.func;
            push_slot(
                f.known,
                (u64::from(f.value.0) << 48)
                    ^ (u64::from(f.value.1) << 32)
                    ^ (u64::from(f.value.2) << 16)
                    ^ u64::from(f.value.3),
            );
        }
        push_slot(
            m.blend.equation.known,
            (u64::from(m.blend.equation.value.0) << 32) ^ u64::from(m.blend.equation.value.1),
        );
        push_slot(m.depth.test_enabled.known, m.depth.test_enabled.value as u64);
        push_slot(m.depth.write_enabled.known, m.depth.write_enabled.value as u64);
        push_slot(m.depth.func.known, u64::from(m.depth.func.value));
        push_slot(m.raster.cull_enabled.known, m.raster.cull_enabled.value as u64);
        push_slot(m.raster.cull_mode.known, u64::from(m.raster.cull_mode.value));
        push_slot(m.raster.scissor_enabled.known, m.raster.scissor_enabled.value as u64);
        push_slot(m.stencil_enabled.known, m.stencil_enabled.value as u64);

        let mut bytes = Vec::with_capacity(words.len() * 8);
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        crate::hash::fnv1a(&bytes)
    }

    /// Drain and report the device's first pending error.
    pub fn drain_error(&mut self, gl: &mut dyn GlesContext) -> u32 {
        let code = gl.get_error();
        if code != consts::NO_ERROR {
            error!(name = gl_error_name(code), "device error 0x{code:04x}");
        }
        code
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    #[test]
    fn first_set_forwards_then_filters() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        for _ in 0..1000 {
            tracker.enable(&mut gl, consts::BLEND);
        }
        assert_eq!(gl.call_count("enable"), 1);
        assert_eq!(tracker.changed(), 1);
        assert_eq!(tracker.avoided(), 999);
    }

    #[test]
    fn tuple_setters_compare_the_full_tuple() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.blend_func_separate(&mut gl, consts::SRC_ALPHA, consts::ONE_MINUS_SRC_ALPHA, consts::ONE, consts::ZERO);
        tracker.blend_func_separate(&mut gl, consts::SRC_ALPHA, consts::ONE_MINUS_SRC_ALPHA, consts::ONE, consts::ZERO);
        tracker.blend_func_separate(&mut gl, consts::SRC_ALPHA, consts::ONE_MINUS_SRC_ALPHA, consts::ONE, consts::ONE);
        assert_eq!(gl.call_count("blend_func_separate"), 2);
    }

    #[test]
    fn getters_readback_last_set_value() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.use_program(&mut gl, 7);
        tracker.bind_vertex_array(&mut gl, 9);
        tracker.viewport(&mut gl, 0, 0, 640, 480);
        tracker.active_texture(&mut gl, consts::TEXTURE0 + 2);
        tracker.bind_texture(&mut gl, consts::TEXTURE_2D, 33);

        assert_eq!(tracker.current_program(), 7);
        assert_eq!(tracker.current_vertex_array(), 9);
        assert_eq!(tracker.viewport_rect(), [0, 0, 640, 480]);
        assert_eq!(tracker.bound_texture(consts::TEXTURE_2D, 2), 33);
    }

    #[test]
    fn invalidate_forces_next_set_through() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.depth_func(&mut gl, consts::LEQUAL);
        tracker.invalidate_all();
        tracker.depth_func(&mut gl, consts::LEQUAL);
        assert_eq!(gl.call_count("depth_func"), 2);
    }

    #[test]
    fn reset_makes_every_setter_observe_a_change_once() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.depth_mask(&mut gl, true);
        tracker.reset();
        // Default value, but reset cleared validity: still forwards once.
        tracker.depth_mask(&mut gl, true);
        tracker.depth_mask(&mut gl, true);
        assert_eq!(gl.call_count("depth_mask"), 2);
    }

    #[test]
    fn push_mutate_pop_restores_mirror_bit_equal() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.enable(&mut gl, consts::BLEND);
        tracker.use_program(&mut gl, 5);
        let before = tracker.mirror.clone();

        tracker.push();
        tracker.disable(&mut gl, consts::BLEND);
        tracker.use_program(&mut gl, 6);
        tracker.viewport(&mut gl, 0, 0, 10, 10);
        tracker.pop(&mut gl);

        assert_eq!(tracker.mirror, before);
        assert!(tracker.blend_enabled());
        assert_eq!(tracker.current_program(), 5);
    }

    #[test]
    fn pop_skips_unchanged_slots() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.depth_func(&mut gl, consts::LEQUAL);
        tracker.push();
        tracker.pop(&mut gl);
        // Nothing changed between push and pop, so nothing is re-driven.
        assert_eq!(gl.call_count("depth_func"), 1);
    }

    #[test]
    fn stack_overflow_and_underflow_are_no_ops() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        for _ in 0..20 {
            tracker.push();
        }
        for _ in 0..25 {
            tracker.pop(&mut gl);
        }
        // Survived; a fresh push/pop still works.
        tracker.push();
        tracker.pop(&mut gl);
    }

    #[test]
    fn untracked_caps_always_forward() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        tracker.enable(&mut gl, consts::DITHER);
        tracker.enable(&mut gl, consts::DITHER);
        assert_eq!(gl.call_count("enable"), 2);
    }

    #[test]
    fn drain_error_reports_injected_code() {
        let mut gl = SimulatedGles::new();
        let mut tracker = StateTracker::new();

        gl.inject_error(consts::INVALID_OPERATION);
        assert_eq!(tracker.drain_error(&mut gl), consts::INVALID_OPERATION);
        assert_eq!(tracker.drain_error(&mut gl), consts::NO_ERROR);
    }
}
