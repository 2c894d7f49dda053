//! The per-context object threading every subsystem together.
//!
//! One `VelocityContext` owns the device plus the state tracker, buffer
//! pools, streaming ring, shader cache, draw batcher and resolution
//! scaler. The frame lifecycle and all wrapped GL entry points run through
//! here; the C ABI in [`crate::api`] is a thin layer over one guarded
//! current-context slot.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};

use tracing::{info, warn};

use crate::batcher::{BatchKey, BatchStats, DrawBatcher};
use crate::caps::{GpuCaps, GpuFeatures};
use crate::config::VelocityConfig;
use crate::error::Result;
use crate::gles::{consts, GlesContext};
use crate::pool::BufferManager;
use crate::scaler::{ResolutionScaler, ScalerConfig};
use crate::shader_cache::ShaderCache;
use crate::state::StateTracker;
use crate::stats::{FrameClock, VelocityStats};
use crate::stream::StreamingRing;

// Queries answered from the mirror instead of the device.
const Q_CURRENT_PROGRAM: u32 = 0x8B8D;
const Q_VERTEX_ARRAY_BINDING: u32 = 0x85B5;
const Q_ACTIVE_TEXTURE: u32 = 0x84E0;
const Q_TEXTURE_BINDING_2D: u32 = 0x8069;
const Q_VIEWPORT: u32 = 0x0BA2;
const Q_SCISSOR_BOX: u32 = 0x0C10;

pub struct VelocityContext {
    gl: Box<dyn GlesContext>,
    pub caps: GpuCaps,
    config: VelocityConfig,

    tracker: StateTracker,
    buffers: BufferManager,
    stream: Option<StreamingRing>,
    shader_cache: ShaderCache,
    batcher: DrawBatcher,
    scaler: Option<ResolutionScaler>,

    clock: FrameClock,
    last_batch: BatchStats,
    direct_draws: u32,
    direct_triangles: u64,
    texture_budget_bytes: usize,
    string_cache: HashMap<u32, CString>,
}

impl VelocityContext {
    /// Build a context over an already current device. Fatal failures
    /// (scaler framebuffer incompleteness) collapse creation; partial GL
    /// resources are released before returning.
    pub fn new(
        mut gl: Box<dyn GlesContext>,
        config: VelocityConfig,
        native_w: i32,
        native_h: i32,
    ) -> Result<Self> {
        let caps = GpuCaps::detect(gl.as_mut());

        let mut tracker = StateTracker::new();
        tracker.reset();
        tracker.invalidate_all();

        let persistent = caps.features.contains(GpuFeatures::PERSISTENT_MAPPED_BUFFER)
            && config.persistent_mapping;

        let buffers = BufferManager::new(persistent, config.persistent_mapping);
        let stream = StreamingRing::new(gl.as_mut(), config.buffer_pool_bytes(), persistent);
        if stream.is_none() {
            // Non-fatal: the affected paths fall back to direct buffers.
            warn!("streaming ring unavailable, continuing without it");
        }

        let shader_cache = ShaderCache::new(
            config.shader_cache,
            config.shader_cache_path.as_deref(),
            config.shader_cache_max_bytes,
            config.shader_cache_max_entries,
            caps.vendor_hash,
            caps.driver_hash,
        );

        let batcher = DrawBatcher::new(
            config.batch_queue_capacity(),
            config.draw_batching,
            config.instancing,
            caps.features.contains(GpuFeatures::MULTI_DRAW),
        );

        let scaler = if config.dynamic_resolution {
            let scaler_config = ScalerConfig {
                enabled: true,
                min_scale: config.min_resolution_scale,
                max_scale: config.max_resolution_scale,
                target_fps: config.target_fps,
                ..ScalerConfig::default()
            };
            match ResolutionScaler::new(gl.as_mut(), native_w, native_h, scaler_config) {
                Ok(scaler) => Some(scaler),
                Err(err) => {
                    // Framebuffer incompleteness at creation is fatal.
                    let mut buffers = buffers;
                    let mut stream = stream;
                    if let Some(ring) = stream.as_mut() {
                        ring.destroy(gl.as_mut());
                    }
                    buffers.shutdown(gl.as_mut());
                    return Err(err);
                }
            }
        } else {
            None
        };

        let texture_budget_bytes = config.texture_pool_mb * 1024 * 1024;

        info!(
            batching = config.draw_batching,
            dynamic_resolution = config.dynamic_resolution,
            shader_cache = ?config.shader_cache,
            "rendering context created for {native_w}x{native_h} window"
        );

        Ok(Self {
            gl,
            caps,
            config,
            tracker,
            buffers,
            stream,
            shader_cache,
            batcher,
            scaler,
            clock: FrameClock::new(),
            last_batch: BatchStats::default(),
            direct_draws: 0,
            direct_triangles: 0,
            texture_budget_bytes,
            string_cache: HashMap::new(),
        })
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    /// Re-point the runtime tunables; applied to the live subsystems.
    pub fn update_config(&mut self, config: VelocityConfig) {
        self.batcher.set_enabled(config.draw_batching);
        self.batcher.set_instancing(config.instancing);
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.set_enabled(config.dynamic_resolution);
        }
        self.texture_budget_bytes = config.texture_pool_mb * 1024 * 1024;
        self.config = config;
    }

    pub fn make_current(&mut self) -> bool {
        let ok = self.gl.make_current();
        if ok {
            // Another context may have run in between.
            self.tracker.invalidate_all();
        }
        ok
    }

    // ---- frame lifecycle ----

    pub fn begin_frame(&mut self) {
        self.clock.begin_frame();
        self.direct_draws = 0;
        self.direct_triangles = 0;

        if let Some(ring) = self.stream.as_mut() {
            ring.begin_frame(self.gl.as_mut());
            self.tracker.invalidate_buffer_bindings();
        }
        self.batcher.begin_frame();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.begin_frame(self.gl.as_mut());
            // The scaler rebound the framebuffer and viewport.
            self.tracker.invalidate_all();
        }
    }

    pub fn end_frame(&mut self) {
        self.flush_draws();
        self.last_batch = self.batcher.stats();

        if let Some(scaler) = self.scaler.as_mut() {
            scaler.end_frame(self.gl.as_mut());
            self.tracker.invalidate_all();
        }
        if let Some(ring) = self.stream.as_mut() {
            ring.end_frame(self.gl.as_mut());
        }

        let frame_ms = self.clock.end_frame();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.record_frame_time(self.gl.as_mut(), frame_ms);
        }
    }

    pub fn swap_buffers(&mut self) {
        self.gl.swap_buffers();
    }

    /// Emit everything queued in the batcher and resynchronise the mirror.
    pub fn flush_draws(&mut self) {
        if self.batcher.queued() > 0 {
            self.batcher.flush(self.gl.as_mut());
            self.tracker.invalidate_all();
        }
    }

    // ---- wrapped entry points: state ----

    pub fn gl_enable(&mut self, cap: u32) {
        self.tracker.enable(self.gl.as_mut(), cap);
    }

    pub fn gl_disable(&mut self, cap: u32) {
        self.tracker.disable(self.gl.as_mut(), cap);
    }

    pub fn gl_is_enabled(&mut self, cap: u32) -> bool {
        self.tracker.is_enabled(self.gl.as_mut(), cap)
    }

    pub fn gl_blend_func(&mut self, src: u32, dst: u32) {
        self.tracker.blend_func(self.gl.as_mut(), src, dst);
    }

    pub fn gl_blend_func_separate(&mut self, sr: u32, dr: u32, sa: u32, da: u32) {
        self.tracker.blend_func_separate(self.gl.as_mut(), sr, dr, sa, da);
    }

    pub fn gl_blend_equation(&mut self, mode: u32) {
        self.tracker.blend_equation(self.gl.as_mut(), mode);
    }

    pub fn gl_blend_equation_separate(&mut self, rgb: u32, alpha: u32) {
        self.tracker.blend_equation_separate(self.gl.as_mut(), rgb, alpha);
    }

    pub fn gl_blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.tracker.blend_color(self.gl.as_mut(), r, g, b, a);
    }

    pub fn gl_depth_func(&mut self, func: u32) {
        self.tracker.depth_func(self.gl.as_mut(), func);
    }

    pub fn gl_depth_mask(&mut self, flag: bool) {
        self.tracker.depth_mask(self.gl.as_mut(), flag);
    }

    pub fn gl_depth_range(&mut self, near: f32, far: f32) {
        self.tracker.depth_range(self.gl.as_mut(), near, far);
    }

    pub fn gl_stencil_func(&mut self, func: u32, reference: i32, mask: u32) {
        self.tracker.stencil_func(self.gl.as_mut(), func, reference, mask);
    }

    pub fn gl_stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        self.tracker
            .stencil_func_separate(self.gl.as_mut(), face, func, reference, mask);
    }

    pub fn gl_stencil_op(&mut self, sfail: u32, dpfail: u32, dppass: u32) {
        self.tracker.stencil_op(self.gl.as_mut(), sfail, dpfail, dppass);
    }

    pub fn gl_stencil_op_separate(&mut self, face: u32, sfail: u32, dpfail: u32, dppass: u32) {
        self.tracker
            .stencil_op_separate(self.gl.as_mut(), face, sfail, dpfail, dppass);
    }

    pub fn gl_stencil_mask(&mut self, mask: u32) {
        self.tracker.stencil_mask(self.gl.as_mut(), mask);
    }

    pub fn gl_stencil_mask_separate(&mut self, face: u32, mask: u32) {
        self.tracker.stencil_mask_separate(self.gl.as_mut(), face, mask);
    }

    pub fn gl_cull_face(&mut self, mode: u32) {
        self.tracker.cull_face(self.gl.as_mut(), mode);
    }

    pub fn gl_front_face(&mut self, mode: u32) {
        self.tracker.front_face(self.gl.as_mut(), mode);
    }

    pub fn gl_line_width(&mut self, width: f32) {
        self.tracker.line_width(self.gl.as_mut(), width);
    }

    pub fn gl_polygon_offset(&mut self, factor: f32, units: f32) {
        self.tracker.polygon_offset(self.gl.as_mut(), factor, units);
    }

    pub fn gl_viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.tracker.viewport(self.gl.as_mut(), x, y, w, h);
    }

    pub fn gl_scissor(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.tracker.scissor(self.gl.as_mut(), x, y, w, h);
    }

    pub fn gl_color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.tracker.color_mask(self.gl.as_mut(), r, g, b, a);
    }

    pub fn gl_clear(&mut self, mask: u32) {
        self.gl.clear(mask);
    }

    pub fn gl_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.tracker.clear_color(self.gl.as_mut(), r, g, b, a);
    }

    pub fn gl_clear_depth(&mut self, depth: f32) {
        self.tracker.clear_depth(self.gl.as_mut(), depth);
    }

    pub fn gl_clear_stencil(&mut self, stencil: i32) {
        self.tracker.clear_stencil(self.gl.as_mut(), stencil);
    }

    pub fn gl_active_texture(&mut self, unit: u32) {
        self.tracker.active_texture(self.gl.as_mut(), unit);
    }

    pub fn gl_bind_texture(&mut self, target: u32, texture: u32) {
        self.tracker.bind_texture(self.gl.as_mut(), target, texture);
    }

    pub fn gl_bind_sampler(&mut self, unit: u32, sampler: u32) {
        self.tracker.bind_sampler(self.gl.as_mut(), unit, sampler);
    }

    pub fn gl_bind_buffer(&mut self, target: u32, buffer: u32) {
        self.tracker.bind_buffer(self.gl.as_mut(), target, buffer);
    }

    pub fn gl_bind_vertex_array(&mut self, vao: u32) {
        self.tracker.bind_vertex_array(self.gl.as_mut(), vao);
    }

    pub fn gl_bind_framebuffer(&mut self, target: u32, framebuffer: u32) {
        self.tracker.bind_framebuffer(self.gl.as_mut(), target, framebuffer);
    }

    pub fn gl_use_program(&mut self, program: u32) {
        self.tracker.use_program(self.gl.as_mut(), program);
    }

    pub fn push_state(&mut self) {
        self.tracker.push();
    }

    pub fn pop_state(&mut self) {
        self.tracker.pop(self.gl.as_mut());
    }

    // ---- wrapped entry points: draws ----

    fn current_batch_key(&self) -> BatchKey {
        BatchKey {
            program: self.tracker.current_program(),
            vao: self.tracker.current_vertex_array(),
            texture0: self.tracker.bound_texture(consts::TEXTURE_2D, 0),
            texture1: self.tracker.bound_texture(consts::TEXTURE_2D, 1),
            mode: 0,
            state_hash: self.tracker.state_hash(),
        }
    }

    fn count_direct(&mut self, mode: u32, count: i32, instances: i32) {
        self.direct_draws += 1;
        if mode == consts::TRIANGLES {
            self.direct_triangles += (count / 3).max(0) as u64 * instances.max(1) as u64;
        }
    }

    pub fn gl_draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        if self.config.draw_batching {
            let key = self.current_batch_key();
            self.batcher.set_key(key);
            self.batcher.draw_arrays(self.gl.as_mut(), mode, first, count);
        } else {
            self.gl.draw_arrays(mode, first, count);
            self.count_direct(mode, count, 1);
        }
    }

    pub fn gl_draw_elements(&mut self, mode: u32, count: i32, index_type: u32, offset: usize) {
        if self.config.draw_batching {
            let key = self.current_batch_key();
            self.batcher.set_key(key);
            self.batcher
                .draw_elements(self.gl.as_mut(), mode, count, index_type, offset);
        } else {
            self.gl.draw_elements(mode, count, index_type, offset);
            self.count_direct(mode, count, 1);
        }
    }

    pub fn gl_draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instances: i32) {
        if self.config.draw_batching {
            let key = self.current_batch_key();
            self.batcher.set_key(key);
            self.batcher
                .draw_arrays_instanced(self.gl.as_mut(), mode, first, count, instances);
        } else {
            self.gl.draw_arrays_instanced(mode, first, count, instances);
            self.count_direct(mode, count, instances);
        }
    }

    pub fn gl_draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: usize,
        instances: i32,
    ) {
        if self.config.draw_batching {
            let key = self.current_batch_key();
            self.batcher.set_key(key);
            self.batcher.draw_elements_instanced(
                self.gl.as_mut(),
                mode,
                count,
                index_type,
                offset,
                instances,
            );
        } else {
            self.gl
                .draw_elements_instanced(mode, count, index_type, offset, instances);
            self.count_direct(mode, count, instances);
        }
    }

    /// Desktop hosts may call the GL 1.4 multi-draw surface directly; ES
    /// has none, so it decomposes into individual submissions.
    pub fn gl_multi_draw_arrays(&mut self, mode: u32, firsts: &[i32], counts: &[i32]) {
        for (&first, &count) in firsts.iter().zip(counts) {
            self.gl_draw_arrays(mode, first, count);
        }
    }

    pub fn gl_multi_draw_elements(
        &mut self,
        mode: u32,
        counts: &[i32],
        index_type: u32,
        offsets: &[usize],
    ) {
        for (&count, &offset) in counts.iter().zip(offsets) {
            self.gl_draw_elements(mode, count, index_type, offset);
        }
    }

    pub fn gl_flush(&mut self) {
        self.flush_draws();
        self.gl.flush();
    }

    pub fn gl_finish(&mut self) {
        self.flush_draws();
        self.gl.finish();
    }

    // ---- wrapped entry points: textures ----

    /// Desktop internal formats that ES rejects are rewritten to their
    /// sized equivalents.
    pub fn gl_tex_image_2d(
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
        let (es_internal, es_format) = match internal_format {
            consts::RGB => (consts::RGB8, format),
            consts::RGBA => (consts::RGBA8, format),
            consts::RED => (consts::R8, consts::RED),
            other => (other, format),
        };
        self.gl
            .tex_image_2d(target, level, es_internal, w, h, es_format, ty, pixels);
    }

    // ---- wrapped entry points: queries ----

    pub fn gl_get_error(&mut self) -> u32 {
        self.tracker.drain_error(self.gl.as_mut())
    }

    /// Masqueraded `glGetString`: VERSION and RENDERER advertise the
    /// wrapper; everything else passes through.
    pub fn gl_get_string(&mut self, name: u32) -> String {
        match name {
            consts::VERSION => format!("{}.{} VelocityGL", self.caps.gl_major, self.caps.gl_minor),
            consts::RENDERER => format!("VelocityGL ({})", self.caps.renderer_string),
            _ => self.gl.get_string(name),
        }
    }

    /// Stable pointer form of [`gl_get_string`] for the C ABI.
    pub fn gl_get_string_ptr(&mut self, name: u32) -> *const c_char {
        let value = self.gl_get_string(name);
        let entry = self
            .string_cache
            .entry(name)
            .or_insert_with(|| CString::default());
        *entry = CString::new(value).unwrap_or_default();
        entry.as_ptr()
    }

    /// Mirror-answered and masqueraded integer queries. Returns how many
    /// values were written into `out`.
    pub fn gl_get_integerv(&mut self, pname: u32, out: &mut [i32]) -> usize {
        if out.is_empty() {
            return 0;
        }
        match pname {
            consts::MAJOR_VERSION => {
                out[0] = self.caps.gl_major as i32;
                1
            }
            consts::MINOR_VERSION => {
                out[0] = self.caps.gl_minor as i32;
                1
            }
            Q_CURRENT_PROGRAM => {
                out[0] = self.tracker.current_program() as i32;
                1
            }
            Q_VERTEX_ARRAY_BINDING => {
                out[0] = self.tracker.current_vertex_array() as i32;
                1
            }
            Q_ACTIVE_TEXTURE => {
                out[0] = (consts::TEXTURE0 + self.tracker.active_texture_unit()) as i32;
                1
            }
            Q_TEXTURE_BINDING_2D => {
                let unit = self.tracker.active_texture_unit() as usize;
                out[0] = self.tracker.bound_texture(consts::TEXTURE_2D, unit) as i32;
                1
            }
            Q_VIEWPORT if out.len() >= 4 => {
                out[..4].copy_from_slice(&self.tracker.viewport_rect());
                4
            }
            Q_SCISSOR_BOX if out.len() >= 4 => {
                out[..4].copy_from_slice(&self.tracker.scissor_rect());
                4
            }
            _ => {
                out[0] = self.gl.get_integer(pname);
                1
            }
        }
    }

    // ---- shader cache surface ----

    pub fn get_or_compile_program(&mut self, vert_source: &str, frag_source: &str) -> Result<u32> {
        self.shader_cache
            .get_or_compile(self.gl.as_mut(), vert_source, frag_source)
    }

    pub fn preload_shaders(&mut self) -> usize {
        self.shader_cache.preload(self.gl.as_mut())
    }

    pub fn clear_shader_cache(&mut self) {
        self.shader_cache.clear();
    }

    pub fn shader_cache_size(&self) -> usize {
        self.shader_cache.size_bytes()
    }

    pub fn flush_shader_cache(&self) {
        self.shader_cache.flush_to_disk();
    }

    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shader_cache
    }

    // ---- pools / memory ----

    pub fn buffers(&mut self) -> &mut BufferManager {
        &mut self.buffers
    }

    pub fn create_buffer_pool(&mut self, target: u32, usage: u32, size: usize) -> Option<usize> {
        let id = self.buffers.create_pool(self.gl.as_mut(), target, usage, size);
        self.tracker.invalidate_buffer_bindings();
        id
    }

    pub fn stream_alloc(&mut self, data: &[u8]) -> Option<(u32, usize)> {
        let ring = self.stream.as_mut()?;
        let offset = ring.alloc(self.gl.as_mut(), data);
        if offset == crate::stream::STREAM_SENTINEL {
            return None;
        }
        let buffer = ring.buffer();
        self.tracker.invalidate_buffer_bindings();
        Some((buffer, offset))
    }

    pub fn memory_usage(&self) -> usize {
        self.buffers.total_allocated() + self.shader_cache.size_bytes()
    }

    /// Progressive memory release, levels 0..=3.
    pub fn trim_memory(&mut self, level: u32) {
        info!(level, "trimming memory");
        self.buffers.trim(self.gl.as_mut());
        if level >= 1 {
            self.texture_budget_bytes /= 2;
        }
        if level >= 2 {
            self.shader_cache.clear();
        }
        if level >= 3 {
            self.texture_budget_bytes = 0;
            if let Some(ring) = self.stream.as_mut() {
                ring.destroy(self.gl.as_mut());
            }
            self.stream = None;
        }
    }

    pub fn texture_budget_bytes(&self) -> usize {
        self.texture_budget_bytes
    }

    // ---- scaler surface ----

    pub fn resolution_scale(&self) -> f32 {
        self.scaler.as_ref().map_or(1.0, |s| s.scale())
    }

    pub fn set_resolution_scale(&mut self, scale: f32) {
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.set_scale(self.gl.as_mut(), scale);
            self.tracker.invalidate_all();
        }
    }

    pub fn set_dynamic_resolution(&mut self, enabled: bool) {
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.set_enabled(enabled);
        }
        self.config.dynamic_resolution = enabled;
    }

    // ---- stats ----

    pub fn stats(&self) -> VelocityStats {
        let batch = self.last_batch;
        let render = self
            .scaler
            .as_ref()
            .map_or((0, 0), |s| s.render_size());
        VelocityStats {
            current_fps: self.clock.current_fps,
            avg_fps: self.clock.avg_fps,
            frame_time_ms: self.clock.frame_time_ms,
            draw_calls_submitted: batch.submitted + self.direct_draws,
            draw_calls_executed: batch.executed + self.direct_draws,
            draw_calls_saved: batch.saved,
            batches_created: batch.batches,
            triangles: batch.triangles + self.direct_triangles,
            state_changes_applied: self.tracker.changed(),
            state_changes_avoided: self.tracker.avoided(),
            shader_cache_hits: self.shader_cache.hits(),
            shader_cache_misses: self.shader_cache.misses(),
            shader_cache_bytes: self.shader_cache.size_bytes(),
            buffer_bytes_allocated: self.buffers.total_allocated(),
            buffer_bytes_used: self.buffers.total_used(),
            resolution_scale: self.resolution_scale(),
            render_width: render.0,
            render_height: render.1,
            scale_changes: self.scaler.as_ref().map_or(0, |s| s.scale_changes()),
        }
    }

    /// Mid-frame snapshot including what is still queued (submitted draws
    /// that have not been flushed yet).
    pub fn live_batch_stats(&self) -> BatchStats {
        self.batcher.stats()
    }

    pub fn reset_stats(&mut self) {
        self.tracker.reset_counters();
        self.last_batch = BatchStats::default();
        self.direct_draws = 0;
        self.direct_triangles = 0;
    }

    pub fn native_proc_address(&self, name: &str) -> *const c_void {
        self.gl.native_proc_address(name)
    }

    /// Tear down every GL object this context owns; the shader cache is
    /// flushed to disk first.
    pub fn destroy(&mut self) {
        self.flush_draws();
        self.shader_cache.flush_to_disk();
        if let Some(mut scaler) = self.scaler.take() {
            scaler.destroy(self.gl.as_mut());
        }
        if let Some(mut ring) = self.stream.take() {
            ring.destroy(self.gl.as_mut());
        }
        self.buffers.shutdown(self.gl.as_mut());
        info!("rendering context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    fn context() -> VelocityContext {
        VelocityContext::new(
            Box::new(SimulatedGles::new()),
            VelocityConfig::default(),
            1280,
            720,
        )
        .expect("context")
    }

    #[test]
    fn frame_counters_balance() {
        let mut cx = context();
        cx.begin_frame();
        cx.gl_use_program(3);
        for _ in 0..8 {
            cx.gl_draw_arrays(consts::TRIANGLES, 0, 6);
        }
        cx.end_frame();

        let stats = cx.stats();
        assert_eq!(stats.draw_calls_submitted, 8);
        assert_eq!(
            stats.draw_calls_executed + stats.draw_calls_saved,
            stats.draw_calls_submitted
        );
        assert_eq!(stats.batches_created, 1);
    }

    #[test]
    fn version_masquerade() {
        let mut cx = context();
        assert_eq!(cx.gl_get_string(consts::VERSION), "4.6 VelocityGL");
        assert!(cx
            .gl_get_string(consts::RENDERER)
            .starts_with("VelocityGL (Adreno"));

        let mut out = [0i32; 4];
        assert_eq!(cx.gl_get_integerv(consts::MAJOR_VERSION, &mut out), 1);
        assert_eq!(out[0], 4);
        assert_eq!(cx.gl_get_integerv(consts::MINOR_VERSION, &mut out), 1);
        assert_eq!(out[0], 6);
    }

    #[test]
    fn mirror_answers_binding_queries() {
        let mut cx = context();
        cx.gl_use_program(42);
        cx.gl_viewport(0, 0, 800, 600);

        let mut out = [0i32; 4];
        cx.gl_get_integerv(Q_CURRENT_PROGRAM, &mut out);
        assert_eq!(out[0], 42);
        assert_eq!(cx.gl_get_integerv(Q_VIEWPORT, &mut out), 4);
        assert_eq!(&out, &[0, 0, 800, 600]);
    }

    #[test]
    fn trim_levels_progressively_release() {
        let mut cx = context();
        let base_budget = cx.texture_budget_bytes();

        cx.trim_memory(0);
        assert_eq!(cx.texture_budget_bytes(), base_budget);

        cx.trim_memory(1);
        assert_eq!(cx.texture_budget_bytes(), base_budget / 2);

        cx.preload_shaders();
        assert!(cx.shader_cache_size() > 0);
        cx.trim_memory(2);
        assert_eq!(cx.shader_cache_size(), 0);

        cx.trim_memory(3);
        assert_eq!(cx.texture_budget_bytes(), 0);
        assert!(cx.stream_alloc(&[0; 16]).is_none());
    }
}
