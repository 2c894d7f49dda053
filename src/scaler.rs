//! Dynamic resolution scaler.
//!
//! Scene rendering goes to an off-screen target sized `native * scale`;
//! the end-of-frame pass stretches it onto the default framebuffer through
//! a bilinear or contrast-adaptive-sharpening program. Scale follows a
//! frame-time feedback loop over a 60-sample window.

use tracing::{error, info, warn};

use crate::error::{Result, VglError};
use crate::gles::{consts, GlesContext};
use crate::shader_cache::compile_and_link;

pub const SCALER_MIN_SCALE: f32 = 0.25;
pub const SCALER_MAX_SCALE: f32 = 2.0;
const HISTORY_SIZE: usize = 60;
const ADJUST_THRESHOLD: f32 = 0.1;

const UPSCALE_VERTEX: &str = "#version 300 es\n\
     layout(location = 0) in vec2 aPos;\n\
     layout(location = 1) in vec2 aTexCoord;\n\
     out vec2 vTexCoord;\n\
     void main() {\n\
         gl_Position = vec4(aPos, 0.0, 1.0);\n\
         vTexCoord = aTexCoord;\n\
     }\n";

const UPSCALE_BILINEAR_FRAGMENT: &str = "#version 300 es\n\
     precision highp float;\n\
     in vec2 vTexCoord;\n\
     out vec4 fragColor;\n\
     uniform sampler2D uTexture;\n\
     void main() {\n\
         fragColor = texture(uTexture, vTexCoord);\n\
     }\n";

// Contrast-adaptive sharpening, simplified single pass.
const CAS_FRAGMENT: &str = "#version 300 es\n\
     precision highp float;\n\
     in vec2 vTexCoord;\n\
     out vec4 fragColor;\n\
     uniform sampler2D uTexture;\n\
     uniform vec2 uTexelSize;\n\
     uniform float uSharpness;\n\
     \n\
     float luma(vec3 c) { return dot(c, vec3(0.299, 0.587, 0.114)); }\n\
     \n\
     void main() {\n\
         vec3 b = texture(uTexture, vTexCoord + vec2(0.0, -uTexelSize.y)).rgb;\n\
         vec3 d = texture(uTexture, vTexCoord + vec2(-uTexelSize.x, 0.0)).rgb;\n\
         vec3 e = texture(uTexture, vTexCoord).rgb;\n\
         vec3 f = texture(uTexture, vTexCoord + vec2(uTexelSize.x, 0.0)).rgb;\n\
         vec3 h = texture(uTexture, vTexCoord + vec2(0.0, uTexelSize.y)).rgb;\n\
     \n\
         float mnL = min(min(min(luma(d), luma(e)), min(luma(f), luma(b))), luma(h));\n\
         float mxL = max(max(max(luma(d), luma(e)), max(luma(f), luma(b))), luma(h));\n\
         float ampL = clamp(min(mnL, 1.0 - mxL) / mxL, 0.0, 1.0);\n\
         ampL = sqrt(ampL) * uSharpness;\n\
     \n\
         vec3 wL = vec3(-ampL * 0.25);\n\
         vec3 peak = vec3(1.0 + ampL * 4.0);\n\
     \n\
         vec3 result = (b * wL + d * wL + f * wL + h * wL + e * peak);\n\
         result /= (4.0 * wL + peak);\n\
     \n\
         fragColor = vec4(result, 1.0);\n\
     }\n";

const QUAD_VERTICES: [f32; 24] = [
    -1.0, 1.0, 0.0, 1.0, //
    -1.0, -1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 0.0, //
    1.0, 1.0, 1.0, 1.0,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalerConfig {
    pub enabled: bool,
    pub min_scale: f32,
    pub max_scale: f32,
    pub target_fps: u32,
    /// Feedback gain in scale units per unit of relative deviation.
    pub adjust_speed: f32,
    pub sharpening: bool,
    pub sharpen_amount: f32,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_scale: 0.5,
            max_scale: 1.0,
            target_fps: 60,
            adjust_speed: 0.1,
            sharpening: true,
            sharpen_amount: 0.3,
        }
    }
}

pub struct ResolutionScaler {
    config: ScalerConfig,
    native_w: i32,
    native_h: i32,
    render_w: i32,
    render_h: i32,
    scale: f32,

    fbo: u32,
    color_tex: u32,
    depth_tex: u32,
    bilinear_program: u32,
    cas_program: u32,
    quad_vao: u32,
    quad_vbo: u32,

    history: [f32; HISTORY_SIZE],
    history_index: usize,
    history_filled: usize,
    avg_frame_time: f32,
    actual_fps: f32,
    target_frame_time: f32,
    scale_changes: u32,
}

fn round_even_clamped(value: f32, native: i32) -> i32 {
    let v = (value as i32 + 1) & !1;
    v.clamp(64, native * 2)
}

impl ResolutionScaler {
    pub fn new(
        gl: &mut dyn GlesContext,
        native_w: i32,
        native_h: i32,
        config: ScalerConfig,
    ) -> Result<Self> {
        let scale = config.max_scale.clamp(SCALER_MIN_SCALE, SCALER_MAX_SCALE);
        let mut scaler = Self {
            config,
            native_w,
            native_h,
            render_w: 0,
            render_h: 0,
            scale,
            fbo: 0,
            color_tex: 0,
            depth_tex: 0,
            bilinear_program: 0,
            cas_program: 0,
            quad_vao: 0,
            quad_vbo: 0,
            history: [0.0; HISTORY_SIZE],
            history_index: 0,
            history_filled: 0,
            avg_frame_time: 0.0,
            actual_fps: 0.0,
            target_frame_time: 1000.0 / config.target_fps.max(1) as f32,
            scale_changes: 0,
        };
        scaler.render_w = round_even_clamped(native_w as f32 * scale, native_w);
        scaler.render_h = round_even_clamped(native_h as f32 * scale, native_h);

        // Fullscreen quad shared by both programs.
        scaler.quad_vao = gl.gen_vertex_array();
        scaler.quad_vbo = gl.gen_buffer();
        gl.bind_vertex_array(scaler.quad_vao);
        gl.bind_buffer(consts::ARRAY_BUFFER, scaler.quad_vbo);
        gl.buffer_data(
            consts::ARRAY_BUFFER,
            std::mem::size_of_val(&QUAD_VERTICES),
            Some(bytemuck::cast_slice(&QUAD_VERTICES)),
            consts::STATIC_DRAW,
        );
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer(0, 2, consts::FLOAT, false, 16, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer(1, 2, consts::FLOAT, false, 16, 8);
        gl.bind_vertex_array(0);

        scaler.bilinear_program = match compile_and_link(gl, UPSCALE_VERTEX, UPSCALE_BILINEAR_FRAGMENT)
        {
            Ok(program) => program,
            Err(err) => {
                scaler.release(gl);
                return Err(err);
            }
        };
        scaler.cas_program = match compile_and_link(gl, UPSCALE_VERTEX, CAS_FRAGMENT) {
            Ok(program) => program,
            Err(err) => {
                warn!(%err, "sharpen program unavailable, falling back to bilinear");
                0
            }
        };

        if let Err(err) = scaler.create_framebuffers(gl) {
            scaler.release(gl);
            return Err(err);
        }

        info!(
            target_fps = config.target_fps,
            "resolution scaler initialized: native {native_w}x{native_h}, render {}x{}",
            scaler.render_w,
            scaler.render_h,
        );
        Ok(scaler)
    }

    fn create_framebuffers(&mut self, gl: &mut dyn GlesContext) -> Result<()> {
        if self.fbo != 0 {
            gl.delete_framebuffer(std::mem::take(&mut self.fbo));
            gl.delete_texture(std::mem::take(&mut self.color_tex));
            gl.delete_texture(std::mem::take(&mut self.depth_tex));
        }

        self.fbo = gl.gen_framebuffer();
        gl.bind_framebuffer(consts::FRAMEBUFFER, self.fbo);

        self.color_tex = gl.gen_texture();
        gl.bind_texture(consts::TEXTURE_2D, self.color_tex);
        gl.tex_storage_2d(consts::TEXTURE_2D, 1, consts::RGBA8, self.render_w, self.render_h);
        gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_MIN_FILTER, consts::LINEAR as i32);
        gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_MAG_FILTER, consts::LINEAR as i32);
        gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_WRAP_S, consts::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_WRAP_T, consts::CLAMP_TO_EDGE as i32);
        gl.framebuffer_texture_2d(
            consts::FRAMEBUFFER,
            consts::COLOR_ATTACHMENT0,
            consts::TEXTURE_2D,
            self.color_tex,
            0,
        );

        self.depth_tex = gl.gen_texture();
        gl.bind_texture(consts::TEXTURE_2D, self.depth_tex);
        gl.tex_storage_2d(
            consts::TEXTURE_2D,
            1,
            consts::DEPTH24_STENCIL8,
            self.render_w,
            self.render_h,
        );
        gl.framebuffer_texture_2d(
            consts::FRAMEBUFFER,
            consts::DEPTH_STENCIL_ATTACHMENT,
            consts::TEXTURE_2D,
            self.depth_tex,
            0,
        );

        let status = gl.check_framebuffer_status(consts::FRAMEBUFFER);
        gl.bind_framebuffer(consts::FRAMEBUFFER, 0);
        gl.bind_texture(consts::TEXTURE_2D, 0);

        if status != consts::FRAMEBUFFER_COMPLETE {
            error!("render framebuffer incomplete: 0x{status:04x}");
            return Err(VglError::FramebufferIncomplete(status));
        }
        info!(
            scale = self.scale,
            "created render target {}x{}",
            self.render_w,
            self.render_h,
        );
        Ok(())
    }

    fn update_render_size(&mut self, gl: &mut dyn GlesContext) {
        let new_w = round_even_clamped(self.native_w as f32 * self.scale, self.native_w);
        let new_h = round_even_clamped(self.native_h as f32 * self.scale, self.native_h);
        if new_w != self.render_w || new_h != self.render_h {
            self.render_w = new_w;
            self.render_h = new_h;
            if self.create_framebuffers(gl).is_err() {
                warn!("render target rebuild failed, keeping previous scale path");
            }
            self.scale_changes += 1;
        }
    }

    /// Bind the off-screen target and report the render dimensions.
    /// Disabled: report native and leave the framebuffer alone.
    ///
    /// Issues GL directly; callers invalidate the state tracker after.
    pub fn begin_frame(&mut self, gl: &mut dyn GlesContext) -> (i32, i32) {
        if !self.config.enabled {
            return (self.native_w, self.native_h);
        }
        gl.bind_framebuffer(consts::FRAMEBUFFER, self.fbo);
        gl.viewport(0, 0, self.render_w, self.render_h);
        (self.render_w, self.render_h)
    }

    /// Upscale the off-screen colour onto the default framebuffer.
    ///
    /// Issues GL directly; callers invalidate the state tracker after.
    pub fn end_frame(&mut self, gl: &mut dyn GlesContext) {
        if !self.config.enabled {
            return;
        }
        gl.bind_framebuffer(consts::FRAMEBUFFER, 0);
        gl.viewport(0, 0, self.native_w, self.native_h);
        gl.disable(consts::DEPTH_TEST);
        gl.disable(consts::BLEND);

        let use_cas = self.config.sharpening && self.cas_program != 0;
        let program = if use_cas {
            self.cas_program
        } else {
            self.bilinear_program
        };
        gl.use_program(program);
        if use_cas {
            let texel = gl.get_uniform_location(program, "uTexelSize");
            let sharp = gl.get_uniform_location(program, "uSharpness");
            gl.uniform_2f(texel, 1.0 / self.native_w as f32, 1.0 / self.native_h as f32);
            gl.uniform_1f(sharp, self.config.sharpen_amount.clamp(0.0, 1.0));
        }

        gl.active_texture(consts::TEXTURE0);
        gl.bind_texture(consts::TEXTURE_2D, self.color_tex);
        gl.bind_vertex_array(self.quad_vao);
        gl.draw_arrays(consts::TRIANGLES, 0, 6);
        gl.bind_vertex_array(0);
        gl.bind_texture(consts::TEXTURE_2D, 0);
        gl.use_program(0);

        gl.enable(consts::DEPTH_TEST);
    }

    /// Feed one frame time into the adaptive loop; may rebuild the render
    /// target when the proposed scale moves more than a percent.
    pub fn record_frame_time(&mut self, gl: &mut dyn GlesContext, frame_time_ms: f32) {
        if !self.config.enabled {
            return;
        }
        self.history[self.history_index] = frame_time_ms;
        self.history_index = (self.history_index + 1) % HISTORY_SIZE;
        self.history_filled = (self.history_filled + 1).min(HISTORY_SIZE);

        let sum: f32 = self.history[..self.history_filled].iter().sum();
        self.avg_frame_time = sum / self.history_filled as f32;
        self.actual_fps = if self.avg_frame_time > 0.0 {
            1000.0 / self.avg_frame_time
        } else {
            0.0
        };

        let deviation = (self.avg_frame_time - self.target_frame_time) / self.target_frame_time;
        if deviation.abs() > ADJUST_THRESHOLD {
            let proposed = (self.scale - deviation * self.config.adjust_speed)
                .clamp(self.config.min_scale, self.config.max_scale);
            if (proposed - self.scale).abs() > 0.01 {
                self.scale = proposed;
                self.update_render_size(gl);
            }
        }
    }

    pub fn set_scale(&mut self, gl: &mut dyn GlesContext, scale: f32) {
        self.scale = scale.clamp(SCALER_MIN_SCALE, SCALER_MAX_SCALE);
        self.update_render_size(gl);
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn render_size(&self) -> (i32, i32) {
        (self.render_w, self.render_h)
    }

    pub fn native_size(&self) -> (i32, i32) {
        (self.native_w, self.native_h)
    }

    pub fn resize_native(&mut self, gl: &mut dyn GlesContext, native_w: i32, native_h: i32) {
        self.native_w = native_w;
        self.native_h = native_h;
        self.update_render_size(gl);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_sharpening(&mut self, enabled: bool, amount: f32) {
        self.config.sharpening = enabled;
        self.config.sharpen_amount = amount.clamp(0.0, 1.0);
    }

    pub fn actual_fps(&self) -> f32 {
        self.actual_fps
    }

    pub fn scale_changes(&self) -> u32 {
        self.scale_changes
    }

    fn release(&mut self, gl: &mut dyn GlesContext) {
        if self.fbo != 0 {
            gl.delete_framebuffer(std::mem::take(&mut self.fbo));
        }
        if self.color_tex != 0 {
            gl.delete_texture(std::mem::take(&mut self.color_tex));
        }
        if self.depth_tex != 0 {
            gl.delete_texture(std::mem::take(&mut self.depth_tex));
        }
        if self.bilinear_program != 0 {
            gl.delete_program(std::mem::take(&mut self.bilinear_program));
        }
        if self.cas_program != 0 {
            gl.delete_program(std::mem::take(&mut self.cas_program));
        }
        if self.quad_vao != 0 {
            gl.delete_vertex_array(std::mem::take(&mut self.quad_vao));
        }
        if self.quad_vbo != 0 {
            gl.delete_buffer(std::mem::take(&mut self.quad_vbo));
        }
    }

    pub fn destroy(&mut self, gl: &mut dyn GlesContext) {
        self.release(gl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    fn scaler(gl: &mut SimulatedGles) -> ResolutionScaler {
        ResolutionScaler::new(gl, 1920, 1080, ScalerConfig::default()).expect("scaler")
    }

    #[test]
    fn render_target_starts_at_max_scale_and_even_dims() {
        let mut gl = SimulatedGles::new();
        let scaler = scaler(&mut gl);
        let (w, h) = scaler.render_size();
        assert_eq!((w, h), (1920, 1080));
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn sustained_slow_frames_walk_the_scale_down() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);

        let mut last = scaler.scale();
        let mut decreases = 0;
        for _ in 0..60 {
            scaler.record_frame_time(&mut gl, 25.0);
            let now = scaler.scale();
            assert!(now <= last);
            if now < last {
                decreases += 1;
            }
            last = now;
        }
        assert!(decreases > 0);
        assert!(scaler.scale() >= 0.5);
        assert!(scaler.scale_changes() > 0);

        let (w, h) = scaler.render_size();
        assert!(w > 0 && h > 0);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn fast_frames_walk_the_scale_back_up() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);

        for _ in 0..60 {
            scaler.record_frame_time(&mut gl, 25.0);
        }
        let low = scaler.scale();
        for _ in 0..120 {
            scaler.record_frame_time(&mut gl, 5.0);
        }
        assert!(scaler.scale() > low);
        assert!(scaler.scale() <= 1.0);
    }

    #[test]
    fn on_target_frames_leave_scale_alone() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);

        for _ in 0..120 {
            scaler.record_frame_time(&mut gl, 1000.0 / 60.0);
        }
        assert_eq!(scaler.scale(), 1.0);
        assert_eq!(scaler.scale_changes(), 0);
    }

    #[test]
    fn manual_scale_clamps_and_rebuilds() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);

        scaler.set_scale(&mut gl, 0.1);
        assert_eq!(scaler.scale(), SCALER_MIN_SCALE);
        // 1920 * 0.25 = 480; 1080 * 0.25 = 270, both rounded up to even.
        assert_eq!(scaler.render_size(), (480, 270));
        assert!(scaler.scale_changes() >= 1);
    }

    #[test]
    fn minimum_dimension_floor_is_64() {
        let mut gl = SimulatedGles::new();
        let mut small = ResolutionScaler::new(&mut gl, 100, 100, ScalerConfig::default()).unwrap();
        small.set_scale(&mut gl, 0.25);
        let (w, h) = small.render_size();
        assert_eq!((w, h), (64, 64));
    }

    #[test]
    fn disabled_scaler_reports_native_and_never_rebinds() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);
        scaler.set_enabled(false);
        gl.clear_calls();

        assert_eq!(scaler.begin_frame(&mut gl), (1920, 1080));
        scaler.end_frame(&mut gl);
        assert_eq!(gl.call_count("bind_framebuffer"), 0);
        assert_eq!(gl.call_count("draw_arrays"), 0);
    }

    #[test]
    fn upscale_pass_draws_one_fullscreen_quad() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);
        gl.clear_calls();

        scaler.begin_frame(&mut gl);
        scaler.end_frame(&mut gl);
        assert_eq!(gl.call_count("draw_arrays"), 1);
        // Depth test restored after the pass.
        assert!(gl.calls().last().unwrap().starts_with("enable(0x0b71)"));
    }

    #[test]
    fn incomplete_framebuffer_fails_construction() {
        let mut gl = SimulatedGles::new();
        gl.framebuffer_status = 0x8CD6;
        let result = ResolutionScaler::new(&mut gl, 1920, 1080, ScalerConfig::default());
        assert!(matches!(result, Err(VglError::FramebufferIncomplete(_))));
        assert_eq!(gl.live_textures(), 0);
        assert_eq!(gl.live_framebuffers(), 0);
    }

    #[test]
    fn destroy_releases_every_gl_object() {
        let mut gl = SimulatedGles::new();
        let mut scaler = scaler(&mut gl);
        scaler.destroy(&mut gl);
        assert_eq!(gl.live_textures(), 0);
        assert_eq!(gl.live_framebuffers(), 0);
    }
}
