//! Runtime counters, exposed as one plain snapshot struct.

use serde::Serialize;
use std::time::Instant;

/// Snapshot of every counter the wrapper maintains.
///
/// `repr(C)` so the snapshot can cross the C ABI by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocityStats {
    pub current_fps: f32,
    pub avg_fps: f32,
    pub frame_time_ms: f32,

    pub draw_calls_submitted: u32,
    pub draw_calls_executed: u32,
    pub draw_calls_saved: u32,
    pub batches_created: u32,
    pub triangles: u64,

    pub state_changes_applied: u32,
    pub state_changes_avoided: u32,

    pub shader_cache_hits: u32,
    pub shader_cache_misses: u32,
    pub shader_cache_bytes: usize,

    pub buffer_bytes_allocated: usize,
    pub buffer_bytes_used: usize,

    pub resolution_scale: f32,
    pub render_width: i32,
    pub render_height: i32,
    pub scale_changes: u32,
}

const FPS_WINDOW: usize = 60;

/// Frame timing with a rolling average over the last 60 frames.
pub struct FrameClock {
    frame_start: Option<Instant>,
    history: [f32; FPS_WINDOW],
    index: usize,
    filled: usize,
    pub frame_time_ms: f32,
    pub current_fps: f32,
    pub avg_fps: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            frame_start: None,
            history: [0.0; FPS_WINDOW],
            index: 0,
            filled: 0,
            frame_time_ms: 0.0,
            current_fps: 0.0,
            avg_fps: 0.0,
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Close the frame and return its duration in milliseconds.
    pub fn end_frame(&mut self) -> f32 {
        let Some(start) = self.frame_start.take() else {
            return 0.0;
        };
        let ms = start.elapsed().as_secs_f32() * 1000.0;
        self.record_ms(ms);
        ms
    }

    /// Feed an externally measured frame time (used by tests and by hosts
    /// that pace frames themselves).
    pub fn record_ms(&mut self, ms: f32) {
        self.frame_time_ms = ms;
        self.current_fps = if ms > 0.0 { 1000.0 / ms } else { 0.0 };
        self.history[self.index] = self.current_fps;
        self.index = (self.index + 1) % FPS_WINDOW;
        self.filled = (self.filled + 1).min(FPS_WINDOW);
        if self.filled > 0 {
            self.avg_fps = self.history[..self.filled].iter().sum::<f32>() / self.filled as f32;
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_average_converges() {
        let mut clock = FrameClock::new();
        for _ in 0..120 {
            clock.record_ms(20.0);
        }
        assert!((clock.current_fps - 50.0).abs() < 0.01);
        assert!((clock.avg_fps - 50.0).abs() < 0.01);
    }

    #[test]
    fn partial_window_ignores_unfilled_slots() {
        let mut clock = FrameClock::new();
        clock.record_ms(10.0);
        assert!((clock.avg_fps - 100.0).abs() < 0.01);
    }
}
