//! Draw-call batcher.
//!
//! Draw commands are queued per frame, stably sorted by batch key, and
//! contiguous runs with equal key and kind are coalesced. When the device
//! has a multi-draw surface a run becomes one emission; otherwise the run
//! is issued call-by-call and the savings stay at zero.

use tracing::warn;

use crate::gles::{consts, GlesContext};
use crate::hash::fnv1a;

/// Equality of this tuple decides whether two draws can coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchKey {
    pub program: u32,
    pub vao: u32,
    pub texture0: u32,
    pub texture1: u32,
    pub mode: u32,
    pub state_hash: u64,
}

impl BatchKey {
    fn sort_hash(&self) -> u64 {
        let mut bytes = [0u8; 28];
        bytes[0..4].copy_from_slice(&self.program.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.vao.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.texture0.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.texture1.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.mode.to_le_bytes());
        bytes[20..28].copy_from_slice(&self.state_hash.to_le_bytes());
        fnv1a(&bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawKind {
    Arrays,
    Elements,
    ArraysInstanced,
    ElementsInstanced,
}

#[derive(Debug, Clone, Copy)]
struct DrawCommand {
    kind: DrawKind,
    mode: u32,
    first: i32,
    count: i32,
    index_type: u32,
    index_offset: usize,
    instances: i32,
    key: BatchKey,
}

/// Per-frame counters; `submitted == executed + saved` holds after every
/// flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub submitted: u32,
    pub executed: u32,
    pub saved: u32,
    pub batches: u32,
    pub triangles: u64,
}

pub struct DrawBatcher {
    queue: Vec<DrawCommand>,
    capacity: usize,
    current_key: BatchKey,
    enabled: bool,
    instancing: bool,
    min_batch_size: usize,
    multi_draw: bool,
    stats: BatchStats,
}

impl DrawBatcher {
    pub fn new(capacity: usize, enabled: bool, instancing: bool, multi_draw: bool) -> Self {
        Self {
            queue: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            current_key: BatchKey::default(),
            enabled,
            instancing,
            min_batch_size: 2,
            multi_draw,
            stats: BatchStats::default(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_instancing(&mut self, enabled: bool) {
        self.instancing = enabled;
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Key applied to subsequently submitted draws; the draw's primitive
    /// mode is folded in at submit time.
    pub fn set_key(&mut self, key: BatchKey) {
        self.current_key = key;
    }

    pub fn begin_frame(&mut self) {
        self.queue.clear();
        self.stats = BatchStats::default();
    }

    fn submit(&mut self, gl: &mut dyn GlesContext, cmd: DrawCommand) {
        if self.queue.len() >= self.capacity {
            warn!(capacity = self.capacity, "draw queue full, flushing early");
            self.flush(gl);
        }
        self.queue.push(cmd);
        self.stats.submitted += 1;
    }

    pub fn draw_arrays(&mut self, gl: &mut dyn GlesContext, mode: u32, first: i32, count: i32) {
        let mut key = self.current_key;
        key.mode = mode;
        self.submit(
            gl,
            DrawCommand {
                kind: DrawKind::Arrays,
                mode,
                first,
                count,
                index_type: 0,
                index_offset: 0,
                instances: 1,
                key,
            },
        );
    }

    pub fn draw_elements(
        &mut self,
        gl: &mut dyn GlesContext,
        mode: u32,
        count: i32,
        index_type: u32,
        index_offset: usize,
    ) {
        let mut key = self.current_key;
        key.mode = mode;
        self.submit(
            gl,
            DrawCommand {
                kind: DrawKind::Elements,
                mode,
                first: 0,
                count,
                index_type,
                index_offset,
                instances: 1,
                key,
            },
        );
    }

    pub fn draw_arrays_instanced(
        &mut self,
        gl: &mut dyn GlesContext,
        mode: u32,
        first: i32,
        count: i32,
        instances: i32,
    ) {
        let mut key = self.current_key;
        key.mode = mode;
        self.submit(
            gl,
            DrawCommand {
                kind: DrawKind::ArraysInstanced,
                mode,
                first,
                count,
                index_type: 0,
                index_offset: 0,
                instances,
                key,
            },
        );
    }

    pub fn draw_elements_instanced(
        &mut self,
        gl: &mut dyn GlesContext,
        mode: u32,
        count: i32,
        index_type: u32,
        index_offset: usize,
        instances: i32,
    ) {
        let mut key = self.current_key;
        key.mode = mode;
        self.submit(
            gl,
            DrawCommand {
                kind: DrawKind::ElementsInstanced,
                mode,
                first: 0,
                count,
                index_type,
                index_offset,
                instances,
                key,
            },
        );
    }

    /// Sort, group, and issue everything queued.
    ///
    /// The batcher talks to the device directly here; the caller must
    /// invalidate the state tracker afterwards.
    pub fn flush(&mut self, gl: &mut dyn GlesContext) {
        if self.queue.is_empty() {
            return;
        }
        if self.enabled {
            // Stable: equal keys keep submit order.
            self.queue.sort_by_key(|cmd| cmd.key.sort_hash());
        }

        let queue = std::mem::take(&mut self.queue);
        let mut start = 0;
        while start < queue.len() {
            let head = queue[start];
            let mut end = start + 1;
            while end < queue.len()
                && queue[end].key == head.key
                && queue[end].kind == head.kind
            {
                end += 1;
            }
            self.emit_run(gl, &queue[start..end]);
            start = end;
        }
        self.queue = queue;
        self.queue.clear();
    }

    fn apply_run_state(&self, gl: &mut dyn GlesContext, key: &BatchKey) {
        if key.program != 0 {
            gl.use_program(key.program);
        }
        if key.vao != 0 {
            gl.bind_vertex_array(key.vao);
        }
        if key.texture0 != 0 {
            gl.active_texture(consts::TEXTURE0);
            gl.bind_texture(consts::TEXTURE_2D, key.texture0);
        }
    }

    fn emit_run(&mut self, gl: &mut dyn GlesContext, run: &[DrawCommand]) {
        let head = run[0];
        self.apply_run_state(gl, &head.key);

        for cmd in run {
            let prims = if cmd.mode == consts::TRIANGLES {
                (cmd.count / 3).max(0) as u64
            } else {
                0
            };
            self.stats.triangles += prims * cmd.instances.max(1) as u64;
        }

        let batchable = matches!(head.kind, DrawKind::Arrays | DrawKind::Elements);
        if self.enabled && batchable && run.len() >= self.min_batch_size {
            self.stats.batches += 1;
            if self.multi_draw {
                match head.kind {
                    DrawKind::Arrays => {
                        let firsts: Vec<i32> = run.iter().map(|c| c.first).collect();
                        let counts: Vec<i32> = run.iter().map(|c| c.count).collect();
                        gl.multi_draw_arrays(head.mode, &firsts, &counts);
                    }
                    DrawKind::Elements => {
                        let counts: Vec<i32> = run.iter().map(|c| c.count).collect();
                        let offsets: Vec<usize> = run.iter().map(|c| c.index_offset).collect();
                        gl.multi_draw_elements(head.mode, &counts, head.index_type, &offsets);
                    }
                    _ => unreachable!(),
                }
                self.stats.executed += 1;
                self.stats.saved += (run.len() - 1) as u32;
                return;
            }
            // No native multi-draw: issue individually, honest zero savings.
        }

        for cmd in run {
            self.emit_single(gl, cmd);
        }
    }

    fn emit_single(&mut self, gl: &mut dyn GlesContext, cmd: &DrawCommand) {
        match cmd.kind {
            DrawKind::Arrays => gl.draw_arrays(cmd.mode, cmd.first, cmd.count),
            DrawKind::Elements => {
                gl.draw_elements(cmd.mode, cmd.count, cmd.index_type, cmd.index_offset)
            }
            DrawKind::ArraysInstanced => {
                gl.draw_arrays_instanced(cmd.mode, cmd.first, cmd.count, cmd.instances)
            }
            DrawKind::ElementsInstanced => gl.draw_elements_instanced(
                cmd.mode,
                cmd.count,
                cmd.index_type,
                cmd.index_offset,
                cmd.instances,
            ),
        }
        self.stats.executed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    fn key(program: u32, vao: u32, tex: u32) -> BatchKey {
        BatchKey {
            program,
            vao,
            texture0: tex,
            texture1: 0,
            mode: 0,
            state_hash: 0x1234,
        }
    }

    #[test]
    fn eight_equal_draws_coalesce_into_one_batch() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, true);

        batcher.set_key(key(1, 2, 3));
        for _ in 0..8 {
            batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 6);
        }
        batcher.flush(&mut gl);

        let stats = batcher.stats();
        assert_eq!(stats.submitted, 8);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.saved, 7);
        assert_eq!(stats.executed + stats.saved, stats.submitted);
        assert_eq!(gl.call_count("multi_draw_arrays"), 1);
        assert_eq!(gl.call_count("draw_arrays"), 0);
    }

    #[test]
    fn no_multi_draw_reports_zero_savings() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, false);

        batcher.set_key(key(1, 2, 3));
        for _ in 0..8 {
            batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 6);
        }
        batcher.flush(&mut gl);

        let stats = batcher.stats();
        assert_eq!(stats.submitted, 8);
        assert_eq!(stats.saved, 0);
        assert_eq!(stats.executed, 8);
        assert_eq!(gl.call_count("draw_arrays"), 8);
    }

    #[test]
    fn different_keys_do_not_coalesce() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, true);

        batcher.set_key(key(1, 2, 3));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 6);
        batcher.set_key(key(9, 2, 3));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 6);
        batcher.flush(&mut gl);

        let stats = batcher.stats();
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.saved, 0);
    }

    #[test]
    fn equal_key_emission_keeps_submit_order() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, false);

        batcher.set_key(key(1, 2, 3));
        for first in [10, 20, 30] {
            batcher.draw_arrays(&mut gl, consts::TRIANGLES, first, 3);
        }
        batcher.flush(&mut gl);

        let calls = gl.calls();
        let draws: Vec<&String> = calls
            .iter()
            .filter(|c| c.starts_with("draw_arrays("))
            .collect();
        assert_eq!(draws.len(), 3);
        assert!(draws[0].contains(", 10, "));
        assert!(draws[1].contains(", 20, "));
        assert!(draws[2].contains(", 30, "));
    }

    #[test]
    fn instanced_draws_never_batch() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, true);

        batcher.set_key(key(1, 2, 3));
        for _ in 0..4 {
            batcher.draw_arrays_instanced(&mut gl, consts::TRIANGLES, 0, 6, 10);
        }
        batcher.flush(&mut gl);

        let stats = batcher.stats();
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.executed, 4);
        assert_eq!(stats.saved, 0);
        assert_eq!(gl.call_count("draw_arrays_instanced"), 4);
    }

    #[test]
    fn queue_overflow_flushes_early() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(4, true, true, true);

        batcher.set_key(key(1, 2, 3));
        for _ in 0..5 {
            batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 3);
        }
        // First four flushed as one multi-draw; the fifth is still queued.
        assert_eq!(batcher.queued(), 1);
        assert_eq!(gl.call_count("multi_draw_arrays"), 1);

        batcher.flush(&mut gl);
        let stats = batcher.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.executed + stats.saved, 5);
    }

    #[test]
    fn batch_state_applied_once_per_run() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, true);

        batcher.set_key(key(7, 8, 9));
        for _ in 0..6 {
            batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 3);
        }
        batcher.flush(&mut gl);
        assert_eq!(gl.call_count("use_program"), 1);
        assert_eq!(gl.call_count("bind_vertex_array"), 1);
        assert_eq!(gl.call_count("bind_texture"), 1);
    }

    #[test]
    fn disabled_batching_emits_in_submit_order_without_sorting() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, false, true, true);

        batcher.set_key(key(1, 0, 0));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 1, 3);
        batcher.set_key(key(2, 0, 0));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 2, 3);
        batcher.set_key(key(1, 0, 0));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 3, 3);
        batcher.flush(&mut gl);

        let stats = batcher.stats();
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.saved, 0);
        let calls = gl.calls();
        let draws: Vec<&String> = calls
            .iter()
            .filter(|c| c.starts_with("draw_arrays("))
            .collect();
        assert!(draws[0].contains(", 1, "));
        assert!(draws[1].contains(", 2, "));
        assert!(draws[2].contains(", 3, "));
    }

    #[test]
    fn triangle_accounting_scales_with_instances() {
        let mut gl = SimulatedGles::new();
        let mut batcher = DrawBatcher::new(1024, true, true, true);

        batcher.set_key(key(1, 2, 3));
        batcher.draw_arrays(&mut gl, consts::TRIANGLES, 0, 6);
        batcher.draw_arrays_instanced(&mut gl, consts::TRIANGLES, 0, 6, 5);
        batcher.flush(&mut gl);
        assert_eq!(batcher.stats().triangles, 2 + 10);
    }
}
