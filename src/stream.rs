//! Per-frame streaming ring.
//!
//! One backing buffer split into three equal regions indexed by a rolling
//! frame counter. A region is rewritten only after the fence inserted at
//! the end of its last frame has signalled; the wait is bounded and a
//! timeout is a warning, not an error. Only the rendering thread touches
//! the ring, so there is no lock.

use tracing::warn;

use crate::gles::{consts, GlFence, GlesContext};
use crate::pool::{align_up, MappedPtr, BUFFER_ALIGNMENT};

pub const STREAM_REGIONS: usize = 3;

/// Returned by [`StreamingRing::alloc`] when the current region is full.
pub const STREAM_SENTINEL: usize = usize::MAX;

const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

pub struct StreamingRing {
    buffer: u32,
    target: u32,
    region_size: usize,
    frame: usize,
    cursor: usize,
    fences: [GlFence; STREAM_REGIONS],
    mapped: Option<MappedPtr>,
    overflows: u32,
    fence_timeouts: u32,
}

impl StreamingRing {
    /// `total_size` is split three ways; it is rounded down to a multiple
    /// of `3 * BUFFER_ALIGNMENT` so the regions stay aligned.
    pub fn new(
        gl: &mut dyn GlesContext,
        total_size: usize,
        persistent: bool,
    ) -> Option<Self> {
        let region_size = (total_size / STREAM_REGIONS) & !(BUFFER_ALIGNMENT - 1);
        if region_size == 0 {
            warn!(total_size, "streaming ring too small, disabled");
            return None;
        }
        let total = region_size * STREAM_REGIONS;
        let target = consts::ARRAY_BUFFER;

        let buffer = gl.gen_buffer();
        if buffer == 0 {
            warn!("streaming ring buffer creation failed");
            return None;
        }
        gl.bind_buffer(target, buffer);

        let mut mapped = None;
        if persistent {
            let flags = consts::MAP_WRITE_BIT | consts::MAP_PERSISTENT_BIT | consts::MAP_COHERENT_BIT;
            if gl.buffer_storage(target, total, flags) {
                let ptr = gl.map_buffer_range(target, 0, total, flags);
                if !ptr.is_null() {
                    mapped = Some(MappedPtr(ptr));
                }
            }
        }
        if mapped.is_none() {
            gl.buffer_data(target, total, None, consts::STREAM_DRAW);
        }
        gl.bind_buffer(target, 0);

        Some(Self {
            buffer,
            target,
            region_size,
            // `begin_frame` advances first, so the first frame lands on
            // region 0.
            frame: STREAM_REGIONS - 1,
            cursor: 0,
            fences: [0; STREAM_REGIONS],
            mapped,
            overflows: 0,
            fence_timeouts: 0,
        })
    }

    pub fn buffer(&self) -> u32 {
        self.buffer
    }

    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn fence_timeouts(&self) -> u32 {
        self.fence_timeouts
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Advance to the next region, waiting (bounded) for the GPU to release
    /// it, then reset the intra-frame cursor.
    pub fn begin_frame(&mut self, gl: &mut dyn GlesContext) {
        self.frame = (self.frame + 1) % STREAM_REGIONS;

        let fence = std::mem::take(&mut self.fences[self.frame]);
        if fence != 0 {
            let status =
                gl.client_wait_sync(fence, consts::SYNC_FLUSH_COMMANDS_BIT, FENCE_TIMEOUT_NS);
            if status == consts::TIMEOUT_EXPIRED || status == consts::WAIT_FAILED {
                self.fence_timeouts += 1;
                warn!(
                    region = self.frame,
                    "streaming fence wait timed out, writing anyway"
                );
            }
            gl.delete_sync(fence);
        }

        self.cursor = self.frame * self.region_size;
    }

    /// Append `data` to the current region. Returns the absolute byte
    /// offset inside the backing buffer, or [`STREAM_SENTINEL`] when the
    /// region cannot hold it (the data is not committed).
    pub fn alloc(&mut self, gl: &mut dyn GlesContext, data: &[u8]) -> usize {
        let aligned = align_up(data.len(), BUFFER_ALIGNMENT);
        let region_end = (self.frame + 1) * self.region_size;
        if self.cursor + aligned > region_end {
            self.overflows += 1;
            warn!(
                requested = data.len(),
                remaining = region_end - self.cursor,
                "streaming ring overflow"
            );
            return STREAM_SENTINEL;
        }

        let offset = self.cursor;
        self.cursor += aligned;

        match self.mapped {
            Some(base) => unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), base.0.add(offset), data.len());
            },
            None => {
                gl.bind_buffer(self.target, self.buffer);
                gl.buffer_sub_data(self.target, offset, data);
                gl.bind_buffer(self.target, 0);
            }
        }
        offset
    }

    /// Fence the region written this frame.
    pub fn end_frame(&mut self, gl: &mut dyn GlesContext) {
        if self.fences[self.frame] != 0 {
            gl.delete_sync(self.fences[self.frame]);
        }
        self.fences[self.frame] = gl.fence_sync();
    }

    pub fn destroy(&mut self, gl: &mut dyn GlesContext) {
        for fence in &mut self.fences {
            if *fence != 0 {
                gl.delete_sync(std::mem::take(fence));
            }
        }
        if self.mapped.take().is_some() {
            gl.bind_buffer(self.target, self.buffer);
            gl.unmap_buffer(self.target);
            gl.bind_buffer(self.target, 0);
        }
        if self.buffer != 0 {
            gl.delete_buffer(std::mem::take(&mut self.buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    fn ring(gl: &mut SimulatedGles, total: usize) -> StreamingRing {
        StreamingRing::new(gl, total, true).expect("ring")
    }

    #[test]
    fn regions_rotate_and_fence() {
        let mut gl = SimulatedGles::new();
        let mut ring = ring(&mut gl, 3 * 64 * 1024);

        for expected_region in [0usize, 1, 2, 0] {
            ring.begin_frame(&mut gl);
            let offset = ring.alloc(&mut gl, &[1, 2, 3, 4]);
            assert_eq!(offset, expected_region * ring.region_size());
            ring.end_frame(&mut gl);
        }
        // One fence per region in flight, none leaked beyond that.
        assert!(gl.live_fences() <= 3);
    }

    #[test]
    fn overflow_returns_sentinel_and_commits_nothing() {
        let mut gl = SimulatedGles::new();
        let mut ring = ring(&mut gl, 3 * 64 * 1024);

        ring.begin_frame(&mut gl);
        let data = vec![0x5A; 70 * 1024];
        assert_eq!(ring.alloc(&mut gl, &data), STREAM_SENTINEL);
        assert_eq!(ring.overflows(), 1);

        // The region is still usable for something that fits.
        let ok = ring.alloc(&mut gl, &[1; 1024]);
        assert_ne!(ok, STREAM_SENTINEL);
    }

    #[test]
    fn writes_land_at_returned_offsets() {
        let mut gl = SimulatedGles::new();
        let mut ring = ring(&mut gl, 3 * 4096);

        ring.begin_frame(&mut gl);
        let a = ring.alloc(&mut gl, &[0xAA; 8]);
        let b = ring.alloc(&mut gl, &[0xBB; 8]);
        assert_eq!(b - a, 256);

        let contents = gl.buffer_contents(ring.buffer()).unwrap();
        assert_eq!(&contents[a..a + 8], &[0xAA; 8]);
        assert_eq!(&contents[b..b + 8], &[0xBB; 8]);
    }

    #[test]
    fn fence_timeout_is_nonfatal() {
        let mut gl = SimulatedGles::new();
        let mut ring = ring(&mut gl, 3 * 4096);

        for _ in 0..4 {
            ring.begin_frame(&mut gl);
            ring.alloc(&mut gl, &[0; 64]);
            ring.end_frame(&mut gl);
        }
        gl.force_fence_timeout = true;
        ring.begin_frame(&mut gl);
        assert_eq!(ring.fence_timeouts(), 1);
        // Write proceeds anyway.
        assert_ne!(ring.alloc(&mut gl, &[0; 64]), STREAM_SENTINEL);
    }

    #[test]
    fn sub_data_path_without_persistent_mapping() {
        let mut gl = SimulatedGles::new().without_extension("GL_EXT_buffer_storage");
        let mut ring = StreamingRing::new(&mut gl, 3 * 4096, false).expect("ring");

        ring.begin_frame(&mut gl);
        let offset = ring.alloc(&mut gl, &[9; 16]);
        assert_ne!(offset, STREAM_SENTINEL);
        assert!(gl.call_count("buffer_sub_data") >= 1);
    }
}
