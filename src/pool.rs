//! GPU buffer pools.
//!
//! Each pool owns one large backing buffer and sub-allocates it through a
//! best-fit free list. When the device advertises `GL_EXT_buffer_storage`
//! the backing store is persistently mapped once for the pool's lifetime
//! and uploads become plain memcpys; otherwise uploads go through
//! `glBufferSubData`.
//!
//! The free list sits behind its own mutex so non-render threads may
//! allocate and free; the mutex is never held across a GL call.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::gles::{consts, GlesContext};

/// GPU offset alignment for sub-allocations.
pub const BUFFER_ALIGNMENT: usize = 256;

pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Host-visible base pointer of a persistently mapped buffer.
///
/// Safety: the mapping is created once, stays stable for the pool's
/// lifetime, and GPU buffers are only mutated on the rendering thread; the
/// pointer itself is just an address.
#[derive(Clone, Copy)]
pub(crate) struct MappedPtr(pub *mut u8);

unsafe impl Send for MappedPtr {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    offset: usize,
    size: usize,
    free: bool,
}

#[derive(Debug)]
struct FreeList {
    blocks: Vec<Block>,
    free_bytes: usize,
    used_bytes: usize,
    alloc_count: u32,
}

impl FreeList {
    fn new(size: usize) -> Self {
        Self {
            blocks: vec![Block {
                offset: 0,
                size,
                free: true,
            }],
            free_bytes: size,
            used_bytes: 0,
            alloc_count: 0,
        }
    }

    /// Best fit: smallest free block that holds `size` bytes.
    fn alloc(&mut self, size: usize) -> Option<usize> {
        let best = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.free && b.size >= size)
            .min_by_key(|(_, b)| b.size)
            .map(|(i, _)| i)?;

        // Carve the tail off when the surplus exceeds one alignment unit.
        if self.blocks[best].size > size + BUFFER_ALIGNMENT {
            let tail = Block {
                offset: self.blocks[best].offset + size,
                size: self.blocks[best].size - size,
                free: true,
            };
            self.blocks[best].size = size;
            self.blocks.insert(best + 1, tail);
        }

        let block = &mut self.blocks[best];
        block.free = false;
        self.free_bytes -= block.size;
        self.used_bytes += block.size;
        self.alloc_count += 1;
        Some(best)
    }

    /// Mark the block at `offset` free and coalesce with both neighbours.
    fn free(&mut self, offset: usize) -> bool {
        let Some(index) = self.blocks.iter().position(|b| b.offset == offset && !b.free) else {
            return false;
        };
        self.blocks[index].free = true;
        self.free_bytes += self.blocks[index].size;
        self.used_bytes -= self.blocks[index].size;

        // Right neighbour first so the left merge sees the combined size.
        if index + 1 < self.blocks.len() && self.blocks[index + 1].free {
            self.blocks[index].size += self.blocks[index + 1].size;
            self.blocks.remove(index + 1);
        }
        if index > 0 && self.blocks[index - 1].free {
            self.blocks[index - 1].size += self.blocks[index].size;
            self.blocks.remove(index);
        }
        true
    }
}

/// A sub-range handed out by [`BufferPool::alloc`].
#[derive(Debug, Clone, Copy)]
pub struct BufferAllocation {
    pub pool: usize,
    /// Backing GL buffer name.
    pub buffer: u32,
    pub offset: usize,
    /// Requested size.
    pub size: usize,
    /// Size actually reserved after alignment.
    pub aligned_size: usize,
    mapped: Option<MappedPtr>,
}

impl std::fmt::Debug for MappedPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappedPtr({:p})", self.0)
    }
}

impl BufferAllocation {
    /// Host-visible pointer when the pool is persistently mapped.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.mapped.map(|p| p.0)
    }
}

pub struct BufferPool {
    id: usize,
    target: u32,
    usage: u32,
    size: usize,
    buffer: u32,
    mapped: Option<MappedPtr>,
    inner: Mutex<FreeList>,
}

impl BufferPool {
    fn create(
        gl: &mut dyn GlesContext,
        id: usize,
        target: u32,
        usage: u32,
        size: usize,
        want_persistent: bool,
    ) -> Option<Self> {
        let buffer = gl.gen_buffer();
        if buffer == 0 {
            warn!("buffer pool creation failed for target 0x{target:x}");
            return None;
        }
        gl.bind_buffer(target, buffer);

        let mut mapped = None;
        if want_persistent {
            let flags = consts::MAP_WRITE_BIT | consts::MAP_PERSISTENT_BIT | consts::MAP_COHERENT_BIT;
            if gl.buffer_storage(target, size, flags) {
                let ptr = gl.map_buffer_range(target, 0, size, flags);
                if ptr.is_null() {
                    warn!("persistent mapping failed, falling back to dynamic storage");
                } else {
                    mapped = Some(MappedPtr(ptr));
                }
            }
        }
        if mapped.is_none() {
            gl.buffer_data(target, size, None, usage);
        }
        gl.bind_buffer(target, 0);

        info!(
            pool = id,
            size_kb = size / 1024,
            persistent = mapped.is_some(),
            "created buffer pool for target 0x{target:x}"
        );

        Some(Self {
            id,
            target,
            usage,
            size,
            buffer,
            mapped,
            inner: Mutex::new(FreeList::new(size)),
        })
    }

    pub fn alloc(&self, size: usize) -> Option<BufferAllocation> {
        if size == 0 {
            return None;
        }
        let aligned = align_up(size, BUFFER_ALIGNMENT);
        let mut inner = self.inner.lock().expect("pool free list poisoned");
        let Some(index) = inner.alloc(aligned) else {
            warn!(
                pool = self.id,
                requested = aligned,
                free = inner.free_bytes,
                "pool allocation failed"
            );
            return None;
        };
        let block = inner.blocks[index];
        drop(inner);

        Some(BufferAllocation {
            pool: self.id,
            buffer: self.buffer,
            offset: block.offset,
            size,
            aligned_size: block.size,
            mapped: self
                .mapped
                .map(|base| MappedPtr(unsafe { base.0.add(block.offset) })),
        })
    }

    pub fn free(&self, allocation: &BufferAllocation) {
        let mut inner = self.inner.lock().expect("pool free list poisoned");
        if !inner.free(allocation.offset) {
            warn!(pool = self.id, offset = allocation.offset, "double free ignored");
        }
    }

    /// Copy `data` into the allocation at `offset` bytes from its start.
    pub fn upload(
        &self,
        gl: &mut dyn GlesContext,
        allocation: &BufferAllocation,
        offset: usize,
        data: &[u8],
    ) {
        if offset + data.len() > allocation.size {
            warn!(pool = self.id, "upload out of bounds, dropped");
            return;
        }
        match allocation.mapped {
            Some(base) => unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), base.0.add(offset), data.len());
            },
            None => {
                gl.bind_buffer(self.target, self.buffer);
                gl.buffer_sub_data(self.target, allocation.offset + offset, data);
                gl.bind_buffer(self.target, 0);
            }
        }
    }

    /// Map a sub-range for writing. Persistent pools return the stable
    /// pointer; others map through the device.
    pub fn map(
        &self,
        gl: &mut dyn GlesContext,
        allocation: &BufferAllocation,
        offset: usize,
        size: usize,
    ) -> *mut u8 {
        if offset + size > allocation.size {
            return std::ptr::null_mut();
        }
        match allocation.mapped {
            Some(base) => unsafe { base.0.add(offset) },
            None => {
                gl.bind_buffer(self.target, self.buffer);
                gl.map_buffer_range(
                    self.target,
                    allocation.offset + offset,
                    size,
                    consts::MAP_WRITE_BIT | consts::MAP_INVALIDATE_RANGE_BIT,
                )
            }
        }
    }

    pub fn unmap(&self, gl: &mut dyn GlesContext, allocation: &BufferAllocation) {
        if allocation.mapped.is_some() {
            return; // Persistent mapping stays.
        }
        gl.bind_buffer(self.target, self.buffer);
        gl.unmap_buffer(self.target);
        gl.bind_buffer(self.target, 0);
    }

    /// Coherent mappings need no flush; only the non-persistent map path
    /// forwards to the device.
    pub fn flush(
        &self,
        gl: &mut dyn GlesContext,
        allocation: &BufferAllocation,
        offset: usize,
        size: usize,
    ) {
        if allocation.mapped.is_some() {
            return;
        }
        gl.bind_buffer(self.target, self.buffer);
        gl.flush_mapped_buffer_range(self.target, allocation.offset + offset, size);
        gl.bind_buffer(self.target, 0);
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn free_bytes(&self) -> usize {
        self.inner.lock().expect("pool free list poisoned").free_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.inner.lock().expect("pool free list poisoned").used_bytes
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().expect("pool free list poisoned").blocks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.used_bytes() == 0
    }

    fn destroy(&mut self, gl: &mut dyn GlesContext) {
        if self.mapped.take().is_some() {
            gl.bind_buffer(self.target, self.buffer);
            gl.unmap_buffer(self.target);
            gl.bind_buffer(self.target, 0);
        }
        gl.delete_buffer(self.buffer);
        self.buffer = 0;
    }
}

/// Owns every pool plus the byte accounting behind `get_memory_usage`.
pub struct BufferManager {
    pools: Vec<Option<BufferPool>>,
    persistent_supported: bool,
    persistent_enabled: bool,
}

impl BufferManager {
    pub fn new(persistent_supported: bool, persistent_enabled: bool) -> Self {
        Self {
            pools: Vec::new(),
            persistent_supported,
            persistent_enabled,
        }
    }

    pub fn create_pool(
        &mut self,
        gl: &mut dyn GlesContext,
        target: u32,
        usage: u32,
        size: usize,
    ) -> Option<usize> {
        let id = self.pools.len();
        let want_persistent = self.persistent_supported
            && self.persistent_enabled
            && (usage == consts::DYNAMIC_DRAW || usage == consts::STREAM_DRAW);
        let pool = BufferPool::create(gl, id, target, usage, size, want_persistent)?;
        self.pools.push(Some(pool));
        Some(id)
    }

    pub fn pool(&self, id: usize) -> Option<&BufferPool> {
        self.pools.get(id).and_then(|p| p.as_ref())
    }

    pub fn alloc(&self, pool: usize, size: usize) -> Option<BufferAllocation> {
        self.pool(pool)?.alloc(size)
    }

    pub fn free(&self, allocation: &BufferAllocation) {
        if let Some(pool) = self.pool(allocation.pool) {
            pool.free(allocation);
        }
    }

    pub fn destroy_pool(&mut self, gl: &mut dyn GlesContext, id: usize) {
        if let Some(slot) = self.pools.get_mut(id) {
            if let Some(mut pool) = slot.take() {
                pool.destroy(gl);
            }
        }
    }

    /// Release every pool with no live allocations (trim level 0).
    pub fn trim(&mut self, gl: &mut dyn GlesContext) -> usize {
        let mut released = 0;
        for slot in &mut self.pools {
            if slot.as_ref().is_some_and(|p| p.is_idle()) {
                if let Some(mut pool) = slot.take() {
                    pool.destroy(gl);
                    released += 1;
                }
            }
        }
        if released > 0 {
            info!(released, "trimmed idle buffer pools");
        }
        released
    }

    pub fn total_allocated(&self) -> usize {
        self.pools
            .iter()
            .flatten()
            .map(|p| p.size)
            .sum()
    }

    pub fn total_used(&self) -> usize {
        self.pools.iter().flatten().map(|p| p.used_bytes()).sum()
    }

    pub fn shutdown(&mut self, gl: &mut dyn GlesContext) {
        for slot in &mut self.pools {
            if let Some(mut pool) = slot.take() {
                pool.destroy(gl);
            }
        }
        self.pools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    fn pool_of(gl: &mut SimulatedGles, size: usize) -> BufferManager {
        let mut mgr = BufferManager::new(true, true);
        mgr.create_pool(gl, consts::ARRAY_BUFFER, consts::DYNAMIC_DRAW, size)
            .expect("pool");
        mgr
    }

    #[test]
    fn align_up_multiples() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn fragmentation_round_trip() {
        let mut gl = SimulatedGles::new();
        let mgr = pool_of(&mut gl, 1024 * 1024);
        let pool = mgr.pool(0).unwrap();

        let a = pool.alloc(256 * 1024).unwrap();
        let b = pool.alloc(256 * 1024).unwrap();
        let c = pool.alloc(256 * 1024).unwrap();
        pool.free(&b);

        // D fits exactly in B's hole.
        let d = pool.alloc(200 * 1024).unwrap();
        assert_eq!(d.offset, b.offset);

        pool.free(&a);
        pool.free(&c);
        pool.free(&d);
        assert_eq!(pool.free_bytes(), 1024 * 1024);
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn free_size_conservation_per_allocation() {
        let mut gl = SimulatedGles::new();
        let mgr = pool_of(&mut gl, 64 * 1024);
        let pool = mgr.pool(0).unwrap();

        let before = pool.free_bytes();
        let alloc = pool.alloc(1000).unwrap();
        assert_eq!(alloc.aligned_size, 1024);
        assert_eq!(pool.free_bytes(), before - 1024);
        pool.free(&alloc);
        assert_eq!(pool.free_bytes(), before);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut gl = SimulatedGles::new();
        let mgr = pool_of(&mut gl, 4096);
        let pool = mgr.pool(0).unwrap();

        let _a = pool.alloc(4096).unwrap();
        assert!(pool.alloc(256).is_none());
    }

    #[test]
    fn persistent_upload_lands_in_device_memory() {
        let mut gl = SimulatedGles::new();
        let mgr = pool_of(&mut gl, 4096);
        let pool = mgr.pool(0).unwrap();

        let alloc = pool.alloc(64).unwrap();
        assert!(alloc.mapped_ptr().is_some());
        pool.upload(&mut gl, &alloc, 0, &[0xAB; 16]);

        let contents = gl.buffer_contents(alloc.buffer).unwrap();
        assert_eq!(&contents[alloc.offset..alloc.offset + 16], &[0xAB; 16]);
    }

    #[test]
    fn sub_data_fallback_without_buffer_storage() {
        let mut gl = SimulatedGles::new().without_extension("GL_EXT_buffer_storage");
        let mut mgr = BufferManager::new(false, true);
        mgr.create_pool(&mut gl, consts::ARRAY_BUFFER, consts::DYNAMIC_DRAW, 4096)
            .unwrap();
        let pool = mgr.pool(0).unwrap();

        let alloc = pool.alloc(64).unwrap();
        assert!(alloc.mapped_ptr().is_none());
        pool.upload(&mut gl, &alloc, 4, &[7; 8]);
        assert!(gl.call_count("buffer_sub_data") >= 1);
    }

    #[test]
    fn trim_releases_only_idle_pools() {
        let mut gl = SimulatedGles::new();
        let mut mgr = BufferManager::new(true, true);
        mgr.create_pool(&mut gl, consts::ARRAY_BUFFER, consts::DYNAMIC_DRAW, 4096)
            .unwrap();
        mgr.create_pool(&mut gl, consts::ELEMENT_ARRAY_BUFFER, consts::DYNAMIC_DRAW, 4096)
            .unwrap();

        let held = mgr.pool(1).unwrap().alloc(128).unwrap();
        assert_eq!(mgr.trim(&mut gl), 1);
        assert!(mgr.pool(0).is_none());
        assert!(mgr.pool(1).is_some());
        mgr.free(&held);
        assert_eq!(mgr.trim(&mut gl), 1);
        assert_eq!(mgr.total_allocated(), 0);
    }
}
