//! Content-addressed cache of linked program binaries.
//!
//! Keys are FNV-1a over the vertex and fragment sources; values are the
//! driver's opaque program binaries. Entries live in memory under byte and
//! entry caps with least-recently-used eviction, and optionally persist to
//! one `shader_cache.bin` per cache directory. Binaries produced on a
//! different GPU or driver never surface: the disk header carries the
//! vendor hash and is discarded wholesale on mismatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use bytemuck::{Pod, Zeroable};
use tracing::{debug, info, warn};

use crate::config::ShaderCacheMode;
use crate::error::{Result, VglError};
use crate::gles::{consts, GlesContext};
use crate::hash::program_key;

/// `"VELS"` big-endian in the header word.
pub const CACHE_MAGIC: u32 = 0x5645_4C53;
pub const CACHE_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "shader_cache.bin";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DiskHeader {
    magic: u32,
    version: u32,
    vendor_hash: u32,
    driver_version_hash: u32,
    timestamp: u64,
    entry_count: u32,
    reserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DiskEntry {
    source_hash: u64,
    binary_format: u32,
    binary_size: u32,
    data_offset: u32,
    is_program: u8,
    shader_types: u8,
    padding: u16,
}

const VERT_FRAG_MASK: u8 = 0x03;

struct CacheEntry {
    format: u32,
    blob: Arc<[u8]>,
    last_used: u64,
    hit_count: u32,
    dirty: bool,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<u64, CacheEntry>,
    total_bytes: usize,
    tick: u64,
    hits: u32,
    misses: u32,
}

impl CacheInner {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Drop LRU entries until `incoming` more bytes and one more entry fit.
    fn evict_for(&mut self, incoming: usize, max_bytes: usize, max_entries: usize) {
        while !self.entries.is_empty()
            && (self.total_bytes + incoming > max_bytes || self.entries.len() >= max_entries)
        {
            let Some((&key, _)) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
            else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes -= entry.blob.len();
                debug!(hits = entry.hit_count, "evicted shader cache entry 0x{key:016x}");
            }
        }
    }

    fn remove(&mut self, key: u64) {
        if let Some(entry) = self.entries.remove(&key) {
            self.total_bytes -= entry.blob.len();
        }
    }
}

pub struct ShaderCache {
    mode: ShaderCacheMode,
    max_bytes: usize,
    max_entries: usize,
    disk_path: Option<PathBuf>,
    vendor_hash: u32,
    driver_hash: u32,
    inner: Mutex<CacheInner>,
}

impl ShaderCache {
    pub fn new(
        mode: ShaderCacheMode,
        cache_dir: Option<&Path>,
        max_bytes: usize,
        max_entries: usize,
        vendor_hash: u32,
        driver_hash: u32,
    ) -> Self {
        let disk_path = match mode {
            ShaderCacheMode::Disk | ShaderCacheMode::Aggressive => {
                cache_dir.map(|dir| dir.join(CACHE_FILE_NAME))
            }
            _ => None,
        };

        let cache = Self {
            mode,
            max_bytes: max_bytes.max(1),
            max_entries: max_entries.max(1),
            disk_path,
            vendor_hash,
            driver_hash,
            inner: Mutex::new(CacheInner::default()),
        };

        if cache.disk_path.is_some() {
            match cache.load_from_disk() {
                Ok(count) => info!(entries = count, "shader cache loaded from disk"),
                Err(VglError::Corrupt("missing cache file")) => {
                    debug!("no existing shader cache file")
                }
                Err(VglError::Corrupt(what)) => {
                    info!(what, "shader cache discarded (GPU or version changed)")
                }
                Err(_) => {}
            }
        }
        cache
    }

    pub fn enabled(&self) -> bool {
        self.mode != ShaderCacheMode::Disabled
    }

    // ---- lookup / store ----

    /// Materialise a program from the cached binary for this source pair.
    ///
    /// A hit returns a freshly created, link-verified program handle owned
    /// by the caller. A binary the driver no longer accepts is evicted and
    /// reported as a miss; the caller then compiles from source and offers
    /// the result back through [`store`](Self::store).
    pub fn get(&self, gl: &mut dyn GlesContext, vert_source: &str, frag_source: &str) -> Option<u32> {
        if !self.enabled() {
            return None;
        }
        let key = program_key(vert_source, frag_source);

        let cached = {
            let mut inner = self.inner.lock().expect("shader cache poisoned");
            match inner.entries.get(&key) {
                Some(entry) => Some((entry.format, Arc::clone(&entry.blob))),
                None => {
                    inner.misses += 1;
                    None
                }
            }
        };
        let (format, blob) = cached?;

        // Talk to the device with the lock released.
        let program = gl.create_program();
        gl.program_binary(program, format, &blob);
        if program == 0 || !gl.get_program_link_status(program) {
            if program != 0 {
                gl.delete_program(program);
            }
            warn!("cached shader binary 0x{key:016x} rejected by driver, evicting");
            let mut inner = self.inner.lock().expect("shader cache poisoned");
            inner.remove(key);
            inner.misses += 1;
            return None;
        }

        let mut inner = self.inner.lock().expect("shader cache poisoned");
        inner.hits += 1;
        let tick = inner.touch();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_used = tick;
            entry.hit_count += 1;
        }
        debug!("shader cache hit 0x{key:016x}");
        Some(program)
    }

    /// Capture `program`'s binary under this source pair. A program whose
    /// binary the driver cannot produce is silently skipped.
    pub fn store(&self, gl: &mut dyn GlesContext, vert_source: &str, frag_source: &str, program: u32) {
        if !self.enabled() || program == 0 {
            return;
        }
        let key = program_key(vert_source, frag_source);
        {
            let inner = self.inner.lock().expect("shader cache poisoned");
            if inner.entries.contains_key(&key) {
                return;
            }
        }

        let Some((format, blob)) = gl.get_program_binary(program) else {
            debug!("program binary not retrievable, not cached");
            return;
        };
        if blob.is_empty() || blob.len() > self.max_bytes {
            return;
        }

        let mut inner = self.inner.lock().expect("shader cache poisoned");
        inner.evict_for(blob.len(), self.max_bytes, self.max_entries);
        let tick = inner.touch();
        inner.total_bytes += blob.len();
        inner.entries.insert(
            key,
            CacheEntry {
                format,
                blob: Arc::from(blob),
                last_used: tick,
                hit_count: 0,
                dirty: true,
            },
        );
        debug!(bytes = inner.total_bytes, "cached shader program 0x{key:016x}");
    }

    /// Cache-first program acquisition: hit, or compile from source and
    /// offer the result to the cache.
    pub fn get_or_compile(
        &self,
        gl: &mut dyn GlesContext,
        vert_source: &str,
        frag_source: &str,
    ) -> Result<u32> {
        if let Some(program) = self.get(gl, vert_source, frag_source) {
            return Ok(program);
        }
        let program = compile_and_link(gl, vert_source, frag_source)?;
        self.store(gl, vert_source, frag_source, program);
        Ok(program)
    }

    // ---- maintenance ----

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("shader cache poisoned");
        inner.entries.clear();
        inner.total_bytes = 0;
        inner.hits = 0;
        inner.misses = 0;
        info!("shader cache cleared");
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().expect("shader cache poisoned").total_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().expect("shader cache poisoned").entries.len()
    }

    pub fn hits(&self) -> u32 {
        self.inner.lock().expect("shader cache poisoned").hits
    }

    pub fn misses(&self) -> u32 {
        self.inner.lock().expect("shader cache poisoned").misses
    }

    /// Compile the built-in preload pairs through the regular get/store
    /// path so common programs are warm before the game asks for them.
    pub fn preload(&self, gl: &mut dyn GlesContext) -> usize {
        if !self.enabled() {
            return 0;
        }
        let mut warmed = 0;
        for (vert, frag) in PRELOAD_SOURCES {
            match self.get_or_compile(gl, vert, frag) {
                Ok(program) => {
                    // Only the cached binary is kept; the handle is not
                    // handed to anyone.
                    gl.delete_program(program);
                    warmed += 1;
                }
                Err(err) => warn!(%err, "preload shader failed"),
            }
        }
        info!(warmed, "preloaded common shaders");
        warmed
    }

    // ---- disk image ----

    /// Best-effort write of every entry to `shader_cache.bin`.
    pub fn flush_to_disk(&self) {
        let Some(path) = &self.disk_path else {
            return;
        };

        let (snapshot, dirty): (Vec<(u64, u32, Arc<[u8]>)>, usize) = {
            let mut inner = self.inner.lock().expect("shader cache poisoned");
            let snap = inner
                .entries
                .iter()
                .map(|(&k, e)| (k, e.format, Arc::clone(&e.blob)))
                .collect();
            let dirty = inner.entries.values().filter(|e| e.dirty).count();
            for entry in inner.entries.values_mut() {
                entry.dirty = false;
            }
            (snap, dirty)
        };

        match self.write_image(path, &snapshot) {
            Ok(()) => info!(
                entries = snapshot.len(),
                dirty,
                path = %path.display(),
                "shader cache saved"
            ),
            Err(err) => warn!(%err, path = %path.display(), "shader cache write failed"),
        }
    }

    fn write_image(&self, path: &Path, entries: &[(u64, u32, Arc<[u8]>)]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let header = DiskHeader {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            vendor_hash: self.vendor_hash,
            driver_version_hash: self.driver_hash,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            entry_count: entries.len() as u32,
            reserved: 0,
        };

        let mut image = Vec::new();
        image.extend_from_slice(bytemuck::bytes_of(&header));

        // Two passes: all fixed-size records first, then all blobs.
        let mut data_offset =
            (std::mem::size_of::<DiskHeader>() + entries.len() * std::mem::size_of::<DiskEntry>()) as u32;
        for (key, format, blob) in entries {
            let record = DiskEntry {
                source_hash: *key,
                binary_format: *format,
                binary_size: blob.len() as u32,
                data_offset,
                is_program: 1,
                shader_types: VERT_FRAG_MASK,
                padding: 0,
            };
            image.extend_from_slice(bytemuck::bytes_of(&record));
            data_offset += blob.len() as u32;
        }
        for (_, _, blob) in entries {
            image.extend_from_slice(blob);
        }

        std::fs::write(path, image)
    }

    fn load_from_disk(&self) -> Result<usize> {
        let path = self.disk_path.as_ref().ok_or(VglError::NotInitialized)?;
        let image = std::fs::read(path).map_err(|_| VglError::Corrupt("missing cache file"))?;

        let header_size = std::mem::size_of::<DiskHeader>();
        if image.len() < header_size {
            return Err(VglError::Corrupt("shader cache header"));
        }
        let header: DiskHeader = bytemuck::pod_read_unaligned(&image[..header_size]);
        if header.magic != CACHE_MAGIC {
            return Err(VglError::Corrupt("shader cache magic"));
        }
        if header.version != CACHE_VERSION {
            return Err(VglError::Corrupt("shader cache version"));
        }
        if header.vendor_hash != self.vendor_hash {
            return Err(VglError::Corrupt("shader cache vendor hash"));
        }

        let record_size = std::mem::size_of::<DiskEntry>();
        let mut inner = self.inner.lock().expect("shader cache poisoned");
        let mut loaded = 0;
        for i in 0..header.entry_count as usize {
            let start = header_size + i * record_size;
            let Some(bytes) = image.get(start..start + record_size) else {
                warn!("shader cache truncated record table");
                break;
            };
            let record: DiskEntry = bytemuck::pod_read_unaligned(bytes);
            let data_start = record.data_offset as usize;
            let data_end = data_start + record.binary_size as usize;
            let Some(blob) = image.get(data_start..data_end) else {
                warn!("shader cache blob out of bounds, entry skipped");
                continue;
            };
            if inner.entries.len() >= self.max_entries
                || inner.total_bytes + blob.len() > self.max_bytes
            {
                break;
            }
            let tick = inner.touch();
            inner.total_bytes += blob.len();
            inner.entries.insert(
                record.source_hash,
                CacheEntry {
                    format: record.binary_format,
                    blob: Arc::from(blob),
                    last_used: tick,
                    hit_count: 0,
                    dirty: false,
                },
            );
            loaded += 1;
        }
        Ok(loaded)
    }
}

/// Regular source compile/link path (the cache-miss fallback, also used
/// directly by the scaler's built-in programs).
pub fn compile_and_link(
    gl: &mut dyn GlesContext,
    vert_source: &str,
    frag_source: &str,
) -> Result<u32> {
    let compile = |gl: &mut dyn GlesContext, ty: u32, source: &str| -> Result<u32> {
        let shader = gl.create_shader(ty);
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            warn!(stage = ty, %log, "shader compilation failed");
            gl.delete_shader(shader);
            return Err(VglError::Corrupt("shader source"));
        }
        Ok(shader)
    };

    let vert = compile(gl, consts::VERTEX_SHADER, vert_source)?;
    let frag = match compile(gl, consts::FRAGMENT_SHADER, frag_source) {
        Ok(frag) => frag,
        Err(err) => {
            gl.delete_shader(vert);
            return Err(err);
        }
    };

    let program = gl.create_program();
    gl.attach_shader(program, vert);
    gl.attach_shader(program, frag);
    gl.link_program(program);
    gl.delete_shader(vert);
    gl.delete_shader(frag);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        warn!(%log, "program link failed");
        gl.delete_program(program);
        return Err(VglError::Corrupt("program link"));
    }
    Ok(program)
}

/// Vertex/fragment pairs warmed by `preload_shaders`.
const PRELOAD_SOURCES: [(&str, &str); 3] = [
    (
        "#version 300 es\n\
         layout(location = 0) in vec3 aPos;\n\
         layout(location = 1) in vec2 aUV;\n\
         uniform mat4 uMvp;\n\
         out vec2 vUV;\n\
         void main() { gl_Position = uMvp * vec4(aPos, 1.0); vUV = aUV; }\n",
        "#version 300 es\n\
         precision mediump float;\n\
         in vec2 vUV;\n\
         uniform sampler2D uTex;\n\
         out vec4 fragColor;\n\
         void main() { fragColor = texture(uTex, vUV); }\n",
    ),
    (
        "#version 300 es\n\
         layout(location = 0) in vec3 aPos;\n\
         layout(location = 1) in vec4 aColor;\n\
         uniform mat4 uMvp;\n\
         out vec4 vColor;\n\
         void main() { gl_Position = uMvp * vec4(aPos, 1.0); vColor = aColor; }\n",
        "#version 300 es\n\
         precision mediump float;\n\
         in vec4 vColor;\n\
         out vec4 fragColor;\n\
         void main() { fragColor = vColor; }\n",
    ),
    (
        "#version 300 es\n\
         layout(location = 0) in vec3 aPos;\n\
         layout(location = 1) in vec2 aUV;\n\
         layout(location = 2) in vec4 aColor;\n\
         uniform mat4 uMvp;\n\
         out vec2 vUV;\n\
         out vec4 vColor;\n\
         void main() { gl_Position = uMvp * vec4(aPos, 1.0); vUV = aUV; vColor = aColor; }\n",
        "#version 300 es\n\
         precision mediump float;\n\
         in vec2 vUV;\n\
         in vec4 vColor;\n\
         uniform sampler2D uTex;\n\
         out vec4 fragColor;\n\
         void main() { fragColor = texture(uTex, vUV) * vColor; }\n",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::SimulatedGles;

    const VS: &str = "#version 300 es\nvoid main() { gl_Position = vec4(0.0); }\n";
    const FS: &str =
        "#version 300 es\nprecision mediump float;\nout vec4 c;\nvoid main() { c = vec4(1.0); }\n";

    fn memory_cache() -> ShaderCache {
        ShaderCache::new(ShaderCacheMode::MemoryOnly, None, 1 << 20, 16, 0xAB, 0xCD)
    }

    #[test]
    fn store_then_get_is_a_hit() {
        let mut gl = SimulatedGles::new();
        let cache = memory_cache();

        let program = compile_and_link(&mut gl, VS, FS).unwrap();
        cache.store(&mut gl, VS, FS, program);
        gl.delete_program(program);

        let restored = cache.get(&mut gl, VS, FS).expect("hit");
        assert!(gl.get_program_link_status(restored));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn miss_then_get_or_compile_populates() {
        let mut gl = SimulatedGles::new();
        let cache = memory_cache();

        assert!(cache.get(&mut gl, VS, FS).is_none());
        assert_eq!(cache.misses(), 1);

        let program = cache.get_or_compile(&mut gl, VS, FS).unwrap();
        assert!(gl.get_program_link_status(program));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn rejected_binary_is_evicted_and_reported_as_miss() {
        let mut gl = SimulatedGles::new();
        let cache = memory_cache();

        let program = compile_and_link(&mut gl, VS, FS).unwrap();
        cache.store(&mut gl, VS, FS, program);

        gl.reject_binaries = true;
        assert!(cache.get(&mut gl, VS, FS).is_none());
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn entry_cap_evicts_least_recently_used() {
        let mut gl = SimulatedGles::new();
        let cache = ShaderCache::new(ShaderCacheMode::MemoryOnly, None, 1 << 20, 2, 0, 0);

        let sources: Vec<(String, String)> = (0..3)
            .map(|i| (format!("{VS}// v{i}\n"), FS.to_owned()))
            .collect();

        for (vs, fs) in &sources {
            let program = compile_and_link(&mut gl, vs, fs).unwrap();
            cache.store(&mut gl, vs, fs, program);
        }
        assert_eq!(cache.entry_count(), 2);
        // The first stored pair was least recently used.
        assert!(cache.get(&mut gl, &sources[0].0, &sources[0].1).is_none());
        assert!(cache.get(&mut gl, &sources[2].0, &sources[2].1).is_some());
    }

    #[test]
    fn disk_round_trip_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut gl = SimulatedGles::new();

        let cache = ShaderCache::new(ShaderCacheMode::Disk, Some(dir.path()), 1 << 20, 16, 7, 9);
        let program = compile_and_link(&mut gl, VS, FS).unwrap();
        cache.store(&mut gl, VS, FS, program);
        cache.flush_to_disk();

        let reloaded = ShaderCache::new(ShaderCacheMode::Disk, Some(dir.path()), 1 << 20, 16, 7, 9);
        assert_eq!(reloaded.entry_count(), 1);
        assert!(reloaded.get(&mut gl, VS, FS).is_some());
    }

    #[test]
    fn vendor_hash_mismatch_discards_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut gl = SimulatedGles::new();

        let cache = ShaderCache::new(ShaderCacheMode::Disk, Some(dir.path()), 1 << 20, 16, 7, 9);
        let program = compile_and_link(&mut gl, VS, FS).unwrap();
        cache.store(&mut gl, VS, FS, program);
        cache.flush_to_disk();

        // Same directory, different GPU.
        let other = ShaderCache::new(ShaderCacheMode::Disk, Some(dir.path()), 1 << 20, 16, 8, 9);
        assert_eq!(other.entry_count(), 0);
    }

    #[test]
    fn corrupt_magic_discards_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CACHE_FILE_NAME), b"not a cache").unwrap();
        let cache = ShaderCache::new(ShaderCacheMode::Disk, Some(dir.path()), 1 << 20, 16, 7, 9);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn disabled_mode_never_stores() {
        let mut gl = SimulatedGles::new();
        let cache = ShaderCache::new(ShaderCacheMode::Disabled, None, 1 << 20, 16, 0, 0);
        let program = compile_and_link(&mut gl, VS, FS).unwrap();
        cache.store(&mut gl, VS, FS, program);
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.get(&mut gl, VS, FS).is_none());
    }

    #[test]
    fn preload_warms_all_builtin_pairs() {
        let mut gl = SimulatedGles::new();
        let cache = memory_cache();
        assert_eq!(cache.preload(&mut gl), PRELOAD_SOURCES.len());
        assert_eq!(cache.entry_count(), PRELOAD_SOURCES.len());
        // A second preload is all hits.
        assert_eq!(cache.preload(&mut gl), PRELOAD_SOURCES.len());
        assert_eq!(cache.hits(), PRELOAD_SOURCES.len() as u32);
    }
}
