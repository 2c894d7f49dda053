//! VelocityGL exposes a desktop OpenGL 4.x entry-point surface executed
//! on top of OpenGL ES 3.x.
//!
//! Hosts resolve function pointers by name (see [`dispatch`]) and issue GL
//! calls as if talking to a desktop driver. The wrapper:
//! - mirrors pipeline state and filters redundant calls ([`StateTracker`]),
//! - queues, sorts and coalesces draw commands per frame,
//! - sub-allocates vertex/index/uniform storage with triple-buffered
//!   fencing ([`BufferManager`], [`StreamingRing`]),
//! - memoises linked program binaries in memory and on disk
//!   ([`ShaderCache`]),
//! - renders to an adaptively sized off-screen target and composites it
//!   through an upscale+sharpen pass ([`ResolutionScaler`]),
//! - classifies the device and derives tunable defaults ([`caps`]).
//!
//! All GL-issuing code runs on the rendering thread the host made the
//! context current on; the pool and cache tables take their own locks so
//! background threads can interact without touching the device.

pub mod api;
mod batcher;
pub mod caps;
pub mod config;
mod context;
pub mod dispatch;
pub mod error;
pub mod gles;
mod hash;
mod pool;
mod scaler;
mod shader_cache;
mod state;
pub mod stats;
mod stream;

pub use batcher::{BatchKey, BatchStats};
pub use caps::{GpuCaps, GpuFeatures, GpuGeneration, GpuVendor};
pub use config::{Backend, QualityPreset, ShaderCacheMode, VelocityConfig};
pub use context::VelocityContext;
pub use error::{Result, VglError};
pub use pool::{BufferAllocation, BufferManager, BufferPool, BUFFER_ALIGNMENT};
pub use scaler::{ResolutionScaler, ScalerConfig};
pub use shader_cache::{compile_and_link, ShaderCache};
pub use state::StateTracker;
pub use stats::VelocityStats;
pub use stream::{StreamingRing, STREAM_SENTINEL};
