//! # RedLilium RHI
//!
//! Texture resource engine for RedLilium: creation, CPU locking, region
//! updates and copies of GPU textures, with placed memory and fence-tagged
//! deferred release.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RhiDevice`] - Creates textures and owns the memory pools and command queue
//! - [`Texture`] - A texture replicated across GPU nodes, with lock/unlock,
//!   region updates and readback footprints
//! - [`footprint`] - Pure subresource layout math
//! - [`memory`] - Heap pools, placed allocations and staging buffers
//! - [`command`] - The recorded command stream and scoped state transitions
//! - [`backend`] - Trait for device layers, plus a software backend that
//!   emulates a GPU in host memory
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_rhi::{LockMode, PixelFormat, RhiConfig, RhiDevice, TextureDescriptor};
//!
//! let device = RhiDevice::new(RhiConfig::default())?;
//! let texture = device.create_texture(
//!     &TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm),
//!     None,
//!     "scratch",
//! )?;
//!
//! let locked = texture.lock(0, LockMode::ReadOnly)?;
//! let pixels = locked.read_packed();
//! texture.unlock(0)?;
//! ```

pub mod backend;
pub mod command;
pub mod config;
pub mod deferred;
pub mod device;
pub mod error;
pub mod footprint;
pub mod memory;
pub mod profiling;
pub mod stats;
pub mod sync;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendError, GpuBackend, MemoryBudget, SoftwareBackend};
pub use config::{ExecutionMode, RhiConfig};
pub use device::{ReallocationStatus, RhiDevice};
pub use error::RhiError;
pub use footprint::{PackedLayout, SubresourceFootprint};
pub use memory::HeapType;
pub use stats::{MemoryStats, NoopStats, StatsSink, StatsSnapshot};
pub use sync::{Fence, FenceValue};
pub use texture::{
    CopyTextureInfo, CopyTextureOptions, LockMode, LockedSubresource, SourceLayout, Texture,
    UpdateTextureRegion,
};
pub use types::{
    Extent3d, Origin3d, PixelFormat, ResourceState, TextureBox, TextureDescriptor,
    TextureDimension, TextureFlags,
};

/// RHI library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the RHI.
///
/// Starts the profiler client when the `profiling` feature is enabled.
pub fn init() {
    profiling::start();
    log::info!("RedLilium RHI v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_software_backend() {
        let backend = SoftwareBackend::new(2, 1 << 30);
        assert_eq!(backend.name(), "Software");
        assert_eq!(backend.node_count(), 2);
    }
}
