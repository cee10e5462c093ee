//! GPU memory management.
//!
//! Memory is carved out of per-heap-type pools:
//!
//! - [`HeapPool`]: first-fit sub-allocation inside large device heaps, with
//!   standalone heaps for requests that are too large or must not share.
//! - [`ResourceAllocator`]: one pool per [`HeapType`], the entry point used by
//!   textures and staging.
//! - [`StagingBufferPool`]: host-visible upload and readback buffers for CPU
//!   <-> GPU transfers.
//!
//! Allocations are handed out as [`ResourceLocation`]s, which own their range
//! until given back with [`ResourceAllocator::release`].

mod location;
mod pool;
mod staging;

pub use location::{AllocationId, MappedRange, ResourceAllocator, ResourceLocation};
pub use pool::{HeapPool, PlacementPolicy};
pub use staging::{StagingBuffer, StagingBufferPool};

/// Memory heap types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeapType {
    /// Device-local memory. Not visible to the CPU.
    Default,
    /// CPU-writable memory the GPU reads from.
    Upload,
    /// GPU-writable memory the CPU reads back.
    Readback,
}

impl HeapType {
    /// All heap types, in pool order.
    pub const ALL: [HeapType; 3] = [HeapType::Default, HeapType::Upload, HeapType::Readback];

    /// Returns true if the CPU can map this heap type.
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, Self::Default)
    }

    /// Index of this heap type in [`HeapType::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Default => 0,
            Self::Upload => 1,
            Self::Readback => 2,
        }
    }
}
