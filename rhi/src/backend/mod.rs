//! Device layer abstraction.
//!
//! The texture engine never talks to a driver directly. It consumes the
//! [`GpuBackend`] trait, which provides:
//! - Heap creation for the default (device-local), upload and readback heap types
//! - Native texture creation, placed into a heap or reserved without memory
//! - Authoritative copyable footprints for existing resources
//! - Execution of recorded [`Command`]s on a GPU node
//!
//! # Available Backends
//!
//! - [`SoftwareBackend`]: emulates a multi-node GPU in host memory. Used by the
//!   default device constructor and by every test.
//!
//! A D3D12 or Vulkan implementation maps these calls 1:1 onto
//! `CreateHeap`/`vkAllocateMemory`, `CreatePlacedResource`/`vkBindImageMemory`,
//! `GetCopyableFootprints` and command list recording.

pub mod software;

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use thiserror::Error;

use crate::command::Command;
use crate::footprint::PackedLayout;
use crate::memory::HeapType;
use crate::types::{ResourceState, TextureDescriptor};

pub use software::SoftwareBackend;

/// Index of a GPU node in a linked (multi-GPU) device.
pub type NodeIndex = u32;

/// Placement alignment for small, non-multisampled textures.
pub const SMALL_RESOURCE_PLACEMENT_ALIGNMENT: u64 = 4096;
/// Default placement alignment for textures.
pub const DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT: u64 = 64 * 1024;
/// Placement alignment for small multisampled textures.
pub const SMALL_MSAA_RESOURCE_PLACEMENT_ALIGNMENT: u64 = 64 * 1024;
/// Default placement alignment for multisampled textures.
pub const DEFAULT_MSAA_RESOURCE_PLACEMENT_ALIGNMENT: u64 = 4 * 1024 * 1024;
/// Largest mip 0 footprint a texture may have and still use the small alignment.
pub const SMALL_RESOURCE_LIMIT: u64 = 64 * 1024;
/// Largest mip 0 footprint a multisampled texture may have and still use the
/// small alignment.
pub const SMALL_MSAA_RESOURCE_LIMIT: u64 = 4 * 1024 * 1024;

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The device is out of memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// The driver rejected a call.
    #[error("driver failure: {0}")]
    Driver(String),
}

// ============================================================================
// Host memory
// ============================================================================

/// Host-visible memory backing an upload or readback heap.
///
/// Access goes through short critical sections so the executing context and
/// the CPU side never hold references into the bytes concurrently.
pub struct HostMemory {
    bytes: Mutex<Box<[u8]>>,
}

impl HostMemory {
    /// Allocate `size` zeroed bytes.
    pub fn new(size: u64) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; size as usize].into_boxed_slice()),
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    /// Returns true if the memory is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; callers validate ranges first.
    pub fn with_range<R>(&self, offset: u64, len: u64, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.bytes.lock();
        f(&bytes[offset as usize..(offset + len) as usize])
    }

    /// Run `f` over `len` mutable bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; callers validate ranges first.
    pub fn with_range_mut<R>(&self, offset: u64, len: u64, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.bytes.lock();
        f(&mut bytes[offset as usize..(offset + len) as usize])
    }
}

impl std::fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemory").field("len", &self.len()).finish()
    }
}

// ============================================================================
// Heaps
// ============================================================================

/// Descriptor for creating a heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDescriptor {
    /// Heap type.
    pub heap_type: HeapType,
    /// Size in bytes.
    pub size: u64,
    /// Debug label.
    pub label: Option<String>,
}

/// A device heap. Upload and readback heaps carry their host mapping.
#[derive(Debug)]
pub struct NativeHeap {
    /// Backend-unique id.
    pub id: u64,
    /// Heap type.
    pub heap_type: HeapType,
    /// Size in bytes.
    pub size: u64,
    /// GPU virtual address of the first byte.
    pub gpu_address: u64,
    /// Host mapping, present for host-visible heap types.
    pub host: Option<Arc<HostMemory>>,
}

// ============================================================================
// Textures
// ============================================================================

bitflags! {
    /// Native resource flags derived from [`TextureFlags`](crate::TextureFlags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NativeResourceFlags: u32 {
        /// Resource may be bound as a render target.
        const ALLOW_RENDER_TARGET = 1 << 0;
        /// Resource may be bound as a depth-stencil target.
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        /// Resource may be bound for unordered access.
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
        /// Resource may be accessed from several queues or devices at once.
        const ALLOW_SIMULTANEOUS_ACCESS = 1 << 3;
        /// Resource is never sampled.
        const DENY_SHADER_RESOURCE = 1 << 4;
    }
}

/// Native texture descriptor, computed from a portable [`TextureDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeTextureDesc {
    /// The portable descriptor the native one was derived from.
    pub descriptor: TextureDescriptor,
    /// Native resource flags.
    pub resource_flags: NativeResourceFlags,
    /// Requested placement alignment.
    pub alignment: u64,
}

/// Size and alignment a texture needs when placed in a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationInfo {
    /// Bytes the texture occupies.
    pub size: u64,
    /// Alignment the placement offset must honour.
    pub alignment: u64,
}

/// Where a native texture's memory comes from.
#[derive(Debug, Clone, Copy)]
pub enum TexturePlacement<'a> {
    /// Placed at `offset` inside `heap`.
    Placed {
        /// The heap.
        heap: &'a NativeHeap,
        /// Byte offset inside the heap.
        offset: u64,
    },
    /// Reserved (sparse) texture with no memory bound yet.
    Reserved,
}

/// A native texture created by a backend.
#[derive(Debug)]
pub struct NativeTexture {
    /// Backend-unique id.
    pub id: u64,
    /// Node the texture lives on.
    pub node: NodeIndex,
    /// Native descriptor.
    pub desc: NativeTextureDesc,
}

/// Advisory memory budget of the device-local heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryBudget {
    /// Bytes the process may use.
    pub budget: u64,
    /// Bytes currently in use.
    pub usage: u64,
}

impl MemoryBudget {
    /// Bytes left before the budget is exceeded.
    pub fn available(&self) -> u64 {
        self.budget.saturating_sub(self.usage)
    }
}

/// Trait implemented by every device layer.
pub trait GpuBackend: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Number of GPU nodes.
    fn node_count(&self) -> u32;

    /// Create a heap.
    fn create_heap(&self, desc: &HeapDescriptor) -> Result<NativeHeap, BackendError>;

    /// Destroy a heap. No resource may still be placed in it.
    fn destroy_heap(&self, heap: &NativeHeap);

    /// Size and alignment the texture needs. If the requested alignment is
    /// not supported for this texture the returned alignment differs.
    fn texture_allocation_info(&self, desc: &NativeTextureDesc) -> AllocationInfo;

    /// Create a texture on `node`.
    fn create_texture(
        &self,
        desc: &NativeTextureDesc,
        node: NodeIndex,
        placement: TexturePlacement<'_>,
        initial_state: ResourceState,
    ) -> Result<NativeTexture, BackendError>;

    /// Destroy a texture. The GPU must no longer reference it.
    fn destroy_texture(&self, texture: &NativeTexture);

    /// Authoritative linear layout of `count` subresources starting at `first`
    /// for a buffer whose first byte sits at `base_offset`.
    fn copyable_footprints(
        &self,
        desc: &NativeTextureDesc,
        first: u32,
        count: u32,
        base_offset: u64,
    ) -> Result<PackedLayout, BackendError>;

    /// Execute one recorded command on `node`.
    fn execute(&self, node: NodeIndex, command: Command) -> Result<(), BackendError>;

    /// Device-local memory budget.
    fn memory_budget(&self) -> MemoryBudget;
}

static_assertions::assert_impl_all!(HostMemory: Send, Sync);
static_assertions::assert_impl_all!(NativeHeap: Send, Sync);
static_assertions::assert_impl_all!(NativeTexture: Send, Sync);
