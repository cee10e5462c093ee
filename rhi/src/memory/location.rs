//! Resource locations and the allocator front end.

use std::sync::Arc;

use slotmap::new_key_type;

use super::pool::{HeapPool, PlacementPolicy};
use super::HeapType;
use crate::backend::{GpuBackend, HostMemory, NativeHeap};
use crate::config::RhiConfig;
use crate::error::RhiError;
use crate::stats::StatsSink;

new_key_type! {
    /// Generational id of a live allocation.
    pub struct AllocationId;
}

/// An owned range of a heap.
///
/// Exactly one owner holds a location. It is given back with
/// [`ResourceAllocator::release`], which is the only way to free the range.
#[derive(Debug)]
pub struct ResourceLocation {
    id: AllocationId,
    heap_type: HeapType,
    heap: Arc<NativeHeap>,
    offset: u64,
    size: u64,
    standalone: bool,
}

impl ResourceLocation {
    pub(super) fn new(
        id: AllocationId,
        heap_type: HeapType,
        heap: Arc<NativeHeap>,
        offset: u64,
        size: u64,
        standalone: bool,
    ) -> Self {
        Self {
            id,
            heap_type,
            heap,
            offset,
            size,
            standalone,
        }
    }

    /// Allocation id.
    pub fn id(&self) -> AllocationId {
        self.id
    }

    /// Heap type.
    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }

    /// The heap the range lives in.
    pub fn heap(&self) -> &Arc<NativeHeap> {
        &self.heap
    }

    /// Byte offset inside the heap.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns true if the range owns its heap.
    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// GPU virtual address of the first byte.
    pub fn gpu_address(&self) -> u64 {
        self.heap.gpu_address + self.offset
    }

    /// CPU mapping of the range. `None` for device-local memory.
    pub fn mapping(&self) -> Option<MappedRange> {
        self.heap
            .host
            .as_ref()
            .map(|memory| MappedRange::new(Arc::clone(memory), self.offset, self.size))
    }
}

/// CPU view of a host-visible range.
///
/// Cloning is cheap; every clone addresses the same bytes.
#[derive(Clone)]
pub struct MappedRange {
    memory: Arc<HostMemory>,
    offset: u64,
    len: u64,
}

impl MappedRange {
    pub(crate) fn new(memory: Arc<HostMemory>, offset: u64, len: u64) -> Self {
        Self {
            memory,
            offset,
            len,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A sub-range of this mapping.
    pub fn subrange(&self, offset: u64, len: u64) -> Result<MappedRange, RhiError> {
        self.check(offset, len)?;
        Ok(MappedRange::new(
            Arc::clone(&self.memory),
            self.offset + offset,
            len,
        ))
    }

    /// Copy `data` in at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), RhiError> {
        self.check(offset, data.len() as u64)?;
        self.memory
            .with_range_mut(self.offset + offset, data.len() as u64, |dst| {
                dst.copy_from_slice(data)
            });
        Ok(())
    }

    /// Copy bytes at `offset` out into `out`.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<(), RhiError> {
        self.check(offset, out.len() as u64)?;
        self.memory
            .with_range(self.offset + offset, out.len() as u64, |src| {
                out.copy_from_slice(src)
            });
        Ok(())
    }

    /// Copy the whole range into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Set every byte to `value`.
    pub fn fill(&self, value: u8) {
        self.with_bytes_mut(|bytes| bytes.fill(value));
    }

    /// Run `f` over the mapped bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.memory.with_range(self.offset, self.len, f)
    }

    /// Run `f` over the mapped bytes, mutably.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.memory.with_range_mut(self.offset, self.len, f)
    }

    fn check(&self, offset: u64, len: u64) -> Result<(), RhiError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(RhiError::invalid_parameter(format!(
                "range {offset}+{len} outside mapping of {} bytes",
                self.len
            ))),
        }
    }
}

impl std::fmt::Debug for MappedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRange")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// One [`HeapPool`] per [`HeapType`].
#[derive(Debug)]
pub struct ResourceAllocator {
    pools: [HeapPool; 3],
}

impl ResourceAllocator {
    /// Create the three pools from the device configuration.
    pub fn new(config: &RhiConfig, backend: Arc<dyn GpuBackend>, stats: Arc<dyn StatsSink>) -> Self {
        let pool = |heap_type: HeapType| {
            HeapPool::new(
                heap_type,
                config.pool_block_size(heap_type),
                config.max_placed_size,
                Arc::clone(&backend),
                Arc::clone(&stats),
            )
        };
        Self {
            pools: HeapType::ALL.map(pool),
        }
    }

    /// Reserve `size` bytes at `alignment` from the pooled blocks of `heap_type`.
    pub fn acquire(
        &self,
        heap_type: HeapType,
        size: u64,
        alignment: u64,
    ) -> Result<ResourceLocation, RhiError> {
        self.pool(heap_type)
            .acquire(size, alignment, PlacementPolicy::Pooled)
    }

    /// Reserve `size` bytes with an explicit placement policy.
    pub fn acquire_with_policy(
        &self,
        heap_type: HeapType,
        size: u64,
        alignment: u64,
        policy: PlacementPolicy,
    ) -> Result<ResourceLocation, RhiError> {
        self.pool(heap_type).acquire(size, alignment, policy)
    }

    /// Give a location back to its pool.
    pub fn release(&self, location: ResourceLocation) -> Result<(), RhiError> {
        self.pool(location.heap_type()).release(location)
    }

    /// Pool for a heap type.
    pub fn pool(&self, heap_type: HeapType) -> &HeapPool {
        &self.pools[heap_type.index()]
    }

    /// Live bytes in one heap type.
    pub fn live_bytes(&self, heap_type: HeapType) -> u64 {
        self.pool(heap_type).live_bytes()
    }

    /// Destroy empty pooled blocks in every pool. Returns the bytes freed.
    pub fn trim(&self) -> u64 {
        self.pools.iter().map(HeapPool::trim).sum()
    }
}

static_assertions::assert_impl_all!(ResourceLocation: Send, Sync);
static_assertions::assert_impl_all!(MappedRange: Send, Sync);
static_assertions::assert_impl_all!(ResourceAllocator: Send, Sync);
