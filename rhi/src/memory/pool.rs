//! Per-heap-type memory pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::SlotMap;

use super::location::{AllocationId, ResourceLocation};
use super::HeapType;
use crate::backend::{BackendError, GpuBackend, HeapDescriptor, NativeHeap};
use crate::error::RhiError;
use crate::stats::StatsSink;
use crate::types::align_up;

/// Whether an allocation may share a heap with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlacementPolicy {
    /// Sub-allocate from a pooled block when the size allows.
    #[default]
    Pooled,
    /// Always give the allocation its own heap.
    Standalone,
}

/// A pooled heap and its free ranges (`offset -> length`).
struct Block {
    heap: Arc<NativeHeap>,
    free: BTreeMap<u64, u64>,
    used: u64,
}

impl Block {
    fn new(heap: Arc<NativeHeap>) -> Self {
        let mut free = BTreeMap::new();
        free.insert(0, heap.size);
        Self {
            heap,
            free,
            used: 0,
        }
    }

    /// First-fit: take the first free range that holds `size` bytes at
    /// `alignment`. Unused head and tail stay on the free list.
    fn carve(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let (start, len, aligned) = self.free.iter().find_map(|(&start, &len)| {
            let aligned = align_up(start, alignment);
            (aligned - start + size <= len).then_some((start, len, aligned))
        })?;

        self.free.remove(&start);
        if aligned > start {
            self.free.insert(start, aligned - start);
        }
        let end = aligned + size;
        if start + len > end {
            self.free.insert(end, start + len - end);
        }
        self.used += size;
        Some(aligned)
    }

    /// Return a range, merging it with its neighbours.
    fn give_back(&mut self, offset: u64, size: u64) {
        let mut start = offset;
        let mut len = size;

        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back()
            && prev + prev_len == offset
        {
            self.free.remove(&prev);
            start = prev;
            len += prev_len;
        }
        if let Some(next_len) = self.free.remove(&(offset + size)) {
            len += next_len;
        }

        self.free.insert(start, len);
        self.used -= size;
    }
}

struct AllocationRecord {
    block: Option<usize>,
    offset: u64,
    size: u64,
}

struct PoolState {
    blocks: Vec<Option<Block>>,
    records: SlotMap<AllocationId, AllocationRecord>,
    live_bytes: u64,
    standalone_bytes: u64,
}

/// Sub-allocator for one heap type.
///
/// Requests up to `max_placed_size` are placed first-fit inside pooled
/// blocks of `block_size` bytes; blocks are created lazily. Larger requests,
/// and requests with [`PlacementPolicy::Standalone`], get a heap of their own.
/// Every request and release takes the pool's own lock, so pools of different
/// heap types never contend.
pub struct HeapPool {
    heap_type: HeapType,
    block_size: u64,
    max_placed_size: u64,
    backend: Arc<dyn GpuBackend>,
    stats: Arc<dyn StatsSink>,
    state: Mutex<PoolState>,
}

impl HeapPool {
    /// Create an empty pool.
    pub fn new(
        heap_type: HeapType,
        block_size: u64,
        max_placed_size: u64,
        backend: Arc<dyn GpuBackend>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            heap_type,
            block_size,
            max_placed_size,
            backend,
            stats,
            state: Mutex::new(PoolState {
                blocks: Vec::new(),
                records: SlotMap::with_key(),
                live_bytes: 0,
                standalone_bytes: 0,
            }),
        }
    }

    /// Heap type this pool serves.
    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }

    /// Reserve `size` bytes at `alignment`.
    pub fn acquire(
        &self,
        size: u64,
        alignment: u64,
        policy: PlacementPolicy,
    ) -> Result<ResourceLocation, RhiError> {
        if size == 0 {
            return Err(RhiError::invalid_parameter("zero-sized allocation"));
        }
        let alignment = alignment.max(1);

        let standalone = policy == PlacementPolicy::Standalone
            || size > self.max_placed_size
            || size.saturating_add(alignment) > self.block_size;

        let mut state = self.state.lock();
        let (heap, block, offset) = if standalone {
            let heap_size = size.checked_next_multiple_of(alignment).ok_or_else(|| {
                RhiError::invalid_parameter(format!(
                    "allocation of {size} bytes at alignment {alignment} overflows"
                ))
            })?;
            let heap = self.create_heap(heap_size)?;
            state.standalone_bytes += heap.size;
            (heap, None, 0)
        } else {
            self.place(&mut state, size, alignment)?
        };

        let id = state.records.insert(AllocationRecord {
            block,
            offset,
            size,
        });
        state.live_bytes += size;
        drop(state);

        self.stats.allocation_acquired(self.heap_type, size);
        log::trace!(
            "HeapPool({:?}): acquired {} bytes at offset {} in heap {} ({})",
            self.heap_type,
            size,
            offset,
            heap.id,
            if standalone { "standalone" } else { "pooled" }
        );

        Ok(ResourceLocation::new(
            id,
            self.heap_type,
            heap,
            offset,
            size,
            standalone,
        ))
    }

    /// Give a range back. Fails if the location was already released.
    pub fn release(&self, location: ResourceLocation) -> Result<(), RhiError> {
        let mut state = self.state.lock();
        let record = state.records.remove(location.id()).ok_or_else(|| {
            RhiError::invalid_state(format!(
                "{:?} allocation {:?} was already released",
                self.heap_type,
                location.id()
            ))
        })?;

        match record.block {
            Some(index) => {
                if let Some(block) = state.blocks.get_mut(index).and_then(Option::as_mut) {
                    block.give_back(record.offset, record.size);
                }
            }
            None => {
                state.standalone_bytes -= location.heap().size;
                self.destroy_heap(location.heap());
            }
        }
        state.live_bytes -= record.size;
        drop(state);

        self.stats.allocation_released(self.heap_type, record.size);
        Ok(())
    }

    /// Destroy pooled blocks with no live allocation. Returns the bytes freed.
    pub fn trim(&self) -> u64 {
        let mut state = self.state.lock();
        let mut freed = 0;
        for slot in state.blocks.iter_mut() {
            if slot.as_ref().is_some_and(|block| block.used == 0)
                && let Some(block) = slot.take()
            {
                freed += block.heap.size;
                self.destroy_heap(&block.heap);
            }
        }
        if freed > 0 {
            log::debug!("HeapPool({:?}): trimmed {} bytes", self.heap_type, freed);
        }
        freed
    }

    /// Bytes handed out and not yet released.
    pub fn live_bytes(&self) -> u64 {
        self.state.lock().live_bytes
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Bytes reserved from the device, pooled blocks and standalone heaps.
    pub fn reserved_bytes(&self) -> u64 {
        let state = self.state.lock();
        let pooled: u64 = state.blocks.iter().flatten().map(|b| b.heap.size).sum();
        pooled + state.standalone_bytes
    }

    /// Number of pooled blocks currently alive.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.iter().flatten().count()
    }

    fn place(
        &self,
        state: &mut PoolState,
        size: u64,
        alignment: u64,
    ) -> Result<(Arc<NativeHeap>, Option<usize>, u64), RhiError> {
        for (index, slot) in state.blocks.iter_mut().enumerate() {
            if let Some(block) = slot
                && let Some(offset) = block.carve(size, alignment)
            {
                return Ok((Arc::clone(&block.heap), Some(index), offset));
            }
        }

        let mut block = Block::new(self.create_heap(self.block_size)?);
        let offset = block.carve(size, alignment).ok_or_else(|| RhiError::AllocationFailed {
            heap_type: self.heap_type,
            size,
            diagnostic: format!("does not fit a fresh {} byte block", self.block_size),
        })?;
        let heap = Arc::clone(&block.heap);

        let index = match state.blocks.iter().position(Option::is_none) {
            Some(free_slot) => {
                state.blocks[free_slot] = Some(block);
                free_slot
            }
            None => {
                state.blocks.push(Some(block));
                state.blocks.len() - 1
            }
        };
        Ok((heap, Some(index), offset))
    }

    fn create_heap(&self, size: u64) -> Result<Arc<NativeHeap>, RhiError> {
        let desc = HeapDescriptor {
            heap_type: self.heap_type,
            size,
            label: None,
        };
        let heap = self
            .backend
            .create_heap(&desc)
            .map_err(|err| match err {
                BackendError::DeviceLost => RhiError::DeviceLost,
                err => RhiError::AllocationFailed {
                    heap_type: self.heap_type,
                    size,
                    diagnostic: err.to_string(),
                },
            })?;
        self.stats.heap_created(self.heap_type, size);
        log::debug!(
            "HeapPool({:?}): created heap {} ({} bytes)",
            self.heap_type,
            heap.id,
            size
        );
        Ok(Arc::new(heap))
    }

    fn destroy_heap(&self, heap: &NativeHeap) {
        self.backend.destroy_heap(heap);
        self.stats.heap_destroyed(self.heap_type, heap.size);
    }
}

impl std::fmt::Debug for HeapPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPool")
            .field("heap_type", &self.heap_type)
            .field("block_size", &self.block_size)
            .field("live_bytes", &self.live_bytes())
            .finish()
    }
}
