//! Staging buffers for CPU <-> GPU transfers.

use std::sync::Arc;

use super::location::{MappedRange, ResourceAllocator, ResourceLocation};
use super::HeapType;
use crate::error::RhiError;

/// A host-visible buffer used as the CPU side of a transfer.
#[derive(Debug)]
pub struct StagingBuffer {
    location: ResourceLocation,
    mapping: MappedRange,
}

impl StagingBuffer {
    /// The underlying allocation.
    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    /// CPU mapping of the whole buffer.
    pub fn mapping(&self) -> &MappedRange {
        &self.mapping
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.location.size()
    }

    /// Give up the buffer, keeping only its allocation.
    pub fn into_location(self) -> ResourceLocation {
        self.location
    }
}

/// Hands out upload and readback buffers.
///
/// Buffers are placement-aligned so a texture footprint may start at their
/// first byte.
#[derive(Debug)]
pub struct StagingBufferPool {
    allocator: Arc<ResourceAllocator>,
    alignment: u64,
}

impl StagingBufferPool {
    /// Create a pool on top of `allocator`.
    pub fn new(allocator: Arc<ResourceAllocator>, alignment: u64) -> Self {
        Self {
            allocator,
            alignment,
        }
    }

    /// A CPU-writable buffer of at least `size` bytes.
    pub fn acquire_upload(&self, size: u64) -> Result<StagingBuffer, RhiError> {
        self.acquire(HeapType::Upload, size)
    }

    /// A CPU-readable buffer of at least `size` bytes.
    pub fn acquire_readback(&self, size: u64) -> Result<StagingBuffer, RhiError> {
        self.acquire(HeapType::Readback, size)
    }

    /// Release a buffer immediately. The GPU must be done with it.
    pub fn release(&self, buffer: StagingBuffer) -> Result<(), RhiError> {
        self.allocator.release(buffer.location)
    }

    fn acquire(&self, heap_type: HeapType, size: u64) -> Result<StagingBuffer, RhiError> {
        let location = self.allocator.acquire(heap_type, size, self.alignment)?;
        match location.mapping() {
            Some(mapping) => Ok(StagingBuffer { location, mapping }),
            None => {
                self.allocator.release(location)?;
                Err(RhiError::invalid_state(format!(
                    "{heap_type:?} heap is not host visible"
                )))
            }
        }
    }
}
