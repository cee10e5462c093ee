//! Memory statistics.
//!
//! The engine reports allocation and texture lifetime events to a
//! [`StatsSink`]. [`NoopStats`] discards them; [`MemoryStats`] keeps atomic
//! counters that can be read from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory::HeapType;
use crate::types::TextureDescriptor;

/// Receiver of memory events. Every method defaults to doing nothing.
pub trait StatsSink: Send + Sync {
    /// A heap was created.
    fn heap_created(&self, heap_type: HeapType, bytes: u64) {
        let _ = (heap_type, bytes);
    }

    /// A heap was destroyed.
    fn heap_destroyed(&self, heap_type: HeapType, bytes: u64) {
        let _ = (heap_type, bytes);
    }

    /// A range was handed out.
    fn allocation_acquired(&self, heap_type: HeapType, bytes: u64) {
        let _ = (heap_type, bytes);
    }

    /// A range was given back.
    fn allocation_released(&self, heap_type: HeapType, bytes: u64) {
        let _ = (heap_type, bytes);
    }

    /// A texture was created; `bytes` is its device memory across all nodes.
    fn texture_created(&self, desc: &TextureDescriptor, bytes: u64) {
        let _ = (desc, bytes);
    }

    /// A texture was destroyed.
    fn texture_destroyed(&self, desc: &TextureDescriptor, bytes: u64) {
        let _ = (desc, bytes);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {}

/// Point-in-time copy of [`MemoryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Live sub-allocated bytes, indexed by [`HeapType::index`].
    pub allocated_bytes: [u64; 3],
    /// Bytes reserved in device heaps, indexed by [`HeapType::index`].
    pub heap_bytes: [u64; 3],
    /// Live textures.
    pub texture_count: u64,
    /// Device memory held by live textures.
    pub texture_bytes: u64,
    /// Device memory held by live render and depth targets.
    pub render_target_bytes: u64,
    /// Highest `texture_bytes` seen.
    pub peak_texture_bytes: u64,
}

/// Atomic counters fed by the engine.
#[derive(Debug, Default)]
pub struct MemoryStats {
    allocated_bytes: [AtomicU64; 3],
    heap_bytes: [AtomicU64; 3],
    texture_count: AtomicU64,
    texture_bytes: AtomicU64,
    render_target_bytes: AtomicU64,
    peak_texture_bytes: AtomicU64,
}

impl MemoryStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counters: &[AtomicU64; 3]| counters.each_ref().map(|c| c.load(Ordering::Relaxed));
        StatsSnapshot {
            allocated_bytes: load(&self.allocated_bytes),
            heap_bytes: load(&self.heap_bytes),
            texture_count: self.texture_count.load(Ordering::Relaxed),
            texture_bytes: self.texture_bytes.load(Ordering::Relaxed),
            render_target_bytes: self.render_target_bytes.load(Ordering::Relaxed),
            peak_texture_bytes: self.peak_texture_bytes.load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for MemoryStats {
    fn heap_created(&self, heap_type: HeapType, bytes: u64) {
        self.heap_bytes[heap_type.index()].fetch_add(bytes, Ordering::Relaxed);
    }

    fn heap_destroyed(&self, heap_type: HeapType, bytes: u64) {
        self.heap_bytes[heap_type.index()].fetch_sub(bytes, Ordering::Relaxed);
    }

    fn allocation_acquired(&self, heap_type: HeapType, bytes: u64) {
        self.allocated_bytes[heap_type.index()].fetch_add(bytes, Ordering::Relaxed);
    }

    fn allocation_released(&self, heap_type: HeapType, bytes: u64) {
        self.allocated_bytes[heap_type.index()].fetch_sub(bytes, Ordering::Relaxed);
    }

    fn texture_created(&self, desc: &TextureDescriptor, bytes: u64) {
        self.texture_count.fetch_add(1, Ordering::Relaxed);
        let total = self.texture_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_texture_bytes.fetch_max(total, Ordering::Relaxed);
        if desc.is_attachment() {
            self.render_target_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    fn texture_destroyed(&self, desc: &TextureDescriptor, bytes: u64) {
        self.texture_count.fetch_sub(1, Ordering::Relaxed);
        self.texture_bytes.fetch_sub(bytes, Ordering::Relaxed);
        if desc.is_attachment() {
            self.render_target_bytes.fetch_sub(bytes, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PixelFormat, TextureFlags};

    #[test]
    fn test_memory_stats_counts_textures() {
        let stats = MemoryStats::new();
        let color = TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm);
        let target = color.clone().with_flags(TextureFlags::RENDER_TARGET);

        stats.texture_created(&color, 100);
        stats.texture_created(&target, 50);
        stats.texture_destroyed(&color, 100);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.texture_count, 1);
        assert_eq!(snapshot.texture_bytes, 50);
        assert_eq!(snapshot.render_target_bytes, 50);
        assert_eq!(snapshot.peak_texture_bytes, 150);
    }

    #[test]
    fn test_memory_stats_per_heap() {
        let stats = MemoryStats::new();
        stats.allocation_acquired(HeapType::Upload, 10);
        stats.allocation_acquired(HeapType::Readback, 20);
        stats.allocation_released(HeapType::Upload, 10);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allocated_bytes, [0, 0, 20]);
    }
}
