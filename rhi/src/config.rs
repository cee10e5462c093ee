//! Device configuration.
//!
//! [`RhiConfig`] collects the limits, alignments and pool sizes the texture
//! engine runs with. The defaults mirror a typical D3D12-class device.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::{ExecutionMode, RhiConfig};
//!
//! let config = RhiConfig::default()
//!     .with_gpu_node_count(2)
//!     .with_execution_mode(ExecutionMode::Threaded)
//!     .with_validation(true);
//! assert_eq!(config.gpu_node_count, 2);
//! ```

use crate::footprint::FootprintRules;
use crate::memory::HeapType;

/// How recorded command batches are replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    /// Batches execute on the thread that submits them.
    #[default]
    Immediate,
    /// Batches are handed to a dedicated executor thread.
    Threaded,
}

/// Configuration for an [`RhiDevice`](crate::RhiDevice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhiConfig {
    /// Row pitch alignment for linear texture data, in bytes.
    pub pitch_alignment: u32,
    /// Placement alignment of subresources inside a linear buffer, in bytes.
    pub placement_alignment: u64,
    /// Maximum width/height of 1D, 2D and cube textures.
    pub max_texture_dimension_2d: u32,
    /// Maximum width/height/depth of 3D textures.
    pub max_texture_dimension_3d: u32,
    /// Maximum number of array layers (cube faces count individually).
    pub max_array_layers: u32,
    /// Maximum multisample count.
    pub max_sample_count: u32,
    /// Whether reserved (sparse) textures are supported.
    pub sparse_supported: bool,
    /// Number of GPU nodes textures are replicated across.
    pub gpu_node_count: u32,
    /// Size of pooled default-heap blocks.
    pub default_pool_block_size: u64,
    /// Size of pooled upload-heap blocks.
    pub upload_pool_block_size: u64,
    /// Size of pooled readback-heap blocks.
    pub readback_pool_block_size: u64,
    /// Allocations larger than this get a dedicated heap.
    pub max_placed_size: u64,
    /// How recorded commands are replayed.
    pub execution_mode: ExecutionMode,
    /// Whether copy and update regions are validated (bounds, block alignment).
    pub validation: bool,
    /// Device-local memory reported by the software backend's budget query.
    pub device_memory_budget: u64,
}

impl Default for RhiConfig {
    fn default() -> Self {
        Self {
            pitch_alignment: 256,
            placement_alignment: 512,
            max_texture_dimension_2d: 16384,
            max_texture_dimension_3d: 2048,
            max_array_layers: 2048,
            max_sample_count: 8,
            sparse_supported: false,
            gpu_node_count: 1,
            default_pool_block_size: 32 * 1024 * 1024,
            upload_pool_block_size: 4 * 1024 * 1024,
            readback_pool_block_size: 4 * 1024 * 1024,
            max_placed_size: 8 * 1024 * 1024,
            execution_mode: ExecutionMode::Immediate,
            validation: cfg!(debug_assertions),
            device_memory_budget: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl RhiConfig {
    /// Set the number of GPU nodes textures are replicated across.
    pub fn with_gpu_node_count(mut self, count: u32) -> Self {
        self.gpu_node_count = count;
        self
    }

    /// Set the execution mode.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Enable or disable region validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    /// Enable or disable reserved (sparse) texture support.
    pub fn with_sparse_support(mut self, supported: bool) -> Self {
        self.sparse_supported = supported;
        self
    }

    /// Set the maximum size of a placed allocation.
    pub fn with_max_placed_size(mut self, size: u64) -> Self {
        self.max_placed_size = size;
        self
    }

    /// Set the pooled block size for one heap type.
    pub fn with_pool_block_size(mut self, heap_type: HeapType, size: u64) -> Self {
        match heap_type {
            HeapType::Default => self.default_pool_block_size = size,
            HeapType::Upload => self.upload_pool_block_size = size,
            HeapType::Readback => self.readback_pool_block_size = size,
        }
        self
    }

    /// Set the device memory budget reported by the software backend.
    pub fn with_device_memory_budget(mut self, bytes: u64) -> Self {
        self.device_memory_budget = bytes;
        self
    }

    /// Footprint rules derived from the configured alignments.
    pub fn footprint_rules(&self) -> FootprintRules {
        FootprintRules {
            pitch_alignment: self.pitch_alignment,
            placement_alignment: self.placement_alignment,
        }
    }

    /// Pooled block size for a heap type.
    pub fn pool_block_size(&self, heap_type: HeapType) -> u64 {
        match heap_type {
            HeapType::Default => self.default_pool_block_size,
            HeapType::Upload => self.upload_pool_block_size,
            HeapType::Readback => self.readback_pool_block_size,
        }
    }
}
