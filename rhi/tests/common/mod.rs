//! Common utilities for texture engine integration tests.
//!
//! Every test runs on the software backend, so results are deterministic and
//! fault injection is available through [`TestContext::backend`].

use std::sync::Arc;

use redlilium_rhi::{
    ExecutionMode, LockMode, MemoryStats, PixelFormat, RhiConfig, RhiDevice, SoftwareBackend,
    Texture, TextureDescriptor,
};

/// Initialize logging for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Deterministic byte pattern; different seeds give different patterns.
pub fn generate_test_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// ============================================================================
// Test Context
// ============================================================================

/// Device, backend and stats for one test.
pub struct TestContext {
    /// The software backend, for fault injection and inspection.
    pub backend: Arc<SoftwareBackend>,
    /// Stats sink the device reports to.
    #[allow(dead_code)]
    pub stats: Arc<MemoryStats>,
    /// The device under test.
    pub device: Arc<RhiDevice>,
}

impl TestContext {
    /// Single-node device with validation enabled.
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_config(
            RhiConfig::default()
                .with_execution_mode(mode)
                .with_validation(true),
        )
    }

    /// Device with an explicit configuration.
    pub fn with_config(config: RhiConfig) -> Self {
        init_logging();
        let backend = Arc::new(SoftwareBackend::new(
            config.gpu_node_count,
            config.device_memory_budget,
        ));
        let stats = Arc::new(MemoryStats::new());
        let device = RhiDevice::with_parts(config, backend.clone(), stats.clone())
            .expect("Failed to create device");
        Self {
            backend,
            stats,
            device,
        }
    }

    /// Create a 2D texture with no initial data.
    #[allow(dead_code)]
    pub fn create_texture_2d(&self, width: u32, height: u32, format: PixelFormat) -> Arc<Texture> {
        self.create(&TextureDescriptor::new_2d(width, height, format))
    }

    /// Create a texture with no initial data.
    pub fn create(&self, desc: &TextureDescriptor) -> Arc<Texture> {
        self.device
            .create_texture(desc, None, "test")
            .expect("Failed to create texture")
    }

    /// Write tightly packed data into `subresource` through a write lock.
    #[allow(dead_code)]
    pub fn write_subresource(&self, texture: &Texture, subresource: u32, data: &[u8]) {
        let locked = texture
            .lock(subresource, LockMode::WriteOnly)
            .expect("Failed to write lock");
        locked.write_packed(data).expect("Failed to write");
        texture.unlock(subresource).expect("Failed to unlock");
    }

    /// Read `subresource` back, tightly packed, through a read lock.
    #[allow(dead_code)]
    pub fn read_subresource(&self, texture: &Texture, subresource: u32) -> Vec<u8> {
        let locked = texture
            .lock(subresource, LockMode::ReadOnly)
            .expect("Failed to read lock");
        let data = locked.read_packed();
        texture.unlock(subresource).expect("Failed to unlock");
        data
    }
}

/// Read the RGBA8 pixel at `(x, y)` from tightly packed rows of `width` pixels.
#[allow(dead_code)]
pub fn get_pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let pixels: &[[u8; 4]] = bytemuck::cast_slice(data);
    pixels[(y * width + x) as usize]
}
