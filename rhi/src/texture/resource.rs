//! Per-node texture resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, NativeTexture, NodeIndex};
use crate::error::RhiError;
use crate::footprint::PackedLayout;
use crate::memory::{MappedRange, ResourceAllocator, ResourceLocation};
use crate::types::ResourceState;

/// What backs a texture resource.
#[derive(Debug)]
pub(crate) enum Backing {
    /// A native texture, placed in `location` unless reserved.
    Native {
        texture: Arc<NativeTexture>,
        location: Option<ResourceLocation>,
    },
    /// Host-visible readback memory laid out by `layout`.
    Readback {
        location: Option<ResourceLocation>,
        layout: PackedLayout,
    },
}

/// One node's copy of a texture: the native object, its memory and the state
/// the last recorded command leaves it in.
///
/// Shared through `Arc` between a texture and any texture aliasing it; the
/// native object and memory are released when the last holder goes away.
pub struct TextureResource {
    node: NodeIndex,
    backing: Backing,
    size: u64,
    state: Mutex<ResourceState>,
    allocator: Arc<ResourceAllocator>,
    backend: Arc<dyn GpuBackend>,
}

impl TextureResource {
    pub(crate) fn new(
        node: NodeIndex,
        backing: Backing,
        size: u64,
        state: ResourceState,
        allocator: Arc<ResourceAllocator>,
        backend: Arc<dyn GpuBackend>,
    ) -> Self {
        Self {
            node,
            backing,
            size,
            state: Mutex::new(state),
            allocator,
            backend,
        }
    }

    /// GPU node this resource lives on.
    pub fn node(&self) -> NodeIndex {
        self.node
    }

    /// Device memory this resource occupies.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The native texture. Fails for readback textures, which have none.
    pub fn native(&self) -> Result<&Arc<NativeTexture>, RhiError> {
        match &self.backing {
            Backing::Native { texture, .. } => Ok(texture),
            Backing::Readback { .. } => Err(RhiError::invalid_state(
                "readback textures have no native texture",
            )),
        }
    }

    /// Backend id of the native texture, if any.
    pub fn native_id(&self) -> Option<u64> {
        self.native().ok().map(|texture| texture.id)
    }

    /// The memory range backing this resource. `None` for reserved textures.
    pub fn location(&self) -> Option<&ResourceLocation> {
        match &self.backing {
            Backing::Native { location, .. } | Backing::Readback { location, .. } => {
                location.as_ref()
            }
        }
    }

    /// Linear layout of a readback texture.
    pub fn readback_layout(&self) -> Option<&PackedLayout> {
        match &self.backing {
            Backing::Readback { layout, .. } => Some(layout),
            Backing::Native { .. } => None,
        }
    }

    /// CPU mapping of one subresource of a readback texture.
    pub(crate) fn readback_mapping(&self, subresource: u32) -> Result<MappedRange, RhiError> {
        let (location, layout) = match &self.backing {
            Backing::Readback {
                location: Some(location),
                layout,
            } => (location, layout),
            _ => return Err(RhiError::invalid_state("not a readback texture")),
        };
        let footprint = layout.footprint(subresource).ok_or_else(|| {
            RhiError::invalid_parameter(format!("subresource {subresource} out of range"))
        })?;
        let mapping = location
            .mapping()
            .ok_or_else(|| RhiError::invalid_state("readback memory is not host visible"))?;
        mapping.subrange(footprint.offset, footprint.total_bytes)
    }

    /// State after every command recorded so far.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    pub(crate) fn state_cell(&self) -> &Mutex<ResourceState> {
        &self.state
    }
}

impl Drop for TextureResource {
    fn drop(&mut self) {
        let location = match &mut self.backing {
            Backing::Native { texture, location } => {
                self.backend.destroy_texture(texture);
                location.take()
            }
            Backing::Readback { location, .. } => location.take(),
        };
        if let Some(location) = location
            && let Err(err) = self.allocator.release(location)
        {
            log::error!("TextureResource: failed to release memory: {err}");
        }
    }
}

impl std::fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureResource")
            .field("node", &self.node)
            .field("native_id", &self.native_id())
            .field("size", &self.size)
            .field("state", &self.state())
            .finish()
    }
}

static_assertions::assert_impl_all!(TextureResource: Send, Sync);
