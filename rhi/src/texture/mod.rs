//! Textures.
//!
//! A [`Texture`] is the engine-facing handle. It owns one [`TexturePeer`] per
//! GPU node; each peer binds a [`TextureResource`] (native texture plus its
//! memory) together with the views built for it. Every GPU-side operation
//! (upload, copy, transition) is applied to all peers; CPU readback uses the
//! first peer.
//!
//! # Example
//!
//! ```ignore
//! let desc = TextureDescriptor::new_2d(512, 512, PixelFormat::Rgba8Unorm)
//!     .with_mip_levels(4)
//!     .with_label("albedo");
//! let texture = device.create_texture(&desc, None, "albedo")?;
//!
//! let locked = texture.lock(0, LockMode::WriteOnly)?;
//! locked.write_packed(&pixels)?;
//! texture.unlock(0)?;
//! ```

mod copy;
mod lock;
mod resource;
mod update;
mod views;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::backend::NodeIndex;
use crate::command::{BufferFootprint, Command, CopyCommand, ScopedTransition};
use crate::deferred::DeferredRelease;
use crate::device::RhiDevice;
use crate::error::RhiError;
use crate::footprint::SubresourceFootprint;
use crate::types::{Extent3d, Origin3d, PixelFormat, ResourceState, TextureBox, TextureDescriptor, TextureFlags};

pub use copy::{CopyTextureInfo, CopyTextureOptions};
pub use lock::{LockMode, LockedSubresource};
pub(crate) use lock::LockTable;
pub use resource::TextureResource;
pub(crate) use resource::Backing;
pub use update::{SourceLayout, UpdateTextureRegion};
pub use views::{
    DepthStencilAccess, DepthStencilView, RenderTargetView, ShaderResourceView, TextureViews,
    UnorderedAccessView,
};

/// A resource and the views built for it, swapped together.
pub(crate) struct PeerBinding {
    pub(crate) resource: Arc<TextureResource>,
    pub(crate) views: TextureViews,
    pub(crate) aliased: bool,
}

/// One GPU node's share of a texture.
pub struct TexturePeer {
    node: NodeIndex,
    binding: RwLock<PeerBinding>,
}

impl TexturePeer {
    pub(crate) fn new(node: NodeIndex, resource: Arc<TextureResource>, views: TextureViews) -> Self {
        Self {
            node,
            binding: RwLock::new(PeerBinding {
                resource,
                views,
                aliased: false,
            }),
        }
    }

    /// GPU node.
    pub fn node(&self) -> NodeIndex {
        self.node
    }

    /// The resource currently bound.
    pub fn resource(&self) -> Arc<TextureResource> {
        Arc::clone(&self.binding.read().resource)
    }

    /// The views currently bound.
    pub fn views(&self) -> TextureViews {
        self.binding.read().views.clone()
    }

    /// Replace the bound resource and views. Returns the previous resource.
    pub(crate) fn rebind(
        &self,
        resource: Arc<TextureResource>,
        views: TextureViews,
        aliased: bool,
    ) -> Arc<TextureResource> {
        let mut binding = self.binding.write();
        binding.views = views;
        binding.aliased = aliased;
        std::mem::replace(&mut binding.resource, resource)
    }
}

/// A texture replicated across every GPU node of a device.
pub struct Texture {
    device: Arc<RhiDevice>,
    descriptor: TextureDescriptor,
    name: String,
    peers: SmallVec<[TexturePeer; 2]>,
    locks: Mutex<LockTable>,
    readback_footprint: OnceLock<SubresourceFootprint>,
    memory_size: u64,
}

impl Texture {
    pub(crate) fn new(
        device: Arc<RhiDevice>,
        descriptor: TextureDescriptor,
        name: String,
        peers: SmallVec<[TexturePeer; 2]>,
    ) -> Self {
        let memory_size = peers.iter().map(|peer| peer.resource().size()).sum();
        Self {
            device,
            descriptor,
            name,
            peers,
            locks: Mutex::new(HashMap::new()),
            readback_footprint: OnceLock::new(),
            memory_size,
        }
    }

    /// The device that created this texture.
    pub fn device(&self) -> &Arc<RhiDevice> {
        &self.device
    }

    /// The descriptor the texture was created with.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of mip 0.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    /// Mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Creation flags.
    pub fn flags(&self) -> TextureFlags {
        self.descriptor.flags
    }

    /// Device memory held across all nodes at creation.
    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    /// Per-node peers.
    pub fn peers(&self) -> &[TexturePeer] {
        &self.peers
    }

    /// Resource bound on `node`.
    pub fn resource(&self, node: NodeIndex) -> Option<Arc<TextureResource>> {
        self.peer(node).map(TexturePeer::resource)
    }

    /// Views bound on `node`.
    pub fn views(&self, node: NodeIndex) -> Option<TextureViews> {
        self.peer(node).map(TexturePeer::views)
    }

    /// Backend id of the native texture on `node`.
    pub fn native_id(&self, node: NodeIndex) -> Option<u64> {
        self.resource(node).and_then(|resource| resource.native_id())
    }

    /// Returns true if the texture references another texture's memory.
    pub fn is_aliased(&self) -> bool {
        self.peers.iter().any(|peer| peer.binding.read().aliased)
    }

    /// Returns true if `subresource` is currently locked.
    pub fn is_locked(&self, subresource: u32) -> bool {
        self.locks
            .lock()
            .get(&subresource)
            .is_some_and(|entry| entry.is_locked())
    }

    fn peer(&self, node: NodeIndex) -> Option<&TexturePeer> {
        self.peers.iter().find(|peer| peer.node == node)
    }

    pub(crate) fn first_resource(&self) -> Result<Arc<TextureResource>, RhiError> {
        self.peers
            .first()
            .map(TexturePeer::resource)
            .ok_or_else(|| RhiError::invalid_state(format!("texture '{}' has no peers", self.name)))
    }

    pub(crate) fn has_locks(&self) -> bool {
        self.locks.lock().values().any(|entry| entry.is_locked())
    }

    /// Record a buffer -> texture copy into `resource`, bracketed by
    /// transitions into and out of the copy-destination state.
    pub(crate) fn record_upload(
        &self,
        resource: &TextureResource,
        subresource: u32,
        src: BufferFootprint,
        src_box: Option<TextureBox>,
        dst_origin: Origin3d,
    ) -> Result<(), RhiError> {
        let queue = self.device.queue();
        let _dst = ScopedTransition::new(queue, resource, ResourceState::CopyDest)?;
        queue.record(
            resource.node(),
            Command::Copy(CopyCommand::BufferToTexture {
                src,
                src_box,
                dst: Arc::clone(resource.native()?),
                dst_subresource: subresource,
                dst_origin,
            }),
        );
        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let retire_at = self.device.queue().pending_fence_value();
        for peer in &self.peers {
            self.device
                .defer_release_at(retire_at, DeferredRelease::Texture(peer.resource()));
        }
        for (_, entry) in self.locks.get_mut().drain() {
            if let Some(staging) = entry.into_staging() {
                self.device.defer_release_at(
                    retire_at,
                    DeferredRelease::Allocation(staging.into_location()),
                );
            }
        }
        self.device
            .stats()
            .texture_destroyed(&self.descriptor, self.memory_size);
        log::trace!(
            "Texture: released '{}' (retires at fence {})",
            self.name,
            retire_at
        );
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("format", &self.descriptor.format)
            .field("size", &self.descriptor.size)
            .field("mips", &self.descriptor.mip_level_count)
            .field("peers", &self.peers.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
