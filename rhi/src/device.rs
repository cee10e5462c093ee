//! The RHI device.
//!
//! [`RhiDevice`] owns everything textures share: the backend, the memory
//! pools, the command queue and the deferred release queue. Textures keep an
//! `Arc` to their device, so the device outlives every texture it created.
//!
//! # Example
//!
//! ```ignore
//! let device = RhiDevice::new(RhiConfig::default())?;
//! let texture = device.create_texture(
//!     &TextureDescriptor::new_2d(256, 256, PixelFormat::Rgba8Unorm),
//!     Some(&pixels),
//!     "checker",
//! )?;
//!
//! // Once per frame:
//! device.end_frame()?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::backend::{
    BackendError, DEFAULT_MSAA_RESOURCE_PLACEMENT_ALIGNMENT, DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT,
    GpuBackend, MemoryBudget, NativeResourceFlags, NativeTextureDesc, NodeIndex,
    SMALL_MSAA_RESOURCE_LIMIT, SMALL_MSAA_RESOURCE_PLACEMENT_ALIGNMENT, SMALL_RESOURCE_LIMIT,
    SMALL_RESOURCE_PLACEMENT_ALIGNMENT, SoftwareBackend, TexturePlacement,
};
use crate::command::{BarrierKind, Command, CommandQueue, transition_to};
use crate::config::RhiConfig;
use crate::deferred::{DeferredRelease, DeferredReleaseQueue};
use crate::error::RhiError;
use crate::footprint::{self, FootprintRules};
use crate::memory::{HeapType, PlacementPolicy, ResourceAllocator, StagingBufferPool};
use crate::stats::{NoopStats, StatsSink};
use crate::sync::FenceValue;
use crate::texture::{
    Backing, CopyTextureInfo, CopyTextureOptions, Texture, TexturePeer, TextureResource,
    TextureViews,
};
use crate::types::{Extent3d, ResourceState, TextureDescriptor, TextureDimension, TextureFlags};

/// Counts reallocations whose copies have not executed yet.
///
/// Shared between the caller and the executing context; the counter drops
/// back when the GPU copies of a reallocation have run.
#[derive(Debug, Default)]
pub struct ReallocationStatus {
    pending: AtomicU32,
}

impl ReallocationStatus {
    /// Create a status with nothing pending.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reallocations still waiting for their copies.
    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns true once every reallocation has completed.
    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A device creating and operating on textures.
///
/// # Thread Safety
///
/// `RhiDevice` is `Send + Sync`. Operations may be issued from any thread;
/// they are recorded into a single queue and replayed in issue order.
pub struct RhiDevice {
    config: RhiConfig,
    backend: Arc<dyn GpuBackend>,
    stats: Arc<dyn StatsSink>,
    allocator: Arc<ResourceAllocator>,
    staging: StagingBufferPool,
    queue: CommandQueue,
    deferred: DeferredReleaseQueue,
    textures: RwLock<Vec<Weak<Texture>>>,
}

impl RhiDevice {
    /// Create a device on the software backend.
    pub fn new(config: RhiConfig) -> Result<Arc<Self>, RhiError> {
        let backend = Arc::new(SoftwareBackend::new(
            config.gpu_node_count,
            config.device_memory_budget,
        ));
        Self::with_parts(config, backend, Arc::new(NoopStats))
    }

    /// Create a device on an explicit backend and stats sink.
    pub fn with_parts(
        config: RhiConfig,
        backend: Arc<dyn GpuBackend>,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Arc<Self>, RhiError> {
        if config.gpu_node_count == 0 {
            return Err(RhiError::invalid_parameter("gpu_node_count must be at least 1"));
        }
        if config.gpu_node_count > backend.node_count() {
            return Err(RhiError::invalid_parameter(format!(
                "{} GPU nodes requested, backend '{}' has {}",
                config.gpu_node_count,
                backend.name(),
                backend.node_count()
            )));
        }

        let allocator = Arc::new(ResourceAllocator::new(
            &config,
            Arc::clone(&backend),
            Arc::clone(&stats),
        ));
        let staging = StagingBufferPool::new(Arc::clone(&allocator), config.placement_alignment);
        let queue = CommandQueue::new(Arc::clone(&backend), config.execution_mode)?;

        log::info!(
            "RhiDevice: created on {} backend ({} nodes, {:?} execution)",
            backend.name(),
            config.gpu_node_count,
            config.execution_mode
        );

        Ok(Arc::new(Self {
            config,
            backend,
            stats,
            allocator,
            staging,
            queue,
            deferred: DeferredReleaseQueue::new(),
            textures: RwLock::new(Vec::new()),
        }))
    }

    /// Device configuration.
    pub fn config(&self) -> &RhiConfig {
        &self.config
    }

    /// The backend the device runs on.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The stats sink memory events are reported to.
    pub fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }

    /// The memory pools.
    pub fn allocator(&self) -> &Arc<ResourceAllocator> {
        &self.allocator
    }

    /// Staging buffers for CPU transfers.
    pub fn staging(&self) -> &StagingBufferPool {
        &self.staging
    }

    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Fence value the commands recorded so far will signal.
    pub fn pending_fence_value(&self) -> FenceValue {
        self.queue.pending_fence_value()
    }

    /// Last fence value the GPU has completed.
    pub fn completed_fence_value(&self) -> FenceValue {
        self.queue.fence().completed_value()
    }

    /// Advisory device-local memory budget and usage.
    pub fn memory_budget(&self) -> MemoryBudget {
        self.backend.memory_budget()
    }

    /// Number of live textures created by this device.
    pub fn texture_count(&self) -> usize {
        self.textures
            .read()
            .iter()
            .filter(|texture| texture.strong_count() > 0)
            .count()
    }

    /// Items waiting for the GPU before they can be released.
    pub fn pending_release_count(&self) -> usize {
        self.deferred.pending_count()
    }

    /// Destroy empty pooled heaps. Returns the bytes given back to the device.
    pub fn trim_memory(&self) -> u64 {
        self.allocator.trim()
    }

    // ========================================================================
    // Frame control
    // ========================================================================

    /// Submit everything recorded so far and wait for it, then release every
    /// retired resource.
    ///
    /// Retired resources are released even when a recorded command failed;
    /// the failure is returned afterwards.
    pub fn flush(&self) -> Result<(), RhiError> {
        let result = self.queue.flush();
        self.process_deferred();
        result.map(|_| ())
    }

    /// Submit the frame's commands without waiting, and release whatever
    /// earlier frames have retired. Returns the fence value of the frame.
    pub fn end_frame(&self) -> Result<FenceValue, RhiError> {
        crate::profile_scope!("RhiDevice::end_frame");

        let submitted = self.queue.submit();
        self.process_deferred();
        let value = submitted?;
        self.textures
            .write()
            .retain(|texture| texture.strong_count() > 0);

        crate::frame_mark!();
        crate::profile_plot!("rhi_pending_releases", self.deferred.pending_count());
        crate::profile_plot!(
            "rhi_default_heap_bytes",
            self.allocator.live_bytes(HeapType::Default)
        );
        Ok(value)
    }

    /// Queue `item` for release once the GPU reaches `retire_at`.
    pub fn defer_release_at(&self, retire_at: FenceValue, item: DeferredRelease) {
        self.deferred.queue(retire_at, item);
    }

    /// Release every item whose fence value has completed.
    pub fn process_deferred(&self) -> usize {
        let completed = self.queue.fence().completed_value();
        self.deferred.process(completed, &self.allocator)
    }

    // ========================================================================
    // Texture creation
    // ========================================================================

    /// Create a texture, replicated on every GPU node.
    ///
    /// `initial_data` holds every subresource tightly packed, in subresource
    /// index order. The upload is recorded, not executed; the texture ends up
    /// in `descriptor.initial_state` on every node.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedLayout`] if the descriptor exceeds device
    ///   limits. Nothing is allocated in that case.
    /// - [`RhiError::InvalidParameter`] for malformed descriptors or short
    ///   initial data.
    /// - [`RhiError::AllocationFailed`] if memory or the native texture could
    ///   not be created on some node. Peers created so far are torn down.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        initial_data: Option<&[u8]>,
        name: &str,
    ) -> Result<Arc<Texture>, RhiError> {
        crate::profile_scope!("RhiDevice::create_texture");

        self.validate_descriptor(descriptor, initial_data)?;
        let native = self.native_descriptor(descriptor);
        let info = self.backend.texture_allocation_info(&native);
        let native = if info.alignment != native.alignment {
            log::debug!(
                "RhiDevice: '{}' requested alignment {} but needs {}",
                name,
                native.alignment,
                info.alignment
            );
            NativeTextureDesc {
                alignment: info.alignment,
                ..native
            }
        } else {
            native
        };

        let mut peers: SmallVec<[TexturePeer; 2]> = SmallVec::new();
        for node in 0..self.config.gpu_node_count {
            // Dropping `peers` on failure destroys what was already created;
            // nothing has been recorded against those peers yet.
            peers.push(self.create_peer(descriptor, &native, info.size, node, name)?);
        }

        let texture = Arc::new(Texture::new(
            Arc::clone(self),
            descriptor.clone(),
            name.to_string(),
            peers,
        ));
        self.stats.texture_created(descriptor, texture.memory_size());
        self.textures.write().push(Arc::downgrade(&texture));

        if !descriptor.is_cpu_readback() {
            if let Some(data) = initial_data {
                texture.upload_initial_data(data)?;
            }
            for peer in texture.peers() {
                transition_to(&self.queue, &peer.resource(), descriptor.initial_state)?;
            }
        }

        log::trace!(
            "RhiDevice: created texture '{}' {:?} {}x{}x{}, {} mips, {} bytes on {} nodes",
            name,
            descriptor.format,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            descriptor.mip_level_count,
            texture.memory_size(),
            texture.peers().len()
        );
        Ok(texture)
    }

    /// Release a texture. The memory is freed once the GPU is done with it.
    pub fn destroy_texture(&self, texture: Arc<Texture>) {
        if Arc::strong_count(&texture) > 1 {
            log::debug!(
                "RhiDevice: destroy_texture('{}') while {} other handles are alive",
                texture.name(),
                Arc::strong_count(&texture) - 1
            );
        }
        drop(texture);
    }

    fn validate_descriptor(
        &self,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<(), RhiError> {
        let config = &self.config;
        let size = desc.size;

        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(RhiError::invalid_parameter(
                "texture dimensions cannot be zero",
            ));
        }
        if desc.mip_level_count == 0 || desc.array_size == 0 || desc.sample_count == 0 {
            return Err(RhiError::invalid_parameter(
                "mip level, array and sample counts must be at least 1",
            ));
        }
        let max_mips = 32 - size.max_dimension().leading_zeros();
        if desc.mip_level_count > max_mips {
            return Err(RhiError::invalid_parameter(format!(
                "{} mips requested, a {}x{}x{} texture has at most {max_mips}",
                desc.mip_level_count, size.width, size.height, size.depth
            )));
        }
        match desc.dimension {
            TextureDimension::D1 if size.height != 1 || size.depth != 1 => {
                return Err(RhiError::invalid_parameter("1D textures must have height and depth 1"));
            }
            TextureDimension::Cube if size.width != size.height => {
                return Err(RhiError::invalid_parameter("cube faces must be square"));
            }
            TextureDimension::D3 if desc.array_size != 1 => {
                return Err(RhiError::invalid_parameter("3D textures cannot be arrays"));
            }
            _ => {}
        }

        let max_dim = match desc.dimension {
            TextureDimension::D3 => config.max_texture_dimension_3d,
            _ => config.max_texture_dimension_2d,
        };
        if size.max_dimension() > max_dim {
            return Err(RhiError::UnsupportedLayout(format!(
                "dimension {} exceeds the device maximum {max_dim}",
                size.max_dimension()
            )));
        }
        if desc.layer_count() > config.max_array_layers {
            return Err(RhiError::UnsupportedLayout(format!(
                "{} layers exceed the device maximum {}",
                desc.layer_count(),
                config.max_array_layers
            )));
        }
        if desc.sample_count > config.max_sample_count || !desc.sample_count.is_power_of_two() {
            return Err(RhiError::UnsupportedLayout(format!(
                "sample count {} is not supported (maximum {})",
                desc.sample_count, config.max_sample_count
            )));
        }
        if desc.is_multisampled()
            && (desc.mip_level_count != 1
                || desc.dimension == TextureDimension::D3
                || desc.is_cpu_readback())
        {
            return Err(RhiError::UnsupportedLayout(
                "multisampled textures must be single-mip, non-volume and GPU only".to_string(),
            ));
        }

        let reserved = desc.flags.contains(TextureFlags::RESERVED);
        if reserved && !config.sparse_supported {
            return Err(RhiError::UnsupportedLayout(
                "reserved textures are not supported by this device".to_string(),
            ));
        }
        if desc.is_cpu_readback()
            && (reserved
                || desc.flags.intersects(
                    TextureFlags::RENDER_TARGET
                        | TextureFlags::DEPTH_STENCIL
                        | TextureFlags::UNORDERED_ACCESS,
                ))
        {
            return Err(RhiError::invalid_parameter(
                "readback textures cannot be reserved or bound to the pipeline",
            ));
        }
        if desc.flags.contains(TextureFlags::DEPTH_STENCIL) && !desc.format.is_depth_stencil() {
            return Err(RhiError::invalid_parameter(format!(
                "{:?} is not a depth-stencil format",
                desc.format
            )));
        }

        if initial_data.is_some()
            && (reserved || desc.is_multisampled() || desc.is_cpu_readback())
        {
            return Err(RhiError::invalid_parameter(
                "initial data is not supported for reserved, multisampled or readback textures",
            ));
        }
        Ok(())
    }

    /// Native descriptor with resource flags and the preferred alignment.
    fn native_descriptor(&self, desc: &TextureDescriptor) -> NativeTextureDesc {
        let flags = desc.flags;
        let mut resource_flags = NativeResourceFlags::empty();
        if flags.contains(TextureFlags::RENDER_TARGET) {
            resource_flags |= NativeResourceFlags::ALLOW_RENDER_TARGET;
        }
        if flags.contains(TextureFlags::DEPTH_STENCIL) {
            resource_flags |= NativeResourceFlags::ALLOW_DEPTH_STENCIL;
            if !flags.contains(TextureFlags::SHADER_RESOURCE) {
                resource_flags |= NativeResourceFlags::DENY_SHADER_RESOURCE;
            }
        }
        if flags.contains(TextureFlags::UNORDERED_ACCESS) {
            resource_flags |= NativeResourceFlags::ALLOW_UNORDERED_ACCESS;
        }
        if flags.contains(TextureFlags::SHARED) {
            resource_flags |= NativeResourceFlags::ALLOW_SIMULTANEOUS_ACCESS;
        }

        let msaa = desc.is_multisampled();
        let (small, default, limit) = if msaa {
            (
                SMALL_MSAA_RESOURCE_PLACEMENT_ALIGNMENT,
                DEFAULT_MSAA_RESOURCE_PLACEMENT_ALIGNMENT,
                SMALL_MSAA_RESOURCE_LIMIT,
            )
        } else {
            (
                SMALL_RESOURCE_PLACEMENT_ALIGNMENT,
                DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT,
                SMALL_RESOURCE_LIMIT,
            )
        };
        let mip0 = footprint::subresource_footprint(desc, 0, FootprintRules::default())
            .map(|fp| fp.total_bytes)
            .unwrap_or(u64::MAX);
        let alignment = if !desc.is_attachment() && mip0 <= limit {
            small
        } else {
            default
        };

        NativeTextureDesc {
            descriptor: desc.clone(),
            resource_flags,
            alignment,
        }
    }

    /// Create one node's resource and views.
    fn create_peer(
        &self,
        desc: &TextureDescriptor,
        native: &NativeTextureDesc,
        size: u64,
        node: NodeIndex,
        name: &str,
    ) -> Result<TexturePeer, RhiError> {
        if desc.is_cpu_readback() {
            return self.create_readback_peer(desc, native, node, name);
        }

        if desc.flags.contains(TextureFlags::RESERVED) {
            let texture = self
                .backend
                .create_texture(native, node, TexturePlacement::Reserved, ResourceState::Common)
                .map_err(|err| driver_failure(err, HeapType::Default, 0, desc, name))?;
            let views = TextureViews::build(desc, texture.id);
            let resource = self.resource(
                node,
                Backing::Native {
                    texture: Arc::new(texture),
                    location: None,
                },
                0,
            );
            return Ok(TexturePeer::new(node, resource, views));
        }

        let policy = if desc.is_attachment()
            || desc.flags.contains(TextureFlags::SHARED)
            || size > self.config.max_placed_size
        {
            PlacementPolicy::Standalone
        } else {
            PlacementPolicy::Pooled
        };
        let location = self.allocator.acquire_with_policy(
            HeapType::Default,
            size,
            native.alignment,
            policy,
        )?;

        let created = self.backend.create_texture(
            native,
            node,
            TexturePlacement::Placed {
                heap: location.heap(),
                offset: location.offset(),
            },
            ResourceState::Common,
        );
        let texture = match created {
            Ok(texture) => texture,
            Err(err) => {
                if let Err(release) = self.allocator.release(location) {
                    log::error!("RhiDevice: failed to release memory of '{name}': {release}");
                }
                return Err(driver_failure(err, HeapType::Default, size, desc, name));
            }
        };

        let views = TextureViews::build(desc, texture.id);
        let resource = self.resource(
            node,
            Backing::Native {
                texture: Arc::new(texture),
                location: Some(location),
            },
            size,
        );
        Ok(TexturePeer::new(node, resource, views))
    }

    fn create_readback_peer(
        &self,
        desc: &TextureDescriptor,
        native: &NativeTextureDesc,
        node: NodeIndex,
        name: &str,
    ) -> Result<TexturePeer, RhiError> {
        let layout = self
            .backend
            .copyable_footprints(native, 0, desc.subresource_count(), 0)
            .map_err(|err| driver_failure(err, HeapType::Readback, 0, desc, name))?;
        let location = self.allocator.acquire(
            HeapType::Readback,
            layout.total_size,
            self.config.placement_alignment,
        )?;
        let size = location.size();
        let resource = self.resource(
            node,
            Backing::Readback {
                location: Some(location),
                layout,
            },
            size,
        );
        Ok(TexturePeer::new(node, resource, TextureViews::default()))
    }

    fn resource(&self, node: NodeIndex, backing: Backing, size: u64) -> Arc<TextureResource> {
        Arc::new(TextureResource::new(
            node,
            backing,
            size,
            ResourceState::Common,
            Arc::clone(&self.allocator),
            Arc::clone(&self.backend),
        ))
    }

    // ========================================================================
    // Aliasing and reallocation
    // ========================================================================

    /// Point `dest` at `source`'s memory on every node.
    ///
    /// Afterwards both textures share storage: writes through one are visible
    /// through the other. `dest`'s previous resource is released once the GPU
    /// is done with it.
    pub fn alias(&self, dest: &Texture, source: &Texture) -> Result<(), RhiError> {
        if std::ptr::eq(dest, source) {
            return Err(RhiError::invalid_parameter("cannot alias a texture to itself"));
        }
        if !dest.descriptor().is_layout_compatible(source.descriptor()) {
            return Err(RhiError::invalid_parameter(format!(
                "'{}' and '{}' differ in size, format or subresource layout",
                dest.name(),
                source.name()
            )));
        }
        if dest.descriptor().is_cpu_readback() || source.descriptor().is_cpu_readback() {
            return Err(RhiError::invalid_state("readback textures cannot be aliased"));
        }
        if dest.has_locks() || source.has_locks() {
            return Err(RhiError::invalid_state(format!(
                "'{}' or '{}' has locked subresources",
                dest.name(),
                source.name()
            )));
        }
        if dest.peers().len() != source.peers().len() {
            return Err(RhiError::invalid_parameter(
                "textures live on different numbers of nodes",
            ));
        }

        let mut replaced = Vec::with_capacity(dest.peers().len());
        for (dest_peer, source_peer) in dest.peers().iter().zip(source.peers()) {
            let resource = source_peer.resource();
            let native = Arc::clone(resource.native()?);
            let views = TextureViews::build(dest.descriptor(), native.id);
            replaced.push(dest_peer.rebind(resource, views, true));
            self.queue.record(
                dest_peer.node(),
                Command::Barrier {
                    texture: Some(native),
                    kind: BarrierKind::Aliasing,
                },
            );
        }

        let retire_at = self.queue.pending_fence_value();
        for old in replaced {
            self.defer_release_at(retire_at, DeferredRelease::Texture(old));
        }

        log::debug!("RhiDevice: '{}' now aliases '{}'", dest.name(), source.name());
        Ok(())
    }

    /// Create a resized copy of a 2D texture without blocking.
    ///
    /// The new texture has `new_mip_count` mips of `new_size`. Mips both
    /// textures share are copied, lined up from the smallest mip. `status`
    /// counts the reallocation as pending until the copies have executed.
    pub fn async_reallocate(
        self: &Arc<Self>,
        old: &Texture,
        new_mip_count: u32,
        new_size: Extent3d,
        status: &Arc<ReallocationStatus>,
    ) -> Result<Arc<Texture>, RhiError> {
        crate::profile_scope!("RhiDevice::async_reallocate");

        let old_desc = old.descriptor();
        if old_desc.dimension != TextureDimension::D2 || old_desc.is_multisampled() {
            return Err(RhiError::invalid_parameter(format!(
                "'{}' is not a single-sampled 2D texture",
                old.name()
            )));
        }
        if old_desc.is_cpu_readback() {
            return Err(RhiError::invalid_state("readback textures cannot be reallocated"));
        }

        let new_desc = TextureDescriptor {
            size: Extent3d::new_2d(new_size.width, new_size.height),
            mip_level_count: new_mip_count,
            ..old_desc.clone()
        };
        let new = self.create_texture(&new_desc, None, old.name())?;

        let shared = old_desc.mip_level_count.min(new_mip_count);
        status.begin();
        let copied = (0..shared).try_for_each(|i| {
            let source_mip = old_desc.mip_level_count - shared + i;
            let dest_mip = new_mip_count - shared + i;
            let src = footprint::mip_extent(old_desc, source_mip);
            let dst = footprint::mip_extent(&new_desc, dest_mip);
            let info = CopyTextureInfo {
                size: Some(Extent3d::new_3d(
                    src.width.min(dst.width),
                    src.height.min(dst.height),
                    1,
                )),
                num_layers: old_desc.layer_count(),
                ..CopyTextureInfo::mip(source_mip, dest_mip)
            };
            self.copy_texture(old, &new, &info, CopyTextureOptions::default())
        });
        if let Err(err) = copied {
            status.complete();
            return Err(err);
        }

        let node = new.peers().first().map(TexturePeer::node).unwrap_or_default();
        let done = Arc::clone(status);
        self.queue.record(
            node,
            Command::Custom(Box::new(move |_| {
                done.complete();
                Ok(())
            })),
        );

        log::debug!(
            "RhiDevice: reallocating '{}' {}x{} ({} mips) -> {}x{} ({} mips), {} mips copied",
            old.name(),
            old_desc.size.width,
            old_desc.size.height,
            old_desc.mip_level_count,
            new_size.width,
            new_size.height,
            new_mip_count,
            shared
        );
        Ok(new)
    }
}

impl Drop for RhiDevice {
    fn drop(&mut self) {
        if let Err(err) = self.queue.flush() {
            log::warn!("RhiDevice: final flush failed: {err}");
        }
        let released = self.deferred.release_all(&self.allocator);
        log::debug!("RhiDevice: destroyed ({released} deferred releases flushed)");
    }
}

impl std::fmt::Debug for RhiDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhiDevice")
            .field("backend", &self.backend.name())
            .field("nodes", &self.config.gpu_node_count)
            .field("queue", &self.queue)
            .field("pending_releases", &self.deferred.pending_count())
            .finish()
    }
}

/// Map a backend failure during creation, logging the descriptor.
fn driver_failure(
    err: BackendError,
    heap_type: HeapType,
    size: u64,
    desc: &TextureDescriptor,
    name: &str,
) -> RhiError {
    if err == BackendError::DeviceLost {
        return RhiError::DeviceLost;
    }
    log::error!("RhiDevice: creating '{name}' failed: {err} (descriptor {desc:?})");
    RhiError::AllocationFailed {
        heap_type,
        size,
        diagnostic: format!("'{name}': {err}"),
    }
}

static_assertions::assert_impl_all!(RhiDevice: Send, Sync);
static_assertions::assert_impl_all!(ReallocationStatus: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn device() -> Arc<RhiDevice> {
        RhiDevice::new(RhiConfig::default().with_validation(true)).unwrap()
    }

    #[test]
    fn test_limits_are_unsupported_layouts() {
        let device = device();
        let huge = TextureDescriptor::new_2d(32768, 4, PixelFormat::Rgba8Unorm);
        assert!(matches!(
            device.create_texture(&huge, None, "huge"),
            Err(RhiError::UnsupportedLayout(_))
        ));

        let msaa = TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm)
            .with_sample_count(16)
            .with_flags(TextureFlags::RENDER_TARGET);
        assert!(matches!(
            device.create_texture(&msaa, None, "msaa"),
            Err(RhiError::UnsupportedLayout(_))
        ));

        let sparse = TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm)
            .with_flags(TextureFlags::SHADER_RESOURCE | TextureFlags::RESERVED);
        assert!(matches!(
            device.create_texture(&sparse, None, "sparse"),
            Err(RhiError::UnsupportedLayout(_))
        ));
        assert_eq!(device.allocator().live_bytes(HeapType::Default), 0);
    }

    #[test]
    fn test_malformed_descriptors_are_invalid() {
        let device = device();
        let zero = TextureDescriptor::new_2d(0, 4, PixelFormat::Rgba8Unorm);
        assert!(matches!(
            device.create_texture(&zero, None, "zero"),
            Err(RhiError::InvalidParameter(_))
        ));
        let mips = TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm).with_mip_levels(4);
        assert!(matches!(
            device.create_texture(&mips, None, "mips"),
            Err(RhiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_small_textures_request_small_alignment() {
        let device = device();
        let small = TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm);
        assert_eq!(
            device.native_descriptor(&small).alignment,
            SMALL_RESOURCE_PLACEMENT_ALIGNMENT
        );

        let target = small.clone().with_flags(TextureFlags::RENDER_TARGET);
        assert_eq!(
            device.native_descriptor(&target).alignment,
            DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT
        );

        let large = TextureDescriptor::new_2d(1024, 1024, PixelFormat::Rgba8Unorm);
        assert_eq!(
            device.native_descriptor(&large).alignment,
            DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT
        );
    }

    #[test]
    fn test_resource_flags_mapping() {
        let device = device();
        let depth = TextureDescriptor::new_2d(64, 64, PixelFormat::Depth32Float)
            .with_flags(TextureFlags::DEPTH_STENCIL);
        let flags = device.native_descriptor(&depth).resource_flags;
        assert!(flags.contains(NativeResourceFlags::ALLOW_DEPTH_STENCIL));
        assert!(flags.contains(NativeResourceFlags::DENY_SHADER_RESOURCE));
    }

    #[test]
    fn test_texture_reaches_initial_state() {
        let device = device();
        let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm)
            .with_initial_state(ResourceState::ShaderResource);
        let texture = device.create_texture(&desc, None, "state").unwrap();
        assert_eq!(
            texture.resource(0).unwrap().state(),
            ResourceState::ShaderResource
        );
        assert_eq!(device.texture_count(), 1);
    }

    #[test]
    fn test_dropped_texture_waits_for_fence() {
        let device = device();
        let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm);
        let texture = device.create_texture(&desc, None, "short-lived").unwrap();
        assert!(device.allocator().live_bytes(HeapType::Default) > 0);

        device.destroy_texture(texture);
        assert_eq!(device.pending_release_count(), 1);
        assert!(device.allocator().live_bytes(HeapType::Default) > 0);

        device.flush().unwrap();
        assert_eq!(device.pending_release_count(), 0);
        assert_eq!(device.allocator().live_bytes(HeapType::Default), 0);
    }

    #[test]
    fn test_reallocation_status_counts() {
        let status = ReallocationStatus::new();
        status.begin();
        status.begin();
        assert_eq!(status.pending(), 2);
        status.complete();
        status.complete();
        assert!(status.is_complete());
    }
}
