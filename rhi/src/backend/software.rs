//! Software GPU backend.
//!
//! Emulates a linked multi-node GPU entirely in host memory:
//! - Heaps are accounted, and upload/readback heaps are backed by
//!   [`HostMemory`]
//! - Every texture subresource is stored tightly packed and zero-initialised
//! - Copies run block by block, so block-compressed formats behave like on
//!   hardware
//! - Resource states are tracked per subresource; a copy or transition that
//!   does not match the tracked state is recorded as a validation error
//!   instead of failing
//!
//! Fault injection ([`SoftwareBackend::fail_next_heap_allocations`],
//! [`SoftwareBackend::fail_next_copies`], [`SoftwareBackend::lose_device`])
//! lets tests drive the error paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{
    AllocationInfo, BackendError, DEFAULT_MSAA_RESOURCE_PLACEMENT_ALIGNMENT,
    DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT, GpuBackend, HeapDescriptor, HostMemory, MemoryBudget,
    NativeHeap, NativeResourceFlags, NativeTexture, NativeTextureDesc, NodeIndex,
    SMALL_MSAA_RESOURCE_LIMIT, SMALL_MSAA_RESOURCE_PLACEMENT_ALIGNMENT, SMALL_RESOURCE_LIMIT,
    SMALL_RESOURCE_PLACEMENT_ALIGNMENT, TexturePlacement,
};
use crate::command::{BufferFootprint, Command, CopyCommand};
use crate::footprint::{
    self, FootprintRules, FootprintSource, PackedLayout, SubresourceFootprint,
};
use crate::memory::HeapType;
use crate::types::{
    Extent3d, Origin3d, PixelFormat, ResourceState, SubresourceRange, TextureBox, align_up,
};

/// Tight packing used for texture storage.
const TIGHT: FootprintRules = FootprintRules {
    pitch_alignment: 1,
    placement_alignment: 1,
};

struct HeapRecord {
    heap_type: HeapType,
    size: u64,
}

struct Subresource {
    footprint: SubresourceFootprint,
    block_size: u32,
    data: Vec<u8>,
    state: ResourceState,
}

struct TextureStorage {
    format: PixelFormat,
    node: NodeIndex,
    subresources: Vec<Subresource>,
}

/// Region of a subresource in block units.
#[derive(Debug, Clone, Copy)]
struct BlockRegion {
    x: u32,
    y: u32,
    z: u32,
    columns: u32,
    rows: u32,
    depth: u32,
}

impl BlockRegion {
    fn from_box(format: PixelFormat, region: TextureBox) -> Self {
        let (bw, bh) = format.block_dimensions();
        let (columns, rows) = footprint::block_counts(format, region.width, region.height);
        Self {
            x: region.x / bw,
            y: region.y / bh,
            z: region.z,
            columns,
            rows,
            depth: region.depth.max(1),
        }
    }

    fn whole(fp: &SubresourceFootprint, block_size: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            columns: fp.row_size_bytes / block_size,
            rows: fp.row_count,
            depth: fp.depth,
        }
    }

    fn at(mut self, format: PixelFormat, origin: Origin3d) -> Self {
        let (bw, bh) = format.block_dimensions();
        self.x = origin.x / bw;
        self.y = origin.y / bh;
        self.z = origin.z;
        self
    }

    /// Shrink the region so it fits a `columns x rows x depth` block grid.
    fn clamp(mut self, columns: u32, rows: u32, depth: u32) -> (Self, bool) {
        let fits = self.x + self.columns <= columns
            && self.y + self.rows <= rows
            && self.z + self.depth <= depth;
        self.columns = self.columns.min(columns.saturating_sub(self.x));
        self.rows = self.rows.min(rows.saturating_sub(self.y));
        self.depth = self.depth.min(depth.saturating_sub(self.z));
        (self, fits)
    }
}

/// A GPU emulated in host memory.
pub struct SoftwareBackend {
    node_count: u32,
    budget: u64,
    next_id: AtomicU64,
    heaps: Mutex<HashMap<u64, HeapRecord>>,
    textures: Mutex<HashMap<u64, TextureStorage>>,
    device_usage: AtomicU64,
    failing_heap_allocations: AtomicU32,
    failing_copies: AtomicU32,
    lost: AtomicBool,
    executed: AtomicU64,
    validation_errors: Mutex<Vec<String>>,
}

impl SoftwareBackend {
    /// Create a backend with `node_count` GPU nodes and a device-local budget.
    pub fn new(node_count: u32, budget: u64) -> Self {
        Self {
            node_count: node_count.max(1),
            budget,
            next_id: AtomicU64::new(1),
            heaps: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
            device_usage: AtomicU64::new(0),
            failing_heap_allocations: AtomicU32::new(0),
            failing_copies: AtomicU32::new(0),
            lost: AtomicBool::new(false),
            executed: AtomicU64::new(0),
            validation_errors: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` heap creations fail with out-of-memory.
    pub fn fail_next_heap_allocations(&self, count: u32) {
        self.failing_heap_allocations.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` copy commands fail with a driver error.
    pub fn fail_next_copies(&self, count: u32) {
        self.failing_copies.store(count, Ordering::SeqCst);
    }

    /// Simulate device removal. Every later call fails with `DeviceLost`.
    pub fn lose_device(&self) {
        log::warn!("SoftwareBackend: device lost");
        self.lost.store(true, Ordering::SeqCst);
    }

    /// Messages of every validation error seen so far.
    pub fn validation_errors(&self) -> Vec<String> {
        self.validation_errors.lock().clone()
    }

    /// Number of commands executed.
    pub fn executed_command_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Number of live heaps.
    pub fn heap_count(&self) -> usize {
        self.heaps.lock().len()
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.lock().len()
    }

    /// Tightly packed contents of a texture subresource.
    pub fn read_subresource(&self, texture: u64, subresource: u32) -> Option<Vec<u8>> {
        let textures = self.textures.lock();
        let storage = textures.get(&texture)?;
        storage
            .subresources
            .get(subresource as usize)
            .map(|sub| sub.data.clone())
    }

    /// Tracked state of a texture subresource.
    pub fn subresource_state(&self, texture: u64, subresource: u32) -> Option<ResourceState> {
        let textures = self.textures.lock();
        let storage = textures.get(&texture)?;
        storage
            .subresources
            .get(subresource as usize)
            .map(|sub| sub.state)
    }

    /// Node a texture was created on.
    pub fn texture_node(&self, texture: u64) -> Option<NodeIndex> {
        self.textures.lock().get(&texture).map(|storage| storage.node)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_alive(&self) -> Result<(), BackendError> {
        if self.lost.load(Ordering::SeqCst) {
            Err(BackendError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn report(&self, message: String) {
        log::warn!("SoftwareBackend: {message}");
        self.validation_errors.lock().push(message);
    }

    fn expect_state(&self, texture: u64, sub: &Subresource, index: u32, expected: ResourceState) {
        if sub.state != expected {
            self.report(format!(
                "texture {texture} subresource {index} is in {:?}, expected {:?}",
                sub.state, expected
            ));
        }
    }

    fn transition(
        &self,
        texture: &NativeTexture,
        before: ResourceState,
        after: ResourceState,
        range: SubresourceRange,
    ) -> Result<(), BackendError> {
        let mut textures = self.textures.lock();
        let storage = storage_mut(&mut textures, texture.id)?;
        let indices: Vec<u32> = match range {
            SubresourceRange::All => (0..storage.subresources.len() as u32).collect(),
            SubresourceRange::Single(index) => vec![index],
        };
        for index in indices {
            let sub = storage
                .subresources
                .get_mut(index as usize)
                .ok_or_else(|| BackendError::Driver(format!("subresource {index} out of range")))?;
            if sub.state != before {
                let message = format!(
                    "transition of texture {} subresource {index} from {before:?}, but it is in {:?}",
                    texture.id, sub.state
                );
                log::warn!("SoftwareBackend: {message}");
                self.validation_errors.lock().push(message);
            }
            sub.state = after;
        }
        Ok(())
    }

    fn copy(&self, copy: CopyCommand) -> Result<(), BackendError> {
        let failing = self.failing_copies.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_copies.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::Driver("injected copy failure".to_string()));
        }

        match copy {
            CopyCommand::BufferToTexture {
                src,
                src_box,
                dst,
                dst_subresource,
                dst_origin,
            } => self.copy_buffer_to_texture(&src, src_box, &dst, dst_subresource, dst_origin),
            CopyCommand::TextureToBuffer {
                src,
                src_subresource,
                src_box,
                dst,
                dst_origin,
            } => self.copy_texture_to_buffer(&src, src_subresource, src_box, &dst, dst_origin),
            CopyCommand::TextureRegion {
                src,
                src_subresource,
                src_box,
                dst,
                dst_subresource,
                dst_origin,
            } => {
                let (bytes, region) = {
                    let textures = self.textures.lock();
                    let storage = storage(&textures, src.id)?;
                    let sub = subresource(storage, src_subresource)?;
                    self.expect_state(src.id, sub, src_subresource, ResourceState::CopySource);
                    let region = self.texture_region(storage.format, sub, src_box);
                    (extract(sub, region), region)
                };
                let mut textures = self.textures.lock();
                let storage = storage_mut(&mut textures, dst.id)?;
                let format = storage.format;
                let sub = subresource_mut(storage, dst_subresource)?;
                self.expect_state(dst.id, sub, dst_subresource, ResourceState::CopyDest);
                let target = region.at(format, dst_origin);
                self.insert(sub, target, &bytes, region)
            }
            CopyCommand::Resource { src, dst } => {
                let snapshot: Vec<Vec<u8>> = {
                    let textures = self.textures.lock();
                    let storage = storage(&textures, src.id)?;
                    storage
                        .subresources
                        .iter()
                        .enumerate()
                        .map(|(i, sub)| {
                            self.expect_state(src.id, sub, i as u32, ResourceState::CopySource);
                            sub.data.clone()
                        })
                        .collect()
                };
                let mut textures = self.textures.lock();
                let storage = storage_mut(&mut textures, dst.id)?;
                if storage.subresources.len() != snapshot.len() {
                    self.report(format!(
                        "CopyResource between textures {} and {} with different layouts",
                        src.id, dst.id
                    ));
                    return Ok(());
                }
                for (i, (sub, data)) in storage.subresources.iter_mut().zip(snapshot).enumerate() {
                    self.expect_state(dst.id, sub, i as u32, ResourceState::CopyDest);
                    if sub.data.len() == data.len() {
                        sub.data = data;
                    } else {
                        self.report(format!("CopyResource size mismatch in subresource {i}"));
                    }
                }
                Ok(())
            }
        }
    }

    fn copy_buffer_to_texture(
        &self,
        src: &BufferFootprint,
        src_box: Option<TextureBox>,
        dst: &NativeTexture,
        dst_subresource: u32,
        dst_origin: Origin3d,
    ) -> Result<(), BackendError> {
        let host = host_memory(&src.heap)?;
        let fp = src.footprint;

        let mut textures = self.textures.lock();
        let storage = storage_mut(&mut textures, dst.id)?;
        let format = storage.format;
        let sub = subresource_mut(storage, dst_subresource)?;
        self.expect_state(dst.id, sub, dst_subresource, ResourceState::CopyDest);

        let block_size = sub.block_size;
        let region = match src_box {
            Some(b) => BlockRegion::from_box(format, b),
            None => BlockRegion::from_box(
                format,
                TextureBox::whole(Extent3d::new_3d(fp.width, fp.height, fp.depth)),
            ),
        };
        let (region, fits) = region.clamp(fp.row_size_bytes / block_size, fp.row_count, fp.depth);
        if !fits {
            self.report(format!("buffer region out of footprint bounds: {region:?}"));
        }

        let row_bytes = (region.columns * block_size) as usize;
        let mut bytes = Vec::with_capacity(row_bytes * (region.rows * region.depth) as usize);
        host.with_range(fp.offset, fp.total_bytes, |buffer| {
            for z in region.z..region.z + region.depth {
                for row in region.y..region.y + region.rows {
                    let start = z as usize * fp.depth_pitch() as usize
                        + row as usize * fp.row_pitch as usize
                        + (region.x * block_size) as usize;
                    bytes.extend_from_slice(&buffer[start..start + row_bytes]);
                }
            }
        });

        let target = region.at(format, dst_origin);
        self.insert(sub, target, &bytes, region)
    }

    fn copy_texture_to_buffer(
        &self,
        src: &NativeTexture,
        src_subresource: u32,
        src_box: Option<TextureBox>,
        dst: &BufferFootprint,
        dst_origin: Origin3d,
    ) -> Result<(), BackendError> {
        let host = host_memory(&dst.heap)?;
        let fp = dst.footprint;

        let (bytes, region, block_size, format) = {
            let textures = self.textures.lock();
            let storage = storage(&textures, src.id)?;
            let sub = subresource(storage, src_subresource)?;
            self.expect_state(src.id, sub, src_subresource, ResourceState::CopySource);
            let region = self.texture_region(storage.format, sub, src_box);
            (extract(sub, region), region, sub.block_size, storage.format)
        };

        let target = region.at(format, dst_origin);
        let (target, fits) = target.clamp(fp.row_size_bytes / block_size, fp.row_count, fp.depth);
        if !fits {
            self.report(format!("buffer region out of footprint bounds: {target:?}"));
        }

        let src_row_bytes = (region.columns * block_size) as usize;
        let row_bytes = (target.columns * block_size) as usize;
        host.with_range_mut(fp.offset, fp.total_bytes, |buffer| {
            for z in 0..target.depth {
                for row in 0..target.rows {
                    let from = (z * region.rows + row) as usize * src_row_bytes;
                    let to = (target.z + z) as usize * fp.depth_pitch() as usize
                        + (target.y + row) as usize * fp.row_pitch as usize
                        + (target.x * block_size) as usize;
                    buffer[to..to + row_bytes].copy_from_slice(&bytes[from..from + row_bytes]);
                }
            }
        });
        Ok(())
    }

    /// Source region inside a stored subresource, clamped to its bounds.
    fn texture_region(
        &self,
        format: PixelFormat,
        sub: &Subresource,
        src_box: Option<TextureBox>,
    ) -> BlockRegion {
        let fp = &sub.footprint;
        let columns = fp.row_size_bytes / sub.block_size;
        let region = match src_box {
            Some(b) => BlockRegion::from_box(format, b),
            None => BlockRegion::whole(fp, sub.block_size),
        };
        let (region, fits) = region.clamp(columns, fp.row_count, fp.depth);
        if !fits {
            self.report(format!("texture region out of subresource bounds: {region:?}"));
        }
        region
    }

    /// Write tightly packed `bytes` shaped like `source` at `target`.
    fn insert(
        &self,
        sub: &mut Subresource,
        target: BlockRegion,
        bytes: &[u8],
        source: BlockRegion,
    ) -> Result<(), BackendError> {
        let fp = sub.footprint;
        let plane_block = sub.block_size;
        let columns = fp.row_size_bytes / plane_block;
        let (target, fits) = target.clamp(columns, fp.row_count, fp.depth);
        if !fits {
            self.report(format!("copy destination out of bounds: {target:?}"));
        }

        let src_row_bytes = (source.columns * plane_block) as usize;
        let row_bytes = (target.columns * plane_block) as usize;
        for z in 0..target.depth {
            for row in 0..target.rows {
                let from = (z * source.rows + row) as usize * src_row_bytes;
                let to = (target.z + z) as usize * fp.depth_pitch() as usize
                    + (target.y + row) as usize * fp.row_pitch as usize
                    + (target.x * plane_block) as usize;
                sub.data[to..to + row_bytes].copy_from_slice(&bytes[from..from + row_bytes]);
            }
        }
        Ok(())
    }
}

impl GpuBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "Software"
    }

    fn node_count(&self) -> u32 {
        self.node_count
    }

    fn create_heap(&self, desc: &HeapDescriptor) -> Result<NativeHeap, BackendError> {
        self.check_alive()?;
        let failing = self.failing_heap_allocations.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_heap_allocations.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::OutOfMemory);
        }

        let id = self.next_id();
        let host = desc
            .heap_type
            .is_host_visible()
            .then(|| Arc::new(HostMemory::new(desc.size)));
        if desc.heap_type == HeapType::Default {
            self.device_usage.fetch_add(desc.size, Ordering::Relaxed);
        }
        self.heaps.lock().insert(
            id,
            HeapRecord {
                heap_type: desc.heap_type,
                size: desc.size,
            },
        );

        log::trace!(
            "SoftwareBackend: created {:?} heap {} ({} bytes)",
            desc.heap_type,
            id,
            desc.size
        );
        Ok(NativeHeap {
            id,
            heap_type: desc.heap_type,
            size: desc.size,
            gpu_address: id << 40,
            host,
        })
    }

    fn destroy_heap(&self, heap: &NativeHeap) {
        if let Some(record) = self.heaps.lock().remove(&heap.id)
            && record.heap_type == HeapType::Default
        {
            self.device_usage.fetch_sub(record.size, Ordering::Relaxed);
        }
    }

    fn texture_allocation_info(&self, desc: &NativeTextureDesc) -> AllocationInfo {
        let descriptor = &desc.descriptor;
        let rules = FootprintRules::default();
        let total = footprint::packed_layout(descriptor, 0, descriptor.subresource_count(), 0, rules)
            .map(|layout| layout.total_size)
            .unwrap_or_default();
        let mip0 = footprint::subresource_footprint(descriptor, 0, rules)
            .map(|fp| fp.total_bytes)
            .unwrap_or_default();

        let msaa = descriptor.is_multisampled();
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
        let attachment = desc
            .resource_flags
            .intersects(NativeResourceFlags::ALLOW_RENDER_TARGET | NativeResourceFlags::ALLOW_DEPTH_STENCIL);
        let alignment = if desc.alignment <= small && !attachment && mip0 <= limit {
            small
        } else {
            default.max(desc.alignment)
        };

        let samples = u64::from(descriptor.sample_count.max(1));
        AllocationInfo {
            size: align_up((total * samples).max(1), alignment),
            alignment,
        }
    }

    fn create_texture(
        &self,
        desc: &NativeTextureDesc,
        node: NodeIndex,
        placement: TexturePlacement<'_>,
        initial_state: ResourceState,
    ) -> Result<NativeTexture, BackendError> {
        self.check_alive()?;
        if node >= self.node_count {
            return Err(BackendError::Driver(format!(
                "node {node} out of range ({} nodes)",
                self.node_count
            )));
        }

        if let TexturePlacement::Placed { heap, offset } = placement {
            let info = self.texture_allocation_info(desc);
            let heaps = self.heaps.lock();
            let record = heaps
                .get(&heap.id)
                .ok_or_else(|| BackendError::Driver(format!("heap {} does not exist", heap.id)))?;
            if record.heap_type != HeapType::Default {
                return Err(BackendError::Driver(format!(
                    "textures cannot be placed in {:?} heaps",
                    record.heap_type
                )));
            }
            if offset % info.alignment != 0 || offset + info.size > record.size {
                return Err(BackendError::Driver(format!(
                    "placement at {offset} (+{}) is invalid in heap {} of {} bytes",
                    info.size, heap.id, record.size
                )));
            }
        }

        let descriptor = &desc.descriptor;
        let subresources = (0..descriptor.subresource_count())
            .map(|index| {
                let coord = footprint::decompose_subresource(descriptor, index)
                    .map_err(|err| BackendError::Driver(err.to_string()))?;
                let fp = footprint::subresource_footprint(descriptor, index, TIGHT)
                    .map_err(|err| BackendError::Driver(err.to_string()))?;
                Ok(Subresource {
                    footprint: fp,
                    block_size: descriptor.format.plane_block_size(coord.plane).max(1),
                    data: vec![0u8; fp.total_bytes as usize],
                    state: initial_state,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        let id = self.next_id();
        self.textures.lock().insert(
            id,
            TextureStorage {
                format: descriptor.format,
                node,
                subresources,
            },
        );

        log::trace!(
            "SoftwareBackend: created texture {} on node {} ({:?} {}x{}x{})",
            id,
            node,
            descriptor.format,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(NativeTexture {
            id,
            node,
            desc: desc.clone(),
        })
    }

    fn destroy_texture(&self, texture: &NativeTexture) {
        self.textures.lock().remove(&texture.id);
        log::trace!("SoftwareBackend: destroyed texture {}", texture.id);
    }

    fn copyable_footprints(
        &self,
        desc: &NativeTextureDesc,
        first: u32,
        count: u32,
        base_offset: u64,
    ) -> Result<PackedLayout, BackendError> {
        let mut layout = footprint::packed_layout(
            &desc.descriptor,
            first,
            count,
            base_offset,
            FootprintRules::default(),
        )
        .map_err(|err| BackendError::Driver(err.to_string()))?;
        layout.source = FootprintSource::Queried;
        Ok(layout)
    }

    fn execute(&self, node: NodeIndex, command: Command) -> Result<(), BackendError> {
        self.check_alive()?;
        if node >= self.node_count {
            return Err(BackendError::Driver(format!("node {node} out of range")));
        }
        self.executed.fetch_add(1, Ordering::Relaxed);

        match command {
            Command::Copy(copy) => self.copy(copy),
            Command::Transition {
                texture,
                before,
                after,
                range,
            } => self.transition(&texture, before, after, range),
            Command::Barrier { .. } => Ok(()),
            Command::Custom(work) => work(self),
        }
    }

    fn memory_budget(&self) -> MemoryBudget {
        MemoryBudget {
            budget: self.budget,
            usage: self.device_usage.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SoftwareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBackend")
            .field("node_count", &self.node_count)
            .field("heaps", &self.heap_count())
            .field("textures", &self.texture_count())
            .finish()
    }
}

fn host_memory(heap: &NativeHeap) -> Result<&Arc<HostMemory>, BackendError> {
    heap.host
        .as_ref()
        .ok_or_else(|| BackendError::Driver(format!("heap {} is not host visible", heap.id)))
}

fn storage(textures: &HashMap<u64, TextureStorage>, id: u64) -> Result<&TextureStorage, BackendError> {
    textures
        .get(&id)
        .ok_or_else(|| BackendError::Driver(format!("texture {id} does not exist")))
}

fn storage_mut(
    textures: &mut HashMap<u64, TextureStorage>,
    id: u64,
) -> Result<&mut TextureStorage, BackendError> {
    textures
        .get_mut(&id)
        .ok_or_else(|| BackendError::Driver(format!("texture {id} does not exist")))
}

fn subresource(storage: &TextureStorage, index: u32) -> Result<&Subresource, BackendError> {
    storage
        .subresources
        .get(index as usize)
        .ok_or_else(|| BackendError::Driver(format!("subresource {index} out of range")))
}

fn subresource_mut(storage: &mut TextureStorage, index: u32) -> Result<&mut Subresource, BackendError> {
    storage
        .subresources
        .get_mut(index as usize)
        .ok_or_else(|| BackendError::Driver(format!("subresource {index} out of range")))
}

/// Copy a block region out of a subresource, tightly packed.
fn extract(sub: &Subresource, region: BlockRegion) -> Vec<u8> {
    let fp = &sub.footprint;
    let block = sub.block_size as usize;
    let row_bytes = region.columns as usize * block;
    let mut bytes = Vec::with_capacity(row_bytes * (region.rows * region.depth) as usize);
    for z in region.z..region.z + region.depth {
        for row in region.y..region.y + region.rows {
            let start = z as usize * fp.depth_pitch() as usize
                + row as usize * fp.row_pitch as usize
                + region.x as usize * block;
            bytes.extend_from_slice(&sub.data[start..start + row_bytes]);
        }
    }
    bytes
}

static_assertions::assert_impl_all!(SoftwareBackend: Send, Sync);
