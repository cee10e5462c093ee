//! Texture-to-texture copies.

use std::sync::Arc;

use super::{Texture, TextureResource};
use crate::command::{BufferFootprint, Command, CopyCommand, ScopedTransition};
use crate::device::RhiDevice;
use crate::error::RhiError;
use crate::footprint::{self, SubresourceCoord};
use crate::types::{Extent3d, Origin3d, ResourceState, TextureBox, TextureDescriptor, TextureDimension, align_up};

/// What to copy between two textures.
///
/// Positions and `size` are given at the first mip; every further mip uses
/// them shifted right by its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CopyTextureInfo {
    /// Size of the copied region at the first source mip. `None` copies the
    /// whole source mip.
    pub size: Option<Extent3d>,
    /// Region origin in the source.
    pub source_position: Origin3d,
    /// Region origin in the destination.
    pub dest_position: Origin3d,
    /// First source array layer.
    pub source_layer: u32,
    /// First destination array layer.
    pub dest_layer: u32,
    /// Number of array layers.
    pub num_layers: u32,
    /// First source mip.
    pub source_mip: u32,
    /// First destination mip.
    pub dest_mip: u32,
    /// Number of mips.
    pub num_mips: u32,
}

impl Default for CopyTextureInfo {
    fn default() -> Self {
        Self {
            size: None,
            source_position: Origin3d::zero(),
            dest_position: Origin3d::zero(),
            source_layer: 0,
            dest_layer: 0,
            num_layers: 1,
            source_mip: 0,
            dest_mip: 0,
            num_mips: 1,
        }
    }
}

impl CopyTextureInfo {
    /// Copy every mip and layer of `desc`.
    pub fn whole(desc: &TextureDescriptor) -> Self {
        Self {
            num_layers: desc.layer_count(),
            num_mips: desc.mip_level_count,
            ..Default::default()
        }
    }

    /// Copy one mip of layer 0 into one mip.
    pub fn mip(source_mip: u32, dest_mip: u32) -> Self {
        Self {
            source_mip,
            dest_mip,
            ..Default::default()
        }
    }

    /// Set the copied region.
    pub fn with_region(mut self, source: Origin3d, dest: Origin3d, size: Extent3d) -> Self {
        self.source_position = source;
        self.dest_position = dest;
        self.size = Some(size);
        self
    }

    /// Set the layer range.
    pub fn with_layers(mut self, source_layer: u32, dest_layer: u32, count: u32) -> Self {
        self.source_layer = source_layer;
        self.dest_layer = dest_layer;
        self.num_layers = count;
        self
    }
}

/// Extra behaviour of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyTextureOptions {
    /// Leave the source in the copy-source state and the destination in the
    /// copy-destination state instead of restoring their previous states.
    pub leave_in_copy_state: bool,
}

/// One subresource-to-subresource copy.
#[derive(Debug, Clone, Copy)]
struct CopyRegion {
    src_subresource: u32,
    dst_subresource: u32,
    src_box: TextureBox,
    dst_origin: Origin3d,
}

impl RhiDevice {
    /// Copy between two textures on every node.
    ///
    /// Takes the whole-resource fast path when the copy covers every
    /// subresource of two layout-compatible textures. Otherwise each
    /// (layer, mip) pair is copied as a region. Copies into a readback
    /// texture are written into its linear memory.
    pub fn copy_texture(
        &self,
        src: &Texture,
        dst: &Texture,
        info: &CopyTextureInfo,
        options: CopyTextureOptions,
    ) -> Result<(), RhiError> {
        crate::profile_scope!("RhiDevice::copy_texture");

        if std::ptr::eq(src, dst) {
            return Err(RhiError::invalid_parameter(
                "source and destination of a copy must be different textures",
            ));
        }
        if src.descriptor.is_cpu_readback() {
            return Err(RhiError::invalid_state(format!(
                "'{}' is a readback texture and cannot be a copy source",
                src.name
            )));
        }
        if !src.format().is_copy_compatible(dst.format()) {
            return Err(RhiError::invalid_parameter(format!(
                "{:?} and {:?} are not copy compatible",
                src.format(),
                dst.format()
            )));
        }
        if src.peers.len() != dst.peers.len() {
            return Err(RhiError::invalid_parameter(
                "textures live on different numbers of nodes",
            ));
        }
        if info.num_mips == 0 || info.num_layers == 0 {
            return Ok(());
        }

        if self.is_whole_resource_copy(src, dst, info) {
            return self.record_whole_copy(src, dst, options);
        }

        let regions = self.plan_regions(src, dst, info)?;
        if regions.is_empty() {
            return Ok(());
        }

        for (src_peer, dst_peer) in src.peers.iter().zip(dst.peers.iter()) {
            let src_resource = src_peer.resource();
            let dst_resource = dst_peer.resource();
            self.record_region_copies(&src_resource, &dst_resource, &regions, options)?;
        }

        log::trace!(
            "RhiDevice: copy '{}' -> '{}' ({} regions)",
            src.name,
            dst.name,
            regions.len()
        );
        Ok(())
    }

    fn is_whole_resource_copy(&self, src: &Texture, dst: &Texture, info: &CopyTextureInfo) -> bool {
        let desc = &src.descriptor;
        !dst.descriptor.is_cpu_readback()
            && desc.is_layout_compatible(&dst.descriptor)
            && info.size.is_none_or(|size| size == desc.size)
            && info.source_position == Origin3d::zero()
            && info.dest_position == Origin3d::zero()
            && info.source_layer == 0
            && info.dest_layer == 0
            && info.source_mip == 0
            && info.dest_mip == 0
            && info.num_mips == desc.mip_level_count
            && info.num_layers == desc.layer_count()
    }

    fn record_whole_copy(
        &self,
        src: &Texture,
        dst: &Texture,
        options: CopyTextureOptions,
    ) -> Result<(), RhiError> {
        let queue = self.queue();
        for (src_peer, dst_peer) in src.peers.iter().zip(dst.peers.iter()) {
            let src_resource = src_peer.resource();
            let dst_resource = dst_peer.resource();
            let src_guard = ScopedTransition::new(queue, &src_resource, ResourceState::CopySource)?;
            let dst_guard = ScopedTransition::new(queue, &dst_resource, ResourceState::CopyDest)?;
            queue.record(
                dst_resource.node(),
                Command::Copy(CopyCommand::Resource {
                    src: Arc::clone(src_resource.native()?),
                    dst: Arc::clone(dst_resource.native()?),
                }),
            );
            if options.leave_in_copy_state {
                src_guard.keep();
                dst_guard.keep();
            }
        }
        log::trace!("RhiDevice: copy resource '{}' -> '{}'", src.name, dst.name);
        Ok(())
    }

    /// Validate the copy and split it into per-subresource regions. Nothing is
    /// recorded if any region fails validation.
    fn plan_regions(
        &self,
        src: &Texture,
        dst: &Texture,
        info: &CopyTextureInfo,
    ) -> Result<Vec<CopyRegion>, RhiError> {
        let src_desc = &src.descriptor;
        let dst_desc = &dst.descriptor;

        let out_of_range = |start: u32, count: u32, limit: u32| {
            start.checked_add(count).is_none_or(|end| end > limit)
        };
        if out_of_range(info.source_mip, info.num_mips, src_desc.mip_level_count)
            || out_of_range(info.dest_mip, info.num_mips, dst_desc.mip_level_count)
        {
            return Err(RhiError::invalid_parameter(format!(
                "mip range {}+{} / {}+{} out of range",
                info.source_mip, info.num_mips, info.dest_mip, info.num_mips
            )));
        }
        if out_of_range(info.source_layer, info.num_layers, src_desc.layer_count())
            || out_of_range(info.dest_layer, info.num_layers, dst_desc.layer_count())
        {
            return Err(RhiError::invalid_parameter(format!(
                "layer range {}+{} / {}+{} out of range",
                info.source_layer, info.num_layers, info.dest_layer, info.num_layers
            )));
        }

        let format = src_desc.format;
        let (bw, bh) = format.block_dimensions();
        let base_size = info
            .size
            .unwrap_or_else(|| footprint::mip_extent(src_desc, info.source_mip));

        // Depth-stencil formats copy every plane of each subresource.
        let planes = src_desc.plane_count().min(dst_desc.plane_count());
        let mut regions =
            Vec::with_capacity(info.num_layers as usize * info.num_mips as usize * planes as usize);
        for layer in 0..info.num_layers {
            for m in 0..info.num_mips {
                let src_mip = info.source_mip + m;
                let dst_mip = info.dest_mip + m;
                let src_bounds = footprint::mip_extent(src_desc, src_mip);
                let dst_bounds = footprint::mip_extent(dst_desc, dst_mip);

                let shift = |v: u32| v >> m;
                let src_origin = Origin3d::new(
                    shift(info.source_position.x),
                    shift(info.source_position.y),
                    depth_shift(src_desc, info.source_position.z, m),
                );
                let dst_origin = Origin3d::new(
                    shift(info.dest_position.x),
                    shift(info.dest_position.y),
                    depth_shift(dst_desc, info.dest_position.z, m),
                );

                // Extents round up to whole blocks, clamped to the source edge.
                let clamp_axis = |size: u32, block: u32, origin: u32, bound: u32| {
                    let size = shift(size).max(1);
                    (align_up(u64::from(size), u64::from(block)) as u32)
                        .min(bound.saturating_sub(origin))
                };
                let extent = Extent3d::new_3d(
                    clamp_axis(base_size.width, bw, src_origin.x, src_bounds.width),
                    clamp_axis(base_size.height, bh, src_origin.y, src_bounds.height),
                    match src_desc.dimension {
                        TextureDimension::D3 => depth_shift(src_desc, base_size.depth, m)
                            .max(1)
                            .min(src_bounds.depth.saturating_sub(src_origin.z)),
                        _ => 1,
                    },
                );
                if extent.is_empty() {
                    let err = RhiError::invalid_parameter(format!(
                        "copy origin {src_origin:?} lies outside source mip {src_mip}"
                    ));
                    if self.config().validation {
                        return Err(err);
                    }
                    log::warn!("RhiDevice: skipping copy region: {err}");
                    continue;
                }

                let src_box = TextureBox::new_3d(src_origin, extent);
                let checked = validate_region(src_box, src_bounds, (bw, bh), "source").and_then(
                    |()| {
                        validate_region(
                            TextureBox::new_3d(dst_origin, extent),
                            dst_bounds,
                            (bw, bh),
                            "destination",
                        )
                    },
                );
                if let Err(err) = checked {
                    if self.config().validation {
                        return Err(err);
                    }
                    log::warn!("RhiDevice: unvalidated copy region: {err}");
                }

                for plane in 0..planes {
                    let src_subresource = footprint::subresource_index(
                        src_desc,
                        SubresourceCoord {
                            mip: src_mip,
                            layer: info.source_layer + layer,
                            plane,
                        },
                    )?;
                    let dst_subresource = footprint::subresource_index(
                        dst_desc,
                        SubresourceCoord {
                            mip: dst_mip,
                            layer: info.dest_layer + layer,
                            plane,
                        },
                    )?;
                    regions.push(CopyRegion {
                        src_subresource,
                        dst_subresource,
                        src_box,
                        dst_origin,
                    });
                }
            }
        }
        Ok(regions)
    }

    fn record_region_copies(
        &self,
        src: &TextureResource,
        dst: &TextureResource,
        regions: &[CopyRegion],
        options: CopyTextureOptions,
    ) -> Result<(), RhiError> {
        let queue = self.queue();
        let src_guard = ScopedTransition::new(queue, src, ResourceState::CopySource)?;
        let src_native = Arc::clone(src.native()?);

        match dst.readback_layout() {
            Some(layout) => {
                let location = dst
                    .location()
                    .ok_or_else(|| RhiError::invalid_state("readback texture has no memory"))?;
                for region in regions {
                    let mut placed = *layout.footprint(region.dst_subresource).ok_or_else(|| {
                        RhiError::invalid_parameter(format!(
                            "subresource {} outside readback layout",
                            region.dst_subresource
                        ))
                    })?;
                    placed.offset += location.offset();
                    queue.record(
                        src.node(),
                        Command::Copy(CopyCommand::TextureToBuffer {
                            src: Arc::clone(&src_native),
                            src_subresource: region.src_subresource,
                            src_box: Some(region.src_box),
                            dst: BufferFootprint {
                                heap: Arc::clone(location.heap()),
                                footprint: placed,
                            },
                            dst_origin: region.dst_origin,
                        }),
                    );
                }
            }
            None => {
                let dst_guard = ScopedTransition::new(queue, dst, ResourceState::CopyDest)?;
                let dst_native = Arc::clone(dst.native()?);
                for region in regions {
                    queue.record(
                        dst.node(),
                        Command::Copy(CopyCommand::TextureRegion {
                            src: Arc::clone(&src_native),
                            src_subresource: region.src_subresource,
                            src_box: Some(region.src_box),
                            dst: Arc::clone(&dst_native),
                            dst_subresource: region.dst_subresource,
                            dst_origin: region.dst_origin,
                        }),
                    );
                }
                if options.leave_in_copy_state {
                    dst_guard.keep();
                }
            }
        }

        if options.leave_in_copy_state {
            src_guard.keep();
        }
        Ok(())
    }
}

fn depth_shift(desc: &TextureDescriptor, value: u32, mip: u32) -> u32 {
    match desc.dimension {
        TextureDimension::D3 => value >> mip,
        _ => value,
    }
}

/// Bounds and block-alignment check of a copy box.
fn validate_region(
    region: TextureBox,
    bounds: Extent3d,
    (bw, bh): (u32, u32),
    side: &str,
) -> Result<(), RhiError> {
    if !region.fits_within(bounds) {
        return Err(RhiError::invalid_parameter(format!(
            "{side} region {region:?} exceeds subresource of size {bounds:?}"
        )));
    }
    let aligned = region.x % bw == 0
        && region.y % bh == 0
        && (region.width % bw == 0 || region.x + region.width == bounds.width)
        && (region.height % bh == 0 || region.y + region.height == bounds.height);
    if !aligned {
        return Err(RhiError::invalid_parameter(format!(
            "{side} region {region:?} is not aligned to {bw}x{bh} blocks"
        )));
    }
    Ok(())
}
