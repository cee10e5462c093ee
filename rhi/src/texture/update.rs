//! Region updates from CPU memory.

use std::sync::Arc;

use super::{LockMode, Texture};
use crate::command::{BufferFootprint, Command, CopyCommand, ScopedTransition};
use crate::config::ExecutionMode;
use crate::deferred::DeferredRelease;
use crate::error::RhiError;
use crate::footprint::{self, SubresourceCoord};
use crate::types::{Origin3d, ResourceState, TextureBox};

/// Destination of a region update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UpdateTextureRegion {
    /// Mip level.
    pub mip: u32,
    /// Array layer (cube faces count individually).
    pub array_layer: u32,
    /// Texels to overwrite.
    pub dst_box: TextureBox,
}

impl UpdateTextureRegion {
    /// A 2D region of mip `mip` in layer 0.
    pub fn new_2d(mip: u32, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            mip,
            array_layer: 0,
            dst_box: TextureBox::new_2d(x, y, width, height),
        }
    }

    /// Set the array layer.
    pub fn with_array_layer(mut self, layer: u32) -> Self {
        self.array_layer = layer;
        self
    }
}

/// Layout of the caller's source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLayout {
    /// Bytes between rows of blocks.
    pub row_pitch: u32,
    /// Bytes between depth slices.
    pub depth_pitch: u64,
}

impl SourceLayout {
    /// Layout of `rows` rows of `row_pitch` bytes per slice.
    pub fn new(row_pitch: u32, rows: u32) -> Self {
        Self {
            row_pitch,
            depth_pitch: u64::from(row_pitch) * u64::from(rows),
        }
    }
}

impl Texture {
    /// Overwrite a box of one subresource with CPU data.
    ///
    /// The box origin must be block aligned, and its size a multiple of the
    /// block size unless it reaches the subresource edge. An empty box is a
    /// no-op. The data is staged and uploaded to every peer; later commands
    /// observe the new contents.
    pub fn update_region(
        &self,
        region: &UpdateTextureRegion,
        layout: SourceLayout,
        data: &[u8],
    ) -> Result<(), RhiError> {
        crate::profile_scope!("Texture::update_region");

        if self.descriptor.is_cpu_readback() {
            return Err(RhiError::invalid_state(format!(
                "'{}' is a readback texture and cannot be updated",
                self.name
            )));
        }
        if self.descriptor.is_multisampled() {
            return Err(RhiError::invalid_state(format!(
                "'{}' is multisampled and cannot be updated",
                self.name
            )));
        }

        let dst = region.dst_box;
        if dst.is_empty() {
            return Ok(());
        }

        let subresource = footprint::subresource_index(
            &self.descriptor,
            SubresourceCoord {
                mip: region.mip,
                layer: region.array_layer,
                plane: 0,
            },
        )?;
        let mip_size = footprint::mip_extent(&self.descriptor, region.mip);
        if !dst.fits_within(mip_size) {
            return Err(RhiError::invalid_parameter(format!(
                "update box {dst:?} outside mip {} of size {mip_size:?}",
                region.mip
            )));
        }

        let format = self.descriptor.format;
        let (bw, bh) = format.block_dimensions();
        let aligned = dst.x % bw == 0
            && dst.y % bh == 0
            && (dst.width % bw == 0 || dst.x + dst.width == mip_size.width)
            && (dst.height % bh == 0 || dst.y + dst.height == mip_size.height);
        if !aligned {
            return Err(RhiError::invalid_parameter(format!(
                "update box {dst:?} is not aligned to {bw}x{bh} blocks"
            )));
        }

        let (columns, rows) = footprint::block_counts(format, dst.width, dst.height);
        let row_bytes = u64::from(columns * format.block_size());
        if u64::from(layout.row_pitch) < row_bytes {
            return Err(RhiError::invalid_parameter(format!(
                "source row pitch {} is smaller than a row ({row_bytes} bytes)",
                layout.row_pitch
            )));
        }
        let depth = u64::from(dst.depth.max(1));
        let needed = (depth - 1) * layout.depth_pitch
            + u64::from(rows - 1) * u64::from(layout.row_pitch)
            + row_bytes;
        if (data.len() as u64) < needed {
            return Err(RhiError::invalid_parameter(format!(
                "{} bytes supplied, update needs {needed}",
                data.len()
            )));
        }

        let whole = dst == TextureBox::whole(mip_size);
        if whole
            && self.device.config().execution_mode == ExecutionMode::Immediate
            && !self.is_locked(subresource)
        {
            return self.update_through_lock(subresource, layout, data);
        }

        let rules = self.device.config().footprint_rules();
        let staged = footprint::region_footprint(format, 0, dst.extent(), rules);
        let staging = self.device.staging().acquire_upload(staged.total_bytes)?;
        staging.mapping().with_bytes_mut(|bytes| {
            copy_rows(
                data,
                layout,
                bytes,
                SourceLayout {
                    row_pitch: staged.row_pitch,
                    depth_pitch: staged.depth_pitch(),
                },
                row_bytes as usize,
                rows,
                dst.depth.max(1),
            )
        });

        let mut placed = staged;
        placed.offset = staging.location().offset();
        let src = BufferFootprint {
            heap: Arc::clone(staging.location().heap()),
            footprint: placed,
        };
        let recorded = self.peers.iter().try_for_each(|peer| {
            self.record_upload(&peer.resource(), subresource, src.clone(), None, dst.origin())
        });

        let retire_at = self.device.queue().pending_fence_value();
        self.device
            .defer_release_at(retire_at, DeferredRelease::Allocation(staging.into_location()));
        recorded?;

        log::trace!(
            "Texture: updated '{}' subresource {} box {:?}",
            self.name,
            subresource,
            dst
        );
        Ok(())
    }

    /// Upload tightly packed data for every subresource to every peer.
    ///
    /// The data is repacked into a staging buffer laid out by the backend's
    /// copyable footprints. Each peer is moved to the copy-destination state
    /// once, receives one copy per subresource and is left there; the caller
    /// records the transition to the initial state.
    pub(crate) fn upload_initial_data(&self, data: &[u8]) -> Result<(), RhiError> {
        crate::profile_scope!("Texture::upload_initial_data");

        let needed = footprint::tightly_packed_size(&self.descriptor);
        if (data.len() as u64) < needed {
            return Err(RhiError::invalid_parameter(format!(
                "{} bytes of initial data supplied, '{}' needs {needed}",
                data.len(),
                self.name
            )));
        }

        let first = self.first_resource()?;
        let count = self.descriptor.subresource_count();
        let layout = self
            .device
            .backend()
            .copyable_footprints(&first.native()?.desc, 0, count, 0)
            .map_err(|err| RhiError::AllocationFailed {
                heap_type: crate::memory::HeapType::Upload,
                size: needed,
                diagnostic: format!("footprint query for '{}' failed: {err}", self.name),
            })?;

        let staging = self.device.staging().acquire_upload(layout.total_size)?;
        staging.mapping().with_bytes_mut(|bytes| {
            let mut cursor = 0usize;
            for fp in &layout.footprints {
                let row_bytes = fp.row_size_bytes as usize;
                let src_layout = SourceLayout::new(fp.row_size_bytes, fp.row_count);
                let start = fp.offset as usize;
                copy_rows(
                    &data[cursor..],
                    src_layout,
                    &mut bytes[start..],
                    SourceLayout {
                        row_pitch: fp.row_pitch,
                        depth_pitch: fp.depth_pitch(),
                    },
                    row_bytes,
                    fp.row_count,
                    fp.depth,
                );
                cursor += row_bytes * (fp.row_count * fp.depth) as usize;
            }
        });

        let queue = self.device.queue();
        let base = staging.location().offset();
        let recorded = self.peers.iter().try_for_each(|peer| {
            let resource = peer.resource();
            let dst = Arc::clone(resource.native()?);
            let guard = ScopedTransition::new(queue, &resource, ResourceState::CopyDest)?;
            for (subresource, fp) in (0..count).zip(&layout.footprints) {
                let mut placed = *fp;
                placed.offset += base;
                queue.record(
                    resource.node(),
                    Command::Copy(CopyCommand::BufferToTexture {
                        src: BufferFootprint {
                            heap: Arc::clone(staging.location().heap()),
                            footprint: placed,
                        },
                        src_box: None,
                        dst: Arc::clone(&dst),
                        dst_subresource: subresource,
                        dst_origin: Origin3d::zero(),
                    }),
                );
            }
            guard.keep();
            Ok::<(), RhiError>(())
        });

        let retire_at = queue.pending_fence_value();
        self.device
            .defer_release_at(retire_at, DeferredRelease::Allocation(staging.into_location()));
        recorded?;

        log::trace!(
            "Texture: staged {} bytes of initial data for '{}' ({} subresources)",
            layout.total_size,
            self.name,
            count
        );
        Ok(())
    }

    fn update_through_lock(
        &self,
        subresource: u32,
        layout: SourceLayout,
        data: &[u8],
    ) -> Result<(), RhiError> {
        let locked = self.lock(subresource, LockMode::WriteOnly)?;
        let fp = *locked.footprint();
        locked.mapping().with_bytes_mut(|bytes| {
            copy_rows(
                data,
                layout,
                bytes,
                SourceLayout {
                    row_pitch: fp.row_pitch,
                    depth_pitch: fp.depth_pitch(),
                },
                fp.row_size_bytes as usize,
                fp.row_count,
                fp.depth,
            )
        });
        self.unlock(subresource)
    }
}

/// Copy `rows x depth` rows of `row_bytes` between two pitched layouts.
fn copy_rows(
    src: &[u8],
    src_layout: SourceLayout,
    dst: &mut [u8],
    dst_layout: SourceLayout,
    row_bytes: usize,
    rows: u32,
    depth: u32,
) {
    for z in 0..depth as usize {
        for row in 0..rows as usize {
            let from = z * src_layout.depth_pitch as usize + row * src_layout.row_pitch as usize;
            let to = z * dst_layout.depth_pitch as usize + row * dst_layout.row_pitch as usize;
            dst[to..to + row_bytes].copy_from_slice(&src[from..from + row_bytes]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_rows_repitches() {
        let src = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = [0u8; 6];
        copy_rows(
            &src,
            SourceLayout::new(4, 2),
            &mut dst,
            SourceLayout::new(3, 2),
            2,
            2,
            1,
        );
        assert_eq!(dst, [1, 2, 0, 3, 4, 0]);
    }
}
