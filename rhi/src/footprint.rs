//! Subresource footprint calculator.
//!
//! A *footprint* is the byte layout of one subresource when it is viewed as
//! linear memory: row pitch, row count, depth and byte offset. Footprints are
//! used for every CPU <-> GPU texture transfer (staging uploads, lock
//! buffers, readback textures).
//!
//! Two kinds of layouts exist and callers must not assume they agree:
//!
//! - **Computed** layouts are produced here, for fresh staging buffers whose
//!   packing this crate controls ([`packed_layout`]).
//! - **Queried** layouts come from the backend for an existing placed resource
//!   ([`GpuBackend::copyable_footprints`](crate::backend::GpuBackend::copyable_footprints))
//!   and are authoritative for that resource.
//!
//! Every function here is pure and can be called from any thread.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::footprint::{FootprintRules, subresource_footprint};
//! use redlilium_rhi::{PixelFormat, TextureDescriptor};
//!
//! let desc = TextureDescriptor::new_2d(100, 10, PixelFormat::Rgba8Unorm);
//! let fp = subresource_footprint(&desc, 0, FootprintRules::default()).unwrap();
//! assert_eq!(fp.row_pitch, 512); // 400 bytes rounded up to 256
//! assert_eq!(fp.total_bytes, 512 * 10);
//! ```

use crate::error::RhiError;
use crate::types::{Extent3d, PixelFormat, TextureDescriptor, TextureDimension, align_up};

/// Row pitch alignment of linear texture data, in bytes.
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;

/// Alignment of each subresource inside a linear buffer, in bytes.
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

/// Alignment rules a layout is computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FootprintRules {
    /// Row pitch alignment in bytes.
    pub pitch_alignment: u32,
    /// Subresource placement alignment in bytes.
    pub placement_alignment: u64,
}

impl Default for FootprintRules {
    fn default() -> Self {
        Self {
            pitch_alignment: TEXTURE_DATA_PITCH_ALIGNMENT,
            placement_alignment: TEXTURE_DATA_PLACEMENT_ALIGNMENT,
        }
    }
}

/// Where a layout came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FootprintSource {
    /// Packed by this crate for a buffer it allocated.
    Computed,
    /// Reported by the backend for an existing resource.
    Queried,
}

/// The `(mip, layer, plane)` coordinates of a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubresourceCoord {
    /// Mip level.
    pub mip: u32,
    /// Array layer (cube faces count individually).
    pub layer: u32,
    /// Format plane.
    pub plane: u32,
}

/// Byte layout of one subresource in linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubresourceFootprint {
    /// Byte offset of the subresource inside the linear buffer.
    pub offset: u64,
    /// Width of the subresource in texels.
    pub width: u32,
    /// Height of the subresource in texels.
    pub height: u32,
    /// Depth of the subresource in texels.
    pub depth: u32,
    /// Distance between rows of blocks, in bytes.
    pub row_pitch: u32,
    /// Number of rows of blocks.
    pub row_count: u32,
    /// Bytes of meaningful data per row of blocks.
    pub row_size_bytes: u32,
    /// `row_pitch * row_count * depth`.
    pub total_bytes: u64,
}

impl SubresourceFootprint {
    /// Distance between depth slices, in bytes.
    pub fn depth_pitch(&self) -> u64 {
        u64::from(self.row_pitch) * u64::from(self.row_count)
    }

    /// Byte offset one past the end of the subresource.
    pub fn end(&self) -> u64 {
        self.offset + self.total_bytes
    }
}

/// Footprints of a contiguous run of subresources packed into one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedLayout {
    /// Linear index of the first subresource.
    pub first_subresource: u32,
    /// Per-subresource footprints, offsets relative to the buffer start.
    pub footprints: Vec<SubresourceFootprint>,
    /// Bytes from `base_offset` to the end of the last subresource.
    pub total_size: u64,
    /// Which layout kind this is.
    pub source: FootprintSource,
}

impl PackedLayout {
    /// Footprint of a subresource covered by this layout.
    pub fn footprint(&self, subresource: u32) -> Option<&SubresourceFootprint> {
        subresource
            .checked_sub(self.first_subresource)
            .and_then(|i| self.footprints.get(i as usize))
    }
}

/// Linear subresource index: `mip + layer * mips + plane * mips * layers`.
pub fn subresource_index(desc: &TextureDescriptor, coord: SubresourceCoord) -> Result<u32, RhiError> {
    let mips = desc.mip_level_count;
    let layers = desc.layer_count();
    if coord.mip >= mips || coord.layer >= layers || coord.plane >= desc.plane_count() {
        return Err(RhiError::invalid_parameter(format!(
            "subresource {coord:?} out of range ({mips} mips, {layers} layers, {} planes)",
            desc.plane_count()
        )));
    }
    Ok(coord.mip + coord.layer * mips + coord.plane * mips * layers)
}

/// Inverse of [`subresource_index`].
pub fn decompose_subresource(
    desc: &TextureDescriptor,
    subresource: u32,
) -> Result<SubresourceCoord, RhiError> {
    check_subresource(desc, subresource)?;
    let mips = desc.mip_level_count;
    let layers = desc.layer_count();
    Ok(SubresourceCoord {
        mip: subresource % mips,
        layer: (subresource / mips) % layers,
        plane: subresource / (mips * layers),
    })
}

/// Fails unless `subresource` is a valid index for `desc`.
pub fn check_subresource(desc: &TextureDescriptor, subresource: u32) -> Result<(), RhiError> {
    let count = desc.subresource_count();
    if subresource >= count {
        return Err(RhiError::invalid_parameter(format!(
            "subresource {subresource} out of range (texture has {count})"
        )));
    }
    Ok(())
}

/// Size of a mip level in texels, never below 1 on any axis.
///
/// Depth only shrinks for 3D textures.
pub fn mip_extent(desc: &TextureDescriptor, mip: u32) -> Extent3d {
    let shrink = |v: u32| (v >> mip.min(31)).max(1);
    let depth = match desc.dimension {
        TextureDimension::D3 => shrink(desc.size.depth),
        _ => 1,
    };
    Extent3d::new_3d(shrink(desc.size.width), shrink(desc.size.height), depth)
}

/// Number of block columns and rows covering `width x height` texels.
pub fn block_counts(format: PixelFormat, width: u32, height: u32) -> (u32, u32) {
    let (bw, bh) = format.block_dimensions();
    (width.div_ceil(bw).max(1), height.div_ceil(bh).max(1))
}

/// Footprint of a region of `extent` texels on `plane` with the given rules.
pub fn region_footprint(
    format: PixelFormat,
    plane: u32,
    extent: Extent3d,
    rules: FootprintRules,
) -> SubresourceFootprint {
    let (columns, rows) = block_counts(format, extent.width, extent.height);
    let row_size_bytes = columns * format.plane_block_size(plane);
    let row_pitch = align_up(u64::from(row_size_bytes), u64::from(rules.pitch_alignment)) as u32;
    let depth = extent.depth.max(1);
    SubresourceFootprint {
        offset: 0,
        width: extent.width,
        height: extent.height,
        depth,
        row_pitch,
        row_count: rows,
        row_size_bytes,
        total_bytes: u64::from(row_pitch) * u64::from(rows) * u64::from(depth),
    }
}

/// Unplaced footprint (offset 0) of a single subresource.
pub fn subresource_footprint(
    desc: &TextureDescriptor,
    subresource: u32,
    rules: FootprintRules,
) -> Result<SubresourceFootprint, RhiError> {
    let coord = decompose_subresource(desc, subresource)?;
    Ok(region_footprint(
        desc.format,
        coord.plane,
        mip_extent(desc, coord.mip),
        rules,
    ))
}

/// Packed layout of `count` subresources starting at `first`, for a fresh
/// linear buffer whose first byte sits at `base_offset`.
///
/// Each subresource starts at the next placement-aligned offset after the
/// previous one.
pub fn packed_layout(
    desc: &TextureDescriptor,
    first: u32,
    count: u32,
    base_offset: u64,
    rules: FootprintRules,
) -> Result<PackedLayout, RhiError> {
    if count == 0 {
        return Err(RhiError::invalid_parameter("empty subresource range"));
    }
    check_subresource(desc, first + count - 1)?;

    let mut footprints = Vec::with_capacity(count as usize);
    let mut cursor = align_up(base_offset, rules.placement_alignment);
    for subresource in first..first + count {
        let mut footprint = subresource_footprint(desc, subresource, rules)?;
        footprint.offset = cursor;
        cursor = align_up(footprint.end(), rules.placement_alignment);
        footprints.push(footprint);
    }

    let total_size = footprints
        .last()
        .map(|f| f.end() - base_offset)
        .unwrap_or_default();

    Ok(PackedLayout {
        first_subresource: first,
        footprints,
        total_size,
        source: FootprintSource::Computed,
    })
}

/// Bytes needed to hold every subresource of `desc` tightly packed: no row
/// padding, no placement padding. This is the layout callers supply initial
/// data in.
pub fn tightly_packed_size(desc: &TextureDescriptor) -> u64 {
    (0..desc.subresource_count())
        .map(|subresource| {
            let mips = desc.mip_level_count;
            let layers = desc.layer_count();
            let mip = subresource % mips;
            let plane = subresource / (mips * layers);
            let extent = mip_extent(desc, mip);
            let (columns, rows) = block_counts(desc.format, extent.width, extent.height);
            u64::from(columns * desc.format.plane_block_size(plane))
                * u64::from(rows)
                * u64::from(extent.depth)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFlags;

    #[test]
    fn test_subresource_index_roundtrip() {
        let desc = TextureDescriptor::new_2d(64, 64, PixelFormat::Depth24PlusStencil8)
            .with_mip_levels(4)
            .with_array_size(3)
            .with_flags(TextureFlags::DEPTH_STENCIL);
        let coord = SubresourceCoord {
            mip: 2,
            layer: 1,
            plane: 1,
        };
        let index = subresource_index(&desc, coord).unwrap();
        assert_eq!(index, 2 + 4 + 12);
        assert_eq!(decompose_subresource(&desc, index).unwrap(), coord);
        assert!(decompose_subresource(&desc, desc.subresource_count()).is_err());
    }

    #[test]
    fn test_pitch_alignment_for_odd_widths() {
        let rules = FootprintRules::default();
        for width in [1u32, 3, 63, 64, 65, 100, 257, 1000] {
            for format in [PixelFormat::R8Unorm, PixelFormat::Rgba8Unorm, PixelFormat::Rgba32Float] {
                let desc = TextureDescriptor::new_2d(width, 7, format);
                let fp = subresource_footprint(&desc, 0, rules).unwrap();
                assert!(fp.row_pitch >= width * format.block_size());
                assert_eq!(fp.row_pitch % TEXTURE_DATA_PITCH_ALIGNMENT, 0);
                assert_eq!(fp.total_bytes, u64::from(fp.row_pitch) * 7);
            }
        }
    }

    #[test]
    fn test_block_compressed_mip_tail_never_below_one_block() {
        let desc = TextureDescriptor::new_2d(256, 256, PixelFormat::Bc1RgbaUnorm).with_mip_levels(9);
        let rules = FootprintRules::default();

        let fp0 = subresource_footprint(&desc, 0, rules).unwrap();
        assert_eq!(fp0.row_count, 64);
        assert_eq!(fp0.row_size_bytes, 64 * 8);

        // Mips 7 and 8 are 2x2 and 1x1 texels: still one 4x4 block.
        for mip in [6, 7, 8] {
            let fp = subresource_footprint(&desc, mip, rules).unwrap();
            assert_eq!(fp.row_count, 1, "mip {mip}");
            assert_eq!(fp.row_size_bytes, 8, "mip {mip}");
            assert_eq!(fp.row_pitch, 256);
        }
    }

    #[test]
    fn test_volume_depth_shrinks() {
        let desc = TextureDescriptor::new_3d(16, 16, 16, PixelFormat::R32Float).with_mip_levels(5);
        assert_eq!(mip_extent(&desc, 2), Extent3d::new_3d(4, 4, 4));
        assert_eq!(mip_extent(&desc, 4), Extent3d::new_3d(1, 1, 1));

        let fp = subresource_footprint(&desc, 0, FootprintRules::default()).unwrap();
        assert_eq!(fp.depth, 16);
        assert_eq!(fp.total_bytes, 256 * 16 * 16);
        assert_eq!(fp.depth_pitch(), 256 * 16);
    }

    #[test]
    fn test_array_depth_stays_one() {
        let desc = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8Unorm).with_array_size(6);
        assert_eq!(mip_extent(&desc, 0).depth, 1);
    }

    #[test]
    fn test_packed_layout_offsets_are_placement_aligned() {
        let desc = TextureDescriptor::new_2d(100, 30, PixelFormat::Rgba8Unorm).with_mip_levels(4);
        let layout = packed_layout(&desc, 0, 4, 0, FootprintRules::default()).unwrap();
        assert_eq!(layout.footprints.len(), 4);
        assert_eq!(layout.footprints[0].offset, 0);
        for pair in layout.footprints.windows(2) {
            assert_eq!(pair[1].offset % TEXTURE_DATA_PLACEMENT_ALIGNMENT, 0);
            assert!(pair[1].offset >= pair[0].end());
        }
        assert_eq!(layout.total_size, layout.footprints[3].end());
        assert_eq!(layout.source, FootprintSource::Computed);
    }

    #[test]
    fn test_packed_layout_with_base_offset() {
        let desc = TextureDescriptor::new_2d(4, 4, PixelFormat::R8Unorm).with_mip_levels(2);
        let layout = packed_layout(&desc, 1, 1, 1000, FootprintRules::default()).unwrap();
        assert_eq!(layout.first_subresource, 1);
        assert_eq!(layout.footprints[0].offset, 1024);
        assert_eq!(layout.footprint(1).unwrap().offset, 1024);
        assert!(layout.footprint(0).is_none());
        assert_eq!(layout.total_size, 24 + 256 * 2);
    }

    #[test]
    fn test_packed_layout_rejects_out_of_range() {
        let desc = TextureDescriptor::new_2d(4, 4, PixelFormat::R8Unorm);
        assert!(packed_layout(&desc, 0, 2, 0, FootprintRules::default()).is_err());
        assert!(packed_layout(&desc, 0, 0, 0, FootprintRules::default()).is_err());
    }

    #[test]
    fn test_stencil_plane_footprint() {
        let desc = TextureDescriptor::new_2d(300, 2, PixelFormat::Depth32FloatStencil8)
            .with_flags(TextureFlags::DEPTH_STENCIL);
        let rules = FootprintRules::default();
        let depth = subresource_footprint(&desc, 0, rules).unwrap();
        let stencil = subresource_footprint(&desc, 1, rules).unwrap();
        assert_eq!(depth.row_size_bytes, 1200);
        assert_eq!(stencil.row_size_bytes, 300);
        assert_eq!(stencil.row_pitch, 512);
    }

    #[test]
    fn test_tightly_packed_size() {
        let desc = TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm).with_mip_levels(3);
        assert_eq!(tightly_packed_size(&desc), 64 + 16 + 4);

        let bc = TextureDescriptor::new_2d(8, 8, PixelFormat::Bc1RgbaUnorm).with_mip_levels(2);
        assert_eq!(tightly_packed_size(&bc), 4 * 8 + 8);
    }
}
