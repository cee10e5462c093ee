//! Pixel formats and their block layout.

/// Texture pixel format.
///
/// Every format is described in terms of *blocks*: uncompressed formats use
/// 1x1 blocks, block-compressed (BC) formats use 4x4 blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,

    // 16-bit formats
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 16-bit red channel, float.
    R16Float,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10a2Unorm,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil (two planes).
    Depth24PlusStencil8,
    /// 32-bit depth float with 8-bit stencil (two planes).
    Depth32FloatStencil8,

    // Block-compressed formats
    /// BC1 RGBA, unsigned normalized (8 bytes per 4x4 block).
    Bc1RgbaUnorm,
    /// BC1 RGBA, sRGB.
    Bc1RgbaUnormSrgb,
    /// BC2 RGBA, unsigned normalized.
    Bc2RgbaUnorm,
    /// BC3 RGBA, unsigned normalized.
    Bc3RgbaUnorm,
    /// BC4 red, unsigned normalized.
    Bc4RUnorm,
    /// BC5 RG, unsigned normalized.
    Bc5RgUnorm,
    /// BC6H RGB, unsigned float.
    Bc6hRgbUfloat,
    /// BC7 RGBA, unsigned normalized.
    Bc7RgbaUnorm,
    /// BC7 RGBA, sRGB.
    Bc7RgbaUnormSrgb,
}

impl PixelFormat {
    /// Returns true if this is a block-compressed format.
    pub fn is_block_compressed(&self) -> bool {
        matches!(
            self,
            Self::Bc1RgbaUnorm
                | Self::Bc1RgbaUnormSrgb
                | Self::Bc2RgbaUnorm
                | Self::Bc3RgbaUnorm
                | Self::Bc4RUnorm
                | Self::Bc5RgUnorm
                | Self::Bc6hRgbUfloat
                | Self::Bc7RgbaUnorm
                | Self::Bc7RgbaUnormSrgb
        )
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth32Float
                | Self::Depth24PlusStencil8
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Block width and height in texels.
    pub fn block_dimensions(&self) -> (u32, u32) {
        if self.is_block_compressed() {
            (4, 4)
        } else {
            (1, 1)
        }
    }

    /// Number of planes. Depth-stencil formats with stencil store depth and
    /// stencil in separate planes.
    pub fn plane_count(&self) -> u32 {
        if self.has_stencil() { 2 } else { 1 }
    }

    /// Size in bytes of one block of plane 0.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Uint => 1,
            Self::Rg8Unorm | Self::R16Unorm | Self::R16Float | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgb10a2Unorm
            | Self::Depth32Float
            | Self::Depth24PlusStencil8
            | Self::Depth32FloatStencil8 => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgba32Float => 16,
            Self::Bc1RgbaUnorm | Self::Bc1RgbaUnormSrgb | Self::Bc4RUnorm => 8,
            Self::Bc2RgbaUnorm
            | Self::Bc3RgbaUnorm
            | Self::Bc5RgUnorm
            | Self::Bc6hRgbUfloat
            | Self::Bc7RgbaUnorm
            | Self::Bc7RgbaUnormSrgb => 16,
        }
    }

    /// Size in bytes of one block of the given plane.
    ///
    /// The stencil plane stores one byte per texel.
    pub fn plane_block_size(&self, plane: u32) -> u32 {
        if plane > 0 && self.has_stencil() {
            1
        } else {
            self.block_size()
        }
    }

    /// The canonical member of this format's copy family.
    ///
    /// Two formats can be copied between with a raw texture copy when their
    /// families match (e.g. `Rgba8Unorm` and `Rgba8UnormSrgb`).
    pub fn copy_family(&self) -> Self {
        match self {
            Self::Rgba8UnormSrgb => Self::Rgba8Unorm,
            Self::Bgra8UnormSrgb => Self::Bgra8Unorm,
            Self::Bc1RgbaUnormSrgb => Self::Bc1RgbaUnorm,
            Self::Bc7RgbaUnormSrgb => Self::Bc7RgbaUnorm,
            other => *other,
        }
    }

    /// Returns true if a raw copy between `self` and `other` is allowed.
    pub fn is_copy_compatible(&self, other: PixelFormat) -> bool {
        self.copy_family() == other.copy_family()
    }
}
