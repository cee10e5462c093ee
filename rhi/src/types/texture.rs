//! Texture descriptors.

use bitflags::bitflags;

use super::{Extent3d, PixelFormat, ResourceState};

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// 1D texture (or 1D array).
    D1,
    /// 2D texture (or 2D array).
    #[default]
    D2,
    /// 3D volume texture.
    D3,
    /// Cube map (or cube array); each cube contributes six layers.
    Cube,
}

impl TextureDimension {
    /// Number of array layers contributed per array element.
    pub fn face_multiplier(&self) -> u32 {
        match self {
            Self::Cube => 6,
            _ => 1,
        }
    }
}

bitflags! {
    /// Creation flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Texture can be sampled in a shader.
        const SHADER_RESOURCE = 1 << 0;
        /// Texture can be bound as a color render target.
        const RENDER_TARGET = 1 << 1;
        /// Texture can be bound as a depth-stencil target.
        const DEPTH_STENCIL = 1 << 2;
        /// Texture can be bound for unordered access.
        const UNORDERED_ACCESS = 1 << 3;
        /// Texture lives in host-visible readback memory.
        const CPU_READBACK = 1 << 4;
        /// Texture memory can be shared with other devices or processes.
        const SHARED = 1 << 5;
        /// Reserved (sparse) texture without backing memory at creation.
        const RESERVED = 1 << 6;
        /// Written by the CPU every frame; lock staging is retained between locks.
        const DYNAMIC = 1 << 7;
    }
}

impl Default for TextureFlags {
    fn default() -> Self {
        Self::SHADER_RESOURCE
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Texture dimensionality.
    pub dimension: TextureDimension,
    /// Size of mip 0. `depth` is only meaningful for 3D textures.
    pub size: Extent3d,
    /// Array size. For cube textures this is the number of cubes.
    pub array_size: u32,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Creation flags.
    pub flags: TextureFlags,
    /// State the texture is left in after creation.
    pub initial_state: ResourceState,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            size: Extent3d::new_2d(width, height),
            format,
            ..Default::default()
        }
    }

    /// Create a new 3D texture descriptor.
    pub fn new_3d(width: u32, height: u32, depth: u32, format: PixelFormat) -> Self {
        Self {
            dimension: TextureDimension::D3,
            size: Extent3d::new_3d(width, height, depth),
            format,
            ..Default::default()
        }
    }

    /// Create a new cube texture descriptor.
    pub fn new_cube(size: u32, format: PixelFormat) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            size: Extent3d::new_2d(size, size),
            format,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the array size.
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Replace the creation flags.
    pub fn with_flags(mut self, flags: TextureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the state the texture is left in after creation.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    /// Number of array layers, counting cube faces. Saturates at `u32::MAX`.
    pub fn layer_count(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self
                .array_size
                .saturating_mul(self.dimension.face_multiplier()),
        }
    }

    /// Number of format planes.
    pub fn plane_count(&self) -> u32 {
        self.format.plane_count()
    }

    /// Total number of subresources (mips x layers x planes). Saturates at
    /// `u32::MAX`, which no valid descriptor reaches.
    pub fn subresource_count(&self) -> u32 {
        self.mip_level_count
            .saturating_mul(self.layer_count())
            .saturating_mul(self.plane_count())
    }

    /// Returns true if the texture is multisampled.
    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    /// Returns true if the texture is written by the CPU every frame.
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(TextureFlags::DYNAMIC)
    }

    /// Returns true if the texture lives in host-visible readback memory.
    pub fn is_cpu_readback(&self) -> bool {
        self.flags.contains(TextureFlags::CPU_READBACK)
    }

    /// Returns true if this texture must be bound as a render or depth target.
    pub fn is_attachment(&self) -> bool {
        self.flags
            .intersects(TextureFlags::RENDER_TARGET | TextureFlags::DEPTH_STENCIL)
    }

    /// Returns true if `other` has the same size, format, mip and array layout.
    pub fn is_layout_compatible(&self, other: &TextureDescriptor) -> bool {
        self.dimension == other.dimension
            && self.size == other.size
            && self.array_size == other.array_size
            && self.mip_level_count == other.mip_level_count
            && self.sample_count == other.sample_count
            && self.format.is_copy_compatible(other.format)
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            size: Extent3d::new_2d(1, 1),
            array_size: 1,
            mip_level_count: 1,
            sample_count: 1,
            format: PixelFormat::default(),
            flags: TextureFlags::default(),
            initial_state: ResourceState::ShaderResource,
        }
    }
}
