//! Common geometric types shared across the texture engine.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures and copy regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels (1 for 1D/2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 1D extent.
    pub fn new_1d(width: u32) -> Self {
        Self {
            width,
            height: 1,
            depth: 1,
        }
    }

    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Returns true if any axis is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// Largest of the three axes.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }
}

// ============================================================================
// Origin3d
// ============================================================================

/// Texel coordinate inside a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin3d {
    /// X coordinate.
    pub x: u32,
    /// Y coordinate.
    pub y: u32,
    /// Z coordinate (3D textures only).
    pub z: u32,
}

impl Origin3d {
    /// Create a new origin.
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Origin at (0, 0, 0).
    pub fn zero() -> Self {
        Self::default()
    }
}

// ============================================================================
// TextureBox
// ============================================================================

/// An axis-aligned box of texels inside one subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Front edge.
    pub z: u32,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels.
    pub depth: u32,
}

impl TextureBox {
    /// Create a 2D box (depth 1 at z = 0).
    pub fn new_2d(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            z: 0,
            width,
            height,
            depth: 1,
        }
    }

    /// Create a 3D box.
    pub fn new_3d(origin: Origin3d, extent: Extent3d) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            z: origin.z,
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
        }
    }

    /// A box covering a whole extent.
    pub fn whole(extent: Extent3d) -> Self {
        Self::new_3d(Origin3d::zero(), extent)
    }

    /// The box's origin.
    pub fn origin(&self) -> Origin3d {
        Origin3d::new(self.x, self.y, self.z)
    }

    /// The box's extent.
    pub fn extent(&self) -> Extent3d {
        Extent3d::new_3d(self.width, self.height, self.depth)
    }

    /// Returns true if the box covers no texels.
    pub fn is_empty(&self) -> bool {
        self.extent().is_empty()
    }

    /// Returns true if the box lies inside `bounds`.
    pub fn fits_within(&self, bounds: Extent3d) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(bounds.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(bounds.height)
            && u64::from(self.z) + u64::from(self.depth) <= u64::from(bounds.depth)
    }
}

/// Round `value` up to the next multiple of `alignment` (which must be non-zero).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
