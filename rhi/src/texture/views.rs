//! Texture views.
//!
//! Views are plain descriptions of how a texture is bound. They are rebuilt
//! whenever the texture's underlying resource changes (creation, aliasing).

use crate::types::{PixelFormat, TextureDescriptor, TextureDimension, TextureFlags};

/// Shader resource view over every mip and layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderResourceView {
    /// Native texture the view refers to.
    pub resource_id: u64,
    /// View format.
    pub format: PixelFormat,
    /// View dimension.
    pub dimension: TextureDimension,
    /// First mip visible.
    pub first_mip: u32,
    /// Number of mips visible.
    pub mip_count: u32,
    /// First layer visible.
    pub first_layer: u32,
    /// Number of layers visible.
    pub layer_count: u32,
}

/// Render target view of one mip of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetView {
    /// Native texture the view refers to.
    pub resource_id: u64,
    /// Mip level.
    pub mip: u32,
    /// Array layer.
    pub layer: u32,
}

/// Which aspects of a depth-stencil view are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilAccess {
    /// Depth and stencil writable.
    ReadWrite,
    /// Depth read-only, stencil writable.
    DepthReadOnly,
    /// Depth writable, stencil read-only.
    StencilReadOnly,
    /// Depth and stencil read-only.
    ReadOnly,
}

impl DepthStencilAccess {
    /// Every access mode.
    pub const ALL: [DepthStencilAccess; 4] = [
        Self::ReadWrite,
        Self::DepthReadOnly,
        Self::StencilReadOnly,
        Self::ReadOnly,
    ];
}

/// Depth-stencil view of mip 0 over every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilView {
    /// Native texture the view refers to.
    pub resource_id: u64,
    /// Access mode.
    pub access: DepthStencilAccess,
    /// Number of layers covered.
    pub layer_count: u32,
}

/// Unordered access view of one mip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnorderedAccessView {
    /// Native texture the view refers to.
    pub resource_id: u64,
    /// Mip level.
    pub mip: u32,
}

/// Every view a texture exposes, derived from its flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureViews {
    shader_resource: Option<ShaderResourceView>,
    render_targets: Vec<RenderTargetView>,
    depth_stencils: Vec<DepthStencilView>,
    unordered_access: Vec<UnorderedAccessView>,
}

impl TextureViews {
    /// Build the views of a native texture.
    pub fn build(desc: &TextureDescriptor, resource_id: u64) -> Self {
        let mips = desc.mip_level_count;
        let layers = desc.layer_count();
        let mut views = Self::default();

        if desc.flags.contains(TextureFlags::SHADER_RESOURCE) {
            views.shader_resource = Some(ShaderResourceView {
                resource_id,
                format: desc.format,
                dimension: desc.dimension,
                first_mip: 0,
                mip_count: mips,
                first_layer: 0,
                layer_count: layers,
            });
        }

        if desc.flags.contains(TextureFlags::RENDER_TARGET) {
            views.render_targets = (0..layers)
                .flat_map(|layer| {
                    (0..mips).map(move |mip| RenderTargetView {
                        resource_id,
                        mip,
                        layer,
                    })
                })
                .collect();
        }

        if desc.flags.contains(TextureFlags::DEPTH_STENCIL) {
            let stencil = desc.format.has_stencil();
            views.depth_stencils = DepthStencilAccess::ALL
                .into_iter()
                .filter(|access| {
                    stencil
                        || matches!(
                            access,
                            DepthStencilAccess::ReadWrite | DepthStencilAccess::DepthReadOnly
                        )
                })
                .map(|access| DepthStencilView {
                    resource_id,
                    access,
                    layer_count: layers,
                })
                .collect();
        }

        if desc.flags.contains(TextureFlags::UNORDERED_ACCESS) {
            views.unordered_access = (0..mips)
                .map(|mip| UnorderedAccessView { resource_id, mip })
                .collect();
        }

        views
    }

    /// Shader resource view, if the texture can be sampled.
    pub fn shader_resource(&self) -> Option<&ShaderResourceView> {
        self.shader_resource.as_ref()
    }

    /// Render target view of `mip` in `layer`.
    pub fn render_target(&self, mip: u32, layer: u32) -> Option<&RenderTargetView> {
        self.render_targets
            .iter()
            .find(|view| view.mip == mip && view.layer == layer)
    }

    /// Number of render target views.
    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    /// Depth-stencil view with the given access.
    pub fn depth_stencil(&self, access: DepthStencilAccess) -> Option<&DepthStencilView> {
        self.depth_stencils.iter().find(|view| view.access == access)
    }

    /// Unordered access view of `mip`.
    pub fn unordered_access(&self, mip: u32) -> Option<&UnorderedAccessView> {
        self.unordered_access.iter().find(|view| view.mip == mip)
    }
}
