//! Resource states tracked across transitions.

/// The usage state a GPU resource is in.
///
/// Copies and shader access require the resource to be in the matching state;
/// transitions between states are recorded explicitly as commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial state of freshly created resources.
    #[default]
    Common,
    /// Readable from shaders.
    ShaderResource,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a writable depth-stencil target.
    DepthWrite,
    /// Bound as a read-only depth-stencil target.
    DepthRead,
    /// Bound for unordered (storage) access.
    UnorderedAccess,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDest,
    /// Host-visible upload memory (always readable by the GPU).
    GenericRead,
}

impl ResourceState {
    /// Returns true if the state allows GPU writes.
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess | Self::CopyDest
        )
    }
}

/// A range of subresources addressed by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubresourceRange {
    /// Every subresource of the resource.
    #[default]
    All,
    /// A single subresource, by linear index.
    Single(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_states() {
        assert!(ResourceState::CopyDest.is_writable());
        assert!(!ResourceState::CopySource.is_writable());
        assert!(!ResourceState::ShaderResource.is_writable());
    }
}
