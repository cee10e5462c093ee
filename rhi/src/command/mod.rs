//! Recorded GPU commands and the queue that replays them.
//!
//! Commands are recorded into a single FIFO per device and replayed in
//! submission order, either inline ([`ExecutionMode::Immediate`]) or on a
//! dedicated executor thread ([`ExecutionMode::Threaded`]). Every submitted
//! batch signals the device [`Fence`](crate::sync::Fence) once it has executed.
//!
//! [`ExecutionMode::Immediate`]: crate::ExecutionMode::Immediate
//! [`ExecutionMode::Threaded`]: crate::ExecutionMode::Threaded

mod queue;
mod transition;

use std::sync::Arc;

use crate::backend::{BackendError, GpuBackend, NativeHeap, NativeTexture, NodeIndex};
use crate::footprint::SubresourceFootprint;
use crate::types::{Origin3d, ResourceState, SubresourceRange, TextureBox};

pub use queue::CommandQueue;
pub use transition::ScopedTransition;
pub(crate) use transition::transition_to;

/// A placed footprint inside a host-visible heap.
///
/// `footprint.offset` is relative to the start of `heap`.
#[derive(Debug, Clone)]
pub struct BufferFootprint {
    /// The heap holding the linear data.
    pub heap: Arc<NativeHeap>,
    /// Layout of the data inside the heap.
    pub footprint: SubresourceFootprint,
}

/// A copy between textures and linear buffers.
#[derive(Debug, Clone)]
pub enum CopyCommand {
    /// Linear buffer -> texture subresource.
    BufferToTexture {
        /// Source buffer layout.
        src: BufferFootprint,
        /// Texels of the source footprint to copy. `None` copies all of it.
        src_box: Option<TextureBox>,
        /// Destination texture.
        dst: Arc<NativeTexture>,
        /// Destination subresource.
        dst_subresource: u32,
        /// Where the copy lands in the destination.
        dst_origin: Origin3d,
    },
    /// Texture subresource -> linear buffer.
    TextureToBuffer {
        /// Source texture.
        src: Arc<NativeTexture>,
        /// Source subresource.
        src_subresource: u32,
        /// Texels to copy. `None` copies the whole subresource.
        src_box: Option<TextureBox>,
        /// Destination buffer layout.
        dst: BufferFootprint,
        /// Texel position inside the destination footprint.
        dst_origin: Origin3d,
    },
    /// Texture subresource region -> texture subresource.
    TextureRegion {
        /// Source texture.
        src: Arc<NativeTexture>,
        /// Source subresource.
        src_subresource: u32,
        /// Texels to copy. `None` copies the whole subresource.
        src_box: Option<TextureBox>,
        /// Destination texture.
        dst: Arc<NativeTexture>,
        /// Destination subresource.
        dst_subresource: u32,
        /// Where the copy lands in the destination.
        dst_origin: Origin3d,
    },
    /// Every subresource of `src` -> `dst`. Layouts must match.
    Resource {
        /// Source texture.
        src: Arc<NativeTexture>,
        /// Destination texture.
        dst: Arc<NativeTexture>,
    },
}

/// Kind of non-transition barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// A new resource starts using memory another resource used.
    Aliasing,
    /// Orders unordered-access writes.
    UnorderedAccess,
}

/// Work that runs on the executing context, in order with other commands.
pub type CustomCommand = Box<dyn FnOnce(&dyn GpuBackend) -> Result<(), BackendError> + Send>;

/// One recorded command.
pub enum Command {
    /// A copy.
    Copy(CopyCommand),
    /// A resource state transition.
    Transition {
        /// Texture to transition.
        texture: Arc<NativeTexture>,
        /// State the subresources are in.
        before: ResourceState,
        /// State the subresources move to.
        after: ResourceState,
        /// Subresources affected.
        range: SubresourceRange,
    },
    /// A non-transition barrier.
    Barrier {
        /// Texture the barrier applies to, or `None` for all.
        texture: Option<Arc<NativeTexture>>,
        /// Barrier kind.
        kind: BarrierKind,
    },
    /// Caller-provided work.
    Custom(CustomCommand),
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Copy(CopyCommand::BufferToTexture { .. }) => "CopyBufferToTexture",
            Self::Copy(CopyCommand::TextureToBuffer { .. }) => "CopyTextureToBuffer",
            Self::Copy(CopyCommand::TextureRegion { .. }) => "CopyTextureRegion",
            Self::Copy(CopyCommand::Resource { .. }) => "CopyResource",
            Self::Transition { .. } => "Transition",
            Self::Barrier { .. } => "Barrier",
            Self::Custom(_) => "Custom",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy(copy) => f.debug_tuple("Copy").field(copy).finish(),
            Self::Transition {
                texture,
                before,
                after,
                range,
            } => f
                .debug_struct("Transition")
                .field("texture", &texture.id)
                .field("before", before)
                .field("after", after)
                .field("range", range)
                .finish(),
            Self::Barrier { texture, kind } => f
                .debug_struct("Barrier")
                .field("texture", &texture.as_ref().map(|t| t.id))
                .field("kind", kind)
                .finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A command tagged with the GPU node it runs on.
#[derive(Debug)]
pub struct NodeCommand {
    /// Target node.
    pub node: NodeIndex,
    /// The command.
    pub command: Command,
}
