//! Portable types describing textures and copy regions.

mod common;
mod format;
mod state;
mod texture;

pub use common::{Extent3d, Origin3d, TextureBox, align_up};
pub use format::PixelFormat;
pub use state::{ResourceState, SubresourceRange};
pub use texture::{TextureDescriptor, TextureDimension, TextureFlags};
