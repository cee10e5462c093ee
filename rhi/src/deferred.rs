//! Fence-tagged deferred release.
//!
//! Anything the GPU may still reference is queued here together with the
//! fence value of the batch that last used it. [`DeferredReleaseQueue::process`]
//! frees every item whose value has been reached; nothing is freed earlier.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::memory::{ResourceAllocator, ResourceLocation};
use crate::sync::FenceValue;
use crate::texture::TextureResource;

/// Something waiting for the GPU to finish with it.
#[derive(Debug)]
pub enum DeferredRelease {
    /// A heap range, given back to the allocator.
    Allocation(ResourceLocation),
    /// A texture resource; dropping the last reference destroys it.
    Texture(Arc<TextureResource>),
}

/// Queue of releases ordered by the fence value they wait for.
#[derive(Debug, Default)]
pub struct DeferredReleaseQueue {
    pending: Mutex<Vec<(FenceValue, DeferredRelease)>>,
}

impl DeferredReleaseQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `item` until `retire_at` has been reached.
    pub fn queue(&self, retire_at: FenceValue, item: DeferredRelease) {
        self.pending.lock().push((retire_at, item));
    }

    /// Release everything retired at `completed`. Returns the number released.
    pub fn process(&self, completed: FenceValue, allocator: &ResourceAllocator) -> usize {
        let ready: Vec<DeferredRelease> = {
            let mut pending = self.pending.lock();
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|(retire_at, _)| *retire_at <= completed);
            *pending = waiting;
            ready.into_iter().map(|(_, item)| item).collect()
        };

        let count = ready.len();
        for item in ready {
            release(item, allocator);
        }
        if count > 0 {
            log::trace!("DeferredReleaseQueue: released {count} items at fence {completed}");
        }
        count
    }

    /// Release everything regardless of fence value. Only valid once the GPU
    /// is idle or lost.
    pub fn release_all(&self, allocator: &ResourceAllocator) -> usize {
        let all = std::mem::take(&mut *self.pending.lock());
        let count = all.len();
        for (_, item) in all {
            release(item, allocator);
        }
        count
    }

    /// Number of items waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

fn release(item: DeferredRelease, allocator: &ResourceAllocator) {
    match item {
        DeferredRelease::Allocation(location) => {
            if let Err(err) = allocator.release(location) {
                log::error!("DeferredReleaseQueue: {err}");
            }
        }
        // Items are dropped outside the queue lock; a texture resource's Drop
        // talks to the allocator and backend.
        DeferredRelease::Texture(resource) => drop(resource),
    }
}
