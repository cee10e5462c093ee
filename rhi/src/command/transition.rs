//! Scoped resource state transitions.

use std::sync::Arc;

use super::{Command, CommandQueue};
use crate::backend::NativeTexture;
use crate::error::RhiError;
use crate::texture::TextureResource;
use crate::types::{ResourceState, SubresourceRange};

/// Moves a texture resource into a state for the lifetime of the guard.
///
/// Creating the guard records a transition into the target state (if the
/// resource is not already in it); dropping the guard records the transition
/// back. Call [`ScopedTransition::keep`] to leave the resource in the target
/// state instead.
///
/// # Example
///
/// ```ignore
/// let _dst = ScopedTransition::new(queue, resource, ResourceState::CopyDest)?;
/// queue.record(node, Command::Copy(copy));
/// // The reverse transition is recorded here.
/// ```
pub struct ScopedTransition<'a> {
    queue: &'a CommandQueue,
    resource: &'a TextureResource,
    texture: Arc<NativeTexture>,
    before: ResourceState,
    after: ResourceState,
    restore: bool,
}

impl<'a> ScopedTransition<'a> {
    /// Record a transition of `resource` into `target`.
    pub fn new(
        queue: &'a CommandQueue,
        resource: &'a TextureResource,
        target: ResourceState,
    ) -> Result<Self, RhiError> {
        let texture = Arc::clone(resource.native()?);
        // The state lock is held while recording so the tracked state and the
        // recorded transitions change together.
        let mut state = resource.state_cell().lock();
        let before = std::mem::replace(&mut *state, target);
        if before != target {
            record_transition(queue, resource, &texture, before, target);
        }
        drop(state);
        Ok(Self {
            queue,
            resource,
            texture,
            before,
            after: target,
            restore: true,
        })
    }

    /// State the resource was in before the guard.
    pub fn previous_state(&self) -> ResourceState {
        self.before
    }

    /// Leave the resource in the target state when the guard drops.
    pub fn keep(mut self) {
        self.restore = false;
    }
}

impl Drop for ScopedTransition<'_> {
    fn drop(&mut self) {
        if !self.restore || self.before == self.after {
            return;
        }
        let mut state = self.resource.state_cell().lock();
        *state = self.before;
        record_transition(
            self.queue,
            self.resource,
            &self.texture,
            self.after,
            self.before,
        );
    }
}

fn record_transition(
    queue: &CommandQueue,
    resource: &TextureResource,
    texture: &Arc<NativeTexture>,
    before: ResourceState,
    after: ResourceState,
) {
    queue.record(
        resource.node(),
        Command::Transition {
            texture: Arc::clone(texture),
            before,
            after,
            range: SubresourceRange::All,
        },
    );
}

/// Record a one-way transition of `resource` into `target`.
pub(crate) fn transition_to(
    queue: &CommandQueue,
    resource: &TextureResource,
    target: ResourceState,
) -> Result<(), RhiError> {
    ScopedTransition::new(queue, resource, target)?.keep();
    Ok(())
}
