//! CPU locking of texture subresources.
//!
//! - A **write lock** hands out a CPU-writable staging buffer laid out with
//!   the subresource footprint. Unlocking records the upload to every peer.
//!   Dynamic textures keep the staging buffer after unlock; the next write
//!   lock waits until the GPU is done reading it and reuses it.
//! - A **read lock** copies the subresource from the first peer into
//!   readback memory and blocks until the copy has executed.
//!
//! A subresource can be locked once at a time. The lock table is only held
//! for bookkeeping: while a lock is being set up the entry is marked
//! acquiring, so other subresources stay lockable and a second lock of the
//! same subresource fails instead of waiting.

use std::collections::HashMap;
use std::sync::Arc;

use super::Texture;
use crate::command::{BufferFootprint, Command, CopyCommand, ScopedTransition};
use crate::deferred::DeferredRelease;
use crate::error::RhiError;
use crate::footprint::{self, SubresourceFootprint};
use crate::memory::{MappedRange, StagingBuffer};
use crate::sync::FenceValue;
use crate::types::{Origin3d, ResourceState, TextureFlags};

/// Access requested by a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read the current contents.
    ReadOnly,
    /// Overwrite the contents; the previous contents are not provided.
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    /// Staging for a new lock is being prepared outside the table lock.
    Acquiring,
    Locked(LockMode),
    /// Dynamic staging kept after unlock; reusable once `retire_at` is reached.
    Retained { retire_at: FenceValue },
}

/// Bookkeeping for one locked (or retained) subresource.
#[derive(Debug)]
pub(crate) struct LockedResourceEntry {
    staging: Option<StagingBuffer>,
    footprint: SubresourceFootprint,
    state: LockState,
}

impl LockedResourceEntry {
    pub(crate) fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked(_) | LockState::Acquiring)
    }

    pub(crate) fn into_staging(self) -> Option<StagingBuffer> {
        self.staging
    }
}

pub(crate) type LockTable = HashMap<u32, LockedResourceEntry>;

/// A locked subresource.
///
/// The mapping stays valid until the subresource is unlocked.
#[derive(Debug, Clone)]
pub struct LockedSubresource {
    mapping: MappedRange,
    footprint: SubresourceFootprint,
}

impl LockedSubresource {
    /// CPU mapping of the subresource data.
    pub fn mapping(&self) -> &MappedRange {
        &self.mapping
    }

    /// Layout of the data behind [`Self::mapping`]. The offset is 0.
    pub fn footprint(&self) -> &SubresourceFootprint {
        &self.footprint
    }

    /// Distance between rows of blocks, in bytes.
    pub fn row_pitch(&self) -> u32 {
        self.footprint.row_pitch
    }

    /// Distance between depth slices, in bytes.
    pub fn depth_pitch(&self) -> u64 {
        self.footprint.depth_pitch()
    }

    /// Total mapped bytes.
    pub fn size(&self) -> u64 {
        self.footprint.total_bytes
    }

    /// Write tightly packed rows (no row padding) into the pitched mapping.
    pub fn write_packed(&self, data: &[u8]) -> Result<(), RhiError> {
        let fp = self.footprint;
        let row_bytes = fp.row_size_bytes as usize;
        let rows = (fp.row_count * fp.depth) as usize;
        if data.len() < row_bytes * rows {
            return Err(RhiError::invalid_parameter(format!(
                "{} bytes supplied, subresource needs {}",
                data.len(),
                row_bytes * rows
            )));
        }
        self.mapping.with_bytes_mut(|dst| {
            for (row, src) in data.chunks_exact(row_bytes).take(rows).enumerate() {
                let start = row * fp.row_pitch as usize;
                dst[start..start + row_bytes].copy_from_slice(src);
            }
        });
        Ok(())
    }

    /// Read the mapping back as tightly packed rows.
    pub fn read_packed(&self) -> Vec<u8> {
        let fp = self.footprint;
        let row_bytes = fp.row_size_bytes as usize;
        let rows = (fp.row_count * fp.depth) as usize;
        self.mapping.with_bytes(|src| {
            let mut out = Vec::with_capacity(row_bytes * rows);
            for row in 0..rows {
                let start = row * fp.row_pitch as usize;
                out.extend_from_slice(&src[start..start + row_bytes]);
            }
            out
        })
    }
}

impl Texture {
    /// Lock `subresource` for CPU access.
    ///
    /// Fails with [`RhiError::InvalidState`] if the subresource is already
    /// locked, the texture is multisampled or reserved, or a write lock is
    /// requested on a readback texture.
    pub fn lock(&self, subresource: u32, mode: LockMode) -> Result<LockedSubresource, RhiError> {
        crate::profile_scope!("Texture::lock");

        footprint::check_subresource(&self.descriptor, subresource)?;
        self.check_lockable()?;
        if self.descriptor.is_cpu_readback() {
            return self.lock_readback(subresource, mode);
        }

        let footprint = footprint::subresource_footprint(
            &self.descriptor,
            subresource,
            self.device.config().footprint_rules(),
        )?;
        let retained = self.reserve(subresource)?;

        let prepared = (|| -> Result<(StagingBuffer, MappedRange), RhiError> {
            let staging = match mode {
                LockMode::WriteOnly => self.write_staging(subresource, retained, footprint)?,
                LockMode::ReadOnly => {
                    if let Some(entry) = retained {
                        self.retire_entry(entry);
                    }
                    self.read_back(subresource, footprint)?
                }
            };
            match staging.mapping().subrange(0, footprint.total_bytes) {
                Ok(mapping) => Ok((staging, mapping)),
                Err(err) => {
                    self.release_staging(staging);
                    Err(err)
                }
            }
        })();

        let mut locks = self.locks.lock();
        let (staging, mapping) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                locks.remove(&subresource);
                return Err(err);
            }
        };
        locks.insert(
            subresource,
            LockedResourceEntry {
                staging: Some(staging),
                footprint,
                state: LockState::Locked(mode),
            },
        );
        drop(locks);

        log::trace!(
            "Texture: locked '{}' subresource {} ({:?}, pitch {})",
            self.name,
            subresource,
            mode,
            footprint.row_pitch
        );
        Ok(LockedSubresource { mapping, footprint })
    }

    /// Unlock `subresource`. A write lock uploads the staged data to every
    /// peer.
    pub fn unlock(&self, subresource: u32) -> Result<(), RhiError> {
        crate::profile_scope!("Texture::unlock");

        footprint::check_subresource(&self.descriptor, subresource)?;
        let mut locks = self.locks.lock();
        let (entry, mode) = match locks.remove(&subresource) {
            Some(entry) => match entry.state {
                LockState::Locked(mode) => (entry, mode),
                _ => {
                    locks.insert(subresource, entry);
                    return Err(self.not_locked(subresource));
                }
            },
            None => return Err(self.not_locked(subresource)),
        };
        let Some(staging) = entry.staging else {
            // Readback textures map their own memory.
            return Ok(());
        };

        match mode {
            LockMode::ReadOnly => self.device.staging().release(staging)?,
            LockMode::WriteOnly => {
                let mut placed = entry.footprint;
                placed.offset = staging.location().offset();
                let src = BufferFootprint {
                    heap: Arc::clone(staging.location().heap()),
                    footprint: placed,
                };
                for peer in &self.peers {
                    self.record_upload(
                        &peer.resource(),
                        subresource,
                        src.clone(),
                        None,
                        Origin3d::zero(),
                    )?;
                }

                let retire_at = self.device.queue().pending_fence_value();
                if self.descriptor.is_dynamic() {
                    locks.insert(
                        subresource,
                        LockedResourceEntry {
                            staging: Some(staging),
                            footprint: entry.footprint,
                            state: LockState::Retained { retire_at },
                        },
                    );
                } else {
                    self.device.defer_release_at(
                        retire_at,
                        DeferredRelease::Allocation(staging.into_location()),
                    );
                }
            }
        }

        log::trace!("Texture: unlocked '{}' subresource {}", self.name, subresource);
        Ok(())
    }

    /// Footprint of a subresource of a readback texture, relative to the
    /// start of its readback memory. Subresource 0 is cached.
    pub fn readback_footprint(&self, subresource: u32) -> Result<SubresourceFootprint, RhiError> {
        if !self.descriptor.is_cpu_readback() {
            return Err(RhiError::invalid_state(format!(
                "'{}' is not a readback texture",
                self.name
            )));
        }
        footprint::check_subresource(&self.descriptor, subresource)?;
        if subresource == 0
            && let Some(cached) = self.readback_footprint.get()
        {
            return Ok(*cached);
        }

        let resource = self.first_resource()?;
        let footprint = resource
            .readback_layout()
            .and_then(|layout| layout.footprint(subresource))
            .copied()
            .ok_or_else(|| RhiError::invalid_state("readback layout is missing"))?;
        if subresource == 0 {
            let _ = self.readback_footprint.set(footprint);
        }
        Ok(footprint)
    }

    fn check_lockable(&self) -> Result<(), RhiError> {
        if self.descriptor.is_multisampled() {
            return Err(RhiError::invalid_state(format!(
                "'{}' is multisampled and cannot be locked",
                self.name
            )));
        }
        if self.descriptor.flags.contains(TextureFlags::RESERVED) {
            return Err(RhiError::invalid_state(format!(
                "'{}' is reserved and cannot be locked",
                self.name
            )));
        }
        Ok(())
    }

    fn lock_readback(&self, subresource: u32, mode: LockMode) -> Result<LockedSubresource, RhiError> {
        if mode == LockMode::WriteOnly {
            return Err(RhiError::invalid_state(format!(
                "'{}' is a readback texture and cannot be write locked",
                self.name
            )));
        }

        if let Some(entry) = self.reserve(subresource)? {
            self.retire_entry(entry);
        }

        // Copies into readback memory must have executed before the CPU reads.
        let prepared = self.device.flush().and_then(|()| {
            let mut footprint = self.readback_footprint(subresource)?;
            let mapping = self.first_resource()?.readback_mapping(subresource)?;
            footprint.offset = 0;
            Ok((footprint, mapping))
        });

        let mut locks = self.locks.lock();
        let (footprint, mapping) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                locks.remove(&subresource);
                return Err(err);
            }
        };
        locks.insert(
            subresource,
            LockedResourceEntry {
                staging: None,
                footprint,
                state: LockState::Locked(LockMode::ReadOnly),
            },
        );
        Ok(LockedSubresource { mapping, footprint })
    }

    /// Mark `subresource` as acquiring and return its retained entry, if any.
    fn reserve(&self, subresource: u32) -> Result<Option<LockedResourceEntry>, RhiError> {
        let mut locks = self.locks.lock();
        if locks.get(&subresource).is_some_and(LockedResourceEntry::is_locked) {
            return Err(RhiError::invalid_state(format!(
                "subresource {subresource} of '{}' is already locked",
                self.name
            )));
        }
        Ok(locks.insert(
            subresource,
            LockedResourceEntry {
                staging: None,
                footprint: SubresourceFootprint::default(),
                state: LockState::Acquiring,
            },
        ))
    }

    /// Staging for a write lock. A retained buffer is reused once the GPU has
    /// finished reading it; this waits for its fence rather than allocating.
    fn write_staging(
        &self,
        subresource: u32,
        retained: Option<LockedResourceEntry>,
        footprint: SubresourceFootprint,
    ) -> Result<StagingBuffer, RhiError> {
        match retained {
            Some(LockedResourceEntry {
                staging: Some(staging),
                state: LockState::Retained { retire_at },
                ..
            }) => {
                if let Err(err) = self.wait_for_retirement(retire_at) {
                    self.release_staging(staging);
                    return Err(err);
                }
                log::trace!(
                    "Texture: '{}' reuses retained staging for subresource {}",
                    self.name,
                    subresource
                );
                Ok(staging)
            }
            other => {
                if let Some(entry) = other {
                    self.retire_entry(entry);
                }
                self.device.staging().acquire_upload(footprint.total_bytes)
            }
        }
    }

    /// Block until `retire_at` has executed, submitting it first if needed.
    fn wait_for_retirement(&self, retire_at: FenceValue) -> Result<(), RhiError> {
        let queue = self.device.queue();
        if queue.is_complete(retire_at) {
            return Ok(());
        }
        crate::profile_scope!("Texture::wait_for_retirement");
        if queue.last_submitted() < retire_at {
            queue.submit()?;
        }
        queue.wait(retire_at)
    }

    /// Copy `subresource` of the first peer into fresh readback memory and
    /// wait for it.
    fn read_back(
        &self,
        subresource: u32,
        footprint: SubresourceFootprint,
    ) -> Result<StagingBuffer, RhiError> {
        crate::profile_scope!("Texture::read_back");

        let staging = self.device.staging().acquire_readback(footprint.total_bytes)?;
        let resource = self.first_resource()?;
        let queue = self.device.queue();

        let recorded = (|| {
            let _src = ScopedTransition::new(queue, &resource, ResourceState::CopySource)?;
            let mut placed = footprint;
            placed.offset = staging.location().offset();
            queue.record(
                resource.node(),
                Command::Copy(CopyCommand::TextureToBuffer {
                    src: Arc::clone(resource.native()?),
                    src_subresource: subresource,
                    src_box: None,
                    dst: BufferFootprint {
                        heap: Arc::clone(staging.location().heap()),
                        footprint: placed,
                    },
                    dst_origin: Origin3d::zero(),
                }),
            );
            Ok::<(), RhiError>(())
        })();

        match recorded.and_then(|()| self.device.flush()) {
            Ok(()) => Ok(staging),
            Err(err) => {
                self.release_staging(staging);
                Err(err)
            }
        }
    }

    /// Release `staging` once everything recorded so far has executed.
    fn release_staging(&self, staging: StagingBuffer) {
        let retire_at = self.device.queue().pending_fence_value();
        self.device
            .defer_release_at(retire_at, DeferredRelease::Allocation(staging.into_location()));
    }

    /// Hand a retained entry's staging to deferred release.
    fn retire_entry(&self, entry: LockedResourceEntry) {
        let retire_at = match entry.state {
            LockState::Retained { retire_at } => retire_at,
            LockState::Locked(_) | LockState::Acquiring => {
                self.device.queue().pending_fence_value()
            }
        };
        if let Some(staging) = entry.staging {
            self.device
                .defer_release_at(retire_at, DeferredRelease::Allocation(staging.into_location()));
        }
    }

    fn not_locked(&self, subresource: u32) -> RhiError {
        RhiError::invalid_state(format!(
            "subresource {subresource} of '{}' is not locked",
            self.name
        ))
    }
}
