//! CPU-GPU synchronization.
//!
//! The device owns one timeline [`Fence`]. Every submitted batch is assigned
//! the next [`FenceValue`] and signals it once executed, so "has batch N
//! retired?" is a single comparison.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::RhiError;

/// A point on the device timeline.
pub type FenceValue = u64;

/// Status of a fence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU has not reached this value yet.
    Pending,
    /// Work up to and including this value has executed.
    Completed,
    /// The device was lost before reaching this value.
    Lost,
}

/// Timeline fence signalled by the executing context.
///
/// # Example
///
/// ```ignore
/// let value = queue.submit()?;
/// // Later, before reusing staging memory:
/// fence.wait(value)?;
/// assert_eq!(fence.status(value), FenceStatus::Completed);
/// ```
#[derive(Debug, Default)]
pub struct Fence {
    completed: AtomicU64,
    lost: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Fence {
    /// Create a fence at value 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest value signalled so far.
    pub fn completed_value(&self) -> FenceValue {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns true if `value` has been reached.
    pub fn is_complete(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// Returns true once the device has been marked lost.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Check the status of `value` without blocking.
    pub fn status(&self, value: FenceValue) -> FenceStatus {
        if self.is_complete(value) {
            FenceStatus::Completed
        } else if self.is_lost() {
            FenceStatus::Lost
        } else {
            FenceStatus::Pending
        }
    }

    /// Block until `value` is reached.
    ///
    /// Returns [`RhiError::DeviceLost`] if the device is lost before that.
    pub fn wait(&self, value: FenceValue) -> Result<(), RhiError> {
        let mut guard = self.lock.lock();
        loop {
            match self.status(value) {
                FenceStatus::Completed => return Ok(()),
                FenceStatus::Lost => return Err(RhiError::DeviceLost),
                FenceStatus::Pending => self.condvar.wait(&mut guard),
            }
        }
    }

    /// Block until `value` is reached or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait_timeout(&self, value: FenceValue, timeout: Duration) -> Result<bool, RhiError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        loop {
            match self.status(value) {
                FenceStatus::Completed => return Ok(true),
                FenceStatus::Lost => return Err(RhiError::DeviceLost),
                FenceStatus::Pending => {
                    if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                        return Ok(self.is_complete(value));
                    }
                }
            }
        }
    }

    /// Advance the fence to `value`. Values never move backwards.
    pub(crate) fn signal(&self, value: FenceValue) {
        let _guard = self.lock.lock();
        self.completed.fetch_max(value, Ordering::AcqRel);
        self.condvar.notify_all();
    }

    /// Mark the device lost and wake every waiter.
    pub(crate) fn mark_lost(&self) {
        let _guard = self.lock.lock();
        self.lost.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fence_starts_at_zero() {
        let fence = Fence::new();
        assert_eq!(fence.completed_value(), 0);
        assert_eq!(fence.status(0), FenceStatus::Completed);
        assert_eq!(fence.status(1), FenceStatus::Pending);
    }

    #[test]
    fn test_fence_never_moves_backwards() {
        let fence = Fence::new();
        fence.signal(5);
        fence.signal(3);
        assert_eq!(fence.completed_value(), 5);
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = Arc::new(Fence::new());

        let signaller = Arc::clone(&fence);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaller.signal(2);
        });

        fence.wait(2).unwrap();
        assert!(fence.is_complete(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new();
        let reached = fence.wait_timeout(1, Duration::from_millis(10)).unwrap();
        assert!(!reached);
    }

    #[test]
    fn test_lost_device_wakes_waiters() {
        let fence = Arc::new(Fence::new());

        let loser = Arc::clone(&fence);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            loser.mark_lost();
        });

        assert_eq!(fence.wait(1), Err(RhiError::DeviceLost));
        assert_eq!(fence.status(1), FenceStatus::Lost);
        handle.join().unwrap();
    }
}
