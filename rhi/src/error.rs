//! RHI error types.

use thiserror::Error;

use crate::memory::HeapType;

/// Errors that can occur in the texture engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    /// The device or a pool could not satisfy a memory request.
    ///
    /// Driver-side failures are reported through this variant too, with the
    /// driver message carried in `diagnostic`.
    #[error("allocation of {size} bytes in {heap_type:?} heap failed: {diagnostic}")]
    AllocationFailed {
        /// Heap the request targeted.
        heap_type: HeapType,
        /// Requested size in bytes.
        size: u64,
        /// Human-readable context (descriptor, driver message).
        diagnostic: String,
    },
    /// API misuse: double lock, unlock without lock, stale handle, or an
    /// access the resource does not support.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// An argument is out of range or misaligned.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The descriptor asks for a combination the device does not support.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),
    /// A recorded command failed on the executing context. Reported by the
    /// next submit or flush after the failing batch ran.
    #[error("{command} command failed on node {node}: {message}")]
    CommandFailed {
        /// Kind of the failing command.
        command: String,
        /// Node the command ran on.
        node: u32,
        /// Backend error message.
        message: String,
    },
    /// The GPU device was lost. Unrecoverable at this layer.
    #[error("GPU device lost")]
    DeviceLost,
}

impl RhiError {
    /// Shorthand for an [`RhiError::InvalidState`] error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Shorthand for an [`RhiError::InvalidParameter`] error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Returns true if this error signals device loss.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}
