//! Error taxonomy for GPU resource and pipeline construction
//!
//! Every fallible operation in the render core returns [`RenderResult`]. Errors are
//! never swallowed: partially constructed objects are released by their `Drop`
//! implementations while the error unwinds to the caller.

use thiserror::Error;

use super::types::ResourceKind;

/// Render core errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Caller violated a documented precondition
    #[error("Invalid usage: {reason}")]
    InvalidUsage {
        /// Description of the violated precondition
        reason: String,
    },

    /// Two shader stages declared the same binding slot with different resource kinds
    #[error("Conflicting binding type at set {set}, binding {binding}: {existing:?} vs {declared:?}")]
    ConflictingBindingType {
        /// Descriptor set index of the conflicting binding
        set: u32,
        /// Binding index of the conflicting binding
        binding: u32,
        /// Resource kind recorded first
        existing: ResourceKind,
        /// Resource kind declared by a later stage
        declared: ResourceKind,
    },

    /// Descriptor set indices do not form a gap-free `0..N` range
    #[error("Non-contiguous descriptor set index: expected set {expected}, found set {found}")]
    NonContiguousSetIndex {
        /// The set index that should have come next
        expected: u32,
        /// The set index that was actually declared
        found: u32,
    },

    /// Device memory could not be allocated
    #[error("Device allocation of {size} bytes failed: {reason}")]
    DeviceAllocationFailure {
        /// Number of bytes requested
        size: u64,
        /// Backend-provided reason
        reason: String,
    },

    /// A native device object could not be created
    #[error("Failed to create {object}: {reason}")]
    DeviceObjectCreationFailure {
        /// Kind of object that failed (e.g. "pipeline layout")
        object: &'static str,
        /// Backend-provided reason
        reason: String,
    },

    /// Shader bytecode could not be reflected
    #[error("Shader reflection failed: {0}")]
    Reflection(String),
}

impl RenderError {
    /// Shorthand for [`RenderError::InvalidUsage`]
    pub fn invalid_usage(reason: impl Into<String>) -> Self {
        Self::InvalidUsage { reason: reason.into() }
    }

    /// Shorthand for [`RenderError::DeviceObjectCreationFailure`]
    pub fn creation_failed(object: &'static str, reason: impl Into<String>) -> Self {
        Self::DeviceObjectCreationFailure { object, reason: reason.into() }
    }

    /// Whether the error originates from the device rather than from caller input
    pub const fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceAllocationFailure { .. } | Self::DeviceObjectCreationFailure { .. }
        )
    }
}

/// Result type for render core operations
pub type RenderResult<T> = Result<T, RenderError>;
