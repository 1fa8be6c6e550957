//! Error types for position acquisition and engine configuration.
//!
//! Only acquisition failures and invalid configuration are errors. Rejected GPS
//! deltas and refused collections are ordinary outcomes and never show up here.

use thiserror::Error;

/// Failure reported by a [`PositionSource`](crate::PositionSource).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("timed out waiting for a position fix")]
    Timeout,

    #[error("device has no location capability")]
    Unsupported,
}

impl PositionError {
    /// True for failures that will not go away by waiting (the user said no, or
    /// there is no GPS at all). Transient failures may resolve on the next fix.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unsupported)
    }
}

/// Errors raised while building or driving the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("position source error: {0}")]
    Position(#[from] PositionError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Fail with [`EngineError::InvalidConfig`] unless `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!("{} must be positive, got {}", name, value)))
    }
}
