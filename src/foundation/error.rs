use std::time::Duration;

use crate::foundation::core::BufferId;

/// Convenience result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure to turn an external buffer into a GPU image.
///
/// Only [`BindError::ContextLost`] is fatal; an import failure just means the layer is skipped for
/// the current frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The active context is no longer usable.
    #[error("GPU context lost while importing buffer")]
    ContextLost,

    /// The GPU refused to import this particular buffer.
    #[error("failed to import buffer {id}: {reason}")]
    ImportFailed {
        /// Buffer that could not be imported.
        id: BufferId,
        /// Backend-provided reason.
        reason: String,
    },
}

impl BindError {
    /// Build a [`BindError::ImportFailed`] value.
    pub fn import_failed(id: BufferId, reason: impl Into<String>) -> Self {
        Self::ImportFailed {
            id,
            reason: reason.into(),
        }
    }

    /// Return `true` when the error poisons the whole engine rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContextLost)
    }
}

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The GPU context is lost; the engine must be recreated.
    #[error("GPU context lost")]
    ContextLost,

    /// The frame needs protected output but no protected context is available.
    #[error("protected context unavailable")]
    ProtectedUnavailable,

    /// A fence did not signal within its deadline.
    #[error("fence wait timed out after {waited:?}")]
    FenceTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// Buffer import failure.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Invalid caller-provided data or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Build a [`EngineError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Return `true` when the engine cannot render any further frames.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ContextLost => true,
            Self::Bind(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
