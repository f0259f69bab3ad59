//! Rendering error types.

use strata_core::StrataError;
use thiserror::Error;

use crate::category::GeometryCategory;
use crate::device::{BufferKey, Program, TargetId, TextureKey};

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// An error from the core data structures, such as an unknown model.
    #[error(transparent)]
    Core(#[from] StrataError),

    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// A render target id that the device does not know.
    #[error("unknown render target {0}")]
    UnknownTarget(TargetId),

    /// A buffer that was never uploaded or has been released.
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferKey),

    /// A texture that was never uploaded or has been released.
    #[error("unknown texture {0}")]
    UnknownTexture(TextureKey),

    /// No draw program is registered for a program id.
    #[error("no draw program registered for {0}")]
    MissingProgram(Program),

    /// A pass input was not ready this frame.
    #[error("source not ready: {0}")]
    SourceNotReady(String),

    /// The device rejected a draw.
    #[error("draw failed: {0}")]
    DrawFailed(String),

    /// A sector payload is not a whole number of records.
    #[error("{category} payload of {len} bytes is not a multiple of its {stride}-byte record")]
    PayloadLayout {
        category: GeometryCategory,
        len: usize,
        stride: usize,
    },

    /// A sector payload uses a different record size than its draw object.
    #[error("{category} records are {expected} bytes, got {actual}")]
    StrideMismatch {
        category: GeometryCategory,
        expected: usize,
        actual: usize,
    },
}

impl RenderError {
    /// Errors confined to a single pass in a single frame.
    ///
    /// Executors log these and skip the pass instead of aborting the frame.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RenderError::SourceNotReady(_) | RenderError::MissingProgram(_)
        )
    }
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ModelHandle;

    #[test]
    fn test_unknown_model_names_handle() {
        let handle = ModelHandle::from_raw(42);
        let err = RenderError::from(StrataError::UnknownModel(handle));
        assert!(err.to_string().contains("#42"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(RenderError::SourceNotReady("ssao".into()).is_transient());
        assert!(RenderError::MissingProgram(Program::Blit).is_transient());
        assert!(!RenderError::DrawFailed("oom".into()).is_transient());
        assert!(!RenderError::UnknownTarget(TargetId(3)).is_transient());
    }
}
