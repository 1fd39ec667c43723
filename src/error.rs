use thiserror::Error;

/// Errors returned by the public entry points of the engine.
///
/// Configuration problems are not errors: they are clamped and logged by
/// `PipelineConfig::sanitized`. Duplicate zone ids are logged as warnings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VisionError {
    /// The caller handed over a frame without any pixel data.
    #[error("frame contains no pixel data")]
    EmptyFrame,

    /// Width or height is zero.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The pixel buffer does not hold exactly `width * height` RGBA pixels.
    #[error("frame buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGBA frame")]
    BufferSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The task owning the pipeline has stopped.
    #[error("pipeline task is no longer running")]
    PipelineClosed,
}

impl VisionError {
    /// True for the errors caused by a malformed input frame. No engine state
    /// is mutated when one of these is returned.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            VisionError::EmptyFrame
                | VisionError::InvalidDimensions { .. }
                | VisionError::BufferSizeMismatch { .. }
        )
    }
}
