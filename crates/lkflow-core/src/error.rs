use thiserror::Error;

/// Errors raised by the flow core. Per-point tracking failures are never
/// reported here; they travel as a [`crate::track::TrackOutcome`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    #[error("frame {width}x{height} is too small for a {levels}-level pyramid")]
    InvalidDimensions {
        width: u32,
        height: u32,
        levels: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("pyramid mismatch: {0}")]
    PyramidMismatch(String),

    #[error("frame buffer holds {actual} samples, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FlowError>;
