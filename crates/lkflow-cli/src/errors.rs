use lkflow_engine::EngineError;
use thiserror::Error;

/// Errors that can occur while processing an image sequence
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Algorithm {0} not recognized.")]
    UnknownAlgorithm(String),

    #[error("Algorithm {0} is recognized but not supported by this build.")]
    UnsupportedAlgorithm(String),

    #[error("Input directory not found: {0}")]
    InputNotFound(String),

    #[error("No frames found in {0}")]
    NoFrames(String),

    #[error("Failed to decode image {path}: {source}")]
    ImageDecoding {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Frame {path} is {width}x{height}, expected {expected_width}x{expected_height}")]
    FrameSizeChanged {
        path: String,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("Failed to write image: {0}")]
    ImageEncoding(#[from] image::ImageError),

    #[error("Engine processing error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
