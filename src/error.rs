use std::path::PathBuf;

use thiserror::Error;

/// Failure to bring a model up. Fatal at pipeline start.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    MissingFile(PathBuf),
    #[error("failed to load model graph from {path}: {reason}")]
    CorruptGraph { path: PathBuf, reason: String },
    #[error("model has no layer named '{0}'")]
    UnknownLayer(String),
    #[error("model needs at least one output layer")]
    NoOutputs,
}

/// Failure of a single inference call. The frame is dropped, the stream goes on.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("backend execution failed: {0}")]
    Backend(String),
    #[error("tensor shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("model backend has already been closed")]
    BackendClosed,
    #[error("failed to read image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("frame dimensions must be non-zero")]
    EmptyFrame,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
