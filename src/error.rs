//! Error types shared across the capture, vision and storage layers

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or decoding a [`Frame`](crate::capture::frame::Frame)
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("RGBA buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Errors raised by the OCR engine or its lifecycle manager
#[derive(Error, Debug)]
pub enum EngineError {
    /// Engine could not be created. Terminal until the user retries.
    #[error("OCR engine initialization failed: {0}")]
    Initialization(String),

    /// A single inference call failed
    #[error("OCR inference failed: {0}")]
    Inference(String),

    /// The engine was swapped, or is being swapped, since the caller observed epoch
    #[error("Result against stale engine epoch {0}")]
    Stale(u64),

    #[error("OCR engine is not ready")]
    NotReady,

    #[error("OCR engine has been closed")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl EngineError {
    /// Whether this error only signals a discarded stale result
    pub fn is_stale(&self) -> bool {
        matches!(self, EngineError::Stale(_))
    }
}

/// Errors raised by the persistent gallery store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize OCR results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image id already present in gallery: {0}")]
    DuplicateId(String),

    #[error("Image id cannot be stored in the index: {0:?}")]
    InvalidId(String),

    #[error("Not a regular file: {0:?}")]
    NotAFile(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
