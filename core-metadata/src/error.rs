use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Frame extraction failed: {0}")]
    FrameExtraction(String),

    #[error("Invalid frame manifest: {0}")]
    Manifest(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl From<tokio::task::JoinError> for MetadataError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
