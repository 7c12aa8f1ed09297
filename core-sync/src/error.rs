use core_library::LibraryError;
use core_metadata::MetadataError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress for catalog {root}")]
    SyncInProgress { root: String },

    #[error("Directory error at {}: {message}", path.display())]
    Directory { path: PathBuf, message: String },

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    pub fn directory(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Directory {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Backup(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
