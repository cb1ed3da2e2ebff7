use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Copy offset {offset} is beyond the end of the destination ({file_size} bytes)")]
    CopyOutOfBounds { offset: u64, file_size: u64 },

    #[error("Failed to replace {}: {reason}", path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] crate::pool::PoolError),
}

impl SyncError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
