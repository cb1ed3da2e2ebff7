//! Configuration values consumed by the sync core
//!
//! The library never reads files or the environment on its own; the
//! binaries deserialize these structs and hand them in explicitly.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Default block length used for matching (128 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Default byte range scanned by one parallel delta task (128 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024 * 1024;

/// Default number of concurrent sessions on either side
pub const DEFAULT_MAX_SESSIONS: usize = 3;

/// Default server port
pub const DEFAULT_PORT: u16 = 9876;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Block size must be greater than zero")]
    ZeroBlockSize,

    #[error("Chunk size {chunk_size} is smaller than block size {block_size}")]
    ChunkSmallerThanBlock { chunk_size: usize, block_size: usize },

    #[error("Worker thread count must be greater than zero")]
    ZeroWorkers,

    #[error("Session capacity must be greater than zero")]
    ZeroSessions,
}

/// Tuning shared by both endpoints of a transfer.
///
/// `block_size` must be identical on both ends or no block will ever match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub block_size: usize,
    pub chunk_size: usize,
    pub worker_threads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_threads: num_cpus::get(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.chunk_size < self.block_size {
            return Err(ConfigError::ChunkSmallerThanBlock {
                chunk_size: self.chunk_size,
                block_size: self.block_size,
            });
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_sessions: usize,
    /// When set, remote paths are resolved beneath this directory
    pub root: Option<PathBuf>,
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_sessions: DEFAULT_MAX_SESSIONS,
            root: None,
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::ZeroSessions);
        }
        self.sync.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub max_sessions: usize,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::ZeroSessions);
        }
        self.sync.validate()
    }
}
