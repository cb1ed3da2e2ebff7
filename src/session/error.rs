use crate::config::ConfigError;
use crate::protocol::ProtocolError;
use crate::sync::SyncError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server reported failure: {0}")]
    Remote(String),

    #[error("Session limit reached ({0} sessions)")]
    SessionLimitReached(usize),

    #[error("No session with id {0}")]
    InvalidSession(usize),

    #[error("Session {0} is busy with a transfer")]
    SessionBusy(usize),

    #[error("Session {0} is not connected")]
    NotConnected(usize),

    #[error("Refusing path outside the served root: {0}")]
    InvalidPath(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
