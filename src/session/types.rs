use crate::protocol::Command;
use crate::sync::DeltaStats;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    /// Connected and waiting for a transaction
    Connected,
    /// A push or pull is in flight
    Busy,
    Disconnected,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionStatus::Disconnected)
    }

    fn label(&self) -> &'static str {
        match self {
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::Busy => "BUSY",
            SessionStatus::Disconnected => "DISCONNECTED",
        }
    }
}

/// Snapshot of one client session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: usize,
    pub endpoint: SocketAddr,
    pub status: SessionStatus,
}

impl std::fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Session {}] {} [{}]",
            self.id,
            self.endpoint,
            self.status.label()
        )
    }
}

/// Outcome of a finished client transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub session_id: usize,
    pub command: Command,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Blocks in the receiver's index
    pub blocks: usize,
    pub stats: DeltaStats,
    pub duration: Duration,
}

impl std::fmt::Display for TransferReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (from, to) = match self.command {
            Command::Push => (self.local_path.display().to_string(), self.remote_path.clone()),
            Command::Pull => (self.remote_path.clone(), self.local_path.display().to_string()),
        };
        write!(
            f,
            "[Session {}] {} {} -> {} in {:.2?} ({})",
            self.session_id, self.command, from, to, self.duration, self.stats
        )
    }
}
