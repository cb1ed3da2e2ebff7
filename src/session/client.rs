//! Client side of the push/pull transaction protocol

use crate::protocol::codec::{
    read_block_infos, read_instructions, read_status, write_block_infos, write_command,
    write_instructions, write_path,
};
use crate::protocol::Command;
use crate::session::error::{SessionError, SessionResult};
use crate::session::types::{SessionInfo, SessionStatus, TransferReport};
use crate::sync::{DeltaStats, SyncEngine};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// One connection to a sync server, good for exactly one transaction
pub struct ClientSession {
    id: usize,
    endpoint: SocketAddr,
    stream: Option<BufStream<TcpStream>>,
    engine: Arc<SyncEngine>,
}

impl ClientSession {
    pub async fn connect(
        id: usize,
        endpoint: SocketAddr,
        engine: Arc<SyncEngine>,
    ) -> SessionResult<Self> {
        let socket = TcpStream::connect(endpoint)
            .await
            .map_err(|source| SessionError::Connect {
                addr: endpoint,
                source,
            })?;
        socket.set_nodelay(true)?;

        tracing::info!(session = id, %endpoint, "connected");

        Ok(Self {
            id,
            endpoint,
            stream: Some(BufStream::new(socket)),
            engine,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            endpoint: self.endpoint,
            status: if self.is_connected() {
                SessionStatus::Connected
            } else {
                SessionStatus::Disconnected
            },
        }
    }

    /// Overwrite `remote` on the server with the content of `local`
    pub async fn push(mut self, local: &Path, remote: &str) -> SessionResult<TransferReport> {
        let started = Instant::now();
        let mut stream = self.take_stream()?;

        write_command(&mut stream, Command::Push).await?;
        self.expect_ok(&mut stream).await?;

        write_path(&mut stream, remote).await?;
        self.expect_ok(&mut stream).await?; // path accepted, indexing
        self.expect_ok(&mut stream).await?; // index built

        let blocks = read_block_infos(&mut stream).await?;
        tracing::debug!(session = self.id, blocks = blocks.len(), "remote index received");

        let instructions = self.engine.compute_delta(local, &blocks).await?;
        let stats = DeltaStats::from_instructions(&instructions, self.engine.block_size());
        write_instructions(&mut stream, &instructions).await?;

        self.expect_ok(&mut stream).await?; // delta received
        self.expect_ok(&mut stream).await?; // delta applied

        self.finish(stream, Command::Push, local, remote, blocks.len(), stats, started)
            .await
    }

    /// Overwrite `local` with the content of `remote` on the server
    pub async fn pull(mut self, local: &Path, remote: &str) -> SessionResult<TransferReport> {
        let started = Instant::now();
        let mut stream = self.take_stream()?;

        write_command(&mut stream, Command::Pull).await?;
        self.expect_ok(&mut stream).await?;

        write_path(&mut stream, remote).await?;
        self.expect_ok(&mut stream).await?;

        let blocks = self.engine.build_index(local).await?;
        write_block_infos(&mut stream, &blocks).await?;

        self.expect_ok(&mut stream).await?; // index received
        self.expect_ok(&mut stream).await?; // delta generated

        let instructions = read_instructions(&mut stream).await?;
        let stats = DeltaStats::from_instructions(&instructions, self.engine.block_size());
        self.engine.apply_delta(local, instructions).await?;

        self.finish(stream, Command::Pull, local, remote, blocks.len(), stats, started)
            .await
    }

    /// Shut the connection down without running a transaction
    pub async fn close(&mut self) -> SessionResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            tracing::info!(session = self.id, "connection closed");
        }
        Ok(())
    }

    fn take_stream(&mut self) -> SessionResult<BufStream<TcpStream>> {
        self.stream.take().ok_or(SessionError::NotConnected(self.id))
    }

    /// Read the server's status for the current step; `ok=false` ends the
    /// transaction
    async fn expect_ok<S: AsyncRead + Unpin>(&self, stream: &mut S) -> SessionResult<()> {
        let status = read_status(stream).await?;
        tracing::debug!(session = self.id, ok = status.ok, text = %status.text, "server status");

        if status.ok {
            Ok(())
        } else {
            Err(SessionError::Remote(status.text))
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        mut stream: BufStream<TcpStream>,
        command: Command,
        local: &Path,
        remote: &str,
        blocks: usize,
        stats: DeltaStats,
        started: Instant,
    ) -> SessionResult<TransferReport> {
        // The server closes first; a failed shutdown changes nothing
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(session = self.id, error = %e, "shutdown after transaction");
        }

        let report = TransferReport {
            session_id: self.id,
            command,
            local_path: local.to_path_buf(),
            remote_path: remote.to_string(),
            blocks,
            stats,
            duration: started.elapsed(),
        };
        tracing::info!(session = self.id, %report, "transaction complete");

        Ok(report)
    }
}
