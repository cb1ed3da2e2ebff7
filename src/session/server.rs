//! Server side of the push/pull transaction protocol
//!
//! Each fallible step is answered with a status message before anything
//! else is sent, so the client always learns which step failed.

use crate::config::ServerConfig;
use crate::metrics::{record_session_failed, SessionMetrics};
use crate::protocol::codec::{
    read_block_infos, read_command, read_instructions, read_path, write_block_infos,
    write_instructions, write_status,
};
use crate::protocol::{Command, StatusMessage};
use crate::session::error::{SessionError, SessionResult};
use crate::sync::SyncEngine;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::Instrument;

/// State shared by every connection task
struct ServerContext {
    engine: Arc<SyncEngine>,
    root: Option<PathBuf>,
}

pub struct SyncServer {
    listener: TcpListener,
    config: ServerConfig,
    context: Arc<ServerContext>,
    sessions: Arc<Semaphore>,
    next_session: AtomicU64,
}

impl SyncServer {
    /// Bind the listening socket with a fresh engine built from `config.sync`
    pub async fn bind(config: ServerConfig) -> SessionResult<Self> {
        config.validate()?;
        let engine = Arc::new(SyncEngine::new(config.sync.clone())?);
        Self::bind_with_engine(config, engine).await
    }

    /// Bind the listening socket, sharing an existing engine
    pub async fn bind_with_engine(
        config: ServerConfig,
        engine: Arc<SyncEngine>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr).await?;

        tracing::info!(
            addr = %listener.local_addr()?,
            max_sessions = config.max_sessions,
            block_size = engine.block_size(),
            "sync server listening"
        );

        Ok(Self {
            listener,
            sessions: Arc::new(Semaphore::new(config.max_sessions)),
            context: Arc::new(ServerContext {
                engine,
                root: config.root.clone(),
            }),
            config,
            next_session: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Sessions currently being served
    pub fn active_sessions(&self) -> usize {
        self.config.max_sessions - self.sessions.available_permits()
    }

    /// Accept and serve connections until the task is dropped
    ///
    /// A slot is reserved before accepting, so at capacity further clients
    /// wait in the listen backlog instead of being refused.
    pub async fn serve(self) -> SessionResult<()> {
        loop {
            let Ok(permit) = self.sessions.clone().acquire_owned().await else {
                // Semaphore closed
                return Ok(());
            };

            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let id = self.next_session.fetch_add(1, Ordering::Relaxed);
            let context = self.context.clone();
            let span = tracing::info_span!("session", id, %peer);

            tokio::spawn(
                async move {
                    tracing::info!("connection accepted");
                    if let Err(e) = context.handle_connection(socket).await {
                        tracing::warn!(error = %e, "session failed");
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }
    }
}

impl ServerContext {
    async fn handle_connection(&self, socket: TcpStream) -> SessionResult<()> {
        socket.set_nodelay(true)?;
        let mut stream = BufStream::new(socket);

        let command = match read_command(&mut stream).await {
            Ok(command) => command,
            Err(e) => {
                record_session_failed(None);
                send_failure(&mut stream, format!("Failed to read 5-byte command: {e}")).await;
                return Err(e.into());
            }
        };

        let metrics = SessionMetrics::start(command);
        let status = StatusMessage::success(format!("Starting the {command} request"));
        write_status(&mut stream, &status).await?;

        match command {
            Command::Push => self.serve_push(&mut stream).await?,
            Command::Pull => self.serve_pull(&mut stream).await?,
        }

        tracing::info!(%command, elapsed = ?metrics.elapsed(), "session complete");
        metrics.complete();
        Ok(())
    }

    /// Client's file overwrites ours: send our index, apply their delta
    async fn serve_push<S>(&self, stream: &mut S) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let requested = self.receive_path(stream).await;
        let path = step(
            stream,
            requested,
            "Generating block hashes for remote file...",
            "Error while receiving remote path",
        )
        .await?;

        let indexed = self.engine.build_index(&path).await;
        let blocks = step(
            stream,
            indexed,
            "Block hashes for remote file generated, sending them over the channel",
            "Error while generating block hashes for remote file",
        )
        .await?;
        write_block_infos(stream, &blocks).await?;
        tracing::debug!(path = %path.display(), blocks = blocks.len(), "index sent");

        let received = read_instructions(stream).await;
        let instructions = step(
            stream,
            received,
            "Received delta instructions successfully",
            "Error while receiving delta instructions",
        )
        .await?;
        let count = instructions.len();

        let applied = self.engine.apply_delta(&path, instructions).await;
        let size = step(
            stream,
            applied,
            "Push request performed successfully",
            "Error while applying delta",
        )
        .await?;

        tracing::info!(
            path = %path.display(),
            instructions = count,
            bytes = size,
            "push applied"
        );
        Ok(())
    }

    /// Our file overwrites the client's: take their index, send a delta
    async fn serve_pull<S>(&self, stream: &mut S) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let requested = self.receive_path(stream).await;
        let path = step(
            stream,
            requested,
            "Received the remote file path",
            "Error while receiving remote path",
        )
        .await?;

        let received = read_block_infos(stream).await;
        let blocks = step(
            stream,
            received,
            "Block hashes received, generating delta instructions...",
            "Error while receiving block hashes",
        )
        .await?;

        let computed = self.engine.compute_delta(&path, &blocks).await;
        let instructions = step(
            stream,
            computed,
            "Delta instructions generated, sending them over the channel",
            "Error while generating delta",
        )
        .await?;
        write_instructions(stream, &instructions).await?;

        tracing::info!(
            path = %path.display(),
            blocks = blocks.len(),
            instructions = instructions.len(),
            "pull delta sent"
        );
        Ok(())
    }

    async fn receive_path<S>(&self, stream: &mut S) -> SessionResult<PathBuf>
    where
        S: AsyncRead + Unpin,
    {
        let remote = read_path(stream).await?;
        tracing::debug!(path = %remote, "remote path received");
        resolve_path(self.root.as_deref(), &remote)
    }
}

/// Map a client-supplied path onto the local filesystem.
///
/// With a root configured, only relative paths without `..` are served.
fn resolve_path(root: Option<&Path>, remote: &str) -> SessionResult<PathBuf> {
    let requested = Path::new(remote);
    let Some(root) = root else {
        return Ok(requested.to_path_buf());
    };

    let confined = requested
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if remote.is_empty() || !confined {
        return Err(SessionError::InvalidPath(remote.to_string()));
    }

    Ok(root.join(requested))
}

/// Report the outcome of one protocol step to the client.
///
/// On failure the status is best effort; the step's own error is returned
/// either way.
async fn step<S, T, E>(
    stream: &mut S,
    result: Result<T, E>,
    success: &str,
    failure: &str,
) -> SessionResult<T>
where
    S: AsyncWrite + Unpin,
    E: Into<SessionError>,
{
    match result {
        Ok(value) => {
            write_status(stream, &StatusMessage::success(success)).await?;
            Ok(value)
        }
        Err(e) => {
            let err: SessionError = e.into();
            send_failure(stream, format!("{failure}: {err}")).await;
            Err(err)
        }
    }
}

async fn send_failure<S: AsyncWrite + Unpin>(stream: &mut S, text: String) {
    if let Err(e) = write_status(stream, &StatusMessage::failure(text)).await {
        tracing::debug!(error = %e, "could not report failure to client");
    }
}
