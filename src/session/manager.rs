//! Fixed-size table of client sessions
//!
//! Transactions run as spawned tasks; the caller gets the join handle and
//! may await it or let it run in the background. A session's slot is
//! freed as soon as its transaction ends.

use crate::config::ClientConfig;
use crate::session::client::ClientSession;
use crate::session::error::{SessionError, SessionResult};
use crate::session::types::{SessionInfo, SessionStatus, TransferReport};
use crate::sync::SyncEngine;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

enum Slot {
    /// Connected, no transaction yet
    Idle(ClientSession),
    /// Connecting or running a transaction
    Busy(SessionInfo),
}

impl Slot {
    fn info(&self) -> SessionInfo {
        match self {
            Slot::Idle(session) => session.info(),
            Slot::Busy(info) => info.clone(),
        }
    }
}

type SlotTable = Arc<Mutex<Vec<Option<Slot>>>>;

/// Frees a slot when dropped, including when the owning task is aborted
struct SlotRelease {
    slots: SlotTable,
    id: usize,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.slots.lock()[self.id] = None;
    }
}

pub struct SessionManager {
    engine: Arc<SyncEngine>,
    slots: SlotTable,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> SessionResult<Self> {
        config.validate()?;
        let engine = Arc::new(SyncEngine::new(config.sync)?);
        Ok(Self::with_engine(config.max_sessions, engine))
    }

    pub fn with_engine(max_sessions: usize, engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            slots: Arc::new(Mutex::new((0..max_sessions).map(|_| None).collect())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Occupied slots, connected or busy
    pub fn active(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Open a session in the lowest free slot and return its id
    pub async fn connect(&self, endpoint: SocketAddr) -> SessionResult<usize> {
        let id = {
            let mut slots = self.slots.lock();
            let id = slots
                .iter()
                .position(Option::is_none)
                .ok_or(SessionError::SessionLimitReached(slots.len()))?;

            // Hold the slot while connecting
            slots[id] = Some(Slot::Busy(SessionInfo {
                id,
                endpoint,
                status: SessionStatus::Busy,
            }));
            id
        };

        match ClientSession::connect(id, endpoint, self.engine.clone()).await {
            Ok(session) => {
                self.slots.lock()[id] = Some(Slot::Idle(session));
                Ok(id)
            }
            Err(e) => {
                self.slots.lock()[id] = None;
                Err(e)
            }
        }
    }

    /// Start pushing `local` to `remote` on session `id`
    pub fn push(
        &self,
        id: usize,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
    ) -> SessionResult<JoinHandle<SessionResult<TransferReport>>> {
        let session = self.checkout(id)?;
        let (local, remote) = (local.into(), remote.into());

        Ok(self.spawn_transaction(id, async move { session.push(&local, &remote).await }))
    }

    /// Start pulling `remote` into `local` on session `id`
    pub fn pull(
        &self,
        id: usize,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
    ) -> SessionResult<JoinHandle<SessionResult<TransferReport>>> {
        let session = self.checkout(id)?;
        let (local, remote) = (local.into(), remote.into());

        Ok(self.spawn_transaction(id, async move { session.pull(&local, &remote).await }))
    }

    /// Close an idle session and free its slot
    pub async fn disconnect(&self, id: usize) -> SessionResult<()> {
        let mut session = {
            let mut slots = self.slots.lock();
            match slots.get_mut(id) {
                None | Some(None) => return Err(SessionError::InvalidSession(id)),
                Some(Some(Slot::Busy(_))) => return Err(SessionError::SessionBusy(id)),
                Some(slot) => match slot.take() {
                    Some(Slot::Idle(session)) => session,
                    _ => return Err(SessionError::InvalidSession(id)),
                },
            }
        };

        session.close().await
    }

    /// Snapshot of every occupied slot, ordered by id
    pub fn list(&self) -> Vec<SessionInfo> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .map(Slot::info)
            .collect()
    }

    /// Take an idle session out of its slot, leaving the slot marked busy
    fn checkout(&self, id: usize) -> SessionResult<ClientSession> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(id).ok_or(SessionError::InvalidSession(id))?;

        match slot.take() {
            Some(Slot::Idle(session)) => {
                let mut info = session.info();
                info.status = SessionStatus::Busy;
                *slot = Some(Slot::Busy(info));
                Ok(session)
            }
            Some(busy @ Slot::Busy(_)) => {
                *slot = Some(busy);
                Err(SessionError::SessionBusy(id))
            }
            None => Err(SessionError::InvalidSession(id)),
        }
    }

    fn spawn_transaction<F>(&self, id: usize, transaction: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future<Output = SessionResult<TransferReport>> + Send + 'static,
    {
        // Built outside the task so an abort before the first poll still frees it
        let release = SlotRelease {
            slots: self.slots.clone(),
            id,
        };

        tokio::spawn(async move {
            let _release = release;
            let result = transaction.await;
            if let Err(e) = &result {
                tracing::warn!(session = id, error = %e, "transaction failed");
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use tokio::net::TcpListener;

    fn manager(max_sessions: usize) -> SessionManager {
        SessionManager::new(ClientConfig {
            max_sessions,
            sync: SyncConfig {
                block_size: 4,
                chunk_size: 16,
                worker_threads: 1,
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_slot_limit_and_reuse() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let manager = manager(2);

        assert_eq!(manager.connect(addr).await.unwrap(), 0);
        assert_eq!(manager.connect(addr).await.unwrap(), 1);
        assert!(matches!(
            manager.connect(addr).await,
            Err(SessionError::SessionLimitReached(2))
        ));

        manager.disconnect(0).await.unwrap();
        assert_eq!(manager.active(), 1);

        // Lowest free slot is handed out again
        assert_eq!(manager.connect(addr).await.unwrap(), 0);

        let listed = manager.list();
        assert_eq!(listed.len(), 2);
        assert!(listed
            .iter()
            .all(|info| info.status == SessionStatus::Connected));
    }

    #[tokio::test]
    async fn test_invalid_ids() {
        let manager = manager(3);

        assert!(matches!(
            manager.disconnect(1).await,
            Err(SessionError::InvalidSession(1))
        ));
        assert!(matches!(
            manager.push(7, "a", "b"),
            Err(SessionError::InvalidSession(7))
        ));
        assert!(matches!(
            manager.pull(0, "a", "b"),
            Err(SessionError::InvalidSession(0))
        ));
    }

    #[tokio::test]
    async fn test_failed_connect_frees_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let manager = manager(1);
        assert!(manager.connect(addr).await.is_err());
        assert_eq!(manager.active(), 0);
        assert_eq!(manager.capacity(), 1);
    }

    #[tokio::test]
    async fn test_slot_freed_after_transaction() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Peer that hangs up straight away
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let manager = manager(1);
        let id = manager.connect(addr).await.unwrap();
        let handle = manager.push(id, "local", "remote").unwrap();

        assert!(matches!(
            manager.push(id, "local", "remote"),
            Err(SessionError::SessionBusy(0)) | Err(SessionError::InvalidSession(0))
        ));

        assert!(handle.await.unwrap().is_err());
        assert_eq!(manager.active(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_aborted_transaction_frees_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Peer that accepts and never answers, so the push stalls
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let manager = manager(1);
        let id = manager.connect(addr).await.unwrap();
        let handle = manager.push(id, "local", "remote").unwrap();
        assert_eq!(manager.active(), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(manager.active(), 0);

        // The single slot is usable again
        assert_eq!(manager.connect(addr).await.unwrap(), 0);
        assert_eq!(manager.list().len(), 1);
        println!("✓ Aborted transaction released slot {}", id);

        server.abort();
    }
}
