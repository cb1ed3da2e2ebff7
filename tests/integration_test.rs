use deltasync::config::{ServerConfig, SyncConfig};
use deltasync::protocol::codec::read_status;
use deltasync::protocol::Command;
use deltasync::session::{ClientSession, SessionError, SessionManager, SyncServer};
use deltasync::SyncEngine;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

fn sync_config() -> SyncConfig {
    SyncConfig {
        block_size: 64,
        chunk_size: 1024,
        worker_threads: 2,
    }
}

fn engine() -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(sync_config()).unwrap())
}

async fn start_server(root: Option<PathBuf>, max_sessions: usize) -> SocketAddr {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_sessions,
        root,
        sync: sync_config(),
    };

    let server = SyncServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Push overwrites the server's file, sending only what changed
#[tokio::test]
async fn test_push_end_to_end() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("local.bin");
    let remote = temp.path().join("remote.bin");

    let original = random_bytes(1, 64 * 40);
    let mut modified = original.clone();
    modified[64 * 10..64 * 11].copy_from_slice(&[0xAB; 64]);
    modified.extend_from_slice(b"trailing bytes");

    std::fs::write(&local, &modified).unwrap();
    std::fs::write(&remote, &original).unwrap();

    let addr = start_server(None, 3).await;
    let session = ClientSession::connect(0, addr, engine()).await.unwrap();
    let report = session.push(&local, path_str(&remote)).await.unwrap();

    println!("✓ {}", report);
    assert_eq!(std::fs::read(&remote).unwrap(), modified);
    assert_eq!(report.command, Command::Push);
    assert_eq!(report.blocks, 40);
    assert_eq!(report.stats.copy_operations, 39);
    assert_eq!(report.stats.literal_bytes, 64 + 14);
}

/// Pull overwrites the local file with the server's
#[tokio::test]
async fn test_pull_end_to_end() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("local.bin");
    let remote = temp.path().join("remote.bin");

    let original = random_bytes(2, 5000);
    let mut modified = original.clone();
    // Insertion shifts everything after it
    modified.splice(1000..1000, b"inserted".iter().copied());
    modified.truncate(4000);

    std::fs::write(&local, &original).unwrap();
    std::fs::write(&remote, &modified).unwrap();

    let addr = start_server(None, 3).await;
    let session = ClientSession::connect(0, addr, engine()).await.unwrap();
    let report = session.pull(&local, path_str(&remote)).await.unwrap();

    println!("✓ {}", report);
    assert_eq!(std::fs::read(&local).unwrap(), modified);
    assert!(report.stats.copy_operations > 0);
    assert!(report.stats.literal_bytes < modified.len() as u64);
}

/// A pull into an identical file moves no literal data
#[tokio::test]
async fn test_pull_unchanged_file() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("local.bin");
    let remote = temp.path().join("remote.bin");

    let data = random_bytes(3, 64 * 16);
    std::fs::write(&local, &data).unwrap();
    std::fs::write(&remote, &data).unwrap();

    let addr = start_server(None, 3).await;
    let session = ClientSession::connect(0, addr, engine()).await.unwrap();
    let report = session.pull(&local, path_str(&remote)).await.unwrap();

    assert_eq!(report.stats.literal_bytes, 0);
    assert_eq!(report.stats.copy_operations, 16);
    assert_eq!(std::fs::read(&local).unwrap(), data);
}

/// A failing step reaches the client as a status and the server carries on
#[tokio::test]
async fn test_push_to_missing_remote_reports_failure() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("local.bin");
    let remote = temp.path().join("remote.bin");
    std::fs::write(&local, b"content").unwrap();

    let addr = start_server(None, 3).await;

    let session = ClientSession::connect(0, addr, engine()).await.unwrap();
    let missing = temp.path().join("missing.bin");
    let result = session.push(&local, path_str(&missing)).await;

    match result {
        Err(SessionError::Remote(text)) => {
            println!("✓ Server reported: {}", text);
            assert!(text.contains("block hashes"));
        }
        other => panic!("expected remote failure, got {:?}", other.map(|r| r.to_string())),
    }
    assert!(!missing.exists());

    // Next session is unaffected
    std::fs::write(&remote, b"old").unwrap();
    let session = ClientSession::connect(1, addr, engine()).await.unwrap();
    session.push(&local, path_str(&remote)).await.unwrap();
    assert_eq!(std::fs::read(&remote).unwrap(), b"content");
}

#[tokio::test]
async fn test_unknown_command_gets_failure_status() {
    let addr = start_server(None, 3).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"SYNC\n").await.unwrap();

    let status = read_status(&mut stream).await.unwrap();
    assert!(!status.ok);
    println!("✓ {}", status);

    // Short command: client hangs up after three bytes
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"PUS").await.unwrap();
    stream.shutdown().await.unwrap();

    let status = read_status(&mut stream).await.unwrap();
    assert!(!status.ok);
}

/// At capacity the next client waits instead of being refused
#[tokio::test]
async fn test_fourth_connection_waits_for_free_slot() {
    let addr = start_server(None, 3).await;

    // Three idle sessions occupy every slot
    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(TcpStream::connect(addr).await.unwrap());
    }

    let mut waiting = TcpStream::connect(addr).await.unwrap();
    waiting.write_all(b"PUSH\n").await.unwrap();

    let early = timeout(Duration::from_millis(300), read_status(&mut waiting)).await;
    assert!(early.is_err(), "fourth session served while at capacity");

    // Hanging up one idle client frees its slot
    drop(held.remove(0));

    let status = timeout(Duration::from_secs(5), read_status(&mut waiting))
        .await
        .expect("fourth session never served")
        .unwrap();
    assert!(status.ok);
    assert_eq!(status.text, "Starting the PUSH request");
}

#[tokio::test]
async fn test_root_confinement() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("served");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("inside.txt"), b"inside").unwrap();
    std::fs::write(temp.path().join("outside.txt"), b"secret").unwrap();

    let local = temp.path().join("local.txt");
    std::fs::write(&local, b"").unwrap();

    let addr = start_server(Some(root.clone()), 3).await;

    for refused in ["../outside.txt", path_str(&temp.path().join("outside.txt"))] {
        let session = ClientSession::connect(0, addr, engine()).await.unwrap();
        let result = session.pull(&local, refused).await;
        assert!(
            matches!(result, Err(SessionError::Remote(_))),
            "{refused} should be refused"
        );
    }
    assert!(std::fs::read(&local).unwrap().is_empty());

    let session = ClientSession::connect(0, addr, engine()).await.unwrap();
    session.pull(&local, "inside.txt").await.unwrap();
    assert_eq!(std::fs::read(&local).unwrap(), b"inside");
}

/// Several sessions from one manager run side by side
#[tokio::test]
async fn test_manager_runs_concurrent_transactions() {
    let temp = TempDir::new().unwrap();
    let addr = start_server(None, 3).await;
    let manager = SessionManager::with_engine(3, engine());

    // Fill every slot before any transaction can finish and free one
    let mut ids = Vec::new();
    for i in 0..3 {
        let id = manager.connect(addr).await.unwrap();
        assert_eq!(id, i);
        ids.push(id);
    }
    assert!(matches!(
        manager.connect(addr).await,
        Err(SessionError::SessionLimitReached(3))
    ));

    let mut handles = Vec::new();
    let mut expected = Vec::new();

    for id in ids {
        let local = temp.path().join(format!("local_{id}.bin"));
        let remote = temp.path().join(format!("remote_{id}.bin"));
        let content = random_bytes(10 + id as u64, 3000);
        std::fs::write(&local, &content).unwrap();
        std::fs::write(&remote, &content[..1500]).unwrap();

        handles.push(
            manager
                .push(id, local, path_str(&remote).to_string())
                .unwrap(),
        );
        expected.push((remote, content));
    }

    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        println!("✓ {}", report);
    }
    for (remote, content) in expected {
        assert_eq!(std::fs::read(&remote).unwrap(), content);
    }
    assert_eq!(manager.active(), 0);
}
