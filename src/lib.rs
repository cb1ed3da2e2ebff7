//! Delta file synchronization over TCP
//!
//! A receiver indexes its copy of a file into fixed-size blocks; the sender
//! scans its own copy with a rolling checksum and answers with a delta of
//! block copies and literal bytes. [`session`] carries that exchange over
//! the network as push and pull transactions.

pub mod config;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod sync;

pub use config::{ClientConfig, ServerConfig, SyncConfig};
pub use session::{ClientSession, SessionError, SessionManager, SyncServer, TransferReport};
pub use sync::{DeltaInstruction, SyncEngine, SyncError};
