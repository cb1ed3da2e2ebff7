//! Push and pull transactions over TCP
//!
//! [`SyncServer`] accepts a bounded number of concurrent sessions and
//! serves files from its filesystem. [`ClientSession`] drives one
//! transaction from the client side; [`SessionManager`] holds several of
//! them at once.

pub mod client;
pub mod error;
pub mod manager;
pub mod server;
pub mod types;

pub use client::ClientSession;
pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use server::SyncServer;
pub use types::{SessionInfo, SessionStatus, TransferReport};
