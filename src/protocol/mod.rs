//! Wire protocol between sync client and server
//!
//! Every integer is big-endian and every variable-length field carries a
//! length prefix, so a stream of messages parses without delimiters. The
//! only unprefixed frame is the 5-byte command that opens a session.

pub mod codec;
pub mod error;
pub mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use types::{Command, StatusMessage};
