use crate::protocol::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Transaction direction, sent as the first frame of every session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Client's local file overwrites the server's file
    Push,
    /// Server's file overwrites the client's local file
    Pull,
}

impl Command {
    /// Four-letter opcode plus newline
    pub const WIRE_LEN: usize = 5;

    pub fn as_bytes(&self) -> &'static [u8; Self::WIRE_LEN] {
        match self {
            Command::Push => b"PUSH\n",
            Command::Pull => b"PULL\n",
        }
    }

    pub fn from_bytes(raw: &[u8; Self::WIRE_LEN]) -> ProtocolResult<Self> {
        match raw {
            b"PUSH\n" => Ok(Command::Push),
            b"PULL\n" => Ok(Command::Pull),
            other => Err(ProtocolError::UnknownCommand(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Push => "PUSH",
            Command::Pull => "PULL",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one protocol step, mirrored to the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub ok: bool,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.ok { "ok" } else { "failed" };
        write!(f, "[{}] {}", tag, self.text)
    }
}
