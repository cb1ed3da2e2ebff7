use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Connection error: {0}")]
    Connection(#[source] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("Unknown delta instruction type: {0}")]
    UnknownInstruction(u8),

    #[error("Invalid status byte: {0}")]
    InvalidStatus(u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("{field} too large to encode: {len} bytes")]
    TooLarge { field: &'static str, len: usize },
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Connection(err),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
