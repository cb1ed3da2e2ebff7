//! Binary framing for paths, status messages, block indexes and deltas
//!
//! Writers encode a whole message into one buffer, send it and flush.
//! Readers pull fields straight off the stream; any short read fails the
//! message with [`ProtocolError::ConnectionClosed`].

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::{Command, StatusMessage};
use crate::sync::signature::STRONG_HASH_BYTES;
use crate::sync::{BlockInfo, DeltaInstruction};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Instruction tag for [`DeltaInstruction::Copy`]
pub const COPY_TAG: u8 = 0;

/// Instruction tag for [`DeltaInstruction::Insert`]
pub const INSERT_TAG: u8 = 1;

/// Encoded size of one block entry: offset, weak hash, hex length, hex digest
const BLOCK_INFO_WIRE_LEN: usize = 8 + 4 + 4 + 2 * STRONG_HASH_BYTES;

/// Upper bound on capacity reserved from an untrusted length or count
const MAX_PREALLOC: usize = 64 * 1024;

// ============== Encoding ==============

fn put_len(buf: &mut BytesMut, field: &'static str, len: usize) -> ProtocolResult<()> {
    let len32 = u32::try_from(len).map_err(|_| ProtocolError::TooLarge { field, len })?;
    buf.put_u32(len32);
    Ok(())
}

pub fn encode_path(buf: &mut BytesMut, path: &str) -> ProtocolResult<()> {
    put_len(buf, "path", path.len())?;
    buf.put_slice(path.as_bytes());
    Ok(())
}

pub fn encode_status(buf: &mut BytesMut, status: &StatusMessage) -> ProtocolResult<()> {
    buf.put_u8(u8::from(status.ok));
    put_len(buf, "status text", status.text.len())?;
    buf.put_slice(status.text.as_bytes());
    Ok(())
}

pub fn encode_block_infos(buf: &mut BytesMut, blocks: &[BlockInfo]) -> ProtocolResult<()> {
    put_len(buf, "block list", blocks.len())?;
    for block in blocks {
        buf.put_u64(block.offset);
        buf.put_u32(block.weak_hash);
        put_len(buf, "strong hash", block.strong_hash.len())?;
        buf.put_slice(block.strong_hash.as_bytes());
    }
    Ok(())
}

pub fn encode_instructions(
    buf: &mut BytesMut,
    instructions: &[DeltaInstruction],
) -> ProtocolResult<()> {
    put_len(buf, "instruction list", instructions.len())?;
    for instr in instructions {
        match instr {
            DeltaInstruction::Copy { offset } => {
                buf.put_u8(COPY_TAG);
                buf.put_u64(*offset);
            }
            DeltaInstruction::Insert { data } => {
                buf.put_u8(INSERT_TAG);
                put_len(buf, "insert data", data.len())?;
                buf.put_slice(data);
            }
        }
    }
    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, buf: BytesMut) -> ProtocolResult<()> {
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: Command,
) -> ProtocolResult<()> {
    writer.write_all(command.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_path<W: AsyncWrite + Unpin>(writer: &mut W, path: &str) -> ProtocolResult<()> {
    let mut buf = BytesMut::with_capacity(4 + path.len());
    encode_path(&mut buf, path)?;
    send(writer, buf).await
}

pub async fn write_status<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: &StatusMessage,
) -> ProtocolResult<()> {
    let mut buf = BytesMut::with_capacity(5 + status.text.len());
    encode_status(&mut buf, status)?;
    send(writer, buf).await
}

pub async fn write_block_infos<W: AsyncWrite + Unpin>(
    writer: &mut W,
    blocks: &[BlockInfo],
) -> ProtocolResult<()> {
    let mut buf = BytesMut::with_capacity(4 + blocks.len() * BLOCK_INFO_WIRE_LEN);
    encode_block_infos(&mut buf, blocks)?;
    send(writer, buf).await
}

pub async fn write_instructions<W: AsyncWrite + Unpin>(
    writer: &mut W,
    instructions: &[DeltaInstruction],
) -> ProtocolResult<()> {
    let mut buf = BytesMut::new();
    encode_instructions(&mut buf, instructions)?;
    send(writer, buf).await
}

// ============== Decoding ==============

async fn read_bytes<R: AsyncRead + Unpin>(reader: &mut R, len: u32) -> ProtocolResult<Vec<u8>> {
    let mut data = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
    let read = (&mut *reader).take(len as u64).read_to_end(&mut data).await?;
    if read != len as usize {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(data)
}

async fn read_string<R: AsyncRead + Unpin>(
    reader: &mut R,
    field: &'static str,
) -> ProtocolResult<String> {
    let len = reader.read_u32().await?;
    let bytes = read_bytes(reader, len).await?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8(field))
}

pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Command> {
    let mut raw = [0u8; Command::WIRE_LEN];
    reader.read_exact(&mut raw).await?;
    Command::from_bytes(&raw)
}

pub async fn read_path<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<String> {
    read_string(reader, "path").await
}

pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<StatusMessage> {
    let ok = match reader.read_u8().await? {
        0 => false,
        1 => true,
        other => return Err(ProtocolError::InvalidStatus(other)),
    };
    let text = read_string(reader, "status text").await?;
    Ok(StatusMessage { ok, text })
}

pub async fn read_block_infos<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> ProtocolResult<Vec<BlockInfo>> {
    let count = reader.read_u32().await? as usize;
    let mut blocks = Vec::with_capacity(count.min(MAX_PREALLOC));

    for _ in 0..count {
        let offset = reader.read_u64().await?;
        let weak_hash = reader.read_u32().await?;
        let strong_hash = read_string(reader, "strong hash").await?;

        blocks.push(BlockInfo {
            offset,
            weak_hash,
            strong_hash,
        });
    }

    Ok(blocks)
}

pub async fn read_instructions<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> ProtocolResult<Vec<DeltaInstruction>> {
    let count = reader.read_u32().await? as usize;
    let mut instructions = Vec::with_capacity(count.min(MAX_PREALLOC));

    for _ in 0..count {
        let instr = match reader.read_u8().await? {
            COPY_TAG => DeltaInstruction::Copy {
                offset: reader.read_u64().await?,
            },
            INSERT_TAG => {
                let len = reader.read_u32().await?;
                DeltaInstruction::Insert {
                    data: read_bytes(reader, len).await?,
                }
            }
            other => return Err(ProtocolError::UnknownInstruction(other)),
        };
        instructions.push(instr);
    }

    Ok(instructions)
}
