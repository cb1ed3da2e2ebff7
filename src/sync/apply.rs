//! Delta application
//!
//! Rebuilds a file from its current content plus a delta, writing into a
//! temporary file beside the destination and renaming it over the original
//! in a single step. Readers see either the old file or the new one, never
//! a missing or half-written destination.

use crate::sync::delta::DeltaInstruction;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::signature::read_up_to;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Replays delta instructions against a destination file
#[derive(Debug, Clone)]
pub struct DeltaApplier {
    block_size: usize,
}

impl DeltaApplier {
    pub fn new(block_size: usize) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::InvalidBlockSize(block_size));
        }
        Ok(Self { block_size })
    }

    /// Rewrite `destination` by applying `instructions` to its current
    /// content. Returns the size of the new file.
    ///
    /// On error the destination is left untouched and the temporary file
    /// is removed.
    pub fn apply(&self, destination: &Path, instructions: &[DeltaInstruction]) -> SyncResult<u64> {
        let mut original = File::open(destination).map_err(|e| SyncError::io(destination, e))?;
        let metadata = original
            .metadata()
            .map_err(|e| SyncError::io(destination, e))?;
        let original_len = metadata.len();

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir).map_err(|e| SyncError::io(dir, e))?;

        let mut writer = BufWriter::new(temp);
        let mut buffer = vec![0u8; self.block_size];
        let mut written = 0u64;

        for instr in instructions {
            match instr {
                DeltaInstruction::Copy { offset } => {
                    if *offset >= original_len {
                        return Err(SyncError::CopyOutOfBounds {
                            offset: *offset,
                            file_size: original_len,
                        });
                    }

                    original
                        .seek(SeekFrom::Start(*offset))
                        .map_err(|e| SyncError::io(destination, e))?;
                    // Fewer than a block only at the original's end
                    let n = read_up_to(&mut original, &mut buffer)
                        .map_err(|e| SyncError::io(destination, e))?;

                    writer
                        .write_all(&buffer[..n])
                        .map_err(|e| SyncError::io(dir, e))?;
                    written += n as u64;
                }
                DeltaInstruction::Insert { data } => {
                    writer.write_all(data).map_err(|e| SyncError::io(dir, e))?;
                    written += data.len() as u64;
                }
            }
        }

        let temp = writer
            .into_inner()
            .map_err(|e| SyncError::io(dir, e.into_error()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SyncError::io(temp.path(), e))?;
        std::fs::set_permissions(temp.path(), metadata.permissions())
            .map_err(|e| SyncError::io(temp.path(), e))?;

        temp.persist(destination)
            .map_err(|e| SyncError::Persist {
                path: destination.to_path_buf(),
                reason: e.error.to_string(),
            })?;

        tracing::debug!(
            path = %destination.display(),
            instructions = instructions.len(),
            bytes = written,
            "delta applied"
        );

        Ok(written)
    }
}

/// Apply instructions to an in-memory copy of the receiver's content
pub fn apply_to_bytes(
    instructions: &[DeltaInstruction],
    base: &[u8],
    block_size: usize,
) -> SyncResult<Vec<u8>> {
    let mut result = Vec::with_capacity(base.len());

    for instr in instructions {
        match instr {
            DeltaInstruction::Copy { offset } => {
                let start = *offset as usize;
                if start >= base.len() {
                    return Err(SyncError::CopyOutOfBounds {
                        offset: *offset,
                        file_size: base.len() as u64,
                    });
                }
                let end = (start + block_size).min(base.len());
                result.extend_from_slice(&base[start..end]);
            }
            DeltaInstruction::Insert { data } => result.extend_from_slice(data),
        }
    }

    Ok(result)
}
