//! Delta computation for efficient file transfer
//!
//! Scans a source file with a rolling window against the block index of
//! the receiver's current file and emits the copy/insert plan that rebuilds
//! the source from it.

use crate::config::ConfigError;
use crate::pool::WorkerPool;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::rolling_hash::PolyRollingHash;
use crate::sync::signature::{read_up_to, strong_hash, BlockIndex, BlockInfo};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One step of the reconstruction plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaInstruction {
    /// Copy one block starting at `offset` from the receiver's current file
    Copy { offset: u64 },
    /// Insert new literal data
    Insert { data: Vec<u8> },
}

impl DeltaInstruction {
    /// Bytes this instruction contributes to the rebuilt file
    pub fn output_size(&self, block_size: usize) -> usize {
        match self {
            DeltaInstruction::Copy { .. } => block_size,
            DeltaInstruction::Insert { data } => data.len(),
        }
    }
}

/// Length of the file an instruction sequence rebuilds
pub fn output_len(instructions: &[DeltaInstruction], block_size: usize) -> u64 {
    instructions
        .iter()
        .map(|i| i.output_size(block_size) as u64)
        .sum()
}

/// Statistics about a delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaStats {
    pub copied_bytes: u64,
    pub literal_bytes: u64,
    pub copy_operations: usize,
    pub insert_operations: usize,
}

impl DeltaStats {
    pub fn from_instructions(instructions: &[DeltaInstruction], block_size: usize) -> Self {
        let mut stats = Self::default();

        for instr in instructions {
            match instr {
                DeltaInstruction::Copy { .. } => {
                    stats.copied_bytes += block_size as u64;
                    stats.copy_operations += 1;
                }
                DeltaInstruction::Insert { data } => {
                    stats.literal_bytes += data.len() as u64;
                    stats.insert_operations += 1;
                }
            }
        }

        stats
    }

    pub fn total_bytes(&self) -> u64 {
        self.copied_bytes + self.literal_bytes
    }

    /// Percentage of the output reused from the receiver's file
    pub fn copy_ratio(&self) -> f64 {
        if self.total_bytes() == 0 {
            return 0.0;
        }
        self.copied_bytes as f64 / self.total_bytes() as f64 * 100.0
    }
}

impl std::fmt::Display for DeltaStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Delta: {} copied ({:.1}%), {} literal, {} copy ops, {} insert ops",
            self.copied_bytes,
            self.copy_ratio(),
            self.literal_bytes,
            self.copy_operations,
            self.insert_operations
        )
    }
}

/// Parallel delta computation
///
/// The source is cut into `chunk_size` byte ranges scanned independently
/// on the worker pool. A block straddling two ranges cannot be matched and
/// is sent as literal bytes.
pub struct DeltaEngine {
    block_size: usize,
    chunk_size: usize,
    pool: Arc<WorkerPool>,
}

impl DeltaEngine {
    pub fn new(block_size: usize, chunk_size: usize, pool: Arc<WorkerPool>) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::InvalidBlockSize(block_size));
        }
        if chunk_size < block_size {
            return Err(ConfigError::ChunkSmallerThanBlock {
                chunk_size,
                block_size,
            }
            .into());
        }

        Ok(Self {
            block_size,
            chunk_size,
            pool,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Compute the instructions that turn the indexed file into `source`
    pub async fn compute(
        &self,
        source: &Path,
        blocks: &[BlockInfo],
    ) -> SyncResult<Vec<DeltaInstruction>> {
        let started = Instant::now();

        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| SyncError::io(source, e))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| SyncError::io(source, e))?
            .len();
        drop(file);

        let index = Arc::new(BlockIndex::build(blocks));
        let ranges = chunk_ranges(file_size, self.chunk_size as u64);

        tracing::debug!(
            path = %source.display(),
            file_size,
            chunks = ranges.len(),
            indexed_blocks = index.len(),
            "computing delta"
        );

        let handles: Vec<_> = ranges
            .iter()
            .map(|&(start, len)| {
                let path: PathBuf = source.to_path_buf();
                let index = index.clone();
                let block_size = self.block_size;
                self.pool
                    .submit(move || scan_file_range(&path, start, len, &index, block_size))
            })
            .collect();

        let joined = futures::future::try_join_all(handles.into_iter().map(|h| h.join())).await?;

        // One slot per chunk id, filled once and concatenated in order
        let mut arena: Vec<Option<Vec<DeltaInstruction>>> = (0..ranges.len()).map(|_| None).collect();
        for (chunk_id, result) in joined.into_iter().enumerate() {
            arena[chunk_id] = Some(result?);
        }

        let instructions: Vec<DeltaInstruction> = arena.into_iter().flatten().flatten().collect();

        let stats = DeltaStats::from_instructions(&instructions, self.block_size);
        crate::metrics::record_delta_computed(&stats, started.elapsed());
        tracing::debug!(path = %source.display(), %stats, "delta computed");

        Ok(instructions)
    }

    /// Same partitioning and matching as [`compute`](Self::compute), run
    /// sequentially over an in-memory source
    pub fn compute_bytes(
        &self,
        source: &[u8],
        blocks: &[BlockInfo],
    ) -> SyncResult<Vec<DeltaInstruction>> {
        let index = BlockIndex::build(blocks);
        let mut instructions = Vec::new();

        for chunk in source.chunks(self.chunk_size) {
            let mut reader = chunk;
            let part = scan_reader(&mut reader, &index, self.block_size)
                .map_err(|e| SyncError::io(Path::new("<memory>"), e))?;
            instructions.extend(part);
        }

        Ok(instructions)
    }
}

/// `(start, len)` of every chunk covering `file_size` bytes
fn chunk_ranges(file_size: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < file_size {
        let len = chunk_size.min(file_size - start);
        ranges.push((start, len));
        start += len;
    }
    ranges
}

fn scan_file_range(
    path: &Path,
    start: u64,
    len: u64,
    index: &BlockIndex,
    block_size: usize,
) -> SyncResult<Vec<DeltaInstruction>> {
    let mut file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    file.seek(SeekFrom::Start(start))
        .map_err(|e| SyncError::io(path, e))?;

    // Never read past the end of the assigned range
    let mut reader = BufReader::new(file.take(len));
    scan_reader(&mut reader, index, block_size).map_err(|e| SyncError::io(path, e))
}

/// Rolling-window scan of one chunk
fn scan_reader<R: Read>(
    reader: &mut R,
    index: &BlockIndex,
    block_size: usize,
) -> io::Result<Vec<DeltaInstruction>> {
    let mut instructions = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut window: VecDeque<u8> = VecDeque::with_capacity(block_size);
    let mut scratch = vec![0u8; block_size];
    let mut next = [0u8; 1];
    let mut hash = PolyRollingHash::with_window(block_size);

    refill_window(reader, &mut window, &mut scratch, &mut hash)?;

    loop {
        if window.len() < block_size {
            pending.extend(window.drain(..));
            break;
        }

        let weak = hash.digest();
        let matched = if index.contains_weak(weak) {
            // The deque wraps after sliding; linearize before hashing
            index.lookup(weak, strong_hash(window.make_contiguous()))
        } else {
            None
        };

        if let Some(offset) = matched {
            if !pending.is_empty() {
                instructions.push(DeltaInstruction::Insert {
                    data: std::mem::take(&mut pending),
                });
            }
            instructions.push(DeltaInstruction::Copy { offset });

            // Jump a whole block and hash the new window from scratch
            window.clear();
            refill_window(reader, &mut window, &mut scratch, &mut hash)?;
        } else if let Some(outgoing) = window.pop_front() {
            pending.push(outgoing);
            if read_up_to(reader, &mut next)? == 1 {
                window.push_back(next[0]);
                hash.roll_byte(outgoing, next[0]);
            }
        }
    }

    if !pending.is_empty() {
        instructions.push(DeltaInstruction::Insert { data: pending });
    }

    Ok(instructions)
}

fn refill_window<R: Read>(
    reader: &mut R,
    window: &mut VecDeque<u8>,
    scratch: &mut [u8],
    hash: &mut PolyRollingHash,
) -> io::Result<()> {
    let bytes_read = read_up_to(reader, scratch)?;
    window.extend(&scratch[..bytes_read]);
    if bytes_read == scratch.len() {
        hash.update_block(window.make_contiguous());
    }
    Ok(())
}
