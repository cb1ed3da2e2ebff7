//! Block index generation for delta transfer
//!
//! Splits a file into fixed-size blocks and records a weak and a strong
//! hash for each, similar to rsync's signature step. The receiving side of
//! a transfer builds this index over its current content.

use crate::config::DEFAULT_BLOCK_SIZE;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::rolling_hash::PolyRollingHash;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Strong digests are truncated to 160 bits
pub const STRONG_HASH_BYTES: usize = 20;

/// Strong hash of `data`: BLAKE3 truncated to 160 bits, lowercase hex
pub fn strong_hash(data: &[u8]) -> String {
    let digest = blake3::hash(data);
    hex::encode(&digest.as_bytes()[..STRONG_HASH_BYTES])
}

/// Hashes of one block of the indexed file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Byte offset of the block's first byte
    pub offset: u64,
    /// Polynomial rolling checksum of the block
    pub weak_hash: u32,
    /// Hex-encoded strong digest of the block
    pub strong_hash: String,
}

impl BlockInfo {
    pub fn new(offset: u64, data: &[u8]) -> Self {
        Self {
            offset,
            weak_hash: PolyRollingHash::checksum(data),
            strong_hash: strong_hash(data),
        }
    }

    /// Verify if data matches this block
    pub fn matches(&self, data: &[u8]) -> bool {
        // Weak first, the strong digest only on a hit
        PolyRollingHash::checksum(data) == self.weak_hash && strong_hash(data) == self.strong_hash
    }
}

/// Lookup structure for block matching
///
/// Built once per delta computation and never mutated afterwards. The weak
/// set is a cheap pre-filter; the `(weak, strong)` map confirms a match.
#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    offsets: HashMap<(u32, String), u64>,
    weak_hashes: HashSet<u32>,
}

impl BlockIndex {
    pub fn build(blocks: &[BlockInfo]) -> Self {
        let mut offsets = HashMap::with_capacity(blocks.len());
        let mut weak_hashes = HashSet::with_capacity(blocks.len());

        for block in blocks {
            weak_hashes.insert(block.weak_hash);
            // Identical blocks: keep the first (lowest) offset
            offsets
                .entry((block.weak_hash, block.strong_hash.clone()))
                .or_insert(block.offset);
        }

        Self {
            offsets,
            weak_hashes,
        }
    }

    pub fn contains_weak(&self, weak_hash: u32) -> bool {
        self.weak_hashes.contains(&weak_hash)
    }

    /// Offset of the block with exactly this weak and strong hash
    pub fn lookup(&self, weak_hash: u32, strong_hash: String) -> Option<u64> {
        self.offsets.get(&(weak_hash, strong_hash)).copied()
    }

    /// Number of distinct blocks
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Builder for block indexes
pub struct SignatureBuilder {
    block_size: usize,
}

impl SignatureBuilder {
    /// Create a new builder with the default block size
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Set the block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Index an in-memory buffer
    pub fn build_from_bytes(&self, data: &[u8]) -> SyncResult<Vec<BlockInfo>> {
        if self.block_size == 0 {
            return Err(SyncError::InvalidBlockSize(0));
        }

        Ok(data
            .chunks(self.block_size)
            .enumerate()
            .map(|(i, block)| BlockInfo::new((i * self.block_size) as u64, block))
            .collect())
    }

    /// Index a stream, reading it sequentially once
    pub fn build_from_reader<R: Read>(&self, reader: &mut R) -> io::Result<Vec<BlockInfo>> {
        if self.block_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "block size must be greater than zero",
            ));
        }

        let mut blocks = Vec::new();
        let mut buffer = vec![0u8; self.block_size];
        let mut offset = 0u64;

        loop {
            let bytes_read = read_up_to(reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            blocks.push(BlockInfo::new(offset, &buffer[..bytes_read]));
            offset += bytes_read as u64;

            if bytes_read < self.block_size {
                break;
            }
        }

        Ok(blocks)
    }

    /// Index the file at `path`. An empty file yields an empty index.
    pub fn build_from_path(&self, path: &Path) -> SyncResult<Vec<BlockInfo>> {
        if self.block_size == 0 {
            return Err(SyncError::InvalidBlockSize(0));
        }

        let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
        let mut reader = BufReader::new(file);

        self.build_from_reader(&mut reader)
            .map_err(|e| SyncError::io(path, e))
    }
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
/// Returns the number of bytes read.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_strong_hash_format() {
        let hash = strong_hash(b"AAAA");
        assert_eq!(hash.len(), STRONG_HASH_BYTES * 2);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(hash, strong_hash(b"AAAA"));
        assert_ne!(hash, strong_hash(b"AAAB"));
    }

    #[test]
    fn test_block_info_matches() {
        let data = b"Hello, World! This is a test block.";
        let block = BlockInfo::new(0, data);

        assert!(block.matches(data));
        assert!(!block.matches(b"Different data"));
        assert!(!block.matches(b"Hello, World! This is a test block")); // One char less
    }

    #[test]
    fn test_index_of_three_blocks() {
        let blocks = SignatureBuilder::new()
            .block_size(4)
            .build_from_bytes(b"AAAABBBBCCCC")
            .unwrap();

        assert_eq!(
            blocks,
            vec![
                BlockInfo::new(0, b"AAAA"),
                BlockInfo::new(4, b"BBBB"),
                BlockInfo::new(8, b"CCCC"),
            ]
        );
        assert_eq!(blocks[0].weak_hash, PolyRollingHash::checksum(b"AAAA"));
        assert_eq!(blocks[1].strong_hash, strong_hash(b"BBBB"));
    }

    #[test]
    fn test_short_final_block_is_recorded() {
        let blocks = SignatureBuilder::new()
            .block_size(4)
            .build_from_bytes(b"ABCDEFGHIJ")
            .unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].offset, 8);
        assert!(blocks[2].matches(b"IJ"));
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = b"Test data for reader-based index building.".repeat(50);
        let builder = SignatureBuilder::new().block_size(128);

        let from_reader = builder.build_from_reader(&mut Cursor::new(&data)).unwrap();
        let from_bytes = builder.build_from_bytes(&data).unwrap();

        assert_eq!(from_reader, from_bytes);

        // Contiguous, ascending coverage of the whole input
        let mut expected_offset = 0u64;
        for block in &from_reader {
            assert_eq!(block.offset, expected_offset);
            expected_offset += 128;
        }
        assert!(expected_offset >= data.len() as u64);
    }

    #[test]
    fn test_reader_survives_short_reads() {
        /// Yields at most 3 bytes per read call
        struct Trickle<'a>(&'a [u8]);

        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(3).min(self.0.len());
                buf[..n].copy_from_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Ok(n)
            }
        }

        let data = b"0123456789abcdefghij";
        let builder = SignatureBuilder::new().block_size(8);

        let blocks = builder.build_from_reader(&mut Trickle(data)).unwrap();
        assert_eq!(blocks, builder.build_from_bytes(data).unwrap());
    }

    #[test]
    fn test_empty_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, b"").unwrap();

        let builder = SignatureBuilder::new().block_size(4);
        assert!(builder.build_from_path(&empty).unwrap().is_empty());

        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            builder.build_from_path(&missing),
            Err(SyncError::Io { .. })
        ));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let builder = SignatureBuilder::new().block_size(0);
        assert!(matches!(
            builder.build_from_bytes(b"data"),
            Err(SyncError::InvalidBlockSize(0))
        ));
        assert!(builder.build_from_reader(&mut Cursor::new(b"data")).is_err());
    }

    #[test]
    fn test_index_lookup() {
        let data = b"AAAA".repeat(100); // Repetitive data
        let blocks = SignatureBuilder::new()
            .block_size(4)
            .build_from_bytes(&data)
            .unwrap();

        let index = BlockIndex::build(&blocks);

        // Every block is identical, so one entry at the lowest offset
        assert_eq!(index.len(), 1);
        assert!(index.contains_weak(blocks[0].weak_hash));
        assert_eq!(
            index.lookup(blocks[0].weak_hash, strong_hash(b"AAAA")),
            Some(0)
        );
        assert_eq!(index.lookup(blocks[0].weak_hash, strong_hash(b"BBBB")), None);
        assert!(BlockIndex::build(&[]).is_empty());
    }
}
