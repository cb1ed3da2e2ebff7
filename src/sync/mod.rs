//! Delta synchronization module
//!
//! Provides rsync-style delta transfer capabilities using rolling checksums
//! and strong hashes for efficient block-level file synchronization.

pub mod apply;
pub mod delta;
pub mod engine;
pub mod error;
pub mod rolling_hash;
pub mod signature;

pub use apply::{apply_to_bytes, DeltaApplier};
pub use delta::{output_len, DeltaEngine, DeltaInstruction, DeltaStats};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use rolling_hash::PolyRollingHash;
pub use signature::{strong_hash, BlockIndex, BlockInfo, SignatureBuilder};
