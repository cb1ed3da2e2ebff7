//! Entry point tying the sync primitives to a worker pool
//!
//! Every file operation runs on the pool so callers on the async runtime
//! never block a reactor thread.

use crate::config::SyncConfig;
use crate::pool::WorkerPool;
use crate::sync::apply::DeltaApplier;
use crate::sync::delta::{DeltaEngine, DeltaInstruction, DeltaStats};
use crate::sync::error::SyncResult;
use crate::sync::signature::{BlockInfo, SignatureBuilder};
use std::path::Path;
use std::sync::Arc;

pub struct SyncEngine {
    config: SyncConfig,
    pool: Arc<WorkerPool>,
    delta: DeltaEngine,
    applier: DeltaApplier,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        let delta = DeltaEngine::new(config.block_size, config.chunk_size, pool.clone())?;
        let applier = DeltaApplier::new(config.block_size)?;

        Ok(Self {
            config,
            pool,
            delta,
            applier,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Index the current content of `path`
    pub async fn build_index(&self, path: &Path) -> SyncResult<Vec<BlockInfo>> {
        let builder = SignatureBuilder::new().block_size(self.config.block_size);
        let path = path.to_path_buf();

        self.pool
            .submit(move || builder.build_from_path(&path))
            .join()
            .await?
    }

    /// Instructions that turn the indexed file into `source`
    pub async fn compute_delta(
        &self,
        source: &Path,
        blocks: &[BlockInfo],
    ) -> SyncResult<Vec<DeltaInstruction>> {
        self.delta.compute(source, blocks).await
    }

    /// Rewrite `destination` from its current content plus `instructions`
    pub async fn apply_delta(
        &self,
        destination: &Path,
        instructions: Vec<DeltaInstruction>,
    ) -> SyncResult<u64> {
        let applier = self.applier.clone();
        let destination = destination.to_path_buf();

        self.pool
            .submit(move || applier.apply(&destination, &instructions))
            .join()
            .await?
    }

    /// One-shot local sync: make `destination` identical to `source`
    pub async fn sync_files(&self, source: &Path, destination: &Path) -> SyncResult<DeltaStats> {
        let blocks = self.build_index(destination).await?;
        let instructions = self.compute_delta(source, &blocks).await?;
        let stats = DeltaStats::from_instructions(&instructions, self.config.block_size);

        self.apply_delta(destination, instructions).await?;

        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            blocks = blocks.len(),
            %stats,
            "local sync complete"
        );

        Ok(stats)
    }
}
