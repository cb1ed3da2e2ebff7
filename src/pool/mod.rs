//! Fixed-size worker pool for blocking work
//!
//! Delta scans and file I/O are CPU/disk bound, so they run on tokio's
//! blocking threads. A fair semaphore caps how many run at once and hands
//! out slots in submission order.

pub mod error;
pub mod worker_pool;

pub use error::{PoolError, PoolResult};
pub use worker_pool::{TaskHandle, WorkerPool};
