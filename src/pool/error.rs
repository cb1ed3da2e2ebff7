use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool size must be greater than zero")]
    InvalidSize,

    #[error("Worker pool is closed")]
    Closed,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Task was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for PoolError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            PoolError::Cancelled
        } else {
            PoolError::TaskPanicked(err.to_string())
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
